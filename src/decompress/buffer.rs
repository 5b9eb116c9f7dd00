use std::collections::TryReserveError;

/// A byte buffer that decompressed data is written into.
///
/// The buffer starts at a fixed size and grows by that same size whenever
/// a caller asks for more free space than is left. All allocations are
/// fallible, so running out of memory is reported instead of aborting
#[derive(Debug)]
pub struct OutputBuffer {
    data: Vec<u8>,
    written: usize,
    increment: usize
}

impl OutputBuffer {
    /// Creates a new OutputBuffer with the specified size, which is also
    /// used as the growth increment. A size of 0 is treated as 1
    pub fn with_initial_size(size: usize) -> Result<Self, TryReserveError> {
        let size = std::cmp::max(size, 1);

        let mut data = Vec::new();
        data.try_reserve_exact(size)?;
        data.resize(size, 0);

        Ok(Self {
            data,
            written: 0,
            increment: size
        })
    }

    /// Grows the buffer until at least `needed` bytes are free
    pub fn ensure_free(&mut self, needed: usize) -> Result<(), TryReserveError> {
        while self.free() < needed {
            self.data.try_reserve_exact(self.increment)?;
            self.data.resize(self.data.len() + self.increment, 0);
        }

        Ok(())
    }

    /// Returns the free region after the written bytes, at most `len` bytes long
    pub fn window(&mut self, len: usize) -> &mut [u8] {
        let end = std::cmp::min(self.written + len, self.data.len());
        &mut self.data[self.written..end]
    }

    /// Marks `count` bytes of the free region as written
    pub fn advance(&mut self, count: usize) {
        assert!(count <= self.free(), "advanced past the end of the output buffer");
        self.written += count;
    }

    pub fn len(&self) -> usize {
        self.written
    }

    pub fn is_empty(&self) -> bool {
        self.written == 0
    }

    /// Returns the allocated size of the buffer
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn free(&self) -> usize {
        self.data.len() - self.written
    }

    /// Trims the buffer down to the written bytes and returns them
    pub fn into_vec(mut self) -> Vec<u8> {
        self.data.truncate(self.written);
        self.data.shrink_to_fit();
        self.data
    }
}
