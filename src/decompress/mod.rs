use std::collections::TryReserveError;

use log::{debug, trace};
use thiserror::Error;

use self::{buffer::OutputBuffer, engine::{InflateContext, Inflater, StepStatus}};

/// Provides the growable buffer decompressed bytes are written into
pub mod buffer;

/// Provides the per-call inflate context
pub mod engine;

/// Provides utilities for reading gzip member headers and trailers
#[cfg(feature = "gzip")]
pub mod gzip;

/// Size of a unit of work: at most this many compressed bytes are
/// handed to the engine at once, and at most this many decompressed
/// bytes are produced per engine step
pub const CHUNK: usize = 16384;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("could not initialize inflate engine: {0}")]
    EngineInitFailed(String),

    #[error("out of memory: {0}")]
    OutOfMemory(#[from] TryReserveError),

    #[error("corrupt compressed data: {0}")]
    CorruptData(String),

    #[error("inflate engine is in an inconsistent state: {0}")]
    EngineStateError(&'static str),

    #[error("input ended before the end of the compressed stream")]
    TruncatedStream,

    #[error("decompression produced no output")]
    NoOutput
}

/// Represents the container wrapped around the DEFLATE data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Framing {
    /// Picks [Framing::Gzip] or [Framing::Zlib] from the first two input bytes
    #[default]
    Auto,

    /// RFC 1952 gzip member
    Gzip,

    /// RFC 1950 zlib stream
    Zlib
}

impl Framing {
    /// Guesses the framing of the provided data from its first two bytes.
    ///
    /// Anything that is neither a gzip magic nor a valid zlib header is
    /// treated as gzip, so that garbage is reported by the gzip header parser
    pub fn detect(data: impl AsRef<[u8]>) -> Self {
        match data.as_ref() {
            [0x1f, 0x8b, ..] => Self::Gzip,
            [cmf, flg, ..] if is_zlib_header(*cmf, *flg) => Self::Zlib,
            _ => Self::Gzip
        }
    }

    /// Returns self, or the detected framing of the data if self is [Framing::Auto]
    pub fn resolve(self, data: impl AsRef<[u8]>) -> Self {
        match self {
            Self::Auto => Self::detect(data),
            _ => self
        }
    }
}

fn is_zlib_header(cmf: u8, flg: u8) -> bool {
    let method = cmf & 0x0f;
    let window_bits = cmf >> 4;

    method == 8 && window_bits <= 7 && (u16::from(cmf) << 8 | u16::from(flg)) % 31 == 0
}

/// Decompresses a complete gzip or zlib stream, detecting the framing
/// from the data. Identical to [decompress_with] with [Framing::Auto]
pub fn decompress(input: impl AsRef<[u8]>) -> Result<Vec<u8>, DecodeError> {
    decompress_with(input, Framing::Auto)
}

/// Decompresses a complete compressed stream with the specified framing.
///
/// The returned buffer holds exactly the decompressed bytes, with no spare
/// capacity. A stream that decompresses to nothing is reported as
/// [DecodeError::NoOutput]. Bytes after the end of the first stream are ignored
pub fn decompress_with(input: impl AsRef<[u8]>, framing: Framing) -> Result<Vec<u8>, DecodeError> {
    let input = input.as_ref();
    if input.is_empty() {
        return Err(DecodeError::NoOutput);
    }

    let framing = framing.resolve(input);
    let mut context = InflateContext::new(framing)?;

    debug!("inflating {} bytes as {framing:?}", input.len());

    inflate_chunked(&mut context, input)
}

/// Drives the engine over the input in chunks, growing the output as needed
fn inflate_chunked(engine: &mut impl Inflater, input: &[u8]) -> Result<Vec<u8>, DecodeError> {
    let mut output = OutputBuffer::with_initial_size(std::cmp::max(input.len(), CHUNK))?;

    let mut offset = 0;
    let mut finished = false;
    while !finished {
        let chunk = &input[offset..std::cmp::min(offset + CHUNK, input.len())];
        if chunk.is_empty() {
            break;
        }

        let mut chunk_pos = 0;
        loop {
            output.ensure_free(CHUNK)?;

            let step = engine.step(&chunk[chunk_pos..], output.window(CHUNK))?;
            chunk_pos += step.consumed;
            output.advance(step.produced);

            trace!("step at {}: consumed {}, produced {}", offset + chunk_pos, step.consumed, step.produced);

            if step.status == StepStatus::StreamEnd {
                finished = true;
                break;
            }

            // A full window means more output may be pending for this chunk
            if step.produced == CHUNK {
                continue;
            }

            if chunk_pos == chunk.len() {
                break;
            }

            if step.consumed == 0 && step.produced == 0 {
                return Err(DecodeError::EngineStateError("engine made no progress on pending input"));
            }
        }

        offset += chunk_pos;
    }

    if !finished {
        return Err(DecodeError::TruncatedStream);
    }

    if offset < input.len() {
        debug!("ignoring {} bytes after the end of the stream", input.len() - offset);
    }

    if output.is_empty() {
        return Err(DecodeError::NoOutput);
    }

    debug!("inflated {} bytes into {}", offset, output.len());

    Ok(output.into_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::engine::Step;

    #[derive(Debug)]
    struct Stalled;

    impl Inflater for Stalled {
        fn step(&mut self, _input: &[u8], _output: &mut [u8]) -> Result<Step, DecodeError> {
            Ok(Step { consumed: 0, produced: 0, status: StepStatus::Continue })
        }
    }

    // Swallows all input and emits one byte per step, never ending the stream
    #[derive(Debug)]
    struct Endless;

    impl Inflater for Endless {
        fn step(&mut self, input: &[u8], output: &mut [u8]) -> Result<Step, DecodeError> {
            output[0] = 1;
            Ok(Step { consumed: input.len(), produced: 1, status: StepStatus::Continue })
        }
    }

    // Fills every window it is given until `remaining` bytes were produced
    #[derive(Debug)]
    struct Flood {
        remaining: usize
    }

    impl Inflater for Flood {
        fn step(&mut self, input: &[u8], output: &mut [u8]) -> Result<Step, DecodeError> {
            let produced = std::cmp::min(self.remaining, output.len());
            output[..produced].fill(7);
            self.remaining -= produced;

            let status = if self.remaining == 0 { StepStatus::StreamEnd } else { StepStatus::Continue };
            Ok(Step { consumed: if self.remaining == 0 { input.len() } else { 0 }, produced, status })
        }
    }

    #[test]
    fn stalled_engine_is_a_state_error() {
        let result = inflate_chunked(&mut Stalled, b"pending input");
        assert!(matches!(result, Err(DecodeError::EngineStateError(..))));
    }

    #[test]
    fn missing_stream_end_is_truncation() {
        let input = vec![0; 3 * CHUNK + 5];
        let result = inflate_chunked(&mut Endless, &input);
        assert!(matches!(result, Err(DecodeError::TruncatedStream)));
    }

    #[test]
    fn output_grows_while_windows_are_filled() {
        let length = 10 * CHUNK + 3;
        let output = inflate_chunked(&mut Flood { remaining: length }, b"x").unwrap();

        assert_eq!(output.len(), length);
        assert_eq!(output.capacity(), length);
        assert!(output.iter().all(|&b| b == 7));
    }

    #[test]
    fn detects_framing() {
        assert_eq!(Framing::detect([0x1f_u8, 0x8b, 0x08]), Framing::Gzip);
        assert_eq!(Framing::detect([0x78_u8, 0x9c]), Framing::Zlib);
        assert_eq!(Framing::detect([0x78_u8, 0x01]), Framing::Zlib);
        assert_eq!(Framing::detect([0x78_u8, 0xda]), Framing::Zlib);

        // Bad check bits
        assert_eq!(Framing::detect([0x78_u8, 0x9d]), Framing::Gzip);

        assert_eq!(Framing::detect([0x1f_u8]), Framing::Gzip);
        assert_eq!(Framing::detect(b""), Framing::Gzip);
    }

    #[test]
    fn explicit_framing_is_kept() {
        assert_eq!(Framing::Zlib.resolve([0x1f_u8, 0x8b]), Framing::Zlib);
        assert_eq!(Framing::Auto.resolve([0x78_u8, 0x9c]), Framing::Zlib);
    }
}
