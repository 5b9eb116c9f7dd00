use std::fmt::Debug;

use flate2::{Decompress, FlushDecompress, Status};
use log::trace;

#[cfg(feature = "gzip")]
use super::gzip::{GzipHeaderReader, GzipTrailer, GZIP_TRAILER_SIZE};

use super::{DecodeError, Framing};

/// Result of a single [Inflater::step]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    /// More input is needed, or more output space
    Continue,

    /// The logical end of the stream was reached
    StreamEnd
}

#[derive(Debug, Clone, Copy)]
pub struct Step {
    pub consumed: usize,
    pub produced: usize,
    pub status: StepStatus
}

/// An inflate engine that can be driven one step at a time
pub trait Inflater: Debug {
    /// Runs the engine over `input`, writing decompressed bytes to `output`.
    ///
    /// The step returns once the input is used up, the output is full, or
    /// the stream has ended. Input after the end of the stream is left
    /// unconsumed
    fn step(&mut self, input: &[u8], output: &mut [u8]) -> Result<Step, DecodeError>;
}

#[derive(Debug)]
enum Stage {
    #[cfg(feature = "gzip")]
    Header(GzipHeaderReader),

    Body,

    #[cfg(feature = "gzip")]
    Trailer(Vec<u8>),

    Done,
    Failed
}

/// The working state needed to inflate one gzip member or zlib stream.
///
/// A context is meant to live for exactly one stream: create it, feed it
/// the input in order, and drop it. After a fatal error every further
/// step fails with [DecodeError::EngineStateError]
pub struct InflateContext {
    framing: Framing,
    stage: Stage,
    stream: Decompress,

    #[cfg(feature = "gzip")]
    crc: crc32fast::Hasher
}

impl Debug for InflateContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InflateContext")
            .field("framing", &self.framing)
            .field("stage", &self.stage)
            .field("total_in", &self.stream.total_in())
            .field("total_out", &self.stream.total_out())
            .finish()
    }
}

impl InflateContext {
    /// Creates a new InflateContext for the specified framing.
    ///
    /// Returns error if the framing is [Framing::Auto] or if support
    /// for it was not compiled in
    pub fn new(framing: Framing) -> Result<Self, DecodeError> {
        let (stage, zlib_header) = match framing {
            #[cfg(feature = "gzip")]
            Framing::Gzip => (Stage::Header(GzipHeaderReader::new()), false),

            #[cfg(feature = "zlib")]
            Framing::Zlib => (Stage::Body, true),

            Framing::Auto => {
                return Err(DecodeError::EngineInitFailed("framing has to be resolved before inflating".to_owned()));
            },

            #[allow(unreachable_patterns)]
            other => {
                return Err(DecodeError::EngineInitFailed(format!("{other:?} support is not enabled")));
            }
        };

        Ok(Self {
            framing,
            stage,
            stream: Decompress::new(zlib_header),

            #[cfg(feature = "gzip")]
            crc: crc32fast::Hasher::new()
        })
    }

    pub fn framing(&self) -> Framing {
        self.framing
    }

    /// Returns the number of decompressed bytes produced so far
    pub fn total_out(&self) -> u64 {
        self.stream.total_out()
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.stage, Stage::Done)
    }

    fn inflate_step(&mut self, input: &[u8], output: &mut [u8]) -> Result<Step, DecodeError> {
        let mut consumed = 0;
        let mut produced = 0;

        loop {
            match &mut self.stage {
                #[cfg(feature = "gzip")]
                Stage::Header(reader) => {
                    match reader.update(&input[consumed..]) {
                        Ok((taken, Some(header))) => {
                            trace!("read gzip header of {} bytes, name {:?}", header.header_size, header.filename.as_ref().map(|n| n.len()));

                            consumed += taken;
                            self.stage = Stage::Body;
                        },

                        Ok((taken, None)) => {
                            consumed += taken;
                            return Ok(Step { consumed, produced, status: StepStatus::Continue });
                        },

                        Err(e) => return Err(self.fail(DecodeError::CorruptData(e.to_string())))
                    }
                },

                Stage::Body => {
                    let in_before = self.stream.total_in();
                    let out_before = self.stream.total_out();

                    let status = self.stream.decompress(
                        &input[consumed..],
                        &mut output[produced..],
                        FlushDecompress::None
                    );

                    let read = (self.stream.total_in() - in_before) as usize;
                    let written = (self.stream.total_out() - out_before) as usize;

                    #[cfg(feature = "gzip")]
                    if self.framing == Framing::Gzip {
                        self.crc.update(&output[produced..(produced + written)]);
                    }

                    consumed += read;
                    produced += written;

                    match status {
                        Ok(Status::StreamEnd) => self.stage = self.after_body(),

                        Ok(Status::Ok) | Ok(Status::BufError) => {
                            return Ok(Step { consumed, produced, status: StepStatus::Continue });
                        },

                        Err(e) => {
                            let message = match e.needs_dictionary() {
                                Some(adler) => format!("stream requires a preset dictionary ({adler:#010x})"),
                                None => e.to_string()
                            };

                            return Err(self.fail(DecodeError::CorruptData(message)));
                        }
                    }
                },

                #[cfg(feature = "gzip")]
                Stage::Trailer(pending) => {
                    let wanted = GZIP_TRAILER_SIZE - pending.len();
                    let available = std::cmp::min(wanted, input.len() - consumed);
                    pending.extend_from_slice(&input[consumed..(consumed + available)]);
                    consumed += available;

                    let Some(trailer) = GzipTrailer::from_bytes(pending.as_slice()) else {
                        return Ok(Step { consumed, produced, status: StepStatus::Continue });
                    };

                    if let Err(e) = self.check_trailer(&trailer) {
                        return Err(self.fail(e));
                    }

                    self.stage = Stage::Done;
                },

                Stage::Done => {
                    return Ok(Step { consumed, produced, status: StepStatus::StreamEnd });
                },

                Stage::Failed => {
                    return Err(DecodeError::EngineStateError("context was used after a fatal error"));
                }
            }
        }
    }

    fn after_body(&self) -> Stage {
        match self.framing {
            #[cfg(feature = "gzip")]
            Framing::Gzip => Stage::Trailer(Vec::with_capacity(GZIP_TRAILER_SIZE)),

            _ => Stage::Done
        }
    }

    #[cfg(feature = "gzip")]
    fn check_trailer(&self, trailer: &GzipTrailer) -> Result<(), DecodeError> {
        let crc32 = self.crc.clone().finalize();
        if trailer.crc32 != crc32 {
            return Err(DecodeError::CorruptData(format!(
                "crc32 mismatch: trailer has {:#010x}, data has {crc32:#010x}", trailer.crc32
            )));
        }

        // ISIZE is the uncompressed length modulo 2^32
        let size = self.stream.total_out() as u32;
        if trailer.size != size {
            return Err(DecodeError::CorruptData(format!(
                "size mismatch: trailer has {}, data has {size}", trailer.size
            )));
        }

        Ok(())
    }

    fn fail(&mut self, error: DecodeError) -> DecodeError {
        self.stage = Stage::Failed;
        error
    }
}

impl Inflater for InflateContext {
    fn step(&mut self, input: &[u8], output: &mut [u8]) -> Result<Step, DecodeError> {
        self.inflate_step(input, output)
    }
}
