/// Provides utilities for decompressing fully buffered streams
pub mod decompress;

/// Provides a buffer filter that feeds compressed buffers through
/// the decompressor and hands the results downstream
pub mod gzdec;

pub use decompress::{decompress, decompress_with, DecodeError, Framing, CHUNK};
