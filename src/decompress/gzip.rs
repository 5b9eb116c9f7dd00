use std::io::{self, BufRead, Cursor, Read};

use byteorder::{ByteOrder, ReadBytesExt, LittleEndian};
use thiserror::Error;

pub const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
pub const GZIP_HEADER_CONSTANT_SIZE: usize = 10;
pub const GZIP_TRAILER_SIZE: usize = 8;

const METHOD_DEFLATE: u8 = 8;

const FLAG_TEXT: u8 = 1 << 0;
const FLAG_HCRC: u8 = 1 << 1;
const FLAG_EXTRA: u8 = 1 << 2;
const FLAG_NAME: u8 = 1 << 3;
const FLAG_COMMENT: u8 = 1 << 4;
const FLAG_RESERVED: u8 = 0xe0;

#[derive(Error, Debug)]
pub enum GzipHeaderError {
    #[error("invalid gzip magic: {0:#06x}")]
    InvalidMagic(u16),

    #[error("unknown compression method: {0}")]
    UnknownMethod(u8),

    #[error("reserved header flags are set: {0:#04x}")]
    ReservedFlags(u8),

    #[error("header crc16 mismatch: header has {expected:#06x}, data has {actual:#06x}")]
    HeaderCrcMismatch {
        expected: u16,
        actual: u16
    },

    #[error("header is incomplete")]
    Incomplete(#[from] io::Error)
}

/// Represents the result of reading a gzip member header
#[derive(Debug, Clone)]
pub struct GzipHeader {
    pub flags: u8,

    pub mtime: u32,

    pub extra_flags: u8,
    pub os: u8,

    pub extra: Option<Vec<u8>>,

    pub filename: Option<String>,
    pub comment: Option<String>,

    pub header_size: usize
}

impl GzipHeader {
    /// Attempts to read a gzip member header from the provided
    /// byte buffer. Returns None if there isn't enough data
    pub fn from_bytes(data: impl AsRef<[u8]>) -> Result<Option<Self>, GzipHeaderError> {
        let (_, header) = GzipHeaderReader::default().update(data)?;
        Ok(header)
    }

    fn read(data: &[u8]) -> Result<Self, GzipHeaderError> {
        let mut cursor = Cursor::new(data);

        let mut magic = [0; 2];
        cursor.read_exact(&mut magic)?;
        if magic != GZIP_MAGIC {
            return Err(GzipHeaderError::InvalidMagic(u16::from_be_bytes(magic)));
        }

        let method = cursor.read_u8()?;
        if method != METHOD_DEFLATE {
            return Err(GzipHeaderError::UnknownMethod(method));
        }

        let flags = cursor.read_u8()?;
        if flags & FLAG_RESERVED != 0 {
            return Err(GzipHeaderError::ReservedFlags(flags));
        }

        let mtime = cursor.read_u32::<LittleEndian>()?;
        let extra_flags = cursor.read_u8()?;
        let os = cursor.read_u8()?;

        let extra = if flags & FLAG_EXTRA != 0 {
            let length = cursor.read_u16::<LittleEndian>()? as usize;
            let mut extra = vec![0; length];
            cursor.read_exact(&mut extra)?;
            Some(extra)
        } else {
            None
        };

        let filename = if flags & FLAG_NAME != 0 {
            Some(read_zero_terminated(&mut cursor)?)
        } else {
            None
        };

        let comment = if flags & FLAG_COMMENT != 0 {
            Some(read_zero_terminated(&mut cursor)?)
        } else {
            None
        };

        if flags & FLAG_HCRC != 0 {
            let covered = cursor.position() as usize;
            let expected = cursor.read_u16::<LittleEndian>()?;

            // The header CRC is the low half of the CRC-32 of everything before it
            let actual = crc32fast::hash(&data[..covered]) as u16;
            if expected != actual {
                return Err(GzipHeaderError::HeaderCrcMismatch { expected, actual });
            }
        }

        Ok(Self {
            flags,
            mtime,
            extra_flags,
            os,
            extra,
            filename,
            comment,

            header_size: cursor.position() as usize
        })
    }

    /// Returns whether the compressor marked the payload as probably text
    pub fn is_text(&self) -> bool {
        self.flags & FLAG_TEXT != 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Field {
    #[default]
    Fixed,
    ExtraLength,
    Extra(usize),
    Name,
    Comment,
    HeaderCrc,
    Done
}

/// Reads a gzip member header that arrives in pieces.
///
/// Only the header's own bytes are buffered, and every input byte is
/// looked at once, so a long file name or comment costs linear time
#[derive(Debug, Default)]
pub struct GzipHeaderReader {
    buffer: Vec<u8>,
    field: Field,
    field_start: usize
}

impl GzipHeaderReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds more bytes to the reader.
    ///
    /// The return values are the amount of bytes that belonged to the header,
    /// and the header itself once it is complete. Bytes after the end of the
    /// header are never consumed
    pub fn update(&mut self, data: impl AsRef<[u8]>) -> Result<(usize, Option<GzipHeader>), GzipHeaderError> {
        let data = data.as_ref();

        let mut consumed = 0;
        loop {
            let available = &data[consumed..];
            let (taken, complete) = match self.field {
                Field::Fixed => self.fill(available, GZIP_HEADER_CONSTANT_SIZE),
                Field::ExtraLength | Field::HeaderCrc => self.fill(available, 2),
                Field::Extra(length) => self.fill(available, length),
                Field::Name | Field::Comment => self.fill_zero_terminated(available),
                Field::Done => return Ok((consumed, Some(GzipHeader::read(&self.buffer)?)))
            };
            consumed += taken;

            if self.field == Field::Fixed {
                check_fixed_prefix(&self.buffer)?;
            }

            if !complete {
                return Ok((consumed, None));
            }

            self.next_field();
        }
    }

    fn fill(&mut self, data: &[u8], size: usize) -> (usize, bool) {
        let have = self.buffer.len() - self.field_start;
        let taken = std::cmp::min(size - have, data.len());
        self.buffer.extend_from_slice(&data[..taken]);

        (taken, have + taken == size)
    }

    fn fill_zero_terminated(&mut self, data: &[u8]) -> (usize, bool) {
        match data.iter().position(|&b| b == 0) {
            Some(end) => {
                self.buffer.extend_from_slice(&data[..=end]);
                (end + 1, true)
            },

            None => {
                self.buffer.extend_from_slice(data);
                (data.len(), false)
            }
        }
    }

    fn next_field(&mut self) {
        let flags = self.buffer[3];

        self.field = match self.field {
            Field::Fixed if flags & FLAG_EXTRA != 0 => Field::ExtraLength,
            Field::ExtraLength => Field::Extra(LittleEndian::read_u16(&self.buffer[self.field_start..]) as usize),
            Field::Fixed | Field::Extra(..) if flags & FLAG_NAME != 0 => Field::Name,
            Field::Fixed | Field::Extra(..) | Field::Name if flags & FLAG_COMMENT != 0 => Field::Comment,
            Field::Fixed | Field::Extra(..) | Field::Name | Field::Comment if flags & FLAG_HCRC != 0 => Field::HeaderCrc,
            _ => Field::Done
        };
        self.field_start = self.buffer.len();
    }
}

// Rejects bad magic, method or flags as soon as those bytes are present
fn check_fixed_prefix(data: &[u8]) -> Result<(), GzipHeaderError> {
    if data.len() >= 2 && data[..2] != GZIP_MAGIC {
        return Err(GzipHeaderError::InvalidMagic(u16::from_be_bytes([data[0], data[1]])));
    }

    if let Some(&method) = data.get(2) {
        if method != METHOD_DEFLATE {
            return Err(GzipHeaderError::UnknownMethod(method));
        }
    }

    if let Some(&flags) = data.get(3) {
        if flags & FLAG_RESERVED != 0 {
            return Err(GzipHeaderError::ReservedFlags(flags));
        }
    }

    Ok(())
}

// Names and comments are ISO 8859-1, anything else is replaced
fn read_zero_terminated(cursor: &mut Cursor<&[u8]>) -> Result<String, GzipHeaderError> {
    let mut bytes = Vec::new();
    cursor.read_until(0, &mut bytes)?;

    if bytes.pop() != Some(0) {
        return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
    }

    Ok(String::from_utf8_lossy(&bytes).to_string())
}

/// Represents the 8 bytes following the DEFLATE data of a gzip member
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GzipTrailer {
    pub crc32: u32,

    /// Uncompressed size modulo 2^32
    pub size: u32
}

impl GzipTrailer {
    /// Attempts to read a gzip trailer from the provided
    /// byte buffer. Returns None if there isn't enough data
    pub fn from_bytes(data: impl AsRef<[u8]>) -> Option<Self> {
        let mut cursor = Cursor::new(data.as_ref());

        let crc32 = cursor.read_u32::<LittleEndian>().ok()?;
        let size = cursor.read_u32::<LittleEndian>().ok()?;

        Some(Self {
            crc32,
            size
        })
    }
}
