use log::{debug, trace, warn};
use thiserror::Error;

use crate::decompress::{decompress_with, DecodeError, Framing};

#[derive(Debug, Error)]
pub enum FlowError {
    #[error("failed to decompress buffer: {0}")]
    Decode(#[from] DecodeError),

    #[error("no downstream callback is set")]
    NotLinked,

    #[error("error within callback: {0}")]
    Downstream(#[from] anyhow::Error)
}

/// What [GzDec::chain] does with a buffer that could not be decompressed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorPolicy {
    /// Return the [DecodeError] to the caller
    #[default]
    Error,

    /// Silently discard the buffer
    Drop,

    /// Push the original compressed buffer downstream unchanged
    Forward
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Settings {
    /// Log decompression failures at debug level instead of warning level
    pub silent: bool,

    pub on_error: ErrorPolicy,
    pub framing: Framing
}

/// A buffer handed to the downstream callback
#[derive(Debug)]
pub enum DecodedBuffer<'a> {
    /// Decompressed bytes, owned by the callback from now on
    Decompressed(Vec<u8>),

    /// The untouched input buffer, see [ErrorPolicy::Forward]
    Original(&'a [u8])
}

impl DecodedBuffer<'_> {
    pub fn as_slice(&self) -> &[u8] {
        match self {
            Self::Decompressed(data) => data,
            Self::Original(data) => data
        }
    }
}

/// Outcome of a successful [GzDec::chain] call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Decompressed data of this length was pushed downstream
    Pushed(usize),

    /// The buffer could not be decompressed and was discarded
    Dropped,

    /// The buffer could not be decompressed and was pushed as is
    Forwarded(usize)
}

/// A filter that decompresses every buffer it receives and pushes the
/// result to a downstream callback. Each buffer must hold a complete
/// gzip or zlib stream
pub struct GzDec<'a> {
    settings: Settings,

    #[allow(clippy::type_complexity)]
    on_push: Option<Box<dyn Fn(DecodedBuffer) -> anyhow::Result<()> + 'a>>
}

impl std::fmt::Debug for GzDec<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GzDec")
            .field("settings", &self.settings)
            .field("linked", &self.on_push.is_some())
            .finish()
    }
}

impl Default for GzDec<'_> {
    /// Identical to [GzDec::new] with default [Settings]
    fn default() -> Self {
        Self::new(Settings::default())
    }
}

impl<'a> GzDec<'a> {
    /// Creates a new GzDec with no downstream callback
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            on_push: None
        }
    }

    pub fn settings(&self) -> Settings {
        self.settings
    }

    /// Replaces the settings. Takes effect from the next buffer on
    pub fn set_settings(&mut self, settings: Settings) {
        self.settings = settings;
    }

    /// Sets the downstream callback. The passed closure will be invoked
    /// once for every buffer passed to [GzDec::chain] that is not dropped
    pub fn set_callback(&mut self, on_push: impl Fn(DecodedBuffer) -> anyhow::Result<()> + 'a) {
        self.on_push = Some(Box::new(on_push));
    }

    /// Decompresses one buffer and pushes the result downstream.
    ///
    /// Failures to decompress are handled according to [Settings::on_error].
    /// Errors returned by the callback are passed through as [FlowError::Downstream]
    pub fn chain(&self, buffer: impl AsRef<[u8]>) -> Result<Flow, FlowError> {
        let buffer = buffer.as_ref();

        let Some(on_push) = &self.on_push else {
            return Err(FlowError::NotLinked);
        };

        let err = match decompress_with(buffer, self.settings.framing) {
            Ok(data) => {
                let length = data.len();
                trace!("pushing {length} decompressed bytes from a {} byte buffer", buffer.len());

                (on_push)(DecodedBuffer::Decompressed(data))?;
                return Ok(Flow::Pushed(length));
            },

            Err(err) => err
        };

        if self.settings.silent {
            debug!("stream could not be inflated correctly: {err}");
        } else {
            warn!("stream could not be inflated correctly: {err}");
        }

        match self.settings.on_error {
            ErrorPolicy::Error => Err(err.into()),

            ErrorPolicy::Drop => Ok(Flow::Dropped),

            ErrorPolicy::Forward => {
                (on_push)(DecodedBuffer::Original(buffer))?;
                Ok(Flow::Forwarded(buffer.len()))
            }
        }
    }
}
