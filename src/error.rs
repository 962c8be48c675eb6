//! Error types for the device, protocol, curve and configuration layers.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while opening or reading the timing device.
///
/// `Open` and `Attributes` are fatal to the monitor thread only; the request
/// server keeps serving the last statistics.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// The device node could not be opened.
    #[error("could not open device {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Line attributes could not be queried or applied.
    #[error("could not configure device {path}: {source}")]
    Attributes {
        path: PathBuf,
        #[source]
        source: nix::Error,
    },

    /// The device reported end of input (hangup, or end of a replay file).
    #[error("device closed")]
    Closed,

    /// Any other I/O failure while reading.
    #[error("device read failed: {0}")]
    Io(#[from] io::Error),
}

/// Reasons a device line fails to tokenize.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LineError {
    /// The line does not have the fixed device line length.
    #[error("line is {0} bytes, expected {expected}", expected = crate::device::LINE_LEN)]
    Length(usize),

    /// A field is missing.
    #[error("missing field: {0}")]
    MissingField(&'static str),

    /// A field is present but not a valid integer.
    #[error("invalid field {field}: {value:?}")]
    InvalidField { field: &'static str, value: String },

    /// The delay arithmetic does not fit in 64 bits.
    #[error("timestamps overflow the delay computation")]
    Overflow,
}

/// Protocol framing and decoding failures.
///
/// Every variant means the message is dropped; none of them is fatal to a
/// server loop.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Fewer than four bytes were available to classify.
    #[error("message too short to classify ({0} bytes)")]
    Truncated(usize),

    /// The first four bytes are not a known message tag.
    #[error("unknown message tag {0:?}")]
    UnknownTag(String),

    /// The header has no `content-length:` field.
    #[error("missing content-length field")]
    MissingContentLength,

    /// The content length is not a canonical decimal integer.
    #[error("malformed content-length {0:?}")]
    MalformedLength(String),

    /// The header ended before the content length was terminated.
    #[error("incomplete message header")]
    IncompleteHeader,

    /// The consuming read returned fewer bytes than the frame needs.
    #[error("short read: expected {expected} bytes, got {actual}")]
    ShortRead { expected: usize, actual: usize },

    /// A required response field is absent.
    #[error("missing field: {0}")]
    MissingField(&'static str),

    /// A response field could not be parsed.
    #[error("malformed field {field}: {value:?}")]
    MalformedField { field: &'static str, value: String },

    /// Nothing arrived before the receive timeout.
    #[error("timed out waiting for a message")]
    Timeout,

    /// Transport failure.
    #[error("transport error: {0}")]
    Io(#[source] io::Error),
}

impl ProtocolError {
    /// True when the error only means "nothing to read yet".
    pub fn is_timeout(&self) -> bool {
        matches!(self, ProtocolError::Timeout)
    }
}

impl From<io::Error> for ProtocolError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => ProtocolError::Timeout,
            _ => ProtocolError::Io(err),
        }
    }
}

/// A fit-function expression that failed to parse.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} at offset {position}")]
pub struct CurveError {
    pub message: String,
    pub position: usize,
}

impl CurveError {
    pub(crate) fn new(message: impl Into<String>, position: usize) -> Self {
        Self {
            message: message.into(),
            position,
        }
    }
}

/// Startup configuration failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Loading or deserializing the configuration sources failed.
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    /// A setting is outside its valid range.
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },

    /// The fit function does not parse.
    #[error("invalid fit function {expression:?}: {source}")]
    FitFunction {
        expression: String,
        #[source]
        source: CurveError,
    },
}
