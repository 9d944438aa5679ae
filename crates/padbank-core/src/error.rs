//! Error types
//!
//! Real-time code never propagates these upward mid-cycle: codec and
//! capacity errors are counted and logged at the call site, load errors
//! travel back over the worker's completion channel as a [`LoadErrorKind`].

use std::path::PathBuf;
use thiserror::Error;

/// Errors decoding or encoding atoms
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// Input ended before a complete structure could be read
    #[error("Truncated atom: needed {needed} bytes, {available} available")]
    Truncated { needed: usize, available: usize },

    /// Output buffer too small for the encoded message
    #[error("Insufficient capacity: needed {needed} bytes, {available} available")]
    Capacity { needed: usize, available: usize },

    /// The atom is not an object
    #[error("Expected an object atom, found type {found}")]
    NotAnObject { found: u32 },

    /// The atom is not an event sequence
    #[error("Expected a sequence atom, found type {found}")]
    NotASequence { found: u32 },

    /// Structurally invalid contents
    #[error("Malformed atom: {0}")]
    Malformed(&'static str),
}

/// A decoded object that isn't a valid protocol message
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("Unknown object type {0}")]
    UnknownType(u32),

    #[error("Missing property '{0}'")]
    MissingField(&'static str),

    #[error("Property '{0}' out of range")]
    OutOfRange(&'static str),

    /// The patch property isn't one this engine exposes
    #[error("Unknown pad property {0}")]
    UnknownProperty(u32),

    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Fatal errors at instantiate (missing or broken host contract)
#[derive(Debug, Error)]
pub enum InstantiateError {
    /// A required host feature was not supplied
    #[error("Missing required host feature: {0}")]
    MissingFeature(&'static str),

    /// The URID map returned 0 for a protocol URI
    #[error("Host URID map failed to map protocol URIs")]
    UnmappedUris,

    /// Sample rate is zero, negative or not finite
    #[error("Invalid sample rate: {0}")]
    InvalidSampleRate(f64),

    /// The built-in worker thread could not be started
    #[error("Failed to spawn worker thread: {0}")]
    WorkerSpawn(#[from] std::io::Error),
}

/// Failure loading a sample on the worker
#[derive(Debug, Error)]
pub enum LoadError {
    /// File could not be opened
    #[error("Failed to open sample '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Container or codec not recognised
    #[error("Unsupported sample format '{path}': {reason}")]
    UnsupportedFormat { path: PathBuf, reason: String },

    /// File decoded to zero frames
    #[error("Sample '{0}' contains no audio")]
    Empty(PathBuf),

    /// Decoding failed part way through
    #[error("Failed to decode '{path}': {reason}")]
    Decode { path: PathBuf, reason: String },

    /// The request payload wasn't a well-formed set message
    #[error("Invalid work request: {0}")]
    InvalidRequest(&'static str),
}

impl LoadError {
    /// Compact code sent back to the audio thread and on to the UI
    pub fn kind(&self) -> LoadErrorKind {
        match self {
            LoadError::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound => {
                LoadErrorKind::NotFound
            }
            LoadError::Io { .. } => LoadErrorKind::Io,
            LoadError::UnsupportedFormat { .. } => LoadErrorKind::UnsupportedFormat,
            LoadError::Empty(_) => LoadErrorKind::Empty,
            LoadError::Decode { .. } => LoadErrorKind::Decode,
            LoadError::InvalidRequest(_) => LoadErrorKind::InvalidRequest,
        }
    }
}

/// Wire-stable failure codes for deferred jobs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum LoadErrorKind {
    NotFound = 1,
    Io = 2,
    UnsupportedFormat = 3,
    Empty = 4,
    Decode = 5,
    InvalidRequest = 6,
    /// The work queue was full; the request never reached the worker
    QueueFull = 7,
}

impl LoadErrorKind {
    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(Self::NotFound),
            2 => Some(Self::Io),
            3 => Some(Self::UnsupportedFormat),
            4 => Some(Self::Empty),
            5 => Some(Self::Decode),
            6 => Some(Self::InvalidRequest),
            7 => Some(Self::QueueFull),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::NotFound => "file not found",
            Self::Io => "i/o error",
            Self::UnsupportedFormat => "unsupported format",
            Self::Empty => "empty sample",
            Self::Decode => "decode error",
            Self::InvalidRequest => "invalid request",
            Self::QueueFull => "work queue full",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_roundtrip() {
        for kind in [
            LoadErrorKind::NotFound,
            LoadErrorKind::Io,
            LoadErrorKind::UnsupportedFormat,
            LoadErrorKind::Empty,
            LoadErrorKind::Decode,
            LoadErrorKind::InvalidRequest,
            LoadErrorKind::QueueFull,
        ] {
            assert_eq!(LoadErrorKind::from_code(kind.code()), Some(kind));
        }
        assert_eq!(LoadErrorKind::from_code(0), None);
    }

    #[test]
    fn test_not_found_classification() {
        let err = LoadError::Io {
            path: PathBuf::from("/nope.wav"),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        assert_eq!(err.kind(), LoadErrorKind::NotFound);
        assert!(err.to_string().contains("/nope.wav"));
    }
}
