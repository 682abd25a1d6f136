// Error handling for the playback session controller

use std::fmt;

/// Playback controller error types
#[derive(Debug, Clone, PartialEq)]
pub enum AudioError {
    /// Binding a media reference to an engine instance failed.
    /// Fatal for the `set_source` call that raised it; the session stays usable.
    SourceUnavailable(String),

    /// Error raised by the engine while loading or playing
    EngineError { code: i32, extra: i32 },

    /// An engine operation was rejected by the platform
    Engine(String),

    /// A command argument was out of its domain (NaN volume, unknown release mode)
    InvalidArgument(String),

    /// Output device error (hardware issues)
    Device(String),

    /// Decoding error
    Decoding(String),

    /// IO error
    Io(String),

    /// Generic error
    Other(String),
}

impl fmt::Display for AudioError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AudioError::SourceUnavailable(msg) => write!(f, "Unable to access resource: {}", msg),
            AudioError::EngineError { code, extra } => {
                write!(f, "Engine error {} ({}), extra {}", code, describe_error(*code), extra)
            }
            AudioError::Engine(msg) => write!(f, "Engine operation failed: {}", msg),
            AudioError::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            AudioError::Device(msg) => write!(f, "Device error: {}", msg),
            AudioError::Decoding(msg) => write!(f, "Decoding error: {}", msg),
            AudioError::Io(msg) => write!(f, "IO error: {}", msg),
            AudioError::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for AudioError {}

/// Result type alias for controller operations
pub type Result<T> = std::result::Result<T, AudioError>;

impl From<std::io::Error> for AudioError {
    fn from(err: std::io::Error) -> Self {
        AudioError::Io(err.to_string())
    }
}

// Engine error codes, numerically compatible with the platform media player
pub const ERROR_UNKNOWN: i32 = 1;
pub const ERROR_SERVER_DIED: i32 = 100;
pub const ERROR_IO: i32 = -1004;
pub const ERROR_MALFORMED: i32 = -1007;
pub const ERROR_UNSUPPORTED: i32 = -1010;
pub const ERROR_TIMED_OUT: i32 = -110;

/// Human readable name for an engine error code
pub fn describe_error(code: i32) -> &'static str {
    match code {
        ERROR_UNKNOWN => "MEDIA_ERROR_UNKNOWN",
        ERROR_SERVER_DIED => "MEDIA_ERROR_SERVER_DIED",
        ERROR_IO => "MEDIA_ERROR_IO",
        ERROR_MALFORMED => "MEDIA_ERROR_MALFORMED",
        ERROR_UNSUPPORTED => "MEDIA_ERROR_UNSUPPORTED",
        ERROR_TIMED_OUT => "MEDIA_ERROR_TIMED_OUT",
        _ => "MEDIA_ERROR_UNRECOGNIZED",
    }
}
