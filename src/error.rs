//! Error types for the narrator

use thiserror::Error;

/// Result type alias for narrator operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while synthesizing or playing narration
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Audio device or decoding error
    #[error("audio error: {0}")]
    Audio(String),

    /// System-native voice error
    #[error("speech error: {0}")]
    Speech(String),

    /// Synthesis backend could not be reached
    #[error("synthesis backend unreachable: {0}")]
    BackendUnreachable(String),

    /// Synthesis backend answered with a non-success status
    #[error("synthesis backend error {status}: {body}")]
    BackendError {
        /// HTTP status code
        status: u16,
        /// Response body, if any
        body: String,
    },

    /// Audio buffers cannot be spliced together
    #[error("incompatible audio format: {0}")]
    IncompatibleFormat(String),

    /// The host environment driving synthesis has been torn down
    #[error("host context invalidated")]
    HostContextInvalidated,

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// Whether this error means the whole session is gone rather than one entry
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::HostContextInvalidated)
    }
}
