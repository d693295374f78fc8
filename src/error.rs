// src/error.rs

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// No loader accepted the script.
    #[error("unsupported script")]
    Unsupported,

    /// The loaded player lacks the capability for this operation.
    #[error("operation is not supported")]
    NotSupported,

    #[error("not playing")]
    NotPlaying,

    /// A control command was not acknowledged by the playback task in time.
    #[error("operation timed out")]
    Timeout,

    #[error("connection failure: {0}")]
    ConnectionFailure(String),

    #[error("malformed input: {0}")]
    MalformedInput(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::MalformedInput(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
