//! Error types for ying.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum YingError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Process spawn failed: {0}")]
    ProcessSpawnFailed(String),

    #[error("PTY error: {0}")]
    PtyError(String),

    #[error("Invalid bucket URI: {0}")]
    InvalidBucketUri(String),

    #[error("Unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("{engine} backend returned no result for {bucket}")]
    NoResult { engine: String, bucket: String },

    #[error("Command '{program}' failed: {message}")]
    CommandFailed { program: String, message: String },

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Object listing failed: {0}")]
    ObjectStore(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Failures reported by a chat relay.
///
/// `NotConfigured` is fatal for the invocation; everything else is logged
/// and treated as a missed update.
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("{0} is not configured, please add it")]
    NotConfigured(&'static str),

    #[error("relay request failed: {0}")]
    Transport(String),

    #[error("relay API rejected request ({status}): {description}")]
    Api { status: u16, description: String },
}

impl From<RelayError> for YingError {
    fn from(e: RelayError) -> Self {
        match e {
            RelayError::NotConfigured(what) => {
                YingError::Config(format!("{what} is not configured, please add it"))
            }
            other => YingError::Http(other.to_string()),
        }
    }
}
