//! Bridge error types.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failures of the connection to the decision process.
///
/// These never reach a call-site: the bridge logs them and lets the
/// operation through.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Socket creation or connect failed
    #[error("connect to {path} failed: {source}")]
    Connect {
        /// Socket path that was tried
        path: PathBuf,
        /// Underlying error
        #[source]
        source: io::Error,
    },
    /// Writing the request frame failed
    #[error("write failed: {0}")]
    Send(#[source] io::Error),
    /// Reading the reply frame failed
    #[error("read failed: {0}")]
    Receive(#[source] io::Error),
    /// The decision process closed the stream before replying
    #[error("connection closed by decision process")]
    Closed,
}

/// Errors loading bridge configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Mode name is neither `gate` nor `audit`
    #[error("unknown mode: {0}")]
    UnknownMode(String),
    /// Config file could not be read
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    /// Config file is not valid JSON
    #[error("invalid config: {0}")]
    Json(#[from] serde_json::Error),
}
