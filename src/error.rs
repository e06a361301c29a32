//! Error types for the synchronized playback stack

use thiserror::Error;

/// Main error type for the application
#[derive(Error, Debug)]
pub enum Error {
    #[error("Playback error: {0}")]
    Playback(#[from] PlaybackError),

    #[error("Time sync error: {0}")]
    Sync(#[from] SyncError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Playback subsystem errors
#[derive(Error, Debug)]
pub enum PlaybackError {
    #[error("Failed to open source {name}: {reason}")]
    SourceOpen { name: String, reason: String },

    #[error("Output device not found: {0}")]
    DeviceNotFound(String),

    #[error("Failed to open output stream: {0}")]
    StreamError(String),
}

/// Time synchronization errors
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("No probes completed in sync run")]
    NoProbes,
}

/// Network errors at the transport boundary
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Failed to send to {failed} of {total} clients")]
    PartialDelivery { failed: usize, total: usize },

    #[error("Invalid message format: {0}")]
    InvalidMessage(String),

    #[error("Client not found: {0}")]
    ClientNotFound(usize),
}

/// Result type alias for the application
pub type Result<T> = std::result::Result<T, Error>;
