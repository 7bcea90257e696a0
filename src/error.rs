//! Error types for the field bus, the message channel and configuration.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors that can occur when sampling a block of inputs from the field device.
#[derive(Debug, Error)]
pub enum FieldSourceError {
    /// Could not establish a connection to the device.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// The transport failed while a request was in flight.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The device answered with an exception code.
    #[error("Device exception: {0}")]
    Exception(String),

    /// The read did not complete within the per-block bound.
    #[error("Read timed out after {0:?}")]
    Timeout(Duration),

    /// The device returned fewer bits than requested.
    #[error("Short read: expected {expected} inputs, got {actual}")]
    ShortRead { expected: usize, actual: usize },
}

impl From<std::io::Error> for FieldSourceError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::TimedOut => FieldSourceError::Transport(err.to_string()),
            std::io::ErrorKind::ConnectionRefused
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::NotConnected => FieldSourceError::Connection(err.to_string()),
            _ => FieldSourceError::Transport(err.to_string()),
        }
    }
}

/// Errors that can occur when handing a message to the message channel.
#[derive(Debug, Error)]
pub enum PublishError {
    /// The client is not connected to the broker; the message was dropped.
    #[error("Not connected to broker")]
    Disconnected,

    /// The client rejected the publish request.
    #[error("Publish failed: {0}")]
    Client(String),

    /// The payload could not be serialized.
    #[error("Failed to serialize payload: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The local dispatch queue is full or closed.
    #[error("Dispatch queue unavailable: {0}")]
    Queue(String),
}

/// Errors raised while loading or validating the process configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// None of the candidate configuration files exist.
    #[error("No configuration file found (looked in: {})", display_paths(.0))]
    NotFound(Vec<PathBuf>),

    /// The file exists but could not be parsed or deserialized.
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    /// The configuration parsed but holds values the bridge cannot run with.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
