//! Error types for the avatar speech pipeline

use thiserror::Error;

/// Result type alias for avatar speech operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the avatar speech pipeline
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Speech synthesis backend error (network, non-2xx, bad payload)
    #[error("synthesis error: {0}")]
    Synthesis(String),

    /// Audio decoding or output device error
    #[error("audio error: {0}")]
    Audio(String),

    /// Viewer playback surface error
    #[error("viewer error: {0}")]
    Viewer(String),

    /// Upstream chat stream failed mid-turn
    #[error("stream error: {0}")]
    Stream(String),

    /// Chat completion request error
    #[error("chat error: {0}")]
    Chat(String),

    /// A pipeline queue was closed before the item could be queued
    #[error("queue closed: {0}")]
    QueueClosed(String),

    /// Resource not found
    #[error("not found: {0}")]
    NotFound(String),

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
