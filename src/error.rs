//! Error types for Prism Studio

use thiserror::Error;

/// Result type alias for Prism operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the voice pipeline
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Audio device or stream error
    #[error("audio error: {0}")]
    Audio(String),

    /// PCM or transport-text codec error
    #[error("codec error: {0}")]
    Codec(String),

    /// Live session lifecycle error
    #[error("session error: {0}")]
    Session(String),

    /// Remote transport error
    #[error("transport error: {0}")]
    Transport(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}
