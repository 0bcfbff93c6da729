//! Error types for the push-to-talk client

use thiserror::Error;

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while setting up or running the client
///
/// The tick loop itself never fails: network and audio hiccups are logged
/// and absorbed there. These errors surface from setup paths (config,
/// device handles, discovery daemon) only.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Audio device error
    #[error("audio error: {0}")]
    Audio(String),

    /// WebSocket transport error
    #[error("transport error: {0}")]
    Transport(String),

    /// Endpoint discovery error
    #[error("discovery error: {0}")]
    Discovery(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}
