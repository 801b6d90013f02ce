use thiserror::Error;

/// Top-level error type for wamedia.
#[derive(Debug, Error)]
pub enum WamediaError {
    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Webhook payload could not be understood.
    #[error("payload error: {0}")]
    Payload(String),

    /// Downloading media bytes failed or returned something that is not media.
    #[error("fetch error: {0}")]
    Fetch(String),

    /// Object storage error (local filesystem or S3-compatible).
    #[error("storage error: {0}")]
    Storage(String),

    /// Message record store error.
    #[error("memory error: {0}")]
    Memory(String),

    /// Evolution API request failed.
    #[error("evolution api error: {0}")]
    Evolution(String),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
