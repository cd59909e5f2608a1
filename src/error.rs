//! Error types for Lattica

use thiserror::Error;

/// Main error type for Lattica operations
#[derive(Error, Debug)]
pub enum Error {
    /// Network-related errors
    #[error("Network error: {0}")]
    Network(String),

    /// Cryptographic errors
    #[error("Cryptography error: {0}")]
    Crypto(String),

    /// Wire codec errors
    #[error("Codec error: {0}")]
    Codec(String),

    /// Handshake rejected (malformed hello, self-dial, duplicate session)
    #[error("Handshake rejected: {0}")]
    Handshake(String),

    /// Frame size exceeds the transport limit
    #[error("Frame too large: {0} bytes (max: {1} bytes)")]
    FrameTooLarge(usize, usize),

    /// The overlay is shutting down
    #[error("Overlay is shutting down")]
    Shutdown,

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
