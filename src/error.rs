//! Error types
//!
//! A single error enum covers configuration, engine and transport failures
//! for both directions of an SSL connection.

/// Result type for SSL channel operations
pub type Result<T> = std::result::Result<T, SslError>;

/// SSL channel errors
#[derive(Debug, thiserror::Error)]
pub enum SslError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("OpenSSL error: {0}")]
    OpenSsl(#[from] openssl::error::ErrorStack),

    #[error("Engine error: {0}")]
    Engine(String),

    #[error("Handshake failed: {0}")]
    Handshake(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid TLS version: {0}")]
    InvalidVersion(String),

    #[error("Certificate error: {0}")]
    Certificate(String),

    /// The engine needed more room than the session-sized buffer offers.
    #[error("{direction} buffer too small ({capacity} bytes)")]
    BufferTooSmall {
        direction: &'static str,
        capacity: usize,
    },

    #[error("Buffer cleared with {pending} bytes still pending")]
    BufferNotDrained { pending: usize },

    /// The raw channel went away. Buffered bytes are kept, not discarded.
    #[error("Transport closed with {pending} bytes buffered")]
    TransportClosed { pending: usize },

    #[error("Delegated task failed: {0}")]
    DelegatedTask(String),

    #[error("Connection closed")]
    Closed,
}

impl SslError {
    /// Returns true for the expected, clean end of a connection.
    pub fn is_closed(&self) -> bool {
        matches!(self, SslError::Closed)
    }

    /// Returns true when the connection can't be used after this error.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, SslError::Closed | SslError::TransportClosed { .. })
    }
}
