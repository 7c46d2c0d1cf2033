//! ssl-channel - non-blocking TLS over raw byte channels
//!
//! This crate adapts a record-layer engine (OpenSSL by default) to
//! non-blocking readable/writable channels, keeping the engine's handshake
//! and buffer state consistent while the I/O driver polls for readiness.

pub mod error;
pub mod io;
pub mod ssl;

pub use error::{Result, SslError};
