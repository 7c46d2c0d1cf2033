//! Engine boundary
//!
//! An [`Engine`] is the stateful cryptographic primitive that turns plaintext
//! into wire records (`wrap`) and back (`unwrap`). It performs no I/O of its
//! own; the SSL channels feed it bytes and move its output to the transport.

use crate::error::Result;
use std::fmt;

/// Outcome of a single wrap or unwrap call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// The call completed normally
    Ok,
    /// The destination buffer had no room for the output
    BufferOverflow,
    /// The source didn't hold enough bytes for a complete record
    BufferUnderflow,
    /// The engine is closed in this direction
    Closed,
}

/// Handshake progress reported alongside every engine result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeStatus {
    /// The engine has bytes to send
    NeedWrap,
    /// The engine needs bytes from the peer
    NeedUnwrap,
    /// Delegated tasks must run before the handshake can continue
    NeedTask,
    /// This call completed the handshake
    Finished,
    /// No handshake in progress
    NotHandshaking,
}

impl HandshakeStatus {
    /// Whether negotiation is still in progress
    pub fn is_handshaking(&self) -> bool {
        matches!(
            self,
            HandshakeStatus::NeedWrap | HandshakeStatus::NeedUnwrap | HandshakeStatus::NeedTask
        )
    }
}

/// Result of [`Engine::wrap`] / [`Engine::unwrap`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineResult {
    pub status: Status,
    pub handshake_status: HandshakeStatus,
    /// Bytes consumed from the source
    pub bytes_consumed: usize,
    /// Bytes written to the destination
    pub bytes_produced: usize,
}

impl EngineResult {
    pub fn new(
        status: Status,
        handshake_status: HandshakeStatus,
        bytes_consumed: usize,
        bytes_produced: usize,
    ) -> Self {
        EngineResult {
            status,
            handshake_status,
            bytes_consumed,
            bytes_produced,
        }
    }

    /// Whether the call moved any bytes
    pub fn made_progress(&self) -> bool {
        self.bytes_consumed > 0 || self.bytes_produced > 0
    }
}

impl fmt::Display for EngineResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?}/{:?} consumed={} produced={}",
            self.status, self.handshake_status, self.bytes_consumed, self.bytes_produced
        )
    }
}

/// An expensive step the engine defers out of the wrap/unwrap call path
pub type DelegatedTask = Box<dyn FnOnce() -> Result<()> + Send + 'static>;

/// Buffer sizes recommended by the negotiated session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSizes {
    /// Largest plaintext a single record can carry
    pub application_buffer_size: usize,
    /// Largest wire record, header and protection overhead included
    pub packet_buffer_size: usize,
}

/// Stateful record-layer engine.
///
/// Implementations are single-threaded state machines: the connection never
/// calls them concurrently. Only the delegated tasks they hand out may run on
/// another thread.
pub trait Engine: Send {
    /// Protect bytes from `src` into `dst`
    fn wrap(&mut self, src: &[u8], dst: &mut [u8]) -> Result<EngineResult>;

    /// Decode wire bytes from `src` into plaintext in `dst`
    fn unwrap(&mut self, src: &[u8], dst: &mut [u8]) -> Result<EngineResult>;

    /// Current handshake status, outside of any wrap/unwrap call
    fn handshake_status(&self) -> HandshakeStatus;

    /// Hand out all pending delegated tasks
    fn take_delegated_tasks(&mut self) -> Vec<DelegatedTask>;

    /// Buffer sizes for this session
    fn session_sizes(&self) -> SessionSizes;

    /// Start the closing handshake; later wraps emit close-notify
    fn close_outbound(&mut self) -> Result<()>;

    /// Whether close-notify has been fully emitted
    fn is_outbound_done(&self) -> bool;

    /// Whether the peer's close-notify has been received
    fn is_inbound_done(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handshaking_statuses() {
        assert!(HandshakeStatus::NeedTask.is_handshaking());
        assert!(HandshakeStatus::NeedUnwrap.is_handshaking());
        assert!(!HandshakeStatus::Finished.is_handshaking());
        assert!(!HandshakeStatus::NotHandshaking.is_handshaking());
    }

    #[test]
    fn test_result_progress() {
        let idle = EngineResult::new(Status::Ok, HandshakeStatus::NeedUnwrap, 0, 0);
        assert!(!idle.made_progress());
        let wrote = EngineResult::new(Status::Ok, HandshakeStatus::NotHandshaking, 4, 6);
        assert!(wrote.made_progress());
        assert_eq!(wrote.to_string(), "Ok/NotHandshaking consumed=4 produced=6");
    }
}
