//! Readiness state per I/O direction
//!
//! The enclosing I/O driver polls an [`IoState`] per direction to decide
//! whether to re-register interest. The flag is the one value in this crate
//! that crosses threads: delegated task completion flips the outbound flag
//! from `Idle` to `Interest`.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// Readiness of one I/O direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum IoState {
    /// Nothing to do, the driver may stop polling this direction
    Idle = 0,
    /// Work is pending, the driver should poll this direction again
    Interest = 1,
    /// The driver is currently operating on this direction
    Processing = 2,
    /// The direction is being torn down
    Cancelling = 3,
}

impl IoState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => IoState::Idle,
            1 => IoState::Interest,
            2 => IoState::Processing,
            _ => IoState::Cancelling,
        }
    }
}

impl fmt::Display for IoState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IoState::Idle => "idle",
            IoState::Interest => "interest",
            IoState::Processing => "processing",
            IoState::Cancelling => "cancelling",
        };
        f.write_str(name)
    }
}

/// Shared, authoritative [`IoState`] for one direction of a connection.
///
/// Clones observe and mutate the same flag.
#[derive(Debug, Clone)]
pub struct IoStateCell {
    inner: Arc<AtomicU8>,
}

impl IoStateCell {
    /// Create a new cell in the `Idle` state
    pub fn new() -> Self {
        Self::with_state(IoState::Idle)
    }

    /// Create a new cell in the given state
    pub fn with_state(state: IoState) -> Self {
        IoStateCell {
            inner: Arc::new(AtomicU8::new(state as u8)),
        }
    }

    /// Current state
    pub fn get(&self) -> IoState {
        IoState::from_u8(self.inner.load(Ordering::Acquire))
    }

    /// Overwrite the state (driver side)
    pub fn set(&self, state: IoState) {
        self.inner.store(state as u8, Ordering::Release);
    }

    /// Flip `Idle` to `Interest`.
    ///
    /// Returns true if this call performed the flip. Any other current state
    /// is left untouched.
    pub fn signal_interest(&self) -> bool {
        self.inner
            .compare_exchange(
                IoState::Idle as u8,
                IoState::Interest as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Whether two cells share the same flag
    pub fn same_as(&self, other: &IoStateCell) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Default for IoStateCell {
    fn default() -> Self {
        Self::new()
    }
}
