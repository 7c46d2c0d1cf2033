//! Transport-neutral I/O plumbing
//!
//! - [`IoState`] / [`IoStateCell`]: per-direction readiness polled by the driver
//! - [`IoBuffer`] / [`BufferState`]: fixed-capacity buffers with a fill/drain state
//! - [`ReadableChannel`] / [`WritableChannel`]: the raw, non-blocking byte channel
//!   an SSL connection runs over, with a TCP implementation

pub mod buffer;
pub mod channel;
pub mod state;

pub use buffer::{BufferState, IoBuffer};
pub use channel::{poll_fd, PollEvents, ReadableChannel, TcpChannel, WritableChannel};
pub use state::{IoState, IoStateCell};
