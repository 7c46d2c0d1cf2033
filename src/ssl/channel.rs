//! Shared algorithm of the directional SSL channels
//!
//! [`ChannelSkeleton`] runs the engine in one [`Direction`] and interprets
//! the result the same way for both channels.

use super::engine::{Engine, EngineResult, HandshakeStatus, Status};
use super::manager::EngineManager;
use crate::error::{Result, SslError};
use crate::io::{IoBuffer, IoStateCell};
use std::fmt;
use tracing::debug;

/// Which way a channel drives the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Plaintext to wire bytes
    Wrap,
    /// Wire bytes to plaintext
    Unwrap,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Wrap => f.write_str("wrap"),
            Direction::Unwrap => f.write_str("unwrap"),
        }
    }
}

/// What the channel should do after an engine call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Keep going in this direction
    Continue,
    /// The engine wants to send; the writable side must run
    NeedWrap,
    /// The engine wants bytes from the peer
    NeedUnwrap,
    /// A delegated task batch is running elsewhere
    TasksPending,
    /// A delegated task batch ran to completion during the call
    TasksDone,
    /// The engine closed this direction
    Closed,
}

#[derive(Debug, Clone)]
pub(crate) struct ChannelSkeleton {
    direction: Direction,
    outbound: IoStateCell,
}

impl ChannelSkeleton {
    pub(crate) fn new(direction: Direction, outbound: IoStateCell) -> Self {
        ChannelSkeleton {
            direction,
            outbound,
        }
    }

    /// Run the engine in this channel's direction
    pub(crate) fn run_engine<E: Engine>(
        &self,
        manager: &mut EngineManager<E>,
        src: &[u8],
        dst: &mut [u8],
    ) -> Result<EngineResult> {
        match self.direction {
            Direction::Wrap => manager.wrap(src, dst),
            Direction::Unwrap => manager.unwrap(src, dst),
        }
    }

    /// Interpret an engine result.
    ///
    /// `packet` is the packet buffer involved in the call: for an underflow
    /// on the unwrap side it tells "wait for more bytes" apart from "a record
    /// can never fit".
    pub(crate) fn handle_result<E: Engine>(
        &self,
        manager: &mut EngineManager<E>,
        result: &EngineResult,
        packet: &IoBuffer,
    ) -> Result<Flow> {
        match result.status {
            Status::Closed => {
                manager.mark_closing();
                return Ok(Flow::Closed);
            }
            Status::BufferOverflow => {
                let error = self.too_small(manager, result, packet);
                manager.mark_closing();
                return Err(error);
            }
            Status::BufferUnderflow => {
                if self.direction == Direction::Unwrap && packet.len() < packet.capacity() {
                    return Ok(Flow::NeedUnwrap);
                }
                let error = self.too_small(manager, result, packet);
                manager.mark_closing();
                return Err(error);
            }
            Status::Ok => {}
        }

        let flow = match result.handshake_status {
            HandshakeStatus::NeedTask => {
                let dispatched = manager.run_delegated_tasks()?;
                if manager.tasks_pending() {
                    Flow::TasksPending
                } else if dispatched {
                    Flow::TasksDone
                } else {
                    Flow::Continue
                }
            }
            HandshakeStatus::NeedWrap => match self.direction {
                Direction::Wrap => Flow::Continue,
                Direction::Unwrap => {
                    self.outbound.signal_interest();
                    Flow::NeedWrap
                }
            },
            HandshakeStatus::NeedUnwrap => match self.direction {
                Direction::Wrap => Flow::NeedUnwrap,
                Direction::Unwrap => Flow::Continue,
            },
            HandshakeStatus::Finished => {
                debug!(direction = %self.direction, "handshake finished");
                if self.direction == Direction::Unwrap {
                    // Writes held back by the handshake can go now.
                    self.outbound.signal_interest();
                }
                Flow::Continue
            }
            HandshakeStatus::NotHandshaking => Flow::Continue,
        };

        Ok(flow)
    }

    fn too_small<E: Engine>(
        &self,
        manager: &EngineManager<E>,
        result: &EngineResult,
        packet: &IoBuffer,
    ) -> SslError {
        debug!(direction = %self.direction, %result, ?packet, "session-sized buffer too small");
        match (self.direction, result.status) {
            (Direction::Unwrap, Status::BufferOverflow) => SslError::BufferTooSmall {
                direction: "application",
                capacity: manager.session_sizes().application_buffer_size,
            },
            _ => SslError::BufferTooSmall {
                direction: "packet",
                capacity: packet.capacity(),
            },
        }
    }
}
