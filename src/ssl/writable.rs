//! Outbound SSL channel
//!
//! Wraps application bytes into wire records and moves them to the raw
//! channel without ever blocking the caller.

use super::channel::{ChannelSkeleton, Direction, Flow};
use super::engine::{Engine, EngineResult};
use super::manager::{EngineManager, EngineState};
use crate::error::{Result, SslError};
use crate::io::channel::no_progress_on_would_block;
use crate::io::{BufferState, IoBuffer, IoState, IoStateCell, WritableChannel};
use bytes::Buf;
use tracing::{debug, trace};

/// Writable side of an SSL connection
pub struct WritableSslChannel<W> {
    channel: W,
    packet: IoBuffer,
    skeleton: ChannelSkeleton,
    outbound: IoStateCell,
}

impl<W: WritableChannel> WritableSslChannel<W> {
    /// Create the channel with a packet buffer of `packet_size` bytes
    pub fn new(channel: W, packet_size: usize, outbound: IoStateCell) -> Self {
        WritableSslChannel {
            channel,
            packet: IoBuffer::with_capacity(packet_size),
            skeleton: ChannelSkeleton::new(Direction::Wrap, outbound.clone()),
            outbound,
        }
    }

    /// The raw channel
    pub fn channel(&self) -> &W {
        &self.channel
    }

    pub fn channel_mut(&mut self) -> &mut W {
        &mut self.channel
    }

    /// State of the packet buffer
    pub fn packet_state(&self) -> BufferState {
        self.packet.state()
    }

    /// Wire bytes waiting for the raw channel
    pub fn pending(&self) -> usize {
        if self.packet.is_draining() {
            self.packet.len()
        } else {
            0
        }
    }

    /// Move buffered wire bytes to the raw channel.
    ///
    /// Returns the number of bytes the raw channel accepted. A buffer that
    /// isn't draining is left alone. If the raw channel is closed the bytes
    /// stay buffered and `TransportClosed` is returned.
    pub fn flush(&mut self) -> Result<usize> {
        if !self.packet.is_draining() {
            return Ok(0);
        }
        if !self.channel.is_open() {
            return Err(SslError::TransportClosed {
                pending: self.packet.len(),
            });
        }

        let written = no_progress_on_would_block(self.channel.write(self.packet.pending()))?;
        let left = self.packet.consume(written);
        trace!(written, left, "packet bytes written");

        if left == 0 {
            self.packet.clear()?;
        }
        Ok(written)
    }

    /// Wrap and send as much of `src` as possible.
    ///
    /// Returns the number of bytes consumed from `src` (0 if no progress is
    /// possible right now). Wrapping only proceeds while the outbound
    /// [`IoState`] isn't `Idle`. A transport error hit after bytes were
    /// consumed is held back until the next call, so the returned count
    /// always matches how far `src` advanced.
    pub fn write<E: Engine, B: Buf>(
        &mut self,
        manager: &mut EngineManager<E>,
        src: &mut B,
    ) -> Result<usize> {
        if !src.has_remaining() {
            return Ok(0);
        }
        manager.check_failure()?;
        if manager.is_closing() {
            return Err(SslError::Closed);
        }

        if manager.state() == EngineState::ReadingApplicationData {
            manager.set_state(EngineState::WritingApplicationData);
        }

        self.flush()?;

        if manager.tasks_pending() {
            return Ok(0);
        }

        let before = src.remaining();
        while self.packet.can_fill()
            && self.packet.remaining_capacity() > 0
            && self.outbound.get() != IoState::Idle
            && src.has_remaining()
        {
            let result = self.wrap_into_packet(manager, src.chunk())?;
            src.advance(result.bytes_consumed);

            let flow = self.skeleton.handle_result(manager, &result, &self.packet)?;
            if let Err(error) = self.flush() {
                // Report what was consumed; the error repeats on the next call.
                if before == src.remaining() {
                    return Err(error);
                }
                debug!(%error, "deferring write error");
                break;
            }

            match flow {
                Flow::TasksDone => {}
                Flow::Continue if result.made_progress() => {}
                _ => break,
            }
        }

        let consumed = before - src.remaining();
        debug!(consumed, pending = self.pending(), "write");
        Ok(consumed)
    }

    /// Wrap with no application bytes, for handshake and close-notify records.
    ///
    /// Returns `None` if the packet buffer is still draining and the engine
    /// was not called.
    pub fn wrap_pending<E: Engine>(
        &mut self,
        manager: &mut EngineManager<E>,
    ) -> Result<Option<(EngineResult, Flow)>> {
        self.flush()?;
        if !self.packet.can_fill() || self.packet.remaining_capacity() == 0 {
            return Ok(None);
        }

        let result = self.wrap_into_packet(manager, &[])?;
        let flow = self.skeleton.handle_result(manager, &result, &self.packet)?;
        self.flush()?;
        Ok(Some((result, flow)))
    }

    fn wrap_into_packet<E: Engine>(
        &mut self,
        manager: &mut EngineManager<E>,
        src: &[u8],
    ) -> Result<EngineResult> {
        trace!(packet = ?self.packet, "wrapping bytes");
        let slot = self.packet.fill_slot();
        let outcome = self.skeleton.run_engine(manager, src, slot);
        let produced = outcome.as_ref().map(|r| r.bytes_produced).unwrap_or(0);
        self.packet.commit(produced);
        self.packet.finish_fill();
        outcome
    }
}

impl<W> std::fmt::Debug for WritableSslChannel<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WritableSslChannel")
            .field("packet", &self.packet)
            .field("outbound", &self.outbound.get())
            .finish()
    }
}
