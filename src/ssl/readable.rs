//! Inbound SSL channel
//!
//! Pulls wire bytes from the raw channel into the packet buffer, unwraps them
//! into the application buffer and hands plaintext to the caller.

use super::channel::{ChannelSkeleton, Direction, Flow};
use super::engine::{Engine, EngineResult};
use super::manager::{EngineManager, EngineState};
use crate::error::{Result, SslError};
use crate::io::channel::no_progress_on_would_block;
use crate::io::{BufferState, IoBuffer, IoStateCell, ReadableChannel};
use bytes::BufMut;
use tracing::{debug, trace};

/// Readable side of an SSL connection
pub struct ReadableSslChannel<R> {
    channel: R,
    packet: IoBuffer,
    application: IoBuffer,
    skeleton: ChannelSkeleton,
}

impl<R: ReadableChannel> ReadableSslChannel<R> {
    /// Create the channel with session-sized packet and application buffers
    pub fn new(
        channel: R,
        packet_size: usize,
        application_size: usize,
        outbound: IoStateCell,
    ) -> Self {
        ReadableSslChannel {
            channel,
            packet: IoBuffer::with_capacity(packet_size),
            application: IoBuffer::with_capacity(application_size),
            skeleton: ChannelSkeleton::new(Direction::Unwrap, outbound),
        }
    }

    /// The raw channel
    pub fn channel(&self) -> &R {
        &self.channel
    }

    pub fn channel_mut(&mut self) -> &mut R {
        &mut self.channel
    }

    /// State of the packet buffer
    pub fn packet_state(&self) -> BufferState {
        self.packet.state()
    }

    /// Plaintext decrypted but not yet handed to the caller
    pub fn buffered(&self) -> usize {
        self.application.len()
    }

    /// Read decrypted bytes into `dst`.
    ///
    /// Returns the number of plaintext bytes produced, 0 if none are
    /// available yet. Once the connection is closing (peer close-notify, a
    /// fatal error or a local close) and no plaintext is left, `Closed` is
    /// returned.
    pub fn read<E: Engine, B: BufMut>(
        &mut self,
        manager: &mut EngineManager<E>,
        dst: &mut B,
    ) -> Result<usize> {
        if !dst.has_remaining_mut() {
            return Ok(0);
        }
        manager.check_failure()?;

        if manager.state() == EngineState::WritingApplicationData {
            manager.set_state(EngineState::ReadingApplicationData);
        }

        let mut total = self.drain_application(dst)?;
        if manager.is_closing() {
            return if total > 0 { Ok(total) } else { Err(SslError::Closed) };
        }
        if !dst.has_remaining_mut() || manager.tasks_pending() {
            return Ok(total);
        }

        loop {
            if manager.engine().is_inbound_done() {
                break;
            }

            let (result, flow) = self.unwrap_packet(manager)?;
            total += self.drain_application(dst)?;

            match flow {
                Flow::Closed | Flow::TasksPending | Flow::NeedWrap => break,
                Flow::Continue | Flow::NeedUnwrap | Flow::TasksDone => {}
            }
            if !dst.has_remaining_mut() {
                break;
            }
            if result.made_progress() || flow == Flow::TasksDone {
                continue;
            }
            match self.fill() {
                Ok(0) => break,
                Ok(_) => {}
                // Hand over what was decrypted; the error repeats on the next call.
                Err(error) if total > 0 => {
                    debug!(%error, total, "deferring read error");
                    break;
                }
                Err(error) => return Err(error),
            }
        }

        if total == 0 && manager.engine().is_inbound_done() && self.application.is_empty() {
            manager.mark_closing();
            return Err(SslError::Closed);
        }

        debug!(total, buffered = self.buffered(), "read");
        Ok(total)
    }

    /// Advance a handshake that is waiting for the peer.
    ///
    /// Returns true if any bytes moved. Plaintext that arrives with the
    /// final handshake flight stays buffered for the next read.
    pub fn unwrap_handshake<E: Engine>(&mut self, manager: &mut EngineManager<E>) -> Result<bool> {
        if !self.application.is_empty() {
            return Ok(false);
        }
        let (result, flow) = self.unwrap_packet(manager)?;
        if result.made_progress() || matches!(flow, Flow::NeedWrap | Flow::TasksDone) {
            return Ok(true);
        }
        if self.fill()? == 0 {
            return Ok(false);
        }
        let (result, _) = self.unwrap_packet(manager)?;
        Ok(result.made_progress())
    }

    /// Pull wire bytes from the raw channel into the packet buffer
    fn fill(&mut self) -> Result<usize> {
        if !self.channel.is_open() {
            return Err(SslError::TransportClosed {
                pending: self.packet.len(),
            });
        }

        let slot = self.packet.fill_slot();
        if slot.is_empty() {
            self.packet.finish_fill();
            return Err(SslError::BufferTooSmall {
                direction: "packet",
                capacity: self.packet.capacity(),
            });
        }

        let outcome = no_progress_on_would_block(self.channel.read(slot));
        let read = *outcome.as_ref().unwrap_or(&0);
        self.packet.commit(read);
        self.packet.finish_fill();
        outcome?;

        trace!(read, pending = self.packet.len(), "packet bytes read");
        if read == 0 && !self.channel.is_open() {
            return Err(SslError::TransportClosed {
                pending: self.packet.len(),
            });
        }
        Ok(read)
    }

    /// Run the engine over the buffered wire bytes
    fn unwrap_packet<E: Engine>(
        &mut self,
        manager: &mut EngineManager<E>,
    ) -> Result<(EngineResult, Flow)> {
        trace!(packet = ?self.packet, "unwrapping bytes");
        let src = self.packet.pending();
        let dst = self.application.fill_slot();
        let outcome = self.skeleton.run_engine(manager, src, dst);

        let (consumed, produced) = outcome
            .as_ref()
            .map(|r| (r.bytes_consumed, r.bytes_produced))
            .unwrap_or((0, 0));
        self.application.commit(produced);
        self.application.finish_fill();
        if self.packet.consume(consumed) == 0 {
            self.packet.clear()?;
        }

        let result = outcome?;
        let flow = self.skeleton.handle_result(manager, &result, &self.packet)?;
        Ok((result, flow))
    }

    fn drain_application<B: BufMut>(&mut self, dst: &mut B) -> Result<usize> {
        if !self.application.is_draining() {
            return Ok(0);
        }
        let n = self.application.len().min(dst.remaining_mut());
        dst.put_slice(&self.application.pending()[..n]);
        if self.application.consume(n) == 0 {
            self.application.clear()?;
        }
        Ok(n)
    }
}

impl<R> std::fmt::Debug for ReadableSslChannel<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadableSslChannel")
            .field("packet", &self.packet)
            .field("application", &self.application)
            .finish()
    }
}
