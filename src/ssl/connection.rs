//! SSL connection
//!
//! [`SslConnection`] ties together the raw channel pair, the
//! [`EngineManager`] and both directional channels. It sizes every buffer
//! from the engine session and exposes the non-blocking surface the I/O
//! driver uses: `read`, `write`, `flush`, `handshake`, `close`, and the two
//! readiness flags.

use super::engine::{Engine, HandshakeStatus, SessionSizes};
use super::manager::{EngineManager, EngineState};
use super::readable::ReadableSslChannel;
use super::tasks::TaskRunner;
use super::writable::WritableSslChannel;
use crate::error::{Result, SslError};
use crate::io::{IoStateCell, ReadableChannel, TcpChannel, WritableChannel};
use bytes::{Buf, BufMut};
use std::net::TcpStream;
use std::sync::Arc;
use tracing::debug;

/// Progress of [`SslConnection::handshake`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeProgress {
    /// Negotiation is over and every handshake byte has been sent
    Complete,
    /// More I/O (or a delegated task batch) is needed; call again later
    Pending,
}

/// SSL connection over a raw channel pair
pub struct SslConnection<E, R, W> {
    manager: EngineManager<E>,
    readable: ReadableSslChannel<R>,
    writable: WritableSslChannel<W>,
    inbound: IoStateCell,
    outbound: IoStateCell,
}

impl<E, R, W> SslConnection<E, R, W>
where
    E: Engine,
    R: ReadableChannel,
    W: WritableChannel,
{
    /// Create a connection, sizing both channels' buffers from the engine session
    pub fn new(engine: E, reader: R, writer: W, runner: Arc<dyn TaskRunner>) -> Self {
        let inbound = IoStateCell::new();
        let outbound = IoStateCell::new();
        let manager = EngineManager::new(engine, runner, outbound.clone());
        let sizes = manager.session_sizes();

        debug!(
            packet = sizes.packet_buffer_size,
            application = sizes.application_buffer_size,
            state = %manager.state(),
            "ssl connection created"
        );

        SslConnection {
            readable: ReadableSslChannel::new(
                reader,
                sizes.packet_buffer_size,
                sizes.application_buffer_size,
                outbound.clone(),
            ),
            writable: WritableSslChannel::new(writer, sizes.packet_buffer_size, outbound.clone()),
            manager,
            inbound,
            outbound,
        }
    }

    /// Encrypt and send bytes from `src`; returns the bytes consumed
    pub fn write<B: Buf>(&mut self, src: &mut B) -> Result<usize> {
        self.writable.write(&mut self.manager, src)
    }

    /// Receive and decrypt bytes into `dst`; returns the bytes produced
    pub fn read<B: BufMut>(&mut self, dst: &mut B) -> Result<usize> {
        self.readable.read(&mut self.manager, dst)
    }

    /// Push buffered wire bytes to the raw channel
    pub fn flush(&mut self) -> Result<usize> {
        self.writable.flush()
    }

    /// Drive the handshake as far as the raw channels allow without blocking
    pub fn handshake(&mut self) -> Result<HandshakeProgress> {
        loop {
            self.manager.check_failure()?;
            if self.manager.is_closing() {
                return Err(SslError::Closed);
            }
            if self.manager.tasks_pending() {
                return Ok(HandshakeProgress::Pending);
            }

            match self.manager.handshake_status() {
                HandshakeStatus::NeedWrap => match self.writable.wrap_pending(&mut self.manager)? {
                    Some((result, _)) if result.made_progress() && self.writable.pending() == 0 => {}
                    _ => return Ok(HandshakeProgress::Pending),
                },
                HandshakeStatus::NeedUnwrap => {
                    if self.writable.pending() > 0 {
                        self.writable.flush()?;
                    }
                    if !self.readable.unwrap_handshake(&mut self.manager)? {
                        return Ok(HandshakeProgress::Pending);
                    }
                }
                HandshakeStatus::NeedTask => {
                    if !self.manager.run_delegated_tasks()? {
                        return Ok(HandshakeProgress::Pending);
                    }
                }
                HandshakeStatus::Finished | HandshakeStatus::NotHandshaking => {
                    if self.manager.state() == EngineState::Handshaking {
                        self.manager.set_state(EngineState::WritingApplicationData);
                    }
                    self.writable.flush()?;
                    return Ok(if self.writable.pending() == 0 {
                        HandshakeProgress::Complete
                    } else {
                        HandshakeProgress::Pending
                    });
                }
            }
        }
    }

    /// Send close-notify.
    ///
    /// Returns true once the close-notify record has fully reached the raw
    /// channel; call again while it returns false. This also answers a
    /// peer's close-notify and works after a fatal error.
    pub fn close(&mut self) -> Result<bool> {
        if !self.manager.engine().is_outbound_done() {
            debug!(state = %self.manager.state(), "closing ssl connection");
            self.manager.close_outbound()?;
        }
        while !self.manager.engine().is_outbound_done() {
            match self.writable.wrap_pending(&mut self.manager)? {
                Some((result, _)) if result.made_progress() => {}
                _ => break,
            }
        }
        self.writable.flush()?;
        Ok(self.manager.engine().is_outbound_done() && self.writable.pending() == 0)
    }

    pub fn state(&self) -> EngineState {
        self.manager.state()
    }

    pub fn is_closed(&self) -> bool {
        self.manager.is_closing()
    }

    pub fn is_handshaking(&self) -> bool {
        self.manager.state() == EngineState::Handshaking
    }

    /// Readiness flag for the inbound direction
    pub fn inbound_state(&self) -> &IoStateCell {
        &self.inbound
    }

    /// Readiness flag for the outbound direction
    pub fn outbound_state(&self) -> &IoStateCell {
        &self.outbound
    }

    pub fn session_sizes(&self) -> SessionSizes {
        self.manager.session_sizes()
    }

    pub fn engine(&self) -> &E {
        self.manager.engine()
    }

    pub fn manager(&self) -> &EngineManager<E> {
        &self.manager
    }

    pub fn readable(&self) -> &ReadableSslChannel<R> {
        &self.readable
    }

    pub fn writable(&self) -> &WritableSslChannel<W> {
        &self.writable
    }

    pub fn writable_mut(&mut self) -> &mut WritableSslChannel<W> {
        &mut self.writable
    }

    pub fn readable_mut(&mut self) -> &mut ReadableSslChannel<R> {
        &mut self.readable
    }
}

impl<E: Engine> SslConnection<E, TcpChannel, TcpChannel> {
    /// Create a connection over a TCP stream, switched to non-blocking mode
    pub fn from_tcp(stream: TcpStream, engine: E, runner: Arc<dyn TaskRunner>) -> Result<Self> {
        let (reader, writer) = TcpChannel::new(stream)?.split()?;
        Ok(Self::new(engine, reader, writer, runner))
    }
}

impl<E, R, W> std::fmt::Debug for SslConnection<E, R, W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SslConnection")
            .field("manager", &self.manager)
            .field("readable", &self.readable)
            .field("writable", &self.writable)
            .field("inbound", &self.inbound.get())
            .field("outbound", &self.outbound.get())
            .finish()
    }
}
