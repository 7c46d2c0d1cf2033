//! OpenSSL-backed engine
//!
//! Drives an `openssl::ssl::SslStream` over an in-memory duplex so that
//! OpenSSL never touches a socket. Ciphertext written by OpenSSL queues in
//! `outgoing` until a wrap copies it out; ciphertext handed to unwrap queues
//! in `incoming` until OpenSSL reads it, so partial records never surface as
//! an underflow.

use super::engine::{
    DelegatedTask, Engine, EngineResult, HandshakeStatus, SessionSizes, Status,
};
use super::session::SessionInfo;
use crate::error::{Result, SslError};
use bytes::{Buf, BytesMut};
use openssl::ssl::{self, ErrorCode, Ssl, SslStream};
use std::io::{self, Read, Write};
use tracing::{debug, warn};

/// Largest plaintext fragment carried by one TLS record
pub const MAX_FRAGMENT: usize = 16_384;

/// Largest TLS record on the wire, header and protection overhead included
pub const PACKET_BUFFER_SIZE: usize = 16_709;

const RECORD_OVERHEAD: usize = PACKET_BUFFER_SIZE - MAX_FRAGMENT;

#[derive(Debug, Default)]
struct MemoryIo {
    incoming: BytesMut,
    outgoing: BytesMut,
}

impl Read for MemoryIo {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.incoming.is_empty() {
            return Err(io::ErrorKind::WouldBlock.into());
        }
        let n = buf.len().min(self.incoming.len());
        buf[..n].copy_from_slice(&self.incoming[..n]);
        self.incoming.advance(n);
        Ok(n)
    }
}

impl Write for MemoryIo {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.outgoing.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn would_block(error: &ssl::Error) -> bool {
    matches!(error.code(), ErrorCode::WANT_READ | ErrorCode::WANT_WRITE)
}

/// [`Engine`] implementation on top of OpenSSL
pub struct OpenSslEngine {
    stream: SslStream<MemoryIo>,
    client: bool,
    handshaking: bool,
    /// Handshake completed, `Finished` not yet reported
    finished_pending: bool,
    outbound_closed: bool,
    inbound_done: bool,
    session: Option<SessionInfo>,
}

impl OpenSslEngine {
    /// Client-side engine
    pub fn client(ssl: Ssl) -> Result<Self> {
        Self::new(ssl, true)
    }

    /// Server-side engine
    pub fn server(ssl: Ssl) -> Result<Self> {
        Self::new(ssl, false)
    }

    fn new(mut ssl: Ssl, client: bool) -> Result<Self> {
        if client {
            ssl.set_connect_state();
        } else {
            ssl.set_accept_state();
        }
        let stream = SslStream::new(ssl, MemoryIo::default())?;

        let mut engine = OpenSslEngine {
            stream,
            client,
            handshaking: true,
            finished_pending: false,
            outbound_closed: false,
            inbound_done: false,
            session: None,
        };
        if client {
            // Queue the ClientHello so the first status is NeedWrap.
            engine.advance_handshake()?;
        }
        Ok(engine)
    }

    pub fn is_client(&self) -> bool {
        self.client
    }

    /// Session details, once the handshake has completed
    pub fn session(&self) -> Option<&SessionInfo> {
        self.session.as_ref()
    }

    /// The underlying OpenSSL connection
    pub fn ssl(&self) -> &ssl::SslRef {
        self.stream.ssl()
    }

    fn outgoing_len(&self) -> usize {
        self.stream.get_ref().outgoing.len()
    }

    fn advance_handshake(&mut self) -> Result<()> {
        match self.stream.do_handshake() {
            Ok(()) => {
                self.handshaking = false;
                self.finished_pending = true;
                let session = SessionInfo::from_ssl(self.stream.ssl());
                debug!(
                    client = self.client,
                    version = %session.version,
                    cipher = %session.cipher,
                    "tls handshake complete"
                );
                self.session = Some(session);
                Ok(())
            }
            Err(e) if would_block(&e) => Ok(()),
            Err(e) => {
                warn!(client = self.client, error = %e, "tls handshake failed");
                Err(SslError::Handshake(e.to_string()))
            }
        }
    }

    fn drain_outgoing(&mut self, dst: &mut [u8]) -> usize {
        let outgoing = &mut self.stream.get_mut().outgoing;
        let n = dst.len().min(outgoing.len());
        dst[..n].copy_from_slice(&outgoing[..n]);
        outgoing.advance(n);
        n
    }

    /// Status to report from a wrap/unwrap, consuming a pending `Finished`
    fn reported_status(&mut self) -> HandshakeStatus {
        if self.finished_pending && self.outgoing_len() == 0 {
            self.finished_pending = false;
            return HandshakeStatus::Finished;
        }
        self.handshake_status()
    }
}

impl Engine for OpenSslEngine {
    fn wrap(&mut self, src: &[u8], dst: &mut [u8]) -> Result<EngineResult> {
        if self.handshaking {
            self.advance_handshake()?;
        }

        let mut consumed = 0;
        if !self.handshaking && !self.outbound_closed && !src.is_empty() && self.outgoing_len() == 0 {
            let room = dst.len().saturating_sub(RECORD_OVERHEAD);
            let chunk = src.len().min(MAX_FRAGMENT).min(room);
            if chunk == 0 {
                let status = self.handshake_status();
                return Ok(EngineResult::new(Status::BufferOverflow, status, 0, 0));
            }
            match self.stream.ssl_write(&src[..chunk]) {
                Ok(n) => consumed = n,
                Err(e) if would_block(&e) => {}
                Err(e) if e.code() == ErrorCode::ZERO_RETURN => self.inbound_done = true,
                Err(e) => return Err(SslError::Engine(e.to_string())),
            }
        }

        let produced = self.drain_outgoing(dst);
        let status = if produced == 0 && self.outgoing_len() > 0 {
            Status::BufferOverflow
        } else if self.outbound_closed && self.outgoing_len() == 0 {
            Status::Closed
        } else {
            Status::Ok
        };

        Ok(EngineResult::new(status, self.reported_status(), consumed, produced))
    }

    fn unwrap(&mut self, src: &[u8], dst: &mut [u8]) -> Result<EngineResult> {
        self.stream.get_mut().incoming.extend_from_slice(src);
        let consumed = src.len();

        if self.handshaking {
            self.advance_handshake()?;
        }

        let mut produced = 0;
        if !self.handshaking && !self.inbound_done {
            if dst.is_empty() {
                if self.stream.ssl().pending() > 0 {
                    let status = self.handshake_status();
                    return Ok(EngineResult::new(Status::BufferOverflow, status, consumed, 0));
                }
            } else {
                match self.stream.ssl_read(dst) {
                    Ok(n) => produced = n,
                    Err(e) if would_block(&e) => {}
                    Err(e) if e.code() == ErrorCode::ZERO_RETURN => {
                        debug!(client = self.client, "close-notify received");
                        self.inbound_done = true;
                    }
                    Err(e) => return Err(SslError::Engine(e.to_string())),
                }
            }
        }

        let status = if self.inbound_done && produced == 0 {
            Status::Closed
        } else {
            Status::Ok
        };

        Ok(EngineResult::new(status, self.reported_status(), consumed, produced))
    }

    fn handshake_status(&self) -> HandshakeStatus {
        if self.handshaking {
            if self.outgoing_len() > 0 {
                HandshakeStatus::NeedWrap
            } else {
                HandshakeStatus::NeedUnwrap
            }
        } else if self.finished_pending && self.outgoing_len() > 0 {
            HandshakeStatus::NeedWrap
        } else {
            HandshakeStatus::NotHandshaking
        }
    }

    fn take_delegated_tasks(&mut self) -> Vec<DelegatedTask> {
        // OpenSSL completes every handshake step inline.
        Vec::new()
    }

    fn session_sizes(&self) -> SessionSizes {
        SessionSizes {
            application_buffer_size: MAX_FRAGMENT,
            packet_buffer_size: PACKET_BUFFER_SIZE,
        }
    }

    fn close_outbound(&mut self) -> Result<()> {
        if self.outbound_closed {
            return Ok(());
        }
        self.outbound_closed = true;
        if self.handshaking {
            return Ok(());
        }
        match self.stream.shutdown() {
            Ok(_) => Ok(()),
            Err(e) if would_block(&e) => Ok(()),
            Err(e) => Err(SslError::Engine(e.to_string())),
        }
    }

    fn is_outbound_done(&self) -> bool {
        self.outbound_closed && self.outgoing_len() == 0
    }

    fn is_inbound_done(&self) -> bool {
        self.inbound_done
    }
}

impl std::fmt::Debug for OpenSslEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenSslEngine")
            .field("client", &self.client)
            .field("handshaking", &self.handshaking)
            .field("outbound_closed", &self.outbound_closed)
            .field("inbound_done", &self.inbound_done)
            .finish()
    }
}
