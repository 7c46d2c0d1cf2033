//! Non-blocking TLS record layer
//!
//! This module adapts a stateful record-layer [`Engine`] to a pair of raw,
//! non-blocking byte channels. Nothing here blocks or sleeps: every call
//! either moves bytes or reports that no progress is possible yet, and the
//! per-direction [`IoStateCell`](crate::io::IoStateCell) tells the I/O driver
//! when to come back.
//!
//! # Architecture
//!
//! 1. [`EngineManager`] owns the engine and the connection's [`EngineState`]
//! 2. [`WritableSslChannel`] wraps plaintext into the packet buffer and flushes it
//! 3. [`ReadableSslChannel`] fills the packet buffer and unwraps it into plaintext
//! 4. [`SslConnection`] sizes the buffers and drives the handshake
//!
//! Delegated engine tasks run on a [`TaskRunner`]; completing a batch flips
//! the outbound readiness flag from `Idle` to `Interest`.
//!
//! # Examples
//!
//! ```no_run
//! use ssl_channel::io::{IoState, PollEvents};
//! use ssl_channel::ssl::{HandshakeProgress, InlineTaskRunner, TlsConfig, TlsVersion};
//! use std::net::TcpStream;
//! use std::sync::Arc;
//!
//! let config = TlsConfig::client()
//!     .unwrap()
//!     .version(TlsVersion::Tls13)
//!     .unwrap()
//!     .servername("example.com")
//!     .build()
//!     .unwrap();
//!
//! let stream = TcpStream::connect("example.com:443").unwrap();
//! let mut conn = config.connect(stream, Arc::new(InlineTaskRunner)).unwrap();
//!
//! while conn.handshake().unwrap() == HandshakeProgress::Pending {
//!     conn.readable().channel().poll(PollEvents::Read, None).unwrap();
//! }
//!
//! conn.outbound_state().set(IoState::Processing);
//! let mut request = &b"GET / HTTP/1.1\r\nHost: example.com\r\n\r\n"[..];
//! conn.write(&mut request).unwrap();
//! ```

pub mod channel;
pub mod config;
pub mod connection;
pub mod engine;
pub mod manager;
pub mod openssl_engine;
pub mod readable;
pub mod selfsigned;
pub mod session;
pub mod tasks;
pub mod writable;

pub use channel::{Direction, Flow};
pub use config::{ClientConfigBuilder, ClientVerify, ServerConfigBuilder, TlsConfig, TlsVersion};
pub use connection::{HandshakeProgress, SslConnection};
pub use engine::{DelegatedTask, Engine, EngineResult, HandshakeStatus, SessionSizes, Status};
pub use manager::{EngineManager, EngineState};
pub use openssl_engine::OpenSslEngine;
pub use readable::ReadableSslChannel;
pub use session::SessionInfo;
pub use tasks::{InlineTaskRunner, TaskBatch, TaskCompletion, TaskRunner, WorkerPool};
pub use writable::WritableSslChannel;
