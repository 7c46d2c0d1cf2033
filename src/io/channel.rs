//! Raw byte channels
//!
//! These traits describe the plain, byte-oriented transport an SSL connection
//! runs over. Implementations must never block: a call that can't make
//! progress returns `Ok(0)` (or an `io::ErrorKind::WouldBlock` error, which the
//! SSL layer treats the same way).

use crate::error::Result;
use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::os::fd::{AsRawFd, RawFd};
use std::time::Duration;

/// Inbound half of a raw channel
pub trait ReadableChannel {
    /// Read available bytes into `dst`.
    ///
    /// `Ok(0)` means nothing was available, or end of stream once
    /// [`ReadableChannel::is_open`] reports false.
    fn read(&mut self, dst: &mut [u8]) -> io::Result<usize>;

    /// Whether the channel can still deliver bytes
    fn is_open(&self) -> bool;
}

/// Outbound half of a raw channel
pub trait WritableChannel {
    /// Write as many bytes from `src` as the channel accepts right now
    fn write(&mut self, src: &[u8]) -> io::Result<usize>;

    /// Whether the channel still accepts bytes
    fn is_open(&self) -> bool;
}

/// Poll events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollEvents {
    Read,
    Write,
    Both,
}

/// Fold `WouldBlock` and `Interrupted` into "no progress"
pub(crate) fn no_progress_on_would_block(result: io::Result<usize>) -> io::Result<usize> {
    match result {
        Err(e)
            if e.kind() == io::ErrorKind::WouldBlock
                || e.kind() == io::ErrorKind::Interrupted =>
        {
            Ok(0)
        }
        other => other,
    }
}

/// Wait until `fd` is ready for the requested events.
///
/// Returns true if the descriptor is ready, false on timeout. `None` waits
/// forever.
pub fn poll_fd(fd: RawFd, events: PollEvents, timeout: Option<Duration>) -> Result<bool> {
    use libc::{poll, pollfd, POLLIN, POLLOUT};

    let mut pfd = pollfd {
        fd,
        events: match events {
            PollEvents::Read => POLLIN,
            PollEvents::Write => POLLOUT,
            PollEvents::Both => POLLIN | POLLOUT,
        },
        revents: 0,
    };

    let timeout_ms = timeout
        .map(|d| d.as_millis().min(i32::MAX as u128) as i32)
        .unwrap_or(-1);

    let result = unsafe { poll(&mut pfd as *mut pollfd, 1, timeout_ms) };

    if result < 0 {
        return Err(io::Error::last_os_error().into());
    }

    Ok(result > 0)
}

/// Non-blocking TCP channel
///
/// One `TcpChannel` can serve as either half; [`TcpChannel::split`] produces
/// a read half and a write half sharing the same socket.
#[derive(Debug)]
pub struct TcpChannel {
    stream: TcpStream,
    open: bool,
}

impl TcpChannel {
    /// Wrap a connected stream, switching it to non-blocking mode
    pub fn new(stream: TcpStream) -> Result<Self> {
        let socket = socket2::SockRef::from(&stream);
        socket.set_nonblocking(true)?;
        socket.set_nodelay(true)?;

        Ok(TcpChannel { stream, open: true })
    }

    /// Split into independent read and write halves
    pub fn split(self) -> Result<(TcpChannel, TcpChannel)> {
        let writer = TcpChannel {
            stream: self.stream.try_clone()?,
            open: self.open,
        };
        Ok((self, writer))
    }

    /// Poll the socket for readiness
    pub fn poll(&self, events: PollEvents, timeout: Option<Duration>) -> Result<bool> {
        poll_fd(self.stream.as_raw_fd(), events, timeout)
    }

    /// Shut down one or both directions of the socket
    pub fn shutdown(&mut self, how: Shutdown) -> Result<()> {
        self.open = false;
        match self.stream.shutdown(how) {
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            other => other.map_err(Into::into),
        }
    }

    /// Get a reference to the underlying stream
    pub fn stream(&self) -> &TcpStream {
        &self.stream
    }
}

impl AsRawFd for TcpChannel {
    fn as_raw_fd(&self) -> RawFd {
        self.stream.as_raw_fd()
    }
}

impl ReadableChannel for TcpChannel {
    fn read(&mut self, dst: &mut [u8]) -> io::Result<usize> {
        if !self.open || dst.is_empty() {
            return Ok(0);
        }
        match self.stream.read(dst) {
            Ok(0) => {
                self.open = false;
                Ok(0)
            }
            other => no_progress_on_would_block(other),
        }
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

impl WritableChannel for TcpChannel {
    fn write(&mut self, src: &[u8]) -> io::Result<usize> {
        if src.is_empty() {
            return Ok(0);
        }
        match no_progress_on_would_block(self.stream.write(src)) {
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
                self.open = false;
                Err(e)
            }
            other => other,
        }
    }

    fn is_open(&self) -> bool {
        self.open
    }
}
