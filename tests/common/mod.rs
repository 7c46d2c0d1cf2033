//! Shared helpers for integration tests
//!
//! - [`FramingEngine`]: a toy record engine (3-byte header, masked payload)
//!   with a scripted handshake and delegated tasks
//! - [`Pipe`]: an in-memory raw channel with a per-call acceptance limit and
//!   a close switch
//! - [`ManualTaskRunner`]: holds task batches until the test runs them

#![allow(dead_code)]

use parking_lot::Mutex;
use ssl_channel::io::{ReadableChannel, WritableChannel};
use ssl_channel::ssl::{
    DelegatedTask, Engine, EngineResult, HandshakeStatus, SessionSizes, SslConnection, Status,
    TaskBatch, TaskCompletion, TaskRunner,
};
use ssl_channel::{Result, SslError};
use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

pub const HEADER: usize = 3;

const DATA: u8 = 0x17;
const HANDSHAKE: u8 = 0x16;
const CLOSE: u8 = 0x15;
const MASK: u8 = 0x5a;

const HELLO: &[u8] = b"HELLO";

/// Encode one data record
pub fn encode(payload: &[u8]) -> Vec<u8> {
    record(DATA, payload)
}

fn record(kind: u8, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER + payload.len());
    out.push(kind);
    out.extend_from_slice(&(payload.len() as u16).to_be_bytes());
    out.extend(payload.iter().map(|b| b ^ MASK));
    out
}

/// Decode the plaintext of every data record in `wire`, skipping
/// handshake and close records
pub fn decode(mut wire: &[u8]) -> Vec<u8> {
    let mut plain = Vec::new();
    while !wire.is_empty() {
        assert!(wire.len() >= HEADER, "truncated record header");
        let len = u16::from_be_bytes([wire[1], wire[2]]) as usize;
        assert!(wire.len() >= HEADER + len, "truncated record payload");
        if wire[0] == DATA {
            plain.extend(wire[HEADER..HEADER + len].iter().map(|b| b ^ MASK));
        }
        wire = &wire[HEADER + len..];
    }
    plain
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Tasks,
    SendHello,
    AwaitHello,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Close {
    Open,
    Pending,
    Sent,
}

/// Toy engine framing plaintext into length-prefixed records
pub struct FramingEngine {
    application_size: usize,
    packet_size: usize,
    phase: Phase,
    task_count: usize,
    fail_task: bool,
    tasks_taken: bool,
    tasks_done: Arc<AtomicBool>,
    tasks_run: Arc<AtomicUsize>,
    wraps: Arc<AtomicUsize>,
    close: Close,
    inbound_done: bool,
}

impl FramingEngine {
    /// Engine with the handshake already complete
    pub fn new() -> Self {
        FramingEngine {
            application_size: 16_384,
            packet_size: 16_384,
            phase: Phase::Done,
            task_count: 0,
            fail_task: false,
            tasks_taken: false,
            tasks_done: Arc::new(AtomicBool::new(false)),
            tasks_run: Arc::new(AtomicUsize::new(0)),
            wraps: Arc::new(AtomicUsize::new(0)),
            close: Close::Open,
            inbound_done: false,
        }
    }

    pub fn with_sizes(mut self, application_size: usize, packet_size: usize) -> Self {
        self.application_size = application_size;
        self.packet_size = packet_size;
        self
    }

    /// Handshake: send a hello record, then done
    pub fn sending_hello(mut self) -> Self {
        self.phase = Phase::SendHello;
        self
    }

    /// Handshake: wait for the peer's hello record, then done
    pub fn awaiting_hello(mut self) -> Self {
        self.phase = Phase::AwaitHello;
        self
    }

    /// Handshake: one batch of `count` delegated tasks, then send a hello
    pub fn with_tasks(mut self, count: usize) -> Self {
        self.phase = Phase::Tasks;
        self.task_count = count;
        self
    }

    /// The first delegated task fails
    pub fn failing_task(mut self) -> Self {
        self.fail_task = true;
        self
    }

    /// Number of wrap calls so far
    pub fn wrap_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.wraps)
    }

    /// Number of delegated tasks run so far
    pub fn tasks_run(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.tasks_run)
    }

    fn phase(&mut self) -> Phase {
        if self.phase == Phase::Tasks && self.tasks_done.load(Ordering::Acquire) {
            self.phase = Phase::SendHello;
        }
        self.phase
    }

    fn result(&self, status: Status, consumed: usize, produced: usize) -> EngineResult {
        EngineResult::new(status, self.handshake_status(), consumed, produced)
    }

    fn put(dst: &mut [u8], bytes: &[u8]) -> usize {
        dst[..bytes.len()].copy_from_slice(bytes);
        bytes.len()
    }
}

impl Engine for FramingEngine {
    fn wrap(&mut self, src: &[u8], dst: &mut [u8]) -> Result<EngineResult> {
        self.wraps.fetch_add(1, Ordering::SeqCst);

        match self.phase() {
            Phase::Tasks | Phase::AwaitHello => return Ok(self.result(Status::Ok, 0, 0)),
            Phase::SendHello => {
                if dst.len() < HEADER + HELLO.len() {
                    return Ok(self.result(Status::BufferOverflow, 0, 0));
                }
                let n = Self::put(dst, &record(HANDSHAKE, HELLO));
                self.phase = Phase::Done;
                return Ok(EngineResult::new(Status::Ok, HandshakeStatus::Finished, 0, n));
            }
            Phase::Done => {}
        }

        match self.close {
            Close::Pending => {
                if dst.len() < HEADER {
                    return Ok(self.result(Status::BufferOverflow, 0, 0));
                }
                let n = Self::put(dst, &record(CLOSE, &[]));
                self.close = Close::Sent;
                return Ok(self.result(Status::Closed, 0, n));
            }
            Close::Sent => return Ok(self.result(Status::Closed, 0, 0)),
            Close::Open => {}
        }

        if src.is_empty() {
            return Ok(self.result(Status::Ok, 0, 0));
        }
        let chunk = src
            .len()
            .min(self.application_size)
            .min(dst.len().saturating_sub(HEADER));
        if chunk == 0 {
            return Ok(self.result(Status::BufferOverflow, 0, 0));
        }
        let n = Self::put(dst, &record(DATA, &src[..chunk]));
        Ok(self.result(Status::Ok, chunk, n))
    }

    fn unwrap(&mut self, src: &[u8], dst: &mut [u8]) -> Result<EngineResult> {
        if self.inbound_done {
            return Ok(self.result(Status::Closed, 0, 0));
        }
        if src.len() < HEADER {
            return Ok(self.result(Status::BufferUnderflow, 0, 0));
        }
        let len = u16::from_be_bytes([src[1], src[2]]) as usize;
        if src.len() < HEADER + len {
            return Ok(self.result(Status::BufferUnderflow, 0, 0));
        }

        match src[0] {
            CLOSE => {
                self.inbound_done = true;
                Ok(self.result(Status::Closed, HEADER, 0))
            }
            HANDSHAKE => {
                if self.phase() == Phase::AwaitHello {
                    self.phase = Phase::Done;
                    return Ok(EngineResult::new(
                        Status::Ok,
                        HandshakeStatus::Finished,
                        HEADER + len,
                        0,
                    ));
                }
                Ok(self.result(Status::Ok, HEADER + len, 0))
            }
            DATA => {
                if len > dst.len() {
                    return Ok(self.result(Status::BufferOverflow, 0, 0));
                }
                for (out, b) in dst.iter_mut().zip(&src[HEADER..HEADER + len]) {
                    *out = b ^ MASK;
                }
                Ok(self.result(Status::Ok, HEADER + len, len))
            }
            other => Err(SslError::Engine(format!("unknown record type {:#x}", other))),
        }
    }

    fn handshake_status(&self) -> HandshakeStatus {
        match self.phase {
            Phase::Tasks if self.tasks_done.load(Ordering::Acquire) => HandshakeStatus::NeedWrap,
            Phase::Tasks => HandshakeStatus::NeedTask,
            Phase::SendHello => HandshakeStatus::NeedWrap,
            Phase::AwaitHello => HandshakeStatus::NeedUnwrap,
            Phase::Done => HandshakeStatus::NotHandshaking,
        }
    }

    fn take_delegated_tasks(&mut self) -> Vec<DelegatedTask> {
        if self.phase != Phase::Tasks || self.tasks_taken {
            return Vec::new();
        }
        self.tasks_taken = true;

        (0..self.task_count)
            .map(|i| {
                let run = Arc::clone(&self.tasks_run);
                let done = Arc::clone(&self.tasks_done);
                let fail = self.fail_task && i == 0;
                let last = i + 1 == self.task_count;
                Box::new(move || {
                    run.fetch_add(1, Ordering::SeqCst);
                    if fail {
                        return Err(SslError::Certificate("peer certificate rejected".to_string()));
                    }
                    if last {
                        done.store(true, Ordering::Release);
                    }
                    Ok(())
                }) as DelegatedTask
            })
            .collect()
    }

    fn session_sizes(&self) -> SessionSizes {
        SessionSizes {
            application_buffer_size: self.application_size,
            packet_buffer_size: self.packet_size,
        }
    }

    fn close_outbound(&mut self) -> Result<()> {
        if self.close == Close::Open {
            self.close = Close::Pending;
        }
        Ok(())
    }

    fn is_outbound_done(&self) -> bool {
        self.close == Close::Sent
    }

    fn is_inbound_done(&self) -> bool {
        self.inbound_done
    }
}

#[derive(Debug)]
struct PipeState {
    data: VecDeque<u8>,
    limit: Option<usize>,
    open: bool,
    writes: usize,
    written: usize,
}

/// One-way in-memory byte channel; clones share the same queue
#[derive(Debug, Clone)]
pub struct Pipe {
    inner: Arc<Mutex<PipeState>>,
}

impl Pipe {
    pub fn new() -> Self {
        Pipe {
            inner: Arc::new(Mutex::new(PipeState {
                data: VecDeque::new(),
                limit: None,
                open: true,
                writes: 0,
                written: 0,
            })),
        }
    }

    /// Accept at most `limit` bytes per write call (`None` for unlimited)
    pub fn set_limit(&self, limit: Option<usize>) {
        self.inner.lock().limit = limit;
    }

    pub fn close(&self) {
        self.inner.lock().open = false;
    }

    /// Number of write calls that accepted bytes
    pub fn writes(&self) -> usize {
        self.inner.lock().writes
    }

    /// Total bytes accepted
    pub fn written(&self) -> usize {
        self.inner.lock().written
    }

    pub fn len(&self) -> usize {
        self.inner.lock().data.len()
    }

    /// Queue bytes for the reading end
    pub fn push(&self, bytes: &[u8]) {
        self.inner.lock().data.extend(bytes);
    }

    /// Remove and return every queued byte
    pub fn take_all(&self) -> Vec<u8> {
        self.inner.lock().data.drain(..).collect()
    }
}

impl WritableChannel for Pipe {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.inner.lock();
        if !state.open {
            return Err(io::ErrorKind::BrokenPipe.into());
        }
        let n = buf.len().min(state.limit.unwrap_or(usize::MAX));
        if n == 0 && !buf.is_empty() {
            return Err(io::ErrorKind::WouldBlock.into());
        }
        state.data.extend(&buf[..n]);
        state.writes += 1;
        state.written += n;
        Ok(n)
    }

    fn is_open(&self) -> bool {
        self.inner.lock().open
    }
}

impl ReadableChannel for Pipe {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.inner.lock();
        if state.data.is_empty() {
            if state.open {
                return Err(io::ErrorKind::WouldBlock.into());
            }
            return Ok(0);
        }
        let n = buf.len().min(state.data.len());
        for (out, b) in buf.iter_mut().zip(state.data.drain(..n)) {
            *out = b;
        }
        Ok(n)
    }

    fn is_open(&self) -> bool {
        let state = self.inner.lock();
        state.open || !state.data.is_empty()
    }
}

/// Task runner that parks batches until [`ManualTaskRunner::run_all`]
#[derive(Default)]
pub struct ManualTaskRunner {
    parked: Mutex<Vec<(TaskBatch, TaskCompletion)>>,
}

impl ManualTaskRunner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn parked(&self) -> usize {
        self.parked.lock().len()
    }

    /// Run every parked batch; returns how many ran
    pub fn run_all(&self) -> usize {
        let batches: Vec<_> = self.parked.lock().drain(..).collect();
        let count = batches.len();
        for (batch, completion) in batches {
            completion.complete(batch.run());
        }
        count
    }
}

impl TaskRunner for ManualTaskRunner {
    fn execute(&self, batch: TaskBatch, completion: TaskCompletion) {
        self.parked.lock().push((batch, completion));
    }
}

pub type PipeConnection<E> = SslConnection<E, Pipe, Pipe>;

/// Two connections wired back to back; returns the pipes as (a to b, b to a)
pub fn connected<E: Engine>(
    a: E,
    b: E,
    runner: Arc<dyn TaskRunner>,
) -> (PipeConnection<E>, PipeConnection<E>, Pipe, Pipe) {
    let a_to_b = Pipe::new();
    let b_to_a = Pipe::new();
    let left = SslConnection::new(a, b_to_a.clone(), a_to_b.clone(), Arc::clone(&runner));
    let right = SslConnection::new(b, a_to_b.clone(), b_to_a.clone(), runner);
    (left, right, a_to_b, b_to_a)
}
