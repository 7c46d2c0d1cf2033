//! Engine manager
//!
//! One [`EngineManager`] per connection owns the engine and the connection's
//! [`EngineState`]. Both directional channels go through it for every wrap,
//! unwrap and delegated task batch.

use super::engine::{Engine, EngineResult, HandshakeStatus, SessionSizes, Status};
use super::tasks::{FailureSlot, TaskBatch, TaskCompletion, TaskRunner};
use crate::error::{Result, SslError};
use crate::io::IoStateCell;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

/// Connection-level protocol state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Handshaking,
    ReadingApplicationData,
    WritingApplicationData,
    /// Terminal
    Closing,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EngineState::Handshaking => "handshaking",
            EngineState::ReadingApplicationData => "reading",
            EngineState::WritingApplicationData => "writing",
            EngineState::Closing => "closing",
        };
        f.write_str(name)
    }
}

/// Owner of the engine and shared handshake/application state
pub struct EngineManager<E> {
    engine: E,
    state: EngineState,
    sizes: SessionSizes,
    runner: Arc<dyn TaskRunner>,
    outbound: IoStateCell,
    tasks_in_flight: Arc<AtomicBool>,
    failure: FailureSlot,
}

impl<E: Engine> EngineManager<E> {
    /// Create a manager; `outbound` is the connection's outbound readiness flag
    pub fn new(engine: E, runner: Arc<dyn TaskRunner>, outbound: IoStateCell) -> Self {
        let sizes = engine.session_sizes();
        let state = if engine.handshake_status().is_handshaking() {
            EngineState::Handshaking
        } else {
            EngineState::WritingApplicationData
        };

        EngineManager {
            engine,
            state,
            sizes,
            runner,
            outbound,
            tasks_in_flight: Arc::new(AtomicBool::new(false)),
            failure: FailureSlot::new(),
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Change the state. `Closing` is terminal and never left.
    pub fn set_state(&mut self, state: EngineState) {
        if self.state == state || self.state == EngineState::Closing {
            return;
        }
        debug!(from = %self.state, to = %state, "engine state");
        self.state = state;
    }

    pub fn session_sizes(&self) -> SessionSizes {
        self.sizes
    }

    pub fn is_closing(&self) -> bool {
        self.state == EngineState::Closing
    }

    /// Move to `Closing`
    pub fn mark_closing(&mut self) {
        self.set_state(EngineState::Closing);
    }

    /// The engine's handshake status, `NeedTask` included
    pub fn handshake_status(&self) -> HandshakeStatus {
        self.engine.handshake_status()
    }

    /// Whether a delegated task batch is still running
    pub fn tasks_pending(&self) -> bool {
        self.tasks_in_flight.load(Ordering::Acquire)
    }

    /// Surface a delegated task failure, tearing the connection down
    pub fn check_failure(&mut self) -> Result<()> {
        match self.failure.take() {
            Some(error) => {
                self.mark_closing();
                Err(error)
            }
            None => Ok(()),
        }
    }

    /// Wrap plaintext from `src` into wire bytes in `dst`
    pub fn wrap(&mut self, src: &[u8], dst: &mut [u8]) -> Result<EngineResult> {
        let result = self.engine.wrap(src, dst)?;
        trace!(%result, "wrap");
        self.track(&result, EngineState::WritingApplicationData);
        Ok(result)
    }

    /// Unwrap wire bytes from `src` into plaintext in `dst`
    pub fn unwrap(&mut self, src: &[u8], dst: &mut [u8]) -> Result<EngineResult> {
        let result = self.engine.unwrap(src, dst)?;
        trace!(%result, "unwrap");
        self.track(&result, EngineState::ReadingApplicationData);
        Ok(result)
    }

    fn track(&mut self, result: &EngineResult, settled: EngineState) {
        if result.status == Status::Closed {
            self.mark_closing();
            return;
        }
        if self.state == EngineState::Handshaking
            && matches!(
                result.handshake_status,
                HandshakeStatus::Finished | HandshakeStatus::NotHandshaking
            )
        {
            self.set_state(settled);
        }
    }

    /// Hand all pending delegated tasks to the runner.
    ///
    /// Returns true if a batch was dispatched. When the runner completes it,
    /// the outbound flag flips `Idle` to `Interest`.
    pub fn run_delegated_tasks(&mut self) -> Result<bool> {
        if self.tasks_pending() {
            return Ok(false);
        }
        let tasks = self.engine.take_delegated_tasks();
        if tasks.is_empty() {
            return Ok(false);
        }

        debug!(tasks = tasks.len(), "dispatching delegated tasks");
        self.tasks_in_flight.store(true, Ordering::Release);
        let completion = TaskCompletion::new(
            self.outbound.clone(),
            Arc::clone(&self.tasks_in_flight),
            self.failure.clone(),
        );
        self.runner.execute(TaskBatch::new(tasks), completion);

        self.check_failure()?;
        Ok(true)
    }

    /// Queue close-notify and move to `Closing`
    pub fn close_outbound(&mut self) -> Result<()> {
        self.mark_closing();
        self.engine.close_outbound()
    }
}

impl<E> fmt::Debug for EngineManager<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineManager")
            .field("state", &self.state)
            .field("sizes", &self.sizes)
            .field("tasks_in_flight", &self.tasks_in_flight.load(Ordering::Relaxed))
            .finish()
    }
}
