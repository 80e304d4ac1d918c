use serde_json::Value;
use taskpool_core::{
    protocol::{Reply, Request},
    WorkerId,
};
use tracing::{debug, info, warn};

use crate::{
    config::ResourceLimits,
    error::{SpawnError, WorkerExecutionError},
    runtime::{ExecutionUnit, Runtime, Signal},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Busy,
}

/// One execution unit running the pool's program, one task at a time.
///
/// `run_task` takes `&mut self`, so a worker can never have two tasks in
/// flight.
pub struct Worker<U> {
    id: WorkerId,
    unit: U,
    sequence: u64,
    state: WorkerState,
}

impl<U: ExecutionUnit> Worker<U> {
    pub fn spawn<R>(
        runtime: &R,
        program: &R::Program,
        limits: &ResourceLimits,
    ) -> Result<Self, SpawnError>
    where
        R: Runtime<Unit = U>,
    {
        let id = WorkerId::new();
        let unit = runtime.spawn(id, program, limits)?;
        info!("Spawn worker [{}]", id);
        Ok(Self::from_unit(id, unit))
    }

    pub(crate) fn from_unit(id: WorkerId, unit: U) -> Self {
        Self {
            id,
            unit,
            sequence: 0,
            state: WorkerState::Idle,
        }
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    /// Sends `args` to the unit and waits for the first signal that settles
    /// this dispatch. Replies to earlier dispatches are dropped.
    pub async fn run_task(&mut self, args: Vec<Value>) -> Result<Value, WorkerExecutionError> {
        self.sequence += 1;
        self.state = WorkerState::Busy;
        info!(
            "[{}] Worker will execute task #{} with {} argument(s)",
            self.id,
            self.sequence,
            args.len()
        );

        let outcome = self.settle(args).await;
        if outcome.is_ok() {
            self.state = WorkerState::Idle;
        }
        outcome
    }

    async fn settle(&mut self, args: Vec<Value>) -> Result<Value, WorkerExecutionError> {
        let sequence = self.sequence;
        let request = Request {
            worker_id: self.id,
            sequence,
            args,
        };

        self.unit
            .send(request)
            .await
            .map_err(|error| WorkerExecutionError::Channel {
                worker: self.id,
                message: error.to_string(),
            })?;

        loop {
            match self.unit.next_signal().await {
                Signal::Message(Reply::Result { sequence: s, data }) if s == sequence => {
                    debug!("[{}] Task #{} succeeded", self.id, sequence);
                    return Ok(data);
                }
                Signal::Message(Reply::Error { sequence: s, message }) if s == sequence => {
                    return Err(WorkerExecutionError::TaskFailed {
                        worker: self.id,
                        message,
                    });
                }
                Signal::Message(stale) => {
                    warn!(
                        "[{}] Discarding reply to task #{} while waiting for #{}",
                        self.id,
                        stale.sequence(),
                        sequence
                    );
                }
                Signal::Error(message) => {
                    return Err(WorkerExecutionError::Channel {
                        worker: self.id,
                        message,
                    });
                }
                Signal::Exit(status) => {
                    return Err(WorkerExecutionError::Terminated {
                        worker: self.id,
                        status,
                    });
                }
            }
        }
    }

    pub async fn terminate(&mut self) {
        self.unit.terminate().await;
        info!("Terminated worker [{}]", self.id);
    }
}
