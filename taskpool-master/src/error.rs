use std::io;

use taskpool_core::{ProgramBuildError, WorkerId};
use thiserror::Error;

/// A dispatched task did not produce a result.
///
/// Every variant except [`WorkerExecutionError::PoolClosed`] means the worker
/// that ran the task has been terminated and replaced.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WorkerExecutionError {
    #[error("task failed on worker [{worker}]: {message}")]
    TaskFailed { worker: WorkerId, message: String },
    #[error("worker [{worker}] terminated unexpectedly: {status}")]
    Terminated { worker: WorkerId, status: String },
    #[error("lost contact with worker [{worker}]: {message}")]
    Channel { worker: WorkerId, message: String },
    #[error("pool is shut down")]
    PoolClosed,
}

impl WorkerExecutionError {
    pub fn worker(&self) -> Option<WorkerId> {
        match self {
            WorkerExecutionError::TaskFailed { worker, .. }
            | WorkerExecutionError::Terminated { worker, .. }
            | WorkerExecutionError::Channel { worker, .. } => Some(*worker),
            WorkerExecutionError::PoolClosed => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum SpawnError {
    #[error("failed to start thread for worker [{worker}]: {source}")]
    Thread { worker: WorkerId, source: io::Error },
    #[error("failed to start process for worker [{worker}]: {source}")]
    Process { worker: WorkerId, source: io::Error },
    #[error("worker [{worker}] process has no {pipe} pipe")]
    MissingPipe { worker: WorkerId, pipe: &'static str },
}

#[derive(Debug, Error)]
pub enum InitError {
    #[error("party size must be at least 1")]
    EmptyParty,
    #[error("retry interval must be greater than zero")]
    ZeroRetryInterval,
    #[error(transparent)]
    Build(#[from] ProgramBuildError),
    #[error(transparent)]
    Spawn(#[from] SpawnError),
}

/// Raised when a dispatch finds the idle queue empty. Never leaves the pool.
#[derive(Debug, Error)]
#[error("no idle worker found")]
pub(crate) struct NoIdleWorkerError;
