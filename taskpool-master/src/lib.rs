//! A fixed-size pool of workers that all run one program, each handling a
//! single task at a time.
//!
//! Tasks go through [`Pool::submit`]. A task that finds no idle worker is
//! parked on the retry queue and dispatched later by the retry scheduler; its
//! outcome then reaches the caller only through the [`Callbacks`]. A worker
//! whose task fails in any way is terminated and replaced.

mod callbacks;
mod config;
mod error;
mod pool;
mod retry;
pub mod runtime;
mod state;
mod task;
mod worker;

pub use callbacks::Callbacks;
pub use config::{PoolConfig, ResourceLimits, DEFAULT_RETRY_INTERVAL};
pub use error::{InitError, SpawnError, WorkerExecutionError};
pub use pool::{Pool, PoolStats, Submission};
pub use runtime::{
    process::{Executable, ExecutableBuilder, ProcessRuntime},
    thread::ThreadRuntime,
    ExecutionUnit, Runtime, Signal,
};
pub use task::Task;
pub use worker::{Worker, WorkerState};

pub use taskpool_core::{
    BuildProgram, Helpers, Program, ProgramBuildError, ProgramBuilder, TaskError, WorkerId,
};
