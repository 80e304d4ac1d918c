use std::fmt::{Debug, Display};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod program;
pub mod protocol;

pub use program::{BuildProgram, Helpers, Program, ProgramBuildError, ProgramBuilder, TaskError};

/// Identity of a single worker, assigned when the worker is spawned.
#[derive(Clone, Copy, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerId(pub Uuid);

impl WorkerId {
  pub fn new() -> Self {
    Self(Uuid::new_v4())
  }
}

impl Default for WorkerId {
  fn default() -> Self {
    Self::new()
  }
}

impl Debug for WorkerId {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0.simple())
  }
}

impl Display for WorkerId {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0.simple())
  }
}

/// Environment variable carrying the worker id into a worker process.
pub const WORKER_ID_ENV: &str = "TASKPOOL_WORKER_ID";

/// Environment variable carrying the task thread stack size (in MiB) into a worker process.
pub const STACK_SIZE_ENV: &str = "TASKPOOL_STACK_SIZE_MB";
