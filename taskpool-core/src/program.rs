//! Building the single program every worker of a pool runs.
//!
//! A program is one statically typed task plus a fixed set of named helper
//! bindings the task may call. Arguments arrive as a JSON array and are
//! deserialized into the task's argument type, so a task taking
//! `(u64, String)` accepts `[10, "msg"]`.

use std::{collections::HashMap, fmt, path::PathBuf, sync::Arc};

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TaskError {
  #[error("invalid arguments: {0}")]
  InvalidArguments(String),
  #[error("unknown helper: {0}")]
  UnknownHelper(String),
  #[error("unserializable result: {0}")]
  InvalidResult(String),
  #[error("{0}")]
  Failed(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProgramBuildError {
  #[error("program name must not be empty")]
  EmptyName,
  #[error("program {0} has no task")]
  MissingTask(String),
  #[error("helper {0} registered twice")]
  DuplicateHelper(String),
  #[error("executable {path:?} is not accessible: {reason}")]
  ExecutableNotFound { path: PathBuf, reason: String },
  #[error("executable {0:?} is not a regular file")]
  NotAFile(PathBuf),
}

/// Turns a task definition into the program all workers of a pool run.
pub trait BuildProgram {
  type Program;

  fn build(self) -> Result<Self::Program, ProgramBuildError>;
}

type TaskFn = dyn Fn(Vec<Value>, &Helpers) -> Result<Value, TaskError> + Send + Sync;
type HelperFn = dyn Fn(Value) -> Result<Value, TaskError> + Send + Sync;

/// The helper bindings registered on a program.
#[derive(Clone, Default)]
pub struct Helpers {
  bindings: Arc<HashMap<String, Arc<HelperFn>>>,
}

impl Helpers {
  pub fn call<A, R>(&self, name: &str, args: A) -> Result<R, TaskError>
  where
    A: Serialize,
    R: DeserializeOwned,
  {
    let helper = self
      .bindings
      .get(name)
      .ok_or_else(|| TaskError::UnknownHelper(name.to_string()))?;
    let args =
      serde_json::to_value(args).map_err(|error| TaskError::InvalidArguments(error.to_string()))?;
    let result = helper(args)?;
    serde_json::from_value(result).map_err(|error| TaskError::InvalidResult(error.to_string()))
  }

  pub fn names(&self) -> Vec<&str> {
    let mut names: Vec<&str> = self.bindings.keys().map(String::as_str).collect();
    names.sort_unstable();
    names
  }
}

impl fmt::Debug for Helpers {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_list().entries(self.names()).finish()
  }
}

/// A built program. Cheap to clone; every clone runs the same task.
#[derive(Clone)]
pub struct Program {
  name: Arc<str>,
  task: Arc<TaskFn>,
  helpers: Helpers,
}

impl Program {
  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn helpers(&self) -> &Helpers {
    &self.helpers
  }

  pub fn run(&self, args: Vec<Value>) -> Result<Value, TaskError> {
    (self.task)(args, &self.helpers)
  }
}

impl fmt::Debug for Program {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Program")
      .field("name", &self.name)
      .field("helpers", &self.helpers)
      .finish()
  }
}

pub struct ProgramBuilder {
  name: String,
  task: Option<Arc<TaskFn>>,
  helpers: HashMap<String, Arc<HelperFn>>,
  duplicate: Option<String>,
}

impl ProgramBuilder {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      task: None,
      helpers: HashMap::new(),
      duplicate: None,
    }
  }

  pub fn task<A, R, E, F>(mut self, task: F) -> Self
  where
    A: DeserializeOwned,
    R: Serialize,
    E: fmt::Display,
    F: Fn(A, &Helpers) -> Result<R, E> + Send + Sync + 'static,
  {
    let task: Arc<TaskFn> = Arc::new(move |args: Vec<Value>, helpers: &Helpers| {
      let args: A = serde_json::from_value(Value::Array(args))
        .map_err(|error| TaskError::InvalidArguments(error.to_string()))?;
      let result = task(args, helpers).map_err(|error| TaskError::Failed(error.to_string()))?;
      serde_json::to_value(result).map_err(|error| TaskError::InvalidResult(error.to_string()))
    });
    self.task = Some(task);
    self
  }

  pub fn helper<A, R, E, F>(mut self, name: impl Into<String>, helper: F) -> Self
  where
    A: DeserializeOwned,
    R: Serialize,
    E: fmt::Display,
    F: Fn(A) -> Result<R, E> + Send + Sync + 'static,
  {
    let name = name.into();
    let binding: Arc<HelperFn> = Arc::new(move |args: Value| {
      let args: A =
        serde_json::from_value(args).map_err(|error| TaskError::InvalidArguments(error.to_string()))?;
      let result = helper(args).map_err(|error| TaskError::Failed(error.to_string()))?;
      serde_json::to_value(result).map_err(|error| TaskError::InvalidResult(error.to_string()))
    });

    if self.helpers.insert(name.clone(), binding).is_some() && self.duplicate.is_none() {
      self.duplicate = Some(name);
    }
    self
  }
}

impl BuildProgram for ProgramBuilder {
  type Program = Program;

  fn build(self) -> Result<Program, ProgramBuildError> {
    if self.name.trim().is_empty() {
      return Err(ProgramBuildError::EmptyName);
    }
    if let Some(name) = self.duplicate {
      return Err(ProgramBuildError::DuplicateHelper(name));
    }
    let task = self
      .task
      .ok_or_else(|| ProgramBuildError::MissingTask(self.name.clone()))?;

    Ok(Program {
      name: Arc::from(self.name),
      task,
      helpers: Helpers {
        bindings: Arc::new(self.helpers),
      },
    })
  }
}
