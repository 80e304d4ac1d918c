use taskpool_core::{STACK_SIZE_ENV, WORKER_ID_ENV};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} must be a positive integer, got {value:?}")]
    InvalidNumber { name: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    // Id the pool assigned to this worker, used to tag log lines.
    pub worker_id: Option<String>,
    // Stack size of the thread running each task, in MiB.
    pub stack_size_mb: Option<usize>,
    // Consecutive undecodable frames tolerated before the worker gives up.
    pub max_error_tolerance: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: None,
            stack_size_mb: None,
            max_error_tolerance: 3,
        }
    }
}

impl WorkerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let stack_size_mb = match lookup(STACK_SIZE_ENV) {
            Some(value) => match value.trim().parse::<usize>() {
                Ok(mb) if mb > 0 => Some(mb),
                _ => {
                    return Err(ConfigError::InvalidNumber {
                        name: STACK_SIZE_ENV,
                        value,
                    })
                }
            },
            None => None,
        };

        Ok(Self {
            worker_id: lookup(WORKER_ID_ENV),
            stack_size_mb,
            ..Self::default()
        })
    }

    pub fn stack_size_bytes(&self) -> Option<usize> {
        self.stack_size_mb.map(|mb| mb * 1024 * 1024)
    }
}
