use std::{fmt, sync::Arc};

use serde_json::Value;

use crate::error::WorkerExecutionError;

type SuccessFn = dyn Fn(&Value) + Send + Sync;
type ErrorFn = dyn Fn(&WorkerExecutionError) + Send + Sync;

/// Caller hooks, invoked exactly once per settled task.
#[derive(Clone)]
pub struct Callbacks {
    on_success: Arc<SuccessFn>,
    on_error: Arc<ErrorFn>,
}

impl Callbacks {
    pub fn new<S, E>(on_success: S, on_error: E) -> Self
    where
        S: Fn(&Value) + Send + Sync + 'static,
        E: Fn(&WorkerExecutionError) + Send + Sync + 'static,
    {
        Self {
            on_success: Arc::new(on_success),
            on_error: Arc::new(on_error),
        }
    }

    pub(crate) fn success(&self, result: &Value) {
        (self.on_success)(result)
    }

    pub(crate) fn error(&self, error: &WorkerExecutionError) {
        (self.on_error)(error)
    }
}

impl fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callbacks").finish_non_exhaustive()
    }
}
