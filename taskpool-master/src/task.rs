use serde_json::Value;

/// An argument bundle waiting to be dispatched. Immutable once created.
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    args: Vec<Value>,
}

impl Task {
    pub fn new(args: Vec<Value>) -> Self {
        Self { args }
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    pub(crate) fn into_args(self) -> Vec<Value> {
        self.args
    }
}
