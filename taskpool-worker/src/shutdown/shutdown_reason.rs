use crate::error_tracker::ErrorTracker;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    // The pool closed stdin, normally because it terminated this worker.
    InputClosed,
    Interrupted,
    TaskPanicked,
    Io(String),
    ProtocolErrors(ErrorTracker),
}

impl ShutdownReason {
    pub fn is_clean(&self) -> bool {
        matches!(self, ShutdownReason::InputClosed | ShutdownReason::Interrupted)
    }
}
