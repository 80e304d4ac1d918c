use std::collections::VecDeque;

use tokio::task::JoinHandle;

use crate::{error::NoIdleWorkerError, runtime::ExecutionUnit, task::Task, worker::Worker};

/// Everything the pool mutates, guarded by a single lock.
///
/// `idle.len() + busy + vacant` always equals the party size while the pool
/// is open.
pub(crate) struct State<U> {
    // Workers ready for a task. Taken from the front, returned to the back.
    pub idle: VecDeque<Worker<U>>,
    // Tasks that found no idle worker, oldest first.
    pub retry: VecDeque<Task>,
    // Workers currently running a task.
    pub busy: usize,
    // Slots whose replacement worker failed to spawn.
    pub vacant: usize,
    pub retry_fiber: Option<JoinHandle<()>>,
    pub closed: bool,
}

impl<U: ExecutionUnit> State<U> {
    pub fn new(idle: VecDeque<Worker<U>>) -> Self {
        Self {
            idle,
            retry: VecDeque::new(),
            busy: 0,
            vacant: 0,
            retry_fiber: None,
            closed: false,
        }
    }

    pub fn take_idle(&mut self) -> Result<Worker<U>, NoIdleWorkerError> {
        let worker = self.idle.pop_front().ok_or(NoIdleWorkerError)?;
        self.busy += 1;
        Ok(worker)
    }
}
