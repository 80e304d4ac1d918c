//! The retry scheduler: a background fiber that hands queued tasks to
//! workers as they free up, one task per tick.
//!
//! The fiber is started and stopped while holding the state lock, so a task
//! enqueued right as the queue drains always finds a running scheduler.

use std::sync::Arc;

use tokio::time::sleep;
use tracing::{info, warn};

use crate::{
    error::NoIdleWorkerError,
    pool::Shared,
    runtime::Runtime,
    state::State,
};

pub(crate) fn start<R: Runtime>(shared: &Arc<Shared<R>>, state: &mut State<R::Unit>) {
    if state.retry_fiber.is_some() || state.closed {
        return;
    }

    let interval = shared.config.retry_interval;
    let shared = Arc::downgrade(shared);

    info!("Starting retry scheduler with interval {:?}", interval);

    state.retry_fiber = Some(tokio::spawn(async move {
        loop {
            sleep(interval).await;
            let Some(shared) = shared.upgrade() else {
                break;
            };
            if !tick(&shared).await {
                break;
            }
        }
    }));
}

/// Returns whether the scheduler should keep running.
async fn tick<R: Runtime>(shared: &Arc<Shared<R>>) -> bool {
    let (dispatch, keep_running) = {
        let mut state = shared.state.lock().await;
        if state.closed {
            return false;
        }

        refill_vacancies(shared, &mut state);

        let mut dispatch = None;
        if !state.idle.is_empty() {
            if let Some(task) = state.retry.pop_front() {
                match state.take_idle() {
                    Ok(worker) => dispatch = Some((worker, task)),
                    Err(NoIdleWorkerError) => state.retry.push_front(task),
                }
            }
        }

        let keep_running = !state.retry.is_empty() || state.vacant > 0;
        if !keep_running {
            state.retry_fiber = None;
            info!("Retry queue drained, stopping retry scheduler");
        }
        (dispatch, keep_running)
    };

    if let Some((worker, task)) = dispatch {
        info!(
            "Retrying queued task with {} argument(s) on worker [{}]",
            task.args().len(),
            worker.id()
        );
        let shared = shared.clone();
        tokio::spawn(async move {
            // The outcome has already been reported through the callbacks.
            let _ = shared.execute(worker, task).await;
        });
    }

    keep_running
}

fn refill_vacancies<R: Runtime>(shared: &Shared<R>, state: &mut State<R::Unit>) {
    while state.vacant > 0 {
        match shared.spawn_worker() {
            Ok(worker) => {
                info!("Filled vacancy with worker [{}]", worker.id());
                state.vacant -= 1;
                state.idle.push_back(worker);
            }
            Err(error) => {
                warn!("Still unable to spawn a worker: {}", error);
                break;
            }
        }
    }
}
