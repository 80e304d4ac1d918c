use std::{future::Future, pin::Pin, sync::Arc, time::Duration};
use tokio::{
    sync::{oneshot, Mutex},
    time::timeout,
};
use tracing::{info, warn};

/// How long a single shutdown task may run before it is abandoned.
pub const SHUTDOWN_TASK_DEADLINE: Duration = Duration::from_secs(5);

type ShutdownTask = Box<dyn FnOnce() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Owns the receiving end of a one-time shutdown signal.
pub struct ShutdownManager<A> {
    pub shutdown: Arc<Shutdown<A>>,
    receiver: oneshot::Receiver<A>,
}

impl<A> ShutdownManager<A> {
    pub fn new() -> Self {
        let (sender, receiver) = oneshot::channel();
        let shutdown = Arc::new(Shutdown {
            sender: Mutex::new(Some(sender)),
            tasks: Mutex::new(Vec::new()),
        });

        Self { shutdown, receiver }
    }

    pub async fn await_shutdown(self) -> Result<A, oneshot::error::RecvError> {
        self.receiver.await
    }
}

impl<A> Default for ShutdownManager<A> {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Shutdown<A> {
    sender: Mutex<Option<oneshot::Sender<A>>>,
    tasks: Mutex<Vec<(String, ShutdownTask)>>,
}

impl<A> Shutdown<A> {
    /// Registers cleanup to run when the signal fires. Tasks run in reverse
    /// registration order.
    pub async fn register_shutdown_task<F>(&self, task: F, description: impl Into<String>)
    where
        F: FnOnce() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync + 'static,
    {
        self.tasks
            .lock()
            .await
            .push((description.into(), Box::new(task)));
    }

    /// Runs the registered tasks, each bounded by [`SHUTDOWN_TASK_DEADLINE`],
    /// then delivers `value`. Only the first call has any effect.
    pub async fn trigger(&self, value: A) {
        let mut sender_guard = self.sender.lock().await;
        let Some(sender) = sender_guard.take() else {
            return;
        };
        info!("Triggering shutdown signal");

        let tasks = std::mem::take(&mut *self.tasks.lock().await);
        let total_tasks = tasks.len();

        for (index, (description, task)) in tasks.into_iter().rev().enumerate() {
            info!(
                "[{}/{}] Running shutdown task: {}",
                index + 1,
                total_tasks,
                description
            );
            if timeout(SHUTDOWN_TASK_DEADLINE, task()).await.is_err() {
                warn!("Shutdown task {} missed its deadline, moving on", description);
            }
        }

        if sender.send(value).is_err() {
            warn!("Nobody is waiting for the shutdown signal");
        }
    }

    pub async fn is_triggered(&self) -> bool {
        self.sender.lock().await.is_none()
    }
}
