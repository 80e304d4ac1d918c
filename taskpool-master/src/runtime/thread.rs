use std::{io, thread};

use taskpool_core::{
    protocol::{Reply, Request},
    Program, WorkerId,
};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use super::{ExecutionUnit, Runtime, Signal};
use crate::{config::ResourceLimits, error::SpawnError};

/// Runs every worker on its own OS thread inside the current process.
///
/// A task that panics takes its thread down, which the pool observes as an
/// unexpected termination.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadRuntime;

impl Runtime for ThreadRuntime {
    type Program = Program;
    type Unit = ThreadUnit;

    fn spawn(
        &self,
        id: WorkerId,
        program: &Program,
        limits: &ResourceLimits,
    ) -> Result<ThreadUnit, SpawnError> {
        let (request_tx, mut request_rx) = mpsc::unbounded_channel::<Request>();
        let (reply_tx, reply_rx) = mpsc::unbounded_channel::<Reply>();
        let (exit_tx, exit_rx) = oneshot::channel();
        let program = program.clone();

        let mut builder = thread::Builder::new().name(format!("taskpool-{}", id));
        if let Some(size) = limits.stack_size_bytes() {
            builder = builder.stack_size(size);
        }

        builder
            .spawn(move || {
                let _exit = ExitGuard(Some(exit_tx));
                while let Some(request) = request_rx.blocking_recv() {
                    let sequence = request.sequence;
                    let reply = match program.run(request.args) {
                        Ok(data) => Reply::Result { sequence, data },
                        Err(error) => Reply::Error {
                            sequence,
                            message: error.to_string(),
                        },
                    };
                    if reply_tx.send(reply).is_err() {
                        break;
                    }
                }
            })
            .map_err(|source| SpawnError::Thread { worker: id, source })?;

        Ok(ThreadUnit {
            id,
            requests: Some(request_tx),
            replies: reply_rx,
            exit: Some(exit_rx),
        })
    }
}

// Reports how the thread ended, including by panic.
struct ExitGuard(Option<oneshot::Sender<String>>);

impl Drop for ExitGuard {
    fn drop(&mut self) {
        let reason = if thread::panicking() {
            "task panicked"
        } else {
            "thread exited"
        };
        if let Some(sender) = self.0.take() {
            let _ = sender.send(reason.to_string());
        }
    }
}

pub struct ThreadUnit {
    id: WorkerId,
    requests: Option<mpsc::UnboundedSender<Request>>,
    replies: mpsc::UnboundedReceiver<Reply>,
    exit: Option<oneshot::Receiver<String>>,
}

impl ExecutionUnit for ThreadUnit {
    async fn send(&mut self, request: Request) -> io::Result<()> {
        let requests = self
            .requests
            .as_ref()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "worker terminated"))?;
        requests
            .send(request)
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "worker thread is gone"))
    }

    async fn next_signal(&mut self) -> Signal {
        let Some(exit) = self.exit.as_mut() else {
            return Signal::Exit("thread exited".to_string());
        };

        let signal = tokio::select! {
            biased;
            Some(reply) = self.replies.recv() => Signal::Message(reply),
            reason = exit => Signal::Exit(reason.unwrap_or_else(|_| "thread vanished".to_string())),
        };

        if matches!(signal, Signal::Exit(_)) {
            self.exit = None;
        }
        signal
    }

    async fn terminate(&mut self) {
        // A running task cannot be preempted; the thread ends once it returns.
        if self.requests.take().is_some() {
            debug!("Closed request channel of worker [{}]", self.id);
        }
    }
}
