use std::{sync::Arc, thread};

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use taskpool_core::{
    protocol::{self, Reply, Request},
    Program, TaskError,
};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::{oneshot, RwLock},
};
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};
use tracing::{error, info, warn};

use crate::{
    error_tracker::ErrorTracker,
    shutdown::{shutdown_manager::Shutdown, shutdown_reason::ShutdownReason},
    worker_config::WorkerConfig,
};

/// Runs one task on a fresh thread so the configured stack size applies.
/// A panic inside the task surfaces as `TaskPanicked`.
async fn run_on_task_thread(
    program: &Program,
    args: Vec<Value>,
    stack_size: Option<usize>,
) -> Result<Result<Value, TaskError>, ShutdownReason> {
    let (sender, receiver) = oneshot::channel();
    let program = program.clone();

    let mut builder = thread::Builder::new().name(format!("{}-task", program.name()));
    if let Some(stack_size) = stack_size {
        builder = builder.stack_size(stack_size);
    }
    builder
        .spawn(move || {
            let _ = sender.send(program.run(args));
        })
        .map_err(|error| ShutdownReason::Io(error.to_string()))?;

    receiver.await.map_err(|_| ShutdownReason::TaskPanicked)
}

/// Answers every request read from `input` with one reply on `output`, and
/// returns once the stream ends or the worker can no longer continue.
pub async fn serve_requests<I, O>(
    program: &Program,
    config: &WorkerConfig,
    input: I,
    output: O,
    error_tracker: &RwLock<ErrorTracker>,
) -> ShutdownReason
where
    I: AsyncRead + Unpin,
    O: AsyncWrite + Unpin,
{
    let mut requests = FramedRead::new(input, LinesCodec::new());
    let mut replies = FramedWrite::new(output, LinesCodec::new());

    while let Some(frame) = requests.next().await {
        let line = match frame {
            Ok(line) => line,
            Err(error) => return ShutdownReason::Io(error.to_string()),
        };

        let request = match protocol::decode::<Request>(&line) {
            Ok(request) => {
                error_tracker.write().await.clear();
                request
            }
            Err(error) => {
                warn!("Failed to decode request: {}", error);
                let mut tracker = error_tracker.write().await;
                if tracker.record(error.to_string(), config.max_error_tolerance) {
                    error!("Reached max error tolerance, shutting down");
                    return ShutdownReason::ProtocolErrors(tracker.clone());
                }
                continue;
            }
        };

        let sequence = request.sequence;
        info!("[{}] Executing task #{}", request.worker_id, sequence);

        let reply = match run_on_task_thread(program, request.args, config.stack_size_bytes()).await
        {
            Ok(Ok(data)) => Reply::Result { sequence, data },
            Ok(Err(error)) => {
                warn!("[{}] Task #{} failed: {}", request.worker_id, sequence, error);
                Reply::Error {
                    sequence,
                    message: error.to_string(),
                }
            }
            Err(reason) => {
                error!("[{}] Task #{} panicked", request.worker_id, sequence);
                return reason;
            }
        };

        let line = match protocol::encode(&reply) {
            Ok(line) => line,
            Err(error) => return ShutdownReason::Io(error.to_string()),
        };
        if let Err(error) = replies.send(line).await {
            return ShutdownReason::Io(error.to_string());
        }
    }

    ShutdownReason::InputClosed
}

pub async fn start_task_loop_fiber<I, O>(
    program: Program,
    config: WorkerConfig,
    input: I,
    output: O,
    error_tracker: Arc<RwLock<ErrorTracker>>,
    shutdown: Arc<Shutdown<ShutdownReason>>,
) where
    I: AsyncRead + Unpin + Send + 'static,
    O: AsyncWrite + Unpin + Send + 'static,
{
    let finalizer_shutdown = shutdown.clone();
    let fiber = tokio::spawn(async move {
        let reason = serve_requests(&program, &config, input, output, &error_tracker).await;
        info!("Task loop finished: {:?}", reason);

        // Triggering runs the finalizer below, which aborts this fiber.
        tokio::spawn(async move {
            shutdown.trigger(reason).await;
        });
    });

    finalizer_shutdown
        .register_shutdown_task(
            || {
                Box::pin(async move {
                    fiber.abort();
                })
            },
            "task loop",
        )
        .await;
}
