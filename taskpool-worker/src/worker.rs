use std::sync::Arc;

use taskpool_core::Program;
use tokio::{
  io::{AsyncRead, AsyncWrite},
  sync::RwLock,
};
use tracing::{error, info};

use crate::{
  error_tracker::ErrorTracker,
  shutdown::{
    shutdown_manager::{Shutdown, ShutdownManager},
    shutdown_reason::ShutdownReason,
  },
  task_loop::start_task_loop_fiber,
  worker_config::WorkerConfig,
};

pub struct WorkerImpl {
  config: WorkerConfig,
  shutdown: ShutdownManager<ShutdownReason>,
}

async fn start_interrupt_fiber(shutdown: Arc<Shutdown<ShutdownReason>>) {
  let finalizer_shutdown = shutdown.clone();
  let fiber = tokio::spawn(async move {
    match tokio::signal::ctrl_c().await {
      Ok(()) => {
        info!("Received interrupt");
        tokio::spawn(async move {
          shutdown.trigger(ShutdownReason::Interrupted).await;
        });
      }
      Err(error) => error!("Unable to listen for interrupts: {}", error),
    }
  });

  finalizer_shutdown
    .register_shutdown_task(
      || {
        Box::pin(async move {
          fiber.abort();
        })
      },
      "interrupt listener",
    )
    .await;
}

impl WorkerImpl {
  /// Serves `program` over this process's stdin and stdout.
  pub async fn new(program: Program, config: WorkerConfig) -> Self {
    let worker = Self::with_io(program, config, tokio::io::stdin(), tokio::io::stdout()).await;
    start_interrupt_fiber(worker.shutdown.shutdown.clone()).await;
    worker
  }

  pub async fn with_io<I, O>(program: Program, config: WorkerConfig, input: I, output: O) -> Self
  where
    I: AsyncRead + Unpin + Send + 'static,
    O: AsyncWrite + Unpin + Send + 'static,
  {
    info!("Starting worker for program {} with config: {:?}", program.name(), config);

    let shutdown_manager = ShutdownManager::new();
    let error_tracker = Arc::new(RwLock::new(ErrorTracker::default()));

    start_task_loop_fiber(
      program,
      config.clone(),
      input,
      output,
      error_tracker,
      shutdown_manager.shutdown.clone(),
    )
    .await;

    WorkerImpl {
      config,
      shutdown: shutdown_manager,
    }
  }

  pub fn config(&self) -> &WorkerConfig {
    &self.config
  }

  pub async fn await_shutdown(self) -> ShutdownReason {
    match self.shutdown.await_shutdown().await {
      Ok(reason) => reason,
      Err(error) => ShutdownReason::Io(error.to_string()),
    }
  }
}
