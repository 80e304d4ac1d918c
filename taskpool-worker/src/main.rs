use std::{thread, time::Duration};

use serde_json::{json, Value};
use taskpool_core::{BuildProgram, Helpers, Program, ProgramBuilder, ProgramBuildError};
use taskpool_worker::{WorkerConfig, WorkerImpl};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// The sample program. The first argument selects what the task does:
///
/// - `["simple", limit, message]` counts to `limit`, pausing between steps
/// - `["echo", ...]` returns the remaining arguments
/// - `["fail", message]` fails with `message`
/// - `["exit", code]` ends the process with `code`
/// - `["panic"]` panics inside the task
/// - `["env"]` returns the worker id and stack size this process was given
fn sample_program() -> Result<Program, ProgramBuildError> {
    ProgramBuilder::new("sample")
        .helper("pause", |millis: u64| {
            thread::sleep(Duration::from_millis(millis));
            Ok::<_, String>(())
        })
        .task(|args: Vec<Value>, helpers: &Helpers| {
            let mut args = args.into_iter();
            let command = args.next().unwrap_or(Value::Null);
            let rest: Vec<Value> = args.collect();

            match command.as_str() {
                Some("simple") => {
                    let limit = rest.first().and_then(Value::as_u64).unwrap_or(0);
                    let message = rest.get(1).and_then(Value::as_str).unwrap_or_default();
                    for step in 0..limit {
                        info!(">> Heavy process in worker: {}[{}]", message, step);
                        helpers.call::<_, ()>("pause", 10u64).map_err(|e| e.to_string())?;
                    }
                    Ok(json!({ "message": message, "steps": limit }))
                }
                Some("echo") => Ok(Value::Array(rest)),
                Some("fail") => Err(rest
                    .first()
                    .and_then(Value::as_str)
                    .unwrap_or("task failed")
                    .to_string()),
                Some("exit") => {
                    let code = rest.first().and_then(Value::as_i64).unwrap_or(1);
                    std::process::exit(code as i32)
                }
                Some("panic") => panic!("sample task panicked"),
                Some("env") => {
                    let config = WorkerConfig::from_env().map_err(|e| e.to_string())?;
                    Ok(json!({
                        "worker_id": config.worker_id,
                        "stack_size_mb": config.stack_size_mb,
                    }))
                }
                _ => Err(format!("unknown command: {}", command)),
            }
        })
        .build()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let config = WorkerConfig::from_env()?;
    let worker = WorkerImpl::new(sample_program()?, config).await;
    if let Some(worker_id) = &worker.config().worker_id {
        info!("Serving requests as worker [{}]", worker_id);
    }

    let shutdown_reason = worker.await_shutdown().await;

    info!("Shutting down due to: {:?}", shutdown_reason);

    // The stdin reader may still be parked in a blocking read, which would
    // keep the runtime from dropping.
    std::process::exit(if shutdown_reason.is_clean() { 0 } else { 1 })
}
