use std::{env, thread, time::Duration};

use serde_json::{json, Value};
use taskpool_master::{
    Callbacks, Helpers, Pool, PoolConfig, ProgramBuilder, TaskError, ThreadRuntime,
    WorkerExecutionError,
};
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const STEP: Duration = Duration::from_millis(50);

enum Outcome {
    Success(Value),
    Error(WorkerExecutionError),
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> Result<T, Box<dyn std::error::Error>> {
    match env::var(name) {
        Ok(value) => value
            .parse()
            .map_err(|_| format!("{} must be a number, got {:?}", name, value).into()),
        Err(_) => Ok(default),
    }
}

fn simple_program() -> ProgramBuilder {
    ProgramBuilder::new("simple")
        .helper("label", |(msg, step): (String, u64)| {
            Ok::<_, String>(format!("msg[{}] step {}", msg, step))
        })
        .task(|(loop_limit, msg): (u64, String), helpers: &Helpers| {
            for step in 0..loop_limit {
                let label: String = helpers.call("label", (&msg, step))?;
                info!(">> Heavy process in thread: {}", label);
                thread::sleep(STEP);
            }
            Ok::<_, TaskError>(json!({ "msg": msg, "steps": loop_limit }))
        })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let config = PoolConfig::new(env_or("PARTY_SIZE", 2)?).with_retry_interval(
        Duration::from_millis(env_or("RETRY_INTERVAL_MS", 1000)?),
    );

    let (success_tx, mut outcomes) = mpsc::unbounded_channel();
    let error_tx = success_tx.clone();
    let callbacks = Callbacks::new(
        move |result| {
            let _ = success_tx.send(Outcome::Success(result.clone()));
        },
        move |error| {
            let _ = error_tx.send(Outcome::Error(error.clone()));
        },
    );

    let pool = Pool::initialize(config, simple_program(), ThreadRuntime, callbacks).await?;
    info!("Pool ready with config: {:?}", pool.config());

    let runs = [
        (10, "stuff-1"),
        (50, "stuff-3"),
        (20, "stuff-2"),
        (42, "stuff-42"),
        (5, "stuff-5"),
    ];
    let mut submissions = Vec::with_capacity(runs.len());
    for (loop_limit, msg) in runs {
        let pool = pool.clone();
        submissions.push(tokio::spawn(async move {
            pool.submit(vec![json!(loop_limit), json!(msg)]).await
        }));
    }
    for submission in submissions {
        if let Err(error) = submission.await? {
            error!("Submission failed: {}", error);
        }
    }

    for _ in 0..runs.len() {
        match outcomes.recv().await {
            Some(Outcome::Success(result)) => info!("All good in the hood: {}", result),
            Some(Outcome::Error(error)) => error!("Task failed: {}", error),
            None => break,
        }
    }

    info!("Pool stats before shutdown: {:?}", pool.stats().await);
    pool.shutdown().await;

    Ok(())
}
