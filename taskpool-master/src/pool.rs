use std::{collections::VecDeque, sync::Arc};

use serde_json::Value;
use taskpool_core::BuildProgram;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::{
    callbacks::Callbacks,
    config::PoolConfig,
    error::{InitError, NoIdleWorkerError, SpawnError, WorkerExecutionError},
    retry,
    runtime::Runtime,
    state::State,
    task::Task,
    worker::{Worker, WorkerState},
};

/// What became of a submitted task.
#[derive(Debug, Clone, PartialEq)]
pub enum Submission {
    // A worker ran the task and produced this result.
    Completed(Value),
    // No worker was idle. The task waits on the retry queue and its outcome
    // will only be reported through the callbacks.
    Queued,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub party_size: usize,
    pub idle: usize,
    pub busy: usize,
    pub queued: usize,
    pub vacant: usize,
}

/// A fixed-size pool of workers all running the same program.
///
/// Cloning a `Pool` yields another handle to the same workers.
pub struct Pool<R: Runtime> {
    shared: Arc<Shared<R>>,
}

impl<R: Runtime> Clone for Pool<R> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

pub(crate) struct Shared<R: Runtime> {
    pub(crate) config: PoolConfig,
    runtime: R,
    program: R::Program,
    callbacks: Callbacks,
    pub(crate) state: Mutex<State<R::Unit>>,
}

impl<R: Runtime> Pool<R> {
    /// Builds the program once and spawns `party_size` workers running it.
    pub async fn initialize<B>(
        config: PoolConfig,
        builder: B,
        runtime: R,
        callbacks: Callbacks,
    ) -> Result<Self, InitError>
    where
        B: BuildProgram<Program = R::Program>,
    {
        if config.party_size == 0 {
            return Err(InitError::EmptyParty);
        }
        if config.retry_interval.is_zero() {
            return Err(InitError::ZeroRetryInterval);
        }

        let program = builder.build()?;

        info!("Starting pool with {} workers", config.party_size);

        let mut idle = VecDeque::with_capacity(config.party_size);
        while idle.len() < config.party_size {
            match Worker::spawn(&runtime, &program, &config.resource_limits) {
                Ok(worker) => idle.push_back(worker),
                Err(spawn_error) => {
                    error!("Failed to spawn worker: {}", spawn_error);
                    for mut worker in idle {
                        worker.terminate().await;
                    }
                    return Err(spawn_error.into());
                }
            }
        }

        Ok(Self {
            shared: Arc::new(Shared {
                config,
                runtime,
                program,
                callbacks,
                state: Mutex::new(State::new(idle)),
            }),
        })
    }

    /// Runs `args` on an idle worker, or queues them when every worker is
    /// busy.
    ///
    /// Exactly one of the callbacks fires for every submission, whether it
    /// completes here or later from the retry queue.
    pub async fn submit(&self, args: Vec<Value>) -> Result<Submission, WorkerExecutionError> {
        let task = Task::new(args);

        let worker = {
            let mut state = self.shared.state.lock().await;
            if state.closed {
                drop(state);
                return Err(self.shared.reject());
            }

            match state.take_idle() {
                Ok(worker) => worker,
                Err(NoIdleWorkerError) => {
                    info!(
                        "No idle worker found, queueing task ({} already waiting)",
                        state.retry.len()
                    );
                    state.retry.push_back(task);
                    retry::start(&self.shared, &mut state);
                    return Ok(Submission::Queued);
                }
            }
        };

        // Settles on its own task so that a caller dropping this future
        // cannot strand the worker.
        let worker_id = worker.id();
        let shared = self.shared.clone();
        match tokio::spawn(async move { shared.execute(worker, task).await }).await {
            Ok(outcome) => outcome.map(Submission::Completed),
            Err(join_error) => Err(WorkerExecutionError::Channel {
                worker: worker_id,
                message: join_error.to_string(),
            }),
        }
    }

    pub async fn stats(&self) -> PoolStats {
        let state = self.shared.state.lock().await;
        PoolStats {
            party_size: self.shared.config.party_size,
            idle: state.idle.len(),
            busy: state.busy,
            queued: state.retry.len(),
            vacant: state.vacant,
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    /// Terminates idle workers and fails every queued task with
    /// [`WorkerExecutionError::PoolClosed`]. Busy workers are terminated as
    /// soon as their current task settles.
    pub async fn shutdown(&self) {
        let (idle, dropped) = {
            let mut state = self.shared.state.lock().await;
            if state.closed {
                return;
            }
            state.closed = true;
            if let Some(fiber) = state.retry_fiber.take() {
                fiber.abort();
                info!("Stopped retry scheduler");
            }
            (
                std::mem::take(&mut state.idle),
                std::mem::take(&mut state.retry),
            )
        };

        if !dropped.is_empty() {
            warn!("Dropping {} queued task(s) on shutdown", dropped.len());
        }
        for _ in &dropped {
            self.shared.reject();
        }

        for mut worker in idle {
            worker.terminate().await;
        }

        info!("Pool shut down");
    }

    #[cfg(test)]
    async fn idle_worker_ids(&self) -> Vec<taskpool_core::WorkerId> {
        let state = self.shared.state.lock().await;
        state.idle.iter().map(Worker::id).collect()
    }
}

impl<R: Runtime> Shared<R> {
    pub(crate) fn spawn_worker(&self) -> Result<Worker<R::Unit>, SpawnError> {
        Worker::spawn(&self.runtime, &self.program, &self.config.resource_limits)
    }

    /// Runs a task on a worker already taken from the idle queue and settles
    /// it: callbacks fire and the worker is either returned or replaced.
    pub(crate) async fn execute(
        self: &Arc<Self>,
        mut worker: Worker<R::Unit>,
        task: Task,
    ) -> Result<Value, WorkerExecutionError> {
        match worker.run_task(task.into_args()).await {
            Ok(result) => {
                self.callbacks.success(&result);
                self.release(worker).await;
                Ok(result)
            }
            Err(error) => {
                self.recover(worker, &error).await;
                self.callbacks.error(&error);
                Err(error)
            }
        }
    }

    async fn release(&self, mut worker: Worker<R::Unit>) {
        debug_assert_eq!(worker.state(), WorkerState::Idle);
        let mut state = self.state.lock().await;
        state.busy -= 1;
        if state.closed {
            drop(state);
            worker.terminate().await;
            return;
        }
        state.idle.push_back(worker);
    }

    async fn recover(self: &Arc<Self>, mut worker: Worker<R::Unit>, cause: &WorkerExecutionError) {
        error!(
            "Worker [{}] crashed, spawning a replacement: {}",
            worker.id(),
            cause
        );

        worker.terminate().await;
        let replacement = self.spawn_worker();

        let mut state = self.state.lock().await;
        state.busy -= 1;
        match replacement {
            Ok(mut replacement) => {
                if state.closed {
                    drop(state);
                    replacement.terminate().await;
                } else {
                    info!("Spawn new worker [{}]", replacement.id());
                    state.idle.push_back(replacement);
                }
            }
            Err(spawn_error) => {
                error!("Failed to spawn replacement worker: {}", spawn_error);
                if !state.closed {
                    state.vacant += 1;
                    retry::start(self, &mut state);
                }
            }
        }
    }

    fn reject(&self) -> WorkerExecutionError {
        let error = WorkerExecutionError::PoolClosed;
        self.callbacks.error(&error);
        error
    }
}

impl<R: Runtime> Drop for Shared<R> {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if let Some(fiber) = state.retry_fiber.take() {
            fiber.abort();
        }

        let dropped = std::mem::take(&mut state.retry);
        if !dropped.is_empty() {
            warn!("Pool dropped with {} queued task(s)", dropped.len());
        }
        for _ in &dropped {
            self.callbacks.error(&WorkerExecutionError::PoolClosed);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashSet,
        io,
        sync::{
            atomic::{AtomicBool, Ordering},
            Arc,
        },
        thread,
        time::Duration,
    };

    use futures_util::future::join_all;
    use serde_json::json;
    use taskpool_core::{Helpers, Program, ProgramBuildError, ProgramBuilder, WorkerId};
    use tokio::{
        sync::mpsc,
        time::{sleep, timeout},
    };

    use super::*;
    use crate::{
        config::{ResourceLimits, DEFAULT_RETRY_INTERVAL},
        runtime::thread::{ThreadRuntime, ThreadUnit},
    };

    #[derive(Debug, Clone, PartialEq)]
    enum Outcome {
        Success(Value),
        Error(WorkerExecutionError),
    }

    fn recorder() -> (Callbacks, mpsc::UnboundedReceiver<Outcome>) {
        let (success_tx, rx) = mpsc::unbounded_channel();
        let error_tx = success_tx.clone();
        let callbacks = Callbacks::new(
            move |result| {
                let _ = success_tx.send(Outcome::Success(result.clone()));
            },
            move |error| {
                let _ = error_tx.send(Outcome::Error(error.clone()));
            },
        );
        (callbacks, rx)
    }

    async fn next_outcome(outcomes: &mut mpsc::UnboundedReceiver<Outcome>) -> Outcome {
        timeout(Duration::from_secs(5), outcomes.recv())
            .await
            .expect("timed out waiting for a callback")
            .expect("callbacks dropped")
    }

    async fn assert_no_more_outcomes(outcomes: &mut mpsc::UnboundedReceiver<Outcome>) {
        sleep(Duration::from_millis(50)).await;
        assert!(outcomes.try_recv().is_err());
    }

    async fn wait_until<R: Runtime>(pool: &Pool<R>, check: impl Fn(&PoolStats) -> bool) -> PoolStats {
        timeout(Duration::from_secs(5), async {
            loop {
                let stats = pool.stats().await;
                if check(&stats) {
                    return stats;
                }
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("pool never reached the expected state")
    }

    // ["sleep", ms, ..] sleeps then echoes, ["fail"] errors, ["panic"] kills
    // the worker thread, anything else is echoed back.
    fn echo_program() -> ProgramBuilder {
        ProgramBuilder::new("echo").task(|args: Vec<Value>, _: &Helpers| {
            match args.first().and_then(Value::as_str) {
                Some("panic") => panic!("worker crashed on purpose"),
                Some("fail") => Err("task failed on purpose".to_string()),
                Some("sleep") => {
                    let millis = args.get(1).and_then(Value::as_u64).unwrap_or(0);
                    thread::sleep(Duration::from_millis(millis));
                    Ok(Value::Array(args))
                }
                _ => Ok(Value::Array(args)),
            }
        })
    }

    async fn thread_pool(
        party_size: usize,
        retry_interval: Duration,
    ) -> (Pool<ThreadRuntime>, mpsc::UnboundedReceiver<Outcome>) {
        let (callbacks, outcomes) = recorder();
        let config = PoolConfig::new(party_size).with_retry_interval(retry_interval);
        let pool = Pool::initialize(config, echo_program(), ThreadRuntime, callbacks)
            .await
            .unwrap();
        (pool, outcomes)
    }

    #[tokio::test]
    async fn test_five_tasks_on_three_workers() {
        let (pool, mut outcomes) = thread_pool(3, Duration::from_millis(20)).await;

        let submissions = join_all(
            (0..5).map(|i| pool.submit(vec![json!("sleep"), json!(30), json!(i)])),
        )
        .await;

        let completed = submissions
            .iter()
            .filter(|s| matches!(s, Ok(Submission::Completed(_))))
            .count();
        let queued = submissions
            .iter()
            .filter(|s| matches!(s, Ok(Submission::Queued)))
            .count();
        assert_eq!((completed, queued), (3, 2));

        let mut seen = HashSet::new();
        for _ in 0..5 {
            match next_outcome(&mut outcomes).await {
                Outcome::Success(Value::Array(args)) => {
                    seen.insert(args[2].as_u64().unwrap());
                }
                other => panic!("unexpected outcome {:?}", other),
            }
        }
        assert_eq!(seen, (0..5).collect::<HashSet<_>>());
        assert_no_more_outcomes(&mut outcomes).await;

        let stats = wait_until(&pool, |s| s.idle == 3).await;
        assert_eq!(stats.busy, 0);
        assert_eq!(stats.queued, 0);
    }

    #[tokio::test]
    async fn test_second_task_waits_for_the_only_worker() {
        let (pool, mut outcomes) = thread_pool(1, Duration::from_millis(50)).await;

        let first = tokio::spawn({
            let pool = pool.clone();
            async move { pool.submit(vec![json!("sleep"), json!(100), json!("first")]).await }
        });
        wait_until(&pool, |s| s.busy == 1).await;

        let second = pool.submit(vec![json!("second")]).await.unwrap();
        assert_eq!(second, Submission::Queued);
        assert_eq!(pool.stats().await.queued, 1);

        assert_eq!(
            first.await.unwrap().unwrap(),
            Submission::Completed(json!(["sleep", 100, "first"]))
        );
        assert_eq!(
            next_outcome(&mut outcomes).await,
            Outcome::Success(json!(["sleep", 100, "first"]))
        );
        assert_eq!(
            next_outcome(&mut outcomes).await,
            Outcome::Success(json!(["second"]))
        );

        let stats = wait_until(&pool, |s| s.idle == 1).await;
        assert_eq!(stats.queued, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_queued_task_waits_for_the_retry_timer() {
        let (pool, mut outcomes) = thread_pool(1, DEFAULT_RETRY_INTERVAL).await;

        let first = tokio::spawn({
            let pool = pool.clone();
            async move { pool.submit(vec![json!("sleep"), json!(50), json!("first")]).await }
        });
        wait_until(&pool, |s| s.busy == 1).await;
        assert_eq!(
            pool.submit(vec![json!("second")]).await.unwrap(),
            Submission::Queued
        );

        first.await.unwrap().unwrap();
        assert_eq!(
            outcomes.recv().await,
            Some(Outcome::Success(json!(["sleep", 50, "first"])))
        );

        // The worker is free again, but the queued task stays put until the
        // next tick.
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        let stats = pool.stats().await;
        assert_eq!((stats.idle, stats.queued), (1, 1));
        assert!(outcomes.try_recv().is_err());

        tokio::time::advance(DEFAULT_RETRY_INTERVAL).await;
        assert_eq!(
            outcomes.recv().await,
            Some(Outcome::Success(json!(["second"])))
        );
        let stats = wait_until(&pool, |s| s.idle == 1).await;
        assert_eq!(stats.queued, 0);
    }

    #[tokio::test]
    async fn test_abandoned_submission_still_settles() {
        let (pool, mut outcomes) = thread_pool(1, Duration::from_millis(10)).await;

        let abandoned = timeout(
            Duration::from_millis(20),
            pool.submit(vec![json!("sleep"), json!(150), json!("abandoned")]),
        )
        .await;
        assert!(abandoned.is_err());

        assert_eq!(
            next_outcome(&mut outcomes).await,
            Outcome::Success(json!(["sleep", 150, "abandoned"]))
        );
        let stats = wait_until(&pool, |s| s.idle == 1).await;
        assert_eq!(stats.busy, 0);

        assert_eq!(
            pool.submit(vec![json!("after")]).await.unwrap(),
            Submission::Completed(json!(["after"]))
        );
        assert_eq!(
            next_outcome(&mut outcomes).await,
            Outcome::Success(json!(["after"]))
        );
    }

    #[tokio::test]
    async fn test_dropping_the_pool_fails_queued_tasks() {
        let (pool, mut outcomes) = thread_pool(1, Duration::from_secs(60)).await;

        let blocker = tokio::spawn({
            let pool = pool.clone();
            async move { pool.submit(vec![json!("sleep"), json!(100), json!("blocker")]).await }
        });
        wait_until(&pool, |s| s.busy == 1).await;
        assert_eq!(
            pool.submit(vec![json!("queued")]).await.unwrap(),
            Submission::Queued
        );

        drop(pool);
        assert!(blocker.await.unwrap().is_ok());

        assert_eq!(
            next_outcome(&mut outcomes).await,
            Outcome::Success(json!(["sleep", 100, "blocker"]))
        );
        assert_eq!(
            next_outcome(&mut outcomes).await,
            Outcome::Error(WorkerExecutionError::PoolClosed)
        );
        assert_no_more_outcomes(&mut outcomes).await;
    }

    #[tokio::test]
    async fn test_crashed_worker_is_replaced() {
        let (pool, mut outcomes) = thread_pool(2, Duration::from_millis(20)).await;
        let before = pool.idle_worker_ids().await;

        let error = pool.submit(vec![json!("panic")]).await.unwrap_err();
        let crashed = error.worker().unwrap();
        assert!(matches!(error, WorkerExecutionError::Terminated { .. }));
        assert_eq!(before[0], crashed);

        assert_eq!(next_outcome(&mut outcomes).await, Outcome::Error(error));
        assert_no_more_outcomes(&mut outcomes).await;

        let stats = pool.stats().await;
        assert_eq!((stats.idle, stats.busy, stats.vacant), (2, 0, 0));

        let after = pool.idle_worker_ids().await;
        assert!(!after.contains(&crashed));
        assert_eq!(after[0], before[1]);

        // The replacement takes work like any other worker.
        pool.submit(vec![json!("x")]).await.unwrap();
        pool.submit(vec![json!("y")]).await.unwrap();
    }

    #[tokio::test]
    async fn test_task_error_also_replaces_the_worker() {
        let (pool, mut outcomes) = thread_pool(1, Duration::from_millis(20)).await;
        let before = pool.idle_worker_ids().await;

        let error = pool.submit(vec![json!("fail")]).await.unwrap_err();
        assert_eq!(
            error,
            WorkerExecutionError::TaskFailed {
                worker: before[0],
                message: "task failed on purpose".to_string()
            }
        );
        assert_eq!(next_outcome(&mut outcomes).await, Outcome::Error(error));

        let after = pool.idle_worker_ids().await;
        assert_eq!(after.len(), 1);
        assert_ne!(after[0], before[0]);
    }

    #[tokio::test]
    async fn test_arguments_reach_the_program_unmodified() {
        let (pool, mut outcomes) = thread_pool(1, Duration::from_millis(20)).await;
        let args = vec![
            json!("echo"),
            json!(3.5),
            json!(null),
            json!({ "nested": [1, "two", { "three": true }] }),
            json!([]),
        ];

        let submission = pool.submit(args.clone()).await.unwrap();

        assert_eq!(submission, Submission::Completed(Value::Array(args.clone())));
        assert_eq!(
            next_outcome(&mut outcomes).await,
            Outcome::Success(Value::Array(args))
        );
    }

    #[tokio::test]
    async fn test_queued_tasks_run_in_submission_order() {
        let (pool, mut outcomes) = thread_pool(1, Duration::from_millis(10)).await;

        let blocker = tokio::spawn({
            let pool = pool.clone();
            async move { pool.submit(vec![json!("sleep"), json!(80), json!("blocker")]).await }
        });
        wait_until(&pool, |s| s.busy == 1).await;

        for name in ["a", "b", "c"] {
            assert_eq!(
                pool.submit(vec![json!(name)]).await.unwrap(),
                Submission::Queued
            );
        }
        blocker.await.unwrap().unwrap();

        let mut order = Vec::new();
        for _ in 0..4 {
            match next_outcome(&mut outcomes).await {
                Outcome::Success(Value::Array(args)) => order.push(args.last().cloned().unwrap()),
                other => panic!("unexpected outcome {:?}", other),
            }
        }
        assert_eq!(
            order,
            vec![json!("blocker"), json!("a"), json!("b"), json!("c")]
        );
    }

    #[tokio::test]
    async fn test_party_size_is_conserved() {
        let (pool, mut outcomes) = thread_pool(2, Duration::from_millis(10)).await;

        let jobs = vec![
            vec![json!("sleep"), json!(30)],
            vec![json!("panic")],
            vec![json!("fail")],
            vec![json!("sleep"), json!(10)],
            vec![json!("panic")],
            vec![json!("ok")],
        ];
        let total = jobs.len();
        for args in jobs {
            let pool = pool.clone();
            tokio::spawn(async move {
                let _ = pool.submit(args).await;
            });
        }

        let mut settled = 0;
        while settled < total {
            let stats = pool.stats().await;
            assert_eq!(stats.idle + stats.busy + stats.vacant, 2, "{:?}", stats);
            if let Ok(Some(_)) = timeout(Duration::from_millis(5), outcomes.recv()).await {
                settled += 1;
            }
        }

        assert_no_more_outcomes(&mut outcomes).await;
        let stats = wait_until(&pool, |s| s.idle == 2).await;
        assert_eq!(stats.queued, 0);
    }

    #[tokio::test]
    async fn test_shutdown_fails_queued_and_later_tasks() {
        let (pool, mut outcomes) = thread_pool(1, Duration::from_secs(60)).await;

        let blocker = tokio::spawn({
            let pool = pool.clone();
            async move { pool.submit(vec![json!("sleep"), json!(100), json!("blocker")]).await }
        });
        wait_until(&pool, |s| s.busy == 1).await;
        assert_eq!(
            pool.submit(vec![json!("queued")]).await.unwrap(),
            Submission::Queued
        );

        pool.shutdown().await;
        assert_eq!(
            next_outcome(&mut outcomes).await,
            Outcome::Error(WorkerExecutionError::PoolClosed)
        );

        // The running task still settles normally.
        assert!(blocker.await.unwrap().is_ok());
        assert_eq!(
            next_outcome(&mut outcomes).await,
            Outcome::Success(json!(["sleep", 100, "blocker"]))
        );

        assert_eq!(
            pool.submit(vec![json!("late")]).await,
            Err(WorkerExecutionError::PoolClosed)
        );
        assert_eq!(
            next_outcome(&mut outcomes).await,
            Outcome::Error(WorkerExecutionError::PoolClosed)
        );

        let stats = pool.stats().await;
        assert_eq!((stats.idle, stats.busy, stats.queued), (0, 0, 0));
    }

    #[tokio::test]
    async fn test_initialize_rejects_bad_input() {
        let (callbacks, _) = recorder();
        let result =
            Pool::initialize(PoolConfig::new(0), echo_program(), ThreadRuntime, callbacks.clone())
                .await;
        assert!(matches!(result, Err(InitError::EmptyParty)));

        let config = PoolConfig::new(1).with_retry_interval(Duration::ZERO);
        let result = Pool::initialize(config, echo_program(), ThreadRuntime, callbacks.clone()).await;
        assert!(matches!(result, Err(InitError::ZeroRetryInterval)));

        let result = Pool::initialize(
            PoolConfig::new(2),
            ProgramBuilder::new("no task"),
            ThreadRuntime,
            callbacks,
        )
        .await;
        assert!(matches!(
            result,
            Err(InitError::Build(ProgramBuildError::MissingTask(_)))
        ));
    }

    #[tokio::test]
    async fn test_workers_run_on_their_own_named_threads() {
        let (callbacks, _) = recorder();
        let config = PoolConfig::new(2).with_resource_limits(ResourceLimits {
            stack_size_mb: Some(4),
        });
        let program = ProgramBuilder::new("whoami").task(|_: Vec<Value>, _: &Helpers| {
            Ok::<_, String>(thread::current().name().map(str::to_string))
        });
        let pool = Pool::initialize(config, program, ThreadRuntime, callbacks)
            .await
            .unwrap();
        let ids = pool.idle_worker_ids().await;

        let first = pool.submit(vec![]).await.unwrap();
        let second = pool.submit(vec![]).await.unwrap();

        assert_eq!(first, Submission::Completed(json!(format!("taskpool-{}", ids[0]))));
        assert_eq!(second, Submission::Completed(json!(format!("taskpool-{}", ids[1]))));
    }

    /// Wraps [`ThreadRuntime`] and refuses to spawn while `failing` is set.
    struct FlakyRuntime {
        failing: Arc<AtomicBool>,
    }

    impl Runtime for FlakyRuntime {
        type Program = Program;
        type Unit = ThreadUnit;

        fn spawn(
            &self,
            id: WorkerId,
            program: &Program,
            limits: &ResourceLimits,
        ) -> Result<ThreadUnit, SpawnError> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(SpawnError::Thread {
                    worker: id,
                    source: io::Error::other("no threads left"),
                });
            }
            ThreadRuntime.spawn(id, program, limits)
        }
    }

    #[tokio::test]
    async fn test_vacancy_is_refilled_by_the_scheduler() {
        let failing = Arc::new(AtomicBool::new(false));
        let (callbacks, mut outcomes) = recorder();
        let config = PoolConfig::new(1).with_retry_interval(Duration::from_millis(10));
        let runtime = FlakyRuntime {
            failing: failing.clone(),
        };
        let pool = Pool::initialize(config, echo_program(), runtime, callbacks)
            .await
            .unwrap();

        failing.store(true, Ordering::SeqCst);
        assert!(pool.submit(vec![json!("panic")]).await.is_err());
        assert!(matches!(next_outcome(&mut outcomes).await, Outcome::Error(_)));

        let stats = pool.stats().await;
        assert_eq!((stats.idle, stats.busy, stats.vacant), (0, 0, 1));

        // Queued while the slot is empty, dispatched once it is refilled.
        assert_eq!(
            pool.submit(vec![json!("waiting")]).await.unwrap(),
            Submission::Queued
        );
        failing.store(false, Ordering::SeqCst);

        assert_eq!(
            next_outcome(&mut outcomes).await,
            Outcome::Success(json!(["waiting"]))
        );
        let stats = wait_until(&pool, |s| s.idle == 1).await;
        assert_eq!((stats.vacant, stats.queued), (0, 0));
    }
}
