use std::{collections::HashMap, sync::Arc, time::Duration};

use chrono::Utc;
use log::{error, info, warn};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{broadcast, Semaphore};
use uuid::Uuid;

use pawflow_action::{context::ExecutionContext, Action};
use pawflow_models::{
    core::{CapturedError, ExecutionStatus, TaskExecutionResult},
    errors::{RuntimeError, SendableError},
    events::TaskEvent,
};
use pawflow_utilities::tasklog::LogManager;

const TASK_EVENT_CAPACITY: usize = 256;
const PROGRESS_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Behavior when all worker slots are taken: refuse the run, or let the
/// worker wait for a free slot (the caller still returns immediately).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PoolPolicy {
    #[default]
    Reject,
    Queue,
}

impl PoolPolicy {
    pub fn parse(value: &str) -> Result<Self, SendableError> {
        match value {
            "reject" => Ok(Self::Reject),
            "queue" => Ok(Self::Queue),
            other => Err(RuntimeError::boxed(
                "executor.unknown_pool_policy",
                format!("Unknown pool policy '{other}'"),
            )),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub variables: HashMap<String, Value>,
    pub trigger_info: Option<Value>,
}

struct ActiveTask {
    action: Arc<dyn Action>,
    execution_id: String,
}

/// Runs one action per logical task id, at most one concurrent execution
/// per id. Outcomes are reported through the event channel; `Completed`
/// is sent exactly once per execution, after which the task id is free
/// for re-execution.
pub struct TaskExecutor {
    active: Arc<Mutex<HashMap<String, ActiveTask>>>,
    events: broadcast::Sender<TaskEvent>,
    pool: Arc<Semaphore>,
    policy: PoolPolicy,
    logs: Arc<LogManager>,
}

impl TaskExecutor {
    pub fn new(max_workers: usize, policy: PoolPolicy, logs: Arc<LogManager>) -> Self {
        let (events, _) = broadcast::channel(TASK_EVENT_CAPACITY);
        Self {
            active: Arc::new(Mutex::new(HashMap::new())),
            events,
            pool: Arc::new(Semaphore::new(max_workers.max(1))),
            policy,
            logs,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.events.subscribe()
    }

    /// Starts the action for `task_id` and returns without waiting for it
    /// to finish. Returns false when the task id already has a running
    /// execution, the pool rejected the run, or the task log could not be
    /// created; the original run is unaffected in all three cases.
    pub fn execute(&self, task_id: &str, action: Arc<dyn Action>, options: RunOptions) -> bool {
        let mut active = self.active.lock();
        if active.contains_key(task_id) {
            warn!("Task {} is already running", task_id);
            return false;
        }

        let permit = match self.policy {
            PoolPolicy::Reject => match self.pool.clone().try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    warn!("Worker pool is full, rejecting task {}", task_id);
                    return false;
                }
            },
            PoolPolicy::Queue => None,
        };

        let execution_id = new_execution_id();
        let logger = match self.logs.create_logger(task_id, &execution_id) {
            Ok(logger) => logger,
            Err(err) => {
                error!("Unable to create task log for {}: {}", task_id, err);
                return false;
            }
        };

        let start_time = Utc::now();
        let action_id = action.action_id().to_string();
        let action_type = action.type_name().to_string();
        action.reset();

        if let Err(message) = action.validate() {
            // Validation failures never start a worker; the only event for
            // this execution is a failed completion.
            let result =
                TaskExecutionResult::failure(format!("Invalid action configuration: {message}"));
            logger.error(&result.message);
            logger.finish(result.status.as_str());
            self.logs.close_logger(&execution_id);
            warn!("Task {} rejected by validation: {}", task_id, message);
            let _ = self.events.send(TaskEvent::Completed {
                task_id: task_id.to_string(),
                execution_id,
                action_id,
                action_type,
                start_time,
                result,
                trigger_info: options.trigger_info,
            });
            return true;
        }

        active.insert(
            task_id.to_string(),
            ActiveTask {
                action: action.clone(),
                execution_id: execution_id.clone(),
            },
        );
        drop(active);

        logger.info(&format!("Task {task_id} started"));
        info!("Task {} started", task_id);
        let _ = self.events.send(TaskEvent::Started {
            task_id: task_id.to_string(),
            execution_id: execution_id.clone(),
            action_id: action_id.clone(),
            action_type: action_type.clone(),
            start_time,
        });

        let ctx = ExecutionContext::new(task_id, &execution_id, options.variables, logger.clone());
        let worker = Worker {
            task_id: task_id.to_string(),
            execution_id,
            action_id,
            action_type,
            start_time,
            trigger_info: options.trigger_info,
            action,
            active: self.active.clone(),
            events: self.events.clone(),
            pool: self.pool.clone(),
            logs: self.logs.clone(),
        };
        tokio::spawn(worker.run(ctx, permit));
        true
    }

    /// Requests cooperative cancellation; the action decides when to stop.
    pub fn cancel(&self, task_id: &str) -> bool {
        let active = self.active.lock();
        match active.get(task_id) {
            Some(task) => {
                info!("Canceling task {}", task_id);
                task.action.cancel();
                true
            }
            None => {
                warn!("Task {} is not running", task_id);
                false
            }
        }
    }

    pub fn get_progress(&self, task_id: &str) -> Option<f32> {
        self.active
            .lock()
            .get(task_id)
            .map(|task| task.action.progress())
    }

    pub fn is_running(&self, task_id: &str) -> bool {
        self.active.lock().contains_key(task_id)
    }

    pub fn active_tasks(&self) -> Vec<String> {
        self.active.lock().keys().cloned().collect()
    }

    pub fn execution_id_of(&self, task_id: &str) -> Option<String> {
        self.active
            .lock()
            .get(task_id)
            .map(|task| task.execution_id.clone())
    }
}

struct Worker {
    task_id: String,
    execution_id: String,
    action_id: String,
    action_type: String,
    start_time: chrono::DateTime<Utc>,
    trigger_info: Option<Value>,
    action: Arc<dyn Action>,
    active: Arc<Mutex<HashMap<String, ActiveTask>>>,
    events: broadcast::Sender<TaskEvent>,
    pool: Arc<Semaphore>,
    logs: Arc<LogManager>,
}

impl Worker {
    async fn run(
        self,
        ctx: ExecutionContext,
        permit: Option<tokio::sync::OwnedSemaphorePermit>,
    ) {
        // Under the queue policy the slot is taken here, after execute()
        // has already returned to the caller.
        let _permit = match permit {
            Some(permit) => Some(permit),
            None => self.pool.clone().acquire_owned().await.ok(),
        };

        let logger = ctx.logger_handle();
        let poller = self.spawn_progress_poller();

        let action = self.action.clone();
        let outcome = tokio::task::spawn_blocking(move || {
            let mut ctx = ctx;
            let result = action.execute(&mut ctx);
            (ctx, result)
        })
        .await;

        poller.abort();

        let result = match outcome {
            Ok((ctx, action_result)) => {
                drop(ctx);
                if self.action.is_canceled() {
                    TaskExecutionResult::canceled("Task was canceled")
                } else {
                    TaskExecutionResult::from_action_result(action_result)
                }
            }
            Err(err) => {
                error!("Task {} panicked: {:?}", self.task_id, err);
                TaskExecutionResult::failure_with_error(
                    "Task failed with unhandled panic",
                    CapturedError::new("panic", err.to_string()),
                )
            }
        };

        self.active.lock().remove(&self.task_id);

        match result.status {
            ExecutionStatus::Completed => {
                logger.info(&format!("Task completed: {}", result.message));
                info!("Task {} completed: {}", self.task_id, result.message);
            }
            ExecutionStatus::Canceled => {
                logger.warn(&format!("Task canceled: {}", result.message));
                info!("Task {} canceled", self.task_id);
            }
            _ => {
                logger.error(&format!("Task failed: {}", result.message));
                error!("Task {} failed: {}", self.task_id, result.message);
            }
        }
        logger.finish(result.status.as_str());
        self.logs.close_logger(&self.execution_id);

        let _ = self.events.send(TaskEvent::Completed {
            task_id: self.task_id,
            execution_id: self.execution_id,
            action_id: self.action_id,
            action_type: self.action_type,
            start_time: self.start_time,
            result,
            trigger_info: self.trigger_info,
        });
    }

    fn spawn_progress_poller(&self) -> tokio::task::JoinHandle<()> {
        let action = self.action.clone();
        let events = self.events.clone();
        let task_id = self.task_id.clone();
        let execution_id = self.execution_id.clone();
        tokio::spawn(async move {
            let mut last = -1.0f32;
            let mut interval = tokio::time::interval(PROGRESS_POLL_INTERVAL);
            loop {
                interval.tick().await;
                let progress = action.progress();
                if (progress - last).abs() > f32::EPSILON {
                    last = progress;
                    let _ = events.send(TaskEvent::Progress {
                        task_id: task_id.clone(),
                        execution_id: execution_id.clone(),
                        progress,
                    });
                }
            }
        })
    }
}

fn new_execution_id() -> String {
    let uuid = Uuid::new_v4().simple().to_string();
    format!("exec_{}", &uuid[..8])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    use pawflow_action::ActionCore;
    use pawflow_models::core::{ActionConfig, ActionResult};

    struct SleeperAction {
        core: ActionCore,
        duration: Duration,
        valid: bool,
    }

    impl SleeperAction {
        fn new(duration: Duration) -> Arc<dyn Action> {
            Arc::new(Self {
                core: ActionCore::new("sleeper", ActionConfig::new()),
                duration,
                valid: true,
            })
        }

        fn invalid() -> Arc<dyn Action> {
            Arc::new(Self {
                core: ActionCore::new("sleeper", ActionConfig::new()),
                duration: Duration::ZERO,
                valid: false,
            })
        }
    }

    impl Action for SleeperAction {
        fn core(&self) -> &ActionCore {
            &self.core
        }

        fn type_name(&self) -> &str {
            "sleeper"
        }

        fn validate(&self) -> Result<(), String> {
            if self.valid {
                Ok(())
            } else {
                Err("missing required key".to_string())
            }
        }

        fn execute(&self, _ctx: &mut ExecutionContext) -> ActionResult {
            self.set_progress(0.5);
            let deadline = Instant::now() + self.duration;
            while Instant::now() < deadline {
                if self.is_canceled() {
                    return ActionResult::failure("interrupted");
                }
                std::thread::sleep(Duration::from_millis(10));
            }
            ActionResult::ok("slept")
        }
    }

    struct PanickyAction {
        core: ActionCore,
    }

    impl Action for PanickyAction {
        fn core(&self) -> &ActionCore {
            &self.core
        }

        fn type_name(&self) -> &str {
            "panicky"
        }

        fn execute(&self, _ctx: &mut ExecutionContext) -> ActionResult {
            panic!("boom");
        }
    }

    fn executor(dir: &std::path::Path, max_workers: usize, policy: PoolPolicy) -> TaskExecutor {
        let logs = Arc::new(LogManager::new(dir.join("logs"), 5));
        TaskExecutor::new(max_workers, policy, logs)
    }

    async fn wait_for_completion(rx: &mut broadcast::Receiver<TaskEvent>) -> TaskExecutionResult {
        loop {
            let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .expect("timed out waiting for completion")
                .expect("event channel closed");
            if let TaskEvent::Completed { result, .. } = event {
                return result;
            }
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn same_task_id_cannot_run_twice() {
        let dir = tempfile::tempdir().unwrap();
        let executor = executor(dir.path(), 4, PoolPolicy::Reject);
        let mut rx = executor.subscribe();

        assert!(executor.execute("task_a", SleeperAction::new(Duration::from_millis(300)), RunOptions::default()));
        assert!(!executor.execute("task_a", SleeperAction::new(Duration::ZERO), RunOptions::default()));
        assert!(executor.is_running("task_a"));
        assert_eq!(executor.active_tasks(), vec!["task_a".to_string()]);

        let result = wait_for_completion(&mut rx).await;
        assert_eq!(result.status, ExecutionStatus::Completed);
        assert!(!executor.is_running("task_a"));

        // The id is immediately eligible for re-execution.
        assert!(executor.execute("task_a", SleeperAction::new(Duration::ZERO), RunOptions::default()));
        wait_for_completion(&mut rx).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn validation_failure_emits_only_a_failed_completion() {
        let dir = tempfile::tempdir().unwrap();
        let executor = executor(dir.path(), 4, PoolPolicy::Reject);
        let mut rx = executor.subscribe();

        executor.execute("task_a", SleeperAction::invalid(), RunOptions::default());
        assert!(!executor.is_running("task_a"));

        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        match event {
            TaskEvent::Completed { result, .. } => {
                assert_eq!(result.status, ExecutionStatus::Failed);
                assert!(result.message.contains("Invalid action configuration"));
            }
            other => panic!("expected Completed, got {:?}", other),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn cancellation_yields_canceled_status() {
        let dir = tempfile::tempdir().unwrap();
        let executor = executor(dir.path(), 4, PoolPolicy::Reject);
        let mut rx = executor.subscribe();

        let action = SleeperAction::new(Duration::from_secs(10));
        assert!(executor.execute("task_a", action, RunOptions::default()));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(executor.cancel("task_a"));
        assert!(!executor.cancel("task_missing"));

        let result = wait_for_completion(&mut rx).await;
        assert_eq!(result.status, ExecutionStatus::Canceled);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn panics_become_failed_results() {
        let dir = tempfile::tempdir().unwrap();
        let executor = executor(dir.path(), 4, PoolPolicy::Reject);
        let mut rx = executor.subscribe();

        let action: Arc<dyn Action> = Arc::new(PanickyAction {
            core: ActionCore::new("kaboom", ActionConfig::new()),
        });
        assert!(executor.execute("task_a", action, RunOptions::default()));

        let result = wait_for_completion(&mut rx).await;
        assert_eq!(result.status, ExecutionStatus::Failed);
        assert_eq!(result.error.as_ref().unwrap().kind, "panic");
        assert!(!executor.is_running("task_a"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn full_pool_rejects_under_reject_policy() {
        let dir = tempfile::tempdir().unwrap();
        let executor = executor(dir.path(), 1, PoolPolicy::Reject);
        let mut rx = executor.subscribe();

        assert!(executor.execute("task_a", SleeperAction::new(Duration::from_millis(300)), RunOptions::default()));
        assert!(!executor.execute("task_b", SleeperAction::new(Duration::ZERO), RunOptions::default()));

        wait_for_completion(&mut rx).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn full_pool_queues_under_queue_policy() {
        let dir = tempfile::tempdir().unwrap();
        let executor = executor(dir.path(), 1, PoolPolicy::Queue);
        let mut rx = executor.subscribe();

        assert!(executor.execute("task_a", SleeperAction::new(Duration::from_millis(200)), RunOptions::default()));
        assert!(executor.execute("task_b", SleeperAction::new(Duration::from_millis(50)), RunOptions::default()));

        let first = wait_for_completion(&mut rx).await;
        let second = wait_for_completion(&mut rx).await;
        assert_eq!(first.status, ExecutionStatus::Completed);
        assert_eq!(second.status, ExecutionStatus::Completed);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn progress_is_observable_while_running() {
        let dir = tempfile::tempdir().unwrap();
        let executor = executor(dir.path(), 4, PoolPolicy::Reject);
        let mut rx = executor.subscribe();

        assert!(executor.execute("task_a", SleeperAction::new(Duration::from_millis(300)), RunOptions::default()));

        let mut seen = None;
        for _ in 0..50 {
            if let Some(progress) = executor.get_progress("task_a") {
                if progress > 0.0 {
                    seen = Some(progress);
                    break;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(seen, Some(0.5));
        assert_eq!(executor.get_progress("task_missing"), None);

        wait_for_completion(&mut rx).await;
    }

    #[test]
    fn pool_policy_parses_known_values() {
        assert_eq!(PoolPolicy::parse("reject").unwrap(), PoolPolicy::Reject);
        assert_eq!(PoolPolicy::parse("queue").unwrap(), PoolPolicy::Queue);
        assert!(PoolPolicy::parse("drop").is_err());
    }

    #[test]
    fn execution_ids_are_prefixed_and_short() {
        let id = new_execution_id();
        assert!(id.starts_with("exec_"));
        assert_eq!(id.len(), "exec_".len() + 8);
    }
}
