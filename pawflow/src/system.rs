use std::{sync::Arc, time::Duration};

use log::{info, warn};
use tokio::task::JoinHandle;

use pawflow_action::registry::{register_builtin_actions, ActionRegistry};
use pawflow_config::Config;
use pawflow_executor::{PoolPolicy, TaskExecutor};
use pawflow_history::{spawn_event_feed, TaskHistory};
use pawflow_models::errors::SendableError;
use pawflow_monitor::MonitorManager;
use pawflow_scheduler::TaskScheduler;
use pawflow_trigger::TriggerManager;
use pawflow_utilities::{dirutils, tasklog::LogManager};

/// Explicitly constructed aggregate of every engine component. There are
/// no global singletons; the presentation layer reaches the engine only
/// through the component handles exposed here.
pub struct AutomationSystem {
    config: Config,
    registry: Arc<ActionRegistry>,
    logs: Arc<LogManager>,
    executor: Arc<TaskExecutor>,
    history: Arc<TaskHistory>,
    scheduler: Arc<TaskScheduler>,
    monitors: Arc<MonitorManager>,
    triggers: Arc<TriggerManager>,
    workers: Vec<JoinHandle<()>>,
}

impl AutomationSystem {
    pub fn new(config: Config) -> Result<Self, SendableError> {
        let mut registry = ActionRegistry::new();
        register_builtin_actions(&mut registry);
        Self::with_registry(config, registry)
    }

    /// Builds the system around a caller-supplied registry, so the
    /// application can add its own action types (pawprint analysis,
    /// report generation) before the engine starts.
    pub fn with_registry(config: Config, registry: ActionRegistry) -> Result<Self, SendableError> {
        let (_state_dir, logs_dir) = dirutils::ensure_data_layout(&config.data_dir)?;
        let policy = PoolPolicy::parse(&config.pool_policy)?;

        let logs = Arc::new(LogManager::new(logs_dir, config.max_logs_per_task));
        let executor = Arc::new(TaskExecutor::new(config.max_workers, policy, logs.clone()));
        let history = Arc::new(TaskHistory::new(config.max_history));
        let scheduler = Arc::new(TaskScheduler::new(
            executor.clone(),
            Duration::from_secs(config.scheduler_frequency_seconds),
        ));
        let monitors = Arc::new(MonitorManager::new());
        let triggers = Arc::new(TriggerManager::new(executor.clone()));

        Ok(Self {
            config,
            registry: Arc::new(registry),
            logs,
            executor,
            history,
            scheduler,
            monitors,
            triggers,
            workers: Vec::new(),
        })
    }

    pub fn registry(&self) -> &Arc<ActionRegistry> {
        &self.registry
    }

    pub fn logs(&self) -> &Arc<LogManager> {
        &self.logs
    }

    pub fn executor(&self) -> &Arc<TaskExecutor> {
        &self.executor
    }

    pub fn history(&self) -> &Arc<TaskHistory> {
        &self.history
    }

    pub fn scheduler(&self) -> &Arc<TaskScheduler> {
        &self.scheduler
    }

    pub fn monitors(&self) -> &Arc<MonitorManager> {
        &self.monitors
    }

    pub fn triggers(&self) -> &Arc<TriggerManager> {
        &self.triggers
    }

    /// Restores persisted snapshots, wires the event feeds, and spawns
    /// the scheduler, trigger and monitor loops.
    pub async fn start(&mut self) -> Result<(), SendableError> {
        info!("Starting automation system...");

        let schedules = self
            .scheduler
            .load_from_file(&self.config.schedules_file(), &self.registry)
            .await?;
        let triggers = self
            .triggers
            .load_from_file(&self.config.triggers_file(), &self.registry)
            .await?;
        info!("Restored {} schedule(s) and {} trigger(s)", schedules, triggers);

        let history_file = self.config.history_file();
        if history_file.exists() {
            if let Err(err) = self.history.import_from_file(&history_file) {
                warn!("Could not restore execution history: {}", err);
            }
        }

        self.workers.push(spawn_event_feed(
            self.history.clone(),
            self.executor.subscribe(),
        ));

        let trigger_manager = self.triggers.clone();
        let file_events = self.monitors.subscribe();
        let task_events = self.executor.subscribe();
        self.workers.push(tokio::spawn(async move {
            trigger_manager.run(file_events, task_events).await;
        }));

        let scheduler = self.scheduler.clone();
        self.workers.push(tokio::spawn(async move {
            scheduler.run().await;
        }));

        self.monitors.start_all().await;

        info!("Automation system started");
        Ok(())
    }

    /// Stops the loops, persists schedule/trigger/history snapshots, and
    /// tears down the background workers.
    pub async fn shutdown(&mut self) -> Result<(), SendableError> {
        info!("Stopping automation system...");

        self.scheduler.request_shutdown();
        self.triggers.request_shutdown();
        self.monitors.stop_all().await;

        self.scheduler
            .save_to_file(&self.config.schedules_file())
            .await?;
        self.triggers
            .save_to_file(&self.config.triggers_file())
            .await?;
        self.history.export_to_file(&self.config.history_file())?;

        for worker in self.workers.drain(..) {
            worker.abort();
        }

        info!("Automation system stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use clap::Parser;
    use serde_json::json;

    use pawflow_models::core::{ActionConfig, ExecutionStatus};
    use pawflow_monitor::model::MonitorConfig;
    use pawflow_trigger::{
        condition::{ConditionOperator, TriggerCondition},
        model::{TaskTrigger, TriggerConfig, TriggerType},
    };

    fn config(data_dir: &std::path::Path) -> Config {
        Config::try_parse_from([
            "pawflow",
            "--data-dir",
            data_dir.to_str().unwrap(),
            "--scheduler-frequency-seconds",
            "1",
        ])
        .unwrap()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn snapshots_are_written_on_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let schedules_file = config.schedules_file();

        let mut system = AutomationSystem::new(config).unwrap();
        system.start().await.unwrap();
        system.shutdown().await.unwrap();

        assert!(schedules_file.exists());
        let content = std::fs::read_to_string(&schedules_file).unwrap();
        assert!(content.contains("schedules"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn file_change_flows_through_trigger_into_history() {
        let dir = tempfile::tempdir().unwrap();
        let watched = dir.path().join("incoming");
        std::fs::create_dir_all(&watched).unwrap();

        let mut system = AutomationSystem::new(config(&dir.path().join("data"))).unwrap();

        // Watch for new .json files and write a marker file in response.
        let marker = dir.path().join("marker.txt");
        let mut action_config = ActionConfig::new();
        action_config.insert("file_path".into(), json!(marker.to_str().unwrap()));
        action_config.insert("content".into(), json!("seen"));
        let action = system
            .registry()
            .create("file-write", "write_marker", action_config)
            .unwrap();
        let trigger = TaskTrigger::new(
            "t1",
            "react",
            action,
            TriggerType::FileChange,
            TriggerConfig {
                conditions: vec![TriggerCondition::new(
                    "extension",
                    ConditionOperator::Equals,
                    json!("json"),
                )],
                ..TriggerConfig::default()
            },
        );

        system.triggers().add_trigger(trigger).await;
        assert!(
            system
                .monitors()
                .add_monitor(
                    "m1",
                    &watched,
                    MonitorConfig {
                        check_interval: 0.5,
                        ..MonitorConfig::default()
                    },
                )
                .await
        );

        system.start().await.unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        std::fs::write(watched.join("case.json"), "{}").unwrap();

        // The trigger fires, the action runs, and the completion lands in
        // the history store.
        let mut recorded = false;
        for _ in 0..100 {
            if marker.exists()
                && system
                    .history()
                    .search(&Default::default())
                    .iter()
                    .any(|record| record.status == ExecutionStatus::Completed)
            {
                recorded = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert!(recorded, "triggered execution never reached the history");

        system.shutdown().await.unwrap();
    }
}
