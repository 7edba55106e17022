pub mod model;
pub mod snapshot;

use std::{collections::HashMap, path::Path, sync::Arc, time::Duration};

use chrono::Local;
use log::{info, warn};
use serde_json::json;
use tokio::sync::{Notify, RwLock};
use uuid::Uuid;

use pawflow_action::registry::ActionRegistry;
use pawflow_executor::{RunOptions, TaskExecutor};
use pawflow_models::errors::SendableError;

use crate::{
    model::{ScheduleConfig, ScheduleType, TaskSchedule},
    snapshot::{ScheduleSnapshot, SchedulesSnapshot},
};

/// Fields of a schedule that can change after creation. Changing the
/// config or type recomputes the next run time.
#[derive(Debug, Default, Clone)]
pub struct ScheduleUpdate {
    pub enabled: Option<bool>,
    pub config: Option<ScheduleConfig>,
    pub schedule_type: Option<ScheduleType>,
}

/// Scans enabled schedules on a periodic tick and hands due ones to the
/// executor. Firing never waits for the action to finish.
pub struct TaskScheduler {
    schedules: Arc<RwLock<HashMap<String, TaskSchedule>>>,
    executor: Arc<TaskExecutor>,
    shutdown: Notify,
    frequency: Duration,
}

impl TaskScheduler {
    pub fn new(executor: Arc<TaskExecutor>, frequency: Duration) -> Self {
        Self {
            schedules: Arc::new(RwLock::new(HashMap::new())),
            executor,
            shutdown: Notify::new(),
            frequency,
        }
    }

    pub async fn add_schedule(&self, schedule: TaskSchedule) -> bool {
        let mut schedules = self.schedules.write().await;
        if schedules.contains_key(&schedule.schedule_id) {
            warn!("Schedule with ID {} already exists", schedule.schedule_id);
            return false;
        }
        info!(
            "Added schedule {} for task {}",
            schedule.schedule_id, schedule.task_id
        );
        schedules.insert(schedule.schedule_id.clone(), schedule);
        true
    }

    pub async fn update_schedule(&self, schedule_id: &str, updates: ScheduleUpdate) -> bool {
        let mut schedules = self.schedules.write().await;
        let Some(schedule) = schedules.get_mut(schedule_id) else {
            warn!("Schedule with ID {} does not exist", schedule_id);
            return false;
        };

        if let Some(enabled) = updates.enabled {
            schedule.enabled = enabled;
        }
        let mut recompute = false;
        if let Some(config) = updates.config {
            schedule.config = config;
            recompute = true;
        }
        if let Some(schedule_type) = updates.schedule_type {
            schedule.schedule_type = schedule_type;
            recompute = true;
        }
        if recompute {
            schedule.recompute(Local::now());
        }
        info!("Updated schedule {}", schedule_id);
        true
    }

    pub async fn remove_schedule(&self, schedule_id: &str) -> bool {
        let mut schedules = self.schedules.write().await;
        if schedules.remove(schedule_id).is_none() {
            warn!("Schedule with ID {} does not exist", schedule_id);
            return false;
        }
        info!("Removed schedule {}", schedule_id);
        true
    }

    pub async fn get_schedule(&self, schedule_id: &str) -> Option<TaskSchedule> {
        self.schedules.read().await.get(schedule_id).cloned()
    }

    pub async fn schedules(&self) -> Vec<TaskSchedule> {
        self.schedules.read().await.values().cloned().collect()
    }

    pub async fn schedule_count(&self) -> usize {
        self.schedules.read().await.len()
    }

    /// One scheduler pass: fire every due schedule, recompute its next
    /// run, and drop one-time schedules that fired. A rejected execution
    /// is a logged skip; the schedule stays armed.
    pub async fn tick(&self) {
        let now = Local::now();
        let due: Vec<String> = {
            let schedules = self.schedules.read().await;
            schedules
                .values()
                .filter(|schedule| schedule.is_due(now))
                .map(|schedule| schedule.schedule_id.clone())
                .collect()
        };

        for schedule_id in due {
            let mut schedules = self.schedules.write().await;
            let Some(schedule) = schedules.get_mut(&schedule_id) else {
                continue;
            };

            let task_id = format!("{}_scheduled_{}", schedule.task_id, short_suffix());
            info!(
                "Schedule {} is due, executing task {}",
                schedule_id, task_id
            );

            let mut variables = HashMap::new();
            variables.insert("schedule_id".to_string(), json!(schedule_id));
            let options = RunOptions {
                variables,
                trigger_info: Some(json!({
                    "kind": "schedule",
                    "schedule_id": schedule_id,
                    "schedule_type": schedule.schedule_type,
                })),
            };

            let mut remove_after_fire = false;
            if self
                .executor
                .execute(&task_id, schedule.action.clone(), options)
            {
                schedule.mark_fired(now);
                remove_after_fire = schedule.schedule_type == ScheduleType::OneTime;
            } else {
                warn!(
                    "Failed to execute task for schedule {}, will retry next pass",
                    schedule_id
                );
            }
            if remove_after_fire {
                schedules.remove(&schedule_id);
                info!("Removed one-time schedule {} after firing", schedule_id);
            }
        }
    }

    pub async fn run(&self) {
        info!("Task scheduler started");
        loop {
            tokio::select! {
                _ = self.shutdown.notified() => {
                    info!("Task scheduler stopped");
                    break;
                }
                _ = tokio::time::sleep(self.frequency) => {
                    self.tick().await;
                }
            }
        }
    }

    pub fn request_shutdown(&self) {
        self.shutdown.notify_waiters();
    }

    pub async fn export_snapshot(&self) -> SchedulesSnapshot {
        let schedules = self.schedules.read().await;
        let mut entries: Vec<ScheduleSnapshot> =
            schedules.values().map(ScheduleSnapshot::of).collect();
        entries.sort_by(|a, b| a.schedule_id.cmp(&b.schedule_id));
        SchedulesSnapshot { schedules: entries }
    }

    pub async fn save_to_file(&self, path: &Path) -> Result<(), SendableError> {
        let snapshot = self.export_snapshot().await;
        std::fs::write(path, snapshot.to_json()?)?;
        info!("Saved {} schedule(s) to {}", snapshot.schedules.len(), path.display());
        Ok(())
    }

    /// Replaces the in-memory schedule set with the snapshot contents.
    /// Entries whose action cannot be rebuilt are logged and skipped.
    pub async fn load_snapshot(
        &self,
        snapshot: SchedulesSnapshot,
        registry: &ActionRegistry,
    ) -> usize {
        let mut loaded = HashMap::new();
        for entry in snapshot.schedules {
            let action = match registry.create(
                &entry.action_type,
                &entry.action_id,
                entry.action_config.clone(),
            ) {
                Ok(action) => action,
                Err(err) => {
                    warn!("Skipping schedule {}: {}", entry.schedule_id, err);
                    continue;
                }
            };
            let mut schedule = TaskSchedule::new(
                entry.schedule_id.clone(),
                entry.task_id,
                action,
                entry.schedule_type,
                entry.config,
            );
            schedule.enabled = entry.enabled;
            schedule.next_run_time = entry.next_run_time;
            schedule.last_run_time = entry.last_run_time;
            loaded.insert(entry.schedule_id, schedule);
        }

        let count = loaded.len();
        *self.schedules.write().await = loaded;
        info!("Loaded {} schedule(s) from snapshot", count);
        count
    }

    pub async fn load_from_file(
        &self,
        path: &Path,
        registry: &ActionRegistry,
    ) -> Result<usize, SendableError> {
        if !path.exists() {
            return Ok(0);
        }
        let data = std::fs::read_to_string(path)?;
        let snapshot = SchedulesSnapshot::from_json(&data)?;
        Ok(self.load_snapshot(snapshot, registry).await)
    }
}

fn short_suffix() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}
