pub mod condition;
pub mod model;
pub mod snapshot;

use std::{collections::HashMap, path::Path, sync::Arc};

use log::{error, info, warn};
use serde_json::{json, Value};
use tokio::sync::{broadcast, Notify, RwLock};
use uuid::Uuid;

use pawflow_action::registry::ActionRegistry;
use pawflow_executor::{RunOptions, TaskExecutor};
use pawflow_models::{
    core::TaskExecutionResult,
    errors::SendableError,
    events::{FileChangeEvent, TaskEvent},
};

use crate::{
    condition::flatten_into,
    model::{TaskTrigger, TriggerConfig, TriggerType},
    snapshot::{TriggerSnapshot, TriggersSnapshot},
};

#[derive(Debug, Default, Clone)]
pub struct TriggerUpdate {
    pub enabled: Option<bool>,
    pub config: Option<TriggerConfig>,
    pub trigger_type: Option<TriggerType>,
}

/// Listens to folder-change and task-completion events, evaluates each
/// candidate trigger's conditions, and launches the matching actions
/// through the executor.
pub struct TriggerManager {
    triggers: Arc<RwLock<HashMap<String, TaskTrigger>>>,
    executor: Arc<TaskExecutor>,
    shutdown: Notify,
}

impl TriggerManager {
    pub fn new(executor: Arc<TaskExecutor>) -> Self {
        Self {
            triggers: Arc::new(RwLock::new(HashMap::new())),
            executor,
            shutdown: Notify::new(),
        }
    }

    pub async fn add_trigger(&self, trigger: TaskTrigger) -> bool {
        let mut triggers = self.triggers.write().await;
        if triggers.contains_key(&trigger.trigger_id) {
            warn!("Trigger with ID {} already exists", trigger.trigger_id);
            return false;
        }
        info!(
            "Added trigger {} for task {}",
            trigger.trigger_id, trigger.task_id
        );
        triggers.insert(trigger.trigger_id.clone(), trigger);
        true
    }

    pub async fn update_trigger(&self, trigger_id: &str, updates: TriggerUpdate) -> bool {
        let mut triggers = self.triggers.write().await;
        let Some(trigger) = triggers.get_mut(trigger_id) else {
            warn!("Trigger with ID {} does not exist", trigger_id);
            return false;
        };

        if let Some(enabled) = updates.enabled {
            trigger.enabled = enabled;
        }
        if let Some(config) = updates.config {
            trigger.config = config;
        }
        if let Some(trigger_type) = updates.trigger_type {
            trigger.trigger_type = trigger_type;
        }
        info!("Updated trigger {}", trigger_id);
        true
    }

    pub async fn remove_trigger(&self, trigger_id: &str) -> bool {
        let mut triggers = self.triggers.write().await;
        if triggers.remove(trigger_id).is_none() {
            warn!("Trigger with ID {} does not exist", trigger_id);
            return false;
        }
        info!("Removed trigger {}", trigger_id);
        true
    }

    pub async fn get_trigger(&self, trigger_id: &str) -> Option<TaskTrigger> {
        self.triggers.read().await.get(trigger_id).cloned()
    }

    pub async fn triggers(&self) -> Vec<TaskTrigger> {
        self.triggers.read().await.values().cloned().collect()
    }

    pub async fn trigger_count(&self) -> usize {
        self.triggers.read().await.len()
    }

    /// Event loop: consumes monitor and executor events until shutdown.
    pub async fn run(
        &self,
        mut file_events: broadcast::Receiver<FileChangeEvent>,
        mut task_events: broadcast::Receiver<TaskEvent>,
    ) {
        info!("Task trigger manager started");
        loop {
            tokio::select! {
                _ = self.shutdown.notified() => {
                    info!("Task trigger manager stopped");
                    break;
                }
                event = file_events.recv() => match event {
                    Ok(event) => self.handle_file_event(&event).await,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Trigger manager lagged, dropped {} file event(s)", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        warn!("File event channel closed, trigger manager exiting");
                        break;
                    }
                },
                event = task_events.recv() => match event {
                    Ok(TaskEvent::Completed { task_id, result, .. }) => {
                        self.handle_completion(&task_id, &result).await;
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Trigger manager lagged, dropped {} task event(s)", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        warn!("Task event channel closed, trigger manager exiting");
                        break;
                    }
                },
            }
        }
    }

    pub fn request_shutdown(&self) {
        self.shutdown.notify_waiters();
    }

    async fn handle_file_event(&self, event: &FileChangeEvent) {
        let data = file_event_data(event);
        let candidates: Vec<TaskTrigger> = {
            let triggers = self.triggers.read().await;
            triggers
                .values()
                .filter(|trigger| trigger.enabled)
                .filter(|trigger| trigger.trigger_type == TriggerType::FileChange)
                .filter(|trigger| match &trigger.config.monitor_id {
                    Some(monitor_id) => monitor_id == &event.monitor_id,
                    None => true,
                })
                .filter(|trigger| {
                    trigger.config.change_types.is_empty()
                        || trigger.config.change_types.contains(&event.change)
                })
                .filter(|trigger| trigger.matches(&data))
                .cloned()
                .collect()
        };

        for trigger in candidates {
            self.fire(&trigger, &data);
        }
    }

    async fn handle_completion(&self, completed_task_id: &str, result: &TaskExecutionResult) {
        let data = completion_event_data(completed_task_id, result);
        let candidates: Vec<TaskTrigger> = {
            let triggers = self.triggers.read().await;
            triggers
                .values()
                .filter(|trigger| trigger.enabled)
                .filter(|trigger| trigger.trigger_type == TriggerType::Completion)
                .filter(|trigger| match &trigger.config.parent_task_id {
                    Some(parent) => parent == completed_task_id,
                    None => true,
                })
                .filter(|trigger| trigger.matches(&data))
                .cloned()
                .collect()
        };

        for trigger in candidates {
            self.fire(&trigger, &data);
        }
    }

    fn fire(&self, trigger: &TaskTrigger, data: &HashMap<String, Value>) {
        let task_id = format!("{}_triggered_{}", trigger.task_id, short_suffix());

        let mut variables = HashMap::new();
        variables.insert("trigger_id".to_string(), json!(trigger.trigger_id));
        variables.insert("trigger_type".to_string(), json!(trigger.trigger_type));
        variables.insert(
            "event_data".to_string(),
            Value::Object(data.clone().into_iter().collect()),
        );

        let options = RunOptions {
            variables,
            trigger_info: Some(json!({
                "kind": "trigger",
                "trigger_id": trigger.trigger_id,
                "trigger_type": trigger.trigger_type,
            })),
        };

        if self
            .executor
            .execute(&task_id, trigger.action.clone(), options)
        {
            info!(
                "Trigger {} fired, executing task {}",
                trigger.trigger_id, task_id
            );
        } else {
            error!(
                "Failed to execute task for trigger {}",
                trigger.trigger_id
            );
        }
    }

    pub async fn export_snapshot(&self) -> TriggersSnapshot {
        let triggers = self.triggers.read().await;
        let mut entries: Vec<TriggerSnapshot> =
            triggers.values().map(TriggerSnapshot::of).collect();
        entries.sort_by(|a, b| a.trigger_id.cmp(&b.trigger_id));
        TriggersSnapshot { triggers: entries }
    }

    pub async fn save_to_file(&self, path: &Path) -> Result<(), SendableError> {
        let snapshot = self.export_snapshot().await;
        std::fs::write(path, snapshot.to_json()?)?;
        info!(
            "Saved {} trigger(s) to {}",
            snapshot.triggers.len(),
            path.display()
        );
        Ok(())
    }

    /// Replaces the in-memory trigger set with the snapshot contents.
    pub async fn load_snapshot(
        &self,
        snapshot: TriggersSnapshot,
        registry: &ActionRegistry,
    ) -> usize {
        let mut loaded = HashMap::new();
        for entry in snapshot.triggers {
            let action = match registry.create(
                &entry.action_type,
                &entry.action_id,
                entry.action_config.clone(),
            ) {
                Ok(action) => action,
                Err(err) => {
                    warn!("Skipping trigger {}: {}", entry.trigger_id, err);
                    continue;
                }
            };
            let mut trigger = TaskTrigger::new(
                entry.trigger_id.clone(),
                entry.task_id,
                action,
                entry.trigger_type,
                entry.config,
            );
            trigger.enabled = entry.enabled;
            loaded.insert(entry.trigger_id, trigger);
        }

        let count = loaded.len();
        *self.triggers.write().await = loaded;
        info!("Loaded {} trigger(s) from snapshot", count);
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
        let snapshot = TriggersSnapshot::from_json(&data)?;
        Ok(self.load_snapshot(snapshot, registry).await)
    }
}

/// Flattened event-data map for a file change.
pub fn file_event_data(event: &FileChangeEvent) -> HashMap<String, Value> {
    let path = &event.path;
    let extension = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    let mut data = HashMap::new();
    data.insert("change_type".to_string(), json!(event.change.as_str()));
    data.insert("monitor_id".to_string(), json!(event.monitor_id));
    data.insert(
        "file_path".to_string(),
        json!(path.display().to_string()),
    );
    data.insert(
        "file_name".to_string(),
        json!(path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()),
    );
    data.insert(
        "directory".to_string(),
        json!(path
            .parent()
            .map(|dir| dir.display().to_string())
            .unwrap_or_default()),
    );
    data.insert("extension".to_string(), json!(extension));
    data
}

/// Flattened event-data map for a task completion, with the result's
/// payload reachable under `result.*` keys.
pub fn completion_event_data(
    completed_task_id: &str,
    result: &TaskExecutionResult,
) -> HashMap<String, Value> {
    let mut data = HashMap::new();
    data.insert("completed_task_id".to_string(), json!(completed_task_id));
    data.insert("result.status".to_string(), json!(result.status));
    data.insert("result.message".to_string(), json!(result.message));
    data.insert("result.success".to_string(), json!(result.is_success()));
    flatten_into("result.data", &Value::Object(result.data.clone()), &mut data);
    data
}

fn short_suffix() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}
