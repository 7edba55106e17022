use std::{collections::HashMap, sync::Arc};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use pawflow_action::Action;
use pawflow_models::events::FileChangeType;

use crate::condition::{evaluate_conditions, TriggerCondition};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    FileChange,
    Completion,
}

/// Condition list plus event-specific scoping for one trigger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerConfig {
    #[serde(default)]
    pub conditions: Vec<TriggerCondition>,
    #[serde(default = "default_true")]
    pub require_all_conditions: bool,
    /// File-change triggers: only react to this monitor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monitor_id: Option<String>,
    /// File-change triggers: only these change kinds; empty means all.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub change_types: Vec<FileChangeType>,
    /// Completion triggers: only react to this finished task.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_task_id: Option<String>,
}

fn default_true() -> bool {
    true
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            conditions: Vec::new(),
            require_all_conditions: true,
            monitor_id: None,
            change_types: Vec::new(),
            parent_task_id: None,
        }
    }
}

/// An event-based rule that conditionally launches a task. Stateless
/// between fires; there is no next-run concept.
#[derive(Clone)]
pub struct TaskTrigger {
    pub trigger_id: String,
    pub task_id: String,
    pub action: Arc<dyn Action>,
    pub trigger_type: TriggerType,
    pub config: TriggerConfig,
    pub enabled: bool,
}

impl TaskTrigger {
    pub fn new(
        trigger_id: impl Into<String>,
        task_id: impl Into<String>,
        action: Arc<dyn Action>,
        trigger_type: TriggerType,
        config: TriggerConfig,
    ) -> Self {
        Self {
            trigger_id: trigger_id.into(),
            task_id: task_id.into(),
            action,
            trigger_type,
            config,
            enabled: true,
        }
    }

    pub fn matches(&self, data: &HashMap<String, Value>) -> bool {
        evaluate_conditions(
            data,
            &self.config.conditions,
            self.config.require_all_conditions,
        )
    }
}
