use serde::{Deserialize, Serialize};

use pawflow_models::core::ActionConfig;

use crate::model::{TaskTrigger, TriggerConfig, TriggerType};

/// Flat JSON form of one trigger; the action is rebuilt through the
/// registry on load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerSnapshot {
    pub trigger_id: String,
    pub task_id: String,
    pub action_id: String,
    pub action_type: String,
    pub action_config: ActionConfig,
    pub trigger_type: TriggerType,
    pub config: TriggerConfig,
    pub enabled: bool,
}

impl TriggerSnapshot {
    pub fn of(trigger: &TaskTrigger) -> Self {
        Self {
            trigger_id: trigger.trigger_id.clone(),
            task_id: trigger.task_id.clone(),
            action_id: trigger.action.action_id().to_string(),
            action_type: trigger.action.type_name().to_string(),
            action_config: trigger.action.config().clone(),
            trigger_type: trigger.trigger_type,
            config: trigger.config.clone(),
            enabled: trigger.enabled,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TriggersSnapshot {
    pub triggers: Vec<TriggerSnapshot>,
}

impl TriggersSnapshot {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(data: &str) -> serde_json::Result<Self> {
        serde_json::from_str(data)
    }
}
