use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use pawflow_models::core::ActionConfig;

use crate::model::{ScheduleConfig, ScheduleType, TaskSchedule};

/// Flat JSON form of one schedule. The owned action is persisted as its
/// id, type and config and rebuilt through the registry on load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleSnapshot {
    pub schedule_id: String,
    pub task_id: String,
    pub action_id: String,
    pub action_type: String,
    pub action_config: ActionConfig,
    pub schedule_type: ScheduleType,
    pub config: ScheduleConfig,
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_run_time: Option<DateTime<Local>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run_time: Option<DateTime<Local>>,
}

impl ScheduleSnapshot {
    pub fn of(schedule: &TaskSchedule) -> Self {
        Self {
            schedule_id: schedule.schedule_id.clone(),
            task_id: schedule.task_id.clone(),
            action_id: schedule.action.action_id().to_string(),
            action_type: schedule.action.type_name().to_string(),
            action_config: schedule.action.config().clone(),
            schedule_type: schedule.schedule_type,
            config: schedule.config.clone(),
            enabled: schedule.enabled,
            next_run_time: schedule.next_run_time,
            last_run_time: schedule.last_run_time,
        }
    }
}

/// Snapshot export of the whole schedule set; loading replaces the
/// in-memory set wholesale.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchedulesSnapshot {
    pub schedules: Vec<ScheduleSnapshot>,
}

impl SchedulesSnapshot {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(data: &str) -> serde_json::Result<Self> {
        serde_json::from_str(data)
    }
}
