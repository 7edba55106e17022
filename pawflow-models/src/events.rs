use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::TaskExecutionResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileChangeType {
    Created,
    Modified,
    Deleted,
}

impl FileChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Modified => "modified",
            Self::Deleted => "deleted",
        }
    }
}

impl std::fmt::Display for FileChangeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Change detected by one folder monitor, tagged with the monitor id so
/// consumers can watch several folders on one channel.
#[derive(Debug, Clone)]
pub struct FileChangeEvent {
    pub monitor_id: String,
    pub change: FileChangeType,
    pub path: PathBuf,
}

/// Lifecycle events published by the task executor. `Completed` is sent
/// exactly once per execution, whatever the terminal status was.
#[derive(Debug, Clone)]
pub enum TaskEvent {
    Started {
        task_id: String,
        execution_id: String,
        action_id: String,
        action_type: String,
        start_time: DateTime<Utc>,
    },
    Progress {
        task_id: String,
        execution_id: String,
        progress: f32,
    },
    Completed {
        task_id: String,
        execution_id: String,
        action_id: String,
        action_type: String,
        start_time: DateTime<Utc>,
        result: TaskExecutionResult,
        trigger_info: Option<Value>,
    },
}

impl TaskEvent {
    pub fn task_id(&self) -> &str {
        match self {
            Self::Started { task_id, .. }
            | Self::Progress { task_id, .. }
            | Self::Completed { task_id, .. } => task_id,
        }
    }

    pub fn execution_id(&self) -> &str {
        match self {
            Self::Started { execution_id, .. }
            | Self::Progress { execution_id, .. }
            | Self::Completed { execution_id, .. } => execution_id,
        }
    }
}

/// One line of a per-execution task log, mirrored onto the log event
/// stream for live observers.
#[derive(Debug, Clone)]
pub struct LogEvent {
    pub task_id: String,
    pub execution_id: String,
    pub level: log::Level,
    pub message: String,
}
