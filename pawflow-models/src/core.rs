use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Ordered key/value configuration passed to an action. Unknown keys are
/// ignored by the actions themselves.
pub type ActionConfig = serde_json::Map<String, Value>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapturedError {
    pub kind: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl CapturedError {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResult {
    pub success: bool,
    pub message: String,
    #[serde(default)]
    pub data: serde_json::Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<CapturedError>,
    pub timestamp: DateTime<Utc>,
}

impl ActionResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: serde_json::Map::new(),
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn ok_with_data(message: impl Into<String>, data: serde_json::Map<String, Value>) -> Self {
        Self {
            data,
            ..Self::ok(message)
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: serde_json::Map::new(),
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn failure_with_data(
        message: impl Into<String>,
        data: serde_json::Map<String, Value>,
    ) -> Self {
        Self {
            data,
            ..Self::failure(message)
        }
    }

    pub fn from_error(message: impl Into<String>, error: CapturedError) -> Self {
        Self {
            error: Some(error),
            ..Self::failure(message)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Canceled,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Canceled)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
        }
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal outcome of one task execution, as reported through the
/// completion event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskExecutionResult {
    pub status: ExecutionStatus,
    pub message: String,
    #[serde(default)]
    pub data: serde_json::Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<CapturedError>,
    pub timestamp: DateTime<Utc>,
}

impl TaskExecutionResult {
    pub fn from_action_result(result: ActionResult) -> Self {
        let status = if result.success {
            ExecutionStatus::Completed
        } else {
            ExecutionStatus::Failed
        };
        Self {
            status,
            message: result.message,
            data: result.data,
            error: result.error,
            timestamp: result.timestamp,
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: ExecutionStatus::Completed,
            message: message.into(),
            data: serde_json::Map::new(),
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            status: ExecutionStatus::Failed,
            ..Self::success(message)
        }
    }

    pub fn failure_with_error(message: impl Into<String>, error: CapturedError) -> Self {
        Self {
            error: Some(error),
            ..Self::failure(message)
        }
    }

    pub fn canceled(message: impl Into<String>) -> Self {
        Self {
            status: ExecutionStatus::Canceled,
            ..Self::success(message)
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// Historical record of one execution. Immutable once a terminal status
/// has been applied via `finish`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskExecution {
    pub execution_id: String,
    pub task_id: String,
    pub action_id: String,
    pub action_type: String,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    pub status: ExecutionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger_info: Option<Value>,
}

impl TaskExecution {
    pub fn running(
        execution_id: impl Into<String>,
        task_id: impl Into<String>,
        action_id: impl Into<String>,
        action_type: impl Into<String>,
        start_time: DateTime<Utc>,
    ) -> Self {
        Self {
            execution_id: execution_id.into(),
            task_id: task_id.into(),
            action_id: action_id.into(),
            action_type: action_type.into(),
            start_time,
            end_time: None,
            status: ExecutionStatus::Running,
            duration_seconds: None,
            result: None,
            trigger_info: None,
        }
    }

    pub fn with_trigger_info(mut self, trigger_info: Option<Value>) -> Self {
        self.trigger_info = trigger_info;
        self
    }

    pub fn finish(&mut self, end_time: DateTime<Utc>, result: &TaskExecutionResult) {
        self.end_time = Some(end_time);
        self.status = result.status;
        self.duration_seconds = Some((end_time - self.start_time).num_milliseconds() as f64 / 1000.0);
        self.result = serde_json::to_value(result).ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_result_to_task_result_maps_status() {
        let ok = TaskExecutionResult::from_action_result(ActionResult::ok("done"));
        assert_eq!(ok.status, ExecutionStatus::Completed);

        let failed = TaskExecutionResult::from_action_result(ActionResult::failure("broke"));
        assert_eq!(failed.status, ExecutionStatus::Failed);
        assert_eq!(failed.message, "broke");
    }

    #[test]
    fn finish_is_terminal_and_records_duration() {
        let start = Utc::now();
        let mut execution = TaskExecution::running("exec_1", "task_1", "a1", "file-copy", start);
        assert_eq!(execution.status, ExecutionStatus::Running);

        let result = TaskExecutionResult::success("done");
        let end = start + chrono::Duration::seconds(3);
        execution.finish(end, &result);

        assert!(execution.status.is_terminal());
        assert_eq!(execution.duration_seconds, Some(3.0));
        assert!(execution.result.is_some());
    }

    #[test]
    fn status_serializes_lowercase() {
        let json = serde_json::to_string(&ExecutionStatus::Canceled).unwrap();
        assert_eq!(json, "\"canceled\"");
    }
}
