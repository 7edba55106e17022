use std::{collections::HashMap, path::Path, sync::Arc};

use chrono::{DateTime, Duration, Utc};
use log::{info, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

use pawflow_models::{
    core::{ExecutionStatus, TaskExecution, TaskExecutionResult},
    errors::SendableError,
    events::TaskEvent,
};
use pawflow_utilities::data_export::{exporter_for_path, TableData};

#[derive(Default)]
struct HistoryState {
    records: HashMap<String, TaskExecution>,
    by_task: HashMap<String, Vec<String>>,
}

/// Bounded, searchable store of execution records with a secondary
/// `task_id -> [execution_id]` index. Both indexes are always updated in
/// the same critical section, so eviction can never leave a dangling
/// index entry.
pub struct TaskHistory {
    state: Mutex<HistoryState>,
    max_records: usize,
}

#[derive(Debug, Default, Clone)]
pub struct HistoryFilter {
    pub status: Option<ExecutionStatus>,
    pub action_type: Option<String>,
    pub started_after: Option<DateTime<Utc>>,
    pub started_before: Option<DateTime<Utc>>,
    /// 0 means no limit.
    pub limit: usize,
}

impl TaskHistory {
    pub fn new(max_records: usize) -> Self {
        Self {
            state: Mutex::new(HistoryState::default()),
            max_records: max_records.max(1),
        }
    }

    pub fn add(&self, execution: TaskExecution) {
        let mut state = self.state.lock();
        insert_record(&mut state, execution);
        evict_overflow(&mut state, self.max_records);
    }

    /// Applies a completion to an existing record, or inserts a full
    /// record when none exists (e.g. validation failures that never
    /// started). Records already in a terminal state are left untouched.
    #[allow(clippy::too_many_arguments)]
    pub fn record_completion(
        &self,
        execution_id: &str,
        task_id: &str,
        action_id: &str,
        action_type: &str,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        result: &TaskExecutionResult,
        trigger_info: Option<Value>,
    ) {
        let mut state = self.state.lock();
        if let Some(record) = state.records.get_mut(execution_id) {
            if record.status.is_terminal() {
                warn!("Execution {} already finalized, ignoring update", execution_id);
                return;
            }
            if record.trigger_info.is_none() {
                record.trigger_info = trigger_info;
            }
            record.finish(end_time, result);
        } else {
            let mut record =
                TaskExecution::running(execution_id, task_id, action_id, action_type, start_time)
                    .with_trigger_info(trigger_info);
            record.finish(end_time, result);
            insert_record(&mut state, record);
            evict_overflow(&mut state, self.max_records);
        }
    }

    pub fn get(&self, execution_id: &str) -> Option<TaskExecution> {
        self.state.lock().records.get(execution_id).cloned()
    }

    /// Executions for one task id, newest first.
    pub fn executions_for_task(&self, task_id: &str, limit: usize) -> Vec<TaskExecution> {
        let state = self.state.lock();
        let Some(ids) = state.by_task.get(task_id) else {
            return Vec::new();
        };
        let mut executions: Vec<TaskExecution> = ids
            .iter()
            .filter_map(|id| state.records.get(id).cloned())
            .collect();
        executions.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        if limit > 0 {
            executions.truncate(limit);
        }
        executions
    }

    /// Filtered search, newest first.
    pub fn search(&self, filter: &HistoryFilter) -> Vec<TaskExecution> {
        let state = self.state.lock();
        let mut results: Vec<TaskExecution> = state
            .records
            .values()
            .filter(|record| match filter.status {
                Some(status) => record.status == status,
                None => true,
            })
            .filter(|record| match &filter.action_type {
                Some(action_type) => &record.action_type == action_type,
                None => true,
            })
            .filter(|record| match filter.started_after {
                Some(after) => record.start_time >= after,
                None => true,
            })
            .filter(|record| match filter.started_before {
                Some(before) => record.start_time <= before,
                None => true,
            })
            .cloned()
            .collect();
        results.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        if filter.limit > 0 {
            results.truncate(filter.limit);
        }
        results
    }

    /// Removes records that started more than `days` days ago. Returns
    /// the number removed.
    pub fn clear_older_than(&self, days: i64) -> usize {
        let cutoff = Utc::now() - Duration::days(days);
        let mut state = self.state.lock();
        let stale: Vec<String> = state
            .records
            .values()
            .filter(|record| record.start_time < cutoff)
            .map(|record| record.execution_id.clone())
            .collect();
        for execution_id in &stale {
            remove_record(&mut state, execution_id);
        }
        if !stale.is_empty() {
            info!("Cleared {} execution record(s) older than {} day(s)", stale.len(), days);
        }
        stale.len()
    }

    pub fn clear_all(&self) -> usize {
        let mut state = self.state.lock();
        let count = state.records.len();
        state.records.clear();
        state.by_task.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.state.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn export(&self) -> HistoryExport {
        let state = self.state.lock();
        let mut executions: Vec<TaskExecution> = state.records.values().cloned().collect();
        executions.sort_by(|a, b| a.start_time.cmp(&b.start_time));
        HistoryExport { executions }
    }

    pub fn export_to_file(&self, path: &Path) -> Result<(), SendableError> {
        let export = self.export();
        std::fs::write(path, export.to_json()?)?;
        info!(
            "Exported {} execution record(s) to {}",
            export.executions.len(),
            path.display()
        );
        Ok(())
    }

    /// Replaces the store contents and rebuilds both indexes.
    pub fn load(&self, export: HistoryExport) -> usize {
        let mut state = self.state.lock();
        state.records.clear();
        state.by_task.clear();
        for execution in export.executions {
            insert_record(&mut state, execution);
        }
        evict_overflow(&mut state, self.max_records);
        let count = state.records.len();
        info!("Loaded {} execution record(s) into history", count);
        count
    }

    pub fn import_from_file(&self, path: &Path) -> Result<usize, SendableError> {
        let data = std::fs::read_to_string(path)?;
        let export = HistoryExport::from_json(&data)?;
        Ok(self.load(export))
    }

    /// Tabular export (CSV or XLSX, chosen by extension).
    pub fn export_table(&self, path: &Path) -> Result<(), SendableError> {
        let export = self.export();
        let mut table = TableData::new(
            "executions",
            [
                "execution_id",
                "task_id",
                "action_id",
                "action_type",
                "start_time",
                "end_time",
                "status",
                "duration_seconds",
            ]
            .map(String::from)
            .to_vec(),
        );
        for record in &export.executions {
            table.push_row(vec![
                record.execution_id.clone(),
                record.task_id.clone(),
                record.action_id.clone(),
                record.action_type.clone(),
                record.start_time.to_rfc3339(),
                record
                    .end_time
                    .map(|end| end.to_rfc3339())
                    .unwrap_or_default(),
                record.status.to_string(),
                record
                    .duration_seconds
                    .map(|seconds| format!("{seconds:.3}"))
                    .unwrap_or_default(),
            ]);
        }
        exporter_for_path(path)?.export(path, &table)
    }
}

fn insert_record(state: &mut HistoryState, execution: TaskExecution) {
    state
        .by_task
        .entry(execution.task_id.clone())
        .or_default()
        .push(execution.execution_id.clone());
    state
        .records
        .insert(execution.execution_id.clone(), execution);
}

fn remove_record(state: &mut HistoryState, execution_id: &str) {
    let Some(record) = state.records.remove(execution_id) else {
        return;
    };
    if let Some(ids) = state.by_task.get_mut(&record.task_id) {
        ids.retain(|id| id != execution_id);
        if ids.is_empty() {
            state.by_task.remove(&record.task_id);
        }
    }
}

fn evict_overflow(state: &mut HistoryState, max_records: usize) {
    while state.records.len() > max_records {
        let oldest = state
            .records
            .values()
            .min_by_key(|record| record.start_time)
            .map(|record| record.execution_id.clone());
        match oldest {
            Some(execution_id) => remove_record(state, &execution_id),
            None => break,
        }
    }
}

/// JSON document form of the whole history; loading replaces the store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryExport {
    pub executions: Vec<TaskExecution>,
}

impl HistoryExport {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(data: &str) -> serde_json::Result<Self> {
        serde_json::from_str(data)
    }
}

/// Feeds executor lifecycle events into the history store. This is the
/// sole channel through which the history learns about outcomes.
pub fn spawn_event_feed(
    history: Arc<TaskHistory>,
    mut events: broadcast::Receiver<TaskEvent>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(TaskEvent::Started {
                    task_id,
                    execution_id,
                    action_id,
                    action_type,
                    start_time,
                }) => {
                    history.add(TaskExecution::running(
                        execution_id,
                        task_id,
                        action_id,
                        action_type,
                        start_time,
                    ));
                }
                Ok(TaskEvent::Completed {
                    task_id,
                    execution_id,
                    action_id,
                    action_type,
                    start_time,
                    result,
                    trigger_info,
                }) => {
                    history.record_completion(
                        &execution_id,
                        &task_id,
                        &action_id,
                        &action_type,
                        start_time,
                        Utc::now(),
                        &result,
                        trigger_info,
                    );
                }
                Ok(TaskEvent::Progress { .. }) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("History feed lagged, dropped {} event(s)", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}
