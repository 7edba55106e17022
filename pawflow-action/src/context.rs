use std::{
    collections::HashMap,
    path::Path,
    sync::Arc,
    time::Instant,
};

use serde_json::Value;
use tempfile::TempDir;

use pawflow_models::{core::ActionResult, errors::SendableError};
use pawflow_utilities::tasklog::TaskLogger;

/// Per-run bag of variables, logger handle and scoped scratch directory,
/// owned exclusively by one execution. The scratch directory is removed
/// when the context is dropped.
pub struct ExecutionContext {
    task_id: String,
    execution_id: String,
    variables: HashMap<String, Value>,
    results: HashMap<String, ActionResult>,
    logger: Arc<TaskLogger>,
    scratch: Option<TempDir>,
    started: Instant,
}

impl ExecutionContext {
    pub fn new(
        task_id: impl Into<String>,
        execution_id: impl Into<String>,
        variables: HashMap<String, Value>,
        logger: Arc<TaskLogger>,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            execution_id: execution_id.into(),
            variables,
            results: HashMap::new(),
            logger,
            scratch: None,
            started: Instant::now(),
        }
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn execution_id(&self) -> &str {
        &self.execution_id
    }

    pub fn logger(&self) -> &TaskLogger {
        &self.logger
    }

    pub fn logger_handle(&self) -> Arc<TaskLogger> {
        self.logger.clone()
    }

    pub fn variable(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }

    pub fn set_variable(&mut self, name: impl Into<String>, value: Value) {
        self.variables.insert(name.into(), value);
    }

    pub fn has_variable(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }

    pub fn variables(&self) -> &HashMap<String, Value> {
        &self.variables
    }

    /// Result recorded by an earlier sub-action of this execution.
    pub fn result(&self, action_id: &str) -> Option<&ActionResult> {
        self.results.get(action_id)
    }

    pub fn add_result(&mut self, action_id: impl Into<String>, result: ActionResult) {
        self.results.insert(action_id.into(), result);
    }

    /// Lazily created scratch directory, deleted on context teardown.
    pub fn scratch_dir(&mut self) -> Result<&Path, SendableError> {
        if self.scratch.is_none() {
            let dir = tempfile::Builder::new()
                .prefix(&format!("pawflow_{}_", self.task_id))
                .tempdir()?;
            self.scratch = Some(dir);
        }
        match &self.scratch {
            Some(dir) => Ok(dir.path()),
            None => unreachable!(),
        }
    }

    pub fn elapsed_seconds(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }
}
