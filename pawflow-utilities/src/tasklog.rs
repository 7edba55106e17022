use std::{
    collections::HashMap,
    fs::{self, File, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
    sync::Arc,
    time::{Instant, SystemTime},
};

use log::Level;
use parking_lot::Mutex;
use tokio::sync::broadcast;

use pawflow_models::{errors::SendableError, events::LogEvent};

const LOG_EVENT_CAPACITY: usize = 256;

/// Log sink for one task execution, independent of the application-wide
/// log stream. Lines go to `<logs_dir>/<task_id>/<execution_id>.log` and
/// are mirrored onto the manager's event channel.
pub struct TaskLogger {
    task_id: String,
    execution_id: String,
    path: PathBuf,
    file: Mutex<File>,
    started: Instant,
    events: broadcast::Sender<LogEvent>,
}

impl TaskLogger {
    fn open(
        logs_dir: &Path,
        task_id: &str,
        execution_id: &str,
        events: broadcast::Sender<LogEvent>,
    ) -> Result<Self, SendableError> {
        let task_dir = logs_dir.join(task_id);
        fs::create_dir_all(&task_dir)?;
        let path = task_dir.join(format!("{execution_id}.log"));
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        let logger = Self {
            task_id: task_id.to_string(),
            execution_id: execution_id.to_string(),
            path,
            file: Mutex::new(file),
            started: Instant::now(),
            events,
        };
        logger.info(&format!("Started task execution {execution_id}"));
        Ok(logger)
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn execution_id(&self) -> &str {
        &self.execution_id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn log(&self, level: Level, message: &str) {
        let line = format!(
            "[{} {}] {}\n",
            humantime::format_rfc3339_seconds(SystemTime::now()),
            level,
            message
        );
        {
            let mut file = self.file.lock();
            if let Err(err) = file.write_all(line.as_bytes()).and_then(|_| file.flush()) {
                log::error!("Error writing to task log {}: {}", self.path.display(), err);
            }
        }
        let _ = self.events.send(LogEvent {
            task_id: self.task_id.clone(),
            execution_id: self.execution_id.clone(),
            level,
            message: message.to_string(),
        });
    }

    pub fn debug(&self, message: &str) {
        self.log(Level::Debug, message);
    }

    pub fn info(&self, message: &str) {
        self.log(Level::Info, message);
    }

    pub fn warn(&self, message: &str) {
        self.log(Level::Warn, message);
    }

    pub fn error(&self, message: &str) {
        self.log(Level::Error, message);
    }

    /// Writes the closing line with the terminal status and duration.
    pub fn finish(&self, status: &str) {
        let duration = self.started.elapsed().as_secs_f64();
        let level = if status == "completed" {
            Level::Info
        } else {
            Level::Warn
        };
        self.log(
            level,
            &format!("Task execution finished with status {status} (duration: {duration:.1}s)"),
        );
    }
}

/// Hands out per-execution loggers and keeps at most `max_logs_per_task`
/// log files per task on disk.
pub struct LogManager {
    logs_dir: PathBuf,
    max_logs_per_task: usize,
    active: Mutex<HashMap<String, Arc<TaskLogger>>>,
    events: broadcast::Sender<LogEvent>,
}

impl LogManager {
    pub fn new(logs_dir: impl Into<PathBuf>, max_logs_per_task: usize) -> Self {
        let (events, _) = broadcast::channel(LOG_EVENT_CAPACITY);
        Self {
            logs_dir: logs_dir.into(),
            max_logs_per_task: max_logs_per_task.max(1),
            active: Mutex::new(HashMap::new()),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LogEvent> {
        self.events.subscribe()
    }

    pub fn logs_dir(&self) -> &Path {
        &self.logs_dir
    }

    pub fn create_logger(
        &self,
        task_id: &str,
        execution_id: &str,
    ) -> Result<Arc<TaskLogger>, SendableError> {
        let logger = Arc::new(TaskLogger::open(
            &self.logs_dir,
            task_id,
            execution_id,
            self.events.clone(),
        )?);
        self.active
            .lock()
            .insert(execution_id.to_string(), logger.clone());
        self.prune_task_logs(task_id);
        Ok(logger)
    }

    pub fn close_logger(&self, execution_id: &str) -> bool {
        self.active.lock().remove(execution_id).is_some()
    }

    pub fn active_count(&self) -> usize {
        self.active.lock().len()
    }

    fn prune_task_logs(&self, task_id: &str) {
        let task_dir = self.logs_dir.join(task_id);
        let entries = match fs::read_dir(&task_dir) {
            Ok(entries) => entries,
            Err(_) => return,
        };

        let mut logs: Vec<(SystemTime, PathBuf)> = entries
            .flatten()
            .filter(|e| e.path().extension().and_then(|x| x.to_str()) == Some("log"))
            .filter_map(|e| {
                let modified = e.metadata().and_then(|m| m.modified()).ok()?;
                Some((modified, e.path()))
            })
            .collect();

        if logs.len() <= self.max_logs_per_task {
            return;
        }

        logs.sort_by_key(|(modified, _)| *modified);
        let excess = logs.len() - self.max_logs_per_task;
        for (_, path) in logs.into_iter().take(excess) {
            if let Err(err) = fs::remove_file(&path) {
                log::error!("Error deleting old task log {}: {}", path.display(), err);
            }
        }
    }
}
