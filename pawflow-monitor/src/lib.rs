pub mod model;

use std::{
    collections::HashMap,
    fs, io,
    path::{Path, PathBuf},
    sync::Arc,
};

use glob::Pattern;
use log::{debug, error, info, warn};
use tokio::sync::{broadcast, Notify, RwLock};

use pawflow_models::{
    errors::{RuntimeError, SendableError},
    events::{FileChangeEvent, FileChangeType},
};

use crate::model::{FileInfo, MonitorConfig};

const CHANGE_EVENT_CAPACITY: usize = 256;

pub type Snapshot = HashMap<PathBuf, FileInfo>;

/// Classifies every path of `previous` and `current` into exactly one of
/// created/modified/deleted. Paths present in both with an unchanged
/// fingerprint produce no event.
pub fn diff_snapshots(
    previous: &Snapshot,
    current: &Snapshot,
) -> Vec<(FileChangeType, PathBuf)> {
    let mut changes = Vec::new();

    for (path, info) in current {
        match previous.get(path) {
            None => changes.push((FileChangeType::Created, path.clone())),
            Some(old) if info.has_changed(old) => {
                changes.push((FileChangeType::Modified, path.clone()))
            }
            Some(_) => {}
        }
    }
    for path in previous.keys() {
        if !current.contains_key(path) {
            changes.push((FileChangeType::Deleted, path.clone()));
        }
    }

    changes
}

/// Include/exclude filter over the path relative to the monitor root.
/// Patterns match the relative path or the bare file name; exclusions
/// win, and an empty include list admits everything.
pub fn matches_patterns(relative: &Path, includes: &[Pattern], excludes: &[Pattern]) -> bool {
    let name = relative
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let relative = relative.to_string_lossy();

    if excludes
        .iter()
        .any(|pattern| pattern.matches(&relative) || pattern.matches(&name))
    {
        return false;
    }
    if includes.is_empty() {
        return true;
    }
    includes
        .iter()
        .any(|pattern| pattern.matches(&relative) || pattern.matches(&name))
}

fn compile_patterns(patterns: &[String]) -> Result<Vec<Pattern>, SendableError> {
    patterns
        .iter()
        .map(|raw| {
            Pattern::new(raw).map_err(|err| {
                RuntimeError::boxed("monitor.bad_pattern", format!("{raw}: {err}"))
            })
        })
        .collect()
}

struct FolderMonitor {
    monitor_id: String,
    root: PathBuf,
    config: MonitorConfig,
    includes: Vec<Pattern>,
    excludes: Vec<Pattern>,
    events: broadcast::Sender<FileChangeEvent>,
    shutdown: Arc<Notify>,
}

impl FolderMonitor {
    fn take_snapshot(&self) -> io::Result<Snapshot> {
        let mut snapshot = Snapshot::new();
        self.scan_dir(&self.root, &mut snapshot)?;
        Ok(snapshot)
    }

    fn scan_dir(&self, dir: &Path, snapshot: &mut Snapshot) -> io::Result<()> {
        for entry in fs::read_dir(dir)? {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    debug!("Skipping unreadable entry under {}: {}", dir.display(), err);
                    continue;
                }
            };
            let path = entry.path();
            if path.is_dir() {
                if self.config.recursive {
                    if let Err(err) = self.scan_dir(&path, snapshot) {
                        debug!("Skipping unreadable directory {}: {}", path.display(), err);
                    }
                }
                continue;
            }
            let relative = path.strip_prefix(&self.root).unwrap_or(&path);
            if matches_patterns(relative, &self.includes, &self.excludes) {
                snapshot.insert(path.clone(), FileInfo::capture(&path));
            }
        }
        Ok(())
    }

    async fn run(self) {
        let mut files = match self.take_snapshot() {
            Ok(snapshot) => snapshot,
            Err(err) => {
                error!(
                    "Error scanning folder {} for monitor {}: {}",
                    self.root.display(),
                    self.monitor_id,
                    err
                );
                Snapshot::new()
            }
        };
        debug!(
            "Monitor {} initial scan found {} file(s)",
            self.monitor_id,
            files.len()
        );

        loop {
            tokio::select! {
                _ = self.shutdown.notified() => {
                    info!("Stopped monitoring folder: {}", self.root.display());
                    break;
                }
                _ = tokio::time::sleep(self.config.interval()) => {
                    match self.take_snapshot() {
                        Ok(current) => {
                            for (change, path) in diff_snapshots(&files, &current) {
                                debug!("Monitor {} detected {} {}", self.monitor_id, change, path.display());
                                let _ = self.events.send(FileChangeEvent {
                                    monitor_id: self.monitor_id.clone(),
                                    change,
                                    path,
                                });
                            }
                            files = current;
                        }
                        Err(err) => {
                            // Keep the previous snapshot and try again on
                            // the next pass.
                            error!(
                                "Error checking for changes in {}: {}",
                                self.root.display(),
                                err
                            );
                        }
                    }
                }
            }
        }
    }
}

struct MonitorEntry {
    root: PathBuf,
    config: MonitorConfig,
    shutdown: Option<Arc<Notify>>,
}

/// Owns every folder monitor and republishes their change events on one
/// channel, tagged with the monitor id.
pub struct MonitorManager {
    monitors: Arc<RwLock<HashMap<String, MonitorEntry>>>,
    events: broadcast::Sender<FileChangeEvent>,
}

impl Default for MonitorManager {
    fn default() -> Self {
        Self::new()
    }
}

impl MonitorManager {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(CHANGE_EVENT_CAPACITY);
        Self {
            monitors: Arc::new(RwLock::new(HashMap::new())),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FileChangeEvent> {
        self.events.subscribe()
    }

    pub async fn add_monitor(
        &self,
        monitor_id: &str,
        folder_path: &Path,
        config: MonitorConfig,
    ) -> bool {
        let mut monitors = self.monitors.write().await;
        if monitors.contains_key(monitor_id) {
            warn!("Folder monitor with ID {} already exists", monitor_id);
            return false;
        }
        if !folder_path.is_dir() {
            warn!(
                "Cannot monitor {}: not an existing directory",
                folder_path.display()
            );
            return false;
        }
        if let Err(err) = compile_patterns(&config.file_patterns)
            .and_then(|_| compile_patterns(&config.exclude_patterns))
        {
            warn!("Cannot add folder monitor {}: {}", monitor_id, err);
            return false;
        }

        monitors.insert(
            monitor_id.to_string(),
            MonitorEntry {
                root: folder_path.to_path_buf(),
                config,
                shutdown: None,
            },
        );
        info!(
            "Added folder monitor {} for {}",
            monitor_id,
            folder_path.display()
        );
        true
    }

    pub async fn remove_monitor(&self, monitor_id: &str) -> bool {
        self.stop_monitor(monitor_id).await;
        let mut monitors = self.monitors.write().await;
        if monitors.remove(monitor_id).is_none() {
            warn!("Folder monitor {} does not exist", monitor_id);
            return false;
        }
        info!("Removed folder monitor {}", monitor_id);
        true
    }

    pub async fn start_monitor(&self, monitor_id: &str) -> bool {
        let mut monitors = self.monitors.write().await;
        let Some(entry) = monitors.get_mut(monitor_id) else {
            warn!("Folder monitor {} does not exist", monitor_id);
            return false;
        };
        if entry.shutdown.is_some() {
            warn!("Folder monitor {} already running", monitor_id);
            return false;
        }

        let includes = match compile_patterns(&entry.config.file_patterns) {
            Ok(patterns) => patterns,
            Err(err) => {
                warn!("Cannot start folder monitor {}: {}", monitor_id, err);
                return false;
            }
        };
        let excludes = match compile_patterns(&entry.config.exclude_patterns) {
            Ok(patterns) => patterns,
            Err(err) => {
                warn!("Cannot start folder monitor {}: {}", monitor_id, err);
                return false;
            }
        };

        let shutdown = Arc::new(Notify::new());
        entry.shutdown = Some(shutdown.clone());
        let monitor = FolderMonitor {
            monitor_id: monitor_id.to_string(),
            root: entry.root.clone(),
            config: entry.config.clone(),
            includes,
            excludes,
            events: self.events.clone(),
            shutdown,
        };
        info!("Started monitoring folder: {}", monitor.root.display());
        tokio::spawn(monitor.run());
        true
    }

    pub async fn stop_monitor(&self, monitor_id: &str) -> bool {
        let mut monitors = self.monitors.write().await;
        let Some(entry) = monitors.get_mut(monitor_id) else {
            warn!("Folder monitor {} does not exist", monitor_id);
            return false;
        };
        match entry.shutdown.take() {
            Some(shutdown) => {
                shutdown.notify_one();
                true
            }
            None => {
                warn!("Folder monitor {} not running", monitor_id);
                false
            }
        }
    }

    pub async fn start_all(&self) {
        let ids = self.monitor_ids().await;
        for monitor_id in ids {
            self.start_monitor(&monitor_id).await;
        }
    }

    pub async fn stop_all(&self) {
        let ids = self.monitor_ids().await;
        for monitor_id in ids {
            self.stop_monitor(&monitor_id).await;
        }
        info!("Stopped all folder monitors");
    }

    pub async fn monitor_ids(&self) -> Vec<String> {
        self.monitors.read().await.keys().cloned().collect()
    }

    pub async fn is_running(&self, monitor_id: &str) -> bool {
        self.monitors
            .read()
            .await
            .get(monitor_id)
            .map(|entry| entry.shutdown.is_some())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn info_with(size: u64, digest: &str) -> FileInfo {
        FileInfo {
            exists: true,
            size,
            modified: None,
            digest: Some(digest.to_string()),
        }
    }

    #[test]
    fn diff_partitions_the_path_union() {
        let mut previous = Snapshot::new();
        previous.insert("kept.txt".into(), info_with(1, "a"));
        previous.insert("changed.txt".into(), info_with(2, "b"));
        previous.insert("gone.txt".into(), info_with(3, "c"));

        let mut current = Snapshot::new();
        current.insert("kept.txt".into(), info_with(1, "a"));
        current.insert("changed.txt".into(), info_with(2, "different"));
        current.insert("fresh.txt".into(), info_with(4, "d"));

        let changes = diff_snapshots(&previous, &current);

        // No path appears in more than one change set.
        let mut seen = std::collections::HashSet::new();
        for (_, path) in &changes {
            assert!(seen.insert(path.clone()), "{} classified twice", path.display());
        }

        let by_type = |kind: FileChangeType| {
            changes
                .iter()
                .filter(|(change, _)| *change == kind)
                .map(|(_, path)| path.clone())
                .collect::<Vec<_>>()
        };
        assert_eq!(by_type(FileChangeType::Created), vec![PathBuf::from("fresh.txt")]);
        assert_eq!(by_type(FileChangeType::Modified), vec![PathBuf::from("changed.txt")]);
        assert_eq!(by_type(FileChangeType::Deleted), vec![PathBuf::from("gone.txt")]);
    }

    #[test]
    fn pattern_filter_excludes_win() {
        let includes = vec![Pattern::new("*.json").unwrap()];
        let excludes = vec![Pattern::new("*.tmp.json").unwrap()];

        assert!(matches_patterns(Path::new("report.json"), &includes, &excludes));
        assert!(!matches_patterns(Path::new("report.txt"), &includes, &excludes));
        assert!(!matches_patterns(Path::new("scratch.tmp.json"), &includes, &excludes));

        // Empty includes admit everything not excluded.
        assert!(matches_patterns(Path::new("anything.bin"), &[], &excludes));
    }

    #[test]
    fn pattern_matches_nested_file_names() {
        let includes = vec![Pattern::new("*.paw").unwrap()];
        assert!(matches_patterns(Path::new("cases/2025/evidence.paw"), &includes, &[]));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn duplicate_and_missing_folder_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let manager = MonitorManager::new();

        assert!(manager.add_monitor("m1", dir.path(), MonitorConfig::default()).await);
        assert!(!manager.add_monitor("m1", dir.path(), MonitorConfig::default()).await);
        assert!(
            !manager
                .add_monitor("m2", &dir.path().join("missing"), MonitorConfig::default())
                .await
        );
        assert_eq!(manager.monitor_ids().await.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn poll_loop_reports_create_modify_delete() {
        let dir = tempfile::tempdir().unwrap();
        let manager = MonitorManager::new();
        let mut rx = manager.subscribe();

        let config = MonitorConfig {
            check_interval: 0.5,
            ..MonitorConfig::default()
        };
        assert!(manager.add_monitor("m1", dir.path(), config).await);
        assert!(manager.start_monitor("m1").await);
        assert!(manager.is_running("m1").await);

        let file = dir.path().join("case.json");

        tokio::time::sleep(Duration::from_millis(100)).await;
        std::fs::write(&file, "one").unwrap();
        let event = expect_change(&mut rx, FileChangeType::Created).await;
        assert_eq!(event.monitor_id, "m1");
        assert_eq!(event.path, file);

        std::fs::write(&file, "one-and-more").unwrap();
        expect_change(&mut rx, FileChangeType::Modified).await;

        std::fs::remove_file(&file).unwrap();
        expect_change(&mut rx, FileChangeType::Deleted).await;

        assert!(manager.stop_monitor("m1").await);
        assert!(!manager.is_running("m1").await);
    }

    async fn expect_change(
        rx: &mut broadcast::Receiver<FileChangeEvent>,
        expected: FileChangeType,
    ) -> FileChangeEvent {
        loop {
            let event = tokio::time::timeout(Duration::from_secs(10), rx.recv())
                .await
                .unwrap_or_else(|_| panic!("timed out waiting for {expected}"))
                .expect("event channel closed");
            if event.change == expected {
                return event;
            }
        }
    }
}
