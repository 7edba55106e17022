use std::{
    fs, io,
    path::Path,
    time::{Duration, SystemTime},
};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Files at or above this size are fingerprinted by metadata only.
pub const HASH_SIZE_CEILING: u64 = 10 * 1024 * 1024;

const MIN_CHECK_INTERVAL: f64 = 0.5;

/// Fingerprint of one monitored file. Two snapshots of the same path are
/// compared to classify a change; renames are not detected and surface
/// as one delete plus one create.
#[derive(Debug, Clone, PartialEq)]
pub struct FileInfo {
    pub exists: bool,
    pub size: u64,
    pub modified: Option<SystemTime>,
    pub digest: Option<String>,
}

impl FileInfo {
    pub fn capture(path: &Path) -> Self {
        match fs::metadata(path) {
            Ok(metadata) if metadata.is_file() => {
                let size = metadata.len();
                let digest = if size < HASH_SIZE_CEILING {
                    hash_file(path).ok()
                } else {
                    None
                };
                Self {
                    exists: true,
                    size,
                    modified: metadata.modified().ok(),
                    digest,
                }
            }
            _ => Self {
                exists: false,
                size: 0,
                modified: None,
                digest: None,
            },
        }
    }

    pub fn has_changed(&self, other: &FileInfo) -> bool {
        if self.exists != other.exists {
            return true;
        }
        if !self.exists {
            return false;
        }
        if self.size != other.size || self.modified != other.modified {
            return true;
        }
        match (&self.digest, &other.digest) {
            (Some(a), Some(b)) => a != b,
            _ => false,
        }
    }
}

fn hash_file(path: &Path) -> io::Result<String> {
    let bytes = fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Seconds between poll passes.
    #[serde(default = "default_check_interval")]
    pub check_interval: f64,
    #[serde(default = "default_true")]
    pub recursive: bool,
    /// Glob patterns to include; empty means every file.
    #[serde(default)]
    pub file_patterns: Vec<String>,
    /// Glob patterns to exclude; exclusions win over inclusions.
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
}

fn default_check_interval() -> f64 {
    2.0
}

fn default_true() -> bool {
    true
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            check_interval: default_check_interval(),
            recursive: true,
            file_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
        }
    }
}

impl MonitorConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs_f64(self.check_interval.max(MIN_CHECK_INTERVAL))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_and_compare_fingerprints() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        fs::write(&path, "one").unwrap();

        let first = FileInfo::capture(&path);
        assert!(first.exists);
        assert_eq!(first.size, 3);
        assert!(first.digest.is_some());
        assert!(!first.has_changed(&first.clone()));

        fs::write(&path, "three").unwrap();
        let second = FileInfo::capture(&path);
        assert!(second.has_changed(&first));

        let missing = FileInfo::capture(&dir.path().join("ghost.txt"));
        assert!(!missing.exists);
        assert!(missing.has_changed(&first));
        assert!(!missing.has_changed(&missing.clone()));
    }

    #[test]
    fn check_interval_has_a_floor() {
        let config = MonitorConfig {
            check_interval: 0.01,
            ..MonitorConfig::default()
        };
        assert_eq!(config.interval(), Duration::from_secs_f64(0.5));
    }
}
