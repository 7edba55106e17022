use std::{fs, io::Write, path::Path};

use serde_json::json;

use pawflow_models::core::{ActionConfig, ActionResult, CapturedError};

use crate::{
    context::ExecutionContext,
    utilities::{bool_param, require_str, str_param, u64_param},
    Action, ActionCore,
};

const DEFAULT_MAX_READ_BYTES: u64 = 10 * 1024 * 1024;

/// Reads a UTF-8 text file into the result data. Keys: `file_path`,
/// `max_size` (bytes, default 10 MiB).
pub struct FileReadAction {
    core: ActionCore,
}

impl FileReadAction {
    pub fn new(action_id: impl Into<String>, config: ActionConfig) -> Self {
        Self {
            core: ActionCore::new(action_id, config),
        }
    }
}

impl Action for FileReadAction {
    fn core(&self) -> &ActionCore {
        &self.core
    }

    fn type_name(&self) -> &str {
        "file-read"
    }

    fn validate(&self) -> Result<(), String> {
        require_str(self.config(), "file_path")
    }

    fn execute(&self, ctx: &mut ExecutionContext) -> ActionResult {
        let path = Path::new(str_param(self.config(), "file_path").unwrap_or_default());
        let max_size = u64_param(self.config(), "max_size", DEFAULT_MAX_READ_BYTES);

        let metadata = match fs::metadata(path) {
            Ok(metadata) => metadata,
            Err(err) => {
                return ActionResult::from_error(
                    format!("Cannot read {}", path.display()),
                    CapturedError::new("io", err.to_string()),
                )
            }
        };
        if !metadata.is_file() {
            return ActionResult::failure(format!("Not a file: {}", path.display()));
        }
        if metadata.len() > max_size {
            return ActionResult::failure(format!(
                "File too large to read: {} bytes (limit {})",
                metadata.len(),
                max_size
            ));
        }

        ctx.logger().info(&format!("Reading {}", path.display()));

        match fs::read(path) {
            Ok(bytes) => {
                let content = String::from_utf8_lossy(&bytes).into_owned();
                let mut data = serde_json::Map::new();
                data.insert("file_path".into(), json!(path.display().to_string()));
                data.insert("size".into(), json!(metadata.len()));
                data.insert("content".into(), json!(content));
                ActionResult::ok_with_data("File read successfully", data)
            }
            Err(err) => ActionResult::from_error(
                format!("Failed to read {}", path.display()),
                CapturedError::new("io", err.to_string()),
            ),
        }
    }
}

/// Writes or appends text to a file. Keys: `file_path`, `content`
/// (default empty), `append` (default false), `create_dirs` (default
/// true).
pub struct FileWriteAction {
    core: ActionCore,
}

impl FileWriteAction {
    pub fn new(action_id: impl Into<String>, config: ActionConfig) -> Self {
        Self {
            core: ActionCore::new(action_id, config),
        }
    }
}

impl Action for FileWriteAction {
    fn core(&self) -> &ActionCore {
        &self.core
    }

    fn type_name(&self) -> &str {
        "file-write"
    }

    fn validate(&self) -> Result<(), String> {
        require_str(self.config(), "file_path")
    }

    fn execute(&self, ctx: &mut ExecutionContext) -> ActionResult {
        let path = Path::new(str_param(self.config(), "file_path").unwrap_or_default());
        let content = str_param(self.config(), "content").unwrap_or_default().to_string();
        let append = bool_param(self.config(), "append", false);
        let create_dirs = bool_param(self.config(), "create_dirs", true);

        if create_dirs {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                if let Err(err) = fs::create_dir_all(parent) {
                    return ActionResult::from_error(
                        format!("Failed to create {}", parent.display()),
                        CapturedError::new("io", err.to_string()),
                    );
                }
            }
        }

        ctx.logger().info(&format!(
            "{} {} ({} bytes)",
            if append { "Appending to" } else { "Writing" },
            path.display(),
            content.len()
        ));

        let written = if append {
            fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .and_then(|mut file| file.write_all(content.as_bytes()))
        } else {
            fs::write(path, content.as_bytes())
        };

        match written {
            Ok(()) => {
                let mut data = serde_json::Map::new();
                data.insert("file_path".into(), json!(path.display().to_string()));
                data.insert("bytes_written".into(), json!(content.len()));
                data.insert("append".into(), json!(append));
                ActionResult::ok_with_data("File written successfully", data)
            }
            Err(err) => ActionResult::from_error(
                format!("Failed to write {}", path.display()),
                CapturedError::new("io", err.to_string()),
            ),
        }
    }
}
