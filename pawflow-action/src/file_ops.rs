use std::{fs, io, path::Path};

use serde_json::json;

use pawflow_models::core::{ActionConfig, ActionResult, CapturedError};

use crate::{
    context::ExecutionContext,
    utilities::{bool_param, require_str, str_param},
    Action, ActionCore,
};

fn io_error_result(message: String, err: &io::Error) -> ActionResult {
    ActionResult::from_error(message, CapturedError::new("io", err.to_string()))
}

/// Copies a file or directory tree. Keys: `source`, `destination`,
/// `overwrite` (default false).
pub struct FileCopyAction {
    core: ActionCore,
}

impl FileCopyAction {
    pub fn new(action_id: impl Into<String>, config: ActionConfig) -> Self {
        Self {
            core: ActionCore::new(action_id, config),
        }
    }

    fn copy_dir_all(&self, source: &Path, destination: &Path) -> io::Result<u64> {
        fs::create_dir_all(destination)?;
        let mut copied = 0;
        for entry in fs::read_dir(source)? {
            if self.is_canceled() {
                return Err(io::Error::new(io::ErrorKind::Interrupted, "copy canceled"));
            }
            let entry = entry?;
            let target = destination.join(entry.file_name());
            if entry.file_type()?.is_dir() {
                copied += self.copy_dir_all(&entry.path(), &target)?;
            } else {
                fs::copy(entry.path(), &target)?;
                copied += 1;
            }
        }
        Ok(copied)
    }
}

impl Action for FileCopyAction {
    fn core(&self) -> &ActionCore {
        &self.core
    }

    fn type_name(&self) -> &str {
        "file-copy"
    }

    fn validate(&self) -> Result<(), String> {
        require_str(self.config(), "source")?;
        require_str(self.config(), "destination")?;
        Ok(())
    }

    fn execute(&self, ctx: &mut ExecutionContext) -> ActionResult {
        let source = Path::new(str_param(self.config(), "source").unwrap_or_default());
        let destination = Path::new(str_param(self.config(), "destination").unwrap_or_default());
        let overwrite = bool_param(self.config(), "overwrite", false);

        if !source.exists() {
            return ActionResult::failure(format!("Source does not exist: {}", source.display()));
        }
        if destination.exists() && !overwrite {
            return ActionResult::failure(format!(
                "Destination already exists: {}",
                destination.display()
            ));
        }

        ctx.logger().info(&format!(
            "Copying {} to {}",
            source.display(),
            destination.display()
        ));

        if source.is_dir() {
            if destination.exists() && overwrite {
                if let Err(err) = fs::remove_dir_all(destination) {
                    return io_error_result(
                        format!("Failed to replace {}", destination.display()),
                        &err,
                    );
                }
            }
            match self.copy_dir_all(source, destination) {
                Ok(copied) => {
                    let mut data = serde_json::Map::new();
                    data.insert("source".into(), json!(source.display().to_string()));
                    data.insert("destination".into(), json!(destination.display().to_string()));
                    data.insert("is_directory".into(), json!(true));
                    data.insert("files_copied".into(), json!(copied));
                    ActionResult::ok_with_data("Directory copied successfully", data)
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {
                    ActionResult::failure("Copy canceled before completion")
                }
                Err(err) => io_error_result(
                    format!("Failed to copy {} to {}", source.display(), destination.display()),
                    &err,
                ),
            }
        } else {
            if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
                if let Err(err) = fs::create_dir_all(parent) {
                    return io_error_result(format!("Failed to create {}", parent.display()), &err);
                }
            }
            match fs::copy(source, destination) {
                Ok(_) => {
                    let mut data = serde_json::Map::new();
                    data.insert("source".into(), json!(source.display().to_string()));
                    data.insert("destination".into(), json!(destination.display().to_string()));
                    data.insert("is_directory".into(), json!(false));
                    ActionResult::ok_with_data("File copied successfully", data)
                }
                Err(err) => io_error_result(
                    format!("Failed to copy {} to {}", source.display(), destination.display()),
                    &err,
                ),
            }
        }
    }
}

/// Moves a file or directory. Keys: `source`, `destination`, `overwrite`.
/// Falls back to copy-and-delete when a plain rename fails.
pub struct FileMoveAction {
    core: ActionCore,
}

impl FileMoveAction {
    pub fn new(action_id: impl Into<String>, config: ActionConfig) -> Self {
        Self {
            core: ActionCore::new(action_id, config),
        }
    }
}

impl Action for FileMoveAction {
    fn core(&self) -> &ActionCore {
        &self.core
    }

    fn type_name(&self) -> &str {
        "file-move"
    }

    fn validate(&self) -> Result<(), String> {
        require_str(self.config(), "source")?;
        require_str(self.config(), "destination")?;
        Ok(())
    }

    fn execute(&self, ctx: &mut ExecutionContext) -> ActionResult {
        let source = Path::new(str_param(self.config(), "source").unwrap_or_default());
        let destination = Path::new(str_param(self.config(), "destination").unwrap_or_default());
        let overwrite = bool_param(self.config(), "overwrite", false);

        if !source.exists() {
            return ActionResult::failure(format!("Source does not exist: {}", source.display()));
        }
        if destination.exists() && !overwrite {
            return ActionResult::failure(format!(
                "Destination already exists: {}",
                destination.display()
            ));
        }

        ctx.logger().info(&format!(
            "Moving {} to {}",
            source.display(),
            destination.display()
        ));

        if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
            if let Err(err) = fs::create_dir_all(parent) {
                return io_error_result(format!("Failed to create {}", parent.display()), &err);
            }
        }

        let moved = fs::rename(source, destination).or_else(|_| {
            // Rename fails across filesystems; copy then remove.
            if source.is_dir() {
                copy_tree(source, destination).and_then(|_| fs::remove_dir_all(source))
            } else {
                fs::copy(source, destination).and_then(|_| fs::remove_file(source))
            }
        });

        match moved {
            Ok(()) => {
                let mut data = serde_json::Map::new();
                data.insert("source".into(), json!(source.display().to_string()));
                data.insert("destination".into(), json!(destination.display().to_string()));
                ActionResult::ok_with_data("Moved successfully", data)
            }
            Err(err) => io_error_result(
                format!("Failed to move {} to {}", source.display(), destination.display()),
                &err,
            ),
        }
    }
}

fn copy_tree(source: &Path, destination: &Path) -> io::Result<()> {
    fs::create_dir_all(destination)?;
    for entry in fs::read_dir(source)? {
        let entry = entry?;
        let target = destination.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_tree(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// Deletes a file or directory tree. Keys: `path`, `missing_ok`
/// (default false).
pub struct FileDeleteAction {
    core: ActionCore,
}

impl FileDeleteAction {
    pub fn new(action_id: impl Into<String>, config: ActionConfig) -> Self {
        Self {
            core: ActionCore::new(action_id, config),
        }
    }
}

impl Action for FileDeleteAction {
    fn core(&self) -> &ActionCore {
        &self.core
    }

    fn type_name(&self) -> &str {
        "file-delete"
    }

    fn validate(&self) -> Result<(), String> {
        require_str(self.config(), "path")
    }

    fn execute(&self, ctx: &mut ExecutionContext) -> ActionResult {
        let path = Path::new(str_param(self.config(), "path").unwrap_or_default());
        let missing_ok = bool_param(self.config(), "missing_ok", false);

        if !path.exists() {
            if missing_ok {
                return ActionResult::ok(format!("Nothing to delete at {}", path.display()));
            }
            return ActionResult::failure(format!("Path does not exist: {}", path.display()));
        }

        ctx.logger().info(&format!("Deleting {}", path.display()));

        let removed = if path.is_dir() {
            fs::remove_dir_all(path)
        } else {
            fs::remove_file(path)
        };

        match removed {
            Ok(()) => {
                let mut data = serde_json::Map::new();
                data.insert("path".into(), json!(path.display().to_string()));
                ActionResult::ok_with_data("Deleted successfully", data)
            }
            Err(err) => io_error_result(format!("Failed to delete {}", path.display()), &err),
        }
    }
}

/// Creates a directory. Keys: `path`, `create_parents` (default true).
pub struct FileMakeDirectoryAction {
    core: ActionCore,
}

impl FileMakeDirectoryAction {
    pub fn new(action_id: impl Into<String>, config: ActionConfig) -> Self {
        Self {
            core: ActionCore::new(action_id, config),
        }
    }
}

impl Action for FileMakeDirectoryAction {
    fn core(&self) -> &ActionCore {
        &self.core
    }

    fn type_name(&self) -> &str {
        "file-make-directory"
    }

    fn validate(&self) -> Result<(), String> {
        require_str(self.config(), "path")
    }

    fn execute(&self, ctx: &mut ExecutionContext) -> ActionResult {
        let path = Path::new(str_param(self.config(), "path").unwrap_or_default());
        let create_parents = bool_param(self.config(), "create_parents", true);

        if path.is_dir() {
            return ActionResult::ok(format!("Directory already exists: {}", path.display()));
        }

        ctx.logger().info(&format!("Creating directory {}", path.display()));

        let created = if create_parents {
            fs::create_dir_all(path)
        } else {
            fs::create_dir(path)
        };

        match created {
            Ok(()) => {
                let mut data = serde_json::Map::new();
                data.insert("path".into(), json!(path.display().to_string()));
                ActionResult::ok_with_data("Directory created", data)
            }
            Err(err) => io_error_result(format!("Failed to create {}", path.display()), &err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use pawflow_utilities::tasklog::LogManager;

    fn context(dir: &Path) -> ExecutionContext {
        let manager = LogManager::new(dir.join("logs"), 5);
        let logger = manager.create_logger("task_a", "exec_1").unwrap();
        ExecutionContext::new("task_a", "exec_1", HashMap::new(), logger)
    }

    fn config(pairs: &[(&str, serde_json::Value)]) -> ActionConfig {
        let mut map = ActionConfig::new();
        for (key, value) in pairs {
            map.insert(key.to_string(), value.clone());
        }
        map
    }

    #[test]
    fn copy_requires_source_and_destination() {
        let action = FileCopyAction::new("a1", ActionConfig::new());
        assert!(action.validate().is_err());

        let action = FileCopyAction::new(
            "a1",
            config(&[("source", "a".into()), ("destination", "b".into())]),
        );
        assert!(action.validate().is_ok());
    }

    #[test]
    fn copy_file_and_refuse_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("in.txt");
        let destination = dir.path().join("out.txt");
        fs::write(&source, "payload").unwrap();

        let action = FileCopyAction::new(
            "a1",
            config(&[
                ("source", source.to_str().unwrap().into()),
                ("destination", destination.to_str().unwrap().into()),
            ]),
        );
        let mut ctx = context(dir.path());

        let result = action.execute(&mut ctx);
        assert!(result.success, "{}", result.message);
        assert_eq!(fs::read_to_string(&destination).unwrap(), "payload");

        // Second copy without overwrite fails before any I/O.
        let result = action.execute(&mut ctx);
        assert!(!result.success);
        assert!(result.message.contains("already exists"));
    }

    #[test]
    fn copy_directory_recursively() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("tree");
        fs::create_dir_all(source.join("nested")).unwrap();
        fs::write(source.join("a.txt"), "a").unwrap();
        fs::write(source.join("nested/b.txt"), "b").unwrap();

        let destination = dir.path().join("copy");
        let action = FileCopyAction::new(
            "a1",
            config(&[
                ("source", source.to_str().unwrap().into()),
                ("destination", destination.to_str().unwrap().into()),
            ]),
        );
        let mut ctx = context(dir.path());

        let result = action.execute(&mut ctx);
        assert!(result.success);
        assert_eq!(result.data["files_copied"], json!(2));
        assert!(destination.join("nested/b.txt").is_file());
    }

    #[test]
    fn move_then_source_is_gone() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("in.txt");
        let destination = dir.path().join("sub/out.txt");
        fs::write(&source, "payload").unwrap();

        let action = FileMoveAction::new(
            "a1",
            config(&[
                ("source", source.to_str().unwrap().into()),
                ("destination", destination.to_str().unwrap().into()),
            ]),
        );
        let mut ctx = context(dir.path());

        let result = action.execute(&mut ctx);
        assert!(result.success, "{}", result.message);
        assert!(!source.exists());
        assert_eq!(fs::read_to_string(&destination).unwrap(), "payload");
    }

    #[test]
    fn delete_respects_missing_ok() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("ghost.txt");
        let mut ctx = context(dir.path());

        let strict = FileDeleteAction::new(
            "a1",
            config(&[("path", missing.to_str().unwrap().into())]),
        );
        assert!(!strict.execute(&mut ctx).success);

        let lenient = FileDeleteAction::new(
            "a2",
            config(&[
                ("path", missing.to_str().unwrap().into()),
                ("missing_ok", json!(true)),
            ]),
        );
        assert!(lenient.execute(&mut ctx).success);
    }

    #[test]
    fn make_directory_without_parents_fails_on_deep_path() {
        let dir = tempfile::tempdir().unwrap();
        let deep = dir.path().join("a/b/c");
        let mut ctx = context(dir.path());

        let no_parents = FileMakeDirectoryAction::new(
            "a1",
            config(&[
                ("path", deep.to_str().unwrap().into()),
                ("create_parents", json!(false)),
            ]),
        );
        assert!(!no_parents.execute(&mut ctx).success);

        let with_parents = FileMakeDirectoryAction::new(
            "a2",
            config(&[("path", deep.to_str().unwrap().into())]),
        );
        assert!(with_parents.execute(&mut ctx).success);
        assert!(deep.is_dir());
    }
}
