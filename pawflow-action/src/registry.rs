use std::{collections::HashMap, sync::Arc};

use log::{debug, warn};
use thiserror::Error;

use pawflow_models::core::ActionConfig;

use crate::{
    composite::CompositeAction,
    file_content::{FileReadAction, FileWriteAction},
    file_ops::{FileCopyAction, FileDeleteAction, FileMakeDirectoryAction, FileMoveAction},
    Action,
};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("unknown action type: {0}")]
    UnknownType(String),
}

pub type ActionConstructor = Box<dyn Fn(String, ActionConfig) -> Arc<dyn Action> + Send + Sync>;

/// What happens when a type name is registered twice. The source of this
/// engine silently overwrote; both behaviors are supported and the
/// default matches the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictPolicy {
    #[default]
    Overwrite,
    Reject,
}

/// Maps action type names to constructors. Registration is an explicit
/// call list built at startup; there is no module scanning.
pub struct ActionRegistry {
    constructors: HashMap<String, ActionConstructor>,
    policy: ConflictPolicy,
}

impl Default for ActionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::with_policy(ConflictPolicy::default())
    }

    pub fn with_policy(policy: ConflictPolicy) -> Self {
        Self {
            constructors: HashMap::new(),
            policy,
        }
    }

    pub fn register(&mut self, type_name: &str, constructor: ActionConstructor) -> bool {
        if self.constructors.contains_key(type_name) {
            match self.policy {
                ConflictPolicy::Reject => {
                    warn!("Action type '{}' is already registered, keeping existing", type_name);
                    return false;
                }
                ConflictPolicy::Overwrite => {
                    warn!("Action type '{}' is already registered, overwriting", type_name);
                }
            }
        }
        self.constructors.insert(type_name.to_string(), constructor);
        debug!("Registered action type '{}'", type_name);
        true
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.constructors.contains_key(type_name)
    }

    pub fn type_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.constructors.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn create(
        &self,
        type_name: &str,
        action_id: &str,
        config: ActionConfig,
    ) -> Result<Arc<dyn Action>, RegistryError> {
        let constructor = self
            .constructors
            .get(type_name)
            .ok_or_else(|| RegistryError::UnknownType(type_name.to_string()))?;
        Ok(constructor(action_id.to_string(), config))
    }
}

/// Canonical type name for an action struct: CamelCase to kebab-case,
/// with a trailing `Action` suffix stripped. `FileCopyAction` becomes
/// `file-copy`, `ReportAction` becomes `report`.
pub fn derive_type_name(struct_name: &str) -> String {
    let mut out = String::with_capacity(struct_name.len() + 4);
    for (i, ch) in struct_name.chars().enumerate() {
        if ch.is_uppercase() {
            if i > 0 {
                out.push('-');
            }
            out.extend(ch.to_lowercase());
        } else {
            out.push(ch);
        }
    }
    match out.strip_suffix("-action") {
        Some(stripped) => stripped.to_string(),
        None => out,
    }
}

/// Registers every built-in action under its canonical type name.
pub fn register_builtin_actions(registry: &mut ActionRegistry) {
    registry.register(
        &derive_type_name("FileCopyAction"),
        Box::new(|id, config| Arc::new(FileCopyAction::new(id, config))),
    );
    registry.register(
        &derive_type_name("FileMoveAction"),
        Box::new(|id, config| Arc::new(FileMoveAction::new(id, config))),
    );
    registry.register(
        &derive_type_name("FileDeleteAction"),
        Box::new(|id, config| Arc::new(FileDeleteAction::new(id, config))),
    );
    registry.register(
        &derive_type_name("FileMakeDirectoryAction"),
        Box::new(|id, config| Arc::new(FileMakeDirectoryAction::new(id, config))),
    );
    registry.register(
        &derive_type_name("FileReadAction"),
        Box::new(|id, config| Arc::new(FileReadAction::new(id, config))),
    );
    registry.register(
        &derive_type_name("FileWriteAction"),
        Box::new(|id, config| Arc::new(FileWriteAction::new(id, config))),
    );
    registry.register(
        &derive_type_name("CompositeAction"),
        Box::new(|id, config| Arc::new(CompositeAction::new(id, config))),
    );
}
