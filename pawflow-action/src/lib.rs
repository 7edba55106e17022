pub mod composite;
pub mod context;
pub mod file_content;
pub mod file_ops;
pub mod registry;
mod utilities;

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use pawflow_models::core::{ActionConfig, ActionResult};

use crate::context::ExecutionContext;

/// Cancellation flag and progress fraction owned by an action instance.
/// The only mutable state an action carries between engine calls.
#[derive(Debug, Default)]
pub struct ActionState {
    canceled: AtomicBool,
    progress: AtomicU32,
}

impl ActionState {
    pub fn cancel(&self) {
        self.canceled.store(true, Ordering::SeqCst);
    }

    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::SeqCst)
    }

    pub fn progress(&self) -> f32 {
        f32::from_bits(self.progress.load(Ordering::SeqCst))
    }

    pub fn set_progress(&self, value: f32) {
        let clamped = value.clamp(0.0, 1.0);
        self.progress.store(clamped.to_bits(), Ordering::SeqCst);
    }

    pub fn reset(&self) {
        self.canceled.store(false, Ordering::SeqCst);
        self.progress.store(0f32.to_bits(), Ordering::SeqCst);
    }
}

/// Identity, configuration and runtime state shared by every action
/// implementation.
#[derive(Debug)]
pub struct ActionCore {
    action_id: String,
    config: ActionConfig,
    state: ActionState,
}

impl ActionCore {
    pub fn new(action_id: impl Into<String>, config: ActionConfig) -> Self {
        Self {
            action_id: action_id.into(),
            config,
            state: ActionState::default(),
        }
    }
}

/// A single named unit of work. Implementations provide `core`,
/// `type_name`, `validate` and `execute`; the engine bookkeeping methods
/// come for free.
///
/// `execute` runs on a blocking worker and must consult `is_canceled`
/// at safe points; cancellation is cooperative only.
pub trait Action: Send + Sync {
    fn core(&self) -> &ActionCore;

    fn type_name(&self) -> &str;

    /// Checked before a worker is spawned. Missing required keys must be
    /// reported here, before any I/O happens.
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }

    fn execute(&self, ctx: &mut ExecutionContext) -> ActionResult;

    fn action_id(&self) -> &str {
        &self.core().action_id
    }

    fn config(&self) -> &ActionConfig {
        &self.core().config
    }

    fn display_name(&self) -> String {
        utilities::str_param(self.config(), "display_name")
            .map(str::to_string)
            .unwrap_or_else(|| self.type_name().to_string())
    }

    fn description(&self) -> String {
        utilities::str_param(self.config(), "description")
            .unwrap_or_default()
            .to_string()
    }

    fn cancel(&self) {
        self.core().state.cancel();
    }

    fn is_canceled(&self) -> bool {
        self.core().state.is_canceled()
    }

    fn progress(&self) -> f32 {
        self.core().state.progress()
    }

    fn set_progress(&self, value: f32) {
        self.core().state.set_progress(value);
    }

    /// Clears the cancellation flag and progress before a fresh run.
    fn reset(&self) {
        self.core().state.reset();
    }
}

impl std::fmt::Debug for dyn Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Action")
            .field("type_name", &self.type_name())
            .field("action_id", &self.action_id())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_reset_clears_cancel_and_progress() {
        let state = ActionState::default();
        state.cancel();
        state.set_progress(0.7);
        assert!(state.is_canceled());

        state.reset();
        assert!(!state.is_canceled());
        assert_eq!(state.progress(), 0.0);
    }

    #[test]
    fn progress_is_clamped() {
        let state = ActionState::default();
        state.set_progress(3.5);
        assert_eq!(state.progress(), 1.0);
        state.set_progress(-1.0);
        assert_eq!(state.progress(), 0.0);
    }
}
