use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use serde_json::json;

use pawflow_models::core::{ActionConfig, ActionResult};

use crate::{context::ExecutionContext, utilities::bool_param, Action, ActionCore};

/// Runs a list of sub-actions sequentially. Each sub-action's result is
/// stored in the context under its action id so later sub-actions can
/// reference earlier outputs. Keys: `stop_on_failure` (default true).
pub struct CompositeAction {
    core: ActionCore,
    actions: Vec<Arc<dyn Action>>,
    current: AtomicUsize,
}

impl CompositeAction {
    pub fn new(action_id: impl Into<String>, config: ActionConfig) -> Self {
        Self {
            core: ActionCore::new(action_id, config),
            actions: Vec::new(),
            current: AtomicUsize::new(usize::MAX),
        }
    }

    pub fn add_action(&mut self, action: Arc<dyn Action>) {
        self.actions.push(action);
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

impl Action for CompositeAction {
    fn core(&self) -> &ActionCore {
        &self.core
    }

    fn type_name(&self) -> &str {
        "composite"
    }

    fn validate(&self) -> Result<(), String> {
        for action in &self.actions {
            action
                .validate()
                .map_err(|err| format!("{}: {}", action.action_id(), err))?;
        }
        Ok(())
    }

    fn execute(&self, ctx: &mut ExecutionContext) -> ActionResult {
        if self.actions.is_empty() {
            return ActionResult::failure("No sub-actions to execute");
        }

        let stop_on_failure = bool_param(self.config(), "stop_on_failure", true);
        let total = self.actions.len();
        let mut results = Vec::with_capacity(total);

        for (index, action) in self.actions.iter().enumerate() {
            if self.is_canceled() {
                ctx.logger().warn("Composite canceled, skipping remaining sub-actions");
                break;
            }
            self.current.store(index, Ordering::SeqCst);

            ctx.logger().info(&format!(
                "Executing sub-action {}/{}: {}",
                index + 1,
                total,
                action.action_id()
            ));

            let result = action.execute(ctx);
            ctx.add_result(action.action_id().to_string(), result.clone());
            let failed = !result.success;
            results.push(result);

            self.set_progress((index + 1) as f32 / total as f32);

            if failed && stop_on_failure {
                ctx.logger().warn(&format!(
                    "Sub-action {} failed, stopping",
                    action.action_id()
                ));
                break;
            }
        }

        self.current.store(usize::MAX, Ordering::SeqCst);

        let succeeded = results.iter().filter(|result| result.success).count();
        let sub_results: Vec<serde_json::Value> = results
            .iter()
            .filter_map(|result| serde_json::to_value(result).ok())
            .collect();
        let mut data = serde_json::Map::new();
        data.insert("sub_results".into(), json!(sub_results));

        if succeeded == results.len() && results.len() == total {
            ActionResult::ok_with_data(
                format!("All {total} sub-actions completed successfully"),
                data,
            )
        } else {
            ActionResult::failure_with_data(
                format!("{succeeded}/{total} sub-actions completed successfully"),
                data,
            )
        }
    }

    fn cancel(&self) {
        self.core().state.cancel();
        let index = self.current.load(Ordering::SeqCst);
        if let Some(action) = self.actions.get(index) {
            action.cancel();
        }
    }
}
