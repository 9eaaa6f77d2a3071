//! Next-step Resolution
//!
//! Decides where the run goes after a step, in priority order:
//!
//! 1. Branch condition results follow `true_step_id` / `false_step_id`
//! 2. Success follows `success_step_id`
//! 3. A wired `error_step_id` handles the failure
//! 4. `on_error: continue` follows `success_step_id` anyway
//! 5. Otherwise the run ends here

use super::StepResult;
use crate::workflow::model::{OnError, Step};

fn wired(id: &Option<String>) -> Option<&str> {
    id.as_deref().filter(|id| !id.is_empty())
}

/// Returns the id of the next step, or `None` to end the run.
pub fn resolve_next<'a>(step: &'a Step, result: &StepResult) -> Option<&'a str> {
    let c = &step.connections;

    if step.kind.is_branch() && result.is_condition {
        return if result.success {
            wired(&c.true_step_id)
        } else {
            wired(&c.false_step_id)
        };
    }

    if result.success {
        return wired(&c.success_step_id);
    }

    if let Some(handler) = wired(&c.error_step_id) {
        return Some(handler);
    }

    if step.on_error == OnError::Continue {
        return wired(&c.success_step_id);
    }

    None
}
