//! Workflow Validation
//!
//! Structural checks run when a workflow is loaded or saved:
//! - Step id presence and uniqueness
//! - Exactly one start step
//! - Reference integrity of every connection
//!
//! Cycles are legal and are not reported. The run loop repeats the
//! start-step and reference checks at execution time, so an unvalidated
//! definition still fails safely.

use std::collections::HashSet;

use log::{debug, info, warn};

use super::model::{Step, WorkflowDefinition};

/// Validation error types for user-friendly error messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    EmptyWorkflow,
    EmptyStepId,
    DuplicateStepId(String),
    MissingStartStep,
    MultipleStartSteps(Vec<String>),
    InvalidReference { step: String, reference: String },
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyWorkflow => write!(f, "Workflow has no steps"),
            Self::EmptyStepId => write!(f, "Step has empty or whitespace-only ID"),
            Self::DuplicateStepId(id) => write!(f, "Duplicate step ID: '{}'", id),
            Self::MissingStartStep => write!(f, "Workflow has no start step"),
            Self::MultipleStartSteps(ids) => {
                write!(f, "Workflow has {} start steps: {}", ids.len(), ids.join(", "))
            }
            Self::InvalidReference { step, reference } => {
                write!(f, "Step '{}' references unknown step '{}'", step, reference)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Logs suspicious but legal step settings.
fn lint_step(step: &Step) {
    if step.loop_count < 1 {
        warn!(
            "Step '{}': loop count {} will run once",
            step.id, step.loop_count
        );
    }

    let c = &step.connections;
    if !step.kind.is_branch() && (c.true_step_id.is_some() || c.false_step_id.is_some()) {
        warn!(
            "Step '{}': true/false connections are ignored on {} steps",
            step.id,
            step.type_name()
        );
    }

    if step.kind.is_branch() && c.success_step_id.is_some() {
        debug!(
            "Step '{}': success connection used only if the condition cannot be evaluated",
            step.id
        );
    }
}

/// Validates the entire workflow structure.
///
/// Performs the following checks:
/// 1. Workflow is not empty
/// 2. Every step has a non-empty, unique ID
/// 3. Exactly one start step exists
/// 4. All connections point to existing steps
///
/// Returns the first error found; lint findings are only logged.
pub fn validate_workflow(workflow: &WorkflowDefinition) -> Result<(), ValidationError> {
    info!(
        "Validating workflow '{}' with {} steps",
        workflow.id,
        workflow.steps.len()
    );

    if workflow.steps.is_empty() {
        return Err(ValidationError::EmptyWorkflow);
    }

    let mut seen_ids: HashSet<&str> = HashSet::new();
    for step in &workflow.steps {
        if step.id.trim().is_empty() {
            return Err(ValidationError::EmptyStepId);
        }
        if !seen_ids.insert(step.id.as_str()) {
            return Err(ValidationError::DuplicateStepId(step.id.clone()));
        }
    }

    let starts = workflow.start_steps();
    match starts.len() {
        0 => return Err(ValidationError::MissingStartStep),
        1 => {}
        _ => {
            return Err(ValidationError::MultipleStartSteps(
                starts.iter().map(|s| s.id.clone()).collect(),
            ))
        }
    }

    for step in &workflow.steps {
        lint_step(step);

        if let Some(reference) = step
            .connections
            .targets()
            .find(|target| !seen_ids.contains(target))
        {
            return Err(ValidationError::InvalidReference {
                step: step.id.clone(),
                reference: reference.to_string(),
            });
        }
    }

    info!("Workflow '{}' validated", workflow.id);
    Ok(())
}
