//! Execution Errors
//!
//! Step-level failures flow into a [`StepResult`](super::StepResult) and are
//! routed like any other outcome. [`StepError::is_fatal`] marks the ones that
//! abort the run regardless of wiring: configuration mistakes and resource
//! limits.

use thiserror::Error;

use crate::device::DeviceError;

/// Failure of a single step iteration.
#[derive(Debug, Clone, Error)]
pub enum StepError {
    #[error("{step_type} step is missing parameters: {missing}")]
    MissingParameters {
        step_type: &'static str,
        missing: String,
    },

    #[error("unsupported step type")]
    UnsupportedStep,

    #[error("unknown branch condition '{0}'")]
    UnknownCondition(String),

    #[error("{0} is not configured")]
    Unavailable(&'static str),

    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error("workflow '{0}' not found")]
    WorkflowNotFound(String),

    #[error("workflow store error: {0}")]
    Store(String),

    #[error("maximum nesting depth exceeded (limit {0})")]
    NestingDepthExceeded(usize),

    /// A nested run ended with an error that is not fatal to the caller.
    #[error("sub-workflow '{workflow_id}' failed: {message}")]
    SubWorkflowFailed { workflow_id: String, message: String },

    /// A nested run hit a fatal error; carried up unchanged.
    #[error(transparent)]
    Aborted(Box<RunError>),

    #[error("cancelled")]
    Cancelled,
}

impl StepError {
    pub(crate) fn missing(step_type: &'static str, missing: &[&str]) -> Self {
        Self::MissingParameters {
            step_type,
            missing: missing.join(", "),
        }
    }

    /// True for errors that end the run immediately.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::MissingParameters { .. }
            | Self::UnsupportedStep
            | Self::UnknownCondition(_)
            | Self::Unavailable(_)
            | Self::WorkflowNotFound(_)
            | Self::Store(_)
            | Self::NestingDepthExceeded(_)
            | Self::Aborted(_) => true,
            Self::Device(_) | Self::SubWorkflowFailed { .. } | Self::Cancelled => false,
        }
    }
}

/// Terminal error of a run (or of a nested walk).
#[derive(Debug, Clone, Error)]
pub enum RunError {
    #[error("a workflow is already running on device '{0}'")]
    AlreadyRunning(String),

    #[error("workflow '{0}' has no start step")]
    NoStartStep(String),

    #[error("workflow '{workflow_id}' has {count} start steps")]
    MultipleStartSteps { workflow_id: String, count: usize },

    #[error("corrupt graph: step '{step_id}' not found in workflow '{workflow_id}'")]
    CorruptGraph { workflow_id: String, step_id: String },

    #[error("step budget exceeded ({0} steps)")]
    StepBudgetExceeded(usize),

    #[error("step '{step_id}' failed: {source}")]
    StepFailed {
        step_id: String,
        #[source]
        source: StepError,
    },

    #[error("cancelled")]
    Cancelled,
}

impl RunError {
    /// Whether this error, raised inside a sub-workflow, must also end the
    /// calling run.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::StepFailed { source, .. } => source.is_fatal(),
            Self::AlreadyRunning(_) | Self::Cancelled => false,
            Self::NoStartStep(_)
            | Self::MultipleStartSteps { .. }
            | Self::CorruptGraph { .. }
            | Self::StepBudgetExceeded(_) => true,
        }
    }
}
