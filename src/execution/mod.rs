//! Workflow Execution Module
//!
//! Walks workflow graphs against a device, one run per device at a time.
//!
//! # Architecture
//!
//! - [`manager`]: Per-device admission, cancellation and last results
//! - [`engine`]: Graph walker and sub-workflow invocation
//! - [`step`]: Individual step execution
//! - [`routing`]: Next-step resolution
//! - [`branch`]: Branch condition evaluation
//! - [`expression`]: Arithmetic evaluation for `set_variable`
//! - [`variables`]: Per-run variable store and `{{name}}` substitution
//! - [`cancel`]: Cooperative cancellation

pub mod branch;
pub mod cancel;
pub mod engine;
pub mod error;
pub mod expression;
pub mod manager;
pub mod result;
pub mod routing;
pub mod step;
pub mod variables;

pub use cancel::CancelToken;
pub use engine::Engine;
pub use error::{RunError, StepError};
pub use manager::RunManager;
pub use result::{ExecutionResult, RunStatus};
pub use step::StepResult;
pub use variables::VariableStore;
