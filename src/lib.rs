//! TapFlow - Device Workflow Automation Engine
//!
//! Runs declarative workflows (taps, swipes, element interactions,
//! branches, loops, variables and nested sub-workflows) against an
//! Android device session.
//!
//! # Architecture
//!
//! The library is organized into five modules:
//!
//! - [`workflow`]: Workflow definitions, parsing, validation and storage
//! - [`execution`]: Graph-walking engine and per-device run manager
//! - [`device`]: Device, UI snapshot and script player interfaces
//! - [`monitoring`]: Lifecycle events and execution timeline
//! - [`config`]: Engine limits and defaults
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use tapflow::device::AdbDevice;
//! use tapflow::execution::{Engine, RunManager};
//! use tapflow::load_workflow;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Load a workflow from YAML
//!     let workflow = load_workflow("login.yaml")?;
//!
//!     // One manager per process; one run per device at a time
//!     let manager = RunManager::new(Engine::new(Arc::new(AdbDevice::new())));
//!
//!     let result = manager.start("emulator-5554", workflow)?.await?;
//!     println!("{} after {} steps", result.status, result.steps_executed);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod device;
pub mod execution;
pub mod monitoring;
pub mod workflow;

#[cfg(test)]
mod test_support;

// Re-export commonly used types
pub use config::EngineConfig;
pub use execution::{Engine, ExecutionResult, RunManager, RunStatus};
pub use workflow::model::{Step, StepKind, WorkflowDefinition};
pub use workflow::parser::load_workflow;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "TapFlow";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_version() {
        assert!(!VERSION.is_empty());
        assert!(VERSION.contains('.'));
    }

    #[test]
    fn test_app_name() {
        assert_eq!(APP_NAME, "TapFlow");
    }

    #[test]
    fn test_module_exports_step() {
        let step = Step::new("test", StepKind::Start);
        assert_eq!(step.id, "test");
        assert_eq!(step.type_name(), "start");
    }

    #[test]
    fn test_module_exports_workflow() {
        let workflow = WorkflowDefinition::new("wf", "Workflow");
        assert!(workflow.is_empty());
    }

    #[test]
    fn test_version_format() {
        let parts: Vec<&str> = VERSION.split('.').collect();
        assert!(parts.len() >= 2, "Version should have at least major.minor");
        for part in parts {
            assert!(part.parse::<u32>().is_ok(), "Version components should be numeric");
        }
    }
}
