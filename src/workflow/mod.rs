//! Workflow Definition Module
//!
//! Provides data structures and utilities for defining, parsing,
//! validating and storing automation workflows.
//!
//! # Structure
//!
//! - [`model`]: Core data structures (Step, WorkflowDefinition)
//! - [`parser`]: YAML/JSON loading and saving
//! - [`validator`]: Structural checks on the step graph
//! - [`store`]: Workflow lookup for sub-workflow calls

pub mod model;
pub mod parser;
pub mod store;
pub mod validator;

pub use model::{
    Connections, OnError, Selector, SelectorKind, Step, StepKind, WorkflowDefinition,
};
pub use parser::{load_workflow, save_workflow};
pub use store::{FileWorkflowStore, MemoryWorkflowStore, StoreError, WorkflowStore};
pub use validator::{validate_workflow, ValidationError};
