//! Workflow Parser
//!
//! Handles loading and saving workflow definitions. YAML is the native
//! format; files ending in `.json` are read as JSON.

use std::error::Error;
use std::fs;
use std::path::Path;

use log::{debug, info};

use super::model::WorkflowDefinition;
use super::validator::validate_workflow;

/// Returns true when the path should be treated as JSON.
pub(crate) fn is_json(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

/// Parses a workflow definition from text without validating it.
pub fn parse_workflow(content: &str, json: bool) -> Result<WorkflowDefinition, Box<dyn Error>> {
    let workflow = if json {
        serde_json::from_str(content)
            .map_err(|e| format!("Failed to parse workflow JSON: {}. Check the file format.", e))?
    } else {
        serde_yaml::from_str(content)
            .map_err(|e| format!("Failed to parse workflow YAML: {}. Check the file format.", e))?
    };
    Ok(workflow)
}

/// Loads a workflow from a YAML or JSON file.
///
/// The definition is validated before it is returned.
///
/// # Example
///
/// ```rust,no_run
/// use tapflow::workflow::load_workflow;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let workflow = load_workflow("login.yaml")?;
///     println!("Loaded {} steps", workflow.steps.len());
///     Ok(())
/// }
/// ```
pub fn load_workflow(path: impl AsRef<Path>) -> Result<WorkflowDefinition, Box<dyn Error>> {
    let path = path.as_ref();
    info!("Loading workflow from: {}", path.display());

    let content = fs::read_to_string(path).map_err(|e| {
        format!(
            "Failed to read workflow file '{}': {}. Check that the file exists and is readable.",
            path.display(),
            e
        )
    })?;

    debug!("Workflow content loaded ({} bytes)", content.len());

    let workflow = parse_workflow(&content, is_json(path))?;

    info!(
        "Parsed workflow '{}' with {} steps",
        workflow.id,
        workflow.steps.len()
    );

    validate_workflow(&workflow)?;

    Ok(workflow)
}

/// Saves a workflow to a YAML file.
pub fn save_workflow(
    workflow: &WorkflowDefinition,
    path: impl AsRef<Path>,
) -> Result<(), Box<dyn Error>> {
    let path = path.as_ref();
    let content = if is_json(path) {
        serde_json::to_string_pretty(workflow)?
    } else {
        serde_yaml::to_string(workflow)?
    };
    fs::write(path, content)?;
    info!("Workflow saved to: {}", path.display());
    Ok(())
}
