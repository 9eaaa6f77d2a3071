//! Workflow Store
//!
//! Where `sub_workflow` steps look up the workflows they call.
//!
//! [`FileWorkflowStore`] keeps one `<id>.yaml` file per workflow in a
//! directory (`<id>.yml` and `<id>.json` are also read).
//! [`MemoryWorkflowStore`] keeps them in a map.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use log::{debug, info};
use thiserror::Error;

use super::model::WorkflowDefinition;
use super::parser::{is_json, parse_workflow};
use super::validator::{validate_workflow, ValidationError};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse workflow '{id}': {message}")]
    Parse { id: String, message: String },

    #[error("failed to serialize workflow: {0}")]
    Serialize(#[from] serde_yaml::Error),

    #[error("invalid workflow: {0}")]
    Invalid(#[from] ValidationError),
}

/// Persistence for workflow definitions.
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    /// Loads a workflow; `Ok(None)` if no workflow has that id.
    async fn load(&self, id: &str) -> Result<Option<WorkflowDefinition>, StoreError>;

    /// Ids of every stored workflow, sorted.
    async fn list(&self) -> Result<Vec<String>, StoreError>;

    /// Validates and stores a workflow, stamping its timestamps.
    async fn save(&self, workflow: WorkflowDefinition) -> Result<WorkflowDefinition, StoreError>;

    /// Removes a workflow. Returns false if it did not exist.
    async fn delete(&self, id: &str) -> Result<bool, StoreError>;
}

/// Validates a definition and sets `created_at` (first save only) and
/// `updated_at`.
fn stamp(mut workflow: WorkflowDefinition) -> Result<WorkflowDefinition, StoreError> {
    validate_workflow(&workflow)?;
    let now = Utc::now();
    workflow.created_at.get_or_insert(now);
    workflow.updated_at = Some(now);
    Ok(workflow)
}

/// Directory of workflow files.
#[derive(Debug, Clone)]
pub struct FileWorkflowStore {
    root: PathBuf,
}

/// Recognized extensions, in lookup priority order. Matched ignoring case.
const EXTENSIONS: &[&str] = &["yaml", "yml", "json"];

/// Priority of a workflow file's extension, or `None` if it is not one.
fn extension_rank(path: &Path) -> Option<usize> {
    let ext = path.extension()?.to_str()?;
    EXTENSIONS.iter().position(|known| known.eq_ignore_ascii_case(ext))
}

fn file_id(path: &Path) -> Option<&str> {
    extension_rank(path)?;
    path.file_stem()?.to_str()
}

impl FileWorkflowStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn io_error(path: &Path, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: path.display().to_string(),
            source,
        }
    }

    /// Every workflow file in the directory, ordered by id then extension
    /// priority. A missing directory holds no files.
    async fn files(&self) -> Result<Vec<PathBuf>, StoreError> {
        let mut files = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(files),
            Err(e) => return Err(Self::io_error(&self.root, e)),
        };

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Self::io_error(&self.root, e))?
        {
            let path = entry.path();
            if file_id(&path).is_some() {
                files.push(path);
            }
        }

        files.sort_by(|a, b| (file_id(a), extension_rank(a)).cmp(&(file_id(b), extension_rank(b))));
        Ok(files)
    }

    /// Files stored under `id`, highest priority first.
    async fn files_for(&self, id: &str) -> Result<Vec<PathBuf>, StoreError> {
        let mut files = self.files().await?;
        files.retain(|path| file_id(path) == Some(id));
        Ok(files)
    }
}

#[async_trait]
impl WorkflowStore for FileWorkflowStore {
    async fn load(&self, id: &str) -> Result<Option<WorkflowDefinition>, StoreError> {
        let Some(path) = self.files_for(id).await?.into_iter().next() else {
            debug!("No workflow file for '{}' in {}", id, self.root.display());
            return Ok(None);
        };

        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| Self::io_error(&path, e))?;
        let workflow = parse_workflow(&content, is_json(&path)).map_err(|e| StoreError::Parse {
            id: id.to_string(),
            message: e.to_string(),
        })?;

        debug!("Loaded workflow '{}' from {}", id, path.display());
        Ok(Some(workflow))
    }

    async fn list(&self) -> Result<Vec<String>, StoreError> {
        let mut ids: Vec<String> = self
            .files()
            .await?
            .iter()
            .filter_map(|path| file_id(path).map(str::to_string))
            .collect();
        ids.dedup();
        Ok(ids)
    }

    async fn save(&self, workflow: WorkflowDefinition) -> Result<WorkflowDefinition, StoreError> {
        let mut workflow = workflow;
        if let Some(existing) = self.load(&workflow.id).await? {
            workflow.created_at = workflow.created_at.or(existing.created_at);
        }
        let workflow = stamp(workflow)?;

        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| Self::io_error(&self.root, e))?;
        let path = self.root.join(format!("{}.yaml", workflow.id));
        let content = serde_yaml::to_string(&workflow)?;
        tokio::fs::write(&path, content)
            .await
            .map_err(|e| Self::io_error(&path, e))?;

        info!("Workflow '{}' saved to {}", workflow.id, path.display());
        Ok(workflow)
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let files = self.files_for(id).await?;
        for path in &files {
            tokio::fs::remove_file(path)
                .await
                .map_err(|e| Self::io_error(path, e))?;
        }
        Ok(!files.is_empty())
    }
}

/// In-memory store.
#[derive(Debug, Default)]
pub struct MemoryWorkflowStore {
    workflows: Mutex<HashMap<String, WorkflowDefinition>>,
}

impl MemoryWorkflowStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, WorkflowDefinition>> {
        self.workflows
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Inserts a workflow as-is, without validation or timestamps.
    pub fn insert(&self, workflow: WorkflowDefinition) {
        self.lock().insert(workflow.id.clone(), workflow);
    }
}

#[async_trait]
impl WorkflowStore for MemoryWorkflowStore {
    async fn load(&self, id: &str) -> Result<Option<WorkflowDefinition>, StoreError> {
        Ok(self.lock().get(id).cloned())
    }

    async fn list(&self) -> Result<Vec<String>, StoreError> {
        let mut ids: Vec<String> = self.lock().keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    async fn save(&self, workflow: WorkflowDefinition) -> Result<WorkflowDefinition, StoreError> {
        let mut workflow = workflow;
        if let Some(existing) = self.lock().get(&workflow.id) {
            workflow.created_at = workflow.created_at.or(existing.created_at);
        }
        let workflow = stamp(workflow)?;
        self.insert(workflow.clone());
        Ok(workflow)
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.lock().remove(id).is_some())
    }
}
