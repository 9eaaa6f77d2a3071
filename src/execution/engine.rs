//! Workflow Execution Engine
//!
//! The graph walker that drives a workflow against a device:
//! - Locates the unique start step and follows connections from there
//! - Repeats looped steps, applying pre-wait and post-delay around each
//!   iteration
//! - Routes every outcome through [`resolve_next`]
//! - Recurses into sub-workflows, sharing the step budget and the
//!   cancellation token with the caller
//!
//! The engine owns no per-run state; everything a run mutates lives in a
//! [`RunContext`] and a [`VariableStore`], so one engine serves any number
//! of devices at once.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use log::{debug, error, info, warn};

use super::cancel::CancelToken;
use super::result::{ExecutionResult, RunStatus};
use super::routing::resolve_next;
use super::step::StepResult;
use super::{RunError, StepError, VariableStore};
use crate::config::{EngineConfig, VariableScope};
use crate::device::{DeviceActions, ScriptPlayer, SnapshotProvider};
use crate::monitoring::{EventSink, ExecutionEvent, NullEventSink};
use crate::workflow::model::{OnError, Step, WorkflowDefinition};
use crate::workflow::store::WorkflowStore;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Mutable state of one top-level run, shared with its sub-workflows.
#[derive(Debug)]
pub(crate) struct RunContext {
    pub device_id: String,
    pub token: CancelToken,
    pub steps_executed: usize,
}

impl RunContext {
    pub fn new(device_id: impl Into<String>, token: CancelToken) -> Self {
        Self {
            device_id: device_id.into(),
            token,
            steps_executed: 0,
        }
    }
}

/// Workflow execution engine.
///
/// Only the device is required; the other collaborators are optional and
/// steps that need a missing one fail with a configuration error.
///
/// # Example
///
/// ```rust,no_run
/// use std::collections::HashMap;
/// use std::sync::Arc;
///
/// use tapflow::device::DryRunDevice;
/// use tapflow::execution::{CancelToken, Engine};
/// use tapflow::workflow::load_workflow;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let workflow = load_workflow("login.yaml")?;
///     let engine = Engine::new(Arc::new(DryRunDevice::new()));
///
///     let result = engine
///         .execute("emulator-5554", &workflow, HashMap::new(), CancelToken::new())
///         .await;
///     println!("{}", result.status);
///     Ok(())
/// }
/// ```
pub struct Engine {
    device: Arc<dyn DeviceActions>,
    snapshots: Option<Arc<dyn SnapshotProvider>>,
    store: Option<Arc<dyn WorkflowStore>>,
    scripts: Option<Arc<dyn ScriptPlayer>>,
    events: Arc<dyn EventSink>,
    config: EngineConfig,
}

impl Engine {
    /// Creates an engine with default configuration and no event sink.
    pub fn new(device: Arc<dyn DeviceActions>) -> Self {
        Self {
            device,
            snapshots: None,
            store: None,
            scripts: None,
            events: Arc::new(NullEventSink),
            config: EngineConfig::default(),
        }
    }

    pub fn with_snapshots(mut self, snapshots: Arc<dyn SnapshotProvider>) -> Self {
        self.snapshots = Some(snapshots);
        self
    }

    /// Sets the store that `sub_workflow` steps load from.
    pub fn with_store(mut self, store: Arc<dyn WorkflowStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_scripts(mut self, scripts: Arc<dyn ScriptPlayer>) -> Self {
        self.scripts = Some(scripts);
        self
    }

    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub(crate) fn device(&self) -> &dyn DeviceActions {
        self.device.as_ref()
    }

    pub(crate) fn snapshots(&self) -> Option<&dyn SnapshotProvider> {
        self.snapshots.as_deref()
    }

    pub(crate) fn scripts(&self) -> Option<&dyn ScriptPlayer> {
        self.scripts.as_deref()
    }

    /// Runs a workflow to completion on `device_id`.
    ///
    /// `variables` override the workflow's defaults. The run never returns
    /// an `Err`; failures are reported in the result's status and message.
    pub async fn execute(
        &self,
        device_id: &str,
        workflow: &WorkflowDefinition,
        variables: HashMap<String, String>,
        token: CancelToken,
    ) -> ExecutionResult {
        let started_at = Utc::now();
        let clock = Instant::now();

        info!(
            "[{}] Starting workflow '{}' ({} steps)",
            device_id,
            workflow.name,
            workflow.steps.len()
        );
        self.events.emit(ExecutionEvent::RunStarted {
            device_id: device_id.to_string(),
            workflow_id: workflow.id.clone(),
            workflow_name: workflow.name.clone(),
            timestamp: started_at,
        });

        let mut ctx = RunContext::new(device_id, token);
        let mut vars = VariableStore::from_map(variables);
        let outcome = self.walk(workflow, &mut vars, &mut ctx, 0).await;
        let duration_ms = clock.elapsed().as_millis() as u64;

        let (status, message) = match outcome {
            Ok(()) => (RunStatus::Completed, None),
            Err(RunError::Cancelled) => (RunStatus::Cancelled, None),
            Err(e) => (RunStatus::Error, Some(e.to_string())),
        };

        match &message {
            Some(message) => {
                error!("[{}] Workflow '{}' failed: {}", device_id, workflow.name, message);
                self.events.emit(ExecutionEvent::RunFailed {
                    device_id: device_id.to_string(),
                    workflow_id: workflow.id.clone(),
                    error: message.clone(),
                    steps_executed: ctx.steps_executed,
                    duration_ms,
                });
            }
            None => {
                info!(
                    "[{}] Workflow '{}' {} after {} steps ({} ms)",
                    device_id, workflow.name, status, ctx.steps_executed, duration_ms
                );
                self.events.emit(ExecutionEvent::RunCompleted {
                    device_id: device_id.to_string(),
                    workflow_id: workflow.id.clone(),
                    status,
                    steps_executed: ctx.steps_executed,
                    duration_ms,
                });
            }
        }

        ExecutionResult {
            workflow_id: workflow.id.clone(),
            workflow_name: workflow.name.clone(),
            status,
            started_at,
            finished_at: Utc::now(),
            duration_ms,
            steps_executed: ctx.steps_executed,
            error: message,
            variables: vars.as_map().clone(),
        }
    }

    /// Executes a single step outside any workflow, with empty variables.
    pub async fn execute_single_step(
        &self,
        device_id: &str,
        step: &Step,
        token: CancelToken,
    ) -> StepResult {
        let mut ctx = RunContext::new(device_id, token);
        let mut vars = VariableStore::new();
        self.execute_step(step, &mut vars, &mut ctx, 0).await
    }

    /// Walks one workflow graph. Re-entered for every sub-workflow.
    fn walk<'a>(
        &'a self,
        workflow: &'a WorkflowDefinition,
        vars: &'a mut VariableStore,
        ctx: &'a mut RunContext,
        depth: usize,
    ) -> BoxFuture<'a, Result<(), RunError>> {
        Box::pin(async move {
            vars.seed_defaults(&workflow.variables);

            let index = workflow.index();
            let starts = workflow.start_steps();
            let start = match starts.as_slice() {
                [start] => *start,
                [] => return Err(RunError::NoStartStep(workflow.id.clone())),
                many => {
                    return Err(RunError::MultipleStartSteps {
                        workflow_id: workflow.id.clone(),
                        count: many.len(),
                    })
                }
            };

            let mut current = start
                .connections
                .success_step_id
                .as_deref()
                .filter(|id| !id.is_empty());

            while let Some(step_id) = current {
                if ctx.token.is_cancelled() {
                    return Err(RunError::Cancelled);
                }
                if ctx.steps_executed >= self.config.max_steps {
                    return Err(RunError::StepBudgetExceeded(self.config.max_steps));
                }

                let step = index
                    .get(step_id)
                    .copied()
                    .ok_or_else(|| RunError::CorruptGraph {
                        workflow_id: workflow.id.clone(),
                        step_id: step_id.to_string(),
                    })?;
                ctx.steps_executed += 1;

                let result = self.run_iterations(workflow, step, vars, ctx, depth).await?;
                current = resolve_next(step, &result);

                if current.is_none() && step.on_error == OnError::Stop {
                    if let Some(source) = result.error {
                        return Err(RunError::StepFailed {
                            step_id: step.id.clone(),
                            source,
                        });
                    }
                }
            }

            debug!("Workflow '{}' reached the end of its graph", workflow.id);
            Ok(())
        })
    }

    /// Runs every iteration of a step and returns the last result.
    async fn run_iterations(
        &self,
        workflow: &WorkflowDefinition,
        step: &Step,
        vars: &mut VariableStore,
        ctx: &mut RunContext,
        depth: usize,
    ) -> Result<StepResult, RunError> {
        let mut result = StepResult::ok();

        for iteration in 1..=step.effective_loop_count() {
            ctx.token
                .sleep_ms(step.pre_wait_ms)
                .await
                .map_err(|_| RunError::Cancelled)?;

            self.events.emit(ExecutionEvent::StepStarted {
                device_id: ctx.device_id.clone(),
                workflow_id: workflow.id.clone(),
                step_id: step.id.clone(),
                step_type: step.type_name().to_string(),
                iteration,
            });
            debug!("Running step '{}' ({}) iteration {}", step.id, step.type_name(), iteration);

            let clock = Instant::now();
            result = self.execute_step(step, vars, ctx, depth).await;

            self.events.emit(ExecutionEvent::StepEnded {
                device_id: ctx.device_id.clone(),
                workflow_id: workflow.id.clone(),
                step_id: step.id.clone(),
                step_type: step.type_name().to_string(),
                iteration,
                success: !result.is_failure(),
                duration_ms: clock.elapsed().as_millis() as u64,
                error: result.error_message(),
            });

            match &result.error {
                Some(StepError::Cancelled) => return Err(RunError::Cancelled),
                Some(StepError::Aborted(inner)) => return Err(inner.as_ref().clone()),
                Some(e) if e.is_fatal() => {
                    return Err(RunError::StepFailed {
                        step_id: step.id.clone(),
                        source: e.clone(),
                    })
                }
                Some(e) => warn!("Step '{}' failed on iteration {}: {}", step.id, iteration, e),
                None => {}
            }

            ctx.token
                .sleep_ms(step.post_delay_ms)
                .await
                .map_err(|_| RunError::Cancelled)?;

            if result.is_failure() && step.on_error == OnError::Stop {
                break;
            }
        }

        Ok(result)
    }

    /// Runs a stored workflow as part of the current run.
    ///
    /// `depth` is the depth the child will run at; the check happens before
    /// anything is loaded.
    pub(crate) async fn invoke_sub_workflow(
        &self,
        workflow_id: &str,
        vars: &mut VariableStore,
        ctx: &mut RunContext,
        depth: usize,
    ) -> Result<(), StepError> {
        if depth > self.config.max_nesting_depth {
            return Err(StepError::NestingDepthExceeded(self.config.max_nesting_depth));
        }

        let store = self
            .store
            .as_ref()
            .ok_or(StepError::Unavailable("workflow store"))?;
        let child = store
            .load(workflow_id)
            .await
            .map_err(|e| StepError::Store(e.to_string()))?
            .ok_or_else(|| StepError::WorkflowNotFound(workflow_id.to_string()))?;

        info!("Entering sub-workflow '{}' at depth {}", child.id, depth);
        let outcome = match self.config.sub_workflow_scope {
            VariableScope::Shared => self.walk(&child, vars, ctx, depth).await,
            VariableScope::Isolated => {
                let mut scoped = vars.clone();
                self.walk(&child, &mut scoped, ctx, depth).await
            }
        };

        match outcome {
            Ok(()) => {
                debug!("Sub-workflow '{}' finished", child.id);
                Ok(())
            }
            Err(RunError::Cancelled) => Err(StepError::Cancelled),
            Err(e) if e.is_fatal() => Err(StepError::Aborted(Box::new(e))),
            Err(e) => Err(StepError::SubWorkflowFailed {
                workflow_id: workflow_id.to_string(),
                message: e.to_string(),
            }),
        }
    }
}
