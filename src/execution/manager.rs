//! Run Manager
//!
//! Admits at most one run per device and keeps the last result of each.
//! Runs execute on their own tokio task; the registry lock is only held
//! for map updates, never across an `.await`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use log::{debug, error, info};
use tokio::task::JoinHandle;

use super::cancel::CancelToken;
use super::engine::Engine;
use super::result::{ExecutionResult, RunStatus};
use super::step::StepResult;
use super::RunError;
use crate::workflow::model::{Step, WorkflowDefinition};

#[derive(Default)]
struct Registry {
    active: HashMap<String, CancelToken>,
    results: HashMap<String, ExecutionResult>,
}

fn lock(registry: &Mutex<Registry>) -> MutexGuard<'_, Registry> {
    registry.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn finish(registry: &Mutex<Registry>, device_id: &str, result: Option<ExecutionResult>) {
    let mut registry = lock(registry);
    registry.active.remove(device_id);
    if let Some(result) = result {
        registry.results.insert(device_id.to_string(), result);
    }
}

/// Holds a device's slot in the registry and frees it on drop.
///
/// A run that unwinds before [`release`](Self::release) is called is
/// recorded as an error so the device can be used again.
struct Slot {
    registry: Arc<Mutex<Registry>>,
    device_id: String,
    run: Option<(String, String, DateTime<Utc>)>,
    released: bool,
}

impl Slot {
    fn claim(
        registry: &Arc<Mutex<Registry>>,
        device_id: &str,
        token: CancelToken,
    ) -> Result<Self, RunError> {
        let mut guard = lock(registry);
        if guard.active.contains_key(device_id) {
            return Err(RunError::AlreadyRunning(device_id.to_string()));
        }
        guard.active.insert(device_id.to_string(), token);
        Ok(Self {
            registry: Arc::clone(registry),
            device_id: device_id.to_string(),
            run: None,
            released: false,
        })
    }

    fn for_workflow(mut self, workflow: &WorkflowDefinition) -> Self {
        self.run = Some((workflow.id.clone(), workflow.name.clone(), Utc::now()));
        self
    }

    fn release(mut self, result: Option<ExecutionResult>) {
        finish(&self.registry, &self.device_id, result);
        self.released = true;
    }
}

impl Drop for Slot {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let result = self.run.take().map(|(workflow_id, workflow_name, started_at)| {
            error!(
                "Run of '{}' on device {} ended abnormally",
                workflow_id, self.device_id
            );
            let finished_at = Utc::now();
            ExecutionResult {
                workflow_id,
                workflow_name,
                status: RunStatus::Error,
                started_at,
                finished_at,
                duration_ms: (finished_at - started_at).num_milliseconds().max(0) as u64,
                steps_executed: 0,
                error: Some("run task panicked or was aborted".to_string()),
                variables: HashMap::new(),
            }
        });
        finish(&self.registry, &self.device_id, result);
    }
}

/// Starts, stops and tracks runs per device.
///
/// Must be used from within a tokio runtime.
#[derive(Clone)]
pub struct RunManager {
    engine: Arc<Engine>,
    registry: Arc<Mutex<Registry>>,
}

impl RunManager {
    pub fn new(engine: Engine) -> Self {
        Self::from_shared(Arc::new(engine))
    }

    pub fn from_shared(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            registry: Arc::new(Mutex::new(Registry::default())),
        }
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    /// Starts `workflow` on `device_id` with its default variables.
    pub fn start(
        &self,
        device_id: &str,
        workflow: WorkflowDefinition,
    ) -> Result<JoinHandle<ExecutionResult>, RunError> {
        self.start_with_variables(device_id, workflow, HashMap::new())
    }

    /// Starts a run and returns immediately.
    ///
    /// Fails with [`RunError::AlreadyRunning`] if the device is busy; the
    /// running workflow is not affected. The handle resolves to the same
    /// result that [`last_result`](Self::last_result) reports afterwards.
    pub fn start_with_variables(
        &self,
        device_id: &str,
        workflow: WorkflowDefinition,
        variables: HashMap<String, String>,
    ) -> Result<JoinHandle<ExecutionResult>, RunError> {
        let token = CancelToken::new();
        let slot = Slot::claim(&self.registry, device_id, token.clone())?.for_workflow(&workflow);

        info!("Admitted workflow '{}' on device {}", workflow.id, device_id);

        let engine = Arc::clone(&self.engine);
        let device_id = device_id.to_string();

        Ok(tokio::spawn(async move {
            let result = engine.execute(&device_id, &workflow, variables, token).await;
            slot.release(Some(result.clone()));
            result
        }))
    }

    /// Requests cancellation of the device's active run.
    ///
    /// Returns false if nothing is running.
    pub fn stop(&self, device_id: &str) -> bool {
        match lock(&self.registry).active.get(device_id) {
            Some(token) => {
                debug!("Cancelling run on device {}", device_id);
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancels every active run.
    pub fn stop_all(&self) -> usize {
        let registry = lock(&self.registry);
        for token in registry.active.values() {
            token.cancel();
        }
        registry.active.len()
    }

    pub fn is_running(&self, device_id: &str) -> bool {
        lock(&self.registry).active.contains_key(device_id)
    }

    /// Result of the most recent finished run on the device.
    pub fn last_result(&self, device_id: &str) -> Option<ExecutionResult> {
        lock(&self.registry).results.get(device_id).cloned()
    }

    /// Executes one step immediately with empty variables.
    ///
    /// The step holds the device slot while it runs: it is rejected with
    /// [`RunError::AlreadyRunning`] if a run is active, and
    /// [`stop`](Self::stop) cancels it.
    pub async fn execute_single_step(
        &self,
        device_id: &str,
        step: &Step,
    ) -> Result<StepResult, RunError> {
        let token = CancelToken::new();
        let slot = Slot::claim(&self.registry, device_id, token.clone())?;
        let result = self
            .engine
            .execute_single_step(device_id, step, token)
            .await;
        slot.release(None);
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::monitoring::{EventSink, ExecutionEvent};
    use crate::test_support::{tap, wait, workflow, MockDevice};
    use crate::workflow::model::StepKind;

    fn manager(device: Arc<MockDevice>) -> RunManager {
        RunManager::new(Engine::new(device))
    }

    fn long_wait() -> WorkflowDefinition {
        workflow(
            "slow",
            vec![
                Step::new("start", StepKind::Start).then("w"),
                wait("w", 30_000),
            ],
        )
    }

    #[tokio::test]
    async fn test_run_records_last_result() {
        let manager = manager(Arc::new(MockDevice::new()));
        let wf = workflow(
            "wf",
            vec![Step::new("start", StepKind::Start).then("a"), tap("a", 1, 1)],
        );

        assert!(manager.last_result("dev").is_none());
        let result = manager.start("dev", wf).unwrap().await.unwrap();
        assert_eq!(result.status, RunStatus::Completed);
        assert!(!manager.is_running("dev"));

        let recorded = manager.last_result("dev").unwrap();
        assert_eq!(recorded.workflow_id, "wf");
        assert_eq!(recorded.steps_executed, 1);
    }

    #[tokio::test]
    async fn test_second_start_is_rejected_and_stop_cancels() {
        let manager = manager(Arc::new(MockDevice::new()));

        let handle = manager.start("dev", long_wait()).unwrap();
        assert!(manager.is_running("dev"));

        let second = manager.start("dev", long_wait());
        assert!(matches!(second, Err(RunError::AlreadyRunning(ref d)) if d == "dev"));
        assert!(manager.is_running("dev"));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(manager.stop("dev"));

        let result = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result.status, RunStatus::Cancelled);
        assert_eq!(manager.last_result("dev").unwrap().status, RunStatus::Cancelled);
        assert!(!manager.is_running("dev"));
        assert!(!manager.stop("dev"));
    }

    #[tokio::test]
    async fn test_devices_run_independently() {
        let manager = manager(Arc::new(MockDevice::new()));
        let slow = manager.start("a", long_wait()).unwrap();
        let fast = manager
            .start(
                "b",
                workflow(
                    "wf",
                    vec![Step::new("start", StepKind::Start).then("t"), tap("t", 1, 1)],
                ),
            )
            .unwrap();

        assert_eq!(fast.await.unwrap().status, RunStatus::Completed);
        assert!(manager.is_running("a"));
        assert_eq!(manager.stop_all(), 1);
        assert_eq!(slow.await.unwrap().status, RunStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_slot_is_free_after_run() {
        let manager = manager(Arc::new(MockDevice::new()));
        let wf = workflow("wf", vec![Step::new("start", StepKind::Start)]);
        manager.start("dev", wf.clone()).unwrap().await.unwrap();
        assert!(manager.start("dev", wf).is_ok());
    }

    #[tokio::test]
    async fn test_execute_single_step() {
        let device = Arc::new(MockDevice::new());
        let manager = manager(device.clone());
        let result = manager
            .execute_single_step("dev", &tap("t", 4, 2))
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(device.calls(), vec!["tap dev 4,2"]);
        assert!(!manager.is_running("dev"));
        assert!(manager.last_result("dev").is_none());
    }

    #[tokio::test]
    async fn test_single_step_rejected_while_running() {
        let device = Arc::new(MockDevice::new());
        let manager = manager(device.clone());
        let handle = manager.start("dev", long_wait()).unwrap();

        let busy = manager.execute_single_step("dev", &tap("t", 4, 2)).await;
        assert!(matches!(busy, Err(RunError::AlreadyRunning(ref d)) if d == "dev"));
        assert!(device.calls().is_empty());

        let other = manager.execute_single_step("other", &tap("t", 4, 2)).await;
        assert!(other.unwrap().success);

        manager.stop("dev");
        handle.await.unwrap();
    }

    struct PanicOnStepEnd;

    impl EventSink for PanicOnStepEnd {
        fn emit(&self, event: ExecutionEvent) {
            if matches!(event, ExecutionEvent::StepEnded { .. }) {
                panic!("sink failure");
            }
        }
    }

    #[tokio::test]
    async fn test_panicking_run_frees_the_device() {
        let device = Arc::new(MockDevice::new());
        let manager = RunManager::new(Engine::new(device).with_events(Arc::new(PanicOnStepEnd)));
        let wf = workflow(
            "wf",
            vec![Step::new("start", StepKind::Start).then("a"), tap("a", 1, 1)],
        );

        let joined = manager.start("dev", wf.clone()).unwrap().await;
        assert!(joined.is_err());
        assert!(!manager.is_running("dev"));
        assert!(!manager.stop("dev"));

        let recorded = manager.last_result("dev").unwrap();
        assert_eq!(recorded.workflow_id, "wf");
        assert_eq!(recorded.status, RunStatus::Error);
        assert!(recorded.error.unwrap().contains("panicked"));

        assert!(manager.start("dev", wf).is_ok());
    }
}
