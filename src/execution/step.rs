//! Individual Step Execution
//!
//! Dispatches a single step iteration to its handler. Every handler:
//! - Checks its required parameters before touching the device
//! - Substitutes `{{name}}` placeholders into string parameters
//! - Reports the outcome as a [`StepResult`] rather than an early return
//!
//! Coordinates and numeric parameters are used as written.

use std::time::{Duration, Instant};

use log::debug;

use super::branch::{evaluate_condition, BranchParams};
use super::engine::{Engine, RunContext};
use super::expression::try_evaluate;
use super::{StepError, VariableStore};
use crate::device::{DeviceError, ElementAction, UiElement};
use crate::workflow::model::{ElementActionKind, ReadAttribute, Selector, Step, StepKind};

/// Outcome of one step iteration.
///
/// For branch steps `success` is the condition value and `is_condition`
/// is set; `error` is only present when the step itself failed.
#[derive(Debug, Clone, Default)]
pub struct StepResult {
    pub success: bool,
    pub is_condition: bool,
    pub error: Option<StepError>,
    /// Captured output of `shell` steps
    pub output: Option<String>,
}

impl StepResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            ..Self::default()
        }
    }

    pub fn with_output(output: impl Into<String>) -> Self {
        Self {
            output: Some(output.into()),
            ..Self::ok()
        }
    }

    pub fn condition(value: bool) -> Self {
        Self {
            success: value,
            is_condition: true,
            ..Self::default()
        }
    }

    pub fn failed(error: StepError) -> Self {
        Self {
            error: Some(error),
            ..Self::default()
        }
    }

    /// True when the step reported an error. A false branch condition is
    /// not a failure.
    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }

    pub fn error_message(&self) -> Option<String> {
        self.error.as_ref().map(|e| e.to_string())
    }
}

/// Builds a missing-parameters error from `(name, present)` pairs.
fn missing_params(step_type: &'static str, params: &[(&str, bool)]) -> StepError {
    let missing: Vec<&str> = params
        .iter()
        .filter(|(_, present)| !present)
        .map(|(name, _)| *name)
        .collect();
    StepError::missing(step_type, &missing)
}

fn read_attribute(element: UiElement, attribute: ReadAttribute) -> String {
    match attribute {
        ReadAttribute::Text => element.text,
        ReadAttribute::ResourceId => element.resource_id,
        ReadAttribute::ContentDesc => element.content_desc,
        ReadAttribute::ClassName => element.class_name,
        ReadAttribute::Bounds => element.bounds,
    }
}

impl Engine {
    /// Executes one iteration of `step`.
    ///
    /// `depth` is the nesting depth of the workflow that owns the step.
    pub(crate) async fn execute_step(
        &self,
        step: &Step,
        vars: &mut VariableStore,
        ctx: &mut RunContext,
        depth: usize,
    ) -> StepResult {
        match self.dispatch(step, vars, ctx, depth).await {
            Ok(result) => result,
            Err(error) => StepResult::failed(error),
        }
    }

    fn element_timeout(&self, step: &Step) -> Duration {
        let millis = step
            .timeout_ms
            .filter(|ms| *ms > 0)
            .unwrap_or(self.config().default_element_timeout_ms);
        Duration::from_millis(millis)
    }

    async fn dispatch(
        &self,
        step: &Step,
        vars: &mut VariableStore,
        ctx: &mut RunContext,
        depth: usize,
    ) -> Result<StepResult, StepError> {
        let serial = ctx.device_id.clone();
        let step_type = step.type_name();

        match &step.kind {
            StepKind::Start => Ok(StepResult::ok()),

            StepKind::Tap { x, y } => {
                let (Some(x), Some(y)) = (*x, *y) else {
                    return Err(missing_params(
                        "tap",
                        &[("x", x.is_some()), ("y", y.is_some())],
                    ));
                };
                self.device().tap(&serial, x, y).await?;
                Ok(StepResult::ok())
            }

            StepKind::Swipe {
                x1,
                y1,
                x2,
                y2,
                duration_ms,
            } => {
                let (Some(x1), Some(y1), Some(x2), Some(y2)) = (*x1, *y1, *x2, *y2) else {
                    return Err(missing_params(
                        "swipe",
                        &[
                            ("x1", x1.is_some()),
                            ("y1", y1.is_some()),
                            ("x2", x2.is_some()),
                            ("y2", y2.is_some()),
                        ],
                    ));
                };
                let duration = duration_ms.unwrap_or(self.config().default_swipe_duration_ms);
                self.device()
                    .swipe(&serial, (x1, y1), (x2, y2), Duration::from_millis(duration))
                    .await?;
                Ok(StepResult::ok())
            }

            StepKind::Element {
                action,
                selector,
                text,
                direction,
            } => {
                let (Some(action), Some(selector)) = (action, selector) else {
                    return Err(missing_params(
                        "element",
                        &[("action", action.is_some()), ("selector", selector.is_some())],
                    ));
                };
                let action = match action {
                    ElementActionKind::Click => ElementAction::Click,
                    ElementActionKind::LongClick => ElementAction::LongClick,
                    ElementActionKind::InputText => {
                        let text = text
                            .as_deref()
                            .ok_or_else(|| StepError::missing("element", &["text"]))?;
                        ElementAction::InputText(vars.substitute(text))
                    }
                    ElementActionKind::Swipe => ElementAction::Swipe(
                        direction.ok_or_else(|| StepError::missing("element", &["direction"]))?,
                    ),
                    ElementActionKind::WaitAppear => ElementAction::WaitAppear,
                    ElementActionKind::WaitDisappear => ElementAction::WaitDisappear,
                };
                let selector = Selector::new(selector.by, vars.substitute(&selector.value));
                let timeout = self.element_timeout(step);

                debug!("{} on {} (timeout {:?})", action.name(), selector, timeout);
                self.device()
                    .element(&serial, &selector, &action, timeout)
                    .await?;
                Ok(StepResult::ok())
            }

            StepKind::App { action, package } => {
                let (Some(action), Some(package)) = (action, package) else {
                    return Err(missing_params(
                        "app",
                        &[("action", action.is_some()), ("package", package.is_some())],
                    ));
                };
                let package = vars.substitute(package);
                self.device().app(&serial, *action, &package).await?;
                Ok(StepResult::ok())
            }

            StepKind::Branch {
                condition,
                selector,
                variable_name,
                expected_value,
            } => {
                let params = BranchParams {
                    condition: condition.as_deref(),
                    selector: selector.as_ref(),
                    variable_name: variable_name.as_deref(),
                    expected_value: expected_value.as_deref(),
                };
                let value = evaluate_condition(params, vars, self.snapshots(), &serial).await?;
                Ok(StepResult::condition(value))
            }

            StepKind::Wait { duration_ms } => {
                let duration =
                    duration_ms.ok_or_else(|| StepError::missing("wait", &["duration_ms"]))?;
                ctx.token
                    .sleep_ms(duration)
                    .await
                    .map_err(|_| StepError::Cancelled)?;
                Ok(StepResult::ok())
            }

            StepKind::Script { name } => {
                let name = name
                    .as_deref()
                    .ok_or_else(|| StepError::missing("script", &["name"]))?;
                let player = self.scripts().ok_or(StepError::Unavailable("script player"))?;
                player.play(&serial, &vars.substitute(name)).await?;
                Ok(StepResult::ok())
            }

            StepKind::SetVariable { name, value } => {
                let name = name
                    .as_deref()
                    .ok_or_else(|| StepError::missing("set_variable", &["name"]))?;
                let text = vars.substitute(value.as_deref().unwrap_or_default());
                let value = try_evaluate(&text).unwrap_or(text);
                debug!("Set variable {} = {}", name, value);
                vars.set(name, value);
                Ok(StepResult::ok())
            }

            StepKind::ReadToVariable {
                name,
                selector,
                attribute,
            } => {
                let (Some(name), Some(selector)) = (name, selector) else {
                    return Err(missing_params(
                        "read_to_variable",
                        &[("name", name.is_some()), ("selector", selector.is_some())],
                    ));
                };
                let snapshots = self
                    .snapshots()
                    .ok_or(StepError::Unavailable("snapshot provider"))?;
                let selector = Selector::new(selector.by, vars.substitute(&selector.value));
                let deadline = step
                    .timeout_ms
                    .filter(|ms| *ms > 0)
                    .map(|ms| Instant::now() + Duration::from_millis(ms));

                let element = loop {
                    let found = snapshots.snapshot(&serial).await?.lookup(&selector);
                    if let Some(element) = found {
                        break element;
                    }
                    match deadline {
                        Some(deadline) if Instant::now() < deadline => {
                            ctx.token
                                .sleep_ms(self.config().poll_interval_ms)
                                .await
                                .map_err(|_| StepError::Cancelled)?;
                        }
                        _ => return Err(DeviceError::ElementNotFound(selector.to_string()).into()),
                    }
                };

                let value = read_attribute(element, *attribute);
                debug!("Read {:?} of {} into {}: '{}'", attribute, selector, name, value);
                vars.set(name.as_str(), value);
                Ok(StepResult::ok())
            }

            StepKind::Shell { command, save_to } => {
                let command = command
                    .as_deref()
                    .ok_or_else(|| StepError::missing("shell", &["command"]))?;
                let output = self
                    .device()
                    .shell(&serial, &vars.substitute(command))
                    .await?;
                if let Some(target) = save_to.as_deref().filter(|t| !t.is_empty()) {
                    vars.set(target, output.trim());
                }
                Ok(StepResult::with_output(output))
            }

            StepKind::SubWorkflow { workflow_id } => {
                let workflow_id = workflow_id
                    .as_deref()
                    .filter(|id| !id.is_empty())
                    .ok_or_else(|| StepError::missing("sub_workflow", &["workflow_id"]))?;
                let workflow_id = vars.substitute(workflow_id);
                self.invoke_sub_workflow(&workflow_id, vars, ctx, depth + 1)
                    .await?;
                Ok(StepResult::ok())
            }

            StepKind::KeyEvent { key_code } => {
                let key_code =
                    key_code.ok_or_else(|| StepError::missing("key_event", &["key_code"]))?;
                self.device().key_event(&serial, key_code).await?;
                Ok(StepResult::ok())
            }

            StepKind::Unsupported => {
                debug!("Refusing to dispatch {} step '{}'", step_type, step.id);
                Err(StepError::UnsupportedStep)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::device::{StaticSnapshotProvider, UiNode, UiTree};
    use crate::execution::CancelToken;
    use crate::test_support::{MockDevice, MockScripts};
    use crate::workflow::model::{AppActionKind, SelectorKind, SwipeDirection};

    fn engine(device: &Arc<MockDevice>) -> Engine {
        Engine::new(device.clone())
    }

    async fn run(engine: &Engine, step: Step, vars: &mut VariableStore) -> StepResult {
        let mut ctx = RunContext::new("emulator-5554", CancelToken::new());
        engine.execute_step(&step, vars, &mut ctx, 0).await
    }

    fn tree() -> UiTree {
        UiTree::new(vec![UiNode::new("FrameLayout").with_child(
            UiNode::new("TextView")
                .with_text("Balance: 42")
                .with_resource_id("app:id/balance"),
        )])
    }

    #[tokio::test]
    async fn test_tap_substitution_free() {
        let device = Arc::new(MockDevice::new());
        let step = Step::new("t", StepKind::Tap { x: Some(10), y: Some(20) });
        let result = run(&engine(&device), step, &mut VariableStore::new()).await;
        assert!(result.success);
        assert_eq!(device.calls(), vec!["tap emulator-5554 10,20"]);
    }

    #[tokio::test]
    async fn test_tap_missing_parameters() {
        let device = Arc::new(MockDevice::new());
        let step = Step::new("t", StepKind::Tap { x: Some(10), y: None });
        let result = run(&engine(&device), step, &mut VariableStore::new()).await;
        assert!(!result.success);
        assert_eq!(
            result.error_message().as_deref(),
            Some("tap step is missing parameters: y")
        );
        assert!(result.error.map(|e| e.is_fatal()).unwrap_or(false));
        assert!(device.calls().is_empty());
    }

    #[tokio::test]
    async fn test_swipe_uses_default_duration() {
        let device = Arc::new(MockDevice::new());
        let step = Step::new(
            "s",
            StepKind::Swipe {
                x1: Some(1),
                y1: Some(2),
                x2: Some(3),
                y2: Some(4),
                duration_ms: None,
            },
        );
        run(&engine(&device), step, &mut VariableStore::new()).await;
        assert_eq!(device.calls(), vec!["swipe emulator-5554 1,2->3,4 300ms"]);
    }

    #[tokio::test]
    async fn test_element_substitutes_selector_and_text() {
        let device = Arc::new(MockDevice::new());
        let mut vars = VariableStore::new();
        vars.set("field", "user");
        vars.set("name", "alice");

        let step = Step::new(
            "e",
            StepKind::Element {
                action: Some(ElementActionKind::InputText),
                selector: Some(Selector::new(SelectorKind::ResourceId, "app:id/{{field}}")),
                text: Some("{{name}}".into()),
                direction: None,
            },
        );
        let result = run(&engine(&device), step, &mut vars).await;
        assert!(result.success);
        assert_eq!(
            device.calls(),
            vec!["element emulator-5554 input_text resource_id=app:id/user 5000ms text=alice"]
        );
    }

    #[tokio::test]
    async fn test_element_step_timeout_and_swipe_direction() {
        let device = Arc::new(MockDevice::new());
        let step = Step::new(
            "e",
            StepKind::Element {
                action: Some(ElementActionKind::Swipe),
                selector: Some(Selector::new(SelectorKind::Text, "List")),
                text: None,
                direction: Some(SwipeDirection::Up),
            },
        )
        .with_timeout(1200);
        run(&engine(&device), step, &mut VariableStore::new()).await;
        assert_eq!(device.calls(), vec!["element emulator-5554 swipe text=List 1200ms"]);

        let missing = Step::new(
            "e",
            StepKind::Element {
                action: Some(ElementActionKind::Swipe),
                selector: Some(Selector::new(SelectorKind::Text, "List")),
                text: None,
                direction: None,
            },
        );
        let result = run(&engine(&device), missing, &mut VariableStore::new()).await;
        assert!(matches!(result.error, Some(StepError::MissingParameters { .. })));
    }

    #[tokio::test]
    async fn test_app_launch() {
        let device = Arc::new(MockDevice::new());
        let mut vars = VariableStore::new();
        vars.set("pkg", "com.example");
        let step = Step::new(
            "a",
            StepKind::App {
                action: Some(AppActionKind::Launch),
                package: Some("{{pkg}}.app".into()),
            },
        );
        run(&engine(&device), step, &mut vars).await;
        assert_eq!(device.calls(), vec!["app emulator-5554 Launch com.example.app"]);
    }

    #[tokio::test]
    async fn test_device_failure_is_recoverable() {
        let device = Arc::new(MockDevice::new().fail_taps());
        let step = Step::new("t", StepKind::Tap { x: Some(1), y: Some(1) });
        let result = run(&engine(&device), step, &mut VariableStore::new()).await;
        assert!(result.is_failure());
        assert!(!result.error.map(|e| e.is_fatal()).unwrap_or(true));
    }

    #[tokio::test]
    async fn test_set_variable_arithmetic() {
        let device = Arc::new(MockDevice::new());
        let engine = engine(&device);
        let mut vars = VariableStore::new();
        vars.set("a", "2");
        vars.set("b", "3");

        let step = |value: &str| {
            Step::new(
                "v",
                StepKind::SetVariable {
                    name: Some("sum".into()),
                    value: Some(value.into()),
                },
            )
        };

        run(&engine, step("{{a}} + {{b}}"), &mut vars).await;
        assert_eq!(vars.get("sum"), Some("5"));

        vars.set("a", "2.5");
        vars.set("b", "0.5");
        run(&engine, step("{{a}} + {{b}}"), &mut vars).await;
        assert_eq!(vars.get("sum"), Some("3"));

        vars.set("a", "2");
        let result = run(&engine, step("{{a}} / 0"), &mut vars).await;
        assert!(result.success);
        assert_eq!(vars.get("sum"), Some("2 / 0"));

        run(&engine, step("hello {{a}}"), &mut vars).await;
        assert_eq!(vars.get("sum"), Some("hello 2"));
    }

    #[tokio::test]
    async fn test_read_to_variable() {
        let device = Arc::new(MockDevice::new());
        let engine = engine(&device).with_snapshots(Arc::new(StaticSnapshotProvider::new(tree())));
        let mut vars = VariableStore::new();

        let step = Step::new(
            "r",
            StepKind::ReadToVariable {
                name: Some("balance".into()),
                selector: Some(Selector::new(SelectorKind::ResourceId, "app:id/balance")),
                attribute: ReadAttribute::Text,
            },
        );
        assert!(run(&engine, step, &mut vars).await.success);
        assert_eq!(vars.get("balance"), Some("Balance: 42"));
    }

    #[tokio::test]
    async fn test_read_to_variable_polls_until_timeout() {
        let device = Arc::new(MockDevice::new());
        let engine = engine(&device)
            .with_snapshots(Arc::new(StaticSnapshotProvider::new(tree())))
            .with_config(crate::config::EngineConfig {
                poll_interval_ms: 10,
                ..Default::default()
            });

        let step = Step::new(
            "r",
            StepKind::ReadToVariable {
                name: Some("x".into()),
                selector: Some(Selector::new(SelectorKind::Text, "Missing")),
                attribute: ReadAttribute::Text,
            },
        )
        .with_timeout(50);

        let started = Instant::now();
        let result = run(&engine, step, &mut VariableStore::new()).await;
        assert!(started.elapsed() >= Duration::from_millis(50));
        assert!(matches!(
            result.error,
            Some(StepError::Device(DeviceError::ElementNotFound(_)))
        ));
    }

    #[tokio::test]
    async fn test_read_without_provider_is_fatal() {
        let device = Arc::new(MockDevice::new());
        let step = Step::new(
            "r",
            StepKind::ReadToVariable {
                name: Some("x".into()),
                selector: Some(Selector::new(SelectorKind::Text, "A")),
                attribute: ReadAttribute::Text,
            },
        );
        let result = run(&engine(&device), step, &mut VariableStore::new()).await;
        assert!(matches!(result.error, Some(StepError::Unavailable("snapshot provider"))));
    }

    #[tokio::test]
    async fn test_shell_saves_trimmed_output() {
        let device = Arc::new(MockDevice::new().with_shell_output("  Android 14\n"));
        let mut vars = VariableStore::new();
        vars.set("prop", "ro.build.version.release");
        let step = Step::new(
            "sh",
            StepKind::Shell {
                command: Some("getprop {{prop}}".into()),
                save_to: Some("version".into()),
            },
        );
        let result = run(&engine(&device), step, &mut vars).await;
        assert_eq!(result.output.as_deref(), Some("  Android 14\n"));
        assert_eq!(vars.get("version"), Some("Android 14"));
        assert_eq!(
            device.calls(),
            vec!["shell emulator-5554 getprop ro.build.version.release"]
        );
    }

    #[tokio::test]
    async fn test_script_and_key_event() {
        let device = Arc::new(MockDevice::new());
        let scripts = Arc::new(MockScripts::new());
        let engine = engine(&device).with_scripts(scripts.clone());

        let script = Step::new("s", StepKind::Script { name: Some("login".into()) });
        assert!(run(&engine, script, &mut VariableStore::new()).await.success);
        assert_eq!(scripts.played(), vec!["login"]);

        let key = Step::new("k", StepKind::KeyEvent { key_code: Some(4) });
        assert!(run(&engine, key, &mut VariableStore::new()).await.success);
        assert_eq!(device.calls(), vec!["key emulator-5554 4"]);
    }

    #[tokio::test]
    async fn test_script_without_player() {
        let device = Arc::new(MockDevice::new());
        let step = Step::new("s", StepKind::Script { name: Some("login".into()) });
        let result = run(&engine(&device), step, &mut VariableStore::new()).await;
        assert!(matches!(result.error, Some(StepError::Unavailable("script player"))));
    }

    #[tokio::test]
    async fn test_wait_is_interruptible() {
        let device = Arc::new(MockDevice::new());
        let engine = engine(&device);
        let token = CancelToken::new();
        token.cancel();
        let mut ctx = RunContext::new("dev", token);
        let step = Step::new("w", StepKind::Wait { duration_ms: Some(10_000) });

        let result = engine
            .execute_step(&step, &mut VariableStore::new(), &mut ctx, 0)
            .await;
        assert!(matches!(result.error, Some(StepError::Cancelled)));
    }

    #[tokio::test]
    async fn test_unsupported_step() {
        let device = Arc::new(MockDevice::new());
        let step = Step::new("u", StepKind::Unsupported);
        let result = run(&engine(&device), step, &mut VariableStore::new()).await;
        assert!(matches!(result.error, Some(StepError::UnsupportedStep)));
    }

    #[tokio::test]
    async fn test_branch_result_is_condition() {
        let device = Arc::new(MockDevice::new());
        let mut vars = VariableStore::new();
        vars.set("status", "fail");
        let step = Step::new(
            "b",
            StepKind::Branch {
                condition: Some("variable_equals".into()),
                selector: None,
                variable_name: Some("status".into()),
                expected_value: Some("ok".into()),
            },
        );
        let result = run(&engine(&device), step, &mut vars).await;
        assert!(result.is_condition);
        assert!(!result.success);
        assert!(!result.is_failure());
    }
}
