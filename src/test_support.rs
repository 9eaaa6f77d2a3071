//! Shared test fixtures: a recording device, a script player and small
//! step builders.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::device::{DeviceActions, DeviceError, ElementAction, ScriptPlayer};
use crate::workflow::model::{AppActionKind, Selector, Step, StepKind, WorkflowDefinition};

#[derive(Debug, Clone, Copy)]
enum TapFailure {
    Never,
    Always,
    OnCall(usize),
}

/// Device that records every call as a line of text.
///
/// Failed calls are recorded too.
#[derive(Debug)]
pub struct MockDevice {
    calls: Mutex<Vec<String>>,
    taps: Mutex<usize>,
    tap_failure: TapFailure,
    shell_output: String,
}

impl MockDevice {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            taps: Mutex::new(0),
            tap_failure: TapFailure::Never,
            shell_output: String::new(),
        }
    }

    /// Every tap fails.
    pub fn fail_taps(mut self) -> Self {
        self.tap_failure = TapFailure::Always;
        self
    }

    /// The n-th tap (1-based) fails.
    pub fn fail_tap_on(mut self, call: usize) -> Self {
        self.tap_failure = TapFailure::OnCall(call);
        self
    }

    pub fn with_shell_output(mut self, output: &str) -> Self {
        self.shell_output = output.to_string();
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl DeviceActions for MockDevice {
    async fn shell(&self, serial: &str, command: &str) -> Result<String, DeviceError> {
        self.record(format!("shell {} {}", serial, command));
        Ok(self.shell_output.clone())
    }

    async fn tap(&self, serial: &str, x: i32, y: i32) -> Result<(), DeviceError> {
        self.record(format!("tap {} {},{}", serial, x, y));
        let call = {
            let mut taps = self.taps.lock().unwrap();
            *taps += 1;
            *taps
        };
        let fail = match self.tap_failure {
            TapFailure::Never => false,
            TapFailure::Always => true,
            TapFailure::OnCall(n) => n == call,
        };
        if fail {
            return Err(DeviceError::CommandFailed {
                code: Some(1),
                stderr: "injected tap failure".to_string(),
            });
        }
        Ok(())
    }

    async fn swipe(
        &self,
        serial: &str,
        from: (i32, i32),
        to: (i32, i32),
        duration: Duration,
    ) -> Result<(), DeviceError> {
        self.record(format!(
            "swipe {} {},{}->{},{} {}ms",
            serial,
            from.0,
            from.1,
            to.0,
            to.1,
            duration.as_millis()
        ));
        Ok(())
    }

    async fn key_event(&self, serial: &str, key_code: i32) -> Result<(), DeviceError> {
        self.record(format!("key {} {}", serial, key_code));
        Ok(())
    }

    async fn app(
        &self,
        serial: &str,
        action: AppActionKind,
        package: &str,
    ) -> Result<(), DeviceError> {
        self.record(format!("app {} {:?} {}", serial, action, package));
        Ok(())
    }

    async fn element(
        &self,
        serial: &str,
        selector: &Selector,
        action: &ElementAction,
        timeout: Duration,
    ) -> Result<(), DeviceError> {
        let mut call = format!(
            "element {} {} {} {}ms",
            serial,
            action.name(),
            selector,
            timeout.as_millis()
        );
        if let ElementAction::InputText(text) = action {
            call.push_str(&format!(" text={}", text));
        }
        self.record(call);
        Ok(())
    }
}

/// Script player that remembers what it played.
#[derive(Debug, Default)]
pub struct MockScripts {
    played: Mutex<Vec<String>>,
}

impl MockScripts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn played(&self) -> Vec<String> {
        self.played.lock().unwrap().clone()
    }
}

#[async_trait]
impl ScriptPlayer for MockScripts {
    async fn play(&self, _serial: &str, name: &str) -> Result<(), DeviceError> {
        self.played.lock().unwrap().push(name.to_string());
        Ok(())
    }
}

pub fn workflow(id: &str, steps: Vec<Step>) -> WorkflowDefinition {
    WorkflowDefinition::from_steps(id, steps)
}

pub fn tap(id: &str, x: i32, y: i32) -> Step {
    Step::new(
        id,
        StepKind::Tap {
            x: Some(x),
            y: Some(y),
        },
    )
}

pub fn wait(id: &str, duration_ms: u64) -> Step {
    Step::new(
        id,
        StepKind::Wait {
            duration_ms: Some(duration_ms),
        },
    )
}

pub fn set_var(id: &str, name: &str, value: &str) -> Step {
    Step::new(
        id,
        StepKind::SetVariable {
            name: Some(name.to_string()),
            value: Some(value.to_string()),
        },
    )
}

pub fn branch_on(id: &str, variable: &str, expected: &str) -> Step {
    Step::new(
        id,
        StepKind::Branch {
            condition: Some("variable_equals".to_string()),
            selector: None,
            variable_name: Some(variable.to_string()),
            expected_value: Some(expected.to_string()),
        },
    )
}

pub fn sub_workflow(id: &str, workflow_id: &str) -> Step {
    Step::new(
        id,
        StepKind::SubWorkflow {
            workflow_id: Some(workflow_id.to_string()),
        },
    )
}
