//! Workflow Data Model
//!
//! Core data structures representing workflow steps and the connections
//! between them.
//!
//! # Example YAML Format
//!
//! ```yaml
//! id: login
//! name: Log in
//! variables:
//!   user: demo
//! steps:
//!   - id: start
//!     type: start
//!     connections:
//!       success_step_id: open
//!
//!   - id: open
//!     type: app
//!     action: launch
//!     package: com.example.app
//!     post_delay_ms: 1500
//!     connections:
//!       success_step_id: type_user
//!
//!   - id: type_user
//!     type: element
//!     action: input_text
//!     selector: { by: resource_id, value: "com.example.app:id/user" }
//!     text: "{{user}}"
//! ```
//!
//! Connections may point backwards, so loops are authored as ordinary
//! edges. Steps only ever refer to each other by id.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What to do when a step fails and no error connection is wired.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum OnError {
    /// Abort the run.
    #[default]
    Stop,
    /// Treat the failure as non-fatal and follow the success connection.
    Continue,
}

/// Outgoing edges of a step.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct Connections {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success_step_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_step_id: Option<String>,

    /// Branch steps only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub true_step_id: Option<String>,

    /// Branch steps only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub false_step_id: Option<String>,
}

impl Connections {
    /// Iterates over every wired target id.
    pub fn targets(&self) -> impl Iterator<Item = &str> {
        [
            &self.success_step_id,
            &self.error_step_id,
            &self.true_step_id,
            &self.false_step_id,
        ]
        .into_iter()
        .filter_map(|id| id.as_deref())
        .filter(|id| !id.is_empty())
    }
}

/// How an element is located in the UI hierarchy.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SelectorKind {
    Text,
    ResourceId,
    ContentDesc,
    ClassName,
    Xpath,
}

/// Element selector. `value` may contain `{{name}}` placeholders.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    pub by: SelectorKind,
    pub value: String,
}

impl Selector {
    pub fn new(by: SelectorKind, value: impl Into<String>) -> Self {
        Self {
            by,
            value: value.into(),
        }
    }
}

impl std::fmt::Display for Selector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let by = match self.by {
            SelectorKind::Text => "text",
            SelectorKind::ResourceId => "resource_id",
            SelectorKind::ContentDesc => "content_desc",
            SelectorKind::ClassName => "class_name",
            SelectorKind::Xpath => "xpath",
        };
        write!(f, "{}={}", by, self.value)
    }
}

/// Element interaction requested by an `element` step.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ElementActionKind {
    Click,
    LongClick,
    InputText,
    Swipe,
    WaitAppear,
    WaitDisappear,
}

/// Swipe direction for element swipes.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SwipeDirection {
    Up,
    Down,
    Left,
    Right,
}

/// App lifecycle operation requested by an `app` step.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AppActionKind {
    Launch,
    Stop,
    Clear,
    OpenSettings,
}

/// Element attribute captured by `read_to_variable`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReadAttribute {
    #[default]
    Text,
    ResourceId,
    ContentDesc,
    ClassName,
    Bounds,
}

/// Step type and its parameters.
///
/// Parameters are optional at the serde level so that an incomplete step
/// still loads; the executor rejects it with a missing-parameters error
/// when it is dispatched.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepKind {
    Start,
    Tap {
        x: Option<i32>,
        y: Option<i32>,
    },
    Swipe {
        x1: Option<i32>,
        y1: Option<i32>,
        x2: Option<i32>,
        y2: Option<i32>,
        duration_ms: Option<u64>,
    },
    Element {
        action: Option<ElementActionKind>,
        selector: Option<Selector>,
        text: Option<String>,
        direction: Option<SwipeDirection>,
    },
    App {
        action: Option<AppActionKind>,
        package: Option<String>,
    },
    Branch {
        condition: Option<String>,
        selector: Option<Selector>,
        variable_name: Option<String>,
        expected_value: Option<String>,
    },
    Wait {
        duration_ms: Option<u64>,
    },
    Script {
        name: Option<String>,
    },
    SetVariable {
        name: Option<String>,
        value: Option<String>,
    },
    ReadToVariable {
        name: Option<String>,
        selector: Option<Selector>,
        #[serde(default)]
        attribute: ReadAttribute,
    },
    /// Raw device shell command.
    Shell {
        command: Option<String>,
        save_to: Option<String>,
    },
    SubWorkflow {
        workflow_id: Option<String>,
    },
    KeyEvent {
        key_code: Option<i32>,
    },
    /// Any type tag this build does not know.
    #[serde(other)]
    Unsupported,
}

impl StepKind {
    /// Type tag as written in workflow files.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Tap { .. } => "tap",
            Self::Swipe { .. } => "swipe",
            Self::Element { .. } => "element",
            Self::App { .. } => "app",
            Self::Branch { .. } => "branch",
            Self::Wait { .. } => "wait",
            Self::Script { .. } => "script",
            Self::SetVariable { .. } => "set_variable",
            Self::ReadToVariable { .. } => "read_to_variable",
            Self::Shell { .. } => "shell",
            Self::SubWorkflow { .. } => "sub_workflow",
            Self::KeyEvent { .. } => "key_event",
            Self::Unsupported => "unsupported",
        }
    }

    pub fn is_branch(&self) -> bool {
        matches!(self, Self::Branch { .. })
    }

    pub fn is_start(&self) -> bool {
        matches!(self, Self::Start)
    }
}

/// A single node in a workflow graph.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Step {
    /// Unique identifier within the workflow
    pub id: String,

    /// Type tag and parameters
    #[serde(flatten)]
    pub kind: StepKind,

    /// Number of times to run the step; values below 1 run it once
    #[serde(default = "default_loop_count", alias = "loop")]
    pub loop_count: i32,

    /// Delay before each iteration
    #[serde(default)]
    pub pre_wait_ms: u64,

    /// Delay after each iteration
    #[serde(default)]
    pub post_delay_ms: u64,

    /// Step-specific timeout (element lookups, reads)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,

    #[serde(default)]
    pub on_error: OnError,

    #[serde(default)]
    pub connections: Connections,
}

fn default_loop_count() -> i32 {
    1
}

impl Step {
    /// Creates a step with default common fields and no connections.
    ///
    /// # Example
    ///
    /// ```
    /// use tapflow::workflow::{Step, StepKind};
    ///
    /// let step = Step::new("tap_ok", StepKind::Tap { x: Some(540), y: Some(1200) })
    ///     .then("next")
    ///     .with_loop(3);
    /// assert_eq!(step.effective_loop_count(), 3);
    /// ```
    pub fn new(id: impl Into<String>, kind: StepKind) -> Self {
        Self {
            id: id.into().trim().to_string(),
            kind,
            loop_count: 1,
            pre_wait_ms: 0,
            post_delay_ms: 0,
            timeout_ms: None,
            on_error: OnError::Stop,
            connections: Connections::default(),
        }
    }

    /// Sets the success connection.
    pub fn then(mut self, step_id: impl Into<String>) -> Self {
        self.connections.success_step_id = Some(step_id.into());
        self
    }

    /// Sets the error connection.
    pub fn on_failure(mut self, step_id: impl Into<String>) -> Self {
        self.connections.error_step_id = Some(step_id.into());
        self
    }

    /// Sets the true/false connections of a branch step.
    pub fn branches(mut self, on_true: impl Into<String>, on_false: impl Into<String>) -> Self {
        self.connections.true_step_id = Some(on_true.into());
        self.connections.false_step_id = Some(on_false.into());
        self
    }

    pub fn with_loop(mut self, count: i32) -> Self {
        self.loop_count = count;
        self
    }

    pub fn with_on_error(mut self, policy: OnError) -> Self {
        self.on_error = policy;
        self
    }

    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn with_delays(mut self, pre_wait_ms: u64, post_delay_ms: u64) -> Self {
        self.pre_wait_ms = pre_wait_ms;
        self.post_delay_ms = post_delay_ms;
        self
    }

    /// Loop count clamped to at least one iteration.
    pub fn effective_loop_count(&self) -> u32 {
        self.loop_count.max(1) as u32
    }

    pub fn type_name(&self) -> &'static str {
        self.kind.type_name()
    }
}

/// A complete workflow definition.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct WorkflowDefinition {
    pub id: String,

    #[serde(default)]
    pub name: String,

    /// Default variable values, overridden by caller-supplied values
    #[serde(default)]
    pub variables: HashMap<String, String>,

    /// Steps in no particular order
    pub steps: Vec<Step>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl WorkflowDefinition {
    /// Creates an empty workflow.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            variables: HashMap::new(),
            steps: Vec::new(),
            created_at: None,
            updated_at: None,
        }
    }

    /// Creates a workflow from a list of steps.
    pub fn from_steps(id: impl Into<String>, steps: Vec<Step>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            steps,
            ..Self::new(id, "")
        }
    }

    /// Adds a step to the workflow.
    pub fn add_step(&mut self, step: Step) -> Result<(), String> {
        if self.steps.iter().any(|s| s.id == step.id) {
            return Err(format!("Step '{}' already exists", step.id));
        }
        self.steps.push(step);
        Ok(())
    }

    /// Removes a step and clears every connection that pointed at it.
    pub fn remove_step(&mut self, id: &str) -> Result<(), String> {
        let index = self
            .steps
            .iter()
            .position(|s| s.id == id)
            .ok_or_else(|| format!("Step '{}' not found", id))?;

        self.steps.remove(index);

        for step in &mut self.steps {
            let c = &mut step.connections;
            for slot in [
                &mut c.success_step_id,
                &mut c.error_step_id,
                &mut c.true_step_id,
                &mut c.false_step_id,
            ] {
                if slot.as_deref() == Some(id) {
                    *slot = None;
                }
            }
        }
        Ok(())
    }

    /// Sets a default variable.
    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    /// Gets a step by ID.
    pub fn get_step(&self, id: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// Gets a mutable reference to a step by ID.
    pub fn get_step_mut(&mut self, id: &str) -> Option<&mut Step> {
        self.steps.iter_mut().find(|s| s.id == id)
    }

    /// Returns every start step. A valid workflow has exactly one.
    pub fn start_steps(&self) -> Vec<&Step> {
        self.steps.iter().filter(|s| s.kind.is_start()).collect()
    }

    /// Builds the id lookup used while walking the graph.
    pub fn index(&self) -> HashMap<&str, &Step> {
        self.steps.iter().map(|s| (s.id.as_str(), s)).collect()
    }

    /// Ids of sub-workflows referenced by this workflow.
    pub fn sub_workflow_ids(&self) -> HashSet<&str> {
        self.steps
            .iter()
            .filter_map(|s| match &s.kind {
                StepKind::SubWorkflow {
                    workflow_id: Some(id),
                } => Some(id.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Returns the number of steps in the workflow.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns true if the workflow has no steps.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}
