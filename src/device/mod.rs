//! Device Interfaces
//!
//! Traits for the collaborators the engine drives but does not own:
//! device input, UI snapshots and recorded-script playback.
//!
//! # Implementations
//!
//! - [`adb`]: drives a real device through the `adb` binary
//! - [`dry_run`]: logs every action and succeeds
//! - [`ui`]: a serde-loadable UI hierarchy usable as a static snapshot

pub mod adb;
pub mod dry_run;
pub mod ui;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::workflow::model::{AppActionKind, Selector, SwipeDirection};

pub use adb::AdbDevice;
pub use dry_run::DryRunDevice;
pub use ui::{StaticSnapshotProvider, UiNode, UiTree};

/// Errors reported by device-side collaborators.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeviceError {
    #[error("command failed (exit code {code:?}): {stderr}")]
    CommandFailed { code: Option<i32>, stderr: String },

    #[error("failed to run device command: {0}")]
    Io(String),

    #[error("element not found: {0}")]
    ElementNotFound(String),

    #[error("timed out after {0} ms")]
    Timeout(u64),

    #[error("unsupported operation: {0}")]
    Unsupported(String),

    #[error("{0}")]
    Other(String),
}

/// Element interaction with its arguments resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementAction {
    Click,
    LongClick,
    InputText(String),
    Swipe(SwipeDirection),
    WaitAppear,
    WaitDisappear,
}

impl ElementAction {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Click => "click",
            Self::LongClick => "long_click",
            Self::InputText(_) => "input_text",
            Self::Swipe(_) => "swipe",
            Self::WaitAppear => "wait_appear",
            Self::WaitDisappear => "wait_disappear",
        }
    }
}

/// Input primitives of a device session.
///
/// Implementations report success or failure only; the engine never
/// interprets device-specific output except for raw `shell` results.
#[async_trait]
pub trait DeviceActions: Send + Sync {
    /// Runs a raw shell command and returns its standard output.
    async fn shell(&self, serial: &str, command: &str) -> Result<String, DeviceError>;

    async fn tap(&self, serial: &str, x: i32, y: i32) -> Result<(), DeviceError>;

    async fn swipe(
        &self,
        serial: &str,
        from: (i32, i32),
        to: (i32, i32),
        duration: Duration,
    ) -> Result<(), DeviceError>;

    async fn key_event(&self, serial: &str, key_code: i32) -> Result<(), DeviceError>;

    async fn app(
        &self,
        serial: &str,
        action: AppActionKind,
        package: &str,
    ) -> Result<(), DeviceError>;

    /// Locates an element and performs `action` on it, waiting up to `timeout`.
    async fn element(
        &self,
        serial: &str,
        selector: &Selector,
        action: &ElementAction,
        timeout: Duration,
    ) -> Result<(), DeviceError>;
}

/// A single element found in a snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UiElement {
    pub text: String,
    pub resource_id: String,
    pub content_desc: String,
    pub class_name: String,
    /// `[left,top][right,bottom]`, as reported by the device
    pub bounds: String,
}

/// Searchable view of the device's UI at one point in time.
pub trait UiSnapshot: Send + Sync {
    /// Finds the first element matching a non-XPath selector.
    fn find(&self, selector: &Selector) -> Option<UiElement>;

    /// Finds the first element matching an XPath-style expression.
    fn find_xpath(&self, expression: &str) -> Option<UiElement>;

    /// Dispatches on the selector kind.
    fn lookup(&self, selector: &Selector) -> Option<UiElement> {
        match selector.by {
            crate::workflow::model::SelectorKind::Xpath => self.find_xpath(&selector.value),
            _ => self.find(selector),
        }
    }
}

/// Fetches fresh UI snapshots.
#[async_trait]
pub trait SnapshotProvider: Send + Sync {
    async fn snapshot(&self, serial: &str) -> Result<Box<dyn UiSnapshot>, DeviceError>;
}

/// Replays recorded input sequences by name.
#[async_trait]
pub trait ScriptPlayer: Send + Sync {
    async fn play(&self, serial: &str, name: &str) -> Result<(), DeviceError>;
}
