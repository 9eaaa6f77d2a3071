//! Dry-run Device
//!
//! Prints every action instead of performing it. Used by `--dry-run` to
//! preview a workflow's path through the graph.

use std::time::Duration;

use async_trait::async_trait;
use log::info;

use super::{DeviceActions, DeviceError, ElementAction, ScriptPlayer};
use crate::workflow::model::{AppActionKind, Selector};

/// Device that logs actions and always succeeds.
#[derive(Debug, Clone, Default)]
pub struct DryRunDevice;

impl DryRunDevice {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DeviceActions for DryRunDevice {
    async fn shell(&self, serial: &str, command: &str) -> Result<String, DeviceError> {
        info!("[DRY RUN] {} shell: {}", serial, command);
        Ok(String::new())
    }

    async fn tap(&self, serial: &str, x: i32, y: i32) -> Result<(), DeviceError> {
        info!("[DRY RUN] {} tap ({}, {})", serial, x, y);
        Ok(())
    }

    async fn swipe(
        &self,
        serial: &str,
        from: (i32, i32),
        to: (i32, i32),
        duration: Duration,
    ) -> Result<(), DeviceError> {
        info!(
            "[DRY RUN] {} swipe {:?} -> {:?} over {:?}",
            serial, from, to, duration
        );
        Ok(())
    }

    async fn key_event(&self, serial: &str, key_code: i32) -> Result<(), DeviceError> {
        info!("[DRY RUN] {} key event {}", serial, key_code);
        Ok(())
    }

    async fn app(
        &self,
        serial: &str,
        action: AppActionKind,
        package: &str,
    ) -> Result<(), DeviceError> {
        info!("[DRY RUN] {} app {:?} {}", serial, action, package);
        Ok(())
    }

    async fn element(
        &self,
        serial: &str,
        selector: &Selector,
        action: &ElementAction,
        timeout: Duration,
    ) -> Result<(), DeviceError> {
        info!(
            "[DRY RUN] {} element {} on {} (timeout {:?})",
            serial,
            action.name(),
            selector,
            timeout
        );
        Ok(())
    }
}

#[async_trait]
impl ScriptPlayer for DryRunDevice {
    async fn play(&self, serial: &str, name: &str) -> Result<(), DeviceError> {
        info!("[DRY RUN] {} play script '{}'", serial, name);
        Ok(())
    }
}
