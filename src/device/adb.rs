//! ADB-backed Device
//!
//! Drives a device through the `adb` binary. Each primitive is sent as an
//! `adb -s <serial> shell ...` invocation.
//!
//! # Binary Resolution Priority
//!
//! 1. Explicit path passed to [`AdbDevice::with_path`]
//! 2. `$ANDROID_HOME/platform-tools/adb`
//! 3. `adb` on the system PATH

use std::path::PathBuf;
use std::process::Output;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, error, warn};
use tokio::process::Command;

use super::{DeviceActions, DeviceError, ElementAction};
use crate::workflow::model::{AppActionKind, Selector};

/// Device driven through `adb shell`.
#[derive(Debug, Clone)]
pub struct AdbDevice {
    adb_path: PathBuf,
}

impl AdbDevice {
    /// Resolves the adb binary from `ANDROID_HOME` or the PATH.
    pub fn new() -> Self {
        if let Ok(home) = std::env::var("ANDROID_HOME") {
            let sdk_path = PathBuf::from(home).join("platform-tools").join("adb");
            if sdk_path.exists() {
                debug!("Using SDK adb: {}", sdk_path.display());
                return Self { adb_path: sdk_path };
            }
        }
        Self::with_path("adb")
    }

    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            adb_path: path.into(),
        }
    }

    pub fn adb_path(&self) -> &PathBuf {
        &self.adb_path
    }

    /// Runs `adb -s <serial> shell <command>`.
    async fn run_shell(&self, serial: &str, command: &str) -> Result<Output, DeviceError> {
        debug!("[{}] adb shell {}", serial, command);

        Command::new(&self.adb_path)
            .arg("-s")
            .arg(serial)
            .arg("shell")
            .arg(command)
            .output()
            .await
            .map_err(|e| DeviceError::Io(format!("{}: {}", self.adb_path.display(), e)))
    }

    /// Runs a command and maps a non-zero exit to an error.
    async fn checked(&self, serial: &str, command: &str) -> Result<String, DeviceError> {
        let output = self.run_shell(serial, command).await?;
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();

        if output.status.success() {
            return Ok(stdout);
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        error!(
            "[{}] '{}' failed with exit code: {:?}",
            serial,
            command,
            output.status.code()
        );
        if !stdout.trim().is_empty() {
            debug!("stdout:\n{}", stdout);
        }

        Err(DeviceError::CommandFailed {
            code: output.status.code(),
            stderr,
        })
    }
}

impl Default for AdbDevice {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds the shell command for an app lifecycle action.
pub(crate) fn app_command(action: AppActionKind, package: &str) -> String {
    match action {
        AppActionKind::Launch => format!(
            "monkey -p {} -c android.intent.category.LAUNCHER 1",
            package
        ),
        AppActionKind::Stop => format!("am force-stop {}", package),
        AppActionKind::Clear => format!("pm clear {}", package),
        AppActionKind::OpenSettings => format!(
            "am start -a android.settings.APPLICATION_DETAILS_SETTINGS -d package:{}",
            package
        ),
    }
}

#[async_trait]
impl DeviceActions for AdbDevice {
    async fn shell(&self, serial: &str, command: &str) -> Result<String, DeviceError> {
        self.checked(serial, command).await
    }

    async fn tap(&self, serial: &str, x: i32, y: i32) -> Result<(), DeviceError> {
        self.checked(serial, &format!("input tap {} {}", x, y))
            .await
            .map(|_| ())
    }

    async fn swipe(
        &self,
        serial: &str,
        from: (i32, i32),
        to: (i32, i32),
        duration: Duration,
    ) -> Result<(), DeviceError> {
        let command = format!(
            "input swipe {} {} {} {} {}",
            from.0,
            from.1,
            to.0,
            to.1,
            duration.as_millis()
        );
        self.checked(serial, &command).await.map(|_| ())
    }

    async fn key_event(&self, serial: &str, key_code: i32) -> Result<(), DeviceError> {
        self.checked(serial, &format!("input keyevent {}", key_code))
            .await
            .map(|_| ())
    }

    async fn app(
        &self,
        serial: &str,
        action: AppActionKind,
        package: &str,
    ) -> Result<(), DeviceError> {
        self.checked(serial, &app_command(action, package))
            .await
            .map(|_| ())
    }

    async fn element(
        &self,
        serial: &str,
        selector: &Selector,
        action: &ElementAction,
        _timeout: Duration,
    ) -> Result<(), DeviceError> {
        warn!(
            "[{}] element {} on {} requires a UI automation backend",
            serial,
            action.name(),
            selector
        );
        Err(DeviceError::Unsupported(format!(
            "element {} is not available over plain adb",
            action.name()
        )))
    }
}
