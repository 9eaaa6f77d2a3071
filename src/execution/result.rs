//! Run Results
//!
//! The record kept for the last run on each device.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Terminal status of a run.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Error,
    Cancelled,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Completed => "completed",
            Self::Error => "error",
            Self::Cancelled => "cancelled",
        };
        f.write_str(text)
    }
}

/// Summary of a finished run.
#[derive(Serialize, Debug, Clone)]
pub struct ExecutionResult {
    pub workflow_id: String,
    pub workflow_name: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    /// Step dispatches, nested sub-workflows included
    pub steps_executed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Variable values when the run ended
    pub variables: HashMap<String, String>,
}

impl ExecutionResult {
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_display() {
        assert_eq!(RunStatus::Completed.to_string(), "completed");
        assert_eq!(RunStatus::Cancelled.to_string(), "cancelled");
    }

    #[test]
    fn test_result_serialization() {
        let now = Utc::now();
        let result = ExecutionResult {
            workflow_id: "wf".into(),
            workflow_name: "Workflow".into(),
            status: RunStatus::Error,
            started_at: now,
            finished_at: now,
            duration_ms: 12,
            steps_executed: 3,
            error: Some("step 'a' failed: boom".into()),
            variables: HashMap::new(),
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["steps_executed"], 3);
        assert!(!result.is_success());
    }
}
