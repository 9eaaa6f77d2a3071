//! Lifecycle Events
//!
//! Fire-and-forget notifications emitted while a run progresses. Sinks
//! must not block; a sink that cannot deliver an event drops it.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;

use crate::execution::RunStatus;

/// A notification about a run or one of its steps.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ExecutionEvent {
    RunStarted {
        device_id: String,
        workflow_id: String,
        workflow_name: String,
        timestamp: DateTime<Utc>,
    },
    StepStarted {
        device_id: String,
        workflow_id: String,
        step_id: String,
        step_type: String,
        iteration: u32,
    },
    StepEnded {
        device_id: String,
        workflow_id: String,
        step_id: String,
        step_type: String,
        iteration: u32,
        success: bool,
        duration_ms: u64,
        error: Option<String>,
    },
    RunCompleted {
        device_id: String,
        workflow_id: String,
        status: RunStatus,
        steps_executed: usize,
        duration_ms: u64,
    },
    RunFailed {
        device_id: String,
        workflow_id: String,
        error: String,
        steps_executed: usize,
        duration_ms: u64,
    },
}

/// Receives lifecycle events.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: ExecutionEvent);
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn emit(&self, _event: ExecutionEvent) {}
}

/// Writes events to the `log` facade.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogEventSink;

impl EventSink for LogEventSink {
    fn emit(&self, event: ExecutionEvent) {
        match event {
            ExecutionEvent::RunStarted {
                device_id,
                workflow_name,
                ..
            } => info!("[{}] Starting workflow '{}'", device_id, workflow_name),
            ExecutionEvent::StepStarted {
                step_id,
                step_type,
                iteration,
                ..
            } => debug!("Step '{}' ({}) iteration {}", step_id, step_type, iteration),
            ExecutionEvent::StepEnded {
                step_id,
                success: true,
                duration_ms,
                ..
            } => info!("Step '{}' completed in {} ms", step_id, duration_ms),
            ExecutionEvent::StepEnded { step_id, error, .. } => warn!(
                "Step '{}' failed: {}",
                step_id,
                error.unwrap_or_else(|| "no details".to_string())
            ),
            ExecutionEvent::RunCompleted {
                device_id,
                status,
                steps_executed,
                duration_ms,
                ..
            } => info!(
                "[{}] Workflow {} after {} steps ({} ms)",
                device_id, status, steps_executed, duration_ms
            ),
            ExecutionEvent::RunFailed {
                device_id, error, ..
            } => warn!("[{}] Workflow failed: {}", device_id, error),
        }
    }
}

/// Forwards events to a tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelEventSink {
    tx: UnboundedSender<ExecutionEvent>,
}

impl ChannelEventSink {
    pub fn new(tx: UnboundedSender<ExecutionEvent>) -> Self {
        Self { tx }
    }
}

impl EventSink for ChannelEventSink {
    fn emit(&self, event: ExecutionEvent) {
        // Receiver gone: nobody is listening any more.
        let _ = self.tx.send(event);
    }
}

/// Delivers each event to several sinks.
#[derive(Clone, Default)]
pub struct FanOutSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanOutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl EventSink for FanOutSink {
    fn emit(&self, event: ExecutionEvent) {
        for sink in &self.sinks {
            sink.emit(event.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::unbounded_channel;

    fn step_started(step_id: &str) -> ExecutionEvent {
        ExecutionEvent::StepStarted {
            device_id: "dev".into(),
            workflow_id: "wf".into(),
            step_id: step_id.into(),
            step_type: "tap".into(),
            iteration: 1,
        }
    }

    #[test]
    fn test_channel_sink_forwards() {
        let (tx, mut rx) = unbounded_channel();
        let sink = ChannelEventSink::new(tx);
        sink.emit(step_started("a"));
        assert_eq!(rx.try_recv().unwrap(), step_started("a"));
    }

    #[test]
    fn test_channel_sink_ignores_closed_receiver() {
        let (tx, rx) = unbounded_channel();
        drop(rx);
        ChannelEventSink::new(tx).emit(step_started("a"));
    }

    #[test]
    fn test_fan_out() {
        let (tx1, mut rx1) = unbounded_channel();
        let (tx2, mut rx2) = unbounded_channel();
        let sink = FanOutSink::new()
            .with(Arc::new(ChannelEventSink::new(tx1)))
            .with(Arc::new(ChannelEventSink::new(tx2)))
            .with(Arc::new(LogEventSink));
        sink.emit(step_started("b"));
        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());
    }

    #[test]
    fn test_event_serialization_tag() {
        let json = serde_json::to_value(step_started("c")).unwrap();
        assert_eq!(json["event"], "step_started");
        assert_eq!(json["step_id"], "c");
    }
}
