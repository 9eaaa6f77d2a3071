//! Execution Timeline
//!
//! An [`EventSink`] that keeps every event of a run in memory and can
//! render step iterations as an ASCII Gantt chart.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

use super::events::{EventSink, ExecutionEvent};

/// Type of timeline event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    /// Step iteration started
    Started,
    /// Step iteration succeeded
    Completed,
    /// Step iteration failed
    Failed,
}

/// A single step event in the timeline.
#[derive(Debug, Clone)]
pub struct TimelineEvent {
    pub workflow_id: String,
    pub step_id: String,
    pub event_type: EventType,
    pub timestamp: Instant,
}

/// One finished step iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepSpan {
    pub workflow_id: String,
    pub step_id: String,
    pub start_ms: u128,
    pub end_ms: u128,
    pub success: bool,
}

#[derive(Debug, Default)]
struct Recorded {
    step_events: Vec<TimelineEvent>,
    events: Vec<ExecutionEvent>,
}

/// Records the lifecycle of runs.
///
/// Shared between the engine (as a sink) and the caller through `Arc`.
#[derive(Debug)]
pub struct ExecutionTimeline {
    recorded: Mutex<Recorded>,
    start_time: Instant,
}

impl ExecutionTimeline {
    /// Creates a new timeline starting now.
    pub fn new() -> Self {
        Self {
            recorded: Mutex::new(Recorded::default()),
            start_time: Instant::now(),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Recorded> {
        self.recorded.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Records a step event directly, outside of any workflow.
    pub fn add_event(&self, step_id: impl Into<String>, event_type: EventType) {
        self.lock().step_events.push(TimelineEvent {
            workflow_id: String::new(),
            step_id: step_id.into(),
            event_type,
            timestamp: Instant::now(),
        });
    }

    /// Returns recorded step events.
    pub fn step_events(&self) -> Vec<TimelineEvent> {
        self.lock().step_events.clone()
    }

    /// Returns every lifecycle event received as a sink.
    pub fn events(&self) -> Vec<ExecutionEvent> {
        self.lock().events.clone()
    }

    /// Returns the total elapsed time since timeline creation.
    pub fn elapsed(&self) -> std::time::Duration {
        self.start_time.elapsed()
    }

    /// Pairs start and end events into spans, in start order.
    ///
    /// A sub-workflow may run the same step while the caller's iteration
    /// of it is still open, so starts are stacked per workflow and step and
    /// each end closes the innermost one.
    pub fn spans(&self) -> Vec<StepSpan> {
        let mut open: HashMap<(String, String), Vec<u128>> = HashMap::new();
        let mut spans = Vec::new();

        for event in self.lock().step_events.iter() {
            let elapsed = event.timestamp.duration_since(self.start_time).as_millis();
            let key = (event.workflow_id.clone(), event.step_id.clone());

            match event.event_type {
                EventType::Started => {
                    open.entry(key).or_default().push(elapsed);
                }
                EventType::Completed | EventType::Failed => {
                    if let Some(start) = open.get_mut(&key).and_then(Vec::pop) {
                        spans.push(StepSpan {
                            workflow_id: key.0,
                            step_id: key.1,
                            start_ms: start,
                            end_ms: elapsed,
                            success: event.event_type == EventType::Completed,
                        });
                    }
                }
            }
        }

        spans.sort_by_key(|s| s.start_ms);
        spans
    }

    /// Number of finished iterations per step.
    pub fn iteration_counts(&self) -> HashMap<String, usize> {
        let mut counts = HashMap::new();
        for span in self.spans() {
            *counts.entry(span.step_id).or_insert(0) += 1;
        }
        counts
    }

    /// Generates an ASCII Gantt chart representation.
    ///
    /// Each iteration is shown as a bar indicating when it ran relative to
    /// the total execution time; failed iterations use `x`.
    pub fn gantt_chart(&self) -> String {
        let mut output = String::from("\nExecution Timeline:\n\n");

        let total_time = self.elapsed().as_millis();
        if total_time == 0 {
            return output;
        }

        // Scale to 50 characters width
        let scale = 50.0 / total_time as f64;

        for span in self.spans() {
            let start_pos = (span.start_ms as f64 * scale) as usize;
            let width = ((span.end_ms - span.start_ms) as f64 * scale).max(1.0) as usize;
            let mark = if span.success { "#" } else { "x" };

            let mut bar = " ".repeat(start_pos);
            bar.push_str(&mark.repeat(width));

            output.push_str(&format!(
                "{:12} |{:50}| ({} ms)\n",
                truncate(&span.step_id, 12),
                bar,
                span.end_ms - span.start_ms
            ));
        }

        output.push_str(&format!("\nTotal: {} ms\n", total_time));
        output
    }
}

impl Default for ExecutionTimeline {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for ExecutionTimeline {
    fn emit(&self, event: ExecutionEvent) {
        let step_event = match &event {
            ExecutionEvent::StepStarted {
                workflow_id,
                step_id,
                ..
            } => Some((workflow_id, step_id, EventType::Started)),
            ExecutionEvent::StepEnded {
                workflow_id,
                step_id,
                success,
                ..
            } => Some((
                workflow_id,
                step_id,
                if *success {
                    EventType::Completed
                } else {
                    EventType::Failed
                },
            )),
            _ => None,
        };
        let step_event = step_event.map(|(workflow_id, step_id, event_type)| TimelineEvent {
            workflow_id: workflow_id.clone(),
            step_id: step_id.clone(),
            event_type,
            timestamp: Instant::now(),
        });

        let mut recorded = self.lock();
        if let Some(step_event) = step_event {
            recorded.step_events.push(step_event);
        }
        recorded.events.push(event);
    }
}

/// Truncates a string to a maximum length.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        format!("{:width$}", s, width = max_len)
    } else {
        let head: String = s.chars().take(max_len - 3).collect();
        format!("{}...", head)
    }
}
