//! Run Monitoring Module
//!
//! Lifecycle notifications emitted by the engine and the sinks that
//! consume them.
//!
//! # Components
//!
//! - [`events`]: Event types, the [`EventSink`] trait and basic sinks
//! - [`timeline`]: In-memory recorder with an ASCII Gantt chart

pub mod events;
pub mod timeline;

pub use events::{
    ChannelEventSink, EventSink, ExecutionEvent, FanOutSink, LogEventSink, NullEventSink,
};
pub use timeline::{EventType, ExecutionTimeline, StepSpan, TimelineEvent};
