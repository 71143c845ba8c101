//! Step trace side channel.
//!
//! A step configured with `debug` reports what it decoded to a [`Tracer`].
//! The tracer is handed to each parse call through
//! [`ParseOptions`](crate::ParseOptions), so the core holds no global state.
//!
//! # Example
//!
//! ```
//! use binform_core::{ParseOptions, StepOptions, Struct, TraceEvent};
//!
//! let mut layout = Struct::new();
//! layout.add_member("value").read(
//!     binform_core::Primitive::U8,
//!     StepOptions::new().debug(true),
//! );
//!
//! let print = |event: &TraceEvent<'_>| println!("{} @ {}: {}", event.field, event.offset, event.value);
//! layout.parse_with(&[42], ParseOptions::new().start(0).tracer(&print))?;
//! # Ok::<(), binform_core::Error>(())
//! ```

use crate::value::Value;
use std::cell::RefCell;
use tracing::debug;

/// One traced step
#[derive(Debug, Clone, Copy)]
pub struct TraceEvent<'a> {
    /// Name of the member being decoded
    pub field: &'a str,
    /// Kind of step, e.g. `u32`, `pointer`, `string`
    pub step: &'static str,
    /// Offset the step read from
    pub offset: usize,
    /// What the step produced
    pub value: &'a Value,
}

/// Receiver for step traces
pub trait Tracer {
    /// Called once per traced step, in decode order
    fn trace(&self, event: &TraceEvent<'_>);
}

impl<F> Tracer for F
where
    F: Fn(&TraceEvent<'_>),
{
    fn trace(&self, event: &TraceEvent<'_>) {
        self(event)
    }
}

/// Forwards traces to the `tracing` crate at DEBUG level
#[derive(Debug, Default, Clone, Copy)]
pub struct LogTracer;

impl Tracer for LogTracer {
    fn trace(&self, event: &TraceEvent<'_>) {
        debug!(
            field = event.field,
            step = event.step,
            offset = event.offset,
            "decoded {}",
            event.value
        );
    }
}

/// Discards all traces
#[derive(Debug, Default, Clone, Copy)]
pub struct NullTracer;

impl Tracer for NullTracer {
    fn trace(&self, _event: &TraceEvent<'_>) {}
}

/// Owned copy of a [`TraceEvent`]
#[derive(Debug, Clone, PartialEq)]
pub struct TracedStep {
    /// Name of the member being decoded
    pub field: String,
    /// Kind of step
    pub step: &'static str,
    /// Offset the step read from
    pub offset: usize,
    /// What the step produced
    pub value: Value,
}

/// Collects every trace for later inspection
#[derive(Debug, Default)]
pub struct RecordingTracer {
    steps: RefCell<Vec<TracedStep>>,
}

impl RecordingTracer {
    /// Creates an empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the recorded steps, leaving the recorder empty
    pub fn take(&self) -> Vec<TracedStep> {
        self.steps.take()
    }

    /// Number of steps recorded so far
    pub fn len(&self) -> usize {
        self.steps.borrow().len()
    }

    /// Returns true if nothing was recorded
    pub fn is_empty(&self) -> bool {
        self.steps.borrow().is_empty()
    }
}

impl Tracer for RecordingTracer {
    fn trace(&self, event: &TraceEvent<'_>) {
        self.steps.borrow_mut().push(TracedStep {
            field: event.field.to_string(),
            step: event.step,
            offset: event.offset,
            value: event.value.clone(),
        });
    }
}
