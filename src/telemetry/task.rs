//! Span helpers for task attempts.
//!
//! Every attempt gets its own `task.execute` span. Lane state changes and
//! the attempt's outcome are recorded on it.

use std::time::Duration;

use tracing::Span;

use crate::engine::LaneState;
use crate::model::WorkId;

/// Open the span for one attempt. `task.outcome` and `task.duration_ms`
/// start empty and are filled in by [`record_outcome`].
pub fn start_task_span(pass: u32, lane: usize, index: usize, id: &WorkId) -> Span {
    tracing::info_span!(
        "task.execute",
        "task.pass" = pass,
        "task.lane" = lane,
        "task.index" = index,
        "task.id" = %id.0,
        "task.outcome" = tracing::field::Empty,
        "task.duration_ms" = tracing::field::Empty,
    )
}

pub fn record_outcome(span: &Span, ok: bool, elapsed: Duration) {
    span.record("task.outcome", if ok { "success" } else { "failure" });
    span.record("task.duration_ms", elapsed.as_millis() as u64);
}

/// Emit a `lane_transition` event inside `span`.
pub fn record_lane_transition(span: &Span, lane: usize, from: LaneState, to: LaneState) {
    span.in_scope(|| {
        tracing::trace!(lane, from = %from, to = %to, "lane_transition");
    });
}
