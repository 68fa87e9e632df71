//! Worker lanes.
//!
//! A lane pulls items from the pass's shared queue one at a time and runs
//! each through the operation, applying pacing and error cooldown around
//! it. The lane ends when the queue is exhausted.

use std::fmt;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{Instrument, debug, info, warn};

use crate::model::WorkItem;
use crate::operation::Operation;
use crate::telemetry::task::{record_lane_transition, record_outcome, start_task_span};

use super::dispatch::Pass;
use super::timer::{Cancelled, Cooldown, Pacing};

/// Where a lane is in its loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaneState {
    /// Between items.
    Idle,
    /// Awaiting the operation.
    Running,
    /// Waiting out the pacing delay.
    Delaying,
    /// Waiting out the error cooldown.
    ErrorCooling,
    /// Queue exhausted. Terminal.
    Drained,
}

impl LaneState {
    pub fn can_transition_to(self, to: LaneState) -> bool {
        use LaneState::*;
        matches!(
            (self, to),
            (Idle, Running)
                | (Idle, Drained)
                | (Running, Delaying)
                | (Running, ErrorCooling)
                | (Running, Idle)
                | (Delaying, ErrorCooling)
                | (Delaying, Idle)
                | (ErrorCooling, Idle)
        )
    }

    pub fn is_terminal(self) -> bool {
        self == LaneState::Drained
    }
}

impl fmt::Display for LaneState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LaneState::Idle => "idle",
            LaneState::Running => "running",
            LaneState::Delaying => "delaying",
            LaneState::ErrorCooling => "error_cooling",
            LaneState::Drained => "drained",
        };
        write!(f, "{s}")
    }
}

struct Lane {
    id: usize,
    state: LaneState,
}

impl Lane {
    fn enter(&mut self, to: LaneState, span: &tracing::Span) {
        debug_assert!(
            self.state.can_transition_to(to),
            "lane {} cannot go {} -> {}",
            self.id,
            self.state,
            to
        );
        record_lane_transition(span, self.id, self.state, to);
        self.state = to;
    }
}

/// Drive one lane until the pass queue is empty. Returns the number of
/// items this lane executed.
pub(crate) async fn run<O, It>(pass: &Pass<'_, O, It>, id: usize) -> usize
where
    O: Operation,
    It: Iterator<Item = WorkItem<O::Payload>> + Send,
{
    let dispatcher = pass.dispatcher();
    let config = dispatcher.config();
    let mut lane = Lane {
        id,
        state: LaneState::Idle,
    };
    let mut executed = 0;

    while let Some(item) = pass.next_item().await {
        let span = start_task_span(pass.number(), id, item.index, &item.id);

        // Both timers start with the task, so they overlap its runtime.
        let pacing = config.delay.map(Pacing::start);
        let cooldown = config.error_delay.map(Cooldown::start);

        lane.enter(LaneState::Running, &span);
        info!(
            pass = pass.number(),
            lane = id,
            index = item.index,
            task = %item.id,
            retries = item.retries(),
            "task started"
        );
        dispatcher.notify_started(&item);

        let started = Instant::now();
        let outcome = dispatcher
            .operation()
            .execute(&item)
            .instrument(span.clone())
            .await;
        let elapsed = started.elapsed();
        executed += 1;

        record_outcome(&span, outcome.is_ok(), elapsed);
        match &outcome {
            Ok(_) => info!(
                index = item.index,
                task = %item.id,
                duration_ms = millis(elapsed),
                "task succeeded"
            ),
            Err(failure) => warn!(
                index = item.index,
                task = %item.id,
                duration_ms = millis(elapsed),
                kind = %failure.kind,
                "task failed: {}",
                failure.message
            ),
        }
        dispatcher.notify_finished(&item, &outcome, elapsed);

        if let Some(pacing) = pacing {
            lane.enter(LaneState::Delaying, &span);
            pacing.wait().await;
        }

        if let Some(cooldown) = cooldown {
            if outcome.is_err() {
                lane.enter(LaneState::ErrorCooling, &span);
                let remaining = cooldown.remaining();
                if !remaining.is_zero() {
                    debug!(lane = id, remaining_ms = millis(remaining), "error cooldown");
                }
                cooldown.wait().await;
            } else {
                match cooldown.cancel() {
                    Cancelled::Pending { remaining } => {
                        debug!(lane = id, remaining_ms = millis(remaining), "cooldown cancelled")
                    }
                    Cancelled::AlreadyElapsed => {}
                }
            }
        }

        pass.settle(item, outcome);
        lane.enter(LaneState::Idle, &span);
    }

    lane.enter(LaneState::Drained, &tracing::Span::current());
    debug!(pass = pass.number(), lane = id, executed, "lane drained");
    executed
}

fn millis(d: Duration) -> u64 {
    d.as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lane_state_machine() {
        use LaneState::*;
        assert!(Idle.can_transition_to(Running));
        assert!(Running.can_transition_to(Delaying));
        assert!(Delaying.can_transition_to(ErrorCooling));
        assert!(ErrorCooling.can_transition_to(Idle));
        assert!(Idle.can_transition_to(Drained));

        assert!(!Running.can_transition_to(Drained));
        assert!(!ErrorCooling.can_transition_to(Delaying));
        assert!(!Drained.can_transition_to(Idle));
        assert!(Drained.is_terminal());
        assert!(!Idle.is_terminal());
    }

    #[test]
    fn lane_state_display() {
        assert_eq!(LaneState::ErrorCooling.to_string(), "error_cooling");
        assert_eq!(LaneState::Drained.to_string(), "drained");
    }
}
