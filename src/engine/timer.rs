//! Lane timers.
//!
//! Both timers are plain deadlines taken when a task starts, so they run
//! concurrently with the task itself. Nothing fires in the background:
//! cancelling a cooldown is a comparison against the clock, which makes
//! "cancelled" versus "already elapsed" an exact answer rather than a race.

use std::time::Duration;

use tokio::time::{Instant, sleep_until};

/// Minimum spacing between task starts on one lane. Never cancelled.
#[derive(Debug, Clone, Copy)]
pub struct Pacing {
    deadline: Instant,
}

impl Pacing {
    pub fn start(period: Duration) -> Self {
        Self {
            deadline: Instant::now() + period,
        }
    }

    /// Wait out whatever is left of the period.
    pub async fn wait(self) {
        sleep_until(self.deadline).await;
    }
}

/// Pause imposed after a failed task. Cancelled when the task succeeds.
#[derive(Debug, Clone, Copy)]
pub struct Cooldown {
    deadline: Instant,
}

/// What happened when a cooldown was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cancelled {
    /// The cooldown still had time left; that time is not waited.
    Pending { remaining: Duration },
    /// The task outlasted the cooldown; there was nothing to cancel.
    AlreadyElapsed,
}

impl Cooldown {
    pub fn start(period: Duration) -> Self {
        Self {
            deadline: Instant::now() + period,
        }
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Wait out whatever is left of the cooldown.
    pub async fn wait(self) {
        sleep_until(self.deadline).await;
    }

    pub fn cancel(self) -> Cancelled {
        match self.remaining() {
            remaining if remaining.is_zero() => Cancelled::AlreadyElapsed,
            remaining => Cancelled::Pending { remaining },
        }
    }
}
