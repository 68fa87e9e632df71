//! Run reporting hooks.
//!
//! The dispatcher logs through `tracing` on its own. Reporters are for
//! callers that need to act on progress: writing result files, collecting
//! failures, signalling completion. Every hook has a no-op default.

use crate::engine::RunSummary;
use crate::model::{Failure, Outcome, WorkItem};

pub trait Reporter<P, T>: Send + Sync {
    /// An attempt is about to execute.
    fn task_started(&self, _item: &WorkItem<P>) {}

    /// An attempt finished, successfully or not.
    fn task_finished(&self, _item: &WorkItem<P>, _outcome: &Outcome<T>) {}

    /// An item failed and has no retries left. Called once per such item,
    /// always before [`Reporter::run_completed`].
    fn task_dead(&self, _item: &WorkItem<P>, _failure: &Failure) {}

    /// The final pass ended with nothing left to retry. Called exactly once
    /// per run.
    fn run_completed(&self, _summary: &RunSummary) {}
}
