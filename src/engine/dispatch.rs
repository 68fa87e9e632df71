//! Bulk dispatch.
//!
//! A run is a sequence of passes. Each pass starts up to `concurrency` lanes
//! (never more than it has items) over one shared queue and ends when every
//! lane has drained it. Items that
//! failed with retries left are collected in the pass's retry set; if that
//! set is non-empty it becomes the queue of the next pass. The run ends
//! after the first pass whose retry set comes back empty.
//!
//! An operation that never returns holds its lane forever. There is no
//! run-wide timeout; operations are expected to bound their own work.

use std::iter::Fuse;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use futures::future::join_all;
use opentelemetry::KeyValue;
use tracing::{debug, info, warn};

use crate::model::{Failure, Outcome, WorkId, WorkItem};
use crate::operation::Operation;
use crate::report::Reporter;
use crate::telemetry::metrics;

use super::lane;

/// Lane count used when none is configured.
pub const DEFAULT_CONCURRENCY: usize = 20;

/// Dispatch policy.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchConfig {
    /// Number of lanes per pass.
    pub concurrency: usize,
    /// Minimum time between task starts on the same lane.
    pub delay: Option<Duration>,
    /// Minimum time between the start of a failed task and the lane's next
    /// task. Skipped when the task succeeds.
    pub error_delay: Option<Duration>,
    /// How many extra passes a failing item may take part in.
    pub retry_limit: u32,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            delay: None,
            error_delay: None,
            retry_limit: 0,
        }
    }
}

/// An item that failed on its last allowed attempt.
#[derive(Debug, Clone)]
pub struct TerminalFailure {
    pub id: WorkId,
    pub index: usize,
    /// Total executions of this item, including the first.
    pub attempts: u32,
    pub failure: Failure,
}

/// What a finished run did.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub passes: u32,
    /// Operation invocations across all passes.
    pub executions: usize,
    pub succeeded: usize,
    /// Re-queue events (an item retried twice counts twice).
    pub retried: usize,
    /// Terminal failures, in the order they were decided.
    pub failed: Vec<TerminalFailure>,
}

impl RunSummary {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Pass state
// ---------------------------------------------------------------------------

/// Failed items waiting for the next pass. Lanes only append; the items
/// are taken out once, after every lane of the pass has finished.
struct RetrySet<P> {
    items: Mutex<Vec<WorkItem<P>>>,
}

impl<P> RetrySet<P> {
    fn new() -> Self {
        Self {
            items: Mutex::new(Vec::new()),
        }
    }

    fn push(&self, item: WorkItem<P>) {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(item);
    }

    fn into_items(self) -> Vec<WorkItem<P>> {
        self.items
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Run-wide counters, shared by every pass.
#[derive(Default)]
struct Tally {
    executions: AtomicUsize,
    succeeded: AtomicUsize,
    retried: AtomicUsize,
    failed: Mutex<Vec<TerminalFailure>>,
}

impl Tally {
    fn into_summary(self, passes: u32) -> RunSummary {
        RunSummary {
            passes,
            executions: self.executions.into_inner(),
            succeeded: self.succeeded.into_inner(),
            retried: self.retried.into_inner(),
            failed: self
                .failed
                .into_inner()
                .unwrap_or_else(PoisonError::into_inner),
        }
    }
}

/// One pass: a shared queue, the lanes draining it, and the retry set they
/// fill.
pub(crate) struct Pass<'a, O: Operation, It> {
    number: u32,
    dispatcher: &'a Dispatcher<O>,
    // Held only for the duration of a single `next()`.
    queue: tokio::sync::Mutex<Fuse<It>>,
    retry: RetrySet<O::Payload>,
    tally: &'a Tally,
}

impl<O, It> Pass<'_, O, It>
where
    O: Operation,
    It: Iterator<Item = WorkItem<O::Payload>>,
{
    pub(crate) fn number(&self) -> u32 {
        self.number
    }

    pub(crate) fn dispatcher(&self) -> &Dispatcher<O> {
        self.dispatcher
    }

    pub(crate) async fn next_item(&self) -> Option<WorkItem<O::Payload>> {
        self.queue.lock().await.next()
    }

    /// Decide what happens to an item after an attempt.
    pub(crate) fn settle(&self, mut item: WorkItem<O::Payload>, outcome: Outcome<O::Output>) {
        let failure = match outcome {
            Ok(_) => {
                self.tally.succeeded.fetch_add(1, Ordering::Relaxed);
                return;
            }
            Err(failure) => failure,
        };

        let limit = self.dispatcher.config.retry_limit;
        if item.retries() < limit {
            item.record_retry();
            info!(
                index = item.index,
                task = %item.id,
                retry = item.retries(),
                limit,
                "task queued for retry"
            );
            metrics::task_retries().add(1, &[]);
            self.tally.retried.fetch_add(1, Ordering::Relaxed);
            self.retry.push(item);
            return;
        }

        warn!(
            index = item.index,
            task = %item.id,
            attempts = item.retries() + 1,
            "task failed terminally: {failure}"
        );
        metrics::task_failures().add(1, &[KeyValue::new("terminal", true)]);
        for reporter in &self.dispatcher.reporters {
            reporter.task_dead(&item, &failure);
        }
        self.tally
            .failed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(TerminalFailure {
                id: item.id,
                index: item.index,
                attempts: item.retries() + 1,
                failure,
            });
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Runs work items through an operation with bounded concurrency, pacing,
/// error cooldown and retry passes.
pub struct Dispatcher<O: Operation> {
    operation: O,
    config: DispatchConfig,
    reporters: Vec<Box<dyn Reporter<O::Payload, O::Output>>>,
}

impl<O: Operation> Dispatcher<O> {
    pub fn new(operation: O, config: DispatchConfig) -> Self {
        Self {
            operation,
            config,
            reporters: Vec::new(),
        }
    }

    pub fn with_reporter(mut self, reporter: impl Reporter<O::Payload, O::Output> + 'static) -> Self {
        self.reporters.push(Box::new(reporter));
        self
    }

    pub fn operation(&self) -> &O {
        &self.operation
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    fn lane_count(&self) -> usize {
        self.config.concurrency.max(1)
    }

    /// Run every item to completion (success or exhausted retries), then
    /// notify reporters that the run is complete.
    pub async fn run<I>(&self, items: I) -> RunSummary
    where
        I: IntoIterator<Item = WorkItem<O::Payload>>,
        I::IntoIter: Send,
    {
        if self.config.concurrency == 0 {
            warn!("concurrency 0 requested, running with a single lane");
        }
        info!(
            concurrency = self.lane_count(),
            retry_limit = self.config.retry_limit,
            delay = ?self.config.delay,
            error_delay = ?self.config.error_delay,
            "dispatch started"
        );

        let tally = Tally::default();
        let mut passes = 1;
        let mut retry = self.run_pass(passes, items.into_iter(), &tally).await;

        while !retry.is_empty() {
            passes += 1;
            info!(pass = passes, items = retry.len(), "starting retry pass");
            retry = self.run_pass(passes, retry.into_iter(), &tally).await;
        }

        let summary = tally.into_summary(passes);
        info!(
            passes = summary.passes,
            executions = summary.executions,
            succeeded = summary.succeeded,
            failed = summary.failed.len(),
            "dispatch completed"
        );
        for reporter in &self.reporters {
            reporter.run_completed(&summary);
        }
        summary
    }

    async fn run_pass<It>(&self, number: u32, items: It, tally: &Tally) -> Vec<WorkItem<O::Payload>>
    where
        It: Iterator<Item = WorkItem<O::Payload>> + Send,
    {
        metrics::dispatch_passes().add(1, &[]);
        // A lane beyond the number of items left would only observe an
        // empty queue.
        let lanes = match items.size_hint().1 {
            Some(upper) => self.lane_count().min(upper),
            None => self.lane_count(),
        };
        let pass = Pass {
            number,
            dispatcher: self,
            queue: tokio::sync::Mutex::new(items.fuse()),
            retry: RetrySet::new(),
            tally,
        };

        let executed: usize = join_all((0..lanes).map(|id| lane::run(&pass, id)))
            .await
            .into_iter()
            .sum();
        tally.executions.fetch_add(executed, Ordering::Relaxed);

        let retry = pass.retry.into_items();
        debug!(pass = number, lanes, executed, retry = retry.len(), "pass drained");
        retry
    }

    pub(crate) fn notify_started(&self, item: &WorkItem<O::Payload>) {
        for reporter in &self.reporters {
            reporter.task_started(item);
        }
    }

    pub(crate) fn notify_finished(
        &self,
        item: &WorkItem<O::Payload>,
        outcome: &Outcome<O::Output>,
        elapsed: Duration,
    ) {
        metrics::task_executions().add(1, &[KeyValue::new("success", outcome.is_ok())]);
        metrics::task_duration_ms().record(elapsed.as_secs_f64() * 1000.0, &[]);
        for reporter in &self.reporters {
            reporter.task_finished(item, outcome);
        }
    }
}
