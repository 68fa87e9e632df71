//! Core data model.
//!
//! A work item is one unit of schedulable work: an identity, a payload the
//! operation consumes, and a retry count that only the dispatcher touches.

pub mod post;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Work Item
// ---------------------------------------------------------------------------

/// A unit of work tracked by the dispatcher.
#[derive(Debug, Clone)]
pub struct WorkItem<P> {
    /// Stable identity token.
    pub id: WorkId,

    /// Position in the generated sequence (0-based). Used in log lines.
    pub index: usize,

    /// What the operation consumes. The dispatcher never looks inside.
    pub payload: P,

    /// Number of times this item has been re-queued after a failure.
    retries: u32,
}

impl<P> WorkItem<P> {
    pub fn new(index: usize, payload: P) -> Self {
        Self {
            id: WorkId::new(),
            index,
            payload,
            retries: 0,
        }
    }

    /// How many retry passes this item has been queued for so far.
    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub(crate) fn record_retry(&mut self) {
        self.retries += 1;
    }
}

/// Newtype for work item IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkId(pub Uuid);

impl WorkId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for WorkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Short display: first 8 chars of UUID
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

impl Default for WorkId {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// Why a single execution failed. Carried back to the reporter, never
/// raised as a run-level error.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct Failure {
    /// Short machine-friendly category (e.g. "auth", "timeout", "exit").
    pub kind: String,
    pub message: String,
    /// Optional diagnostic detail such as captured stderr.
    pub trace: Option<String>,
}

impl Failure {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            trace: None,
        }
    }

    pub fn with_trace(mut self, trace: impl Into<String>) -> Self {
        self.trace = Some(trace.into());
        self
    }
}

/// Result of executing one work item. The success value is opaque to the
/// dispatcher; only `Err` is inspected.
pub type Outcome<T> = std::result::Result<T, Failure>;
