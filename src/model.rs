//! Core data model.
//!
//! A work item is one unit of blocking work offloaded to the worker pool: an
//! execute callback run on a worker thread, a complete callback run back on
//! the engine loop, and the lifecycle state the bridge tracks in between.

use serde::{Deserialize, Serialize};

use crate::env::EngineEnv;
use crate::pool::PoolStatus;

// ---------------------------------------------------------------------------
// Callbacks
// ---------------------------------------------------------------------------

/// The off-engine half of a work item. Runs at most once, on a worker thread,
/// and owns everything it captured; it must not touch engine values.
pub type ExecuteFn = Box<dyn FnOnce() + Send + 'static>;

/// The on-engine half. Runs exactly once, on the engine loop, after the
/// execute callback returned or the item was cancelled before starting.
/// Values it creates through the env are scoped to the dispatch.
pub type CompleteFn = Box<dyn FnOnce(&EngineEnv, CompletionStatus) + Send + 'static>;

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Lifecycle state of a work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkState {
    /// Allocated, not yet handed to the pool.
    Created,
    /// Submitted, waiting for a worker.
    Queued,
    /// A worker is running the execute callback.
    Executing,
    /// Execute returned normally; completion pending or in progress.
    Completed,
    /// Cancelled before a worker picked it up; completion pending or in progress.
    Cancelled,
    /// Execute did not return normally; completion pending or in progress.
    Failed,
    /// The complete callback has returned. Terminal.
    Retired,
}

impl WorkState {
    /// Can transition from self to `to`?
    pub fn can_transition_to(self, to: WorkState) -> bool {
        use WorkState::*;
        matches!(
            (self, to),
            (Created, Queued)
                | (Queued, Executing)
                | (Queued, Cancelled)   // cancel won the race, never started
                | (Executing, Completed)
                | (Executing, Failed)   // worker panicked mid-run
                | (Completed, Retired)
                | (Cancelled, Retired)
                | (Failed, Retired)
        )
    }

    /// Is this a terminal state?
    pub fn is_terminal(self) -> bool {
        matches!(self, WorkState::Retired)
    }

    /// Still owed to the pool? Items in these states cannot be deleted.
    pub fn in_flight(self) -> bool {
        matches!(self, WorkState::Queued | WorkState::Executing)
    }
}

impl std::fmt::Display for WorkState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WorkState::Created => "created",
            WorkState::Queued => "queued",
            WorkState::Executing => "executing",
            WorkState::Completed => "completed",
            WorkState::Cancelled => "cancelled",
            WorkState::Failed => "failed",
            WorkState::Retired => "retired",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Completion status
// ---------------------------------------------------------------------------

/// The three-valued status delivered to a complete callback, as distinct from
/// the pool's internal status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionStatus {
    /// The execute callback ran to completion.
    Ok,
    /// The item was cancelled before execution began.
    Cancelled,
    /// Anything else the pool reported.
    GenericFailure,
}

impl From<PoolStatus> for CompletionStatus {
    fn from(status: PoolStatus) -> Self {
        match status {
            PoolStatus::Finished => CompletionStatus::Ok,
            PoolStatus::Canceled => CompletionStatus::Cancelled,
            _ => CompletionStatus::GenericFailure,
        }
    }
}

impl std::fmt::Display for CompletionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CompletionStatus::Ok => "ok",
            CompletionStatus::Cancelled => "cancelled",
            CompletionStatus::GenericFailure => "generic_failure",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Snapshots
// ---------------------------------------------------------------------------

/// Read-only view of one work item. Callback slots and the pool handle stay
/// internal; this is what introspection and the CLI see.
#[derive(Debug, Clone, Serialize)]
pub struct WorkSnapshot {
    pub id: crate::table::WorkId,
    pub resource_name: String,
    pub resource_tag: Option<String>,
    pub state: WorkState,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Live items per state.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WorkCounts {
    pub created: usize,
    pub queued: usize,
    pub executing: usize,
    pub completed: usize,
    pub cancelled: usize,
    pub failed: usize,
    pub retired: usize,
}

impl WorkCounts {
    pub fn total(&self) -> usize {
        self.created
            + self.queued
            + self.executing
            + self.completed
            + self.cancelled
            + self.failed
            + self.retired
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for new work items. The bridge's public API for describing work:
/// both callback slots are required, and `create` validates them before
/// allocating anything.
pub struct WorkSpec {
    pub(crate) resource_name: String,
    pub(crate) resource_tag: Option<String>,
    pub(crate) execute: Option<ExecuteFn>,
    pub(crate) complete: Option<CompleteFn>,
}

impl WorkSpec {
    pub fn new(resource_name: impl Into<String>) -> Self {
        Self {
            resource_name: resource_name.into(),
            resource_tag: None,
            execute: None,
            complete: None,
        }
    }

    /// Opaque diagnostic tag carried into logs and events, never interpreted.
    pub fn resource_tag(mut self, tag: impl Into<String>) -> Self {
        self.resource_tag = Some(tag.into());
        self
    }

    pub fn execute(mut self, f: impl FnOnce() + Send + 'static) -> Self {
        self.execute = Some(Box::new(f));
        self
    }

    pub fn complete(
        mut self,
        f: impl FnOnce(&EngineEnv, CompletionStatus) + Send + 'static,
    ) -> Self {
        self.complete = Some(Box::new(f));
        self
    }
}

impl std::fmt::Debug for WorkSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkSpec")
            .field("resource_name", &self.resource_name)
            .field("resource_tag", &self.resource_tag)
            .field("execute", &self.execute.is_some())
            .field("complete", &self.complete.is_some())
            .finish()
    }
}
