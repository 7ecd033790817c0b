//! Worker pool interface.
//!
//! The bridge consumes the pool through this narrow port: mint a submission
//! handle per work item, submit a job under it, maybe cancel it, release it.
//! The pool owns sizing and fairness; the bridge owns everything above.

use thiserror::Error;

pub mod blocking;

pub use blocking::BlockingPool;

/// Identifier for one pool submission slot. Minted by `register`, released by
/// `release`, exclusively owned by one work item in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PoolHandle(pub(crate) u64);

impl std::fmt::Display for PoolHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Pool-internal completion status, delivered to the done slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolStatus {
    /// The run slot was executed and returned.
    Finished,
    /// The submission was cancelled before a worker picked it up.
    Canceled,
    /// The run slot started but did not return normally.
    RunFailed,
}

/// A queued unit: the run slot (off the engine loop) plus the done slot
/// (fires exactly once, strictly after run returns, or instead of it when
/// cancelled first).
pub struct PoolJob {
    pub run: Box<dyn FnOnce() + Send + 'static>,
    pub done: Box<dyn FnOnce(PoolStatus) + Send + 'static>,
}

/// Pool rejection taxonomy. The Display text is the pool's diagnostic string,
/// carried verbatim on bridge errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PoolError {
    #[error("pool is shutting down")]
    ShuttingDown,

    #[error("submission handle {0} is not registered")]
    UnknownHandle(PoolHandle),

    #[error("submission {0} is already queued")]
    AlreadyQueued(PoolHandle),

    #[error("submission {0} has not been queued")]
    NotQueued(PoolHandle),

    /// The job already ran, is running, or was already cancelled; too late to
    /// cancel or release.
    #[error("submission {0} is already executing or settled")]
    Busy(PoolHandle),
}

/// The thread-pool collaborator.
///
/// Ordering contract, per handle: the done slot is observed strictly after
/// the run slot has returned, or the run slot is never observed at all when
/// cancellation wins. No ordering promise across distinct handles. No
/// timeouts: a submitted job runs until its run slot returns.
pub trait WorkerPool: Send + Sync {
    /// Mint a submission handle. Fails once the pool is shutting down.
    fn register(&self) -> Result<PoolHandle, PoolError>;

    /// Queue a job under a registered, idle handle. At most one submission
    /// per handle at a time.
    fn submit(&self, handle: PoolHandle, job: PoolJob) -> Result<(), PoolError>;

    /// Request cooperative cancellation. Succeeds only while the job is still
    /// waiting for a worker, in which case the done slot fires with
    /// `Canceled` and the run slot never runs. Once a worker has started the
    /// job the request fails and the job runs to normal completion.
    fn request_cancel(&self, handle: PoolHandle) -> Result<(), PoolError>;

    /// Return a handle minted by `register`. Refused while the handle has a
    /// queued or running job.
    fn release(&self, handle: PoolHandle) -> Result<(), PoolError>;

    /// Currently registered handles. Leak checks diff this against a
    /// baseline.
    fn live_handles(&self) -> usize;

    /// Reject new registrations and submissions, and cancel every job still
    /// waiting for a worker (each fires its done slot with `Canceled`). Jobs
    /// already running finish normally.
    fn shutdown(&self);
}
