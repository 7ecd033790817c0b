//! Error types for workbridge.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// A required callback was missing at creation time. Synchronous and
    /// fail-fast: nothing is allocated.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// The handle does not refer to a live work item (bad slot or stale
    /// generation).
    #[error("unknown work item: {0}")]
    UnknownWork(crate::table::WorkId),

    #[error("invalid state transition: {from} -> {to}")]
    InvalidTransition {
        from: crate::model::WorkState,
        to: crate::model::WorkState,
    },

    /// Delete refused: the item still owes its completion callback.
    #[error("work item {id} is {state}; it cannot be deleted until its completion has run")]
    InFlight {
        id: crate::table::WorkId,
        state: crate::model::WorkState,
    },

    /// The pool rejected a submission or cancellation request. The message is
    /// the pool's own diagnostic.
    #[error("pool error: {0}")]
    Pool(#[from] crate::pool::PoolError),

    #[error("config error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
