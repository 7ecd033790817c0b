//! # workbridge
//!
//! Async-work bridge for single-threaded embedding hosts.
//!
//! Blocking callbacks run on a worker pool; completion callbacks run back on
//! the engine loop, bracketed by a handle scope, with create/queue/cancel/
//! delete lifecycle tracking through a generation-checked handle table.

pub mod config;
pub mod env;
pub mod error;
pub mod event;
pub mod event_loop;
pub mod manager;
pub mod model;
pub mod pool;
pub mod table;
pub mod telemetry;
