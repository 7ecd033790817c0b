//! Tracing initialization and span helpers.
//!
//! Console subscriber with env-filter support: `RUST_LOG` wins, the
//! configured level is the fallback. One init per process; tests that want
//! output call it and shrug off the second-init error.

use tracing::Span;

use crate::error::{Error, Result};
use crate::model::CompletionStatus;
use crate::table::WorkId;

/// Initialize the tracing subscriber.
///
/// # Errors
///
/// Returns an error if a subscriber was already installed.
pub fn init_telemetry(default_level: &str) -> Result<()> {
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::layer::SubscriberExt as _;
    use tracing_subscriber::util::SubscriberInitExt as _;

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .map_err(|e| Error::Other(format!("failed to init tracing subscriber: {e}")))?;

    Ok(())
}

/// Span for one completion dispatch. Everything the complete callback logs
/// lands inside it.
pub fn completion_span(work_id: WorkId, status: CompletionStatus) -> Span {
    tracing::info_span!(
        "work.complete",
        "work.id" = %work_id,
        "work.status" = %status,
    )
}
