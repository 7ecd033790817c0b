//! Structured events recorded by the bridge on every lifecycle step.
//!
//! Consumers read the stream to audit ordering or drive diagnostics. Events
//! are the bridge's voice; tracing spans are the operator's.

use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::CompletionStatus;
use crate::table::WorkId;

/// A structured event recorded by the bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Monotonic sequence number. Consumers can detect gaps.
    pub seq: u64,
    /// When this event occurred.
    pub timestamp: DateTime<Utc>,
    /// What happened.
    pub kind: EventKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    WorkCreated {
        id: WorkId,
        resource_name: String,
    },
    WorkQueued {
        id: WorkId,
    },
    ExecuteStarted {
        id: WorkId,
    },
    CompletionDispatched {
        id: WorkId,
        status: CompletionStatus,
    },
    WorkRetired {
        id: WorkId,
    },
    WorkDeleted {
        id: WorkId,
    },
}

impl EventKind {
    /// The work item this event is about.
    pub fn work_id(&self) -> WorkId {
        match self {
            EventKind::WorkCreated { id, .. }
            | EventKind::WorkQueued { id }
            | EventKind::ExecuteStarted { id }
            | EventKind::CompletionDispatched { id, .. }
            | EventKind::WorkRetired { id }
            | EventKind::WorkDeleted { id } => *id,
        }
    }
}

struct LogState {
    events: VecDeque<Event>,
    capacity: usize,
    next_seq: u64,
}

/// In-process event ring. Capacity-bounded; when full the oldest event is
/// dropped and `seq` keeps counting, so consumers see the gap.
pub struct EventLog {
    inner: Mutex<LogState>,
}

impl EventLog {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(LogState {
                events: VecDeque::new(),
                capacity: capacity.max(1),
                next_seq: 1,
            }),
        }
    }

    /// Record an event and return it with its sequence number.
    pub(crate) fn record(&self, kind: EventKind) -> Event {
        let mut state = self.inner.lock().unwrap();
        let seq = state.next_seq;
        state.next_seq += 1;
        let event = Event {
            seq,
            timestamp: Utc::now(),
            kind,
        };
        if state.events.len() == state.capacity {
            state.events.pop_front();
        }
        state.events.push_back(event.clone());
        event
    }

    /// Events with seq strictly greater than `since_seq`, oldest first.
    pub fn events_since(&self, since_seq: u64) -> Vec<Event> {
        let state = self.inner.lock().unwrap();
        state
            .events
            .iter()
            .filter(|event| event.seq > since_seq)
            .cloned()
            .collect()
    }
}
