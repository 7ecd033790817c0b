//! Engine-side event loop: the single consumer that runs completion callbacks.
//!
//! Workers never call into the engine directly. The pool's done slot posts a
//! completion message carrying the work handle and the pool status; this loop
//! receives messages in order, maps each pool status to a domain status, and
//! runs the complete callback inside a handle scope. One consumer is what
//! makes engine placement and per-item ordering structural rather than
//! assumed.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::env::EngineEnv;
use crate::event::{EventKind, EventLog};
use crate::manager::AsyncWorkManager;
use crate::model::{CompletionStatus, WorkState};
use crate::pool::{PoolStatus, WorkerPool};
use crate::table::{WorkId, WorkTable};
use crate::telemetry;

/// Default capacity of the bridge event ring.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Message posted to the engine loop.
#[derive(Debug)]
pub(crate) enum EngineMessage {
    /// A pool job settled; run the item's completion.
    Completion { work: WorkId, status: PoolStatus },
    /// Stop the loop after everything already posted has been dispatched.
    Shutdown,
}

/// Posting side of the loop. Cheap to clone; carried by each work item to
/// locate the loop, never owning it.
#[derive(Debug, Clone)]
pub(crate) struct EngineHandle {
    tx: mpsc::UnboundedSender<EngineMessage>,
}

impl EngineHandle {
    pub(crate) fn new(tx: mpsc::UnboundedSender<EngineMessage>) -> Self {
        Self { tx }
    }

    pub(crate) fn post(&self, message: EngineMessage) {
        if self.tx.send(message).is_err() {
            warn!("engine loop is gone; message dropped");
        }
    }
}

/// The engine loop. Owns the receiving end of the message channel; every
/// completion callback in the bridge runs inside `run`.
pub struct EventLoop {
    rx: mpsc::UnboundedReceiver<EngineMessage>,
    env: Arc<EngineEnv>,
    table: Arc<Mutex<WorkTable>>,
    events: Arc<EventLog>,
}

impl EventLoop {
    /// Wire up a loop and the work manager bound to it.
    pub fn new(pool: Arc<dyn WorkerPool>) -> (EventLoop, AsyncWorkManager) {
        Self::with_event_capacity(pool, DEFAULT_EVENT_CAPACITY)
    }

    pub fn with_event_capacity(
        pool: Arc<dyn WorkerPool>,
        event_capacity: usize,
    ) -> (EventLoop, AsyncWorkManager) {
        let (tx, rx) = mpsc::unbounded_channel();
        let table = Arc::new(Mutex::new(WorkTable::new()));
        let events = Arc::new(EventLog::with_capacity(event_capacity));
        let env = Arc::new(EngineEnv::new());
        let manager = AsyncWorkManager::new(
            pool,
            EngineHandle::new(tx),
            Arc::clone(&table),
            Arc::clone(&events),
        );
        let event_loop = EventLoop {
            rx,
            env,
            table,
            events,
        };
        (event_loop, manager)
    }

    /// The env completion callbacks run against. Grab a clone before `run`
    /// consumes the loop.
    pub fn env(&self) -> Arc<EngineEnv> {
        Arc::clone(&self.env)
    }

    /// Receive until shutdown, dispatching completions in arrival order.
    pub async fn run(mut self) {
        info!("engine loop started");
        while let Some(message) = self.rx.recv().await {
            match message {
                EngineMessage::Completion { work, status } => {
                    self.dispatch_completion(work, status);
                }
                EngineMessage::Shutdown => {
                    debug!("shutdown message received");
                    break;
                }
            }
        }
        info!("engine loop stopped");
    }

    /// The done-slot path: map pool status to domain status, take the
    /// completion callback, and invoke it inside a fresh handle scope.
    fn dispatch_completion(&self, work: WorkId, status: PoolStatus) {
        let domain = CompletionStatus::from(status);

        let complete = {
            let mut table = self.table.lock().unwrap();
            let Some(item) = table.get_mut(work) else {
                warn!(id = %work, "completion for unknown work item");
                return;
            };
            let next = match domain {
                CompletionStatus::Ok => WorkState::Completed,
                CompletionStatus::Cancelled => WorkState::Cancelled,
                CompletionStatus::GenericFailure => WorkState::Failed,
            };
            if !item.state.can_transition_to(next) {
                warn!(
                    id = %work,
                    from = %item.state,
                    to = %next,
                    "unexpected completion transition"
                );
            }
            item.state = next;
            item.completed_at = Some(chrono::Utc::now());
            let Some(complete) = item.complete.take() else {
                warn!(id = %work, "completion callback already taken");
                return;
            };
            complete
        };

        self.events.record(EventKind::CompletionDispatched {
            id: work,
            status: domain,
        });

        let span = telemetry::completion_span(work, domain);
        let _entered = span.enter();
        debug!("running completion callback");
        {
            // No lock held here; the callback may call back into the manager.
            // Scope closes on every exit path, unwind included.
            let _scope = self.env.open_scope();
            complete(&self.env, domain);
        }

        let retired = {
            let mut table = self.table.lock().unwrap();
            match table.get_mut(work) {
                Some(item) => {
                    item.state = WorkState::Retired;
                    true
                }
                None => false,
            }
        };
        if retired {
            self.events.record(EventKind::WorkRetired { id: work });
        } else {
            debug!("work item deleted itself during completion");
        }
    }
}
