//! The async work manager: create, queue, cancel, delete.
//!
//! Addon-facing surface of the bridge. Owns the handle table, the pool
//! handles, and the posting side of the engine loop. The discipline
//! throughout: validate before allocating, and never run caller callbacks
//! while holding a lock.

use std::sync::{Arc, Mutex};

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::event::{Event, EventKind, EventLog};
use crate::event_loop::{EngineHandle, EngineMessage};
use crate::model::{WorkCounts, WorkSnapshot, WorkSpec, WorkState};
use crate::pool::{PoolJob, PoolStatus, WorkerPool};
use crate::table::{WorkId, WorkItem, WorkTable};

/// Handle to the bridge. Clones share the same table, pool, and loop, so the
/// manager can be handed to callbacks and host code alike.
#[derive(Clone)]
pub struct AsyncWorkManager {
    pool: Arc<dyn WorkerPool>,
    engine: EngineHandle,
    table: Arc<Mutex<WorkTable>>,
    events: Arc<EventLog>,
}

impl AsyncWorkManager {
    pub(crate) fn new(
        pool: Arc<dyn WorkerPool>,
        engine: EngineHandle,
        table: Arc<Mutex<WorkTable>>,
        events: Arc<EventLog>,
    ) -> Self {
        Self {
            pool,
            engine,
            table,
            events,
        }
    }

    // -----------------------------------------------------------------------
    // Lifecycle operations
    // -----------------------------------------------------------------------

    /// Validate a spec and allocate its work item.
    ///
    /// Both callback slots are required; a missing one fails with
    /// `InvalidArgument` before any pool handle or table slot exists.
    pub fn create(&self, spec: WorkSpec) -> Result<WorkId> {
        let WorkSpec {
            resource_name,
            resource_tag,
            execute,
            complete,
        } = spec;
        let Some(execute) = execute else {
            return Err(Error::InvalidArgument("execute callback is required"));
        };
        let Some(complete) = complete else {
            return Err(Error::InvalidArgument("complete callback is required"));
        };

        let pool_handle = self.pool.register()?;
        let item = WorkItem {
            resource_name: resource_name.clone(),
            resource_tag,
            pool_handle,
            engine: self.engine.clone(),
            execute: Some(execute),
            complete: Some(complete),
            state: WorkState::Created,
            created_at: Utc::now(),
            completed_at: None,
        };
        let id = self.table.lock().unwrap().insert(item);

        self.events.record(EventKind::WorkCreated {
            id,
            resource_name: resource_name.clone(),
        });
        debug!(id = %id, resource = %resource_name, handle = %pool_handle, "work item created");
        Ok(id)
    }

    /// Submit a created item to the pool.
    ///
    /// The run slot takes the execute callback out of the table at dispatch
    /// time, so a rejected submission consumes nothing and the item stays
    /// `Created`. Rejections surface as `Error::Pool` with the pool's
    /// diagnostic.
    pub fn queue(&self, id: WorkId) -> Result<()> {
        let mut table = self.table.lock().unwrap();
        let Some(item) = table.get_mut(id) else {
            return Err(Error::UnknownWork(id));
        };
        if item.state != WorkState::Created {
            return Err(Error::InvalidTransition {
                from: item.state,
                to: WorkState::Queued,
            });
        }

        let run_table = Arc::clone(&self.table);
        let run_events = Arc::clone(&self.events);
        let engine = item.engine.clone();
        let job = PoolJob {
            run: Box::new(move || run_execute(&run_table, &run_events, id)),
            done: Box::new(move |status: PoolStatus| {
                engine.post(EngineMessage::Completion { work: id, status });
            }),
        };

        self.pool.submit(item.pool_handle, job)?;
        item.state = WorkState::Queued;
        // Recorded under the table lock: the run slot relocks the table before
        // it can record anything, so queued always precedes started.
        self.events.record(EventKind::WorkQueued { id });
        drop(table);

        debug!(id = %id, "work item queued");
        Ok(())
    }

    /// Ask the pool to cancel a queued item.
    ///
    /// The pool's answer is authoritative: success means the run slot will
    /// never execute and completion arrives with `Cancelled`. Once a worker
    /// has started the item the call fails, and the item still completes
    /// `Ok`.
    pub fn cancel(&self, id: WorkId) -> Result<()> {
        let pool_handle = {
            let table = self.table.lock().unwrap();
            let Some(item) = table.get(id) else {
                return Err(Error::UnknownWork(id));
            };
            item.pool_handle
        };
        self.pool.request_cancel(pool_handle)?;
        debug!(id = %id, "cancellation accepted");
        Ok(())
    }

    /// Release an item and its pool handle.
    ///
    /// Refused while the item is queued or executing; stale handles are
    /// refused as unknown. Legal from inside the item's own completion
    /// callback.
    pub fn delete(&self, id: WorkId) -> Result<()> {
        let item = {
            let mut table = self.table.lock().unwrap();
            let Some(item) = table.get(id) else {
                return Err(Error::UnknownWork(id));
            };
            if item.state.in_flight() {
                return Err(Error::InFlight {
                    id,
                    state: item.state,
                });
            }
            let Some(item) = table.remove(id) else {
                return Err(Error::UnknownWork(id));
            };
            item
        };
        self.pool.release(item.pool_handle)?;

        self.events.record(EventKind::WorkDeleted { id });
        debug!(id = %id, state = %item.state, "work item deleted");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Introspection
    // -----------------------------------------------------------------------

    /// Read-only view of one item.
    pub fn snapshot(&self, id: WorkId) -> Result<WorkSnapshot> {
        let table = self.table.lock().unwrap();
        let Some(item) = table.get(id) else {
            return Err(Error::UnknownWork(id));
        };
        Ok(item.snapshot(id))
    }

    /// Live items per state.
    pub fn counts(&self) -> WorkCounts {
        self.table.lock().unwrap().counts()
    }

    /// Items currently tracked by the table.
    pub fn live_work(&self) -> usize {
        self.table.lock().unwrap().len()
    }

    /// Bridge events with seq strictly greater than `since_seq`.
    pub fn events_since(&self, since_seq: u64) -> Vec<Event> {
        self.events.events_since(since_seq)
    }

    /// Stop the bridge: the pool rejects new work and cancels everything
    /// still pending, then the loop drains what was already posted and
    /// exits. Items still executing may settle after the loop has stopped;
    /// hosts that need every callback drain completions first.
    pub fn shutdown(&self) {
        info!("bridge shutting down");
        self.pool.shutdown();
        self.engine.post(EngineMessage::Shutdown);
    }
}

/// Run-slot wrapper: mark the item executing and take its execute callback
/// out of the table at dispatch time. Runs on a worker thread.
fn run_execute(table: &Mutex<WorkTable>, events: &EventLog, id: WorkId) {
    let execute = {
        let mut table = table.lock().unwrap();
        match table.get_mut(id) {
            Some(item) => {
                item.state = WorkState::Executing;
                item.execute.take()
            }
            None => None,
        }
    };
    match execute {
        Some(execute) => {
            events.record(EventKind::ExecuteStarted { id });
            execute();
        }
        None => warn!(id = %id, "execute slot empty at dispatch"),
    }
}
