//! Blocking worker pool backed by the tokio blocking thread pool.
//!
//! Dispatcher tasks pull pending submissions from a shared queue and run each
//! job's run slot via `spawn_blocking`, so execute callbacks get a real OS
//! thread and never share the engine loop's thread. A panicking run slot
//! surfaces as a join error and settles the job as `RunFailed`.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use tokio::sync::{Notify, watch};
use tracing::{debug, info, warn};

use super::{PoolError, PoolHandle, PoolJob, PoolStatus, WorkerPool};

enum SlotState {
    /// Registered, nothing queued yet.
    Idle,
    /// Waiting for a worker; owns the job.
    Pending(PoolJob),
    /// A worker has the job; its run slot is executing.
    Running,
    /// The run slot returned (or failed) and the done slot has fired.
    Finished,
    /// Cancelled while pending; the done slot has fired.
    Cancelled,
}

struct PoolState {
    slots: HashMap<u64, SlotState>,
    pending: VecDeque<u64>,
    next_handle: u64,
    closed: bool,
}

/// Worker pool running jobs on the tokio blocking pool.
///
/// A pool spawned with zero workers accepts submissions but never dispatches
/// them, which makes cancel-before-start deterministic in tests.
pub struct BlockingPool {
    state: Arc<Mutex<PoolState>>,
    work_ready: Arc<Notify>,
    shutdown_tx: watch::Sender<bool>,
}

impl BlockingPool {
    /// Start `workers` dispatcher tasks. Must be called from a runtime
    /// context.
    pub fn spawn(workers: usize) -> Self {
        let state = Arc::new(Mutex::new(PoolState {
            slots: HashMap::new(),
            pending: VecDeque::new(),
            next_handle: 1,
            closed: false,
        }));
        let work_ready = Arc::new(Notify::new());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        for worker_id in 0..workers {
            tokio::spawn(dispatcher(
                worker_id,
                Arc::clone(&state),
                Arc::clone(&work_ready),
                shutdown_rx.clone(),
            ));
        }
        debug!(workers, "blocking pool started");

        Self {
            state,
            work_ready,
            shutdown_tx,
        }
    }
}

impl WorkerPool for BlockingPool {
    fn register(&self) -> Result<PoolHandle, PoolError> {
        let mut guard = self.state.lock().unwrap();
        if guard.closed {
            return Err(PoolError::ShuttingDown);
        }
        let id = guard.next_handle;
        guard.next_handle += 1;
        guard.slots.insert(id, SlotState::Idle);
        Ok(PoolHandle(id))
    }

    fn submit(&self, handle: PoolHandle, job: PoolJob) -> Result<(), PoolError> {
        {
            let mut guard = self.state.lock().unwrap();
            let inner = &mut *guard;
            if inner.closed {
                return Err(PoolError::ShuttingDown);
            }
            match inner.slots.get(&handle.0) {
                None => return Err(PoolError::UnknownHandle(handle)),
                Some(SlotState::Idle) => {}
                Some(_) => return Err(PoolError::AlreadyQueued(handle)),
            }
            inner.slots.insert(handle.0, SlotState::Pending(job));
            inner.pending.push_back(handle.0);
        }
        self.work_ready.notify_one();
        Ok(())
    }

    fn request_cancel(&self, handle: PoolHandle) -> Result<(), PoolError> {
        let done = {
            let mut guard = self.state.lock().unwrap();
            let inner = &mut *guard;
            match inner.slots.get_mut(&handle.0) {
                None => return Err(PoolError::UnknownHandle(handle)),
                Some(SlotState::Idle) => return Err(PoolError::NotQueued(handle)),
                Some(SlotState::Running | SlotState::Finished | SlotState::Cancelled) => {
                    return Err(PoolError::Busy(handle));
                }
                Some(slot) => {
                    let SlotState::Pending(job) = std::mem::replace(slot, SlotState::Cancelled)
                    else {
                        return Err(PoolError::Busy(handle));
                    };
                    inner.pending.retain(|&h| h != handle.0);
                    job.done
                }
            }
        };
        // Done slot fires outside the lock, like every other settlement path.
        done(PoolStatus::Canceled);
        Ok(())
    }

    fn release(&self, handle: PoolHandle) -> Result<(), PoolError> {
        let mut guard = self.state.lock().unwrap();
        match guard.slots.get(&handle.0) {
            None => Err(PoolError::UnknownHandle(handle)),
            Some(SlotState::Pending(_) | SlotState::Running) => Err(PoolError::Busy(handle)),
            Some(_) => {
                guard.slots.remove(&handle.0);
                Ok(())
            }
        }
    }

    fn live_handles(&self) -> usize {
        self.state.lock().unwrap().slots.len()
    }

    fn shutdown(&self) {
        let cancelled = {
            let mut guard = self.state.lock().unwrap();
            let inner = &mut *guard;
            if inner.closed {
                return;
            }
            inner.closed = true;
            let mut dones = Vec::new();
            while let Some(handle) = inner.pending.pop_front() {
                let Some(slot) = inner.slots.get_mut(&handle) else {
                    continue;
                };
                if !matches!(*slot, SlotState::Pending(_)) {
                    continue;
                }
                let SlotState::Pending(job) = std::mem::replace(slot, SlotState::Cancelled) else {
                    continue;
                };
                dones.push((handle, job.done));
            }
            dones
        };

        let _ = self.shutdown_tx.send(true);

        if !cancelled.is_empty() {
            info!(
                count = cancelled.len(),
                "cancelling pending submissions at shutdown"
            );
        }
        for (handle, done) in cancelled {
            debug!(handle, "pending submission cancelled by shutdown");
            done(PoolStatus::Canceled);
        }
    }
}

async fn dispatcher(
    worker_id: usize,
    state: Arc<Mutex<PoolState>>,
    work_ready: Arc<Notify>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        if *shutdown_rx.borrow() {
            break;
        }
        match take_next(&state, &work_ready) {
            Some((handle, job)) => {
                debug!(worker = worker_id, handle, "run slot starting");
                let run = job.run;
                let done = job.done;
                let status = match tokio::task::spawn_blocking(move || run()).await {
                    Ok(()) => PoolStatus::Finished,
                    Err(err) => {
                        warn!(
                            worker = worker_id,
                            handle,
                            error = %err,
                            "run slot did not return normally"
                        );
                        PoolStatus::RunFailed
                    }
                };
                {
                    let mut guard = state.lock().unwrap();
                    if let Some(slot) = guard.slots.get_mut(&handle) {
                        *slot = SlotState::Finished;
                    }
                }
                done(status);
            }
            None => {
                tokio::select! {
                    _ = work_ready.notified() => {}
                    _ = shutdown_rx.changed() => {}
                }
            }
        }
    }
    debug!(worker = worker_id, "dispatcher stopped");
}

fn take_next(state: &Mutex<PoolState>, work_ready: &Notify) -> Option<(u64, PoolJob)> {
    let mut guard = state.lock().unwrap();
    let inner = &mut *guard;
    while let Some(handle) = inner.pending.pop_front() {
        let Some(slot) = inner.slots.get_mut(&handle) else {
            continue;
        };
        if !matches!(*slot, SlotState::Pending(_)) {
            // Cancelled between enqueue and pickup; keep scanning.
            continue;
        }
        let SlotState::Pending(job) = std::mem::replace(slot, SlotState::Running) else {
            continue;
        };
        if !inner.pending.is_empty() {
            // A sibling may be parked with no permit stored; wake it.
            work_ready.notify_one();
        }
        return Some((handle, job));
    }
    None
}
