//! Integration tests for the work item lifecycle: create → queue → complete
//! → delete, plus the contracts the handle table enforces.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio::sync::mpsc::{UnboundedReceiver, unbounded_channel};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use workbridge::error::Error;
use workbridge::event::EventKind;
use workbridge::event_loop::EventLoop;
use workbridge::manager::AsyncWorkManager;
use workbridge::model::{CompletionStatus, WorkSpec, WorkState};
use workbridge::pool::{BlockingPool, WorkerPool};
use workbridge::table::WorkId;

fn start_bridge(workers: usize) -> (AsyncWorkManager, Arc<BlockingPool>, JoinHandle<()>) {
    let pool = Arc::new(BlockingPool::spawn(workers));
    let (event_loop, manager) = EventLoop::new(pool.clone());
    let loop_task = tokio::spawn(event_loop.run());
    (manager, pool, loop_task)
}

async fn recv_status(rx: &mut UnboundedReceiver<CompletionStatus>) -> CompletionStatus {
    timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for completion")
        .expect("completion channel closed")
}

// ---------------------------------------------------------------------------
// Basic lifecycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn execute_then_complete_with_ok() {
    let (manager, pool, _loop_task) = start_bridge(2);

    let counter = Arc::new(AtomicUsize::new(0));
    let (done_tx, mut done_rx) = unbounded_channel();

    let exec_counter = Arc::clone(&counter);
    let id = manager
        .create(
            WorkSpec::new("lifecycle.basic")
                .resource_tag("unit-test")
                .execute(move || {
                    exec_counter.fetch_add(1, Ordering::SeqCst);
                })
                .complete(move |_env, status| {
                    done_tx.send(status).unwrap();
                }),
        )
        .unwrap();

    assert_eq!(manager.snapshot(id).unwrap().state, WorkState::Created);
    manager.queue(id).unwrap();

    let status = recv_status(&mut done_rx).await;
    assert_eq!(status, CompletionStatus::Ok);
    assert_eq!(counter.load(Ordering::SeqCst), 1);

    let snapshot = manager.snapshot(id).unwrap();
    assert_eq!(snapshot.state, WorkState::Retired);
    assert!(snapshot.completed_at.is_some());

    manager.delete(id).unwrap();
    assert_eq!(manager.live_work(), 0);
    assert_eq!(pool.live_handles(), 0);
}

#[tokio::test]
async fn create_without_execute_is_invalid_argument() {
    let (manager, pool, _loop_task) = start_bridge(1);

    let result = manager.create(WorkSpec::new("missing.execute").complete(|_env, _status| {}));

    assert!(matches!(result, Err(Error::InvalidArgument(_))));
    assert_eq!(pool.live_handles(), 0);
    assert_eq!(manager.live_work(), 0);
}

#[tokio::test]
async fn create_without_complete_is_invalid_argument() {
    let (manager, pool, _loop_task) = start_bridge(1);

    let result = manager.create(WorkSpec::new("missing.complete").execute(|| {}));

    assert!(matches!(result, Err(Error::InvalidArgument(_))));
    assert_eq!(pool.live_handles(), 0);
    assert_eq!(manager.live_work(), 0);
}

#[tokio::test]
async fn delete_created_item_without_queueing() {
    let (manager, pool, _loop_task) = start_bridge(1);

    let id = manager
        .create(
            WorkSpec::new("never.queued")
                .execute(|| {})
                .complete(|_env, _status| {}),
        )
        .unwrap();
    assert_eq!(pool.live_handles(), 1);

    manager.delete(id).unwrap();
    assert_eq!(pool.live_handles(), 0);
    assert_eq!(manager.live_work(), 0);
}

#[tokio::test]
async fn queue_twice_is_invalid_transition() {
    let (manager, _pool, _loop_task) = start_bridge(1);

    let (done_tx, mut done_rx) = unbounded_channel();
    let id = manager
        .create(
            WorkSpec::new("double.queue")
                .execute(|| {})
                .complete(move |_env, status| {
                    done_tx.send(status).unwrap();
                }),
        )
        .unwrap();

    manager.queue(id).unwrap();
    let second = manager.queue(id);
    assert!(matches!(second, Err(Error::InvalidTransition { .. })));

    // The first submission is untouched by the failed second attempt.
    assert_eq!(recv_status(&mut done_rx).await, CompletionStatus::Ok);
}

// ---------------------------------------------------------------------------
// Delete is refused in flight
// ---------------------------------------------------------------------------

#[tokio::test]
async fn delete_while_queued_is_refused() {
    // Zero workers: the submission stays pending forever.
    let (manager, pool, _loop_task) = start_bridge(0);

    let (done_tx, mut done_rx) = unbounded_channel();
    let id = manager
        .create(
            WorkSpec::new("stuck.queued")
                .execute(|| {})
                .complete(move |_env, status| {
                    done_tx.send(status).unwrap();
                }),
        )
        .unwrap();
    manager.queue(id).unwrap();

    let refused = manager.delete(id);
    assert!(matches!(refused, Err(Error::InFlight { .. })));

    // Cancel settles it; then delete is legal.
    manager.cancel(id).unwrap();
    assert_eq!(recv_status(&mut done_rx).await, CompletionStatus::Cancelled);
    manager.delete(id).unwrap();
    assert_eq!(pool.live_handles(), 0);
}

#[tokio::test]
async fn delete_while_executing_is_refused() {
    let (manager, pool, _loop_task) = start_bridge(1);

    let (started_tx, mut started_rx) = unbounded_channel();
    let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
    let (done_tx, mut done_rx) = unbounded_channel();

    let id = manager
        .create(
            WorkSpec::new("wedged.executing")
                .execute(move || {
                    started_tx.send(()).unwrap();
                    release_rx.recv().unwrap();
                })
                .complete(move |_env, status| {
                    done_tx.send(status).unwrap();
                }),
        )
        .unwrap();
    manager.queue(id).unwrap();

    timeout(Duration::from_secs(5), started_rx.recv())
        .await
        .expect("timed out waiting for execute to start")
        .expect("start channel closed");
    assert_eq!(manager.snapshot(id).unwrap().state, WorkState::Executing);

    let refused = manager.delete(id);
    assert!(matches!(refused, Err(Error::InFlight { .. })));

    release_tx.send(()).unwrap();
    assert_eq!(recv_status(&mut done_rx).await, CompletionStatus::Ok);
    manager.delete(id).unwrap();
    assert_eq!(pool.live_handles(), 0);
}

#[tokio::test]
async fn delete_inside_completion_callback() {
    let (manager, pool, _loop_task) = start_bridge(1);

    let id_cell: Arc<OnceLock<WorkId>> = Arc::new(OnceLock::new());
    let (done_tx, mut done_rx) = unbounded_channel();

    let callback_manager = manager.clone();
    let callback_cell = Arc::clone(&id_cell);
    let id = manager
        .create(
            WorkSpec::new("self.deleting")
                .execute(|| {})
                .complete(move |_env, status| {
                    let id = *callback_cell.get().expect("id recorded before queueing");
                    callback_manager.delete(id).expect("delete from completion");
                    done_tx.send(status).unwrap();
                }),
        )
        .unwrap();
    id_cell.set(id).unwrap();
    manager.queue(id).unwrap();

    assert_eq!(recv_status(&mut done_rx).await, CompletionStatus::Ok);
    assert!(matches!(manager.delete(id), Err(Error::UnknownWork(_))));
    assert_eq!(manager.live_work(), 0);
    assert_eq!(pool.live_handles(), 0);
}

// ---------------------------------------------------------------------------
// Handle table: stale handles and leaks
// ---------------------------------------------------------------------------

#[tokio::test]
async fn stale_handle_is_rejected_after_slot_reuse() {
    let (manager, _pool, _loop_task) = start_bridge(1);

    let (done_tx, mut done_rx) = unbounded_channel();
    let first = manager
        .create(
            WorkSpec::new("first.occupant")
                .execute(|| {})
                .complete(move |_env, status| {
                    done_tx.send(status).unwrap();
                }),
        )
        .unwrap();
    manager.queue(first).unwrap();
    recv_status(&mut done_rx).await;
    manager.delete(first).unwrap();

    // The next insert reuses the freed slot; the old handle must stay dead.
    let (done_tx, mut done_rx) = unbounded_channel();
    let second = manager
        .create(
            WorkSpec::new("second.occupant")
                .execute(|| {})
                .complete(move |_env, status| {
                    done_tx.send(status).unwrap();
                }),
        )
        .unwrap();
    assert_ne!(first, second);

    assert!(matches!(manager.queue(first), Err(Error::UnknownWork(_))));
    assert!(matches!(manager.cancel(first), Err(Error::UnknownWork(_))));
    assert!(matches!(
        manager.snapshot(first),
        Err(Error::UnknownWork(_))
    ));
    assert!(matches!(manager.delete(first), Err(Error::UnknownWork(_))));

    manager.queue(second).unwrap();
    assert_eq!(recv_status(&mut done_rx).await, CompletionStatus::Ok);
    manager.delete(second).unwrap();
}

#[tokio::test]
async fn repeated_cycles_leak_nothing() {
    let (manager, pool, _loop_task) = start_bridge(2);

    for round in 0..10 {
        let (done_tx, mut done_rx) = unbounded_channel();
        let id = manager
            .create(
                WorkSpec::new(format!("cycle.{round}"))
                    .execute(|| {})
                    .complete(move |_env, status| {
                        done_tx.send(status).unwrap();
                    }),
            )
            .unwrap();
        manager.queue(id).unwrap();
        assert_eq!(recv_status(&mut done_rx).await, CompletionStatus::Ok);
        manager.delete(id).unwrap();

        assert_eq!(manager.live_work(), 0, "work leaked on round {round}");
        assert_eq!(pool.live_handles(), 0, "handle leaked on round {round}");
    }
}

// ---------------------------------------------------------------------------
// Worker panic
// ---------------------------------------------------------------------------

#[tokio::test]
async fn execute_panic_completes_with_generic_failure() {
    let (manager, pool, _loop_task) = start_bridge(1);

    let (done_tx, mut done_rx) = unbounded_channel();
    let id = manager
        .create(
            WorkSpec::new("panicking.execute")
                .execute(|| panic!("execute blew up"))
                .complete(move |_env, status| {
                    done_tx.send(status).unwrap();
                }),
        )
        .unwrap();
    manager.queue(id).unwrap();

    assert_eq!(
        recv_status(&mut done_rx).await,
        CompletionStatus::GenericFailure
    );
    assert_eq!(manager.snapshot(id).unwrap().state, WorkState::Retired);
    manager.delete(id).unwrap();

    // The loop and the worker both survive a panicking execute.
    let (done_tx, mut done_rx) = unbounded_channel();
    let next = manager
        .create(
            WorkSpec::new("after.panic")
                .execute(|| {})
                .complete(move |_env, status| {
                    done_tx.send(status).unwrap();
                }),
        )
        .unwrap();
    manager.queue(next).unwrap();
    assert_eq!(recv_status(&mut done_rx).await, CompletionStatus::Ok);
    manager.delete(next).unwrap();
    assert_eq!(pool.live_handles(), 0);
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

#[tokio::test]
async fn events_follow_lifecycle_order() {
    let (manager, _pool, _loop_task) = start_bridge(1);

    let (done_tx, mut done_rx) = unbounded_channel();
    let id = manager
        .create(
            WorkSpec::new("event.order")
                .execute(|| {})
                .complete(move |_env, status| {
                    done_tx.send(status).unwrap();
                }),
        )
        .unwrap();
    manager.queue(id).unwrap();
    recv_status(&mut done_rx).await;
    manager.delete(id).unwrap();

    let events = manager.events_since(0);
    for window in events.windows(2) {
        assert!(window[1].seq > window[0].seq);
    }

    let kinds: Vec<_> = events
        .iter()
        .filter(|event| event.kind.work_id() == id)
        .map(|event| event.kind.clone())
        .collect();
    assert_eq!(kinds.len(), 6);
    assert!(matches!(kinds[0], EventKind::WorkCreated { .. }));
    assert!(matches!(kinds[1], EventKind::WorkQueued { .. }));
    assert!(matches!(kinds[2], EventKind::ExecuteStarted { .. }));
    assert!(matches!(
        kinds[3],
        EventKind::CompletionDispatched {
            status: CompletionStatus::Ok,
            ..
        }
    ));
    assert!(matches!(kinds[4], EventKind::WorkRetired { .. }));
    assert!(matches!(kinds[5], EventKind::WorkDeleted { .. }));
}
