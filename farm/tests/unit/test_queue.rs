//! Device queue tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::Span;

use farmctl::device::DeviceQueue;
use farmctl::errors::FarmError;

#[tokio::test]
async fn test_tasks_start_in_submission_order() {
    let queue = DeviceQueue::new("dev-1", Span::none());
    let order = Arc::new(Mutex::new(Vec::new()));

    let mut tickets = Vec::new();
    for i in 0..5u64 {
        let order = order.clone();
        tickets.push(
            queue
                .enqueue(move || async move {
                    // Later tasks are quicker, so only strict FIFO keeps the order
                    tokio::time::sleep(Duration::from_millis(10 * (5 - i))).await;
                    order.lock().unwrap().push(i);
                    Ok(i)
                })
                .unwrap(),
        );
    }

    for (i, ticket) in tickets.into_iter().enumerate() {
        assert_eq!(ticket.await.unwrap(), i as u64);
    }
    assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
}

#[tokio::test]
async fn test_tasks_never_overlap() {
    let queue = DeviceQueue::new("dev-1", Span::none());
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let mut tickets = Vec::new();
    for _ in 0..6 {
        let running = running.clone();
        let peak = peak.clone();
        tickets.push(
            queue
                .enqueue(move || async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                })
                .unwrap(),
        );
    }
    for ticket in tickets {
        ticket.await.unwrap();
    }
    assert_eq!(peak.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_failure_does_not_poison_queue() {
    let queue = DeviceQueue::new("dev-1", Span::none());

    let failing = queue
        .enqueue(|| async { Err::<(), _>(FarmError::Internal("boom".into())) })
        .unwrap();
    let next = queue.enqueue(|| async { Ok("still running") }).unwrap();

    assert!(matches!(failing.await, Err(FarmError::Internal(msg)) if msg == "boom"));
    assert_eq!(next.await.unwrap(), "still running");
    assert_eq!(queue.pending(), 0);
}

#[tokio::test]
async fn test_dispose_lets_running_task_finish() {
    let queue = DeviceQueue::new("dev-1", Span::none());
    let (started_tx, started_rx) = tokio::sync::oneshot::channel();

    let running = queue
        .enqueue(move || async move {
            let _ = started_tx.send(());
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok("done")
        })
        .unwrap();
    let queued = queue.enqueue(|| async { Ok("never") }).unwrap();

    started_rx.await.unwrap();
    queue.dispose();

    assert_eq!(running.await.unwrap(), "done");
    assert!(matches!(queued.await, Err(FarmError::Disposed(id)) if id == "dev-1"));
    assert!(queue.is_disposed());
    assert!(matches!(
        queue.enqueue(|| async { Ok(()) }),
        Err(FarmError::Disposed(_))
    ));
}

#[tokio::test]
async fn test_closure_panic_does_not_stop_queue() {
    let queue = DeviceQueue::new("dev-1", Span::none());

    let exploding = queue
        .enqueue(|| -> std::future::Ready<Result<(), FarmError>> { panic!("boom before await") })
        .unwrap();
    assert!(matches!(exploding.await, Err(FarmError::Internal(_))));

    let next = queue.enqueue(|| async { Ok("after") }).unwrap();
    assert_eq!(next.await.unwrap(), "after");
    assert!(!queue.is_disposed());
    assert_eq!(queue.pending(), 0);
}
