//! Integration tests for the worker pool and priority queue.
//!
//! These validate the scheduler's externally observable contract:
//! - dequeue order follows ascending (priority, submission sequence)
//! - FIFO within a priority, regardless of worker concurrency
//! - failure isolation: failing or panicking work never stalls a worker
//! - shutdown modes: graceful, drain-before-stop, immediate

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use automaton_core::core::{
    RuntimeError, ShutdownMode, UnitOfWork, WorkerPool, WorkerPoolConfig, DEFAULT_TASK_PRIORITY,
    EVENT_TASK_PRIORITY,
};

// ============================================================================
// HELPERS
// ============================================================================

fn single_worker_pool() -> WorkerPool {
    WorkerPool::new(
        WorkerPoolConfig::new()
            .with_worker_count(1)
            .with_max_queue_depth(64),
    )
    .unwrap()
}

/// A unit of work that appends `label` to the shared execution log.
fn recording_unit(log: &Arc<Mutex<Vec<&'static str>>>, label: &'static str) -> UnitOfWork {
    let log = Arc::clone(log);
    Box::pin(async move {
        log.lock().push(label);
        Ok(())
    })
}

/// A gate unit of work that parks the worker until released, so a backlog
/// can be built up behind it deterministically.
fn gate_unit(release: tokio::sync::oneshot::Receiver<()>) -> UnitOfWork {
    Box::pin(async move {
        let _ = release.await;
        Ok(())
    })
}

// ============================================================================
// ORDERING
// ============================================================================

#[test]
fn test_dequeue_order_is_priority_then_submission_sequence() {
    let pool = single_worker_pool();
    let log = Arc::new(Mutex::new(Vec::new()));

    let (release, gate_rx) = tokio::sync::oneshot::channel();
    let gate = pool.submit(gate_unit(gate_rx), 0).unwrap();

    // Build the backlog while the only worker is parked on the gate.
    let handles = vec![
        pool.submit(recording_unit(&log, "low-first"), DEFAULT_TASK_PRIORITY)
            .unwrap(),
        pool.submit(recording_unit(&log, "urgent-first"), EVENT_TASK_PRIORITY)
            .unwrap(),
        pool.submit(recording_unit(&log, "low-second"), DEFAULT_TASK_PRIORITY)
            .unwrap(),
        pool.submit(recording_unit(&log, "urgent-second"), EVENT_TASK_PRIORITY)
            .unwrap(),
    ];

    release.send(()).unwrap();
    gate.wait_blocking().unwrap();
    for handle in handles {
        handle.wait_blocking().unwrap();
    }

    assert_eq!(
        *log.lock(),
        ["urgent-first", "urgent-second", "low-first", "low-second"]
    );
    pool.shutdown(ShutdownMode::Graceful);
}

#[test]
fn test_fifo_within_duplicate_priorities() {
    let pool = single_worker_pool();
    let log = Arc::new(Mutex::new(Vec::new()));

    let (release, gate_rx) = tokio::sync::oneshot::channel();
    let gate = pool.submit(gate_unit(gate_rx), 0).unwrap();

    let labels = ["first", "second", "third", "fourth"];
    let handles: Vec<_> = labels
        .iter()
        .map(|&label| pool.submit(recording_unit(&log, label), 5).unwrap())
        .collect();

    release.send(()).unwrap();
    gate.wait_blocking().unwrap();
    for handle in handles {
        handle.wait_blocking().unwrap();
    }

    assert_eq!(*log.lock(), labels);
    pool.shutdown(ShutdownMode::Graceful);
}

// ============================================================================
// FAILURE ISOLATION
// ============================================================================

#[test]
fn test_failing_work_does_not_stall_the_worker() {
    let pool = single_worker_pool();

    let failing = pool
        .submit(
            Box::pin(async { Err(anyhow::anyhow!("deliberate failure")) }),
            DEFAULT_TASK_PRIORITY,
        )
        .unwrap();
    let following = pool
        .submit(Box::pin(async { Ok(()) }), DEFAULT_TASK_PRIORITY)
        .unwrap();

    let err = failing.wait_blocking().unwrap_err();
    assert_eq!(err.to_string(), "deliberate failure");
    following.wait_blocking().unwrap();

    let stats = pool.stats();
    assert_eq!(stats.failed_tasks, 1);
    assert_eq!(stats.completed_tasks, 1);
    pool.shutdown(ShutdownMode::Graceful);
}

#[test]
fn test_panicking_work_does_not_kill_the_worker() {
    let pool = single_worker_pool();

    let panicking = pool
        .submit(
            Box::pin(async { panic!("listener went off the rails") }),
            DEFAULT_TASK_PRIORITY,
        )
        .unwrap();
    let following = pool
        .submit(Box::pin(async { Ok(()) }), DEFAULT_TASK_PRIORITY)
        .unwrap();

    let err = panicking.wait_blocking().unwrap_err();
    assert!(err.to_string().contains("panicked"));
    assert!(err.to_string().contains("listener went off the rails"));
    following.wait_blocking().unwrap();

    pool.shutdown(ShutdownMode::Graceful);
}

// ============================================================================
// CONCURRENCY
// ============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn test_many_concurrent_submitters_all_complete() {
    let pool = Arc::new(
        WorkerPool::new(
            WorkerPoolConfig::new()
                .with_worker_count(4)
                .with_max_queue_depth(512),
        )
        .unwrap(),
    );
    let executed = Arc::new(AtomicU64::new(0));

    let mut outcomes = Vec::new();
    for _ in 0..100 {
        let executed = Arc::clone(&executed);
        let handle = pool
            .submit(
                Box::pin(async move {
                    executed.fetch_add(1, Ordering::Relaxed);
                    Ok(())
                }),
                DEFAULT_TASK_PRIORITY,
            )
            .unwrap();
        outcomes.push(handle.outcome());
    }

    for outcome in futures::future::join_all(outcomes).await {
        outcome.unwrap();
    }

    assert_eq!(executed.load(Ordering::Relaxed), 100);
    let stats = pool.stats();
    assert_eq!(stats.submitted_tasks, 100);
    assert_eq!(stats.completed_tasks, 100);
    assert_eq!(stats.failed_tasks, 0);
    pool.shutdown(ShutdownMode::Graceful);
}

// ============================================================================
// SHUTDOWN MODES
// ============================================================================

#[test]
fn test_graceful_shutdown_drops_backlog() {
    let pool = Arc::new(single_worker_pool());
    let executed = Arc::new(AtomicU64::new(0));

    let (release, gate_rx) = tokio::sync::oneshot::channel();
    let _gate = pool.submit(gate_unit(gate_rx), 0).unwrap();

    let mut backlog = Vec::new();
    for _ in 0..3 {
        let executed = Arc::clone(&executed);
        backlog.push(
            pool.submit(
                Box::pin(async move {
                    executed.fetch_add(1, Ordering::Relaxed);
                    Ok(())
                }),
                DEFAULT_TASK_PRIORITY,
            )
            .unwrap(),
        );
    }

    let stopper = {
        let pool = Arc::clone(&pool);
        std::thread::spawn(move || pool.shutdown(ShutdownMode::Graceful))
    };
    // Give shutdown a moment to close the queue, then let the gate finish.
    // The gate may itself have been discarded, so the send is best-effort.
    std::thread::sleep(Duration::from_millis(100));
    let _ = release.send(());
    stopper.join().unwrap();

    assert_eq!(executed.load(Ordering::Relaxed), 0);
    for handle in backlog {
        let err = handle.wait_blocking().unwrap_err();
        assert!(err.to_string().contains("dropped before execution"));
    }
}

#[test]
fn test_drain_shutdown_serves_backlog_first() {
    let pool = Arc::new(single_worker_pool());
    let executed = Arc::new(AtomicU64::new(0));

    let (release, gate_rx) = tokio::sync::oneshot::channel();
    let _gate = pool.submit(gate_unit(gate_rx), 0).unwrap();

    for _ in 0..5 {
        let executed = Arc::clone(&executed);
        pool.submit(
            Box::pin(async move {
                executed.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }),
            DEFAULT_TASK_PRIORITY,
        )
        .unwrap();
    }

    let stopper = {
        let pool = Arc::clone(&pool);
        std::thread::spawn(move || pool.shutdown(ShutdownMode::Drain))
    };
    std::thread::sleep(Duration::from_millis(100));
    let _ = release.send(());
    stopper.join().unwrap();

    assert_eq!(executed.load(Ordering::Relaxed), 5);
}

#[test]
fn test_submit_after_shutdown_is_rejected() {
    let pool = single_worker_pool();
    pool.shutdown(ShutdownMode::Graceful);

    let err = pool
        .submit(Box::pin(async { Ok(()) }), DEFAULT_TASK_PRIORITY)
        .unwrap_err();
    assert!(matches!(err, RuntimeError::PoolShutdown));
}

#[test]
fn test_queue_depth_bound_rejects_submissions() {
    let pool = WorkerPool::new(
        WorkerPoolConfig::new()
            .with_worker_count(1)
            .with_max_queue_depth(2),
    )
    .unwrap();

    let (release, gate_rx) = tokio::sync::oneshot::channel();
    let _gate = pool.submit(gate_unit(gate_rx), 0).unwrap();
    // Worker is busy with the gate; fill the two queue slots.
    std::thread::sleep(Duration::from_millis(100));
    pool.submit(Box::pin(async { Ok(()) }), 5).unwrap();
    pool.submit(Box::pin(async { Ok(()) }), 5).unwrap();

    let err = pool.submit(Box::pin(async { Ok(()) }), 5).unwrap_err();
    assert!(matches!(err, RuntimeError::QueueFull { depth: 2 }));

    release.send(()).unwrap();
    pool.shutdown(ShutdownMode::Drain);
}
