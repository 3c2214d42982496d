//! End-to-end tests for the runtime core.
//!
//! The core's `start()` blocks on its run loop, so these tests drive it from
//! a dedicated thread and observe lifecycle transitions from the outside.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::unbounded;
use serde_json::json;

use automaton_core::config::{ConfigStore, WORKER_COUNT};
use automaton_core::core::{RuntimeError, RUNNING, STOPPED};
use automaton_core::events::listener_fn;
use automaton_core::runtime::Core;

// ============================================================================
// HELPERS
// ============================================================================

fn wait_for_state(core: &Core, want: &str) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while core.state() != want {
        assert!(
            Instant::now() < deadline,
            "timed out waiting for core state `{want}`, currently `{}`",
            core.state()
        );
        thread::sleep(Duration::from_millis(10));
    }
}

fn single_worker_core() -> Arc<Core> {
    let config = ConfigStore::with_defaults([(WORKER_COUNT, json!(1))]).unwrap();
    Arc::new(Core::new(config))
}

fn start_in_background(core: &Arc<Core>) -> thread::JoinHandle<Result<(), RuntimeError>> {
    let runner = Arc::clone(core);
    let handle = thread::spawn(move || runner.start());
    wait_for_state(core, RUNNING);
    handle
}

// ============================================================================
// LIFECYCLE
// ============================================================================

#[test]
fn test_start_run_submit_stop_cycle() {
    let core = single_worker_core();
    assert_eq!(core.state(), "");

    let runner = start_in_background(&core);
    assert_eq!(core.pool_stats().unwrap().worker_count, 1);

    let handle = core.submit(async { Ok(()) }).unwrap();
    handle.wait_blocking().unwrap();

    core.stop().unwrap();
    runner.join().unwrap().unwrap();
    assert_eq!(core.state(), STOPPED);

    // The stopped core no longer accepts work or dispatches.
    assert!(core.submit(async { Ok(()) }).is_err());
    assert!(core.bus().dispatch("ns:evt").is_err());
}

#[test]
fn test_start_is_rejected_while_running() {
    let core = single_worker_core();
    let runner = start_in_background(&core);

    let err = core.start().unwrap_err();
    assert!(matches!(
        err,
        RuntimeError::InvalidTransition {
            operation: "start",
            ..
        }
    ));

    core.stop().unwrap();
    runner.join().unwrap().unwrap();
}

#[test]
fn test_restart_after_stop() {
    let core = single_worker_core();

    let first = start_in_background(&core);
    core.stop().unwrap();
    first.join().unwrap().unwrap();
    assert_eq!(core.state(), STOPPED);

    // The sequence permits re-entry from STOPPED back to STARTING.
    let second = start_in_background(&core);
    let handle = core.submit(async { Ok(()) }).unwrap();
    handle.wait_blocking().unwrap();

    core.stop().unwrap();
    second.join().unwrap().unwrap();
    assert_eq!(core.state(), STOPPED);
}

// ============================================================================
// EVENT FLOW THROUGH THE RUNTIME
// ============================================================================

#[test]
fn test_dispatch_executes_listeners_in_priority_order() {
    let core = single_worker_core();
    let (tx, rx) = unbounded();

    let late = tx.clone();
    core.bus()
        .listen("ns:evt", 5, listener_fn(move |_event| {
            let tx = late.clone();
            async move {
                tx.send("L")?;
                Ok(())
            }
        }))
        .unwrap();
    core.bus()
        .listen("ns:evt", 1, listener_fn(move |_event| {
            let tx = tx.clone();
            async move {
                tx.send("M")?;
                Ok(())
            }
        }))
        .unwrap();

    let runner = start_in_background(&core);
    assert_eq!(core.bus().dispatch("ns:evt").unwrap(), 2);

    assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), "M");
    assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), "L");

    core.stop().unwrap();
    runner.join().unwrap().unwrap();
}

#[test]
fn test_stop_from_a_listener() {
    let core = single_worker_core();
    let stopper = Arc::clone(&core);

    core.bus()
        .listen("core:shutdown", 1, listener_fn(move |_event| {
            let core = Arc::clone(&stopper);
            async move {
                core.stop()?;
                Ok(())
            }
        }))
        .unwrap();

    let runner = start_in_background(&core);
    core.bus().dispatch("core:shutdown").unwrap();

    runner.join().unwrap().unwrap();
    assert_eq!(core.state(), STOPPED);
}
