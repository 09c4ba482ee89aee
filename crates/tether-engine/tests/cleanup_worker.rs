//! Cleanup worker timing bounds and reclamation through the global worker

mod common;

use std::time::{Duration, Instant};

use tether_engine::{CleanupWorker, Config, Interpreter, DEFAULT_POLL_INTERVAL, DEFAULT_STOP_WAIT};

use common::{on_thread, runtime, wait_until};

#[test]
fn test_idle_stop_returns_within_bound() {
    let worker = CleanupWorker::new();
    worker.start().unwrap();
    assert!(worker.is_running());

    let started = Instant::now();
    worker.stop();

    assert!(started.elapsed() < DEFAULT_STOP_WAIT);
    assert!(!worker.is_running());
}

#[test]
fn test_stop_without_start_is_immediate() {
    let worker = CleanupWorker::new();
    let started = Instant::now();
    worker.stop();
    worker.stop();
    assert!(started.elapsed() < DEFAULT_POLL_INTERVAL);
}

#[test]
fn test_global_worker_reclaims_across_threads() {
    let rt = runtime();
    let global = CleanupWorker::global();
    global.start().unwrap();

    let ptrs: Vec<_> = (0..3)
        .map(|i| {
            on_thread(move || {
                let interp = Interpreter::new(Config::new()).unwrap();
                let ptr = interp.import_module(&format!("global_{}", i)).unwrap().as_ptr();

                // Keep the interpreter open until the worker has run
                let rt = runtime();
                let reclaimed = wait_until(Duration::from_secs(5), || rt.decref_count(ptr) == 1);
                assert!(reclaimed);
                assert_eq!(interp.handle_count(), 0);
                interp.close().unwrap();
                ptr
            })
        })
        .collect();

    global.stop();
    for ptr in ptrs {
        assert_eq!(rt.decref_count(ptr), 1);
    }
}

#[test]
fn test_restart_replaces_worker() {
    let rt = runtime();
    let worker = CleanupWorker::with_timing(Duration::from_millis(20), Duration::from_secs(1));
    worker.start().unwrap();
    worker.start().unwrap();
    let queue = worker.reference_queue();

    let ptr = on_thread(move || {
        let interp = Interpreter::new(Config::new().cleanup_queue(queue)).unwrap();
        let ptr = interp.import_module("restarted").unwrap().as_ptr();
        let rt = runtime();
        assert!(wait_until(Duration::from_secs(5), || rt.decref_count(ptr) == 1));
        interp.close().unwrap();
        ptr
    });

    worker.stop();
    assert_eq!(rt.decref_count(ptr), 1);
}
