//! Shared setup for the engine integration tests
//!
//! Each test file is its own process, so each one configures the main runtime
//! once with a fresh recording runtime.

#![allow(dead_code)]

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use once_cell::sync::Lazy;
use tether_engine::tether_sdk::RecordingRuntime;
use tether_engine::{MainConfig, MainRuntime};

static RUNTIME: Lazy<Arc<RecordingRuntime>> = Lazy::new(|| {
    let runtime = Arc::new(RecordingRuntime::new());
    MainRuntime::configure(MainConfig::embedded(runtime.clone())).unwrap();
    runtime
});

/// The recording runtime behind the main runtime of this test binary
pub fn runtime() -> Arc<RecordingRuntime> {
    RUNTIME.clone()
}

/// Run `f` on a fresh host thread and return its result
pub fn on_thread<T: Send + 'static>(f: impl FnOnce() -> T + Send + 'static) -> T {
    thread::spawn(f).join().unwrap()
}

/// Poll `condition` until it holds or `timeout` passes
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}
