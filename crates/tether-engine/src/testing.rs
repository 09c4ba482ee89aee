//! Shared setup for unit tests that need a main runtime

use std::sync::Arc;

use once_cell::sync::Lazy;
use tether_sdk::RecordingRuntime;

use crate::main_runtime::{MainConfig, MainRuntime};

static RUNTIME: Lazy<Arc<RecordingRuntime>> = Lazy::new(|| {
    let runtime = Arc::new(RecordingRuntime::new());
    MainRuntime::configure(MainConfig::embedded(runtime.clone()))
        .expect("main runtime configured before first use");
    runtime
});

/// The recording runtime backing every interpreter in this test binary
pub(crate) fn runtime() -> Arc<RecordingRuntime> {
    RUNTIME.clone()
}
