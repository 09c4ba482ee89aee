//! A failed global initialization is cached for the life of the process

mod common;

use std::sync::Arc;

use tether_engine::tether_sdk::RecordingRuntime;
use tether_engine::{BridgeError, Config, Interpreter, MainConfig, MainRuntime};

use common::on_thread;

#[test]
fn test_failure_is_cached_across_threads() {
    let rt = Arc::new(RecordingRuntime::new());
    rt.fail_main_init("runtime home not found");
    MainRuntime::configure(MainConfig::embedded(rt.clone())).unwrap();

    let errors: Vec<BridgeError> = (0..3)
        .map(|_| on_thread(|| Interpreter::new(Config::new()).unwrap_err()))
        .collect();

    for err in &errors {
        assert!(err.is_initialization());
        assert_eq!(err, &errors[0]);
    }
    assert!(errors[0].to_string().contains("main runtime"));
    assert_eq!(rt.main_init_count(), 1);
    assert_eq!(rt.context_init_count(), 0);

    assert!(!MainRuntime::is_initialized());
    assert_eq!(MainRuntime::instance().unwrap_err(), errors[0]);
    let err = MainRuntime::configure(MainConfig::embedded(rt.clone())).unwrap_err();
    assert!(matches!(err, BridgeError::Configuration(_)));
    assert_eq!(rt.main_init_count(), 1);
}
