//! Global initialization settings reach the runtime exactly once

mod common;

use std::sync::Arc;

use tether_engine::tether_sdk::{InitOptions, RecordingRuntime};
use tether_engine::{Config, Interpreter, MainConfig, MainRuntime};

use common::on_thread;

#[test]
fn test_settings_applied_before_first_interpreter() {
    let rt = Arc::new(RecordingRuntime::new());
    MainRuntime::configure(MainConfig::embedded(rt.clone()).argv(["ignored"])).unwrap();

    let options = InitOptions::new().no_site(1).optimize(2).home("/opt/runtime");
    MainRuntime::set_init_options(options.clone()).unwrap();
    MainRuntime::set_shared_modules_argv(vec!["tether".to_string(), "-q".to_string()]).unwrap();
    assert!(!MainRuntime::is_initialized());

    for _ in 0..2 {
        on_thread(|| {
            let interp = Interpreter::new(Config::new()).unwrap();
            interp.close().unwrap();
        });
    }

    assert!(MainRuntime::is_initialized());
    assert_eq!(rt.main_init_count(), 1);
    let (seen_options, seen_argv) = rt.main_init_args().unwrap();
    assert_eq!(seen_options, options);
    assert_eq!(seen_argv, vec!["tether".to_string(), "-q".to_string()]);

    assert!(MainRuntime::set_init_options(InitOptions::new()).is_err());
}
