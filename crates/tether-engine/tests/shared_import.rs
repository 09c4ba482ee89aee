//! Shared imports are serialized through the main runtime's owner thread

mod common;

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam::channel;
use parking_lot::Mutex;
use tether_engine::tether_sdk::ForeignValue;
use tether_engine::{Config, Interpreter, MainRuntime, SharedImporter};

use common::{on_thread, runtime, wait_until};

#[test]
fn test_requests_resolve_in_submission_order() {
    let rt = runtime();
    let entered = Arc::new(Mutex::new(Vec::new()));
    let (gate_tx, gate_rx) = channel::bounded::<()>(0);

    let hook_entered = entered.clone();
    rt.set_import_hook(move |_, name| {
        if name != "alpha" && name != "beta" {
            return;
        }
        hook_entered.lock().push(name.to_string());
        if name == "alpha" {
            let _ = gate_rx.recv();
        }
    });

    let main = MainRuntime::instance().unwrap();
    let returned = Arc::new(Mutex::new(Vec::new()));

    let first = {
        let main = main.clone();
        let returned = returned.clone();
        thread::spawn(move || {
            let result = main.shared_import("alpha");
            returned.lock().push("alpha");
            result
        })
    };
    assert!(wait_until(Duration::from_secs(5), || entered.lock().len() == 1));

    let second = {
        let main = main.clone();
        let returned = returned.clone();
        thread::spawn(move || {
            let result = main.shared_import("beta");
            returned.lock().push("beta");
            result
        })
    };

    // Beta is not picked up while alpha is outstanding
    thread::sleep(Duration::from_millis(100));
    assert_eq!(*entered.lock(), vec!["alpha".to_string()]);
    assert!(returned.lock().is_empty());

    gate_tx.send(()).unwrap();
    let alpha = first.join().unwrap().unwrap();
    let beta = second.join().unwrap().unwrap();

    assert_ne!(alpha, beta);
    assert_eq!(*entered.lock(), vec!["alpha".to_string(), "beta".to_string()]);
    assert_eq!(rt.object_name(alpha).as_deref(), Some("alpha"));
    assert_eq!(rt.object_name(beta).as_deref(), Some("beta"));
}

#[test]
fn test_imports_run_in_main_state() {
    let rt = runtime();
    let main = MainRuntime::instance().unwrap();
    let importer = SharedImporter::new(main.clone());

    let ptr = on_thread(move || {
        let interp = Interpreter::new(Config::new()).unwrap();
        let ptr = importer.import("owned").unwrap();
        interp.close().unwrap();
        ptr
    });

    assert!(!ptr.is_null());
    assert!(rt
        .import_log()
        .contains(&(main.main_state(), "owned".to_string())));
    // Shared modules belong to the main runtime and are never given back
    assert_eq!(rt.decref_count(ptr), 0);
}

#[test]
fn test_interpreter_installs_shared_module_hook() {
    let rt = runtime();
    on_thread(move || {
        let config = Config::new().shared_modules(["numpy", "pandas"]);
        let interp = Interpreter::new(config).unwrap();
        let state = interp.state_handle();

        let modules = rt.global(state, "shared_modules").unwrap();
        assert_eq!(
            modules,
            ForeignValue::List(vec![ForeignValue::from("numpy"), ForeignValue::from("pandas")])
        );

        let importer = match rt.global(state, "shared_importer") {
            Some(ForeignValue::Host(host)) => host,
            other => panic!("unexpected importer binding {:?}", other),
        };
        let importer = importer.downcast_ref::<SharedImporter>().unwrap();
        let ptr = importer.import("numpy").unwrap();
        assert_eq!(rt.object_name(ptr).as_deref(), Some("numpy"));

        interp.close().unwrap();
    });
}
