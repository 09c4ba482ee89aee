//! Failures while creating an interpreter leave nothing behind

mod common;

use std::sync::Arc;

use parking_lot::Mutex;

use tether_engine::interpreter::threads;
use tether_engine::tether_sdk::recording::tags;
use tether_engine::tether_sdk::ForeignError;
use tether_engine::{Config, Interpreter, NamingConventionEnquirer};

use common::{on_thread, runtime};

// Injected failures are global to the runtime
static SERIAL: Mutex<()> = parking_lot::const_mutex(());

#[test]
fn test_failed_setup_closes_interpreter() {
    let _serial = SERIAL.lock();
    let rt = runtime();
    rt.fail_statement(
        "host_import_hook.setup_importer",
        ForeignError::typed("cannot install hook", tags::RUNTIME_ERROR),
    );

    on_thread(move || {
        let inits = rt.context_init_count();
        let config = Config::new().name_enquirer(Arc::new(NamingConventionEnquirer::new()));

        let err = Interpreter::new(config).unwrap_err();
        assert!(err.is_foreign());
        assert_eq!(err.foreign_type(), tags::RUNTIME_ERROR);
        assert_eq!(rt.context_init_count(), inits + 1);
        assert_eq!(threads::current(), None);

        // The thread is free again
        let interp = Interpreter::new(Config::new()).unwrap();
        interp.close().unwrap();
    });
}

#[test]
fn test_failed_init_releases_thread() {
    let _serial = SERIAL.lock();
    let rt = runtime();
    on_thread(move || {
        rt.fail_next_init("out of memory");

        let err = Interpreter::new(Config::new()).unwrap_err();
        assert!(err.is_foreign());
        assert_eq!(threads::current(), None);

        let interp = Interpreter::new(Config::new()).unwrap();
        assert!(!interp.is_closed());
        interp.close().unwrap();
    });
}
