//! Integration tests for RecordingRuntime used as a `dyn ForeignRuntime`

use std::sync::Arc;

use parking_lot::Mutex;
use tether_sdk::recording::tags;
use tether_sdk::{
    ForeignError, ForeignPtr, ForeignRuntime, ForeignValue, InitOptions, MethodInfo,
    RecordingRuntime, ValueKind,
};

fn as_dyn(rt: &Arc<RecordingRuntime>) -> Arc<dyn ForeignRuntime> {
    rt.clone()
}

#[test]
fn test_main_init_records_options() {
    let rt = Arc::new(RecordingRuntime::new());
    let options = InitOptions::new().no_site(1).home("/opt/rt");
    let argv = vec!["tether".to_string()];

    let state = as_dyn(&rt).initialize_main(&options, &argv).unwrap();

    assert!(!state.is_null());
    assert_eq!(rt.main_state(), Some(state));
    assert_eq!(rt.main_init_count(), 1);
    let (seen, seen_argv) = rt.main_init_args().unwrap();
    assert_eq!(seen, options);
    assert_eq!(seen_argv, argv);
}

#[test]
fn test_main_init_failure_is_reported_every_time() {
    let rt = Arc::new(RecordingRuntime::new());
    rt.fail_main_init("no runtime home");

    for _ in 0..2 {
        let err = rt.initialize_main(&InitOptions::new(), &[]).unwrap_err();
        assert_eq!(err.message, "no runtime home");
    }
    assert_eq!(rt.main_init_count(), 2);
}

#[test]
fn test_sub_contexts_are_isolated() {
    let rt = RecordingRuntime::new();
    let a = rt.init(None, false, true).unwrap();
    let b = rt.init(None, true, false).unwrap();

    rt.execute(a, "x = 1").unwrap();

    assert_ne!(a, b);
    assert!(rt.is_sub_context(a));
    assert!(!rt.is_sub_context(b));
    assert_eq!(rt.global(a, "x"), Some(ForeignValue::Int(1)));
    assert_eq!(rt.global(b, "x"), None);
    assert_eq!(rt.context_init_count(), 2);
}

#[test]
fn test_import_hook_runs_before_import() {
    let rt = Arc::new(RecordingRuntime::new());
    let state = rt.init(None, false, true).unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let hook_seen = seen.clone();
    rt.set_import_hook(move |_, name| hook_seen.lock().push(name.to_string()));

    let module = rt.import_module(state, "alpha").unwrap();
    rt.set_object_attr(module, "version", ForeignValue::from("1.0"));
    let sub = rt.import_submodule(state, module, "beta").unwrap();

    assert_eq!(*seen.lock(), vec!["alpha".to_string()]);
    assert_eq!(rt.object_name(sub).as_deref(), Some("alpha.beta"));
    assert_eq!(
        rt.get_module_object(state, module, "version", ValueKind::Str).unwrap(),
        ForeignValue::from("1.0")
    );
    assert_eq!(rt.import_log().len(), 2);
}

#[test]
fn test_import_failure_keeps_tag() {
    let rt = RecordingRuntime::new();
    let state = rt.init(None, false, true).unwrap();
    rt.fail_import(
        "missing",
        ForeignError::typed("No module named 'missing'", tags::IMPORT_ERROR),
    );

    let err = rt.import_module(state, "missing").unwrap_err();
    assert_eq!(err.foreign_type, tags::IMPORT_ERROR);
}

#[test]
fn test_proxy_bookkeeping() {
    let rt = RecordingRuntime::new();
    let target = rt.create_object("callback");
    rt.define_function("run", |_, _| Ok(ForeignValue::Bool(true)));

    rt.proxy_initialize(target).unwrap();
    let result = rt
        .proxy_invoke(target, &MethodInfo::new("run", "Runnable", 0), &[])
        .unwrap();
    rt.proxy_release(target).unwrap();

    assert_eq!(result, ForeignValue::Bool(true));
    assert_eq!(rt.proxy_init_count(target), 1);
    assert_eq!(rt.proxy_release_count(target), 1);
    assert_eq!(rt.proxy_calls(target), vec!["run".to_string()]);
    assert_eq!(rt.refcount(target), Some(1));
    assert!(rt.proxy_initialize(ForeignPtr::from_raw(0xdead0)).is_err());
}
