//! RecordingRuntime: an in-memory foreign runtime
//!
//! Simulates just enough of a reference-counted runtime to exercise an
//! embedding: it hands out unique object pointers, counts every `incref` and
//! `decref` per pointer, records executed statements per execution state, and
//! keeps a global scope per state. Failures can be injected for the main
//! initialization, context creation, imports and statements.
//!
//! Statement execution understands `name = <literal>` assignments (integers,
//! floats, quoted strings, `True`, `False`, `None`); everything else is only
//! recorded.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::error::{ForeignError, ForeignResult, ForeignTypeTag};
use crate::options::InitOptions;
use crate::runtime::ForeignRuntime;
use crate::value::{ForeignPtr, ForeignValue, HostObject, MethodInfo, StateHandle, ValueKind};

/// Foreign type tags raised by the recording runtime
pub mod tags {
    use crate::error::ForeignTypeTag;

    /// Unknown global name
    pub const NAME_ERROR: ForeignTypeTag = ForeignTypeTag::new(0x100);
    /// Unknown attribute
    pub const ATTRIBUTE_ERROR: ForeignTypeTag = ForeignTypeTag::new(0x101);
    /// Conversion failure
    pub const TYPE_ERROR: ForeignTypeTag = ForeignTypeTag::new(0x102);
    /// Import failure
    pub const IMPORT_ERROR: ForeignTypeTag = ForeignTypeTag::new(0x103);
    /// Generic runtime failure
    pub const RUNTIME_ERROR: ForeignTypeTag = ForeignTypeTag::new(0x104);
    /// Use of an invalid execution state or object
    pub const SYSTEM_ERROR: ForeignTypeTag = ForeignTypeTag::new(0x105);
}

/// Signature of a function callable through `invoke`
pub type RecordedFn =
    Arc<dyn Fn(&[ForeignValue], &[(String, ForeignValue)]) -> ForeignResult<ForeignValue> + Send + Sync>;

/// Hook run (outside any internal lock) before a module import resolves
pub type ImportHook = Arc<dyn Fn(StateHandle, &str) + Send + Sync>;

#[derive(Debug, Default)]
struct StateRecord {
    is_sub_context: bool,
    closed: bool,
    globals: HashMap<String, ForeignValue>,
    statements: Vec<String>,
    class_loader: Option<HostObject>,
}

#[derive(Debug)]
struct ObjectRecord {
    name: String,
    refcount: i64,
    increfs: u32,
    decrefs: u32,
    attrs: HashMap<String, ForeignValue>,
}

impl ObjectRecord {
    fn new(name: String) -> Self {
        Self {
            name,
            refcount: 1,
            increfs: 0,
            decrefs: 0,
            attrs: HashMap::new(),
        }
    }
}

#[derive(Debug, Default)]
struct ProxyRecord {
    initialized: u32,
    released: u32,
    calls: Vec<String>,
}

#[derive(Default)]
struct Inner {
    next_state: u64,
    next_ptr: u64,
    states: FxHashMap<StateHandle, StateRecord>,
    objects: FxHashMap<ForeignPtr, ObjectRecord>,
    proxies: FxHashMap<ForeignPtr, ProxyRecord>,
    main_state: Option<StateHandle>,
    main_inits: usize,
    main_options: Option<InitOptions>,
    main_argv: Vec<String>,
    context_inits: usize,
    main_failure: Option<ForeignError>,
    init_failures: Vec<ForeignError>,
    import_failures: HashMap<String, ForeignError>,
    statement_failures: Vec<(String, ForeignError)>,
    import_log: Vec<(StateHandle, String)>,
}

/// In-memory [`ForeignRuntime`] that records every call
#[derive(Default)]
pub struct RecordingRuntime {
    inner: Mutex<Inner>,
    functions: Mutex<HashMap<String, RecordedFn>>,
    import_hook: Mutex<Option<ImportHook>>,
}

impl RecordingRuntime {
    /// Create an empty runtime
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Failure injection
    // ========================================================================

    /// Make every `initialize_main` call fail
    pub fn fail_main_init(&self, message: impl Into<String>) {
        self.inner.lock().main_failure =
            Some(ForeignError::typed(message, tags::RUNTIME_ERROR));
    }

    /// Make the next `init` call fail
    pub fn fail_next_init(&self, message: impl Into<String>) {
        self.inner
            .lock()
            .init_failures
            .push(ForeignError::typed(message, tags::RUNTIME_ERROR));
    }

    /// Make imports of `module` fail with `error`
    pub fn fail_import(&self, module: impl Into<String>, error: ForeignError) {
        self.inner.lock().import_failures.insert(module.into(), error);
    }

    /// Make every statement containing `pattern` fail with `error`
    pub fn fail_statement(&self, pattern: impl Into<String>, error: ForeignError) {
        self.inner
            .lock()
            .statement_failures
            .push((pattern.into(), error));
    }

    /// Run `hook` at the start of every `import_module` call
    pub fn set_import_hook(&self, hook: impl Fn(StateHandle, &str) + Send + Sync + 'static) {
        *self.import_hook.lock() = Some(Arc::new(hook));
    }

    /// Register a global function callable through `invoke`
    pub fn define_function(
        &self,
        name: impl Into<String>,
        f: impl Fn(&[ForeignValue], &[(String, ForeignValue)]) -> ForeignResult<ForeignValue>
            + Send
            + Sync
            + 'static,
    ) {
        self.functions.lock().insert(name.into(), Arc::new(f));
    }

    // ========================================================================
    // Object table
    // ========================================================================

    /// Create a foreign object owned by the runtime (reference count 1)
    pub fn create_object(&self, name: impl Into<String>) -> ForeignPtr {
        let mut inner = self.inner.lock();
        Self::alloc_object(&mut inner, name.into())
    }

    /// Set an attribute on a foreign object
    pub fn set_object_attr(&self, ptr: ForeignPtr, name: impl Into<String>, value: ForeignValue) {
        if let Some(obj) = self.inner.lock().objects.get_mut(&ptr) {
            obj.attrs.insert(name.into(), value);
        }
    }

    /// Name the object was created with
    pub fn object_name(&self, ptr: ForeignPtr) -> Option<String> {
        self.inner.lock().objects.get(&ptr).map(|o| o.name.clone())
    }

    /// Number of `incref` calls seen for `ptr`
    pub fn incref_count(&self, ptr: ForeignPtr) -> u32 {
        self.inner.lock().objects.get(&ptr).map_or(0, |o| o.increfs)
    }

    /// Number of `decref` calls seen for `ptr`
    pub fn decref_count(&self, ptr: ForeignPtr) -> u32 {
        self.inner.lock().objects.get(&ptr).map_or(0, |o| o.decrefs)
    }

    /// Current reference count of `ptr`
    pub fn refcount(&self, ptr: ForeignPtr) -> Option<i64> {
        self.inner.lock().objects.get(&ptr).map(|o| o.refcount)
    }

    // ========================================================================
    // Execution state inspection
    // ========================================================================

    /// Number of `initialize_main` calls
    pub fn main_init_count(&self) -> usize {
        self.inner.lock().main_inits
    }

    /// Options and argv given to the last `initialize_main`
    pub fn main_init_args(&self) -> Option<(InitOptions, Vec<String>)> {
        let inner = self.inner.lock();
        inner
            .main_options
            .clone()
            .map(|options| (options, inner.main_argv.clone()))
    }

    /// State created by `initialize_main`
    pub fn main_state(&self) -> Option<StateHandle> {
        self.inner.lock().main_state
    }

    /// Number of `init` calls (successful or not)
    pub fn context_init_count(&self) -> usize {
        self.inner.lock().context_inits
    }

    /// Statements executed in `state`, in order
    pub fn statements(&self, state: StateHandle) -> Vec<String> {
        self.inner
            .lock()
            .states
            .get(&state)
            .map(|s| s.statements.clone())
            .unwrap_or_default()
    }

    /// Current value of a global in `state`
    pub fn global(&self, state: StateHandle, name: &str) -> Option<ForeignValue> {
        self.inner
            .lock()
            .states
            .get(&state)
            .and_then(|s| s.globals.get(name).cloned())
    }

    /// Class loader installed in `state`
    pub fn class_loader(&self, state: StateHandle) -> Option<HostObject> {
        self.inner
            .lock()
            .states
            .get(&state)
            .and_then(|s| s.class_loader.clone())
    }

    /// Check whether `state` was torn down
    pub fn is_closed(&self, state: StateHandle) -> bool {
        self.inner
            .lock()
            .states
            .get(&state)
            .map_or(false, |s| s.closed)
    }

    /// Check whether `state` was created as a sub-context
    pub fn is_sub_context(&self, state: StateHandle) -> bool {
        self.inner
            .lock()
            .states
            .get(&state)
            .map_or(false, |s| s.is_sub_context)
    }

    /// Every `(state, module)` import, in the order they were resolved
    pub fn import_log(&self) -> Vec<(StateHandle, String)> {
        self.inner.lock().import_log.clone()
    }

    // ========================================================================
    // Proxy inspection
    // ========================================================================

    /// Number of `proxy_initialize` calls for `target`
    pub fn proxy_init_count(&self, target: ForeignPtr) -> u32 {
        self.inner.lock().proxies.get(&target).map_or(0, |p| p.initialized)
    }

    /// Number of `proxy_release` calls for `target`
    pub fn proxy_release_count(&self, target: ForeignPtr) -> u32 {
        self.inner.lock().proxies.get(&target).map_or(0, |p| p.released)
    }

    /// Method names dispatched to `target`, in order
    pub fn proxy_calls(&self, target: ForeignPtr) -> Vec<String> {
        self.inner
            .lock()
            .proxies
            .get(&target)
            .map(|p| p.calls.clone())
            .unwrap_or_default()
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn alloc_object(inner: &mut Inner, name: String) -> ForeignPtr {
        inner.next_ptr += 1;
        // Word aligned, never zero
        let ptr = ForeignPtr::from_raw(0x1000 + inner.next_ptr * 0x10);
        inner.objects.insert(ptr, ObjectRecord::new(name));
        ptr
    }

    fn alloc_state(inner: &mut Inner, is_sub_context: bool) -> StateHandle {
        inner.next_state += 1;
        let state = StateHandle::from_raw(inner.next_state);
        inner.states.insert(
            state,
            StateRecord {
                is_sub_context,
                ..Default::default()
            },
        );
        state
    }

    fn live_state(inner: &mut Inner, state: StateHandle) -> ForeignResult<&mut StateRecord> {
        match inner.states.get_mut(&state) {
            Some(record) if !record.closed => Ok(record),
            Some(_) => Err(ForeignError::typed(
                format!("execution state {} is closed", state.as_raw()),
                tags::SYSTEM_ERROR,
            )),
            None => Err(ForeignError::typed(
                format!("unknown execution state {}", state.as_raw()),
                tags::SYSTEM_ERROR,
            )),
        }
    }

    fn live_object(inner: &mut Inner, ptr: ForeignPtr) -> ForeignResult<&mut ObjectRecord> {
        inner.objects.get_mut(&ptr).ok_or_else(|| {
            ForeignError::typed(format!("unknown object {}", ptr), tags::SYSTEM_ERROR)
        })
    }

    fn check_statement(inner: &Inner, code: &str) -> ForeignResult<()> {
        match inner
            .statement_failures
            .iter()
            .find(|(pattern, _)| code.contains(pattern.as_str()))
        {
            Some((_, err)) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn coerce(value: ForeignValue, kind: ValueKind) -> ForeignResult<ForeignValue> {
        if kind == ValueKind::Any || value.is_none() || value.kind() == kind {
            return Ok(value);
        }
        match (kind, value) {
            (ValueKind::Float, ForeignValue::Int(i)) => Ok(ForeignValue::Float(i as f64)),
            (ValueKind::Str, ForeignValue::Int(i)) => Ok(ForeignValue::Str(i.to_string())),
            (kind, value) => Err(ForeignError::typed(
                format!("cannot convert {} to {}", value.type_name(), kind.name()),
                tags::TYPE_ERROR,
            )),
        }
    }

    fn parse_literal(text: &str) -> Option<ForeignValue> {
        let text = text.trim();
        match text {
            "True" => return Some(ForeignValue::Bool(true)),
            "False" => return Some(ForeignValue::Bool(false)),
            "None" => return Some(ForeignValue::None),
            _ => {}
        }
        if let Ok(i) = text.parse::<i64>() {
            return Some(ForeignValue::Int(i));
        }
        if let Ok(f) = text.parse::<f64>() {
            return Some(ForeignValue::Float(f));
        }
        let quoted = (text.starts_with('\'') && text.ends_with('\''))
            || (text.starts_with('"') && text.ends_with('"'));
        if quoted && text.len() >= 2 {
            return Some(ForeignValue::Str(text[1..text.len() - 1].to_string()));
        }
        None
    }

    fn parse_assignment(code: &str) -> Option<(String, ForeignValue)> {
        let (lhs, rhs) = code.split_once('=')?;
        let name = lhs.trim();
        let valid = !name.is_empty()
            && name.chars().all(|c| c.is_alphanumeric() || c == '_')
            && !rhs.starts_with('=');
        if !valid {
            return None;
        }
        Self::parse_literal(rhs).map(|value| (name.to_string(), value))
    }
}

impl ForeignRuntime for RecordingRuntime {
    fn initialize_main(&self, options: &InitOptions, argv: &[String]) -> ForeignResult<StateHandle> {
        let mut inner = self.inner.lock();
        inner.main_inits += 1;
        inner.main_options = Some(options.clone());
        inner.main_argv = argv.to_vec();
        if let Some(err) = inner.main_failure.clone() {
            return Err(err);
        }
        let state = Self::alloc_state(&mut inner, false);
        inner.main_state = Some(state);
        Ok(state)
    }

    fn init(
        &self,
        loader: Option<&HostObject>,
        _has_shared_modules: bool,
        is_sub_context: bool,
    ) -> ForeignResult<StateHandle> {
        let mut inner = self.inner.lock();
        inner.context_inits += 1;
        if !inner.init_failures.is_empty() {
            return Err(inner.init_failures.remove(0));
        }
        let state = Self::alloc_state(&mut inner, is_sub_context);
        if let Some(record) = inner.states.get_mut(&state) {
            record.class_loader = loader.cloned();
        }
        Ok(state)
    }

    fn close(&self, state: StateHandle) -> ForeignResult<()> {
        let mut inner = self.inner.lock();
        Self::live_state(&mut inner, state)?.closed = true;
        Ok(())
    }

    fn set_class_loader(&self, state: StateHandle, loader: &HostObject) -> ForeignResult<()> {
        let mut inner = self.inner.lock();
        Self::live_state(&mut inner, state)?.class_loader = Some(loader.clone());
        Ok(())
    }

    fn incref(&self, state: StateHandle, ptr: ForeignPtr) -> ForeignResult<()> {
        let mut inner = self.inner.lock();
        Self::live_state(&mut inner, state)?;
        let obj = Self::live_object(&mut inner, ptr)?;
        obj.refcount += 1;
        obj.increfs += 1;
        Ok(())
    }

    fn decref(&self, state: StateHandle, ptr: ForeignPtr) -> ForeignResult<()> {
        let mut inner = self.inner.lock();
        Self::live_state(&mut inner, state)?;
        let obj = Self::live_object(&mut inner, ptr)?;
        obj.refcount -= 1;
        obj.decrefs += 1;
        Ok(())
    }

    fn has_attr(&self, state: StateHandle, ptr: ForeignPtr, name: &str) -> ForeignResult<bool> {
        let mut inner = self.inner.lock();
        Self::live_state(&mut inner, state)?;
        Ok(Self::live_object(&mut inner, ptr)?.attrs.contains_key(name))
    }

    fn get_attr(
        &self,
        state: StateHandle,
        ptr: ForeignPtr,
        name: &str,
        kind: ValueKind,
    ) -> ForeignResult<ForeignValue> {
        let mut inner = self.inner.lock();
        Self::live_state(&mut inner, state)?;
        let obj = Self::live_object(&mut inner, ptr)?;
        let value = obj.attrs.get(name).cloned().ok_or_else(|| {
            ForeignError::typed(
                format!("'{}' object has no attribute '{}'", obj.name, name),
                tags::ATTRIBUTE_ERROR,
            )
        })?;
        Self::coerce(value, kind)
    }

    fn set_attr(
        &self,
        state: StateHandle,
        ptr: ForeignPtr,
        name: &str,
        value: ForeignValue,
    ) -> ForeignResult<()> {
        let mut inner = self.inner.lock();
        Self::live_state(&mut inner, state)?;
        Self::live_object(&mut inner, ptr)?
            .attrs
            .insert(name.to_string(), value);
        Ok(())
    }

    fn del_attr(&self, state: StateHandle, ptr: ForeignPtr, name: &str) -> ForeignResult<()> {
        let mut inner = self.inner.lock();
        Self::live_state(&mut inner, state)?;
        let obj = Self::live_object(&mut inner, ptr)?;
        match obj.attrs.remove(name) {
            Some(_) => Ok(()),
            None => Err(ForeignError::typed(
                format!("'{}' object has no attribute '{}'", obj.name, name),
                tags::ATTRIBUTE_ERROR,
            )),
        }
    }

    fn equals(&self, state: StateHandle, ptr: ForeignPtr, other: &ForeignValue) -> ForeignResult<bool> {
        let mut inner = self.inner.lock();
        Self::live_state(&mut inner, state)?;
        Self::live_object(&mut inner, ptr)?;
        Ok(matches!(other, ForeignValue::Object(o) if *o == ptr))
    }

    fn hash(&self, state: StateHandle, ptr: ForeignPtr) -> ForeignResult<i64> {
        let mut inner = self.inner.lock();
        Self::live_state(&mut inner, state)?;
        Self::live_object(&mut inner, ptr)?;
        Ok((ptr.as_raw() >> 4) as i64)
    }

    fn object_str(&self, state: StateHandle, ptr: ForeignPtr) -> ForeignResult<String> {
        let mut inner = self.inner.lock();
        Self::live_state(&mut inner, state)?;
        let obj = Self::live_object(&mut inner, ptr)?;
        Ok(format!("<{} object at {}>", obj.name, ptr))
    }

    fn execute(&self, state: StateHandle, code: &str) -> ForeignResult<()> {
        let mut inner = self.inner.lock();
        Self::check_statement(&inner, code)?;
        let record = Self::live_state(&mut inner, state)?;
        record.statements.push(code.to_string());
        for line in code.lines() {
            if let Some((name, value)) = Self::parse_assignment(line) {
                record.globals.insert(name, value);
            }
        }
        Ok(())
    }

    fn evaluate(&self, state: StateHandle, code: &str) -> ForeignResult<ForeignValue> {
        let mut inner = self.inner.lock();
        Self::check_statement(&inner, code)?;
        let record = Self::live_state(&mut inner, state)?;
        record.statements.push(code.to_string());
        if let Some((name, value)) = Self::parse_assignment(code) {
            record.globals.insert(name, value);
            return Ok(ForeignValue::None);
        }
        if let Some(value) = record.globals.get(code.trim()) {
            return Ok(value.clone());
        }
        Ok(Self::parse_literal(code).unwrap_or(ForeignValue::None))
    }

    fn compile(
        &self,
        state: StateHandle,
        code: &str,
        filename: Option<&str>,
    ) -> ForeignResult<ForeignValue> {
        let mut inner = self.inner.lock();
        Self::check_statement(&inner, code)?;
        Self::live_state(&mut inner, state)?;
        let trimmed = code.trim_end();
        if trimmed.ends_with(':') || trimmed.ends_with('\\') {
            return Ok(ForeignValue::None);
        }
        let name = format!("code<{}>", filename.unwrap_or("<string>"));
        Ok(ForeignValue::Object(Self::alloc_object(&mut inner, name)))
    }

    fn execute_file(&self, state: StateHandle, path: &Path) -> ForeignResult<()> {
        let mut inner = self.inner.lock();
        Self::live_state(&mut inner, state)?
            .statements
            .push(format!("execfile {}", path.display()));
        Ok(())
    }

    fn invoke(
        &self,
        state: StateHandle,
        name: &str,
        args: &[ForeignValue],
        kwargs: &[(String, ForeignValue)],
    ) -> ForeignResult<ForeignValue> {
        {
            let mut inner = self.inner.lock();
            Self::live_state(&mut inner, state)?
                .statements
                .push(format!("invoke {}", name));
        }
        let function = self.functions.lock().get(name).cloned();
        match function {
            Some(f) => f(args, kwargs),
            None => Err(ForeignError::typed(
                format!("name '{}' is not defined", name),
                tags::NAME_ERROR,
            )),
        }
    }

    fn import_module(&self, state: StateHandle, name: &str) -> ForeignResult<ForeignPtr> {
        let hook = self.import_hook.lock().clone();
        if let Some(hook) = hook {
            hook(state, name);
        }
        let mut inner = self.inner.lock();
        Self::live_state(&mut inner, state)?;
        inner.import_log.push((state, name.to_string()));
        if let Some(err) = inner.import_failures.get(name) {
            return Err(err.clone());
        }
        Ok(Self::alloc_object(&mut inner, name.to_string()))
    }

    fn import_submodule(
        &self,
        state: StateHandle,
        module: ForeignPtr,
        name: &str,
    ) -> ForeignResult<ForeignPtr> {
        let mut inner = self.inner.lock();
        Self::live_state(&mut inner, state)?;
        let qualified = format!("{}.{}", Self::live_object(&mut inner, module)?.name, name);
        inner.import_log.push((state, qualified.clone()));
        if let Some(err) = inner.import_failures.get(&qualified) {
            return Err(err.clone());
        }
        Ok(Self::alloc_object(&mut inner, qualified))
    }

    fn get_object(&self, state: StateHandle, name: &str, kind: ValueKind) -> ForeignResult<ForeignValue> {
        let mut inner = self.inner.lock();
        let value = Self::live_state(&mut inner, state)?
            .globals
            .get(name)
            .cloned()
            .ok_or_else(|| {
                ForeignError::typed(format!("name '{}' is not defined", name), tags::NAME_ERROR)
            })?;
        Self::coerce(value, kind)
    }

    fn get_module_object(
        &self,
        state: StateHandle,
        module: ForeignPtr,
        name: &str,
        kind: ValueKind,
    ) -> ForeignResult<ForeignValue> {
        self.get_attr(state, module, name, kind)
    }

    fn get_bytes(&self, state: StateHandle, name: &str) -> ForeignResult<Vec<u8>> {
        match self.get_object(state, name, ValueKind::Any)? {
            ForeignValue::Bytes(bytes) => Ok(bytes),
            ForeignValue::Str(s) => Ok(s.into_bytes()),
            other => Err(ForeignError::typed(
                format!("cannot convert {} to bytes", other.type_name()),
                tags::TYPE_ERROR,
            )),
        }
    }

    fn set_var(&self, state: StateHandle, name: &str, value: ForeignValue) -> ForeignResult<()> {
        let mut inner = self.inner.lock();
        Self::live_state(&mut inner, state)?
            .globals
            .insert(name.to_string(), value);
        Ok(())
    }

    fn proxy_initialize(&self, target: ForeignPtr) -> ForeignResult<()> {
        let mut inner = self.inner.lock();
        Self::live_object(&mut inner, target)?.refcount += 1;
        inner.proxies.entry(target).or_default().initialized += 1;
        Ok(())
    }

    fn proxy_invoke(
        &self,
        target: ForeignPtr,
        method: &MethodInfo,
        args: &[ForeignValue],
    ) -> ForeignResult<ForeignValue> {
        {
            let mut inner = self.inner.lock();
            Self::live_object(&mut inner, target)?;
            inner
                .proxies
                .entry(target)
                .or_default()
                .calls
                .push(method.name.clone());
        }
        let function = self.functions.lock().get(&method.name).cloned();
        match function {
            Some(f) => f(args, &[]),
            None => Ok(ForeignValue::None),
        }
    }

    fn proxy_release(&self, target: ForeignPtr) -> ForeignResult<()> {
        let mut inner = self.inner.lock();
        Self::live_object(&mut inner, target)?.refcount -= 1;
        inner.proxies.entry(target).or_default().released += 1;
        Ok(())
    }
}
