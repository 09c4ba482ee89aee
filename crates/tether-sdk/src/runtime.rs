//! ForeignRuntime trait: the foreign call interface
//!
//! Defines the fixed set of primitive operations the embedded runtime
//! provides. The engine programs against this trait only; a native runtime
//! library implements it and hands it over through its entry point.

use std::path::Path;

use crate::error::ForeignResult;
use crate::options::InitOptions;
use crate::value::{ForeignPtr, ForeignValue, HostObject, MethodInfo, StateHandle, ValueKind};

/// Primitive operations of the embedded foreign runtime.
///
/// Every call is synchronous and blocks the calling thread for its duration.
/// Apart from `initialize_main` and the proxy operations, calls are
/// identified by the `(state, pointer)` pair and must be made from the thread
/// that owns `state`; the engine enforces that before calling in.
///
/// Object pointers returned in [`ForeignValue::Object`] or from
/// `import_module` / `import_submodule` are borrowed references. A caller that
/// keeps one must `incref` it and later `decref` it exactly once.
pub trait ForeignRuntime: Send + Sync {
    // ========================================================================
    // Global and per-context lifecycle
    // ========================================================================

    /// One-time global initialization, run on the main runtime's owner thread.
    ///
    /// Returns the execution state of the main runtime.
    fn initialize_main(&self, options: &InitOptions, argv: &[String]) -> ForeignResult<StateHandle>;

    /// Create an execution state for a new context on the calling thread
    fn init(
        &self,
        loader: Option<&HostObject>,
        has_shared_modules: bool,
        is_sub_context: bool,
    ) -> ForeignResult<StateHandle>;

    /// Tear down an execution state created by `init`
    fn close(&self, state: StateHandle) -> ForeignResult<()>;

    /// Replace the class loader used by an execution state
    fn set_class_loader(&self, state: StateHandle, loader: &HostObject) -> ForeignResult<()>;

    // ========================================================================
    // Reference counting
    // ========================================================================

    /// Increment the reference count of an object
    fn incref(&self, state: StateHandle, ptr: ForeignPtr) -> ForeignResult<()>;

    /// Decrement the reference count of an object
    fn decref(&self, state: StateHandle, ptr: ForeignPtr) -> ForeignResult<()>;

    // ========================================================================
    // Object protocol
    // ========================================================================

    /// `hasattr(obj, name)`
    fn has_attr(&self, state: StateHandle, ptr: ForeignPtr, name: &str) -> ForeignResult<bool>;

    /// `getattr(obj, name)`, converted to `kind`
    fn get_attr(
        &self,
        state: StateHandle,
        ptr: ForeignPtr,
        name: &str,
        kind: ValueKind,
    ) -> ForeignResult<ForeignValue>;

    /// `setattr(obj, name, value)`
    fn set_attr(
        &self,
        state: StateHandle,
        ptr: ForeignPtr,
        name: &str,
        value: ForeignValue,
    ) -> ForeignResult<()>;

    /// `delattr(obj, name)`
    fn del_attr(&self, state: StateHandle, ptr: ForeignPtr, name: &str) -> ForeignResult<()>;

    /// Foreign equality between `obj` and `other`
    fn equals(&self, state: StateHandle, ptr: ForeignPtr, other: &ForeignValue) -> ForeignResult<bool>;

    /// Foreign hash of `obj`
    fn hash(&self, state: StateHandle, ptr: ForeignPtr) -> ForeignResult<i64>;

    /// Foreign string conversion of `obj`
    fn object_str(&self, state: StateHandle, ptr: ForeignPtr) -> ForeignResult<String>;

    // ========================================================================
    // Running code
    // ========================================================================

    /// Execute statements in the context's global scope
    fn execute(&self, state: StateHandle, code: &str) -> ForeignResult<()>;

    /// Evaluate an expression or statement
    fn evaluate(&self, state: StateHandle, code: &str) -> ForeignResult<ForeignValue>;

    /// Compile source. Returns `ForeignValue::None` when the source is an
    /// incomplete statement that needs more input.
    fn compile(
        &self,
        state: StateHandle,
        code: &str,
        filename: Option<&str>,
    ) -> ForeignResult<ForeignValue>;

    /// Execute a script file
    fn execute_file(&self, state: StateHandle, path: &Path) -> ForeignResult<()>;

    /// Call a global function (or `object.method` using dot notation)
    fn invoke(
        &self,
        state: StateHandle,
        name: &str,
        args: &[ForeignValue],
        kwargs: &[(String, ForeignValue)],
    ) -> ForeignResult<ForeignValue>;

    // ========================================================================
    // Modules and globals
    // ========================================================================

    /// Import a module into the execution state
    fn import_module(&self, state: StateHandle, name: &str) -> ForeignResult<ForeignPtr>;

    /// Import `name` relative to an already imported module
    fn import_submodule(
        &self,
        state: StateHandle,
        module: ForeignPtr,
        name: &str,
    ) -> ForeignResult<ForeignPtr>;

    /// Read a global variable, converted to `kind`
    fn get_object(&self, state: StateHandle, name: &str, kind: ValueKind) -> ForeignResult<ForeignValue>;

    /// Read a module attribute, converted to `kind`
    fn get_module_object(
        &self,
        state: StateHandle,
        module: ForeignPtr,
        name: &str,
        kind: ValueKind,
    ) -> ForeignResult<ForeignValue>;

    /// Read a global variable as raw bytes
    fn get_bytes(&self, state: StateHandle, name: &str) -> ForeignResult<Vec<u8>>;

    /// Bind a global variable
    fn set_var(&self, state: StateHandle, name: &str, value: ForeignValue) -> ForeignResult<()>;

    // ========================================================================
    // Host proxies
    // ========================================================================

    /// Take ownership of a foreign callable backing a host proxy
    fn proxy_initialize(&self, target: ForeignPtr) -> ForeignResult<()>;

    /// Dispatch a proxied host method call to the foreign callable
    fn proxy_invoke(
        &self,
        target: ForeignPtr,
        method: &MethodInfo,
        args: &[ForeignValue],
    ) -> ForeignResult<ForeignValue>;

    /// Release the foreign callable backing a host proxy
    fn proxy_release(&self, target: ForeignPtr) -> ForeignResult<()>;
}
