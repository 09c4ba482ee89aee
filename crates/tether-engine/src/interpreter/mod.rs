//! Interpreters: isolated foreign execution states bound to one host thread
//!
//! An [`Interpreter`] owns one foreign execution state, the thread that created
//! it, and the registry of every handle created through it. Its lifecycle is
//! `Active -> Closed`; every operation is only valid while active and only on
//! the creating thread.
//!
//! A host thread hosts at most one live interpreter at a time.

mod config;
mod eval;
mod setup;
pub mod threads;

pub use config::Config;
pub use eval::EvalOutcome;

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};

use parking_lot::{Mutex, RwLock};
use tether_sdk::{ForeignPtr, ForeignRuntime, HostObject, StateHandle, ValueKind};

use crate::cleanup::{CleanupWorker, ReferenceQueue};
use crate::error::{BridgeError, BridgeResult};
use crate::handle::ModuleHandle;
use crate::main_runtime::MainRuntime;
use crate::registry::HandleRegistry;
use crate::value::Value;
use eval::EvalBuffer;

/// Unique identifier for an interpreter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InterpreterId(u64);

impl InterpreterId {
    /// Create a new unique interpreter ID
    pub fn new() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        InterpreterId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for InterpreterId {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Shared core
// ============================================================================

#[derive(Debug)]
struct ContextState {
    handle: StateHandle,
    closed: bool,
}

/// State shared between an interpreter and the handles created through it
pub(crate) struct ContextCore {
    pub(crate) id: InterpreterId,
    pub(crate) runtime: Arc<dyn ForeignRuntime>,
    pub(crate) thread: ThreadId,
    pub(crate) is_sub_context: bool,
    pub(crate) registry: HandleRegistry,
    pub(crate) queue: ReferenceQueue,
    state: RwLock<ContextState>,
}

impl ContextCore {
    /// Check the caller may use this interpreter and return its state
    pub(crate) fn validate(&self) -> BridgeResult<StateHandle> {
        let state = self.state.read();
        if state.closed {
            return Err(BridgeError::Validity(
                "Interpreter instance has been closed.".to_string(),
            ));
        }
        if thread::current().id() != self.thread {
            return Err(BridgeError::Concurrency("Invalid thread access.".to_string()));
        }
        if state.handle.is_null() {
            return Err(BridgeError::Validity("Initialization failed.".to_string()));
        }
        Ok(state.handle)
    }

    /// Run `step` while `close` is kept from tearing the state down
    pub(crate) fn hold_open<T>(&self, step: impl FnOnce() -> T) -> T {
        let _state = self.state.read();
        step()
    }

    /// Drop one reference on `ptr` unless the execution state is gone.
    ///
    /// Runs inside `hold_open`, so the read lock is taken recursively.
    pub(crate) fn decref(&self, ptr: ForeignPtr) -> BridgeResult<()> {
        let state = self.state.read_recursive();
        if state.closed || state.handle.is_null() {
            return Ok(());
        }
        Ok(self.runtime.decref(state.handle, ptr)?)
    }

    fn is_closed(&self) -> bool {
        self.state.read().closed
    }
}

// ============================================================================
// Interpreter
// ============================================================================

/// An isolated foreign execution state owned by the creating thread
pub struct Interpreter {
    core: Arc<ContextCore>,
    main: Arc<MainRuntime>,
    interactive: AtomicBool,
    eval_buffer: Mutex<EvalBuffer>,
    class_loader: Mutex<Option<HostObject>>,
}

impl Interpreter {
    /// Create a sub-interpreter with its own execution state on this thread
    pub fn new(config: Config) -> BridgeResult<Self> {
        Self::create(config, true)
    }

    /// Create an interpreter that shares the main runtime's global state
    pub fn shared(config: Config) -> BridgeResult<Self> {
        Self::create(config, false)
    }

    fn create(config: Config, is_sub_context: bool) -> BridgeResult<Self> {
        let main = MainRuntime::instance()?;

        let thread = thread::current().id();
        let id = InterpreterId::new();
        threads::claim(thread, id)?;

        let runtime = main.runtime().clone();
        let state = match runtime.init(
            config.class_loader.as_ref(),
            config.has_shared_modules(),
            is_sub_context,
        ) {
            Ok(state) => state,
            Err(e) => {
                threads::release(thread, id);
                return Err(e.into());
            }
        };

        let queue = config
            .cleanup
            .clone()
            .unwrap_or_else(|| CleanupWorker::global().reference_queue());

        let core = Arc::new(ContextCore {
            id,
            runtime,
            thread,
            is_sub_context,
            registry: HandleRegistry::new(),
            queue,
            state: RwLock::new(ContextState {
                handle: state,
                closed: false,
            }),
        });

        let interpreter = Interpreter {
            core,
            main,
            interactive: AtomicBool::new(config.interactive),
            eval_buffer: Mutex::new(EvalBuffer::default()),
            class_loader: Mutex::new(config.class_loader.clone()),
        };

        tracing::debug!(
            interpreter = id.as_u64(),
            sub_context = is_sub_context,
            "interpreter.create"
        );

        if let Err(e) = setup::run(&interpreter, &config) {
            if let Err(close_err) = interpreter.close() {
                tracing::warn!(
                    interpreter = id.as_u64(),
                    error = %close_err,
                    "interpreter.setup_close_failed"
                );
            }
            return Err(e);
        }

        Ok(interpreter)
    }

    // ========================================================================
    // Identity and settings
    // ========================================================================

    /// Unique ID of this interpreter
    pub fn id(&self) -> InterpreterId {
        self.core.id
    }

    /// Thread that created this interpreter
    pub fn thread_id(&self) -> ThreadId {
        self.core.thread
    }

    /// Foreign execution state, null once closed
    pub fn state_handle(&self) -> StateHandle {
        self.core.state.read().handle
    }

    /// Check if this interpreter has been closed
    pub fn is_closed(&self) -> bool {
        self.core.is_closed()
    }

    /// Check if this interpreter owns its own execution state
    pub fn is_sub_context(&self) -> bool {
        self.core.is_sub_context
    }

    /// Check if `eval` buffers incomplete statements
    pub fn is_interactive(&self) -> bool {
        self.interactive.load(Ordering::Relaxed)
    }

    /// Change how `eval` treats incomplete statements
    pub fn set_interactive(&self, interactive: bool) {
        self.interactive.store(interactive, Ordering::Relaxed);
    }

    /// Number of live handles created through this interpreter
    pub fn handle_count(&self) -> usize {
        self.core.registry.len()
    }

    /// The foreign runtime this interpreter runs on
    pub fn runtime(&self) -> &Arc<dyn ForeignRuntime> {
        &self.core.runtime
    }

    #[cfg(test)]
    pub(crate) fn core(&self) -> &Arc<ContextCore> {
        &self.core
    }

    /// Replace the host class loader used by the runtime
    pub fn set_class_loader(&self, loader: HostObject) -> BridgeResult<()> {
        let state = self.core.validate()?;
        let mut current = self.class_loader.lock();
        if current.as_ref().map_or(false, |c| c.ptr_eq(&loader)) {
            return Ok(());
        }
        self.core.runtime.set_class_loader(state, &loader)?;
        *current = Some(loader);
        Ok(())
    }

    // ========================================================================
    // Running code
    // ========================================================================

    /// Execute statements
    pub fn exec(&self, code: &str) -> BridgeResult<()> {
        let state = self.core.validate()?;
        Ok(self.core.runtime.execute(state, code)?)
    }

    /// Feed one line, buffering incomplete blocks in interactive mode.
    ///
    /// Pass `None` (or an empty line) to flush the buffer.
    pub fn eval(&self, line: Option<&str>) -> BridgeResult<EvalOutcome> {
        let state = self.core.validate()?;
        self.eval_buffer.lock().feed(
            self.core.runtime.as_ref(),
            state,
            self.is_interactive(),
            line,
        )
    }

    /// Execute any buffered interactive input
    pub fn flush(&self) -> BridgeResult<()> {
        let state = self.core.validate()?;
        let mut buffer = self.eval_buffer.lock();
        let result = buffer.flush(self.core.runtime.as_ref(), state);
        if result.is_err() {
            buffer.clear();
        }
        result
    }

    /// Evaluate an expression and return its value
    pub fn evaluate(&self, code: &str) -> BridgeResult<Value> {
        let state = self.core.validate()?;
        let value = self.core.runtime.evaluate(state, code)?;
        Value::from_foreign(&self.core, value)
    }

    /// Compile source. Returns `Value::None` for an incomplete statement.
    pub fn compile(&self, code: &str, filename: Option<&str>) -> BridgeResult<Value> {
        let state = self.core.validate()?;
        let value = self.core.runtime.compile(state, code, filename)?;
        Value::from_foreign(&self.core, value)
    }

    /// Run a script file
    pub fn run_script(&self, path: impl AsRef<Path>) -> BridgeResult<()> {
        self.run_script_with_loader(path, None)
    }

    /// Run a script file, switching class loader first if one is given
    pub fn run_script_with_loader(
        &self,
        path: impl AsRef<Path>,
        loader: Option<HostObject>,
    ) -> BridgeResult<()> {
        let state = self.core.validate()?;

        let path = path.as_ref();
        let readable = path.is_file() && std::fs::File::open(path).is_ok();
        if !readable {
            let shown = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
            return Err(BridgeError::InvalidArgument(format!(
                "Invalid file: {}",
                shown.display()
            )));
        }

        if let Some(loader) = loader {
            self.set_class_loader(loader)?;
        }
        Ok(self.core.runtime.execute_file(state, path)?)
    }

    /// Call a global function (or `object.method`) with positional arguments
    pub fn invoke(&self, name: &str, args: &[Value]) -> BridgeResult<Value> {
        self.invoke_with_kwargs(name, args, &[])
    }

    /// Call a global function with positional and keyword arguments
    pub fn invoke_with_kwargs(
        &self,
        name: &str,
        args: &[Value],
        kwargs: &[(&str, Value)],
    ) -> BridgeResult<Value> {
        let state = self.core.validate()?;
        if name.trim().is_empty() {
            return Err(BridgeError::InvalidArgument(
                "Invalid function name.".to_string(),
            ));
        }

        let args = args
            .iter()
            .map(Value::to_foreign)
            .collect::<BridgeResult<Vec<_>>>()?;
        let kwargs = kwargs
            .iter()
            .map(|(k, v)| Ok((k.to_string(), v.to_foreign()?)))
            .collect::<BridgeResult<Vec<_>>>()?;

        let result = self.core.runtime.invoke(state, name, &args, &kwargs)?;
        Value::from_foreign(&self.core, result)
    }

    // ========================================================================
    // Modules and globals
    // ========================================================================

    /// Import a module
    pub fn import_module(&self, name: &str) -> BridgeResult<ModuleHandle> {
        let state = self.core.validate()?;
        let ptr = self.core.runtime.import_module(state, name)?;
        ModuleHandle::wrap(&self.core, ptr)
    }

    /// Read a global
    pub fn get(&self, name: &str) -> BridgeResult<Value> {
        self.get_as(name, ValueKind::Any)
    }

    /// Read a global, converted to `kind`
    pub fn get_as(&self, name: &str, kind: ValueKind) -> BridgeResult<Value> {
        let state = self.core.validate()?;
        let value = self.core.runtime.get_object(state, name, kind)?;
        Value::from_foreign(&self.core, value)
    }

    /// Read a global as raw bytes
    pub fn get_bytes(&self, name: &str) -> BridgeResult<Vec<u8>> {
        let state = self.core.validate()?;
        Ok(self.core.runtime.get_bytes(state, name)?)
    }

    /// Bind a global
    pub fn set(&self, name: &str, value: impl Into<Value>) -> BridgeResult<()> {
        let state = self.core.validate()?;
        let value = value.into().to_foreign()?;
        Ok(self.core.runtime.set_var(state, name, value)?)
    }

    // ========================================================================
    // Teardown
    // ========================================================================

    /// Release every handle and tear down the execution state.
    ///
    /// Must be called from the creating thread. Closing an already closed
    /// interpreter is a no-op from any thread.
    /// The interpreter is marked closed even if releasing handles or the
    /// foreign teardown fails; the first error is returned afterwards.
    pub fn close(&self) -> BridgeResult<()> {
        if self.core.is_closed() {
            return Ok(());
        }
        let current = thread::current();
        if current.id() != self.core.thread {
            return Err(BridgeError::Concurrency(format!(
                "Unsafe close() of interpreter {} by thread {}. Close it from the creating thread.",
                self.core.id.as_u64(),
                current.name().unwrap_or("<unnamed>")
            )));
        }

        let released = self.core.registry.cleanup_all();

        let handle = {
            let mut state = self.core.state.write();
            state.closed = true;
            std::mem::replace(&mut state.handle, StateHandle::NULL)
        };

        let mut teardown = Ok(());
        if handle.is_null() {
            tracing::warn!(
                interpreter = self.core.id.as_u64(),
                "interpreter.close_without_state"
            );
        } else if self.core.is_sub_context {
            teardown = self.core.runtime.close(handle).map_err(BridgeError::from);
        }

        self.eval_buffer.lock().clear();
        threads::release(self.core.thread, self.core.id);

        let released_count = released.as_ref().map_or(0, |n| *n);
        tracing::debug!(
            interpreter = self.core.id.as_u64(),
            released = released_count,
            "interpreter.close"
        );

        released?;
        teardown
    }
}

impl Drop for Interpreter {
    fn drop(&mut self) {
        if self.core.is_closed() {
            return;
        }

        if thread::current().id() == self.core.thread {
            if let Err(e) = self.close() {
                tracing::warn!(
                    interpreter = self.core.id.as_u64(),
                    error = %e,
                    "interpreter.close_on_drop_failed"
                );
            }
        } else {
            tracing::warn!(
                interpreter = self.core.id.as_u64(),
                "interpreter.leaked"
            );
        }
    }
}

impl std::fmt::Debug for Interpreter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interpreter")
            .field("id", &self.core.id)
            .field("thread", &self.core.thread)
            .field("sub_context", &self.core.is_sub_context)
            .field("closed", &self.is_closed())
            .finish()
    }
}
