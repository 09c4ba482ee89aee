//! Process-wide main runtime
//!
//! The foreign runtime's global initialization happens exactly once, on a
//! dedicated `tether-main-runtime` thread that then stays alive for the rest
//! of the process. Shared modules are imported on that thread through a
//! rendezvous exchange: one outstanding request at a time, each answered by
//! exactly one result, so imports from different interpreters are strictly
//! serialized.
//!
//! A failed initialization is cached; every later attempt gets the same error
//! without the runtime being touched again.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use crossbeam::channel::{self, Receiver, Sender};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use tether_sdk::{ForeignPtr, ForeignResult, ForeignRuntime, InitOptions, StateHandle};

use crate::error::{BridgeError, BridgeResult};
use crate::loader::{LibraryLocator, NativeLibrary};

/// Environment variable naming the runtime home directory
pub const HOME_ENV: &str = "TETHER_HOME";

/// Name of the main runtime's owner thread
pub const OWNER_THREAD_NAME: &str = "tether-main-runtime";

// ============================================================================
// Configuration
// ============================================================================

/// Where the foreign runtime comes from
#[derive(Clone)]
pub enum RuntimeSource {
    /// Load the platform's native runtime library
    Native(LibraryLocator),
    /// Use a runtime constructed by the host
    Embedded(Arc<dyn ForeignRuntime>),
}

impl fmt::Debug for RuntimeSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeSource::Native(locator) => f.debug_tuple("Native").field(locator).finish(),
            RuntimeSource::Embedded(_) => f.write_str("Embedded"),
        }
    }
}

/// Settings for the one-time global initialization
#[derive(Debug, Clone)]
pub struct MainConfig {
    /// Runtime to initialize
    pub source: RuntimeSource,
    /// Global initialization flags
    pub options: InitOptions,
    /// Arguments handed to the runtime together with the shared modules
    pub argv: Vec<String>,
}

impl MainConfig {
    /// Load the native runtime library with default options
    pub fn native() -> Self {
        Self {
            source: RuntimeSource::Native(LibraryLocator::new()),
            options: InitOptions::default(),
            argv: Vec::new(),
        }
    }

    /// Use an already constructed runtime
    pub fn embedded(runtime: Arc<dyn ForeignRuntime>) -> Self {
        Self {
            source: RuntimeSource::Embedded(runtime),
            options: InitOptions::default(),
            argv: Vec::new(),
        }
    }

    /// Native configuration read from the environment.
    ///
    /// `TETHER_LIBRARY_PATH` is consulted by the library locator and
    /// `TETHER_HOME` becomes the runtime home.
    pub fn from_env() -> Self {
        let mut config = Self::native();
        if let Some(home) = std::env::var_os(HOME_ENV) {
            config.options.home = Some(PathBuf::from(home));
        }
        config
    }

    /// Set the global initialization flags
    pub fn options(mut self, options: InitOptions) -> Self {
        self.options = options;
        self
    }

    /// Set the arguments handed to the runtime
    pub fn argv(mut self, argv: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.argv = argv.into_iter().map(Into::into).collect();
        self
    }
}

impl Default for MainConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

// ============================================================================
// Process-wide state
// ============================================================================

enum MainState {
    Uninitialized(MainConfig),
    Ready(Arc<MainRuntime>),
    Failed(BridgeError),
}

static MAIN: Lazy<Mutex<MainState>> =
    Lazy::new(|| Mutex::new(MainState::Uninitialized(MainConfig::default())));

fn configure_with(update: impl FnOnce(&mut MainConfig)) -> BridgeResult<()> {
    match &mut *MAIN.lock() {
        MainState::Uninitialized(config) => {
            update(config);
            Ok(())
        }
        _ => Err(BridgeError::Configuration(
            "The main runtime has already been initialized; configure it before creating the first interpreter."
                .to_string(),
        )),
    }
}

// ============================================================================
// MainRuntime
// ============================================================================

struct Exchange {
    requests: Sender<String>,
    results: Receiver<ForeignResult<ForeignPtr>>,
}

/// The initialized main runtime
pub struct MainRuntime {
    runtime: Arc<dyn ForeignRuntime>,
    main_state: StateHandle,
    library_name: Option<String>,
    exchange: Mutex<Exchange>,
    // Keeps the native library mapped; the runtime's code lives in it
    _library: Option<NativeLibrary>,
}

impl MainRuntime {
    /// Replace the configuration used for initialization.
    ///
    /// Fails with `Configuration` once the main runtime has been initialized
    /// (or has failed to).
    pub fn configure(config: MainConfig) -> BridgeResult<()> {
        configure_with(|current| *current = config)
    }

    /// Set the global initialization flags
    pub fn set_init_options(options: InitOptions) -> BridgeResult<()> {
        configure_with(|current| current.options = options)
    }

    /// Set the arguments handed to the runtime with the shared modules
    pub fn set_shared_modules_argv(argv: Vec<String>) -> BridgeResult<()> {
        configure_with(|current| current.argv = argv)
    }

    /// Check if initialization has succeeded
    pub fn is_initialized() -> bool {
        matches!(&*MAIN.lock(), MainState::Ready(_))
    }

    /// Get the main runtime, initializing it on first use.
    ///
    /// Once initialization has failed, every call returns that same error.
    pub fn instance() -> BridgeResult<Arc<MainRuntime>> {
        let mut main = MAIN.lock();
        let config = match &*main {
            MainState::Ready(runtime) => return Ok(runtime.clone()),
            MainState::Failed(error) => return Err(error.clone()),
            MainState::Uninitialized(config) => config.clone(),
        };

        match Self::initialize(config) {
            Ok(runtime) => {
                let runtime = Arc::new(runtime);
                tracing::info!(
                    library = runtime.library_name.as_deref().unwrap_or("<embedded>"),
                    "main_runtime.ready"
                );
                *main = MainState::Ready(runtime.clone());
                Ok(runtime)
            }
            Err(error) => {
                tracing::error!(error = %error, "main_runtime.init_failed");
                *main = MainState::Failed(error.clone());
                Err(error)
            }
        }
    }

    fn initialize(config: MainConfig) -> BridgeResult<MainRuntime> {
        let fail = |cause: BridgeError| {
            BridgeError::initialization_caused_by("Failed to initialize the main runtime.", cause)
        };

        let (runtime, library) = match config.source {
            RuntimeSource::Embedded(runtime) => (runtime, None),
            RuntimeSource::Native(locator) => {
                let load = || {
                    let path = locator.locate()?;
                    let library = NativeLibrary::open(&path)?;
                    let runtime = library.load_runtime()?;
                    Ok::<_, crate::loader::LoadError>((runtime, library))
                };
                let (runtime, library) =
                    load().map_err(|e| fail(BridgeError::initialization(e.to_string())))?;
                (runtime, Some(library))
            }
        };
        let library_name = library.as_ref().map(|l| l.path().display().to_string());

        let (init_tx, init_rx) = channel::bounded::<ForeignResult<StateHandle>>(1);
        let (request_tx, request_rx) = channel::bounded::<String>(0);
        let (result_tx, result_rx) = channel::bounded::<ForeignResult<ForeignPtr>>(0);

        let owner_runtime = runtime.clone();
        let options = config.options;
        let argv = config.argv;
        thread::Builder::new()
            .name(OWNER_THREAD_NAME.to_string())
            .spawn(move || {
                let state = match owner_runtime.initialize_main(&options, &argv) {
                    Ok(state) => state,
                    Err(e) => {
                        let _ = init_tx.send(Err(e));
                        return;
                    }
                };
                if init_tx.send(Ok(state)).is_err() {
                    return;
                }
                Self::serve(owner_runtime.as_ref(), state, request_rx, result_tx);
            })
            .map_err(|e| fail(BridgeError::initialization(format!("Failed to spawn {}: {}", OWNER_THREAD_NAME, e))))?;

        let main_state = match init_rx.recv() {
            Ok(Ok(state)) => state,
            Ok(Err(foreign)) => return Err(fail(BridgeError::from(foreign))),
            Err(_) => {
                return Err(fail(BridgeError::initialization(format!(
                    "{} exited during initialization",
                    OWNER_THREAD_NAME
                ))))
            }
        };

        Ok(MainRuntime {
            runtime,
            main_state,
            library_name,
            exchange: Mutex::new(Exchange {
                requests: request_tx,
                results: result_rx,
            }),
            _library: library,
        })
    }

    /// Owner thread body after initialization: answer import requests, then
    /// stay parked for the life of the process.
    fn serve(
        runtime: &dyn ForeignRuntime,
        state: StateHandle,
        requests: Receiver<String>,
        results: Sender<ForeignResult<ForeignPtr>>,
    ) {
        for name in requests.iter() {
            tracing::debug!(module = %name, "main_runtime.shared_import");
            if results.send(runtime.import_module(state, &name)).is_err() {
                break;
            }
        }

        loop {
            thread::park();
        }
    }

    /// The foreign runtime
    pub fn runtime(&self) -> &Arc<dyn ForeignRuntime> {
        &self.runtime
    }

    /// Execution state created by the global initialization
    pub fn main_state(&self) -> StateHandle {
        self.main_state
    }

    /// Path of the loaded native library, if the runtime came from one
    pub fn library_name(&self) -> Option<&str> {
        self.library_name.as_deref()
    }

    /// Import `name` on the owner thread.
    ///
    /// Blocks until this request and every request submitted before it have
    /// been answered. Shared modules are owned by the main runtime and are
    /// never released.
    pub fn shared_import(&self, name: &str) -> BridgeResult<ForeignPtr> {
        let exchange = self.exchange.lock();

        let gone = || {
            BridgeError::initialization(format!("{} is no longer running.", OWNER_THREAD_NAME))
        };
        exchange.requests.send(name.to_string()).map_err(|_| gone())?;
        let result = exchange.results.recv().map_err(|_| gone())?;

        result.map_err(|source| {
            BridgeError::foreign_with_context(
                format!("Error importing shared module {}", name),
                source,
            )
        })
    }
}

impl fmt::Debug for MainRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MainRuntime")
            .field("main_state", &self.main_state)
            .field("library", &self.library_name)
            .finish()
    }
}

// ============================================================================
// SharedImporter
// ============================================================================

/// Host object given to the shared module hook of each interpreter.
///
/// The foreign hook downcasts it and calls [`SharedImporter::import`] to get
/// modules owned by the main runtime.
#[derive(Debug, Clone)]
pub struct SharedImporter {
    main: Arc<MainRuntime>,
}

impl SharedImporter {
    /// Create an importer backed by `main`
    pub fn new(main: Arc<MainRuntime>) -> Self {
        Self { main }
    }

    /// Import a shared module through the main runtime
    pub fn import(&self, name: &str) -> BridgeResult<ForeignPtr> {
        self.main.shared_import(name)
    }
}
