//! Tether Engine
//!
//! Resource-safety layer for embedding a reference-counted foreign runtime
//! in a Rust process:
//! - **Handles**: host-side owners of one foreign reference each (`handle`)
//! - **Interpreters**: isolated execution states bound to one thread (`interpreter`)
//! - **Cleanup**: backstop reclamation of handles dropped without release (`cleanup`)
//! - **Main runtime**: one-time global initialization and shared imports (`main_runtime`)
//! - **Proxies**: host dispatch targets backed by foreign callables (`proxy`)
//!
//! # Example
//!
//! ```rust,ignore
//! use tether_engine::{Config, Interpreter};
//!
//! let interp = Interpreter::new(Config::new().include_path(["/opt/scripts"]))?;
//! interp.exec("import json")?;
//! let module = interp.import_module("json")?;
//! let dumps = module.get("dumps")?;
//! module.release()?;
//! interp.close()?;
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

// ============================================================================
// Core Modules
// ============================================================================

/// Bridge error taxonomy
pub mod error;

/// Foreign-owned resources shared by handles and proxies
pub mod resource;

/// Per-interpreter handle registry
pub mod registry;

/// Cleanup worker and its notification queue
pub mod cleanup;

/// Managed handles to foreign objects
pub mod handle;

/// Host-side values
pub mod value;

/// Interpreters and their configuration
pub mod interpreter;

/// Process-wide main runtime
pub mod main_runtime;

/// Proxy bridge
pub mod proxy;

/// Native runtime library discovery
pub mod loader;

/// Name visibility policy
pub mod enquirer;

#[cfg(test)]
pub(crate) mod testing;

// ============================================================================
// Re-exports
// ============================================================================

pub use cleanup::{CleanupWorker, ReferenceQueue, DEFAULT_POLL_INTERVAL, DEFAULT_STOP_WAIT};
pub use enquirer::{NameEnquirer, NamingConventionEnquirer};
pub use error::{BridgeError, BridgeResult};
pub use handle::{ModuleHandle, ObjectHandle};
pub use interpreter::{Config, EvalOutcome, Interpreter, InterpreterId};
pub use loader::{LibraryLocator, LoadError, NativeLibrary, Platform};
pub use main_runtime::{MainConfig, MainRuntime, RuntimeSource, SharedImporter};
pub use proxy::{InvocationHandler, ProxyBridge};
pub use registry::HandleRegistry;
pub use resource::{Dispose, ForeignResource, ResourceId};
pub use value::Value;

pub use tether_sdk;
