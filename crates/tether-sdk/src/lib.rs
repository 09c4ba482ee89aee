//! Tether SDK - the foreign call interface
//!
//! This crate defines the boundary between the tether engine and an embedded
//! reference-counted runtime, without depending on the engine itself. A native
//! runtime library implements [`ForeignRuntime`] and exports a constructor for
//! it; the engine only ever talks to the trait.
//!
//! # Example
//!
//! ```ignore
//! use tether_sdk::{ForeignRuntime, RecordingRuntime, ValueKind};
//!
//! let runtime = RecordingRuntime::new();
//! let state = runtime.init(None, false, true)?;
//! runtime.execute(state, "answer = 42")?;
//! let answer = runtime.get_object(state, "answer", ValueKind::Int)?;
//! ```

#![warn(missing_docs)]

mod error;
mod options;
pub mod recording;
mod runtime;
mod value;

pub use error::{ForeignError, ForeignResult, ForeignTypeTag};
pub use options::InitOptions;
pub use recording::RecordingRuntime;
pub use runtime::ForeignRuntime;
pub use value::{ForeignPtr, ForeignValue, HostObject, MethodInfo, StateHandle, ValueKind};

/// Name of the symbol a native runtime library exports.
///
/// The symbol must have the signature
/// `extern "C" fn() -> *mut Box<dyn ForeignRuntime>` and return a
/// heap-allocated runtime the caller takes ownership of.
pub const RUNTIME_ENTRY_SYMBOL: &str = "tether_runtime_create";

/// Signature of the exported runtime constructor
pub type RuntimeCreateFn = unsafe extern "C" fn() -> *mut Box<dyn ForeignRuntime>;
