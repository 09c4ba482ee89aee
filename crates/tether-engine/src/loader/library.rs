//! Opening the native runtime library and calling its constructor

use std::ffi::c_void;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tether_sdk::{ForeignRuntime, RuntimeCreateFn, RUNTIME_ENTRY_SYMBOL};
use thiserror::Error;

/// Errors raised while locating or loading the runtime library
#[derive(Debug, Clone, Error)]
pub enum LoadError {
    /// No search directory holds the library
    #[error("Runtime library {name} not found in: {searched}")]
    NotFound {
        /// Library file name
        name: String,
        /// Searched directories, joined for display
        searched: String,
    },

    /// The platform loader refused the file
    #[error("Failed to open runtime library {path}: {reason}")]
    OpenFailed {
        /// Library path
        path: String,
        /// Loader message
        reason: String,
    },

    /// The library does not export the runtime constructor
    #[error("Runtime library {library} does not export {symbol}: {reason}")]
    SymbolNotFound {
        /// Missing symbol
        symbol: String,
        /// Library path
        library: String,
        /// Loader message
        reason: String,
    },

    /// The constructor ran but produced no runtime
    #[error("Runtime constructor failed: {0}")]
    InvalidInit(String),

    /// No library naming convention for this platform
    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(String),

    /// The path cannot be handed to the platform loader
    #[error("Invalid library path: {0}")]
    InvalidPath(String),
}

/// A mapped runtime library, unmapped on drop
pub struct NativeLibrary {
    handle: *mut c_void,
    path: PathBuf,
}

// The handle is an opaque token owned by the platform loader
unsafe impl Send for NativeLibrary {}
unsafe impl Sync for NativeLibrary {}

impl NativeLibrary {
    /// Map the library at `path`, resolving all its symbols immediately
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LoadError> {
        let path = path.as_ref();
        let handle = sys::open(path).map_err(|reason| LoadError::OpenFailed {
            path: path.display().to_string(),
            reason,
        })?;
        Ok(Self {
            handle,
            path: path.to_path_buf(),
        })
    }

    /// Resolve `symbol` as a value of type `T`.
    ///
    /// # Safety
    ///
    /// `T` must be the symbol's real (pointer-sized) type, and nothing derived
    /// from it may outlive this library.
    pub unsafe fn get<T: Copy>(&self, symbol: &str) -> Result<T, LoadError> {
        let address = sys::symbol(self.handle, symbol).map_err(|reason| {
            LoadError::SymbolNotFound {
                symbol: symbol.to_string(),
                library: self.path.display().to_string(),
                reason,
            }
        })?;
        Ok(std::mem::transmute_copy(&address))
    }

    /// Build the runtime through `tether_runtime_create`.
    ///
    /// The runtime's code lives in this library, which must stay mapped for
    /// as long as the runtime is used.
    pub fn load_runtime(&self) -> Result<Arc<dyn ForeignRuntime>, LoadError> {
        let create: RuntimeCreateFn = unsafe { self.get(RUNTIME_ENTRY_SYMBOL)? };

        let raw = unsafe { create() };
        if raw.is_null() {
            return Err(LoadError::InvalidInit(format!(
                "{} returned no runtime",
                RUNTIME_ENTRY_SYMBOL
            )));
        }

        // The constructor hands over a leaked Box<Box<dyn ForeignRuntime>>
        let runtime = unsafe { Box::from_raw(raw) };
        Ok(Arc::from(*runtime))
    }

    /// Where the library was loaded from
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for NativeLibrary {
    fn drop(&mut self) {
        sys::close(self.handle);
    }
}

impl fmt::Debug for NativeLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeLibrary")
            .field("path", &self.path)
            .finish()
    }
}

// ============================================================================
// Platform loaders
// ============================================================================

#[cfg(unix)]
mod sys {
    use std::ffi::{c_void, CStr, CString};
    use std::os::unix::ffi::OsStrExt;
    use std::path::Path;

    fn dl_error() -> Option<String> {
        let message = unsafe { libc::dlerror() };
        if message.is_null() {
            return None;
        }
        Some(unsafe { CStr::from_ptr(message) }.to_string_lossy().into_owned())
    }

    pub(super) fn open(path: &Path) -> Result<*mut c_void, String> {
        let path = CString::new(path.as_os_str().as_bytes()).map_err(|e| e.to_string())?;
        let handle = unsafe { libc::dlopen(path.as_ptr(), libc::RTLD_NOW | libc::RTLD_LOCAL) };
        if handle.is_null() {
            return Err(dl_error().unwrap_or_else(|| "dlopen failed".to_string()));
        }
        Ok(handle)
    }

    pub(super) fn symbol(handle: *mut c_void, name: &str) -> Result<*mut c_void, String> {
        let name = CString::new(name).map_err(|e| e.to_string())?;
        // A null symbol is only an error if dlerror says so
        dl_error();
        let address = unsafe { libc::dlsym(handle, name.as_ptr()) };
        match dl_error() {
            Some(message) => Err(message),
            None if address.is_null() => Err("symbol resolved to null".to_string()),
            None => Ok(address),
        }
    }

    pub(super) fn close(handle: *mut c_void) {
        if unsafe { libc::dlclose(handle) } != 0 {
            tracing::warn!(error = dl_error().as_deref().unwrap_or(""), "loader.close_failed");
        }
    }
}

#[cfg(windows)]
mod sys {
    use std::ffi::{c_void, CString};
    use std::os::windows::ffi::OsStrExt;
    use std::path::Path;

    extern "system" {
        fn LoadLibraryW(filename: *const u16) -> *mut c_void;
        fn GetProcAddress(module: *mut c_void, name: *const i8) -> *mut c_void;
        fn FreeLibrary(module: *mut c_void) -> i32;
        fn GetLastError() -> u32;
    }

    fn last_error() -> String {
        format!("Windows error {}", unsafe { GetLastError() })
    }

    pub(super) fn open(path: &Path) -> Result<*mut c_void, String> {
        let wide: Vec<u16> = path.as_os_str().encode_wide().chain(Some(0)).collect();
        let handle = unsafe { LoadLibraryW(wide.as_ptr()) };
        if handle.is_null() {
            return Err(last_error());
        }
        Ok(handle)
    }

    pub(super) fn symbol(handle: *mut c_void, name: &str) -> Result<*mut c_void, String> {
        let name = CString::new(name).map_err(|e| e.to_string())?;
        let address = unsafe { GetProcAddress(handle, name.as_ptr()) };
        if address.is_null() {
            return Err(last_error());
        }
        Ok(address)
    }

    pub(super) fn close(handle: *mut c_void) {
        if unsafe { FreeLibrary(handle) } == 0 {
            tracing::warn!(error = %last_error(), "loader.close_failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_missing_library() {
        let err = NativeLibrary::open("/nonexistent/tether-linux-amd64.so").unwrap_err();
        match err {
            LoadError::OpenFailed { path, reason } => {
                assert!(path.contains("nonexistent"));
                assert!(!reason.is_empty());
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_errors_name_the_library() {
        let err = LoadError::SymbolNotFound {
            symbol: RUNTIME_ENTRY_SYMBOL.to_string(),
            library: "/opt/tether/tether-linux-amd64.so".to_string(),
            reason: "undefined symbol".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains(RUNTIME_ENTRY_SYMBOL));
        assert!(text.contains("/opt/tether/tether-linux-amd64.so"));
    }
}
