//! Native runtime library discovery and loading

mod library;
mod platform;

pub use library::{LoadError, NativeLibrary};
pub use platform::{LibraryLocator, Platform, DEFAULT_COMPONENT, LIBRARY_PATH_ENV};
