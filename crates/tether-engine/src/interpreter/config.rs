//! Interpreter configuration

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use tether_sdk::HostObject;

use crate::cleanup::ReferenceQueue;
use crate::enquirer::NameEnquirer;

/// Settings applied when an interpreter is created.
///
/// None of these affect the bridge's own lifecycle rules; they are handed to
/// the foreign runtime as setup statements or opaque host objects.
#[derive(Clone, Default)]
pub struct Config {
    /// Buffer incomplete statements passed to `eval` until they compile
    pub interactive: bool,
    /// Directories appended to the runtime's module search path
    pub include_paths: Vec<PathBuf>,
    /// Host class loader handed to the runtime
    pub class_loader: Option<HostObject>,
    /// Policy deciding which names resolve to host packages
    pub name_enquirer: Option<Arc<dyn NameEnquirer>>,
    /// Redirect the runtime's standard streams
    pub redirect_output_streams: bool,
    /// Sink for redirected standard output
    pub redirect_stdout: Option<HostObject>,
    /// Sink for redirected standard error
    pub redirect_stderr: Option<HostObject>,
    /// Modules imported once by the main runtime and shared by every interpreter
    pub shared_modules: BTreeSet<String>,
    /// Queue receiving handles dropped without release (default: the global worker)
    pub cleanup: Option<ReferenceQueue>,
}

impl Config {
    /// Create a default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set interactive eval mode
    pub fn interactive(mut self, interactive: bool) -> Self {
        self.interactive = interactive;
        self
    }

    /// Replace the include paths
    pub fn include_path(mut self, paths: impl IntoIterator<Item = impl Into<PathBuf>>) -> Self {
        self.include_paths = paths.into_iter().map(Into::into).collect();
        self
    }

    /// Append include paths
    pub fn add_include_paths(mut self, paths: impl IntoIterator<Item = impl Into<PathBuf>>) -> Self {
        self.include_paths.extend(paths.into_iter().map(Into::into));
        self
    }

    /// Set the host class loader
    pub fn class_loader(mut self, loader: HostObject) -> Self {
        self.class_loader = Some(loader);
        self
    }

    /// Set the name visibility policy
    pub fn name_enquirer(mut self, enquirer: Arc<dyn NameEnquirer>) -> Self {
        self.name_enquirer = Some(enquirer);
        self
    }

    /// Enable or disable output redirection
    pub fn redirect_output_streams(mut self, redirect: bool) -> Self {
        self.redirect_output_streams = redirect;
        self
    }

    /// Redirect standard output to `sink`
    pub fn redirect_stdout(mut self, sink: HostObject) -> Self {
        self.redirect_stdout = Some(sink);
        self
    }

    /// Redirect standard error to `sink`
    pub fn redirect_stderr(mut self, sink: HostObject) -> Self {
        self.redirect_stderr = Some(sink);
        self
    }

    /// Replace the shared module set
    pub fn shared_modules(mut self, modules: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.shared_modules = modules.into_iter().map(Into::into).collect();
        self
    }

    /// Add shared modules
    pub fn add_shared_modules(mut self, modules: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.shared_modules.extend(modules.into_iter().map(Into::into));
        self
    }

    /// Post dropped handles to `queue` instead of the global cleanup worker
    pub fn cleanup_queue(mut self, queue: ReferenceQueue) -> Self {
        self.cleanup = Some(queue);
        self
    }

    /// Check if shared modules are configured
    pub fn has_shared_modules(&self) -> bool {
        !self.shared_modules.is_empty()
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("interactive", &self.interactive)
            .field("include_paths", &self.include_paths)
            .field("class_loader", &self.class_loader)
            .field("name_enquirer", &self.name_enquirer.is_some())
            .field("redirect_output_streams", &self.redirect_output_streams)
            .field("shared_modules", &self.shared_modules)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let config = Config::new()
            .interactive(true)
            .include_path(["/a"])
            .add_include_paths(["/b", "/c"])
            .shared_modules(["numpy"])
            .add_shared_modules(["pandas", "numpy"]);

        assert!(config.interactive);
        assert_eq!(config.include_paths.len(), 3);
        assert_eq!(config.shared_modules.len(), 2);
        assert!(config.has_shared_modules());
        assert!(!Config::default().has_shared_modules());
    }
}
