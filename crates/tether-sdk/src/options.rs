//! Global initialization options for the main runtime

use std::path::PathBuf;

/// Settings applied once, before the foreign runtime's global initialization.
///
/// Every flag is `None` unless explicitly set, in which case the runtime's own
/// default (usually its environment) applies.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InitOptions {
    /// Skip the implicit site import
    pub no_site: Option<i32>,
    /// Do not add the user site directory to the search path
    pub no_user_site_directory: Option<i32>,
    /// Ignore runtime-specific environment variables
    pub ignore_environment: Option<i32>,
    /// Verbosity level
    pub verbose: Option<i32>,
    /// Optimization level
    pub optimize: Option<i32>,
    /// Do not write compiled bytecode caches
    pub dont_write_bytecode: Option<i32>,
    /// Hash randomization setting
    pub hash_randomization: Option<i32>,
    /// Runtime home directory
    pub home: Option<PathBuf>,
}

impl InitOptions {
    /// Create empty options
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the no-site flag
    pub fn no_site(mut self, value: i32) -> Self {
        self.no_site = Some(value);
        self
    }

    /// Set the no-user-site-directory flag
    pub fn no_user_site_directory(mut self, value: i32) -> Self {
        self.no_user_site_directory = Some(value);
        self
    }

    /// Set the ignore-environment flag
    pub fn ignore_environment(mut self, value: i32) -> Self {
        self.ignore_environment = Some(value);
        self
    }

    /// Set the verbosity level
    pub fn verbose(mut self, value: i32) -> Self {
        self.verbose = Some(value);
        self
    }

    /// Set the optimization level
    pub fn optimize(mut self, value: i32) -> Self {
        self.optimize = Some(value);
        self
    }

    /// Set the dont-write-bytecode flag
    pub fn dont_write_bytecode(mut self, value: i32) -> Self {
        self.dont_write_bytecode = Some(value);
        self
    }

    /// Set the hash randomization setting
    pub fn hash_randomization(mut self, value: i32) -> Self {
        self.hash_randomization = Some(value);
        self
    }

    /// Set the runtime home directory
    pub fn home(mut self, home: impl Into<PathBuf>) -> Self {
        self.home = Some(home.into());
        self
    }

    /// Check if no option was set
    pub fn is_empty(&self) -> bool {
        *self == InitOptions::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_options_builder() {
        let options = InitOptions::new().no_site(1).optimize(2).home("/opt/rt");

        assert_eq!(options.no_site, Some(1));
        assert_eq!(options.optimize, Some(2));
        assert!(options.verbose.is_none());
        assert_eq!(options.home.as_deref(), Some(std::path::Path::new("/opt/rt")));
        assert!(!options.is_empty());
        assert!(InitOptions::default().is_empty());
    }
}
