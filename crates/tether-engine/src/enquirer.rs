//! Name visibility policy for the host import hook
//!
//! The foreign import hook asks a [`NameEnquirer`] whether a dotted name refers
//! to a host package before falling back to its own module system. The engine
//! only passes the policy through as an opaque host object.

use std::collections::BTreeSet;

/// Decides which dotted names resolve to host packages
pub trait NameEnquirer: Send + Sync {
    /// Check if `name` is a host package the import hook should handle
    fn is_host_package(&self, name: &str) -> bool;

    /// Class names available directly in `package`
    fn class_names(&self, package: &str) -> Vec<String>;

    /// Sub-package names available directly in `package`
    fn sub_packages(&self, package: &str) -> Vec<String>;
}

/// Top-level package names recognized by default
pub const DEFAULT_TOP_LEVEL: &[&str] = &[
    "java", "javax", "javafx", "com", "org", "gov", "edu", "mil", "net",
];

/// Policy based purely on naming conventions.
///
/// A name is a host package if its first segment is a known top-level name,
/// or if it is dotted and its last segment starts with a lowercase letter.
#[derive(Debug, Clone)]
pub struct NamingConventionEnquirer {
    top_level: BTreeSet<String>,
}

impl NamingConventionEnquirer {
    /// Create a policy with the default top-level names
    pub fn new() -> Self {
        Self::with_top_level(std::iter::empty::<String>())
    }

    /// Create a policy with the default top-level names plus `extra`
    pub fn with_top_level(extra: impl IntoIterator<Item = impl Into<String>>) -> Self {
        let mut top_level: BTreeSet<String> =
            DEFAULT_TOP_LEVEL.iter().map(|s| s.to_string()).collect();
        top_level.extend(extra.into_iter().map(Into::into));
        Self { top_level }
    }

    /// Recognized top-level names
    pub fn top_level(&self) -> impl Iterator<Item = &str> {
        self.top_level.iter().map(String::as_str)
    }
}

impl Default for NamingConventionEnquirer {
    fn default() -> Self {
        Self::new()
    }
}

impl NameEnquirer for NamingConventionEnquirer {
    fn is_host_package(&self, name: &str) -> bool {
        if name.is_empty() {
            return false;
        }
        let first = name.split('.').next().unwrap_or(name);
        if self.top_level.contains(first) {
            return true;
        }
        match name.rsplit_once('.') {
            Some((_, last)) => last.chars().next().map_or(false, |c| c.is_lowercase()),
            None => false,
        }
    }

    fn class_names(&self, _package: &str) -> Vec<String> {
        Vec::new()
    }

    fn sub_packages(&self, _package: &str) -> Vec<String> {
        Vec::new()
    }
}
