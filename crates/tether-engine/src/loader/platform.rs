//! Platform naming convention and search for the native runtime library
//!
//! Native runtime builds are named `<component>-<os>-<arch><ext>`, for example
//! `tether-linux-amd64.so`, `tether-windows-x64.dll` or
//! `tether-macosx-aarch64.dylib`.

use std::env;
use std::path::{Path, PathBuf};

use super::library::LoadError;

/// Environment variable listing extra directories to search
pub const LIBRARY_PATH_ENV: &str = "TETHER_LIBRARY_PATH";

/// Default component name of the runtime library
pub const DEFAULT_COMPONENT: &str = "tether";

/// Host platform as seen by the library naming convention
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Platform {
    system: &'static str,
    machine: &'static str,
    extension: &'static str,
}

impl Platform {
    /// Platform this binary was compiled for
    pub fn current() -> Result<Self, LoadError> {
        Self::from_parts(env::consts::OS, env::consts::ARCH)
    }

    /// Map an OS / architecture pair (as in `std::env::consts`) to a platform
    pub fn from_parts(os: &str, arch: &str) -> Result<Self, LoadError> {
        let unsupported = || LoadError::UnsupportedPlatform(format!("{}-{}", os, arch));

        let (system, extension) = match os {
            "windows" => ("windows", ".dll"),
            "linux" => ("linux", ".so"),
            "macos" => ("macosx", ".dylib"),
            "solaris" | "illumos" => ("solaris", ".so"),
            _ => return Err(unsupported()),
        };

        let machine = match (system, arch) {
            ("windows", "x86_64") => "x64",
            ("windows", "x86") => "x86",
            ("windows", "aarch64") => "arm64",
            ("solaris", "x86_64") => "amd64",
            ("solaris", "x86") => "x86",
            ("solaris", "sparc64") => "sparcv9",
            ("solaris", "sparc") => "sparc",
            (_, "x86_64") => "amd64",
            (_, "x86") => "i386",
            (_, "aarch64") => "aarch64",
            (_, "powerpc") => "ppc",
            (_, "powerpc64") => "ppc64",
            (_, "sparc64") => "sparc64",
            _ => return Err(unsupported()),
        };

        Ok(Platform {
            system,
            machine,
            extension,
        })
    }

    /// Lower-case OS name in the convention
    pub fn system(&self) -> &'static str {
        self.system
    }

    /// Architecture name in the convention
    pub fn machine(&self) -> &'static str {
        self.machine
    }

    /// Library file extension, including the dot
    pub fn library_ext(&self) -> &'static str {
        self.extension
    }

    /// `<os>-<arch><ext>`
    pub fn library_suffix(&self) -> String {
        format!("{}-{}{}", self.system, self.machine, self.extension)
    }

    /// `<component>-<os>-<arch><ext>`
    pub fn library_name(&self, component: &str) -> String {
        format!("{}-{}", component, self.library_suffix())
    }
}

/// Finds the runtime library file for the current platform
#[derive(Debug, Clone)]
pub struct LibraryLocator {
    component: String,
    search_dirs: Vec<PathBuf>,
    use_env: bool,
    use_exe_dir: bool,
}

impl LibraryLocator {
    /// Search configured directories, then `TETHER_LIBRARY_PATH`, then the
    /// directory of the current executable
    pub fn new() -> Self {
        Self {
            component: DEFAULT_COMPONENT.to_string(),
            search_dirs: Vec::new(),
            use_env: true,
            use_exe_dir: true,
        }
    }

    /// Look only in the given directories
    pub fn only(dirs: impl IntoIterator<Item = impl Into<PathBuf>>) -> Self {
        Self {
            component: DEFAULT_COMPONENT.to_string(),
            search_dirs: dirs.into_iter().map(Into::into).collect(),
            use_env: false,
            use_exe_dir: false,
        }
    }

    /// Change the component name
    pub fn component(mut self, component: impl Into<String>) -> Self {
        self.component = component.into();
        self
    }

    /// Add a directory to search before the defaults
    pub fn search_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.search_dirs.push(dir.into());
        self
    }

    /// Directories that will be searched, in order
    pub fn candidate_dirs(&self) -> Vec<PathBuf> {
        let mut dirs = self.search_dirs.clone();
        if self.use_env {
            if let Some(paths) = env::var_os(LIBRARY_PATH_ENV) {
                dirs.extend(env::split_paths(&paths));
            }
        }
        if self.use_exe_dir {
            if let Some(dir) = env::current_exe().ok().and_then(|p| p.parent().map(Path::to_path_buf)) {
                dirs.push(dir);
            }
        }
        dirs
    }

    /// File name looked for on `platform`
    pub fn library_name(&self, platform: &Platform) -> String {
        platform.library_name(&self.component)
    }

    /// Find the library for the current platform
    pub fn locate(&self) -> Result<PathBuf, LoadError> {
        self.locate_for(&Platform::current()?)
    }

    /// Find the library for `platform`
    pub fn locate_for(&self, platform: &Platform) -> Result<PathBuf, LoadError> {
        let name = self.library_name(platform);
        let dirs = self.candidate_dirs();

        dirs.iter()
            .map(|dir| dir.join(&name))
            .find(|candidate| candidate.is_file())
            .ok_or_else(|| LoadError::NotFound {
                name,
                searched: dirs
                    .iter()
                    .map(|d| d.display().to_string())
                    .collect::<Vec<_>>()
                    .join(", "),
            })
    }
}

impl Default for LibraryLocator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_names() {
        let linux = Platform::from_parts("linux", "x86_64").unwrap();
        assert_eq!(linux.library_name("tether"), "tether-linux-amd64.so");

        let windows = Platform::from_parts("windows", "x86").unwrap();
        assert_eq!(windows.library_suffix(), "windows-x86.dll");

        let mac = Platform::from_parts("macos", "aarch64").unwrap();
        assert_eq!(mac.library_name("tether"), "tether-macosx-aarch64.dylib");

        let solaris = Platform::from_parts("solaris", "sparc64").unwrap();
        assert_eq!(solaris.machine(), "sparcv9");
    }

    #[test]
    fn test_unsupported_platform() {
        assert!(matches!(
            Platform::from_parts("haiku", "x86_64"),
            Err(LoadError::UnsupportedPlatform(_))
        ));
        assert!(Platform::from_parts("linux", "riscv64").is_err());
    }

    #[test]
    fn test_locate_in_configured_dir() {
        let dir = tempfile::tempdir().unwrap();
        let platform = Platform::from_parts("linux", "x86_64").unwrap();
        let locator = LibraryLocator::only([dir.path()]).component("probe");

        assert!(matches!(
            locator.locate_for(&platform),
            Err(LoadError::NotFound { .. })
        ));

        let file = dir.path().join("probe-linux-amd64.so");
        std::fs::write(&file, b"").unwrap();
        assert_eq!(locator.locate_for(&platform).unwrap(), file);
    }
}
