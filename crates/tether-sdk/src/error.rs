//! Error types signalled across the foreign call interface

use std::fmt;

/// Result type for foreign calls
pub type ForeignResult<T> = Result<T, ForeignError>;

/// Opaque marker for the foreign type of an error.
///
/// The host never interprets the tag. It only carries it so that an error
/// routed back into the foreign runtime can be raised again with its
/// original type. `ForeignTypeTag::NONE` means "no foreign type".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ForeignTypeTag(u64);

impl ForeignTypeTag {
    /// No foreign type recorded
    pub const NONE: ForeignTypeTag = ForeignTypeTag(0);

    /// Wrap a raw tag value
    pub const fn new(raw: u64) -> Self {
        ForeignTypeTag(raw)
    }

    /// Get the raw tag value
    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    /// Check if a foreign type was recorded
    pub const fn is_none(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for ForeignTypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Error raised by the foreign runtime during a call
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ForeignError {
    /// Human readable message produced by the foreign runtime
    pub message: String,
    /// Foreign type of the error
    pub foreign_type: ForeignTypeTag,
}

impl ForeignError {
    /// Create an error without a foreign type
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            foreign_type: ForeignTypeTag::NONE,
        }
    }

    /// Create an error carrying a foreign type tag
    pub fn typed(message: impl Into<String>, foreign_type: ForeignTypeTag) -> Self {
        Self {
            message: message.into(),
            foreign_type,
        }
    }
}

impl From<String> for ForeignError {
    fn from(s: String) -> Self {
        ForeignError::new(s)
    }
}

impl From<&str> for ForeignError {
    fn from(s: &str) -> Self {
        ForeignError::new(s)
    }
}
