//! Bridge error taxonomy
//!
//! Every public operation validates locally first and only then calls into the
//! foreign runtime, so the first four variants never reach it. Foreign errors
//! are wrapped, never swallowed, except on the cleanup worker.

use std::sync::Arc;

use tether_sdk::{ForeignError, ForeignTypeTag};
use thiserror::Error;

/// Result type for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Errors that can occur while using the bridge
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BridgeError {
    /// A foreign object or the runtime itself could not be set up
    #[error("{message}")]
    Initialization {
        /// What failed
        message: String,
        /// Underlying failure, if any
        #[source]
        cause: Option<Arc<BridgeError>>,
    },

    /// Operation on a closed context or a released handle
    #[error("{0}")]
    Validity(String),

    /// Operation from a thread that does not own the context
    #[error("{0}")]
    Concurrency(String),

    /// Error raised by the foreign runtime
    #[error("{message}")]
    Foreign {
        /// Message, possibly prefixed with bridge context
        message: String,
        /// Original foreign error
        #[source]
        source: ForeignError,
    },

    /// Bad argument detected before calling into the runtime
    #[error("{0}")]
    InvalidArgument(String),

    /// Main runtime configuration was changed after initialization
    #[error("{0}")]
    Configuration(String),
}

impl BridgeError {
    /// Create an initialization error without a cause
    pub fn initialization(message: impl Into<String>) -> Self {
        BridgeError::Initialization {
            message: message.into(),
            cause: None,
        }
    }

    /// Create an initialization error wrapping `cause`
    pub fn initialization_caused_by(message: impl Into<String>, cause: BridgeError) -> Self {
        BridgeError::Initialization {
            message: message.into(),
            cause: Some(Arc::new(cause)),
        }
    }

    /// Wrap a foreign error, prefixing its message with `context`
    pub fn foreign_with_context(context: impl Into<String>, source: ForeignError) -> Self {
        BridgeError::Foreign {
            message: context.into(),
            source,
        }
    }

    /// Foreign type tag carried by this error or by any error it wraps
    pub fn foreign_type(&self) -> ForeignTypeTag {
        match self {
            BridgeError::Foreign { source, .. } => source.foreign_type,
            BridgeError::Initialization {
                cause: Some(cause), ..
            } => cause.foreign_type(),
            _ => ForeignTypeTag::NONE,
        }
    }

    /// Check if this is an initialization error
    pub fn is_initialization(&self) -> bool {
        matches!(self, BridgeError::Initialization { .. })
    }

    /// Check if this is a validity error
    pub fn is_validity(&self) -> bool {
        matches!(self, BridgeError::Validity(_))
    }

    /// Check if this is a concurrency error
    pub fn is_concurrency(&self) -> bool {
        matches!(self, BridgeError::Concurrency(_))
    }

    /// Check if this error came from the foreign runtime
    pub fn is_foreign(&self) -> bool {
        matches!(self, BridgeError::Foreign { .. })
    }
}

impl From<ForeignError> for BridgeError {
    fn from(source: ForeignError) -> Self {
        BridgeError::Foreign {
            message: source.message.clone(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_foreign_error_keeps_tag() {
        let tag = ForeignTypeTag::new(0x42);
        let err: BridgeError = ForeignError::typed("KeyError: 'x'", tag).into();

        assert!(err.is_foreign());
        assert_eq!(err.to_string(), "KeyError: 'x'");
        assert_eq!(err.foreign_type(), tag);
    }

    #[test]
    fn test_tag_survives_nested_wrapping() {
        let tag = ForeignTypeTag::new(0x7);
        let inner = BridgeError::foreign_with_context(
            "Error importing shared module alpha",
            ForeignError::typed("boom", tag),
        );
        let outer = BridgeError::initialization_caused_by("startup failed", inner);

        assert!(outer.is_initialization());
        assert_eq!(outer.foreign_type(), tag);
        assert_eq!(outer.to_string(), "startup failed");
    }

    #[test]
    fn test_local_errors_have_no_tag() {
        let err = BridgeError::Validity("closed".into());
        assert!(err.foreign_type().is_none());
        assert_eq!(err.clone(), err);
        assert_ne!(err, BridgeError::Concurrency("closed".into()));
    }

    #[test]
    fn test_initialization_cause_is_source() {
        use std::error::Error as _;

        let cause = BridgeError::initialization("runtime home not found");
        let err = BridgeError::initialization_caused_by("Failed to initialize.", cause.clone());

        let source = err.source().unwrap();
        assert_eq!(source.to_string(), "runtime home not found");
        assert!(BridgeError::initialization("plain").source().is_none());
        assert_eq!(err.clone(), err);
        assert_ne!(err, cause);
    }
}
