//! Per-interpreter handle registry
//!
//! Tracks every foreign resource created through one interpreter so that all
//! of them can be released when the interpreter closes.

use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::error::BridgeResult;
use crate::resource::{ForeignResource, ResourceId};

/// Collection of the live foreign resources owned by one interpreter
#[derive(Debug, Default)]
pub struct HandleRegistry {
    entries: Mutex<FxHashMap<ResourceId, Arc<ForeignResource>>>,
}

impl HandleRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a resource
    pub fn add_reference(&self, resource: Arc<ForeignResource>) {
        self.entries.lock().insert(resource.id(), resource);
    }

    /// Stop tracking a resource. Returns `false` if it was not tracked.
    pub fn remove_reference(&self, id: ResourceId) -> bool {
        self.entries.lock().remove(&id).is_some()
    }

    /// Dispose every tracked resource and leave the registry empty.
    ///
    /// The collection is taken out before anything is disposed, so a failure
    /// can never cause a second release on retry. Every resource is attempted;
    /// the first error is returned.
    pub fn cleanup_all(&self) -> BridgeResult<usize> {
        let entries = std::mem::take(&mut *self.entries.lock());

        let mut disposed = 0;
        let mut first_error = None;
        for (_, resource) in entries {
            match resource.dispose() {
                Ok(true) => disposed += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::debug!(resource = resource.id().as_u64(), error = %e, "registry.dispose_failed");
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(disposed),
        }
    }

    /// Number of tracked resources
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Check if nothing is tracked
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
