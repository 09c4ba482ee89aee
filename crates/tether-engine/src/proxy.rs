//! Host dispatch targets backed by foreign callables
//!
//! A [`ProxyBridge`] lets host code call into a foreign callable through the
//! [`InvocationHandler`] trait. It owns one reference on the callable and gives
//! it back exactly once: on [`ProxyBridge::release`] or when dropped. Proxies
//! are not tied to an interpreter and never enter a handle registry.

use std::fmt;
use std::sync::Arc;

use tether_sdk::{ForeignPtr, ForeignRuntime, ForeignValue, MethodInfo};

use crate::error::{BridgeError, BridgeResult};
use crate::resource::{Dispose, ForeignResource, ResourceId};

/// Dynamic dispatch target for host method calls
pub trait InvocationHandler: Send + Sync {
    /// Handle a call to `method` with `args`
    fn invoke(&self, method: &MethodInfo, args: &[ForeignValue]) -> BridgeResult<ForeignValue>;
}

struct ProxyDisposer {
    runtime: Arc<dyn ForeignRuntime>,
}

impl Dispose for ProxyDisposer {
    fn dispose(&self, _id: ResourceId, ptr: ForeignPtr) -> BridgeResult<()> {
        Ok(self.runtime.proxy_release(ptr)?)
    }
}

/// Invocation handler forwarding to a foreign callable
pub struct ProxyBridge {
    resource: ForeignResource,
    runtime: Arc<dyn ForeignRuntime>,
}

impl ProxyBridge {
    /// Take ownership of the callable `target`
    pub fn new(runtime: Arc<dyn ForeignRuntime>, target: ForeignPtr) -> BridgeResult<Self> {
        if target.is_null() {
            return Err(BridgeError::initialization(
                "Unable to create proxy, foreign callable is NULL.",
            ));
        }

        runtime.proxy_initialize(target)?;
        let resource = ForeignResource::new(
            target,
            ProxyDisposer {
                runtime: runtime.clone(),
            },
        )?;

        Ok(Self { resource, runtime })
    }

    /// The foreign callable, or null once released
    pub fn target(&self) -> ForeignPtr {
        self.resource.ptr()
    }

    /// Check if the callable has been given back
    pub fn is_released(&self) -> bool {
        self.resource.is_disposed()
    }

    /// Give the callable back now. Later calls are no-ops.
    pub fn release(&self) -> BridgeResult<()> {
        self.resource.dispose()?;
        Ok(())
    }
}

impl InvocationHandler for ProxyBridge {
    fn invoke(&self, method: &MethodInfo, args: &[ForeignValue]) -> BridgeResult<ForeignValue> {
        let target = self.resource.ptr();
        if target.is_null() {
            return Err(BridgeError::Validity(
                "Proxy target has been released.".to_string(),
            ));
        }
        Ok(self.runtime.proxy_invoke(target, method, args)?)
    }
}

impl Drop for ProxyBridge {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            tracing::warn!(resource = self.resource.id().as_u64(), error = %e, "proxy.release_failed");
        }
    }
}

impl fmt::Debug for ProxyBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyBridge")
            .field("target", &self.target())
            .finish()
    }
}
