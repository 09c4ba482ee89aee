//! Managed handles to foreign objects
//!
//! An [`ObjectHandle`] owns exactly one foreign reference: it takes it with
//! one `incref` when created and gives it back with one `decref`, whichever of
//! these happens first:
//!
//! - an explicit [`ObjectHandle::release`]
//! - the interpreter closing
//! - the cleanup worker picking the handle up after it was dropped unreleased
//!
//! Every operation checks that the interpreter is open, that the caller is on
//! the interpreter's thread and that the handle was not released.

use std::fmt;
use std::ops::Deref;
use std::sync::{Arc, Weak};

use tether_sdk::{ForeignPtr, StateHandle, ValueKind};

use crate::error::{BridgeError, BridgeResult};
use crate::interpreter::{ContextCore, InterpreterId};
use crate::resource::{Dispose, ForeignResource, ResourceId};
use crate::value::Value;

/// Gives a handle's reference back through its interpreter.
///
/// Holds the interpreter weakly; once the interpreter is closed (or gone)
/// there is no execution state left to decrement against and nothing is done.
/// The pointer is zeroed under the interpreter's state lock, so a close can
/// never slip between zeroing and decrementing.
struct HandleDisposer {
    core: Weak<ContextCore>,
}

impl Dispose for HandleDisposer {
    fn dispose(&self, id: ResourceId, ptr: ForeignPtr) -> BridgeResult<()> {
        let Some(core) = self.core.upgrade() else {
            return Ok(());
        };
        core.registry.remove_reference(id);
        core.decref(ptr)
    }

    fn guard(&self, step: &mut dyn FnMut() -> BridgeResult<bool>) -> BridgeResult<bool> {
        match self.core.upgrade() {
            Some(core) => core.hold_open(step),
            None => step(),
        }
    }
}

// ============================================================================
// ObjectHandle
// ============================================================================

/// Host-side owner of one reference to a foreign object
pub struct ObjectHandle {
    resource: Arc<ForeignResource>,
    core: Arc<ContextCore>,
}

impl ObjectHandle {
    /// Take a reference on `ptr` and enroll it in the interpreter's registry
    pub(crate) fn wrap(core: &Arc<ContextCore>, ptr: ForeignPtr) -> BridgeResult<Self> {
        if ptr.is_null() {
            return Err(BridgeError::initialization(
                "Unable to create object handle, foreign pointer is NULL.",
            ));
        }

        let state = core.validate()?;
        core.runtime.incref(state, ptr)?;

        let disposer = HandleDisposer {
            core: Arc::downgrade(core),
        };
        let resource = Arc::new(ForeignResource::new(ptr, disposer)?);
        core.registry.add_reference(resource.clone());

        Ok(Self {
            resource,
            core: core.clone(),
        })
    }

    /// The foreign pointer, or null once released
    pub fn as_ptr(&self) -> ForeignPtr {
        self.resource.ptr()
    }

    /// Check if the reference has been given back
    pub fn is_released(&self) -> bool {
        self.resource.is_disposed()
    }

    /// Interpreter this handle belongs to
    pub fn interpreter_id(&self) -> InterpreterId {
        self.core.id
    }

    fn validate(&self) -> BridgeResult<(StateHandle, ForeignPtr)> {
        let state = self.core.validate()?;
        let ptr = self.resource.ptr();
        if ptr.is_null() {
            return Err(BridgeError::Validity(
                "Foreign object handle has been released.".to_string(),
            ));
        }
        Ok((state, ptr))
    }

    /// Check if the object has attribute `name`
    pub fn has_attr(&self, name: &str) -> BridgeResult<bool> {
        let (state, ptr) = self.validate()?;
        Ok(self.core.runtime.has_attr(state, ptr, name)?)
    }

    /// Read attribute `name`
    pub fn get_attr(&self, name: &str) -> BridgeResult<Value> {
        self.get_attr_as(name, ValueKind::Any)
    }

    /// Read attribute `name`, converted to `kind`
    pub fn get_attr_as(&self, name: &str, kind: ValueKind) -> BridgeResult<Value> {
        let (state, ptr) = self.validate()?;
        let value = self.core.runtime.get_attr(state, ptr, name, kind)?;
        Value::from_foreign(&self.core, value)
    }

    /// Set attribute `name`
    pub fn set_attr(&self, name: &str, value: impl Into<Value>) -> BridgeResult<()> {
        let (state, ptr) = self.validate()?;
        let value = value.into().to_foreign()?;
        Ok(self.core.runtime.set_attr(state, ptr, name, value)?)
    }

    /// Delete attribute `name`
    pub fn del_attr(&self, name: &str) -> BridgeResult<()> {
        let (state, ptr) = self.validate()?;
        Ok(self.core.runtime.del_attr(state, ptr, name)?)
    }

    /// Foreign equality with `other`
    pub fn equals(&self, other: &Value) -> BridgeResult<bool> {
        let (state, ptr) = self.validate()?;
        let other = other.to_foreign()?;
        Ok(self.core.runtime.equals(state, ptr, &other)?)
    }

    /// Foreign hash of the object
    pub fn hash_value(&self) -> BridgeResult<i64> {
        let (state, ptr) = self.validate()?;
        Ok(self.core.runtime.hash(state, ptr)?)
    }

    /// Foreign string conversion of the object
    pub fn to_foreign_string(&self) -> BridgeResult<String> {
        let (state, ptr) = self.validate()?;
        Ok(self.core.runtime.object_str(state, ptr)?)
    }

    /// Give the reference back now.
    ///
    /// A handle that was already released (explicitly, by its interpreter
    /// closing, or by the cleanup worker) is left alone.
    pub fn release(&self) -> BridgeResult<()> {
        if self.resource.is_disposed() {
            return Ok(());
        }
        self.core.validate()?;
        self.resource.dispose()?;
        Ok(())
    }
}

impl Drop for ObjectHandle {
    fn drop(&mut self) {
        if !self.resource.is_disposed() {
            self.core.queue.post(self.resource.clone());
        }
    }
}

impl fmt::Debug for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectHandle")
            .field("ptr", &self.as_ptr())
            .field("interpreter", &self.core.id)
            .finish()
    }
}

// ============================================================================
// ModuleHandle
// ============================================================================

/// Handle to an imported foreign module
#[derive(Debug)]
pub struct ModuleHandle {
    object: ObjectHandle,
}

impl ModuleHandle {
    pub(crate) fn wrap(core: &Arc<ContextCore>, ptr: ForeignPtr) -> BridgeResult<Self> {
        Ok(Self {
            object: ObjectHandle::wrap(core, ptr)?,
        })
    }

    /// Import `name` relative to this module
    pub fn import_submodule(&self, name: &str) -> BridgeResult<ModuleHandle> {
        let (state, ptr) = self.object.validate()?;
        let sub = self.object.core.runtime.import_submodule(state, ptr, name)?;
        ModuleHandle::wrap(&self.object.core, sub)
    }

    /// Read a module attribute
    pub fn get(&self, name: &str) -> BridgeResult<Value> {
        self.get_as(name, ValueKind::Any)
    }

    /// Read a module attribute, converted to `kind`
    pub fn get_as(&self, name: &str, kind: ValueKind) -> BridgeResult<Value> {
        let (state, ptr) = self.object.validate()?;
        let value = self
            .object
            .core
            .runtime
            .get_module_object(state, ptr, name, kind)?;
        Value::from_foreign(&self.object.core, value)
    }

    /// Unwrap into the underlying object handle
    pub fn into_object(self) -> ObjectHandle {
        self.object
    }
}

impl Deref for ModuleHandle {
    type Target = ObjectHandle;

    fn deref(&self) -> &ObjectHandle {
        &self.object
    }
}
