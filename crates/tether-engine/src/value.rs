//! Host-side values
//!
//! [`Value`] mirrors [`ForeignValue`], except that foreign objects are held
//! through managed [`ObjectHandle`]s instead of borrowed pointers.

use std::sync::Arc;

use tether_sdk::{ForeignValue, HostObject};

use crate::error::{BridgeError, BridgeResult};
use crate::handle::ObjectHandle;
use crate::interpreter::ContextCore;

/// Value read from or passed to an interpreter
#[derive(Debug)]
pub enum Value {
    /// The foreign "no value"
    None,
    /// Boolean
    Bool(bool),
    /// Integer
    Int(i64),
    /// Floating point number
    Float(f64),
    /// Text
    Str(String),
    /// Raw bytes
    Bytes(Vec<u8>),
    /// Sequence
    List(Vec<Value>),
    /// String-keyed mapping, order preserved
    Dict(Vec<(String, Value)>),
    /// Foreign object
    Object(ObjectHandle),
    /// Opaque host object
    Host(HostObject),
}

impl Value {
    /// Convert a runtime value, taking a reference on every object it holds
    pub(crate) fn from_foreign(core: &Arc<ContextCore>, value: ForeignValue) -> BridgeResult<Value> {
        Ok(match value {
            ForeignValue::None => Value::None,
            ForeignValue::Bool(b) => Value::Bool(b),
            ForeignValue::Int(i) => Value::Int(i),
            ForeignValue::Float(f) => Value::Float(f),
            ForeignValue::Str(s) => Value::Str(s),
            ForeignValue::Bytes(b) => Value::Bytes(b),
            ForeignValue::List(items) => Value::List(
                items
                    .into_iter()
                    .map(|item| Value::from_foreign(core, item))
                    .collect::<BridgeResult<_>>()?,
            ),
            ForeignValue::Dict(entries) => Value::Dict(
                entries
                    .into_iter()
                    .map(|(k, v)| Ok((k, Value::from_foreign(core, v)?)))
                    .collect::<BridgeResult<_>>()?,
            ),
            ForeignValue::Object(ptr) => Value::Object(ObjectHandle::wrap(core, ptr)?),
            ForeignValue::Host(host) => Value::Host(host),
        })
    }

    /// Convert for a runtime call. Objects are passed as borrowed pointers.
    pub fn to_foreign(&self) -> BridgeResult<ForeignValue> {
        Ok(match self {
            Value::None => ForeignValue::None,
            Value::Bool(b) => ForeignValue::Bool(*b),
            Value::Int(i) => ForeignValue::Int(*i),
            Value::Float(f) => ForeignValue::Float(*f),
            Value::Str(s) => ForeignValue::Str(s.clone()),
            Value::Bytes(b) => ForeignValue::Bytes(b.clone()),
            Value::List(items) => ForeignValue::List(
                items
                    .iter()
                    .map(Value::to_foreign)
                    .collect::<BridgeResult<_>>()?,
            ),
            Value::Dict(entries) => ForeignValue::Dict(
                entries
                    .iter()
                    .map(|(k, v)| Ok((k.clone(), v.to_foreign()?)))
                    .collect::<BridgeResult<_>>()?,
            ),
            Value::Object(handle) => {
                if handle.is_released() {
                    return Err(BridgeError::Validity(
                        "Foreign object handle has been released.".to_string(),
                    ));
                }
                ForeignValue::Object(handle.as_ptr())
            }
            Value::Host(host) => ForeignValue::Host(host.clone()),
        })
    }

    /// Check if this is the "no value" marker
    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    /// Get as a boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get as an integer
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Get as a float (integers widen)
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Get as text
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Get as raw bytes
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Borrow the object handle
    pub fn as_object(&self) -> Option<&ObjectHandle> {
        match self {
            Value::Object(handle) => Some(handle),
            _ => None,
        }
    }

    /// Take the object handle
    pub fn into_object(self) -> Option<ObjectHandle> {
        match self {
            Value::Object(handle) => Some(handle),
            _ => None,
        }
    }

    /// Get the type name as a string
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "none",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::Bytes(_) => "bytes",
            Value::List(_) => "list",
            Value::Dict(_) => "dict",
            Value::Object(_) => "object",
            Value::Host(_) => "host",
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        use Value::*;
        match (self, other) {
            (None, None) => true,
            (Bool(a), Bool(b)) => a == b,
            (Int(a), Int(b)) => a == b,
            (Float(a), Float(b)) => a == b,
            (Str(a), Str(b)) => a == b,
            (Bytes(a), Bytes(b)) => a == b,
            (List(a), List(b)) => a == b,
            (Dict(a), Dict(b)) => a == b,
            (Object(a), Object(b)) => a.as_ptr() == b.as_ptr(),
            (Host(a), Host(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i as i64)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(b)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl From<ObjectHandle> for Value {
    fn from(handle: ObjectHandle) -> Self {
        Value::Object(handle)
    }
}

impl From<HostObject> for Value {
    fn from(host: HostObject) -> Self {
        Value::Host(host)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitives_to_foreign() {
        let value = Value::List(vec![Value::from(1), Value::from("a"), Value::None]);
        assert_eq!(
            value.to_foreign().unwrap(),
            ForeignValue::List(vec![
                ForeignValue::Int(1),
                ForeignValue::Str("a".into()),
                ForeignValue::None
            ])
        );
    }

    #[test]
    fn test_accessors() {
        assert_eq!(Value::from(3).as_int(), Some(3));
        assert_eq!(Value::from(3).as_float(), Some(3.0));
        assert_eq!(Value::from("x").as_str(), Some("x"));
        assert!(Value::from(true).as_int().is_none());
        assert_eq!(Value::Dict(vec![]).type_name(), "dict");
        assert!(Value::None.into_object().is_none());
    }
}
