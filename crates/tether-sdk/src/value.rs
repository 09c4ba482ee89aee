//! Opaque handles and the pass-through value model
//!
//! Values crossing the foreign call interface are deliberately shallow:
//! primitives are copied, containers are copied element-wise, and foreign
//! objects travel as raw [`ForeignPtr`]s. Object pointers returned by the
//! runtime are *borrowed*; whoever keeps one takes its own reference.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Opaque handle to a foreign execution state (0 = none)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct StateHandle(u64);

impl StateHandle {
    /// The null execution state
    pub const NULL: StateHandle = StateHandle(0);

    /// Wrap a raw state value
    pub const fn from_raw(raw: u64) -> Self {
        StateHandle(raw)
    }

    /// Get the raw state value
    pub const fn as_raw(&self) -> u64 {
        self.0
    }

    /// Check if this is the null state
    pub const fn is_null(&self) -> bool {
        self.0 == 0
    }
}

/// Opaque pointer to a foreign object (0 = null)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ForeignPtr(u64);

impl ForeignPtr {
    /// The null object pointer
    pub const NULL: ForeignPtr = ForeignPtr(0);

    /// Wrap a raw pointer value
    pub const fn from_raw(raw: u64) -> Self {
        ForeignPtr(raw)
    }

    /// Get the raw pointer value
    pub const fn as_raw(&self) -> u64 {
        self.0
    }

    /// Check if this is the null pointer
    pub const fn is_null(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for ForeignPtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Opaque host object handed to the foreign runtime unchanged.
///
/// Used for the shared importer, name enquirer, class loader and output
/// sinks. The foreign side may downcast it if it knows the concrete type.
#[derive(Clone)]
pub struct HostObject(Arc<dyn Any + Send + Sync>);

impl HostObject {
    /// Wrap a host value
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        HostObject(Arc::new(value))
    }

    /// Wrap an already shared host value
    pub fn from_arc(value: Arc<dyn Any + Send + Sync>) -> Self {
        HostObject(value)
    }

    /// Borrow the host value as a concrete type
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }

    /// Identity comparison
    pub fn ptr_eq(&self, other: &HostObject) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for HostObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostObject({:p})", Arc::as_ptr(&self.0))
    }
}

/// Value passed to or returned from the foreign runtime
#[derive(Debug, Clone)]
pub enum ForeignValue {
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
    List(Vec<ForeignValue>),
    /// String-keyed mapping, order preserved
    Dict(Vec<(String, ForeignValue)>),
    /// Borrowed reference to a foreign object
    Object(ForeignPtr),
    /// Opaque host object
    Host(HostObject),
}

impl ForeignValue {
    /// Check if this is the "no value" marker
    pub fn is_none(&self) -> bool {
        matches!(self, ForeignValue::None)
    }

    /// Get the kind of this value
    pub fn kind(&self) -> ValueKind {
        match self {
            ForeignValue::None => ValueKind::Any,
            ForeignValue::Bool(_) => ValueKind::Bool,
            ForeignValue::Int(_) => ValueKind::Int,
            ForeignValue::Float(_) => ValueKind::Float,
            ForeignValue::Str(_) => ValueKind::Str,
            ForeignValue::Bytes(_) => ValueKind::Bytes,
            ForeignValue::List(_) => ValueKind::List,
            ForeignValue::Dict(_) => ValueKind::Dict,
            ForeignValue::Object(_) => ValueKind::Object,
            ForeignValue::Host(_) => ValueKind::Host,
        }
    }

    /// Get the type name as a string
    pub fn type_name(&self) -> &'static str {
        match self {
            ForeignValue::None => "none",
            other => other.kind().name(),
        }
    }
}

impl PartialEq for ForeignValue {
    fn eq(&self, other: &Self) -> bool {
        use ForeignValue::*;
        match (self, other) {
            (None, None) => true,
            (Bool(a), Bool(b)) => a == b,
            (Int(a), Int(b)) => a == b,
            (Float(a), Float(b)) => a == b,
            (Str(a), Str(b)) => a == b,
            (Bytes(a), Bytes(b)) => a == b,
            (List(a), List(b)) => a == b,
            (Dict(a), Dict(b)) => a == b,
            (Object(a), Object(b)) => a == b,
            (Host(a), Host(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl From<bool> for ForeignValue {
    fn from(b: bool) -> Self {
        ForeignValue::Bool(b)
    }
}

impl From<i64> for ForeignValue {
    fn from(i: i64) -> Self {
        ForeignValue::Int(i)
    }
}

impl From<i32> for ForeignValue {
    fn from(i: i32) -> Self {
        ForeignValue::Int(i as i64)
    }
}

impl From<f64> for ForeignValue {
    fn from(f: f64) -> Self {
        ForeignValue::Float(f)
    }
}

impl From<&str> for ForeignValue {
    fn from(s: &str) -> Self {
        ForeignValue::Str(s.to_string())
    }
}

impl From<String> for ForeignValue {
    fn from(s: String) -> Self {
        ForeignValue::Str(s)
    }
}

impl From<Vec<u8>> for ForeignValue {
    fn from(b: Vec<u8>) -> Self {
        ForeignValue::Bytes(b)
    }
}

/// Conversion target requested from the foreign runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ValueKind {
    /// Whatever the runtime considers the natural host representation
    #[default]
    Any,
    /// Boolean
    Bool,
    /// Integer
    Int,
    /// Floating point number
    Float,
    /// Text
    Str,
    /// Raw bytes
    Bytes,
    /// Sequence
    List,
    /// Mapping
    Dict,
    /// Keep it as a foreign object
    Object,
    /// Opaque host object
    Host,
}

impl ValueKind {
    /// Get the kind name as a string
    pub fn name(&self) -> &'static str {
        match self {
            ValueKind::Any => "any",
            ValueKind::Bool => "bool",
            ValueKind::Int => "int",
            ValueKind::Float => "float",
            ValueKind::Str => "str",
            ValueKind::Bytes => "bytes",
            ValueKind::List => "list",
            ValueKind::Dict => "dict",
            ValueKind::Object => "object",
            ValueKind::Host => "host",
        }
    }
}

/// Dispatch metadata for a proxied host method call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodInfo {
    /// Method name
    pub name: String,
    /// Name of the host interface declaring the method
    pub declaring_type: String,
    /// Number of declared parameters
    pub parameter_count: usize,
}

impl MethodInfo {
    /// Create method metadata
    pub fn new(
        name: impl Into<String>,
        declaring_type: impl Into<String>,
        parameter_count: usize,
    ) -> Self {
        Self {
            name: name.into(),
            declaring_type: declaring_type.into(),
            parameter_count,
        }
    }
}
