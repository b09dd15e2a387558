//! Dynamic Value Model
//!
//! Template expressions are dynamically typed at the render boundary: a
//! path can resolve to a string one pass and a list the next. [`Value`]
//! is the small dynamic value the render layer traffics in, and
//! [`TrackedObject`] is the read protocol user state plugs in through.
//!
//! Values are cheap to clone: compound variants share their payload
//! behind an `Arc`. Equality is structural for data and identity for
//! objects, which is what the update short-circuit in tracked cells
//! wants: replacing an object with itself is not a change.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

/// The read protocol for user-defined reactive state.
///
/// Property reads happen inside a tracking frame, so an implementation
/// that consumes tags while computing a property (a getter reading other
/// tracked fields, say) produces transitively correct dependency sets
/// with no manual declaration.
pub trait TrackedObject: Send + Sync {
    /// Read a property. Missing properties yield [`Value::Undefined`].
    fn read(&self, key: &str) -> Value;

    /// Push every item of this object into `f`, in order, returning
    /// `true`. Objects that are not enumerable return `false` and are
    /// rejected as iteration sources.
    fn enumerate(&self, _f: &mut dyn FnMut(Value)) -> bool {
        false
    }

    /// Diagnostic label used in error messages and debug output.
    fn object_label(&self) -> &str {
        "object"
    }
}

/// A dynamically typed render value.
#[derive(Clone, Default)]
pub enum Value {
    /// Absent: a missing property or unset cell.
    #[default]
    Undefined,
    /// Present but empty.
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Arc<str>),
    /// An ordered sequence.
    List(Arc<Vec<Value>>),
    /// A keyed map; iteration follows key insertion order.
    Map(Arc<IndexMap<String, Value>>),
    /// User state behind the [`TrackedObject`] read protocol.
    Object(Arc<dyn TrackedObject>),
}

impl Value {
    /// Build a string value.
    pub fn str(s: impl AsRef<str>) -> Self {
        Value::Str(Arc::from(s.as_ref()))
    }

    /// Build a list value.
    pub fn list(items: impl IntoIterator<Item = Value>) -> Self {
        Value::List(Arc::new(items.into_iter().collect()))
    }

    /// Build a map value.
    pub fn map(entries: impl IntoIterator<Item = (String, Value)>) -> Self {
        Value::Map(Arc::new(entries.into_iter().collect()))
    }

    /// Wrap a tracked object.
    pub fn object(object: Arc<dyn TrackedObject>) -> Self {
        Value::Object(object)
    }

    /// The type name used by error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Object(_) => "object",
        }
    }

    /// Read a property off this value.
    ///
    /// Maps index their entries; objects go through [`TrackedObject::read`]
    /// (which may consume tags); lists and strings expose `length`.
    /// Everything else yields [`Value::Undefined`].
    pub fn get(&self, key: &str) -> Value {
        match self {
            Value::Map(map) => map.get(key).cloned().unwrap_or(Value::Undefined),
            Value::Object(object) => object.read(key),
            Value::List(items) if key == "length" => Value::Int(items.len() as i64),
            Value::Str(s) if key == "length" => Value::Int(s.chars().count() as i64),
            _ => Value::Undefined,
        }
    }

    /// The text this value renders as inside a text node.
    ///
    /// Absent values render empty rather than as a placeholder word.
    pub fn to_display_string(&self) -> String {
        match self {
            Value::Undefined | Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Str(s) => s.to_string(),
            Value::List(items) => items
                .iter()
                .map(Value::to_display_string)
                .collect::<Vec<_>>()
                .join(","),
            Value::Map(_) => "[map]".to_string(),
            Value::Object(object) => format!("[{}]", object.object_label()),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) => true,
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => Arc::ptr_eq(a, b) || a == b,
            (Value::Map(a), Value::Map(b)) => Arc::ptr_eq(a, b) || a == b,
            // Objects compare by identity: two distinct objects are
            // different even if every property agrees.
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "Undefined"),
            Value::Null => write!(f, "Null"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Int(i) => write!(f, "Int({i})"),
            Value::Float(v) => write!(f, "Float({v})"),
            Value::Str(s) => write!(f, "Str({s:?})"),
            Value::List(items) => f.debug_tuple("List").field(items).finish(),
            Value::Map(map) => f.debug_tuple("Map").field(map).finish(),
            Value::Object(object) => write!(f, "Object({})", object.object_label()),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::str(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(Arc::from(value.as_str()))
    }
}
