//! Tagged values crossing the native/scripting boundary.
//!
//! `Value` is the closed-set representation both sides agree on; `ValueType`
//! is the tag declared at a registration site (property, parameter, return).
//! Every marshal in either direction checks the runtime tag against the
//! declared one, see `marshal`.

use std::fmt;
use std::sync::Arc;

use crate::callback::CallbackHandle;
use crate::error::Result;
use crate::object::ObjectHandle;

/// Closed set of named variants for an enum-typed property or parameter.
///
/// Enum values are marshaled by variant name; the name is validated against
/// this set on every crossing.
#[derive(Debug, PartialEq, Eq)]
pub struct EnumDef {
    pub name: &'static str,
    pub variants: &'static [&'static str],
}

impl EnumDef {
    pub fn has_variant(&self, variant: &str) -> bool {
        self.variants.iter().any(|v| *v == variant)
    }
}

/// Declared type tag for a property, parameter, or return value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ValueType {
    Int,
    Float,
    Bool,
    Str,
    /// A string or the explicit absence marker (`Value::Null`).
    NullableStr,
    /// Marshaled by variant name, validated against the closed set.
    Enum(&'static EnumDef),
    Seq,
    Map,
    Callable,
    Object,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Int => write!(f, "integer"),
            ValueType::Float => write!(f, "float"),
            ValueType::Bool => write!(f, "boolean"),
            ValueType::Str => write!(f, "string"),
            ValueType::NullableStr => write!(f, "nullable string"),
            ValueType::Enum(def) => write!(f, "enum {}", def.name),
            ValueType::Seq => write!(f, "sequence"),
            ValueType::Map => write!(f, "map"),
            ValueType::Callable => write!(f, "callable"),
            ValueType::Object => write!(f, "object"),
        }
    }
}

/// A native function exposed to the scripting side as a callable value.
pub type NativeFn = Arc<dyn Fn(Vec<Value>) -> Result<Value> + Send + Sync>;

/// A first-class function value. Callables flow in both directions: the
/// scripting side passes its functions into methods as callback parameters,
/// and native methods may return functions of their own.
#[derive(Clone)]
pub enum Callable {
    /// A scripting-side function retained through the callback bridge.
    Script(CallbackHandle),
    /// A native function handed out to the scripting side.
    Native(NativeFn),
}

impl Callable {
    pub fn native<F>(f: F) -> Callable
    where
        F: Fn(Vec<Value>) -> Result<Value> + Send + Sync + 'static,
    {
        Callable::Native(Arc::new(f))
    }

    /// Invoke the callable. Script functions go through the callback bridge
    /// (redirected to the scripting context when called from a worker);
    /// native functions run inline on the calling thread.
    pub fn call(&self, args: Vec<Value>) -> Result<Value> {
        match self {
            Callable::Script(handle) => handle.invoke(args),
            Callable::Native(f) => f(args),
        }
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Callable::Script(handle) => write!(f, "[script function #{}]", handle.id()),
            Callable::Native(_) => write!(f, "[native function]"),
        }
    }
}

impl PartialEq for Callable {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Callable::Script(a), Callable::Script(b)) => a.id() == b.id(),
            (Callable::Native(a), Callable::Native(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// The tagged union crossing the boundary.
///
/// Maps preserve the key order supplied by the caller. `Null` doubles as the
/// nullable-string absence marker and the result of void method calls.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    Null,
    Seq(Vec<Value>),
    Map(Vec<(String, Value)>),
    Callable(Callable),
    Object(ObjectHandle),
}

impl Value {
    /// Short tag name used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::Bool(_) => "boolean",
            Value::Str(_) => "string",
            Value::Null => "null",
            Value::Seq(_) => "sequence",
            Value::Map(_) => "map",
            Value::Callable(_) => "callable",
            Value::Object(_) => "object",
        }
    }

    /// JSON projection for logging and diagnostics. Callables and object
    /// handles render as placeholder strings; float values outside JSON's
    /// number range render as null.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(x) => serde_json::Number::from_f64(*x)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Bool(b) => serde_json::Value::from(*b),
            Value::Str(s) => serde_json::Value::from(s.as_str()),
            Value::Null => serde_json::Value::Null,
            Value::Seq(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Map(entries) => {
                let mut map = serde_json::Map::new();
                for (key, value) in entries {
                    map.insert(key.clone(), value.to_json());
                }
                serde_json::Value::Object(map)
            }
            Value::Callable(_) => serde_json::Value::from("[function]"),
            Value::Object(handle) => serde_json::Value::from(format!("[object #{}]", handle.raw())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static COLORS: EnumDef = EnumDef {
        name: "Color",
        variants: &["red", "green", "blue"],
    };

    #[test]
    fn enum_def_knows_its_variants() {
        assert!(COLORS.has_variant("green"));
        assert!(!COLORS.has_variant("mauve"));
    }

    #[test]
    fn value_type_display_names() {
        assert_eq!(ValueType::NullableStr.to_string(), "nullable string");
        assert_eq!(ValueType::Enum(&COLORS).to_string(), "enum Color");
    }

    #[test]
    fn json_projection_preserves_map_shape() {
        let value = Value::Map(vec![
            ("num".to_string(), Value::Int(5)),
            ("flag".to_string(), Value::Bool(true)),
            ("text".to_string(), Value::Str("hi".to_string())),
            ("missing".to_string(), Value::Null),
        ]);
        let json = value.to_json();
        assert_eq!(json["num"], 5);
        assert_eq!(json["flag"], true);
        assert_eq!(json["text"], "hi");
        assert!(json["missing"].is_null());
    }

    #[test]
    fn native_callables_compare_by_identity() {
        let a = Callable::native(|_| Ok(Value::Null));
        let b = a.clone();
        let c = Callable::native(|_| Ok(Value::Null));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
