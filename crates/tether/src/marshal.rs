//! Value marshaling between the scripting and native representations.
//!
//! In-process both sides share the tagged `Value` representation, so a
//! marshal is validation plus ownership transfer: the runtime tag must agree
//! with the type declared at the registration site, with no silent coercion.
//! The one widening rule is nullable string, which accepts the explicit
//! absence marker in addition to a string.
//!
//! The `FromValue`/`IntoValue` traits convert between the tagged
//! representation and concrete native types; accessor and method builders
//! use them so native code sees typed fields and arguments.

use crate::error::{BridgeError, Result};
use crate::object::ObjectHandle;
use crate::value::{Callable, Value, ValueType};

fn mismatch(expected: &ValueType, actual: &Value) -> BridgeError {
    BridgeError::mismatch(expected.to_string(), actual.kind())
}

/// Validate a scripting-side value against the declared type and produce the
/// native representation.
pub fn to_native(value: Value, expected: &ValueType) -> Result<Value> {
    check(&value, expected)?;
    Ok(value)
}

/// Validate a native-produced value against the declared type before it
/// crosses to the scripting side.
pub fn to_scripting(value: Value, declared: &ValueType) -> Result<Value> {
    check(&value, declared)?;
    Ok(value)
}

fn check(value: &Value, expected: &ValueType) -> Result<()> {
    match (expected, value) {
        (ValueType::Int, Value::Int(_))
        | (ValueType::Float, Value::Float(_))
        | (ValueType::Bool, Value::Bool(_))
        | (ValueType::Str, Value::Str(_))
        | (ValueType::NullableStr, Value::Str(_))
        | (ValueType::NullableStr, Value::Null)
        | (ValueType::Seq, Value::Seq(_))
        | (ValueType::Map, Value::Map(_))
        | (ValueType::Callable, Value::Callable(_))
        | (ValueType::Object, Value::Object(_)) => Ok(()),
        (ValueType::Enum(def), Value::Str(variant)) => {
            if def.has_variant(variant) {
                Ok(())
            } else {
                Err(BridgeError::UnknownEnumVariant {
                    enum_name: def.name.to_string(),
                    variant: variant.clone(),
                })
            }
        }
        _ => Err(mismatch(expected, value)),
    }
}

/// Conversion from the tagged representation into a concrete native type.
pub trait FromValue: Sized {
    fn from_value(value: Value) -> Result<Self>;
}

/// Conversion from a concrete native type into the tagged representation.
pub trait IntoValue {
    fn into_value(self) -> Value;
}

impl FromValue for Value {
    fn from_value(value: Value) -> Result<Value> {
        Ok(value)
    }
}

impl IntoValue for Value {
    fn into_value(self) -> Value {
        self
    }
}

impl FromValue for i64 {
    fn from_value(value: Value) -> Result<i64> {
        match value {
            Value::Int(i) => Ok(i),
            other => Err(BridgeError::mismatch("integer", other.kind())),
        }
    }
}

impl IntoValue for i64 {
    fn into_value(self) -> Value {
        Value::Int(self)
    }
}

impl FromValue for f64 {
    fn from_value(value: Value) -> Result<f64> {
        match value {
            Value::Float(x) => Ok(x),
            other => Err(BridgeError::mismatch("float", other.kind())),
        }
    }
}

impl IntoValue for f64 {
    fn into_value(self) -> Value {
        Value::Float(self)
    }
}

impl FromValue for bool {
    fn from_value(value: Value) -> Result<bool> {
        match value {
            Value::Bool(b) => Ok(b),
            other => Err(BridgeError::mismatch("boolean", other.kind())),
        }
    }
}

impl IntoValue for bool {
    fn into_value(self) -> Value {
        Value::Bool(self)
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> Result<String> {
        match value {
            Value::Str(s) => Ok(s),
            other => Err(BridgeError::mismatch("string", other.kind())),
        }
    }
}

impl IntoValue for String {
    fn into_value(self) -> Value {
        Value::Str(self)
    }
}

impl IntoValue for &str {
    fn into_value(self) -> Value {
        Value::Str(self.to_string())
    }
}

impl FromValue for Option<String> {
    fn from_value(value: Value) -> Result<Option<String>> {
        match value {
            Value::Str(s) => Ok(Some(s)),
            Value::Null => Ok(None),
            other => Err(BridgeError::mismatch("nullable string", other.kind())),
        }
    }
}

impl IntoValue for Option<String> {
    fn into_value(self) -> Value {
        match self {
            Some(s) => Value::Str(s),
            None => Value::Null,
        }
    }
}

impl FromValue for Vec<Value> {
    fn from_value(value: Value) -> Result<Vec<Value>> {
        match value {
            Value::Seq(items) => Ok(items),
            other => Err(BridgeError::mismatch("sequence", other.kind())),
        }
    }
}

impl IntoValue for Vec<Value> {
    fn into_value(self) -> Value {
        Value::Seq(self)
    }
}

impl FromValue for Vec<(String, Value)> {
    fn from_value(value: Value) -> Result<Vec<(String, Value)>> {
        match value {
            Value::Map(entries) => Ok(entries),
            other => Err(BridgeError::mismatch("map", other.kind())),
        }
    }
}

impl IntoValue for Vec<(String, Value)> {
    fn into_value(self) -> Value {
        Value::Map(self)
    }
}

impl FromValue for Callable {
    fn from_value(value: Value) -> Result<Callable> {
        match value {
            Value::Callable(callable) => Ok(callable),
            other => Err(BridgeError::mismatch("callable", other.kind())),
        }
    }
}

impl IntoValue for Callable {
    fn into_value(self) -> Value {
        Value::Callable(self)
    }
}

impl FromValue for ObjectHandle {
    fn from_value(value: Value) -> Result<ObjectHandle> {
        match value {
            Value::Object(handle) => Ok(handle),
            other => Err(BridgeError::mismatch("object", other.kind())),
        }
    }
}

impl IntoValue for ObjectHandle {
    fn into_value(self) -> Value {
        Value::Object(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::EnumDef;

    static SIDES: EnumDef = EnumDef {
        name: "Side",
        variants: &["first", "second", "third"],
    };

    #[test]
    fn matching_tags_round_trip_unchanged() {
        let cases = vec![
            (Value::Int(6723), ValueType::Int),
            (Value::Float(0.5), ValueType::Float),
            (Value::Bool(true), ValueType::Bool),
            (Value::Str("hi".to_string()), ValueType::Str),
            (Value::Seq(vec![Value::Int(1)]), ValueType::Seq),
            (
                Value::Map(vec![("k".to_string(), Value::Int(1))]),
                ValueType::Map,
            ),
        ];
        for (value, ty) in cases {
            let native = to_native(value.clone(), &ty).unwrap();
            assert_eq!(to_scripting(native, &ty).unwrap(), value);
        }
    }

    #[test]
    fn integers_and_floats_do_not_cross_coerce() {
        assert_eq!(
            to_native(Value::Float(5.0), &ValueType::Int),
            Err(BridgeError::mismatch("integer", "float"))
        );
        assert_eq!(
            to_native(Value::Int(5), &ValueType::Float),
            Err(BridgeError::mismatch("float", "integer"))
        );
    }

    #[test]
    fn nullable_string_accepts_both_forms() {
        assert!(to_native(Value::Str("set".to_string()), &ValueType::NullableStr).is_ok());
        assert!(to_native(Value::Null, &ValueType::NullableStr).is_ok());
        assert!(to_native(Value::Int(0), &ValueType::NullableStr).is_err());
        // Plain strings reject the absence marker.
        assert!(to_native(Value::Null, &ValueType::Str).is_err());
    }

    #[test]
    fn enum_values_are_validated_by_name() {
        let ty = ValueType::Enum(&SIDES);
        assert!(to_native(Value::Str("second".to_string()), &ty).is_ok());
        assert_eq!(
            to_native(Value::Str("fourth".to_string()), &ty),
            Err(BridgeError::UnknownEnumVariant {
                enum_name: "Side".to_string(),
                variant: "fourth".to_string(),
            })
        );
        assert_eq!(
            to_native(Value::Int(1), &ty),
            Err(BridgeError::mismatch("enum Side", "integer"))
        );
    }

    #[test]
    fn typed_extraction_helpers() {
        assert_eq!(i64::from_value(Value::Int(3)), Ok(3));
        assert_eq!(
            Option::<String>::from_value(Value::Null),
            Ok(None)
        );
        assert_eq!(
            String::from_value(Value::Bool(false)),
            Err(BridgeError::mismatch("string", "boolean"))
        );
        assert_eq!("abc".into_value(), Value::Str("abc".to_string()));
        assert_eq!(None::<String>.into_value(), Value::Null);
    }
}
