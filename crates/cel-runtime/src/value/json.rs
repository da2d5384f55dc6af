//! JSON conversion.
//!
//! Follows the protobuf JSON mapping CEL inherits: bytes become base64
//! strings, timestamps RFC 3339 strings, durations decimal-seconds strings,
//! and non-string map keys are stringified. Non-finite doubles, errors,
//! unknowns, and absent optionals have no JSON form and convert to a
//! `TypeConversion` error.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::error::EvalError;
use crate::value::{MapKey, OptionalValue, Value};

impl Value {
    /// Convert this value to JSON.
    pub fn to_json(&self) -> Result<serde_json::Value, EvalError> {
        match self {
            Value::Null => Ok(serde_json::Value::Null),
            Value::Bool(b) => Ok(serde_json::Value::Bool(*b)),
            Value::Int(i) => Ok(serde_json::Value::Number((*i).into())),
            Value::UInt(u) => Ok(serde_json::Value::Number((*u).into())),
            Value::Double(d) => serde_json::Number::from_f64(*d)
                .map(serde_json::Value::Number)
                .ok_or_else(|| EvalError::type_conversion("non-finite double", "JSON")),
            Value::String(s) => Ok(serde_json::Value::String(s.as_cow().into_owned())),
            Value::Bytes(b) => Ok(serde_json::Value::String(BASE64.encode(b.as_cow()))),
            Value::List(l) => {
                let mut out = Vec::with_capacity(l.len());
                for v in l.iter() {
                    out.push(v.to_json()?);
                }
                Ok(serde_json::Value::Array(out))
            }
            Value::Map(m) => {
                let mut out = serde_json::Map::with_capacity(m.len());
                for (key, value) in m.iter() {
                    let name = match key {
                        MapKey::String(s) => s.to_string(),
                        MapKey::Bool(b) => b.to_string(),
                        MapKey::Int(i) => i.to_string(),
                        MapKey::UInt(u) => u.to_string(),
                    };
                    out.insert(name, value.to_json()?);
                }
                Ok(serde_json::Value::Object(out))
            }
            Value::Duration(d) => Ok(serde_json::Value::String(crate::time::format_duration(d))),
            Value::Timestamp(t) => Ok(serde_json::Value::String(crate::time::format_timestamp(t))),
            Value::Record(r) => {
                let mut out = serde_json::Map::new();
                for (name, value) in r.fields_snapshot() {
                    out.insert(name.to_string(), value.to_json()?);
                }
                Ok(serde_json::Value::Object(out))
            }
            Value::Type(t) => Ok(serde_json::Value::String(t.name())),
            Value::Optional(OptionalValue::Some(v)) => v.to_json(),
            Value::Optional(OptionalValue::None) => {
                Err(EvalError::type_conversion("optional.none", "JSON"))
            }
            Value::Error(_) => Err(EvalError::type_conversion("error", "JSON")),
            Value::Unknown(_) => Err(EvalError::type_conversion("unknown", "JSON")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scalars() {
        assert_eq!(Value::Null.to_json().unwrap(), json!(null));
        assert_eq!(Value::Bool(true).to_json().unwrap(), json!(true));
        assert_eq!(Value::Int(-3).to_json().unwrap(), json!(-3));
        assert_eq!(Value::UInt(7).to_json().unwrap(), json!(7));
        assert_eq!(Value::Double(1.5).to_json().unwrap(), json!(1.5));
        assert_eq!(Value::from("x").to_json().unwrap(), json!("x"));
        assert!(Value::Double(f64::NAN).to_json().is_err());
    }

    #[test]
    fn bytes_are_base64() {
        let v = Value::from(vec![1u8, 2, 3]);
        assert_eq!(v.to_json().unwrap(), json!("AQID"));
    }

    #[test]
    fn containers() {
        let list = Value::list([1i64, 2]);
        assert_eq!(list.to_json().unwrap(), json!([1, 2]));

        let map = Value::map([("a", 1i64), ("b", 2i64)]);
        assert_eq!(map.to_json().unwrap(), json!({"a": 1, "b": 2}));

        // Integer keys stringify.
        let map = Value::map([(1i64, Value::Bool(true))]);
        assert_eq!(map.to_json().unwrap(), json!({"1": true}));
    }

    #[test]
    fn temporal() {
        let ts = Value::timestamp(1234567890, 0);
        assert_eq!(ts.to_json().unwrap(), json!("2009-02-13T23:31:30Z"));
        let d = Value::duration(90, 0);
        assert_eq!(d.to_json().unwrap(), json!("90s"));
    }

    #[test]
    fn non_convertible() {
        assert!(Value::error(crate::error::EvalError::division_by_zero())
            .to_json()
            .is_err());
        assert!(Value::optional_none().to_json().is_err());
    }
}
