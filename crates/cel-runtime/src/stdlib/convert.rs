//! Type conversion functions.
//!
//! Conversions fail with `TypeConversion` or `Overflow` errors rather than
//! saturating: double to int requires a finite value in range, uint to int
//! requires no sign loss, bytes to string valid UTF-8.

use cel_runtime_common::Kind;

use crate::error::EvalError;
use crate::registry::{FunctionRegistry, Overload};
use crate::time;
use crate::value::{format_double, Duration, Timestamp, Value};

pub fn register(registry: &mut FunctionRegistry) {
    register_int(registry);
    register_uint(registry);
    register_double(registry);
    register_string(registry);
    register_bytes(registry);
    register_bool(registry);
    register_temporal(registry);
    register_type_and_dyn(registry);
}

// Exact bounds for double -> integer conversions: the first double at or
// beyond each limit is rejected.
const I64_MAX_PLUS_ONE: f64 = 9_223_372_036_854_775_808.0;
const I64_MIN_AS_F64: f64 = -9_223_372_036_854_775_808.0;
const U64_MAX_PLUS_ONE: f64 = 18_446_744_073_709_551_616.0;

fn double_to_int(d: f64) -> Value {
    if !d.is_finite() || d >= I64_MAX_PLUS_ONE || d < I64_MIN_AS_F64 {
        Value::error(EvalError::overflow("double out of int range"))
    } else {
        Value::Int(d as i64)
    }
}

fn double_to_uint(d: f64) -> Value {
    if !d.is_finite() || d >= U64_MAX_PLUS_ONE || d < 0.0 {
        Value::error(EvalError::overflow("double out of uint range"))
    } else {
        Value::UInt(d as u64)
    }
}

fn register_int(registry: &mut FunctionRegistry) {
    let overloads: Vec<Overload> = vec![
        Overload::global("int64_to_int64", vec![Kind::Int], Kind::Int, |args, _| {
            args[0].clone()
        }),
        Overload::global("uint64_to_int64", vec![Kind::Uint], Kind::Int, |args, _| {
            match &args[0] {
                Value::UInt(u) if *u <= i64::MAX as u64 => Value::Int(*u as i64),
                Value::UInt(_) => Value::error(EvalError::overflow("uint out of int range")),
                other => Value::error(EvalError::type_conversion(other.kind().as_str(), "int")),
            }
        }),
        Overload::global("double_to_int64", vec![Kind::Double], Kind::Int, |args, _| {
            match &args[0] {
                Value::Double(d) => double_to_int(*d),
                other => Value::error(EvalError::type_conversion(other.kind().as_str(), "int")),
            }
        }),
        Overload::global("string_to_int64", vec![Kind::String], Kind::Int, |args, _| {
            match &args[0] {
                Value::String(s) => s
                    .as_cow()
                    .parse::<i64>()
                    .map(Value::Int)
                    .unwrap_or_else(|_| {
                        Value::error(EvalError::type_conversion("string", "int"))
                    }),
                other => Value::error(EvalError::type_conversion(other.kind().as_str(), "int")),
            }
        }),
        Overload::global(
            "timestamp_to_int64",
            vec![Kind::Timestamp],
            Kind::Int,
            |args, _| match &args[0] {
                Value::Timestamp(t) => Value::Int(t.seconds),
                other => Value::error(EvalError::type_conversion(other.kind().as_str(), "int")),
            },
        ),
    ];
    for overload in overloads {
        registry.register_overload("int", overload);
    }
}

fn register_uint(registry: &mut FunctionRegistry) {
    let overloads: Vec<Overload> = vec![
        Overload::global("uint64_to_uint64", vec![Kind::Uint], Kind::Uint, |args, _| {
            args[0].clone()
        }),
        Overload::global("int64_to_uint64", vec![Kind::Int], Kind::Uint, |args, _| {
            match &args[0] {
                Value::Int(i) if *i >= 0 => Value::UInt(*i as u64),
                Value::Int(_) => Value::error(EvalError::overflow("negative int to uint")),
                other => Value::error(EvalError::type_conversion(other.kind().as_str(), "uint")),
            }
        }),
        Overload::global(
            "double_to_uint64",
            vec![Kind::Double],
            Kind::Uint,
            |args, _| match &args[0] {
                Value::Double(d) => double_to_uint(*d),
                other => Value::error(EvalError::type_conversion(other.kind().as_str(), "uint")),
            },
        ),
        Overload::global(
            "string_to_uint64",
            vec![Kind::String],
            Kind::Uint,
            |args, _| match &args[0] {
                Value::String(s) => s
                    .as_cow()
                    .parse::<u64>()
                    .map(Value::UInt)
                    .unwrap_or_else(|_| {
                        Value::error(EvalError::type_conversion("string", "uint"))
                    }),
                other => Value::error(EvalError::type_conversion(other.kind().as_str(), "uint")),
            },
        ),
    ];
    for overload in overloads {
        registry.register_overload("uint", overload);
    }
}

fn register_double(registry: &mut FunctionRegistry) {
    let overloads: Vec<Overload> = vec![
        Overload::global(
            "double_to_double",
            vec![Kind::Double],
            Kind::Double,
            |args, _| args[0].clone(),
        ),
        Overload::global("int64_to_double", vec![Kind::Int], Kind::Double, |args, _| {
            match &args[0] {
                Value::Int(i) => Value::Double(*i as f64),
                other => Value::error(EvalError::type_conversion(other.kind().as_str(), "double")),
            }
        }),
        Overload::global(
            "uint64_to_double",
            vec![Kind::Uint],
            Kind::Double,
            |args, _| match &args[0] {
                Value::UInt(u) => Value::Double(*u as f64),
                other => Value::error(EvalError::type_conversion(other.kind().as_str(), "double")),
            },
        ),
        Overload::global(
            "string_to_double",
            vec![Kind::String],
            Kind::Double,
            |args, _| match &args[0] {
                Value::String(s) => s
                    .as_cow()
                    .parse::<f64>()
                    .map(Value::Double)
                    .unwrap_or_else(|_| {
                        Value::error(EvalError::type_conversion("string", "double"))
                    }),
                other => Value::error(EvalError::type_conversion(other.kind().as_str(), "double")),
            },
        ),
    ];
    for overload in overloads {
        registry.register_overload("double", overload);
    }
}

fn register_string(registry: &mut FunctionRegistry) {
    let overloads: Vec<Overload> = vec![
        Overload::global(
            "string_to_string",
            vec![Kind::String],
            Kind::String,
            |args, _| args[0].clone(),
        ),
        Overload::global("int64_to_string", vec![Kind::Int], Kind::String, |args, _| {
            match &args[0] {
                Value::Int(i) => Value::from(i.to_string()),
                other => Value::error(EvalError::type_conversion(other.kind().as_str(), "string")),
            }
        }),
        Overload::global(
            "uint64_to_string",
            vec![Kind::Uint],
            Kind::String,
            |args, _| match &args[0] {
                Value::UInt(u) => Value::from(u.to_string()),
                other => Value::error(EvalError::type_conversion(other.kind().as_str(), "string")),
            },
        ),
        Overload::global(
            "double_to_string",
            vec![Kind::Double],
            Kind::String,
            |args, _| match &args[0] {
                Value::Double(d) => Value::from(format_double(*d)),
                other => Value::error(EvalError::type_conversion(other.kind().as_str(), "string")),
            },
        ),
        Overload::global("bool_to_string", vec![Kind::Bool], Kind::String, |args, _| {
            match &args[0] {
                Value::Bool(b) => Value::from(b.to_string()),
                other => Value::error(EvalError::type_conversion(other.kind().as_str(), "string")),
            }
        }),
        Overload::global(
            "bytes_to_string",
            vec![Kind::Bytes],
            Kind::String,
            |args, _| match &args[0] {
                Value::Bytes(b) => match std::str::from_utf8(&b.as_cow()) {
                    Ok(s) => Value::from(s),
                    Err(_) => Value::error(EvalError::type_conversion("bytes", "string")),
                },
                other => Value::error(EvalError::type_conversion(other.kind().as_str(), "string")),
            },
        ),
        Overload::global(
            "timestamp_to_string",
            vec![Kind::Timestamp],
            Kind::String,
            |args, _| match &args[0] {
                Value::Timestamp(t) => Value::from(time::format_timestamp(t)),
                other => Value::error(EvalError::type_conversion(other.kind().as_str(), "string")),
            },
        ),
        Overload::global(
            "duration_to_string",
            vec![Kind::Duration],
            Kind::String,
            |args, _| match &args[0] {
                Value::Duration(d) => Value::from(time::format_duration(d)),
                other => Value::error(EvalError::type_conversion(other.kind().as_str(), "string")),
            },
        ),
    ];
    for overload in overloads {
        registry.register_overload("string", overload);
    }
}

fn register_bytes(registry: &mut FunctionRegistry) {
    let overloads: Vec<Overload> = vec![
        Overload::global(
            "bytes_to_bytes",
            vec![Kind::Bytes],
            Kind::Bytes,
            |args, _| args[0].clone(),
        ),
        Overload::global(
            "string_to_bytes",
            vec![Kind::String],
            Kind::Bytes,
            |args, _| match &args[0] {
                Value::String(s) => Value::from(s.as_cow().as_bytes().to_vec()),
                other => Value::error(EvalError::type_conversion(other.kind().as_str(), "bytes")),
            },
        ),
    ];
    for overload in overloads {
        registry.register_overload("bytes", overload);
    }
}

fn register_bool(registry: &mut FunctionRegistry) {
    let overloads: Vec<Overload> = vec![
        Overload::global("bool_to_bool", vec![Kind::Bool], Kind::Bool, |args, _| {
            args[0].clone()
        }),
        Overload::global("string_to_bool", vec![Kind::String], Kind::Bool, |args, _| {
            match &args[0] {
                Value::String(s) => match s.as_cow().as_ref() {
                    "true" => Value::Bool(true),
                    "false" => Value::Bool(false),
                    _ => Value::error(EvalError::type_conversion("string", "bool")),
                },
                other => Value::error(EvalError::type_conversion(other.kind().as_str(), "bool")),
            }
        }),
    ];
    for overload in overloads {
        registry.register_overload("bool", overload);
    }
}

fn register_temporal(registry: &mut FunctionRegistry) {
    let overloads: Vec<Overload> = vec![
        Overload::global(
            "timestamp_to_timestamp",
            vec![Kind::Timestamp],
            Kind::Timestamp,
            |args, _| args[0].clone(),
        ),
        Overload::global(
            "string_to_timestamp",
            vec![Kind::String],
            Kind::Timestamp,
            |args, _| match &args[0] {
                Value::String(s) => match time::parse_timestamp(&s.as_cow()) {
                    Ok(ts) => Value::Timestamp(ts),
                    Err(err) => Value::error(err),
                },
                other => {
                    Value::error(EvalError::type_conversion(other.kind().as_str(), "timestamp"))
                }
            },
        ),
        Overload::global(
            "int64_to_timestamp",
            vec![Kind::Int],
            Kind::Timestamp,
            |args, _| match &args[0] {
                Value::Int(i) => {
                    let ts = Timestamp::from_seconds(*i);
                    if ts.is_valid() {
                        Value::Timestamp(ts)
                    } else {
                        Value::error(EvalError::overflow("timestamp out of range"))
                    }
                }
                other => {
                    Value::error(EvalError::type_conversion(other.kind().as_str(), "timestamp"))
                }
            },
        ),
    ];
    for overload in overloads {
        registry.register_overload("timestamp", overload);
    }

    let overloads: Vec<Overload> = vec![
        Overload::global(
            "duration_to_duration",
            vec![Kind::Duration],
            Kind::Duration,
            |args, _| args[0].clone(),
        ),
        Overload::global(
            "string_to_duration",
            vec![Kind::String],
            Kind::Duration,
            |args, _| match &args[0] {
                Value::String(s) => match time::parse_duration(&s.as_cow()) {
                    Ok(d) => Value::Duration(d),
                    Err(err) => Value::error(err),
                },
                other => {
                    Value::error(EvalError::type_conversion(other.kind().as_str(), "duration"))
                }
            },
        ),
        Overload::global(
            "int64_to_duration",
            vec![Kind::Int],
            Kind::Duration,
            |args, _| match &args[0] {
                Value::Int(i) => {
                    let d = Duration::from_seconds(*i);
                    if d.is_valid() {
                        Value::Duration(d)
                    } else {
                        Value::error(EvalError::overflow("duration out of range"))
                    }
                }
                other => {
                    Value::error(EvalError::type_conversion(other.kind().as_str(), "duration"))
                }
            },
        ),
    ];
    for overload in overloads {
        registry.register_overload("duration", overload);
    }
}

fn register_type_and_dyn(registry: &mut FunctionRegistry) {
    registry.register_overload(
        "type",
        Overload::global("type", vec![Kind::Dyn], Kind::Type, |args, _| {
            Value::Type(args[0].type_value())
        }),
    );
    registry.register_overload(
        "dyn",
        Overload::global("to_dyn", vec![Kind::Dyn], Kind::Dyn, |args, _| {
            args[0].clone()
        }),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EvalErrorKind;
    use crate::stdlib::testing::invoke;

    fn registry() -> FunctionRegistry {
        let mut registry = FunctionRegistry::new();
        register(&mut registry);
        registry
    }

    fn assert_error(value: Value, kind: EvalErrorKind) {
        match value {
            Value::Error(e) => assert_eq!(e.kind, kind),
            other => panic!("expected error, got {:?}", other),
        }
    }

    #[test]
    fn int_conversions() {
        let r = registry();
        assert_eq!(invoke(&r, "int", &[Value::Double(3.9)]), Value::Int(3));
        assert_eq!(invoke(&r, "int", &[Value::from("42")]), Value::Int(42));
        assert_eq!(invoke(&r, "int", &[Value::UInt(7)]), Value::Int(7));
        assert_eq!(
            invoke(&r, "int", &[Value::timestamp(100, 0)]),
            Value::Int(100)
        );

        assert_error(
            invoke(&r, "int", &[Value::UInt(u64::MAX)]),
            EvalErrorKind::Overflow,
        );
        assert_error(
            invoke(&r, "int", &[Value::Double(f64::NAN)]),
            EvalErrorKind::Overflow,
        );
        assert_error(
            invoke(&r, "int", &[Value::Double(1e19)]),
            EvalErrorKind::Overflow,
        );
        assert_error(
            invoke(&r, "int", &[Value::from("4x")]),
            EvalErrorKind::TypeConversion,
        );
    }

    #[test]
    fn uint_conversions() {
        let r = registry();
        assert_eq!(invoke(&r, "uint", &[Value::Int(7)]), Value::UInt(7));
        assert_error(
            invoke(&r, "uint", &[Value::Int(-1)]),
            EvalErrorKind::Overflow,
        );
        assert_error(
            invoke(&r, "uint", &[Value::Double(-0.5)]),
            EvalErrorKind::Overflow,
        );
    }

    #[test]
    fn string_conversions() {
        let r = registry();
        assert_eq!(invoke(&r, "string", &[Value::Int(42)]), Value::from("42"));
        assert_eq!(
            invoke(&r, "string", &[Value::Double(2.0)]),
            Value::from("2.0")
        );
        assert_eq!(
            invoke(&r, "string", &[Value::Bool(true)]),
            Value::from("true")
        );
        assert_eq!(
            invoke(&r, "string", &[Value::duration(90, 0)]),
            Value::from("90s")
        );
        assert_eq!(
            invoke(&r, "string", &[Value::timestamp(1234567890, 0)]),
            Value::from("2009-02-13T23:31:30Z")
        );
        assert_error(
            invoke(&r, "string", &[Value::from(vec![0xffu8, 0xfe])]),
            EvalErrorKind::TypeConversion,
        );
    }

    #[test]
    fn temporal_conversions() {
        let r = registry();
        assert_eq!(
            invoke(&r, "timestamp", &[Value::from("2009-02-13T23:31:30Z")]),
            Value::timestamp(1234567890, 0)
        );
        assert_eq!(
            invoke(&r, "duration", &[Value::from("1h30m")]),
            Value::duration(5400, 0)
        );
        assert!(invoke(&r, "timestamp", &[Value::from("bogus")]).is_error());
        assert!(invoke(&r, "duration", &[Value::from("bogus")]).is_error());
    }

    #[test]
    fn type_function() {
        let r = registry();
        let ty = invoke(&r, "type", &[Value::Int(1)]);
        match ty {
            Value::Type(t) => assert_eq!(t.name(), "int"),
            other => panic!("expected type, got {:?}", other),
        }
        assert_eq!(invoke(&r, "dyn", &[Value::Int(1)]), Value::Int(1));
    }
}
