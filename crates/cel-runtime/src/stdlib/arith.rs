//! Arithmetic operators.
//!
//! Integer arithmetic is checked and overflows to an error value; double
//! arithmetic follows IEEE 754 and never errors. Addition doubles as
//! concatenation for strings, bytes, and lists, and as shifting for the
//! temporal types.

use cel_runtime_common::{operators, Kind};

use crate::error::EvalError;
use crate::registry::{FunctionRegistry, Overload};
use crate::value::{BytesBuffer, StrBuffer, Value};

pub fn register(registry: &mut FunctionRegistry) {
    register_add(registry);
    register_sub(registry);
    register_mul(registry);
    register_div(registry);
    register_mod(registry);
    register_negate(registry);
}

fn register_add(registry: &mut FunctionRegistry) {
    registry.register_overload(
        operators::ADD,
        Overload::global(
            "add_int64_int64",
            vec![Kind::Int, Kind::Int],
            Kind::Int,
            |args, _| match args {
                [Value::Int(a), Value::Int(b)] => a
                    .checked_add(*b)
                    .map(Value::Int)
                    .unwrap_or_else(|| Value::error(EvalError::overflow("integer overflow"))),
                _ => Value::error(EvalError::no_matching_overload(operators::ADD)),
            },
        ),
    );
    registry.register_overload(
        operators::ADD,
        Overload::global(
            "add_uint64_uint64",
            vec![Kind::Uint, Kind::Uint],
            Kind::Uint,
            |args, _| match args {
                [Value::UInt(a), Value::UInt(b)] => a
                    .checked_add(*b)
                    .map(Value::UInt)
                    .unwrap_or_else(|| {
                        Value::error(EvalError::overflow("unsigned integer overflow"))
                    }),
                _ => Value::error(EvalError::no_matching_overload(operators::ADD)),
            },
        ),
    );
    registry.register_overload(
        operators::ADD,
        Overload::global(
            "add_double_double",
            vec![Kind::Double, Kind::Double],
            Kind::Double,
            |args, _| match args {
                [Value::Double(a), Value::Double(b)] => Value::Double(a + b),
                _ => Value::error(EvalError::no_matching_overload(operators::ADD)),
            },
        ),
    );
    registry.register_overload(
        operators::ADD,
        Overload::global(
            "add_string_string",
            vec![Kind::String, Kind::String],
            Kind::String,
            |args, ctx| match args {
                [Value::String(a), Value::String(b)] => {
                    Value::String(StrBuffer::concat(a, b, ctx.options.string_backing))
                }
                _ => Value::error(EvalError::no_matching_overload(operators::ADD)),
            },
        ),
    );
    registry.register_overload(
        operators::ADD,
        Overload::global(
            "add_bytes_bytes",
            vec![Kind::Bytes, Kind::Bytes],
            Kind::Bytes,
            |args, ctx| match args {
                [Value::Bytes(a), Value::Bytes(b)] => {
                    Value::Bytes(BytesBuffer::concat(a, b, ctx.options.string_backing))
                }
                _ => Value::error(EvalError::no_matching_overload(operators::ADD)),
            },
        ),
    );
    registry.register_overload(
        operators::ADD,
        Overload::global(
            "add_list_list",
            vec![Kind::List, Kind::List],
            Kind::List,
            |args, _| match args {
                [Value::List(a), Value::List(b)] => {
                    let mut out = Vec::with_capacity(a.len() + b.len());
                    out.extend(a.iter().cloned());
                    out.extend(b.iter().cloned());
                    Value::list(out)
                }
                _ => Value::error(EvalError::no_matching_overload(operators::ADD)),
            },
        ),
    );
    registry.register_overload(
        operators::ADD,
        Overload::global(
            "add_timestamp_duration",
            vec![Kind::Timestamp, Kind::Duration],
            Kind::Timestamp,
            |args, _| match args {
                [Value::Timestamp(t), Value::Duration(d)] => match t.checked_add(d) {
                    Ok(ts) => Value::Timestamp(ts),
                    Err(err) => Value::error(err),
                },
                _ => Value::error(EvalError::no_matching_overload(operators::ADD)),
            },
        ),
    );
    registry.register_overload(
        operators::ADD,
        Overload::global(
            "add_duration_timestamp",
            vec![Kind::Duration, Kind::Timestamp],
            Kind::Timestamp,
            |args, _| match args {
                [Value::Duration(d), Value::Timestamp(t)] => match t.checked_add(d) {
                    Ok(ts) => Value::Timestamp(ts),
                    Err(err) => Value::error(err),
                },
                _ => Value::error(EvalError::no_matching_overload(operators::ADD)),
            },
        ),
    );
    registry.register_overload(
        operators::ADD,
        Overload::global(
            "add_duration_duration",
            vec![Kind::Duration, Kind::Duration],
            Kind::Duration,
            |args, _| match args {
                [Value::Duration(a), Value::Duration(b)] => match a.checked_add(b) {
                    Ok(d) => Value::Duration(d),
                    Err(err) => Value::error(err),
                },
                _ => Value::error(EvalError::no_matching_overload(operators::ADD)),
            },
        ),
    );
}

fn register_sub(registry: &mut FunctionRegistry) {
    registry.register_overload(
        operators::SUBTRACT,
        Overload::global(
            "subtract_int64_int64",
            vec![Kind::Int, Kind::Int],
            Kind::Int,
            |args, _| match args {
                [Value::Int(a), Value::Int(b)] => a
                    .checked_sub(*b)
                    .map(Value::Int)
                    .unwrap_or_else(|| Value::error(EvalError::overflow("integer overflow"))),
                _ => Value::error(EvalError::no_matching_overload(operators::SUBTRACT)),
            },
        ),
    );
    registry.register_overload(
        operators::SUBTRACT,
        Overload::global(
            "subtract_uint64_uint64",
            vec![Kind::Uint, Kind::Uint],
            Kind::Uint,
            |args, _| match args {
                [Value::UInt(a), Value::UInt(b)] => a
                    .checked_sub(*b)
                    .map(Value::UInt)
                    .unwrap_or_else(|| {
                        Value::error(EvalError::overflow("unsigned integer overflow"))
                    }),
                _ => Value::error(EvalError::no_matching_overload(operators::SUBTRACT)),
            },
        ),
    );
    registry.register_overload(
        operators::SUBTRACT,
        Overload::global(
            "subtract_double_double",
            vec![Kind::Double, Kind::Double],
            Kind::Double,
            |args, _| match args {
                [Value::Double(a), Value::Double(b)] => Value::Double(a - b),
                _ => Value::error(EvalError::no_matching_overload(operators::SUBTRACT)),
            },
        ),
    );
    registry.register_overload(
        operators::SUBTRACT,
        Overload::global(
            "subtract_timestamp_timestamp",
            vec![Kind::Timestamp, Kind::Timestamp],
            Kind::Duration,
            |args, _| match args {
                [Value::Timestamp(a), Value::Timestamp(b)] => match a.since(b) {
                    Ok(d) => Value::Duration(d),
                    Err(err) => Value::error(err),
                },
                _ => Value::error(EvalError::no_matching_overload(operators::SUBTRACT)),
            },
        ),
    );
    registry.register_overload(
        operators::SUBTRACT,
        Overload::global(
            "subtract_timestamp_duration",
            vec![Kind::Timestamp, Kind::Duration],
            Kind::Timestamp,
            |args, _| match args {
                [Value::Timestamp(t), Value::Duration(d)] => match t.checked_sub(d) {
                    Ok(ts) => Value::Timestamp(ts),
                    Err(err) => Value::error(err),
                },
                _ => Value::error(EvalError::no_matching_overload(operators::SUBTRACT)),
            },
        ),
    );
    registry.register_overload(
        operators::SUBTRACT,
        Overload::global(
            "subtract_duration_duration",
            vec![Kind::Duration, Kind::Duration],
            Kind::Duration,
            |args, _| match args {
                [Value::Duration(a), Value::Duration(b)] => match a.checked_sub(b) {
                    Ok(d) => Value::Duration(d),
                    Err(err) => Value::error(err),
                },
                _ => Value::error(EvalError::no_matching_overload(operators::SUBTRACT)),
            },
        ),
    );
}

fn register_mul(registry: &mut FunctionRegistry) {
    registry.register_overload(
        operators::MULTIPLY,
        Overload::global(
            "multiply_int64_int64",
            vec![Kind::Int, Kind::Int],
            Kind::Int,
            |args, _| match args {
                [Value::Int(a), Value::Int(b)] => a
                    .checked_mul(*b)
                    .map(Value::Int)
                    .unwrap_or_else(|| Value::error(EvalError::overflow("integer overflow"))),
                _ => Value::error(EvalError::no_matching_overload(operators::MULTIPLY)),
            },
        ),
    );
    registry.register_overload(
        operators::MULTIPLY,
        Overload::global(
            "multiply_uint64_uint64",
            vec![Kind::Uint, Kind::Uint],
            Kind::Uint,
            |args, _| match args {
                [Value::UInt(a), Value::UInt(b)] => a
                    .checked_mul(*b)
                    .map(Value::UInt)
                    .unwrap_or_else(|| {
                        Value::error(EvalError::overflow("unsigned integer overflow"))
                    }),
                _ => Value::error(EvalError::no_matching_overload(operators::MULTIPLY)),
            },
        ),
    );
    registry.register_overload(
        operators::MULTIPLY,
        Overload::global(
            "multiply_double_double",
            vec![Kind::Double, Kind::Double],
            Kind::Double,
            |args, _| match args {
                [Value::Double(a), Value::Double(b)] => Value::Double(a * b),
                _ => Value::error(EvalError::no_matching_overload(operators::MULTIPLY)),
            },
        ),
    );
}

fn register_div(registry: &mut FunctionRegistry) {
    registry.register_overload(
        operators::DIVIDE,
        Overload::global(
            "divide_int64_int64",
            vec![Kind::Int, Kind::Int],
            Kind::Int,
            |args, _| match args {
                [Value::Int(_), Value::Int(0)] => Value::error(EvalError::division_by_zero()),
                [Value::Int(a), Value::Int(b)] => a
                    .checked_div(*b)
                    .map(Value::Int)
                    .unwrap_or_else(|| Value::error(EvalError::overflow("integer overflow"))),
                _ => Value::error(EvalError::no_matching_overload(operators::DIVIDE)),
            },
        ),
    );
    registry.register_overload(
        operators::DIVIDE,
        Overload::global(
            "divide_uint64_uint64",
            vec![Kind::Uint, Kind::Uint],
            Kind::Uint,
            |args, _| match args {
                [Value::UInt(_), Value::UInt(0)] => Value::error(EvalError::division_by_zero()),
                [Value::UInt(a), Value::UInt(b)] => Value::UInt(a / b),
                _ => Value::error(EvalError::no_matching_overload(operators::DIVIDE)),
            },
        ),
    );
    registry.register_overload(
        operators::DIVIDE,
        Overload::global(
            "divide_double_double",
            vec![Kind::Double, Kind::Double],
            Kind::Double,
            |args, _| match args {
                // IEEE 754: x/0.0 is infinity or NaN, never an error.
                [Value::Double(a), Value::Double(b)] => Value::Double(a / b),
                _ => Value::error(EvalError::no_matching_overload(operators::DIVIDE)),
            },
        ),
    );
}

fn register_mod(registry: &mut FunctionRegistry) {
    registry.register_overload(
        operators::MODULO,
        Overload::global(
            "modulo_int64_int64",
            vec![Kind::Int, Kind::Int],
            Kind::Int,
            |args, _| match args {
                [Value::Int(_), Value::Int(0)] => Value::error(EvalError::modulus_by_zero()),
                [Value::Int(a), Value::Int(b)] => a
                    .checked_rem(*b)
                    .map(Value::Int)
                    .unwrap_or_else(|| Value::error(EvalError::overflow("integer overflow"))),
                _ => Value::error(EvalError::no_matching_overload(operators::MODULO)),
            },
        ),
    );
    registry.register_overload(
        operators::MODULO,
        Overload::global(
            "modulo_uint64_uint64",
            vec![Kind::Uint, Kind::Uint],
            Kind::Uint,
            |args, _| match args {
                [Value::UInt(_), Value::UInt(0)] => Value::error(EvalError::modulus_by_zero()),
                [Value::UInt(a), Value::UInt(b)] => Value::UInt(a % b),
                _ => Value::error(EvalError::no_matching_overload(operators::MODULO)),
            },
        ),
    );
}

fn register_negate(registry: &mut FunctionRegistry) {
    registry.register_overload(
        operators::NEGATE,
        Overload::global("negate_int64", vec![Kind::Int], Kind::Int, |args, _| {
            match args {
                [Value::Int(i)] => i
                    .checked_neg()
                    .map(Value::Int)
                    .unwrap_or_else(|| Value::error(EvalError::overflow("integer overflow"))),
                _ => Value::error(EvalError::no_matching_overload(operators::NEGATE)),
            }
        }),
    );
    registry.register_overload(
        operators::NEGATE,
        Overload::global("negate_double", vec![Kind::Double], Kind::Double, |args, _| {
            match args {
                [Value::Double(d)] => Value::Double(-d),
                _ => Value::error(EvalError::no_matching_overload(operators::NEGATE)),
            }
        }),
    );
}
