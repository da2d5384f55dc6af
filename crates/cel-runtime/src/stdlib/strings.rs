//! String predicates.

use cel_runtime_common::Kind;

use crate::error::EvalError;
use crate::registry::{FunctionRegistry, Overload};
use crate::value::Value;

pub fn register(registry: &mut FunctionRegistry) {
    registry.register_overload(
        "contains",
        Overload::method(
            "string_contains_string",
            vec![Kind::String, Kind::String],
            Kind::Bool,
            |args, _| match args {
                [Value::String(s), Value::String(sub)] => {
                    Value::Bool(s.as_cow().contains(sub.as_cow().as_ref()))
                }
                _ => Value::error(EvalError::no_matching_overload("contains")),
            },
        ),
    );
    registry.register_overload(
        "startsWith",
        Overload::method(
            "string_starts_with_string",
            vec![Kind::String, Kind::String],
            Kind::Bool,
            |args, _| match args {
                [Value::String(s), Value::String(prefix)] => {
                    Value::Bool(s.as_cow().starts_with(prefix.as_cow().as_ref()))
                }
                _ => Value::error(EvalError::no_matching_overload("startsWith")),
            },
        ),
    );
    registry.register_overload(
        "endsWith",
        Overload::method(
            "string_ends_with_string",
            vec![Kind::String, Kind::String],
            Kind::Bool,
            |args, _| match args {
                [Value::String(s), Value::String(suffix)] => {
                    Value::Bool(s.as_cow().ends_with(suffix.as_cow().as_ref()))
                }
                _ => Value::error(EvalError::no_matching_overload("endsWith")),
            },
        ),
    );

    // `matches` exists in both receiver and global styles.
    registry.register_overload(
        "matches",
        Overload::method(
            "string_matches_string",
            vec![Kind::String, Kind::String],
            Kind::Bool,
            |args, _| regex_match(args),
        ),
    );
    registry.register_overload(
        "matches",
        Overload::global(
            "matches_string_string",
            vec![Kind::String, Kind::String],
            Kind::Bool,
            |args, _| regex_match(args),
        ),
    );
}

fn regex_match(args: &[Value]) -> Value {
    match args {
        [Value::String(subject), Value::String(pattern)] => {
            match regex::Regex::new(&pattern.as_cow()) {
                Ok(re) => Value::Bool(re.is_match(&subject.as_cow())),
                Err(e) => Value::error(EvalError::invalid_argument(format!(
                    "invalid regex: {}",
                    e
                ))),
            }
        }
        _ => Value::error(EvalError::no_matching_overload("matches")),
    }
}
