//! Optional value constructors and accessors.

use cel_runtime_common::Kind;

use crate::error::EvalError;
use crate::record::is_zero_value;
use crate::registry::{FunctionRegistry, Overload};
use crate::value::{OptionalValue, Value};

pub fn register(registry: &mut FunctionRegistry) {
    registry.register_overload(
        "optional.of",
        Overload::global("optional_of", vec![Kind::Dyn], Kind::Opt, |args, _| {
            Value::optional_some(args[0].clone())
        }),
    );
    registry.register_overload(
        "optional.none",
        Overload::global("optional_none", vec![], Kind::Opt, |_, _| {
            Value::optional_none()
        }),
    );
    registry.register_overload(
        "optional.ofNonZeroValue",
        Overload::global(
            "optional_of_non_zero_value",
            vec![Kind::Dyn],
            Kind::Opt,
            |args, _| {
                if is_zero_value(&args[0]) {
                    Value::optional_none()
                } else {
                    Value::optional_some(args[0].clone())
                }
            },
        ),
    );

    registry.register_overload(
        "hasValue",
        Overload::method("optional_has_value", vec![Kind::Opt], Kind::Bool, |args, _| {
            match &args[0] {
                Value::Optional(opt) => Value::Bool(opt.is_present()),
                _ => Value::error(EvalError::no_matching_overload("hasValue")),
            }
        }),
    );
    registry.register_overload(
        "value",
        Overload::method("optional_value", vec![Kind::Opt], Kind::Dyn, |args, _| {
            match &args[0] {
                Value::Optional(OptionalValue::Some(v)) => (**v).clone(),
                Value::Optional(OptionalValue::None) => Value::error(
                    EvalError::invalid_argument("optional.none() dereference"),
                ),
                _ => Value::error(EvalError::no_matching_overload("value")),
            }
        }),
    );
    registry.register_overload(
        "orValue",
        Overload::method(
            "optional_or_value",
            vec![Kind::Opt, Kind::Dyn],
            Kind::Dyn,
            |args, _| match &args[0] {
                Value::Optional(OptionalValue::Some(v)) => (**v).clone(),
                Value::Optional(OptionalValue::None) => args[1].clone(),
                _ => Value::error(EvalError::no_matching_overload("orValue")),
            },
        ),
    );
}
