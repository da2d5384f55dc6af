//! Equality, ordering, and the boolean builtins.
//!
//! Equality and the orderings take `dyn` operands: the numeric semantics
//! depend on the heterogeneous-equality option at call time, so the choice
//! cannot be baked into the signature.

use cel_runtime_common::{operators, Kind};

use crate::error::EvalError;
use crate::registry::{FunctionRegistry, Overload};
use crate::value::Value;

pub fn register(registry: &mut FunctionRegistry) {
    registry.register_overload(
        operators::EQUALS,
        Overload::global(
            "equals",
            vec![Kind::Dyn, Kind::Dyn],
            Kind::Bool,
            |args, ctx| match args {
                [a, b] => Value::Bool(
                    a.equals_with(b, ctx.options.enable_heterogeneous_equality),
                ),
                _ => Value::error(EvalError::no_matching_overload(operators::EQUALS)),
            },
        ),
    );
    registry.register_overload(
        operators::NOT_EQUALS,
        Overload::global(
            "not_equals",
            vec![Kind::Dyn, Kind::Dyn],
            Kind::Bool,
            |args, ctx| match args {
                [a, b] => Value::Bool(
                    !a.equals_with(b, ctx.options.enable_heterogeneous_equality),
                ),
                _ => Value::error(EvalError::no_matching_overload(operators::NOT_EQUALS)),
            },
        ),
    );

    register_ordering(registry, operators::LESS, "less", |o| {
        o == std::cmp::Ordering::Less
    });
    register_ordering(registry, operators::LESS_EQUALS, "less_equals", |o| {
        o != std::cmp::Ordering::Greater
    });
    register_ordering(registry, operators::GREATER, "greater", |o| {
        o == std::cmp::Ordering::Greater
    });
    register_ordering(registry, operators::GREATER_EQUALS, "greater_equals", |o| {
        o != std::cmp::Ordering::Less
    });

    registry.register_overload(
        operators::LOGICAL_NOT,
        Overload::global("logical_not", vec![Kind::Bool], Kind::Bool, |args, _| {
            match args {
                [Value::Bool(b)] => Value::Bool(!b),
                _ => Value::error(EvalError::no_matching_overload(operators::LOGICAL_NOT)),
            }
        }),
    );

    // The comprehension loop guard: only a literal `false` stops the loop,
    // so errors and unknowns pass through as `true`. Non-strict so they
    // reach the implementation at all.
    registry.register_overload(
        operators::NOT_STRICTLY_FALSE,
        Overload::global(
            "not_strictly_false",
            vec![Kind::Dyn],
            Kind::Bool,
            |args, _| match args {
                [Value::Bool(b)] => Value::Bool(*b),
                _ => Value::Bool(true),
            },
        )
        .non_strict(),
    );
}

fn register_ordering(
    registry: &mut FunctionRegistry,
    name: &str,
    id: &str,
    accept: fn(std::cmp::Ordering) -> bool,
) {
    let function = name.to_string();
    registry.register_overload(
        name,
        Overload::global(id, vec![Kind::Dyn, Kind::Dyn], Kind::Bool, move |args, ctx| {
            match args {
                [a, b] => match a.compare_with(b, ctx.options.enable_heterogeneous_equality) {
                    Some(ordering) => Value::Bool(accept(ordering)),
                    None => Value::error(EvalError::no_such_overload(
                        &function,
                        &[a.kind(), b.kind()],
                    )),
                },
                _ => Value::error(EvalError::no_matching_overload(&function)),
            }
        }),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EvalErrorKind;
    use crate::options::RuntimeOptions;
    use crate::stdlib::testing::{invoke, invoke_with};

    fn registry() -> FunctionRegistry {
        let mut registry = FunctionRegistry::new();
        register(&mut registry);
        registry
    }

    #[test]
    fn heterogeneous_equality_follows_option() {
        let r = registry();
        assert_eq!(
            invoke(&r, operators::EQUALS, &[Value::Int(1), Value::UInt(1)]),
            Value::Bool(true)
        );
        let mut options = RuntimeOptions::default();
        options.enable_heterogeneous_equality = false;
        assert_eq!(
            invoke_with(
                &r,
                operators::EQUALS,
                &[Value::Int(1), Value::UInt(1)],
                &options
            ),
            Value::Bool(false)
        );
        // Same-kind equality is unaffected.
        assert_eq!(
            invoke_with(
                &r,
                operators::EQUALS,
                &[Value::Int(1), Value::Int(1)],
                &options
            ),
            Value::Bool(true)
        );
    }

    #[test]
    fn orderings() {
        let r = registry();
        assert_eq!(
            invoke(&r, operators::LESS, &[Value::Int(1), Value::Int(2)]),
            Value::Bool(true)
        );
        assert_eq!(
            invoke(&r, operators::GREATER_EQUALS, &[Value::Int(2), Value::Int(2)]),
            Value::Bool(true)
        );
        assert_eq!(
            invoke(
                &r,
                operators::LESS,
                &[Value::from("a"), Value::from("b")]
            ),
            Value::Bool(true)
        );
        assert_eq!(
            invoke(&r, operators::LESS, &[Value::Int(-1), Value::UInt(0)]),
            Value::Bool(true)
        );

        let err = invoke(&r, operators::LESS, &[Value::Int(1), Value::from("x")]);
        match err {
            Value::Error(e) => assert_eq!(e.kind, EvalErrorKind::NoSuchOverload),
            other => panic!("expected error, got {:?}", other),
        }

        let mut options = RuntimeOptions::default();
        options.enable_heterogeneous_equality = false;
        let err = invoke_with(
            &r,
            operators::LESS,
            &[Value::Int(1), Value::UInt(2)],
            &options,
        );
        assert!(err.is_error());
    }

    #[test]
    fn logical_not() {
        let r = registry();
        assert_eq!(
            invoke(&r, operators::LOGICAL_NOT, &[Value::Bool(true)]),
            Value::Bool(false)
        );
    }

    #[test]
    fn not_strictly_false_passes_errors() {
        let r = registry();
        assert_eq!(
            invoke(
                &r,
                operators::NOT_STRICTLY_FALSE,
                &[Value::error(EvalError::division_by_zero())]
            ),
            Value::Bool(true)
        );
        assert_eq!(
            invoke(&r, operators::NOT_STRICTLY_FALSE, &[Value::Bool(false)]),
            Value::Bool(false)
        );
        assert_eq!(
            invoke(&r, operators::NOT_STRICTLY_FALSE, &[Value::Bool(true)]),
            Value::Bool(true)
        );
    }
}
