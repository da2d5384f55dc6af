//! Container builtins: sizing, membership, keyed access with defaults.

use cel_runtime_common::{operators, Kind};

use crate::error::EvalError;
use crate::registry::{FunctionRegistry, Overload};
use crate::value::Value;

pub fn register(registry: &mut FunctionRegistry) {
    register_size(registry);
    register_in(registry);
    register_get(registry);
}

fn size_of(value: &Value) -> Value {
    match value {
        // Strings size in code points, bytes in octets.
        Value::String(s) => Value::Int(s.char_len() as i64),
        Value::Bytes(b) => Value::Int(b.len() as i64),
        Value::List(l) => Value::Int(l.len() as i64),
        Value::Map(m) => Value::Int(m.len() as i64),
        other => Value::error(EvalError::no_such_overload("size", &[other.kind()])),
    }
}

fn register_size(registry: &mut FunctionRegistry) {
    for (id, kind) in [
        ("size_string", Kind::String),
        ("size_bytes", Kind::Bytes),
        ("size_list", Kind::List),
        ("size_map", Kind::Map),
    ] {
        registry.register_overload(
            "size",
            Overload::global(id, vec![kind], Kind::Int, |args, _| match args {
                [value] => size_of(value),
                _ => Value::error(EvalError::no_matching_overload("size")),
            }),
        );
    }
    for (id, kind) in [
        ("string_size", Kind::String),
        ("bytes_size", Kind::Bytes),
        ("list_size", Kind::List),
        ("map_size", Kind::Map),
    ] {
        registry.register_overload(
            "size",
            Overload::method(id, vec![kind], Kind::Int, |args, _| match args {
                [value] => size_of(value),
                _ => Value::error(EvalError::no_matching_overload("size")),
            }),
        );
    }
}

fn register_in(registry: &mut FunctionRegistry) {
    registry.register_overload(
        operators::IN,
        Overload::global(
            "in_list",
            vec![Kind::Dyn, Kind::List],
            Kind::Bool,
            |args, ctx| match args {
                [needle, Value::List(list)] => {
                    let heterogeneous = ctx.options.enable_heterogeneous_equality;
                    Value::Bool(
                        list.iter().any(|elem| needle.equals_with(elem, heterogeneous)),
                    )
                }
                _ => Value::error(EvalError::no_matching_overload(operators::IN)),
            },
        ),
    );
    registry.register_overload(
        operators::IN,
        Overload::global(
            "in_map",
            vec![Kind::Dyn, Kind::Map],
            Kind::Bool,
            |args, ctx| match args {
                [needle, Value::Map(map)] => {
                    match map.lookup(needle, ctx.options.enable_heterogeneous_equality) {
                        Ok(found) => Value::Bool(found.is_some()),
                        Err(err) => Value::error(err),
                    }
                }
                _ => Value::error(EvalError::no_matching_overload(operators::IN)),
            },
        ),
    );
}

fn register_get(registry: &mut FunctionRegistry) {
    registry.register_overload(
        "get",
        Overload::method(
            "map_get_key",
            vec![Kind::Map, Kind::Dyn],
            Kind::Dyn,
            |args, ctx| match args {
                [Value::Map(map), key] => {
                    match map.lookup(key, ctx.options.enable_heterogeneous_equality) {
                        Ok(Some(value)) => value.clone(),
                        Ok(None) => Value::error(EvalError::no_such_key(&key.to_string())),
                        Err(err) => Value::error(err),
                    }
                }
                _ => Value::error(EvalError::no_matching_overload("get")),
            },
        ),
    );
    registry.register_overload(
        "get",
        Overload::method(
            "map_get_key_default",
            vec![Kind::Map, Kind::Dyn, Kind::Dyn],
            Kind::Dyn,
            |args, ctx| match args {
                [Value::Map(map), key, default] => {
                    match map.lookup(key, ctx.options.enable_heterogeneous_equality) {
                        Ok(Some(value)) => value.clone(),
                        Ok(None) => default.clone(),
                        Err(err) => Value::error(err),
                    }
                }
                _ => Value::error(EvalError::no_matching_overload("get")),
            },
        ),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stdlib::testing::{invoke, invoke_member};

    fn registry() -> FunctionRegistry {
        let mut registry = FunctionRegistry::new();
        register(&mut registry);
        registry
    }

    #[test]
    fn sizes() {
        let r = registry();
        // Code points, not bytes.
        assert_eq!(invoke(&r, "size", &[Value::from("héllo")]), Value::Int(5));
        assert_eq!(
            invoke(&r, "size", &[Value::from(vec![1u8, 2, 3])]),
            Value::Int(3)
        );
        assert_eq!(invoke(&r, "size", &[Value::list([1i64, 2])]), Value::Int(2));
        assert_eq!(
            invoke(&r, "size", &[Value::map([("a", 1i64)])]),
            Value::Int(1)
        );
        // Receiver style resolves separately.
        assert_eq!(
            invoke_member(&r, "size", &[Value::from("ab")]),
            Value::Int(2)
        );
    }

    #[test]
    fn membership() {
        let r = registry();
        let list = Value::list([1i64, 2, 3]);
        assert_eq!(
            invoke(&r, operators::IN, &[Value::Int(2), list.clone()]),
            Value::Bool(true)
        );
        assert_eq!(
            invoke(&r, operators::IN, &[Value::Int(4), list.clone()]),
            Value::Bool(false)
        );
        // Heterogeneous membership: 2u is in [1, 2, 3].
        assert_eq!(
            invoke(&r, operators::IN, &[Value::UInt(2), list]),
            Value::Bool(true)
        );

        let map = Value::map([("a", 1i64)]);
        assert_eq!(
            invoke(&r, operators::IN, &[Value::from("a"), map.clone()]),
            Value::Bool(true)
        );
        assert_eq!(
            invoke(&r, operators::IN, &[Value::from("b"), map]),
            Value::Bool(false)
        );
    }

    #[test]
    fn get_with_default() {
        let r = registry();
        let map = Value::map([("a", 1i64)]);
        assert_eq!(
            invoke_member(&r, "get", &[map.clone(), Value::from("a")]),
            Value::Int(1)
        );
        assert!(invoke_member(&r, "get", &[map.clone(), Value::from("b")]).is_error());
        assert_eq!(
            invoke_member(&r, "get", &[map, Value::from("b"), Value::Int(0)]),
            Value::Int(0)
        );
    }
}
