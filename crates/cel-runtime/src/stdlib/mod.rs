//! The CEL standard library, registered as function overloads.
//!
//! The planner lowers `_&&_`, `_||_`, `_?_:_`, and `_[_]_` to dedicated
//! steps; every other operator and builtin dispatches through the registry
//! like any user function. Overload ids follow the cel conventions
//! (`add_int64_int64`, `string_contains_string`, …).

mod arith;
mod compare;
mod containers;
mod convert;
mod optionals;
mod strings;
mod temporal;

use crate::registry::FunctionRegistry;

/// Build a registry holding the full standard library.
pub fn standard_functions() -> FunctionRegistry {
    let mut registry = FunctionRegistry::new();
    arith::register(&mut registry);
    compare::register(&mut registry);
    containers::register(&mut registry);
    convert::register(&mut registry);
    strings::register(&mut registry);
    temporal::register(&mut registry);
    optionals::register(&mut registry);
    registry
}

#[cfg(test)]
pub(crate) mod testing {
    use crate::arena::Allocator;
    use crate::options::RuntimeOptions;
    use crate::record::EmptyRecordProvider;
    use crate::registry::{CallContext, FunctionRegistry, Resolution};
    use crate::value::Value;
    use cel_runtime_common::Kind;

    /// Resolve and invoke a registered function directly, the way the
    /// evaluator's call step does.
    pub fn invoke(registry: &FunctionRegistry, name: &str, args: &[Value]) -> Value {
        invoke_with(registry, name, args, &RuntimeOptions::default())
    }

    pub fn invoke_with(
        registry: &FunctionRegistry,
        name: &str,
        args: &[Value],
        options: &RuntimeOptions,
    ) -> Value {
        let kinds: Vec<Kind> = args.iter().map(Value::kind).collect();
        let provider = EmptyRecordProvider;
        let ctx = CallContext {
            provider: &provider,
            allocator: Allocator::heap(),
            options,
        };
        match registry.resolve(name, &kinds, false, &[]) {
            Resolution::Matched(overload) => overload.call(args, &ctx),
            other => panic!("'{}' did not resolve: {:?}", name, other),
        }
    }

    /// Invoke a receiver-style overload.
    pub fn invoke_member(registry: &FunctionRegistry, name: &str, args: &[Value]) -> Value {
        let kinds: Vec<Kind> = args.iter().map(Value::kind).collect();
        let provider = EmptyRecordProvider;
        let options = RuntimeOptions::default();
        let ctx = CallContext {
            provider: &provider,
            allocator: Allocator::heap(),
            options: &options,
        };
        match registry.resolve(name, &kinds, true, &[]) {
            Resolution::Matched(overload) => overload.call(args, &ctx),
            other => panic!("'{}' did not resolve: {:?}", name, other),
        }
    }
}
