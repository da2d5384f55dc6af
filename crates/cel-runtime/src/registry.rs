//! Function registration and overload resolution.
//!
//! Functions are registered before any evaluation runs, keyed by name with
//! one [`Overload`] per concrete signature. Resolution filters by arity and
//! receiver style, checks kind compatibility (`Dyn` matches anything), and
//! prefers exact kind matches over `Dyn` matches, breaking ties by
//! registration order.

use std::collections::HashMap;
use std::sync::Arc;

use cel_runtime_common::Kind;

use crate::arena::Allocator;
use crate::options::RuntimeOptions;
use crate::record::RecordProvider;
use crate::value::Value;

/// Everything a function implementation may consult besides its arguments:
/// the record provider (descriptor pool and message factory in one), the
/// allocator, and the runtime options.
pub struct CallContext<'a> {
    pub provider: &'a dyn RecordProvider,
    pub allocator: Allocator<'a>,
    pub options: &'a RuntimeOptions,
}

/// A function implementation.
///
/// Arguments arrive fully evaluated, receiver first for member functions.
/// Returning an error *value* is the only failure channel.
pub type FunctionImpl = Arc<dyn Fn(&[Value], &CallContext) -> Value + Send + Sync>;

/// One concrete signature of a function.
#[derive(Clone)]
pub struct Overload {
    /// Unique id, e.g. `add_int64_int64`.
    pub id: Arc<str>,
    /// Receiver-style call (`target.f(args)`); the receiver is param 0.
    pub member: bool,
    /// Parameter kinds, receiver included.
    pub params: Vec<Kind>,
    /// Result kind.
    pub result: Kind,
    /// Strict overloads never see error or unknown arguments; those
    /// propagate before the call. Non-strict overloads receive them raw.
    pub strict: bool,
    /// Pure overloads may be evaluated at plan time during folding.
    pub pure: bool,
    implementation: FunctionImpl,
}

impl Overload {
    /// A global (free-function) overload. Pure by default; registration of
    /// side-effecting functions should go through [`Overload::impure`].
    pub fn global<F>(id: &str, params: Vec<Kind>, result: Kind, f: F) -> Self
    where
        F: Fn(&[Value], &CallContext) -> Value + Send + Sync + 'static,
    {
        Self {
            id: Arc::from(id),
            member: false,
            params,
            result,
            strict: true,
            pure: true,
            implementation: Arc::new(f),
        }
    }

    /// A receiver-style overload; `params[0]` is the receiver kind.
    pub fn method<F>(id: &str, params: Vec<Kind>, result: Kind, f: F) -> Self
    where
        F: Fn(&[Value], &CallContext) -> Value + Send + Sync + 'static,
    {
        Self {
            member: true,
            ..Self::global(id, params, result, f)
        }
    }

    /// Mark this overload non-strict: error and unknown arguments are
    /// passed through instead of propagating past the call.
    pub fn non_strict(mut self) -> Self {
        self.strict = false;
        self
    }

    /// Mark this overload impure, excluding it from constant folding.
    pub fn impure(mut self) -> Self {
        self.pure = false;
        self
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// Whether every argument kind is accepted by this signature.
    pub fn accepts(&self, arg_kinds: &[Kind]) -> bool {
        self.params.len() == arg_kinds.len()
            && self
                .params
                .iter()
                .zip(arg_kinds.iter())
                .all(|(param, arg)| param.matches(*arg))
    }

    /// How many parameters match exactly rather than through `Dyn`.
    fn specificity(&self, arg_kinds: &[Kind]) -> usize {
        self.params
            .iter()
            .zip(arg_kinds.iter())
            .filter(|(param, arg)| *param == *arg)
            .count()
    }

    pub fn call(&self, args: &[Value], ctx: &CallContext) -> Value {
        (self.implementation)(args, ctx)
    }
}

impl std::fmt::Debug for Overload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Overload")
            .field("id", &self.id)
            .field("member", &self.member)
            .field("params", &self.params)
            .field("result", &self.result)
            .field("strict", &self.strict)
            .finish()
    }
}

/// A function with its overloads in registration order.
#[derive(Debug, Clone, Default)]
pub struct Function {
    pub name: String,
    pub overloads: Vec<Overload>,
}

impl Function {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            overloads: Vec::new(),
        }
    }

    pub fn with_overload(mut self, overload: Overload) -> Self {
        self.overloads.push(overload);
        self
    }

    pub fn find_overload(&self, id: &str) -> Option<&Overload> {
        self.overloads.iter().find(|o| o.id.as_ref() == id)
    }
}

/// Registry of all functions available to a runtime instance.
///
/// Registration is append-only and finishes before the first evaluation;
/// afterwards the registry is shared immutably across threads.
#[derive(Debug, Clone, Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, Function>,
}

/// A resolved call target.
#[derive(Debug)]
pub enum Resolution<'a> {
    /// Exactly one best overload.
    Matched(&'a Overload),
    /// No registered overload accepts the argument kinds.
    NoMatch,
    /// The function name is not registered at all.
    UnknownFunction,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a function; overloads append to any existing entry.
    pub fn register(&mut self, function: Function) {
        match self.functions.get_mut(&function.name) {
            Some(existing) => existing.overloads.extend(function.overloads),
            None => {
                self.functions.insert(function.name.clone(), function);
            }
        }
    }

    /// Register a single overload under `name`.
    pub fn register_overload(&mut self, name: &str, overload: Overload) {
        self.register(Function::new(name).with_overload(overload));
    }

    /// Merge another registry into this one, preserving both orders.
    pub fn merge(&mut self, other: FunctionRegistry) {
        for (_, function) in other.functions {
            self.register(function);
        }
    }

    pub fn get(&self, name: &str) -> Option<&Function> {
        self.functions.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Candidate overloads for a call shape, before kind checking.
    ///
    /// When the checker pre-resolved the call, `overload_ids` narrows the
    /// candidates to those ids; an empty slice means no narrowing.
    pub fn candidates<'a>(
        &'a self,
        name: &str,
        arity: usize,
        member: bool,
        overload_ids: &[Arc<str>],
    ) -> Option<Vec<&'a Overload>> {
        let function = self.functions.get(name)?;
        Some(
            function
                .overloads
                .iter()
                .filter(|o| o.arity() == arity && o.member == member)
                .filter(|o| {
                    overload_ids.is_empty()
                        || overload_ids.iter().any(|id| *id == o.id)
                })
                .collect(),
        )
    }

    /// Resolve a call to its best overload per the resolution rules.
    pub fn resolve<'a>(
        &'a self,
        name: &str,
        arg_kinds: &[Kind],
        member: bool,
        overload_ids: &[Arc<str>],
    ) -> Resolution<'a> {
        let Some(candidates) = self.candidates(name, arg_kinds.len(), member, overload_ids)
        else {
            return Resolution::UnknownFunction;
        };

        let mut best: Option<(&Overload, usize)> = None;
        for overload in candidates {
            if !overload.accepts(arg_kinds) {
                continue;
            }
            let score = overload.specificity(arg_kinds);
            match best {
                // Strictly-better score wins; ties keep the earlier
                // registration.
                Some((_, best_score)) if score <= best_score => {}
                _ => best = Some((overload, score)),
            }
        }

        match best {
            Some((overload, _)) => Resolution::Matched(overload),
            None => Resolution::NoMatch,
        }
    }

    /// Whether a call with these candidates is non-strict: every candidate
    /// must opt out of strictness for raw error/unknown arguments to flow.
    pub fn is_non_strict(&self, name: &str, arity: usize, member: bool) -> bool {
        self.candidates(name, arity, member, &[])
            .map(|c| !c.is_empty() && c.iter().all(|o| !o.strict))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::EmptyRecordProvider;

    fn ctx_parts() -> (EmptyRecordProvider, RuntimeOptions) {
        (EmptyRecordProvider, RuntimeOptions::default())
    }

    fn int_impl(args: &[Value], _ctx: &CallContext) -> Value {
        match args {
            [Value::Int(i)] => Value::Int(i * 2),
            _ => Value::error("expected int"),
        }
    }

    fn dyn_impl(_args: &[Value], _ctx: &CallContext) -> Value {
        Value::from("dyn")
    }

    #[test]
    fn resolves_by_arity_and_kind() {
        let mut registry = FunctionRegistry::new();
        registry.register(
            Function::new("double")
                .with_overload(Overload::global(
                    "double_int",
                    vec![Kind::Int],
                    Kind::Int,
                    int_impl,
                ))
                .with_overload(Overload::global(
                    "double_dyn",
                    vec![Kind::Dyn],
                    Kind::Dyn,
                    dyn_impl,
                )),
        );

        // Exact match beats the Dyn overload regardless of order.
        let resolved = registry.resolve("double", &[Kind::Int], false, &[]);
        let Resolution::Matched(overload) = resolved else {
            panic!("expected match");
        };
        assert_eq!(overload.id.as_ref(), "double_int");

        // Dyn overload catches other kinds.
        let resolved = registry.resolve("double", &[Kind::String], false, &[]);
        let Resolution::Matched(overload) = resolved else {
            panic!("expected match");
        };
        assert_eq!(overload.id.as_ref(), "double_dyn");

        assert!(matches!(
            registry.resolve("double", &[Kind::Int, Kind::Int], false, &[]),
            Resolution::NoMatch
        ));
        assert!(matches!(
            registry.resolve("triple", &[Kind::Int], false, &[]),
            Resolution::UnknownFunction
        ));
    }

    #[test]
    fn ties_break_by_registration_order() {
        let mut registry = FunctionRegistry::new();
        registry.register_overload(
            "f",
            Overload::global("f_first", vec![Kind::Dyn], Kind::Int, dyn_impl),
        );
        registry.register_overload(
            "f",
            Overload::global("f_second", vec![Kind::Dyn], Kind::Int, dyn_impl),
        );

        let Resolution::Matched(overload) = registry.resolve("f", &[Kind::Int], false, &[])
        else {
            panic!("expected match");
        };
        assert_eq!(overload.id.as_ref(), "f_first");
    }

    #[test]
    fn receiver_style_is_filtered() {
        let mut registry = FunctionRegistry::new();
        registry.register_overload(
            "size",
            Overload::method("string_size", vec![Kind::String], Kind::Int, dyn_impl),
        );

        assert!(matches!(
            registry.resolve("size", &[Kind::String], false, &[]),
            Resolution::NoMatch
        ));
        assert!(matches!(
            registry.resolve("size", &[Kind::String], true, &[]),
            Resolution::Matched(_)
        ));
    }

    #[test]
    fn pre_resolved_ids_narrow_candidates() {
        let mut registry = FunctionRegistry::new();
        registry.register(
            Function::new("g")
                .with_overload(Overload::global("g_int", vec![Kind::Dyn], Kind::Int, dyn_impl))
                .with_overload(Overload::global(
                    "g_string",
                    vec![Kind::Dyn],
                    Kind::String,
                    dyn_impl,
                )),
        );

        let ids: Vec<Arc<str>> = vec![Arc::from("g_string")];
        let Resolution::Matched(overload) = registry.resolve("g", &[Kind::Int], false, &ids)
        else {
            panic!("expected match");
        };
        assert_eq!(overload.id.as_ref(), "g_string");
    }

    #[test]
    fn overload_invocation() {
        let overload = Overload::global("double_int", vec![Kind::Int], Kind::Int, int_impl);
        let (provider, options) = ctx_parts();
        let ctx = CallContext {
            provider: &provider,
            allocator: Allocator::heap(),
            options: &options,
        };
        assert_eq!(overload.call(&[Value::Int(21)], &ctx), Value::Int(42));
    }

    #[test]
    fn non_strict_requires_all_candidates() {
        let mut registry = FunctionRegistry::new();
        registry.register_overload(
            "@not_strictly_false",
            Overload::global("not_strictly_false", vec![Kind::Dyn], Kind::Bool, dyn_impl)
                .non_strict(),
        );
        assert!(registry.is_non_strict("@not_strictly_false", 1, false));
        assert!(!registry.is_non_strict("missing", 1, false));

        registry.register_overload(
            "mixed",
            Overload::global("mixed_strict", vec![Kind::Dyn], Kind::Bool, dyn_impl),
        );
        registry.register_overload(
            "mixed",
            Overload::global("mixed_lax", vec![Kind::Dyn], Kind::Bool, dyn_impl).non_strict(),
        );
        assert!(!registry.is_non_strict("mixed", 1, false));
    }
}
