//! Shared helpers for evaluator integration tests: plan-and-run shortcuts
//! plus the comprehension expansions the macro layer would produce for
//! `all`, `exists`, and `map`.
#![allow(dead_code)]

use cel_runtime::ast::builder::AstBuilder;
use cel_runtime::ast::{AstNode, CheckedAst};
use cel_runtime::record::EmptyRecordProvider;
use cel_runtime::{operators, stdlib};
use cel_runtime::{
    Activation, Evaluator, FatalError, MapActivation, Planner, Program, RuntimeOptions, Value,
};

pub const ACCU: &str = "__result__";

pub fn plan(root: AstNode, options: &RuntimeOptions) -> Program {
    let registry = stdlib::standard_functions();
    Planner::new(&registry, options)
        .plan(&CheckedAst::from_root(root))
        .expect("planning failed")
}

pub fn eval_with(
    root: AstNode,
    activation: &dyn Activation,
    options: &RuntimeOptions,
) -> Result<Value, FatalError> {
    let registry = stdlib::standard_functions();
    let program = Planner::new(&registry, options)
        .plan(&CheckedAst::from_root(root))
        .expect("planning failed");
    let provider = EmptyRecordProvider;
    Evaluator::new(&program, &registry, &provider, options).eval(activation)
}

pub fn eval_vars(root: AstNode, vars: &[(&str, Value)]) -> Result<Value, FatalError> {
    let mut activation = MapActivation::new();
    for (name, value) in vars {
        activation.insert(*name, value.clone());
    }
    eval_with(root, &activation, &RuntimeOptions::default())
}

pub fn eval(root: AstNode) -> Result<Value, FatalError> {
    eval_vars(root, &[])
}

/// The `range.exists(var, predicate)` expansion.
pub fn exists_expansion(
    b: &AstBuilder,
    range: AstNode,
    var: &str,
    predicate: AstNode,
) -> AstNode {
    b.comprehension(
        var,
        range,
        ACCU,
        b.bool(false),
        b.call(
            operators::NOT_STRICTLY_FALSE,
            vec![b.call(operators::LOGICAL_NOT, vec![b.ident(ACCU)])],
        ),
        b.call(operators::LOGICAL_OR, vec![b.ident(ACCU), predicate]),
        b.ident(ACCU),
    )
}

/// The `range.all(var, predicate)` expansion.
pub fn all_expansion(b: &AstBuilder, range: AstNode, var: &str, predicate: AstNode) -> AstNode {
    b.comprehension(
        var,
        range,
        ACCU,
        b.bool(true),
        b.call(operators::NOT_STRICTLY_FALSE, vec![b.ident(ACCU)]),
        b.call(operators::LOGICAL_AND, vec![b.ident(ACCU), predicate]),
        b.ident(ACCU),
    )
}

/// The `range.map(var, transform)` expansion.
pub fn map_expansion(b: &AstBuilder, range: AstNode, var: &str, transform: AstNode) -> AstNode {
    b.comprehension(
        var,
        range,
        ACCU,
        b.list(vec![]),
        b.bool(true),
        b.call(
            operators::ADD,
            vec![b.ident(ACCU), b.list(vec![transform])],
        ),
        b.ident(ACCU),
    )
}

/// Outcome comparison that treats errors as equal when their kinds match
/// and unknowns as equal when their attribute sets match.
pub fn same_outcome(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Error(x), Value::Error(y)) => x.kind == y.kind,
        (Value::Unknown(x), Value::Unknown(y)) => {
            x.attributes().len() == y.attributes().len()
                && x.attributes().iter().all(|t| y.contains(t))
        }
        _ => a == b,
    }
}
