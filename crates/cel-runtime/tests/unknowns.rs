//! Unknown and missing attribute handling: pattern matching on trails,
//! propagation through operators and calls, interaction with
//! short-circuiting.

mod common;

use cel_runtime::ast::builder::AstBuilder;
use cel_runtime::{
    operators, AttributePattern, EvalErrorKind, MapActivation, MapKey, RuntimeOptions,
    UnknownTracking, Value,
};

use common::eval_with;

fn tracking_options(mode: UnknownTracking) -> RuntimeOptions {
    let mut options = RuntimeOptions::default();
    options.unknown_tracking = mode;
    options
}

fn unknown_attributes(value: &Value) -> Vec<String> {
    match value {
        Value::Unknown(set) => set.attributes().iter().map(|t| t.to_string()).collect(),
        other => panic!("expected unknown, got {:?}", other),
    }
}

#[test]
fn unknown_variable_pattern() {
    let b = AstBuilder::new();
    let expr = b.ident("x");
    let activation = MapActivation::new().with_unknown(AttributePattern::new("x"));
    let result = eval_with(
        expr,
        &activation,
        &tracking_options(UnknownTracking::AttributeOnly),
    )
    .unwrap();
    assert_eq!(unknown_attributes(&result), vec!["x".to_string()]);
}

#[test]
fn tracking_disabled_resolves_normally() {
    let b = AstBuilder::new();
    let expr = b.ident("x");
    let activation = MapActivation::new()
        .with_binding("x", 5i64)
        .with_unknown(AttributePattern::new("x"));
    // Patterns are inert while tracking is disabled.
    let result = eval_with(expr, &activation, &RuntimeOptions::default()).unwrap();
    assert_eq!(result, Value::Int(5));
}

#[test]
fn select_chain_builds_the_trail() {
    // request.auth.claims with request.auth marked unknown: the unknown
    // carries the trail where the match happened.
    let b = AstBuilder::new();
    let expr = b.select(b.select(b.ident("request"), "auth"), "claims");
    let activation = MapActivation::new()
        .with_binding("request", Value::map([("path", Value::from("/"))]))
        .with_unknown(AttributePattern::new("request").field("auth"));
    let result = eval_with(
        expr,
        &activation,
        &tracking_options(UnknownTracking::AttributeOnly),
    )
    .unwrap();
    assert_eq!(unknown_attributes(&result), vec!["request.auth".to_string()]);
}

#[test]
fn index_qualifiers_match_patterns() {
    // m[2] unknown, m[1] still readable.
    let b = AstBuilder::new();
    let expr = b.call(operators::INDEX, vec![b.ident("m"), b.int(2)]);
    let activation = MapActivation::new()
        .with_binding("m", Value::map([(1i64, 10i64), (2i64, 20i64)]))
        .with_unknown(AttributePattern::new("m").key(MapKey::Int(2)));
    let options = tracking_options(UnknownTracking::AttributeOnly);
    let result = eval_with(expr, &activation, &options).unwrap();
    assert_eq!(unknown_attributes(&result), vec!["m[2]".to_string()]);

    let b = AstBuilder::new();
    let expr = b.call(operators::INDEX, vec![b.ident("m"), b.int(1)]);
    let activation = MapActivation::new()
        .with_binding("m", Value::map([(1i64, 10i64), (2i64, 20i64)]))
        .with_unknown(AttributePattern::new("m").key(MapKey::Int(2)));
    let result = eval_with(expr, &activation, &options).unwrap();
    assert_eq!(result, Value::Int(10));
}

#[test]
fn wildcard_patterns() {
    let b = AstBuilder::new();
    let expr = b.select(b.select(b.ident("ctx"), "user"), "token");
    let activation = MapActivation::new()
        .with_binding("ctx", Value::map([("user", Value::map([("id", 1i64)]))]))
        .with_unknown(AttributePattern::new("ctx").wildcard().field("token"));
    let result = eval_with(
        expr,
        &activation,
        &tracking_options(UnknownTracking::AttributeOnly),
    )
    .unwrap();
    assert_eq!(
        unknown_attributes(&result),
        vec!["ctx.user.token".to_string()]
    );
}

#[test]
fn absorbing_operand_beats_unknown() {
    // x && false == false even with x unknown.
    let b = AstBuilder::new();
    let expr = b.call(operators::LOGICAL_AND, vec![b.ident("x"), b.bool(false)]);
    let activation = MapActivation::new().with_unknown(AttributePattern::new("x"));
    let options = tracking_options(UnknownTracking::AttributeOnly);
    assert_eq!(
        eval_with(expr, &activation, &options).unwrap(),
        Value::Bool(false)
    );

    // x || true == true likewise.
    let b = AstBuilder::new();
    let expr = b.call(operators::LOGICAL_OR, vec![b.ident("x"), b.bool(true)]);
    let activation = MapActivation::new().with_unknown(AttributePattern::new("x"));
    assert_eq!(
        eval_with(expr, &activation, &options).unwrap(),
        Value::Bool(true)
    );

    // x && true stays unknown.
    let b = AstBuilder::new();
    let expr = b.call(operators::LOGICAL_AND, vec![b.ident("x"), b.bool(true)]);
    let activation = MapActivation::new().with_unknown(AttributePattern::new("x"));
    let result = eval_with(expr, &activation, &options).unwrap();
    assert_eq!(unknown_attributes(&result), vec!["x".to_string()]);
}

#[test]
fn unknowns_union_across_logicals() {
    let b = AstBuilder::new();
    let expr = b.call(operators::LOGICAL_AND, vec![b.ident("x"), b.ident("y")]);
    let activation = MapActivation::new()
        .with_unknown(AttributePattern::new("x"))
        .with_unknown(AttributePattern::new("y"));
    let result = eval_with(
        expr,
        &activation,
        &tracking_options(UnknownTracking::AttributeOnly),
    )
    .unwrap();
    let mut attrs = unknown_attributes(&result);
    attrs.sort();
    assert_eq!(attrs, vec!["x".to_string(), "y".to_string()]);
}

#[test]
fn unknown_beats_error_in_logicals() {
    // error && unknown -> unknown, both orders.
    for (left, right) in [("e", "u"), ("u", "e")] {
        let b = AstBuilder::new();
        let lhs = if left == "e" {
            b.call(
                operators::EQUALS,
                vec![b.call(operators::DIVIDE, vec![b.int(1), b.int(0)]), b.int(0)],
            )
        } else {
            b.ident("u")
        };
        let rhs = if right == "e" {
            b.call(
                operators::EQUALS,
                vec![b.call(operators::DIVIDE, vec![b.int(1), b.int(0)]), b.int(0)],
            )
        } else {
            b.ident("u")
        };
        let expr = b.call(operators::LOGICAL_AND, vec![lhs, rhs]);
        let activation = MapActivation::new().with_unknown(AttributePattern::new("u"));
        let result = eval_with(
            expr,
            &activation,
            &tracking_options(UnknownTracking::AttributeOnly),
        )
        .unwrap();
        assert!(result.is_unknown(), "{}/{} gave {:?}", left, right, result);
    }
}

#[test]
fn unknown_condition_propagates_through_conditional() {
    let b = AstBuilder::new();
    let expr = b.call(
        operators::CONDITIONAL,
        vec![b.ident("flag"), b.int(1), b.int(2)],
    );
    let activation = MapActivation::new().with_unknown(AttributePattern::new("flag"));
    let result = eval_with(
        expr,
        &activation,
        &tracking_options(UnknownTracking::AttributeOnly),
    )
    .unwrap();
    assert_eq!(unknown_attributes(&result), vec!["flag".to_string()]);
}

#[test]
fn calls_union_argument_unknowns() {
    let b = AstBuilder::new();
    let expr = b.call(operators::ADD, vec![b.ident("x"), b.ident("y")]);
    let activation = MapActivation::new()
        .with_unknown(AttributePattern::new("x"))
        .with_unknown(AttributePattern::new("y"));
    let result = eval_with(
        expr,
        &activation,
        &tracking_options(UnknownTracking::AttributeOnly),
    )
    .unwrap();
    let mut attrs = unknown_attributes(&result);
    attrs.sort();
    assert_eq!(attrs, vec!["x".to_string(), "y".to_string()]);
}

#[test]
fn function_result_tracking_tags_the_call() {
    let b = AstBuilder::new();
    let expr = b.call("size", vec![b.ident("x")]);
    let activation = MapActivation::new().with_unknown(AttributePattern::new("x"));
    let result = eval_with(
        expr,
        &activation,
        &tracking_options(UnknownTracking::AttributeAndFunction),
    )
    .unwrap();
    let attrs = unknown_attributes(&result);
    assert!(attrs.contains(&"x".to_string()));
    assert!(attrs.contains(&"size()".to_string()), "{:?}", attrs);

    // Attribute-only tracking keeps just the attribute.
    let b = AstBuilder::new();
    let expr = b.call("size", vec![b.ident("x")]);
    let activation = MapActivation::new().with_unknown(AttributePattern::new("x"));
    let result = eval_with(
        expr,
        &activation,
        &tracking_options(UnknownTracking::AttributeOnly),
    )
    .unwrap();
    assert_eq!(unknown_attributes(&result), vec!["x".to_string()]);
}

#[test]
fn unknown_list_elements_in_comprehensions() {
    // xs[1] is unknown; exists(x, x == 2) over xs hits it before any
    // match and stays unknown.
    let b = AstBuilder::new();
    let predicate = b.call(operators::EQUALS, vec![b.ident("x"), b.int(99)]);
    let expr = common::exists_expansion(&b, b.ident("xs"), "x", predicate);
    let activation = MapActivation::new()
        .with_binding("xs", Value::list([1i64, 2, 3]))
        .with_unknown(AttributePattern::new("xs").index(1));
    let result = eval_with(
        expr,
        &activation,
        &tracking_options(UnknownTracking::AttributeOnly),
    )
    .unwrap();
    assert_eq!(unknown_attributes(&result), vec!["xs[1]".to_string()]);
}

#[test]
fn missing_attribute_errors() {
    let b = AstBuilder::new();
    let expr = b.select(b.ident("secrets"), "token");
    let activation = MapActivation::new()
        .with_binding("secrets", Value::map([("token", Value::from("hunter2"))]))
        .with_missing(AttributePattern::new("secrets").field("token"));

    let mut options = RuntimeOptions::default();
    options.enable_missing_attribute_errors = true;
    match eval_with(expr, &activation, &options).unwrap() {
        Value::Error(e) => {
            assert_eq!(e.kind, EvalErrorKind::Missing);
            assert!(e.message.contains("secrets.token"), "{}", e.message);
        }
        other => panic!("expected missing error, got {:?}", other),
    }

    // Without the option the same access succeeds.
    let b = AstBuilder::new();
    let expr = b.select(b.ident("secrets"), "token");
    let activation = MapActivation::new()
        .with_binding("secrets", Value::map([("token", Value::from("hunter2"))]))
        .with_missing(AttributePattern::new("secrets").field("token"));
    assert_eq!(
        eval_with(expr, &activation, &RuntimeOptions::default()).unwrap(),
        Value::from("hunter2")
    );
}

#[test]
fn unknown_patterns_take_precedence_over_missing() {
    let b = AstBuilder::new();
    let expr = b.ident("x");
    let activation = MapActivation::new()
        .with_unknown(AttributePattern::new("x"))
        .with_missing(AttributePattern::new("x"));
    let mut options = tracking_options(UnknownTracking::AttributeOnly);
    options.enable_missing_attribute_errors = true;
    let result = eval_with(expr, &activation, &options).unwrap();
    assert!(result.is_unknown());
}

#[test]
fn create_list_surfaces_unknowns() {
    let b = AstBuilder::new();
    let expr = b.list(vec![b.int(1), b.ident("x"), b.int(3)]);
    let activation = MapActivation::new().with_unknown(AttributePattern::new("x"));
    let result = eval_with(
        expr,
        &activation,
        &tracking_options(UnknownTracking::AttributeOnly),
    )
    .unwrap();
    assert_eq!(unknown_attributes(&result), vec!["x".to_string()]);
}
