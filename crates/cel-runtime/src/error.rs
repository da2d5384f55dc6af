//! Evaluation errors on both planes.
//!
//! CEL distinguishes errors *inside* the expression from failures of the
//! evaluation machinery itself:
//!
//! - [`EvalError`] values flow on the value stack, propagate through
//!   operators, and are a well-formed evaluation result.
//! - [`PlanError`] and [`FatalError`] return to the host out-of-band; when
//!   one of these surfaces the evaluation did not complete.

use std::fmt;

use crate::attribute::AttributeTrail;

/// The kind of a CEL-level evaluation error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalErrorKind {
    /// A referenced variable is not bound in the activation.
    NoSuchAttribute,
    /// A record has no field with the given name or number.
    NoSuchField,
    /// A map has no entry for the given key.
    NoSuchKey,
    /// No function overload matches the call's argument kinds.
    NoSuchOverload,
    /// A type conversion failed (range, sign, finiteness, or format).
    TypeConversion,
    /// Integer arithmetic overflowed, or a temporal value left its range.
    Overflow,
    /// Integer division or modulo by zero.
    DivisionByZero,
    /// A function received a structurally invalid argument.
    InvalidArgument,
    /// An attribute matched a missing-attribute pattern.
    Missing,
    /// Unexpected internal state.
    Internal,
}

/// A CEL-level evaluation error.
///
/// Errors are values: they travel on the stack and combine with other
/// operands per the propagation table rather than unwinding the evaluator.
#[derive(Debug, Clone)]
pub struct EvalError {
    pub kind: EvalErrorKind,
    pub message: String,
}

impl EvalError {
    pub fn new(kind: EvalErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn no_such_attribute(name: &str) -> Self {
        Self::new(
            EvalErrorKind::NoSuchAttribute,
            format!("undeclared reference to '{}'", name),
        )
    }

    pub fn no_such_field(field: &str) -> Self {
        Self::new(
            EvalErrorKind::NoSuchField,
            format!("no_such_field : '{}'", field),
        )
    }

    pub fn no_such_key(key: &str) -> Self {
        Self::new(EvalErrorKind::NoSuchKey, format!("key not found: {}", key))
    }

    pub fn no_such_overload(function: &str, arg_kinds: &[cel_runtime_common::Kind]) -> Self {
        let kinds: Vec<&str> = arg_kinds.iter().map(|k| k.as_str()).collect();
        Self::new(
            EvalErrorKind::NoSuchOverload,
            format!("no matching overload for '{}'({})", function, kinds.join(", ")),
        )
    }

    pub fn no_matching_overload(function: &str) -> Self {
        Self::new(
            EvalErrorKind::NoSuchOverload,
            format!("no matching overload for '{}'", function),
        )
    }

    pub fn type_conversion(from: &str, to: &str) -> Self {
        Self::new(
            EvalErrorKind::TypeConversion,
            format!("cannot convert {} to {}", from, to),
        )
    }

    pub fn overflow(message: impl Into<String>) -> Self {
        Self::new(EvalErrorKind::Overflow, message)
    }

    pub fn division_by_zero() -> Self {
        Self::new(EvalErrorKind::DivisionByZero, "divide by zero")
    }

    pub fn modulus_by_zero() -> Self {
        Self::new(EvalErrorKind::DivisionByZero, "modulus by zero")
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(EvalErrorKind::InvalidArgument, message)
    }

    pub fn missing_attribute(trail: &AttributeTrail) -> Self {
        Self::new(
            EvalErrorKind::Missing,
            format!("MissingAttributeError: {}", trail),
        )
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(EvalErrorKind::Internal, message)
    }
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for EvalError {}

impl From<&str> for EvalError {
    fn from(s: &str) -> Self {
        Self::new(EvalErrorKind::Internal, s)
    }
}

impl From<String> for EvalError {
    fn from(s: String) -> Self {
        Self::new(EvalErrorKind::Internal, s)
    }
}

/// A failure while lowering a checked AST into a program.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PlanError {
    #[error("malformed AST: {0}")]
    MalformedAst(String),
    #[error("value stack would need {required} slots, limit is {limit}")]
    StackLimitExceeded { required: usize, limit: usize },
    #[error("comprehension accumulator '{0}' shadows an iteration variable in scope")]
    ShadowedVariable(String),
}

/// A fatal failure during evaluation: the evaluator did not complete and no
/// expression-level result exists.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FatalError {
    #[error("comprehension iteration budget exhausted")]
    IterationLimit,
    #[error("evaluation deadline exceeded")]
    Cancelled,
    #[error("trace callback failed: {0}")]
    Trace(String),
    #[error("internal evaluator fault: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use cel_runtime_common::Kind;

    #[test]
    fn constructor_kinds() {
        assert_eq!(
            EvalError::division_by_zero().kind,
            EvalErrorKind::DivisionByZero
        );
        assert_eq!(
            EvalError::modulus_by_zero().kind,
            EvalErrorKind::DivisionByZero
        );
        assert_eq!(
            EvalError::type_conversion("string", "int").kind,
            EvalErrorKind::TypeConversion
        );
        assert_eq!(
            EvalError::no_such_attribute("x").kind,
            EvalErrorKind::NoSuchAttribute
        );
    }

    #[test]
    fn overload_message_lists_kinds() {
        let err = EvalError::no_such_overload("_+_", &[Kind::String, Kind::Int]);
        assert!(err.message.contains("_+_"));
        assert!(err.message.contains("string"));
        assert!(err.message.contains("int"));
    }

    #[test]
    fn fatal_display() {
        assert_eq!(
            FatalError::IterationLimit.to_string(),
            "comprehension iteration budget exhausted"
        );
    }
}
