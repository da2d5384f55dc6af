//! Canonical operator function names.
//!
//! CEL operators are ordinary function calls in the checked AST; the parser
//! rewrites `a + b` into a call of `_+_`. The planner special-cases the
//! control-flow operators (`_&&_`, `_||_`, `_?_:_`) and the indexer
//! (`_[_]_`); everything else dispatches through the function registry.

/// Logical and.
pub const LOGICAL_AND: &str = "_&&_";
/// Logical or.
pub const LOGICAL_OR: &str = "_||_";
/// Logical not.
pub const LOGICAL_NOT: &str = "!_";
/// Conditional (ternary).
pub const CONDITIONAL: &str = "_?_:_";

/// Equality.
pub const EQUALS: &str = "_==_";
/// Inequality.
pub const NOT_EQUALS: &str = "_!=_";
/// Less than.
pub const LESS: &str = "_<_";
/// Less than or equal.
pub const LESS_EQUALS: &str = "_<=_";
/// Greater than.
pub const GREATER: &str = "_>_";
/// Greater than or equal.
pub const GREATER_EQUALS: &str = "_>=_";

/// Addition.
pub const ADD: &str = "_+_";
/// Subtraction.
pub const SUBTRACT: &str = "_-_";
/// Multiplication.
pub const MULTIPLY: &str = "_*_";
/// Division.
pub const DIVIDE: &str = "_/_";
/// Modulo.
pub const MODULO: &str = "_%_";
/// Arithmetic negation.
pub const NEGATE: &str = "-_";

/// Container membership.
pub const IN: &str = "@in";
/// Container indexing.
pub const INDEX: &str = "_[_]_";

/// Comprehension loop-condition guard: `false` stops iteration, everything
/// else (including error and unknown operands) keeps it running.
pub const NOT_STRICTLY_FALSE: &str = "@not_strictly_false";

/// Returns true if `name` is an operator that the planner lowers to
/// dedicated steps rather than a registry call.
pub fn is_special_form(name: &str) -> bool {
    matches!(name, LOGICAL_AND | LOGICAL_OR | CONDITIONAL | INDEX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn special_forms() {
        assert!(is_special_form(LOGICAL_AND));
        assert!(is_special_form(CONDITIONAL));
        assert!(is_special_form(INDEX));
        assert!(!is_special_form(ADD));
        assert!(!is_special_form(NOT_STRICTLY_FALSE));
    }
}
