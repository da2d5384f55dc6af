//! Runtime configuration.
//!
//! Options specify constraints and feature toggles only; enforcement lives
//! in the planner and evaluator.

/// How far unknown-input tracking reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnknownTracking {
    /// No pattern matching; unknown values still propagate if injected.
    #[default]
    Disabled,
    /// Ident, select, and index steps match activation patterns.
    AttributeOnly,
    /// Attribute steps match patterns, and function calls union the unknown
    /// sets of their arguments.
    AttributeAndFunction,
}

/// Backing representation for strings and bytes produced by evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StringBacking {
    /// One contiguous allocation per value.
    #[default]
    Contiguous,
    /// Concatenation builds chunk lists instead of copying.
    ChunkedRope,
}

/// Options controlling planning and evaluation.
#[derive(Debug, Clone)]
pub struct RuntimeOptions {
    /// Upper bound on comprehension iterations per evaluation; 0 disables
    /// the limit. Exhaustion is fatal.
    pub comprehension_max_iterations: u32,
    /// Cross-numeric equality and map-key coercion.
    pub enable_heterogeneous_equality: bool,
    /// Unknown-input tracking reach.
    pub unknown_tracking: UnknownTracking,
    /// Turn accesses matching missing-attribute patterns into errors.
    pub enable_missing_attribute_errors: bool,
    /// Skip absorbed operands in logicals and stop comprehensions on a
    /// false loop condition. Disabling runs both exhaustively; results are
    /// unchanged by design of the combination table.
    pub enable_short_circuiting: bool,
    /// Fold constant subtrees at plan time.
    pub enable_constant_folding: bool,
    /// Backing discipline for strings and bytes.
    pub string_backing: StringBacking,
    /// Upper bound on the planner-computed value-stack depth; 0 disables
    /// the check. Exceeding it is a plan-time error.
    pub max_value_stack_depth: u32,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            comprehension_max_iterations: 0,
            enable_heterogeneous_equality: true,
            unknown_tracking: UnknownTracking::Disabled,
            enable_missing_attribute_errors: false,
            enable_short_circuiting: true,
            enable_constant_folding: false,
            string_backing: StringBacking::Contiguous,
            max_value_stack_depth: 0,
        }
    }
}

impl RuntimeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when any unknown pattern matching is active.
    pub fn tracks_unknowns(&self) -> bool {
        self.unknown_tracking != UnknownTracking::Disabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let opts = RuntimeOptions::default();
        assert_eq!(opts.comprehension_max_iterations, 0);
        assert!(opts.enable_heterogeneous_equality);
        assert!(opts.enable_short_circuiting);
        assert!(!opts.tracks_unknowns());
        assert_eq!(opts.string_backing, StringBacking::Contiguous);
    }

    #[test]
    fn tracking_modes() {
        let mut opts = RuntimeOptions::default();
        opts.unknown_tracking = UnknownTracking::AttributeOnly;
        assert!(opts.tracks_unknowns());
        opts.unknown_tracking = UnknownTracking::AttributeAndFunction;
        assert!(opts.tracks_unknowns());
    }
}
