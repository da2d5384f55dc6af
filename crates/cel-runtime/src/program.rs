//! Compiled programs.
//!
//! A [`Program`] is the planner's frozen output: an ordered step sequence,
//! the number of comprehension variable slots it needs, and the maximum
//! value-stack depth it can reach. Programs are immutable; any number of
//! evaluators may execute the same program concurrently, each with its own
//! frame.

use std::sync::Arc;

use crate::value::Value;

/// One unit of work. Most steps advance the program counter by one; the
/// jump family installs a computed target instead.
#[derive(Debug, Clone)]
pub struct Step {
    /// Source AST node id, or -1 for synthetic steps.
    pub id: i64,
    pub kind: StepKind,
}

impl Step {
    pub fn new(id: i64, kind: StepKind) -> Self {
        Self { id, kind }
    }

    /// Synthetic step with no source node.
    pub fn synthetic(kind: StepKind) -> Self {
        Self { id: -1, kind }
    }
}

/// The closed set of step kinds.
#[derive(Debug, Clone)]
pub enum StepKind {
    /// Push a constant.
    Const(Value),
    /// Resolve a variable through the activation; roots the attribute
    /// trail at the name.
    Ident { name: Arc<str> },
    /// Push a comprehension variable from its slot.
    Slot { index: usize },
    /// Pop the operand, select `field` from it (or test presence).
    Select { field: Arc<str>, test_only: bool },
    /// Pop index then operand, perform container access.
    Index,
    /// Pop `arity` arguments (receiver first for member calls), resolve
    /// and invoke. `overload_ids` narrows resolution when the checker
    /// pre-resolved the call.
    Call {
        function: Arc<str>,
        arity: usize,
        member: bool,
        overload_ids: Vec<Arc<str>>,
    },
    /// Pop `size` elements, push a list.
    CreateList { size: usize },
    /// Pop `entries` key/value pairs, push a map.
    CreateMap { entries: usize },
    /// Pop one value per field, push a record built through the provider.
    CreateRecord {
        type_name: Arc<str>,
        fields: Vec<Arc<str>>,
    },
    /// Unconditional jump.
    Jump { target: usize },
    /// Conditional dispatch: pops a bool and falls through (then-branch)
    /// or jumps to `else_target`; error and unknown conditions stay on the
    /// stack and jump to `end_target`, skipping both arms.
    CondJump { else_target: usize, end_target: usize },
    /// Short-circuit peek for logicals: jumps past the right operand and
    /// combine step when the top of stack is the absorbing element
    /// (`false` for and, `true` for or).
    AbsorbJump { or_form: bool, target: usize },
    /// Pop two operands, combine per the commutative logical table.
    Logic { or_form: bool },
    /// Pop the comprehension range and set up iteration state; bad ranges
    /// and propagating categories jump to `done` with the result pushed.
    LoopInit {
        iter_slot: usize,
        accu_slot: usize,
        done: usize,
    },
    /// Pop into the accumulator slot.
    StoreAccu { slot: usize },
    /// Load the next element into the iteration slot, or jump to `finish`
    /// when the range is exhausted. Charges the iteration budget.
    LoopNext { iter_slot: usize, finish: usize },
    /// Pop the loop condition and dispatch: true continues, false jumps to
    /// `finish` under short-circuiting, error/unknown cleans up and jumps
    /// to `done` with the value pushed.
    LoopCond {
        iter_slot: usize,
        accu_slot: usize,
        finish: usize,
        done: usize,
    },
    /// Tear down iteration state; the comprehension result stays on top.
    LoopFinish { iter_slot: usize, accu_slot: usize },
}

/// An immutable, executable program.
#[derive(Debug, Clone)]
pub struct Program {
    steps: Arc<[Step]>,
    slot_count: usize,
    max_stack_depth: usize,
}

impl Program {
    pub(crate) fn new(steps: Vec<Step>, slot_count: usize, max_stack_depth: usize) -> Self {
        Self {
            steps: steps.into(),
            slot_count,
            max_stack_depth,
        }
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Number of comprehension variable slots the program requires.
    pub fn slot_count(&self) -> usize {
        self.slot_count
    }

    /// Planner-computed bound on the value stack depth.
    pub fn max_stack_depth(&self) -> usize {
        self.max_stack_depth
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}
