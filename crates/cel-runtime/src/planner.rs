//! Lowering from checked ASTs to programs.
//!
//! The planner walks the expression tree once, emitting steps in execution
//! order and patching jump targets as it goes. Logical operators and the
//! conditional lower to jump protocols, comprehensions to an explicit loop
//! with two variable slots per nesting level, and everything else to plain
//! stack steps. With folding enabled, constant subtrees whose functions
//! are pure evaluate at plan time.

use std::sync::Arc;

use cel_runtime_common::ast::{AstNode, CheckedAst, Constant, Expr};
use cel_runtime_common::operators;
use cel_runtime_common::Kind;
use tracing::debug;

use crate::arena::Allocator;
use crate::error::PlanError;
use crate::options::RuntimeOptions;
use crate::program::{Program, Step, StepKind};
use crate::record::EmptyRecordProvider;
use crate::registry::{CallContext, FunctionRegistry, Resolution};
use crate::value::{MapKey, Value, ValueMap};

/// Plans checked ASTs into executable programs.
pub struct Planner<'a> {
    registry: &'a FunctionRegistry,
    options: &'a RuntimeOptions,
}

impl<'a> Planner<'a> {
    pub fn new(registry: &'a FunctionRegistry, options: &'a RuntimeOptions) -> Self {
        Self { registry, options }
    }

    /// Lower `ast` into a program.
    pub fn plan(&self, ast: &CheckedAst) -> Result<Program, PlanError> {
        let root = ast
            .root
            .as_ref()
            .ok_or_else(|| PlanError::MalformedAst("empty expression".to_string()))?;

        let mut lowering = Lowering {
            planner: self,
            ast,
            steps: Vec::new(),
            scopes: Vec::new(),
            depth: 0,
            max_slots: 0,
        };
        lowering.emit(root)?;

        let required = stack_depth(root);
        let limit = self.options.max_value_stack_depth as usize;
        if limit > 0 && required > limit {
            return Err(PlanError::StackLimitExceeded { required, limit });
        }

        debug!(
            steps = lowering.steps.len(),
            slots = lowering.max_slots,
            stack = required,
            "planned program"
        );
        Ok(Program::new(lowering.steps, lowering.max_slots, required))
    }

    /// Evaluate a constant subtree at plan time, when folding applies.
    ///
    /// Anything that touches the activation or provider, any impure or
    /// non-strict function, and any fold producing an error or unknown is
    /// left unfolded.
    fn fold(&self, node: &AstNode, ast: &CheckedAst) -> Option<Value> {
        if !self.options.enable_constant_folding {
            return None;
        }
        self.fold_inner(node, ast)
    }

    fn fold_inner(&self, node: &AstNode, ast: &CheckedAst) -> Option<Value> {
        match &node.expr {
            Expr::Const(c) => Some(const_value(c)),
            Expr::CreateList { elements } => {
                let mut values = Vec::with_capacity(elements.len());
                for element in elements {
                    values.push(self.fold_inner(element, ast)?);
                }
                Some(Value::list(values))
            }
            Expr::CreateMap { entries } => {
                let mut map = ValueMap::new();
                for entry in entries {
                    let key = self.fold_inner(&entry.key, ast)?;
                    let value = self.fold_inner(&entry.value, ast)?;
                    let key = MapKey::from_value(&key)?;
                    if map.insert(key, value).is_some() {
                        return None;
                    }
                }
                Some(map.into())
            }
            Expr::Call {
                function,
                target,
                args,
            } => {
                if operators::is_special_form(function) {
                    return None;
                }
                let mut values = Vec::with_capacity(args.len() + 1);
                if let Some(target) = target {
                    values.push(self.fold_inner(target, ast)?);
                }
                for arg in args {
                    values.push(self.fold_inner(arg, ast)?);
                }
                let kinds: Vec<Kind> = values.iter().map(|v| v.kind()).collect();
                let overload_ids = reference_overloads(ast, node.id);
                let resolution =
                    self.registry
                        .resolve(function, &kinds, target.is_some(), &overload_ids);
                let Resolution::Matched(overload) = resolution else {
                    return None;
                };
                if !overload.pure || !overload.strict {
                    return None;
                }
                let provider = EmptyRecordProvider;
                let ctx = CallContext {
                    provider: &provider,
                    allocator: Allocator::heap(),
                    options: self.options,
                };
                let result = overload.call(&values, &ctx);
                if result.is_error() || result.is_unknown() {
                    return None;
                }
                Some(result)
            }
            _ => None,
        }
    }
}

/// Per-plan emission state.
struct Lowering<'p, 'a> {
    planner: &'p Planner<'a>,
    ast: &'p CheckedAst,
    steps: Vec<Step>,
    /// Comprehension variables in scope, innermost last.
    scopes: Vec<(String, usize)>,
    /// Current comprehension nesting depth.
    depth: usize,
    /// High-water slot count.
    max_slots: usize,
}

impl Lowering<'_, '_> {
    fn push(&mut self, id: i64, kind: StepKind) -> usize {
        self.steps.push(Step::new(id, kind));
        self.steps.len() - 1
    }

    fn here(&self) -> usize {
        self.steps.len()
    }

    fn emit(&mut self, node: &AstNode) -> Result<(), PlanError> {
        if let Some(folded) = self.planner.fold(node, self.ast) {
            self.push(node.id, StepKind::Const(folded));
            return Ok(());
        }
        match &node.expr {
            Expr::Const(c) => {
                self.push(node.id, StepKind::Const(const_value(c)));
                Ok(())
            }
            Expr::Ident(name) => {
                self.emit_ident(node.id, name);
                Ok(())
            }
            Expr::Select {
                operand,
                field,
                test_only,
            } => {
                self.emit(operand)?;
                self.push(
                    node.id,
                    StepKind::Select {
                        field: Arc::from(field.as_str()),
                        test_only: *test_only,
                    },
                );
                Ok(())
            }
            Expr::Call {
                function,
                target,
                args,
            } => self.emit_call(node, function, target.as_deref(), args),
            Expr::CreateList { elements } => {
                for element in elements {
                    self.emit(element)?;
                }
                self.push(
                    node.id,
                    StepKind::CreateList {
                        size: elements.len(),
                    },
                );
                Ok(())
            }
            Expr::CreateMap { entries } => {
                for entry in entries {
                    self.emit(&entry.key)?;
                    self.emit(&entry.value)?;
                }
                self.push(
                    node.id,
                    StepKind::CreateMap {
                        entries: entries.len(),
                    },
                );
                Ok(())
            }
            Expr::CreateRecord { type_name, fields } => {
                for field in fields {
                    self.emit(&field.value)?;
                }
                self.push(
                    node.id,
                    StepKind::CreateRecord {
                        type_name: Arc::from(type_name.as_str()),
                        fields: fields
                            .iter()
                            .map(|f| Arc::from(f.name.as_str()))
                            .collect(),
                    },
                );
                Ok(())
            }
            Expr::Comprehension {
                iter_var,
                iter_range,
                accu_var,
                accu_init,
                loop_condition,
                loop_step,
                result,
            } => self.emit_comprehension(
                node.id,
                iter_var,
                iter_range,
                accu_var,
                accu_init,
                loop_condition,
                loop_step,
                result,
            ),
        }
    }

    fn emit_ident(&mut self, id: i64, name: &str) {
        // Comprehension variables shadow the activation.
        if let Some((_, slot)) = self
            .scopes
            .iter()
            .rev()
            .find(|(scope_name, _)| scope_name == name)
        {
            let index = *slot;
            self.push(id, StepKind::Slot { index });
            return;
        }
        let resolved = self
            .ast
            .reference(id)
            .and_then(|r| r.name.as_deref())
            .unwrap_or(name);
        self.push(
            id,
            StepKind::Ident {
                name: Arc::from(resolved),
            },
        );
    }

    fn emit_call(
        &mut self,
        node: &AstNode,
        function: &str,
        target: Option<&AstNode>,
        args: &[AstNode],
    ) -> Result<(), PlanError> {
        match function {
            operators::LOGICAL_AND | operators::LOGICAL_OR if target.is_none() => {
                let [left, right] = args else {
                    return Err(PlanError::MalformedAst(format!(
                        "'{}' expects 2 arguments, got {}",
                        function,
                        args.len()
                    )));
                };
                self.emit_logical(node.id, function == operators::LOGICAL_OR, left, right)
            }
            operators::CONDITIONAL if target.is_none() => {
                let [cond, then_arm, else_arm] = args else {
                    return Err(PlanError::MalformedAst(format!(
                        "'{}' expects 3 arguments, got {}",
                        function,
                        args.len()
                    )));
                };
                self.emit_conditional(node.id, cond, then_arm, else_arm)
            }
            operators::INDEX if target.is_none() && args.len() == 2 => {
                self.emit(&args[0])?;
                self.emit(&args[1])?;
                self.push(node.id, StepKind::Index);
                Ok(())
            }
            _ => {
                if let Some(target) = target {
                    self.emit(target)?;
                }
                for arg in args {
                    self.emit(arg)?;
                }
                let arity = args.len() + usize::from(target.is_some());
                self.push(
                    node.id,
                    StepKind::Call {
                        function: Arc::from(function),
                        arity,
                        member: target.is_some(),
                        overload_ids: reference_overloads(self.ast, node.id),
                    },
                );
                Ok(())
            }
        }
    }

    fn emit_logical(
        &mut self,
        id: i64,
        or_form: bool,
        left: &AstNode,
        right: &AstNode,
    ) -> Result<(), PlanError> {
        self.emit(left)?;
        let absorb = if self.planner.options.enable_short_circuiting {
            Some(self.push(-1, StepKind::AbsorbJump { or_form, target: 0 }))
        } else {
            None
        };
        self.emit(right)?;
        self.push(id, StepKind::Logic { or_form });
        if let Some(absorb) = absorb {
            let target = self.here();
            self.patch_absorb(absorb, target);
        }
        Ok(())
    }

    fn emit_conditional(
        &mut self,
        id: i64,
        cond: &AstNode,
        then_arm: &AstNode,
        else_arm: &AstNode,
    ) -> Result<(), PlanError> {
        self.emit(cond)?;
        let dispatch = self.push(
            id,
            StepKind::CondJump {
                else_target: 0,
                end_target: 0,
            },
        );
        self.emit(then_arm)?;
        let skip_else = self.push(-1, StepKind::Jump { target: 0 });
        let else_target = self.here();
        self.emit(else_arm)?;
        let end = self.here();

        if let StepKind::CondJump {
            else_target: e,
            end_target,
        } = &mut self.steps[dispatch].kind
        {
            *e = else_target;
            *end_target = end;
        }
        if let StepKind::Jump { target } = &mut self.steps[skip_else].kind {
            *target = end;
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn emit_comprehension(
        &mut self,
        id: i64,
        iter_var: &str,
        iter_range: &AstNode,
        accu_var: &str,
        accu_init: &AstNode,
        loop_condition: &AstNode,
        loop_step: &AstNode,
        result: &AstNode,
    ) -> Result<(), PlanError> {
        let iter_slot = self.depth * 2;
        let accu_slot = self.depth * 2 + 1;
        self.depth += 1;
        self.max_slots = self.max_slots.max(self.depth * 2);

        self.emit(iter_range)?;
        let init = self.push(
            id,
            StepKind::LoopInit {
                iter_slot,
                accu_slot,
                done: 0,
            },
        );
        self.emit(accu_init)?;
        self.push(-1, StepKind::StoreAccu { slot: accu_slot });
        self.scopes.push((accu_var.to_string(), accu_slot));

        let loop_head = self.here();
        let next = self.push(
            -1,
            StepKind::LoopNext {
                iter_slot,
                finish: 0,
            },
        );
        self.scopes.push((iter_var.to_string(), iter_slot));
        self.emit(loop_condition)?;
        let cond = self.push(
            -1,
            StepKind::LoopCond {
                iter_slot,
                accu_slot,
                finish: 0,
                done: 0,
            },
        );
        self.emit(loop_step)?;
        self.push(-1, StepKind::StoreAccu { slot: accu_slot });
        self.push(-1, StepKind::Jump { target: loop_head });

        let finish = self.here();
        self.scopes.pop();
        self.emit(result)?;
        self.push(id, StepKind::LoopFinish {
            iter_slot,
            accu_slot,
        });
        let done = self.here();
        self.scopes.pop();
        self.depth -= 1;

        if let StepKind::LoopInit { done: d, .. } = &mut self.steps[init].kind {
            *d = done;
        }
        if let StepKind::LoopNext { finish: f, .. } = &mut self.steps[next].kind {
            *f = finish;
        }
        if let StepKind::LoopCond {
            finish: f, done: d, ..
        } = &mut self.steps[cond].kind
        {
            *f = finish;
            *d = done;
        }
        Ok(())
    }

    fn patch_absorb(&mut self, index: usize, target: usize) {
        if let StepKind::AbsorbJump { target: t, .. } = &mut self.steps[index].kind {
            *t = target;
        }
    }
}

fn reference_overloads(ast: &CheckedAst, id: i64) -> Vec<Arc<str>> {
    ast.reference(id)
        .map(|r| r.overload_ids.iter().map(|s| Arc::from(s.as_str())).collect())
        .unwrap_or_default()
}

fn const_value(c: &Constant) -> Value {
    match c {
        Constant::Null => Value::Null,
        Constant::Bool(b) => Value::Bool(*b),
        Constant::Int(i) => Value::Int(*i),
        Constant::Uint(u) => Value::UInt(*u),
        Constant::Double(d) => Value::Double(*d),
        Constant::String(s) => Value::from(s.as_str()),
        Constant::Bytes(b) => Value::from(b.clone()),
    }
}

/// Exact bound on the value-stack depth a subtree can reach under the
/// emission discipline above.
fn stack_depth(node: &AstNode) -> usize {
    match &node.expr {
        Expr::Const(_) | Expr::Ident(_) => 1,
        Expr::Select { operand, .. } => stack_depth(operand),
        Expr::Call {
            function,
            target,
            args,
        } => match function.as_str() {
            operators::LOGICAL_AND | operators::LOGICAL_OR if target.is_none() => {
                let [left, right] = args.as_slice() else {
                    return 2;
                };
                stack_depth(left).max(stack_depth(right) + 1)
            }
            operators::CONDITIONAL if target.is_none() => args
                .iter()
                .map(stack_depth)
                .max()
                .unwrap_or(1),
            _ => sequence_depth(target.iter().map(|t| &**t).chain(args.iter())),
        },
        Expr::CreateList { elements } => sequence_depth(elements.iter()),
        Expr::CreateMap { entries } => {
            sequence_depth(entries.iter().flat_map(|e| [&e.key, &e.value]))
        }
        Expr::CreateRecord { fields, .. } => sequence_depth(fields.iter().map(|f| &f.value)),
        Expr::Comprehension {
            iter_range,
            accu_init,
            loop_condition,
            loop_step,
            result,
            ..
        } => [iter_range, accu_init, loop_condition, loop_step, result]
            .iter()
            .map(|n| stack_depth(n))
            .max()
            .unwrap_or(1),
    }
}

/// Depth of evaluating `nodes` left to right with all prior results
/// parked on the stack.
fn sequence_depth<'n>(nodes: impl Iterator<Item = &'n AstNode>) -> usize {
    let mut max = 1;
    for (parked, node) in nodes.enumerate() {
        max = max.max(parked + stack_depth(node));
    }
    max
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stdlib;
    use cel_runtime_common::ast::builder::AstBuilder;

    fn plan(ast: &CheckedAst, options: &RuntimeOptions) -> Result<Program, PlanError> {
        let registry = stdlib::standard_functions();
        Planner::new(&registry, options).plan(ast)
    }

    #[test]
    fn plans_constants_and_calls() {
        let b = AstBuilder::new();
        let root = b.call(operators::ADD, vec![b.int(1), b.int(2)]);
        let program = plan(&CheckedAst::from_root(root), &RuntimeOptions::default()).unwrap();

        assert_eq!(program.len(), 3);
        assert!(matches!(program.steps()[0].kind, StepKind::Const(_)));
        assert!(matches!(program.steps()[1].kind, StepKind::Const(_)));
        assert!(matches!(
            program.steps()[2].kind,
            StepKind::Call { arity: 2, .. }
        ));
        assert_eq!(program.max_stack_depth(), 2);
        assert_eq!(program.slot_count(), 0);
    }

    #[test]
    fn logical_lowering_shape() {
        let b = AstBuilder::new();
        let root = b.call(operators::LOGICAL_AND, vec![b.ident("a"), b.ident("b")]);
        let program = plan(&CheckedAst::from_root(root), &RuntimeOptions::default()).unwrap();

        // ident(a); absorb; ident(b); logic
        assert_eq!(program.len(), 4);
        let StepKind::AbsorbJump { or_form, target } = &program.steps()[1].kind else {
            panic!("expected absorb jump");
        };
        assert!(!or_form);
        assert_eq!(*target, 4);

        // Without short-circuiting there is no jump at all.
        let mut options = RuntimeOptions::default();
        options.enable_short_circuiting = false;
        let b = AstBuilder::new();
        let root = b.call(operators::LOGICAL_AND, vec![b.ident("a"), b.ident("b")]);
        let program = plan(&CheckedAst::from_root(root), &options).unwrap();
        assert_eq!(program.len(), 3);
    }

    #[test]
    fn conditional_lowering_shape() {
        let b = AstBuilder::new();
        let root = b.call(
            operators::CONDITIONAL,
            vec![b.bool(true), b.int(1), b.int(2)],
        );
        let program = plan(&CheckedAst::from_root(root), &RuntimeOptions::default()).unwrap();

        // cond; dispatch; then; jump; else
        assert_eq!(program.len(), 5);
        let StepKind::CondJump {
            else_target,
            end_target,
        } = &program.steps()[1].kind
        else {
            panic!("expected cond jump");
        };
        assert_eq!(*else_target, 4);
        assert_eq!(*end_target, 5);
        let StepKind::Jump { target } = &program.steps()[3].kind else {
            panic!("expected jump");
        };
        assert_eq!(*target, 5);
    }

    #[test]
    fn comprehension_allocates_slots() {
        let b = AstBuilder::new();
        // [1].map-ish shell: all(x, x) expansion over a one-element list.
        let root = b.comprehension(
            "x",
            b.list(vec![b.int(1)]),
            "__result__",
            b.bool(true),
            b.call(operators::NOT_STRICTLY_FALSE, vec![b.ident("__result__")]),
            b.call(
                operators::LOGICAL_AND,
                vec![b.ident("__result__"), b.ident("x")],
            ),
            b.ident("__result__"),
        );
        let program = plan(&CheckedAst::from_root(root), &RuntimeOptions::default()).unwrap();
        assert_eq!(program.slot_count(), 2);

        // Iteration variables lower to slot reads, not activation lookups.
        assert!(program
            .steps()
            .iter()
            .any(|s| matches!(s.kind, StepKind::Slot { .. })));
        assert!(!program
            .steps()
            .iter()
            .any(|s| matches!(&s.kind, StepKind::Ident { name } if name.as_ref() == "x")));
    }

    #[test]
    fn nested_comprehensions_stack_slots() {
        let b = AstBuilder::new();
        let inner = b.comprehension(
            "y",
            b.list(vec![b.int(1)]),
            "__result__",
            b.bool(true),
            b.bool(true),
            b.ident("y"),
            b.ident("__result__"),
        );
        let root = b.comprehension(
            "x",
            b.list(vec![b.int(1)]),
            "__result__",
            b.bool(true),
            b.bool(true),
            inner,
            b.ident("__result__"),
        );
        let program = plan(&CheckedAst::from_root(root), &RuntimeOptions::default()).unwrap();
        assert_eq!(program.slot_count(), 4);
    }

    #[test]
    fn stack_limit_is_a_plan_error() {
        let b = AstBuilder::new();
        let root = b.list((0..10).map(|i| b.int(i)).collect());
        let mut options = RuntimeOptions::default();
        options.max_value_stack_depth = 4;
        let err = plan(&CheckedAst::from_root(root), &options).unwrap_err();
        assert!(matches!(
            err,
            PlanError::StackLimitExceeded {
                required: 10,
                limit: 4
            }
        ));
    }

    #[test]
    fn folding_collapses_constant_calls() {
        let b = AstBuilder::new();
        let root = b.call(
            operators::ADD,
            vec![b.int(1), b.call(operators::ADD, vec![b.int(2), b.int(3)])],
        );
        let mut options = RuntimeOptions::default();
        options.enable_constant_folding = true;
        let program = plan(&CheckedAst::from_root(root), &options).unwrap();
        assert_eq!(program.len(), 1);
        let StepKind::Const(v) = &program.steps()[0].kind else {
            panic!("expected folded constant");
        };
        assert_eq!(*v, Value::Int(6));
    }

    #[test]
    fn folding_keeps_erroring_subtrees() {
        let b = AstBuilder::new();
        let root = b.call(operators::DIVIDE, vec![b.int(1), b.int(0)]);
        let mut options = RuntimeOptions::default();
        options.enable_constant_folding = true;
        let program = plan(&CheckedAst::from_root(root), &options).unwrap();
        // 1 / 0 folds to an error, so it stays unfolded.
        assert_eq!(program.len(), 3);
    }

    #[test]
    fn empty_ast_is_malformed() {
        let err = plan(&CheckedAst::default(), &RuntimeOptions::default()).unwrap_err();
        assert!(matches!(err, PlanError::MalformedAst(_)));
    }
}
