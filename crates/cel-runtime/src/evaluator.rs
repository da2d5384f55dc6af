//! The stack evaluator.
//!
//! Executes a [`Program`] against an activation: one sequential pass over
//! the step array, mutating the frame's value stack and slot table.
//! Attribute trails ride along with every stack entry; steps that read
//! inputs consult the activation's unknown and missing patterns before
//! resolving values. Errors and unknowns are values and combine per the
//! propagation table; iteration-budget and deadline exhaustion abort with
//! a fatal error instead.

use std::sync::Arc;
use std::time::Instant;

use cel_runtime_common::operators;
use cel_runtime_common::Kind;
use tracing::trace;

use crate::activation::Activation;
use crate::arena::{Allocator, Arena};
use crate::attribute::{AttributeTrail, Qualifier, UnknownSet};
use crate::error::{EvalError, FatalError};
use crate::frame::{Entry, ExecutionFrame, IterState};
use crate::options::{RuntimeOptions, UnknownTracking};
use crate::program::{Program, Step, StepKind};
use crate::record::{self, RecordProvider};
use crate::registry::{CallContext, FunctionRegistry, Resolution};
use crate::value::{MapKey, Value};

/// Per-step trace callback: `(nodeId, value)`. Returning an error aborts
/// the evaluation with [`FatalError::Trace`].
pub type TraceFn<'t> = dyn FnMut(i64, &Value) -> Result<(), EvalError> + 't;

/// Evaluates one program. Cheap to construct; reusable across calls.
///
/// The program, registry, provider, and options are all shared immutably,
/// so any number of evaluators (and threads) may run the same program
/// concurrently with their own activations.
pub struct Evaluator<'a> {
    program: &'a Program,
    registry: &'a FunctionRegistry,
    provider: &'a dyn RecordProvider,
    options: &'a RuntimeOptions,
    deadline: Option<Instant>,
}

impl<'a> Evaluator<'a> {
    pub fn new(
        program: &'a Program,
        registry: &'a FunctionRegistry,
        provider: &'a dyn RecordProvider,
        options: &'a RuntimeOptions,
    ) -> Self {
        Self {
            program,
            registry,
            provider,
            options,
            deadline: None,
        }
    }

    /// Abort with [`FatalError::Cancelled`] once `deadline` passes; the
    /// check runs on every step.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Evaluate with heap-backed allocation and no tracing.
    pub fn eval(&self, activation: &dyn Activation) -> Result<Value, FatalError> {
        self.run(activation, Allocator::heap(), None)
    }

    /// Evaluate with results retained in `arena`.
    pub fn eval_in(&self, activation: &dyn Activation, arena: &Arena) -> Result<Value, FatalError> {
        self.run(activation, Allocator::pooled(arena), None)
    }

    /// Evaluate, invoking `trace` after every value-producing step.
    pub fn eval_traced(
        &self,
        activation: &dyn Activation,
        trace: &mut TraceFn<'_>,
    ) -> Result<Value, FatalError> {
        self.run(activation, Allocator::heap(), Some(trace))
    }

    fn run(
        &self,
        activation: &dyn Activation,
        allocator: Allocator<'_>,
        mut tracer: Option<&mut TraceFn<'_>>,
    ) -> Result<Value, FatalError> {
        let steps = self.program.steps();
        let mut frame =
            ExecutionFrame::new(self.program.slot_count(), self.program.max_stack_depth());

        while frame.pc < steps.len() {
            if let Some(deadline) = self.deadline {
                if Instant::now() >= deadline {
                    return Err(FatalError::Cancelled);
                }
            }
            let step = &steps[frame.pc];
            let next_pc = self.execute(step, &mut frame, activation, allocator)?;

            if let Some(tracer) = tracer.as_deref_mut() {
                if step.id >= 0 && produces_value(&step.kind) {
                    if let Some(top) = frame.stack.peek() {
                        tracer(step.id, top)
                            .map_err(|e| FatalError::Trace(e.to_string()))?;
                    }
                }
            }
            frame.pc = next_pc;
        }

        if frame.stack.len() != 1 {
            return Err(FatalError::Internal(format!(
                "evaluation finished with {} stack values",
                frame.stack.len()
            )));
        }
        let (result, _) = frame.stack.pop()?;
        allocator.retain(&result);
        trace!(result = %result, "evaluation complete");
        Ok(result)
    }

    /// Execute one step, returning the next program counter.
    fn execute(
        &self,
        step: &Step,
        frame: &mut ExecutionFrame,
        activation: &dyn Activation,
        allocator: Allocator<'_>,
    ) -> Result<usize, FatalError> {
        let pc = frame.pc;
        let next = pc + 1;
        match &step.kind {
            StepKind::Const(value) => {
                frame.stack.push(value.clone(), AttributeTrail::empty());
                Ok(next)
            }
            StepKind::Ident { name } => {
                self.ident(frame, activation, name)?;
                Ok(next)
            }
            StepKind::Slot { index } => {
                let (value, trail) = frame.slot(*index)?.clone();
                frame.stack.push(value, trail);
                Ok(next)
            }
            StepKind::Select { field, test_only } => {
                self.select(frame, activation, field, *test_only)?;
                Ok(next)
            }
            StepKind::Index => {
                self.index(frame, activation)?;
                Ok(next)
            }
            StepKind::Call {
                function,
                arity,
                member,
                overload_ids,
            } => {
                self.call(frame, allocator, function, *arity, *member, overload_ids)?;
                Ok(next)
            }
            StepKind::CreateList { size } => {
                let entries = frame.stack.pop_n(*size)?;
                let value = self.propagate(&entries).unwrap_or_else(|| {
                    Value::list(entries.iter().map(|(v, _)| v.clone()))
                });
                frame.stack.push(value, AttributeTrail::empty());
                Ok(next)
            }
            StepKind::CreateMap { entries } => {
                let popped = frame.stack.pop_n(entries * 2)?;
                let value = self
                    .propagate(&popped)
                    .unwrap_or_else(|| build_map(&popped));
                frame.stack.push(value, AttributeTrail::empty());
                Ok(next)
            }
            StepKind::CreateRecord { type_name, fields } => {
                let popped = frame.stack.pop_n(fields.len())?;
                let value = self
                    .propagate(&popped)
                    .unwrap_or_else(|| self.build_record(type_name, fields, &popped));
                frame.stack.push(value, AttributeTrail::empty());
                Ok(next)
            }
            StepKind::Jump { target } => Ok(*target),
            StepKind::AbsorbJump { or_form, target } => {
                match frame.stack.peek() {
                    Some(Value::Bool(b)) if *b == *or_form => Ok(*target),
                    _ => Ok(next),
                }
            }
            StepKind::Logic { or_form } => {
                let (right, _) = frame.stack.pop()?;
                let (left, _) = frame.stack.pop()?;
                frame
                    .stack
                    .push(combine_logic(*or_form, left, right), AttributeTrail::empty());
                Ok(next)
            }
            StepKind::CondJump {
                else_target,
                end_target,
            } => {
                let (cond, trail) = frame.stack.pop()?;
                match cond {
                    Value::Bool(true) => Ok(next),
                    Value::Bool(false) => Ok(*else_target),
                    Value::Error(_) | Value::Unknown(_) => {
                        frame.stack.push(cond, trail);
                        Ok(*end_target)
                    }
                    other => {
                        frame.stack.push(
                            Value::error(EvalError::no_such_overload(
                                operators::CONDITIONAL,
                                &[other.kind()],
                            )),
                            AttributeTrail::empty(),
                        );
                        Ok(*end_target)
                    }
                }
            }
            StepKind::LoopInit {
                iter_slot: _,
                accu_slot: _,
                done,
            } => {
                let (range, trail) = frame.stack.pop()?;
                match range {
                    Value::Error(_) | Value::Unknown(_) => {
                        frame.stack.push(range, trail);
                        Ok(*done)
                    }
                    Value::List(list) => {
                        let items: Vec<Entry> = list
                            .iter()
                            .enumerate()
                            .map(|(i, v)| (v.clone(), trail.step(Qualifier::Int(i as i64))))
                            .collect();
                        frame.iter_stack.push(IterState::new(items));
                        Ok(next)
                    }
                    Value::Map(map) => {
                        let items: Vec<Entry> = map
                            .keys()
                            .map(|k| (k.to_value(), trail.step(Qualifier::from_key(k))))
                            .collect();
                        frame.iter_stack.push(IterState::new(items));
                        Ok(next)
                    }
                    other => {
                        frame.stack.push(
                            Value::error(EvalError::no_such_overload(
                                "<iter-range>",
                                &[other.kind()],
                            )),
                            AttributeTrail::empty(),
                        );
                        Ok(*done)
                    }
                }
            }
            StepKind::StoreAccu { slot } => {
                let entry = frame.stack.pop()?;
                frame.set_slot(*slot, entry)?;
                Ok(next)
            }
            StepKind::LoopNext { iter_slot, finish } => {
                let Some(state) = frame.iter_stack.last_mut() else {
                    return Err(FatalError::Internal("loop without iteration state".into()));
                };
                match state.next() {
                    None => Ok(*finish),
                    Some((mut value, trail)) => {
                        frame.iterations += 1;
                        let budget = self.options.comprehension_max_iterations;
                        if budget != 0 && frame.iterations > budget {
                            return Err(FatalError::IterationLimit);
                        }
                        if let Some(replacement) = self.check_patterns(activation, &trail) {
                            value = replacement;
                        }
                        frame.set_slot(*iter_slot, (value, trail))?;
                        Ok(next)
                    }
                }
            }
            StepKind::LoopCond {
                iter_slot,
                accu_slot,
                finish,
                done,
            } => {
                let (cond, trail) = frame.stack.pop()?;
                match cond {
                    Value::Bool(true) => Ok(next),
                    Value::Bool(false) => {
                        if self.options.enable_short_circuiting {
                            Ok(*finish)
                        } else {
                            Ok(next)
                        }
                    }
                    Value::Error(_) | Value::Unknown(_) => {
                        frame.clear_slot(*iter_slot);
                        frame.clear_slot(*accu_slot);
                        frame.iter_stack.pop();
                        frame.stack.push(cond, trail);
                        Ok(*done)
                    }
                    other => {
                        frame.clear_slot(*iter_slot);
                        frame.clear_slot(*accu_slot);
                        frame.iter_stack.pop();
                        frame.stack.push(
                            Value::error(EvalError::no_such_overload(
                                "<loop-condition>",
                                &[other.kind()],
                            )),
                            AttributeTrail::empty(),
                        );
                        Ok(*done)
                    }
                }
            }
            StepKind::LoopFinish {
                iter_slot,
                accu_slot,
            } => {
                frame.clear_slot(*iter_slot);
                frame.clear_slot(*accu_slot);
                frame.iter_stack.pop();
                Ok(next)
            }
        }
    }

    fn ident(
        &self,
        frame: &mut ExecutionFrame,
        activation: &dyn Activation,
        name: &Arc<str>,
    ) -> Result<(), FatalError> {
        let trail = AttributeTrail::root(name.clone());
        if let Some(replacement) = self.check_patterns(activation, &trail) {
            frame.stack.push(replacement, trail);
            return Ok(());
        }
        if let Some(value) = activation.find(name) {
            frame.stack.push(value, trail);
            return Ok(());
        }
        if let Some(cached) = frame.lazy_cache.get(name.as_ref()) {
            let value = cached.clone();
            frame.stack.push(value, trail);
            return Ok(());
        }
        if let Some(thunk) = activation.find_lazy(name) {
            let value = thunk();
            frame
                .lazy_cache
                .insert(name.to_string(), value.clone());
            frame.stack.push(value, trail);
            return Ok(());
        }
        frame.stack.push(
            Value::error(EvalError::no_such_attribute(name)),
            trail,
        );
        Ok(())
    }

    fn select(
        &self,
        frame: &mut ExecutionFrame,
        activation: &dyn Activation,
        field: &Arc<str>,
        test_only: bool,
    ) -> Result<(), FatalError> {
        let (operand, trail) = frame.stack.pop()?;
        if operand.is_error() || operand.is_unknown() {
            frame.stack.push(operand, trail);
            return Ok(());
        }
        let new_trail = trail.step(Qualifier::Field(field.clone()));
        if let Some(replacement) = self.check_patterns(activation, &new_trail) {
            frame.stack.push(replacement, new_trail);
            return Ok(());
        }

        let result = if test_only {
            match &operand {
                Value::Map(map) => {
                    Value::Bool(map.contains_key(&MapKey::String(field.clone())))
                }
                Value::Record(record) => match record.has_field(field) {
                    Ok(present) => Value::Bool(present),
                    Err(err) => Value::error(err),
                },
                other => Value::error(EvalError::no_such_overload("has", &[other.kind()])),
            }
        } else {
            match &operand {
                Value::Map(map) => match map.get(&MapKey::String(field.clone())) {
                    Some(value) => value.clone(),
                    None => Value::error(EvalError::no_such_key(field)),
                },
                Value::Record(record) => match record.get_field(field) {
                    Ok(value) => value,
                    Err(err) => Value::error(err),
                },
                other => Value::error(EvalError::no_such_overload(
                    &format!("{}.{}", other.kind(), field),
                    &[other.kind()],
                )),
            }
        };
        frame.stack.push(result, new_trail);
        Ok(())
    }

    fn index(
        &self,
        frame: &mut ExecutionFrame,
        activation: &dyn Activation,
    ) -> Result<(), FatalError> {
        let index_entry = frame.stack.pop()?;
        let operand_entry = frame.stack.pop()?;
        if let Some(propagated) = self.propagate(&[operand_entry.clone(), index_entry.clone()]) {
            frame.stack.push(propagated, operand_entry.1);
            return Ok(());
        }
        let (operand, trail) = operand_entry;
        let (index, _) = index_entry;

        let heterogeneous = self.options.enable_heterogeneous_equality;
        let new_trail = match MapKey::lookup_key(&index, heterogeneous) {
            Some(key) => trail.step(Qualifier::from_key(&key)),
            None => AttributeTrail::empty(),
        };
        if let Some(replacement) = self.check_patterns(activation, &new_trail) {
            frame.stack.push(replacement, new_trail);
            return Ok(());
        }

        let result = match &operand {
            Value::List(list) => match list_index(&index, heterogeneous) {
                Some(i) if i >= 0 && (i as usize) < list.len() => {
                    list.get(i as usize).cloned().unwrap_or(Value::Null)
                }
                Some(i) => Value::error(EvalError::invalid_argument(format!(
                    "index out of range: {}",
                    i
                ))),
                None => Value::error(EvalError::no_such_overload(
                    operators::INDEX,
                    &[operand.kind(), index.kind()],
                )),
            },
            Value::Map(map) => match map.lookup(&index, heterogeneous) {
                Ok(Some(value)) => value.clone(),
                Ok(None) => Value::error(EvalError::no_such_key(&index.to_string())),
                Err(err) => Value::error(err),
            },
            other => Value::error(EvalError::no_such_overload(
                operators::INDEX,
                &[other.kind(), index.kind()],
            )),
        };
        frame.stack.push(result, new_trail);
        Ok(())
    }

    fn call(
        &self,
        frame: &mut ExecutionFrame,
        allocator: Allocator<'_>,
        function: &Arc<str>,
        arity: usize,
        member: bool,
        overload_ids: &[Arc<str>],
    ) -> Result<(), FatalError> {
        let entries = frame.stack.pop_n(arity)?;
        let non_strict = self.registry.is_non_strict(function, arity, member);

        if !non_strict {
            if let Some(mut propagated) = self.propagate(&entries) {
                // Under function-result tracking the call itself joins the
                // unknown set, so callers can tell which call could not be
                // resolved.
                if self.options.unknown_tracking == UnknownTracking::AttributeAndFunction {
                    if let Value::Unknown(set) = &propagated {
                        let tagged =
                            set.union(&UnknownSet::of(AttributeTrail::root(format!(
                                "{}()",
                                function
                            ))));
                        propagated = Value::unknown(tagged);
                    }
                }
                frame.stack.push(propagated, AttributeTrail::empty());
                return Ok(());
            }
        }

        let args: Vec<Value> = entries.iter().map(|(v, _)| v.clone()).collect();
        let kinds: Vec<Kind> = args.iter().map(Value::kind).collect();
        let result = match self.registry.resolve(function, &kinds, member, overload_ids) {
            Resolution::Matched(overload) => {
                let ctx = CallContext {
                    provider: self.provider,
                    allocator,
                    options: self.options,
                };
                overload.call(&args, &ctx)
            }
            Resolution::NoMatch => Value::error(EvalError::no_such_overload(function, &kinds)),
            Resolution::UnknownFunction => Value::error(EvalError::new(
                crate::error::EvalErrorKind::NoSuchOverload,
                format!("unknown function '{}'", function),
            )),
        };
        frame.stack.push(result, AttributeTrail::empty());
        Ok(())
    }

    fn build_record(&self, type_name: &Arc<str>, fields: &[Arc<str>], values: &[Entry]) -> Value {
        let builder = self
            .provider
            .new_builder(type_name)
            .or_else(|| record::well_known_builder(type_name));
        let Some(mut builder) = builder else {
            return Value::error(EvalError::invalid_argument(format!(
                "unknown message type '{}'",
                type_name
            )));
        };
        for (field, (value, _)) in fields.iter().zip(values.iter()) {
            if let Err(err) = builder.set_field(field, value.clone()) {
                return Value::error(err);
            }
        }
        match builder.build() {
            Ok(value) => value,
            Err(err) => Value::error(err),
        }
    }

    /// Apply the propagation table to already-evaluated operands: unknowns
    /// union and dominate, otherwise the first error in evaluation order
    /// wins. `None` means all operands are normal values.
    fn propagate(&self, entries: &[Entry]) -> Option<Value> {
        let mut unknowns: Option<UnknownSet> = None;
        for (value, _) in entries {
            if let Value::Unknown(set) = value {
                unknowns = Some(match unknowns {
                    None => set.as_ref().clone(),
                    Some(acc) => acc.union(set),
                });
            }
        }
        if let Some(set) = unknowns {
            return Some(Value::unknown(set));
        }
        entries
            .iter()
            .find(|(value, _)| value.is_error())
            .map(|(value, _)| value.clone())
    }

    /// Unknown patterns first, then missing patterns, each gated on its
    /// option. A match replaces the value the step would otherwise push.
    fn check_patterns(&self, activation: &dyn Activation, trail: &AttributeTrail) -> Option<Value> {
        if trail.is_empty() {
            return None;
        }
        if self.options.tracks_unknowns()
            && activation
                .unknown_patterns()
                .iter()
                .any(|p| p.matches(trail))
        {
            return Some(Value::unknown(UnknownSet::of(trail.clone())));
        }
        if self.options.enable_missing_attribute_errors
            && activation
                .missing_patterns()
                .iter()
                .any(|p| p.matches(trail))
        {
            return Some(Value::error(EvalError::missing_attribute(trail)));
        }
        None
    }
}

/// Steps that leave their own result on top of the stack.
fn produces_value(kind: &StepKind) -> bool {
    matches!(
        kind,
        StepKind::Const(_)
            | StepKind::Ident { .. }
            | StepKind::Slot { .. }
            | StepKind::Select { .. }
            | StepKind::Index
            | StepKind::Call { .. }
            | StepKind::CreateList { .. }
            | StepKind::CreateMap { .. }
            | StepKind::CreateRecord { .. }
            | StepKind::Logic { .. }
            | StepKind::LoopFinish { .. }
    )
}

/// The commutative short-circuit table for `&&` and `||`.
fn combine_logic(or_form: bool, left: Value, right: Value) -> Value {
    let absorbing = or_form;
    if matches!(left, Value::Bool(b) if b == absorbing)
        || matches!(right, Value::Bool(b) if b == absorbing)
    {
        return Value::Bool(absorbing);
    }
    match (&left, &right) {
        (Value::Unknown(a), Value::Unknown(b)) => Value::unknown(a.union(b)),
        (Value::Unknown(a), _) => Value::unknown(a.as_ref().clone()),
        (_, Value::Unknown(b)) => Value::unknown(b.as_ref().clone()),
        (Value::Error(_), _) => left,
        (_, Value::Error(_)) => right,
        (Value::Bool(a), Value::Bool(b)) => {
            if or_form {
                Value::Bool(*a || *b)
            } else {
                Value::Bool(*a && *b)
            }
        }
        _ => {
            let name = if or_form {
                operators::LOGICAL_OR
            } else {
                operators::LOGICAL_AND
            };
            Value::error(EvalError::no_such_overload(
                name,
                &[left.kind(), right.kind()],
            ))
        }
    }
}

fn build_map(entries: &[Entry]) -> Value {
    let mut map = crate::value::ValueMap::new();
    for pair in entries.chunks_exact(2) {
        let key = &pair[0].0;
        let value = pair[1].0.clone();
        let Some(map_key) = MapKey::from_value(key) else {
            return Value::error(EvalError::invalid_argument(format!(
                "invalid map key type: '{}'",
                key.kind()
            )));
        };
        if map.insert(map_key, value).is_some() {
            return Value::error(EvalError::invalid_argument(format!(
                "repeated map key: {}",
                key
            )));
        }
    }
    map.into()
}

/// Interpret a value as a list index, coercing uint and integral double
/// under heterogeneous equality.
fn list_index(index: &Value, heterogeneous: bool) -> Option<i64> {
    match index {
        Value::Int(i) => Some(*i),
        Value::UInt(u) if heterogeneous => i64::try_from(*u).ok(),
        Value::Double(d) if heterogeneous => {
            if d.fract() == 0.0 && *d >= i64::MIN as f64 && *d <= i64::MAX as f64 {
                Some(*d as i64)
            } else {
                None
            }
        }
        _ => None,
    }
}
