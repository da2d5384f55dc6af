//! CEL expression evaluation engine.
//!
//! Turns a checked CEL abstract syntax tree into a value, given named input
//! bindings and a registry of functions and record types. The pipeline has
//! two halves:
//!
//! - The [`Planner`] lowers a checked AST (from an external type checker)
//!   into an immutable [`Program`]: a flat step sequence with jump-based
//!   short-circuiting and slot-allocated comprehensions.
//! - The [`Evaluator`] executes a program against an [`Activation`],
//!   tracking attribute trails for unknown and missing input handling, and
//!   returns a single [`Value`] or a fatal error.
//!
//! # Example
//!
//! ```
//! use cel_runtime::ast::builder::AstBuilder;
//! use cel_runtime::ast::CheckedAst;
//! use cel_runtime::record::EmptyRecordProvider;
//! use cel_runtime::{operators, stdlib};
//! use cel_runtime::{Evaluator, MapActivation, Planner, RuntimeOptions, Value};
//!
//! // `x + 1`, as the checker would hand it over.
//! let b = AstBuilder::new();
//! let ast = CheckedAst::from_root(b.call(operators::ADD, vec![b.ident("x"), b.int(1)]));
//!
//! let registry = stdlib::standard_functions();
//! let options = RuntimeOptions::default();
//! let program = Planner::new(&registry, &options).plan(&ast).unwrap();
//!
//! let mut activation = MapActivation::new();
//! activation.insert("x", 41i64);
//!
//! let provider = EmptyRecordProvider;
//! let evaluator = Evaluator::new(&program, &registry, &provider, &options);
//! assert_eq!(evaluator.eval(&activation).unwrap(), Value::Int(42));
//! ```
//!
//! Programs are immutable and safe to share: one program may be evaluated
//! from many threads concurrently, each call with its own activation and
//! arena. The registry and record provider are configured once, before the
//! first evaluation, and shared without locks.

pub mod activation;
pub mod arena;
pub mod attribute;
pub mod error;
pub mod evaluator;
pub mod frame;
pub mod options;
pub mod planner;
pub mod program;
pub mod proto;
pub mod record;
pub mod registry;
pub mod stdlib;
pub mod time;
pub mod value;

// The shared type system and AST contract, re-exported so embedders depend
// on one crate.
pub use cel_runtime_common::{ast, operators, CelType, Kind};

pub use activation::{Activation, EmptyActivation, MapActivation};
pub use arena::{Allocator, Arena};
pub use attribute::{AttributePattern, AttributeTrail, Qualifier, UnknownSet};
pub use error::{EvalError, EvalErrorKind, FatalError, PlanError};
pub use evaluator::{Evaluator, TraceFn};
pub use options::{RuntimeOptions, StringBacking, UnknownTracking};
pub use planner::Planner;
pub use program::{Program, Step, StepKind};
pub use record::{
    DeclaredRecordProvider, EmptyRecordProvider, FieldInfo, RecordBuilder, RecordProvider,
    RecordRef, RecordValue,
};
pub use registry::{CallContext, Function, FunctionImpl, FunctionRegistry, Overload, Resolution};
pub use value::{
    BytesBuffer, Duration, ListValue, MapKey, OptionalValue, StrBuffer, Timestamp, TypeValue,
    Value, ValueError, ValueMap,
};
