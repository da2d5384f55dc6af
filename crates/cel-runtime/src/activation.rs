//! Variable bindings for evaluation.
//!
//! An [`Activation`] supplies the values for the variables an expression
//! references, plus the attribute patterns marking inputs as unknown or
//! forbidden. Bindings may be eager values or lazy thunks; a thunk runs at
//! most once per evaluation, with the result cached in the execution frame.

use std::collections::HashMap;
use std::sync::Arc;

use crate::attribute::AttributePattern;
use crate::value::Value;

/// A lazily produced binding.
pub type ValueThunk = Arc<dyn Fn() -> Value + Send + Sync>;

/// Resolves variable names during evaluation.
pub trait Activation: Send + Sync {
    /// Resolve an eagerly bound variable.
    fn find(&self, name: &str) -> Option<Value>;

    /// Resolve a lazily bound variable. The evaluator calls the thunk at
    /// most once per evaluation and caches its result for the rest of that
    /// evaluation.
    fn find_lazy(&self, _name: &str) -> Option<ValueThunk> {
        None
    }

    /// Patterns marking inputs whose values are withheld.
    fn unknown_patterns(&self) -> &[AttributePattern] {
        &[]
    }

    /// Patterns marking inputs that must not be touched; matching accesses
    /// produce a missing-attribute error.
    fn missing_patterns(&self) -> &[AttributePattern] {
        &[]
    }
}

/// An activation backed by a hash map, with optional lazy bindings and
/// attribute patterns.
#[derive(Default)]
pub struct MapActivation {
    bindings: HashMap<String, Value>,
    lazy: HashMap<String, ValueThunk>,
    unknown: Vec<AttributePattern>,
    missing: Vec<AttributePattern>,
}

impl MapActivation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_iter(bindings: impl IntoIterator<Item = (String, Value)>) -> Self {
        Self {
            bindings: bindings.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Bind a value eagerly.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.bindings.insert(name.into(), value.into());
    }

    /// Bind a thunk, called at most once per evaluation.
    pub fn insert_lazy<F>(&mut self, name: impl Into<String>, thunk: F)
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        self.lazy.insert(name.into(), Arc::new(thunk));
    }

    /// Mark an attribute pattern as unknown.
    pub fn mark_unknown(&mut self, pattern: AttributePattern) {
        self.unknown.push(pattern);
    }

    /// Mark an attribute pattern as forbidden.
    pub fn mark_missing(&mut self, pattern: AttributePattern) {
        self.missing.push(pattern);
    }

    /// Builder-style variant of [`insert`](Self::insert).
    pub fn with_binding(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    /// Builder-style variant of [`mark_unknown`](Self::mark_unknown).
    pub fn with_unknown(mut self, pattern: AttributePattern) -> Self {
        self.mark_unknown(pattern);
        self
    }

    /// Builder-style variant of [`mark_missing`](Self::mark_missing).
    pub fn with_missing(mut self, pattern: AttributePattern) -> Self {
        self.mark_missing(pattern);
        self
    }

    pub fn len(&self) -> usize {
        self.bindings.len() + self.lazy.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty() && self.lazy.is_empty()
    }
}

impl Activation for MapActivation {
    fn find(&self, name: &str) -> Option<Value> {
        self.bindings.get(name).cloned()
    }

    fn find_lazy(&self, name: &str) -> Option<ValueThunk> {
        self.lazy.get(name).cloned()
    }

    fn unknown_patterns(&self) -> &[AttributePattern] {
        &self.unknown
    }

    fn missing_patterns(&self) -> &[AttributePattern] {
        &self.missing
    }
}

impl std::fmt::Debug for MapActivation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapActivation")
            .field("bindings", &self.bindings.len())
            .field("lazy", &self.lazy.len())
            .field("unknown", &self.unknown.len())
            .field("missing", &self.missing.len())
            .finish()
    }
}

/// An activation with no bindings.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyActivation;

impl EmptyActivation {
    pub fn new() -> Self {
        Self
    }
}

impl Activation for EmptyActivation {
    fn find(&self, _name: &str) -> Option<Value> {
        None
    }
}

impl<T: Activation + ?Sized> Activation for &T {
    fn find(&self, name: &str) -> Option<Value> {
        (**self).find(name)
    }

    fn find_lazy(&self, name: &str) -> Option<ValueThunk> {
        (**self).find_lazy(name)
    }

    fn unknown_patterns(&self) -> &[AttributePattern] {
        (**self).unknown_patterns()
    }

    fn missing_patterns(&self) -> &[AttributePattern] {
        (**self).missing_patterns()
    }
}

impl<T: Activation + ?Sized> Activation for Arc<T> {
    fn find(&self, name: &str) -> Option<Value> {
        (**self).find(name)
    }

    fn find_lazy(&self, name: &str) -> Option<ValueThunk> {
        (**self).find_lazy(name)
    }

    fn unknown_patterns(&self) -> &[AttributePattern] {
        (**self).unknown_patterns()
    }

    fn missing_patterns(&self) -> &[AttributePattern] {
        (**self).missing_patterns()
    }
}
