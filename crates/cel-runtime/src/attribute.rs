//! Attribute trails, patterns, and unknown sets.
//!
//! An attribute names a piece of the input: a root variable plus a path of
//! field and index qualifiers. The evaluator threads an [`AttributeTrail`]
//! alongside every stack slot so it can tell *where* a value came from;
//! activations publish [`AttributePattern`]s marking attributes as unknown
//! (value withheld) or missing (access forbidden); matching trails turn
//! into [`UnknownSet`]s or missing-attribute errors.

use std::fmt;
use std::sync::Arc;

use crate::value::{MapKey, Value};

/// One step of an attribute path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Qualifier {
    /// Field or string-key access.
    Field(Arc<str>),
    /// Integer index or key.
    Int(i64),
    /// Unsigned integer key.
    Uint(u64),
    /// Boolean key.
    Bool(bool),
}

impl Qualifier {
    /// The qualifier addressing a container element keyed by `key`.
    pub fn from_key(key: &MapKey) -> Self {
        match key {
            MapKey::Bool(b) => Qualifier::Bool(*b),
            MapKey::Int(i) => Qualifier::Int(*i),
            MapKey::UInt(u) => Qualifier::Uint(*u),
            MapKey::String(s) => Qualifier::Field(s.clone()),
        }
    }

    /// The qualifier for an index value, if the value is a valid key kind.
    pub fn from_value(value: &Value) -> Option<Self> {
        MapKey::from_value(value).map(|k| Self::from_key(&k))
    }
}

impl fmt::Display for Qualifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Qualifier::Field(name) => write!(f, ".{}", name),
            Qualifier::Int(i) => write!(f, "[{}]", i),
            Qualifier::Uint(u) => write!(f, "[{}u]", u),
            Qualifier::Bool(b) => write!(f, "[{}]", b),
        }
    }
}

/// Where a stack value came from: empty, or a root variable plus the
/// qualifier path taken from it.
///
/// Trails are immutable and share their spine; extending one clones the
/// qualifier path, which stays short in practice.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AttributeTrail {
    inner: Option<Arc<TrailInner>>,
}

#[derive(Debug, PartialEq, Eq)]
struct TrailInner {
    root: Arc<str>,
    path: Vec<Qualifier>,
}

impl AttributeTrail {
    /// The empty trail: the value was computed, not read from an input.
    pub fn empty() -> Self {
        Self { inner: None }
    }

    /// A trail rooted at a variable.
    pub fn root(name: impl Into<Arc<str>>) -> Self {
        Self {
            inner: Some(Arc::new(TrailInner {
                root: name.into(),
                path: Vec::new(),
            })),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_none()
    }

    /// Root variable name, when the trail is non-empty.
    pub fn root_name(&self) -> Option<&str> {
        self.inner.as_deref().map(|t| t.root.as_ref())
    }

    /// Qualifier path from the root.
    pub fn path(&self) -> &[Qualifier] {
        self.inner.as_deref().map(|t| t.path.as_slice()).unwrap_or(&[])
    }

    /// Extend the trail with one qualifier. Extending the empty trail is a
    /// no-op: computed values stay anonymous.
    pub fn step(&self, qualifier: Qualifier) -> AttributeTrail {
        match self.inner.as_deref() {
            None => AttributeTrail::empty(),
            Some(inner) => {
                let mut path = inner.path.clone();
                path.push(qualifier);
                AttributeTrail {
                    inner: Some(Arc::new(TrailInner {
                        root: inner.root.clone(),
                        path,
                    })),
                }
            }
        }
    }
}

impl fmt::Display for AttributeTrail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.as_deref() {
            None => write!(f, "<computed>"),
            Some(inner) => {
                write!(f, "{}", inner.root)?;
                for q in &inner.path {
                    write!(f, "{}", q)?;
                }
                Ok(())
            }
        }
    }
}

/// One element of a pattern's qualifier path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternQualifier {
    /// Matches one specific qualifier.
    Literal(Qualifier),
    /// Matches any single qualifier.
    Wildcard,
}

impl PatternQualifier {
    fn matches(&self, qualifier: &Qualifier) -> bool {
        match self {
            PatternQualifier::Wildcard => true,
            PatternQualifier::Literal(lit) => lit == qualifier,
        }
    }
}

/// A pattern over attributes: a root variable name and a qualifier path of
/// literals and wildcards.
///
/// A concrete trail matches when its root equals the pattern's root and the
/// pattern's path is a *prefix* of the trail's path under element-wise
/// matching: marking `request.auth` unknown also marks everything below it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributePattern {
    root: Arc<str>,
    path: Vec<PatternQualifier>,
}

impl AttributePattern {
    /// A pattern matching the whole variable `root` and everything under it.
    pub fn new(root: impl Into<Arc<str>>) -> Self {
        Self {
            root: root.into(),
            path: Vec::new(),
        }
    }

    /// Require a literal field qualifier next.
    pub fn field(mut self, name: &str) -> Self {
        self.path
            .push(PatternQualifier::Literal(Qualifier::Field(Arc::from(name))));
        self
    }

    /// Require a literal index qualifier next.
    pub fn index(mut self, index: i64) -> Self {
        self.path
            .push(PatternQualifier::Literal(Qualifier::Int(index)));
        self
    }

    /// Require a literal key qualifier next.
    pub fn key(mut self, key: MapKey) -> Self {
        self.path
            .push(PatternQualifier::Literal(Qualifier::from_key(&key)));
        self
    }

    /// Accept any single qualifier next.
    pub fn wildcard(mut self) -> Self {
        self.path.push(PatternQualifier::Wildcard);
        self
    }

    pub fn root_name(&self) -> &str {
        &self.root
    }

    /// Whether this pattern covers the given trail.
    pub fn matches(&self, trail: &AttributeTrail) -> bool {
        let Some(root) = trail.root_name() else {
            return false;
        };
        if root != self.root.as_ref() {
            return false;
        }
        let path = trail.path();
        if self.path.len() > path.len() {
            return false;
        }
        self.path
            .iter()
            .zip(path.iter())
            .all(|(pattern, qualifier)| pattern.matches(qualifier))
    }
}

impl fmt::Display for AttributePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.root)?;
        for q in &self.path {
            match q {
                PatternQualifier::Literal(lit) => write!(f, "{}", lit)?,
                PatternQualifier::Wildcard => write!(f, ".*")?,
            }
        }
        Ok(())
    }
}

/// The set of attributes a value is unknown because of.
///
/// Unknown sets union as they meet; the union is deduplicated and keeps
/// first-encountered order for stable messages and traces.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UnknownSet {
    attributes: Vec<AttributeTrail>,
}

impl UnknownSet {
    /// The unknown set for a single attribute.
    pub fn of(trail: AttributeTrail) -> Self {
        Self {
            attributes: vec![trail],
        }
    }

    pub fn attributes(&self) -> &[AttributeTrail] {
        &self.attributes
    }

    pub fn contains(&self, trail: &AttributeTrail) -> bool {
        self.attributes.contains(trail)
    }

    /// The union of two sets.
    pub fn union(&self, other: &UnknownSet) -> UnknownSet {
        let mut attributes = self.attributes.clone();
        for trail in &other.attributes {
            if !attributes.contains(trail) {
                attributes.push(trail.clone());
            }
        }
        UnknownSet { attributes }
    }
}

impl fmt::Display for UnknownSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown{{")?;
        for (i, trail) in self.attributes.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", trail)?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trail_extension() {
        let trail = AttributeTrail::root("request")
            .step(Qualifier::Field(Arc::from("auth")))
            .step(Qualifier::Int(3));
        assert_eq!(trail.root_name(), Some("request"));
        assert_eq!(trail.path().len(), 2);
        assert_eq!(trail.to_string(), "request.auth[3]");

        // Extending the empty trail stays empty.
        let anon = AttributeTrail::empty().step(Qualifier::Int(0));
        assert!(anon.is_empty());
    }

    #[test]
    fn pattern_prefix_matching() {
        let trail = AttributeTrail::root("request")
            .step(Qualifier::Field(Arc::from("auth")))
            .step(Qualifier::Field(Arc::from("claims")));

        assert!(AttributePattern::new("request").matches(&trail));
        assert!(AttributePattern::new("request").field("auth").matches(&trail));
        assert!(AttributePattern::new("request")
            .field("auth")
            .field("claims")
            .matches(&trail));
        assert!(!AttributePattern::new("request")
            .field("auth")
            .field("claims")
            .field("sub")
            .matches(&trail));
        assert!(!AttributePattern::new("request").field("path").matches(&trail));
        assert!(!AttributePattern::new("other").matches(&trail));
    }

    #[test]
    fn pattern_wildcards() {
        let pattern = AttributePattern::new("ctx").wildcard().field("secret");
        let hit = AttributeTrail::root("ctx")
            .step(Qualifier::Field(Arc::from("a")))
            .step(Qualifier::Field(Arc::from("secret")));
        let miss = AttributeTrail::root("ctx")
            .step(Qualifier::Field(Arc::from("a")))
            .step(Qualifier::Field(Arc::from("public")));
        assert!(pattern.matches(&hit));
        assert!(!pattern.matches(&miss));

        let keyed = AttributePattern::new("m").key(MapKey::Int(4));
        assert!(keyed.matches(&AttributeTrail::root("m").step(Qualifier::Int(4))));
        assert!(!keyed.matches(&AttributeTrail::root("m").step(Qualifier::Int(5))));
    }

    #[test]
    fn empty_trail_never_matches() {
        assert!(!AttributePattern::new("x").matches(&AttributeTrail::empty()));
    }

    #[test]
    fn unknown_union_dedups() {
        let a = UnknownSet::of(AttributeTrail::root("a"));
        let b = UnknownSet::of(AttributeTrail::root("b"));
        let ab = a.union(&b);
        assert_eq!(ab.attributes().len(), 2);
        // Union with overlap keeps one copy, first-seen order.
        let aab = ab.union(&a);
        assert_eq!(aab.attributes().len(), 2);
        assert_eq!(aab.attributes()[0].root_name(), Some("a"));
    }
}
