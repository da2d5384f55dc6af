//! CEL maps.
//!
//! Maps key on bool, int, uint, or string and preserve insertion order for
//! iteration. Lookup optionally coerces across the integer kinds so a map
//! built with `1` answers probes for `1u` and `1.0` when heterogeneous
//! equality is enabled.

use std::sync::Arc;

use indexmap::IndexMap;

use crate::error::EvalError;
use crate::value::Value;

/// A map key. CEL restricts keys to these four kinds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MapKey {
    Bool(bool),
    Int(i64),
    UInt(u64),
    String(Arc<str>),
}

impl MapKey {
    /// Build a key from a value of a valid key kind.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(MapKey::Bool(*b)),
            Value::Int(i) => Some(MapKey::Int(*i)),
            Value::UInt(u) => Some(MapKey::UInt(*u)),
            Value::String(s) => Some(MapKey::String(s.flatten())),
            _ => None,
        }
    }

    /// Build a lookup key from a value, coercing numeric representations of
    /// the same mathematical value when `heterogeneous` is set. A double
    /// with a fractional part cannot address any key and yields `None`.
    pub fn lookup_key(value: &Value, heterogeneous: bool) -> Option<Self> {
        match value {
            Value::Double(d) if heterogeneous => {
                if d.fract() != 0.0 || !d.is_finite() {
                    None
                } else if *d >= i64::MIN as f64 && *d <= i64::MAX as f64 {
                    Some(MapKey::Int(*d as i64))
                } else if *d >= 0.0 && *d <= u64::MAX as f64 {
                    Some(MapKey::UInt(*d as u64))
                } else {
                    None
                }
            }
            _ => Self::from_value(value),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            MapKey::Bool(b) => Value::Bool(*b),
            MapKey::Int(i) => Value::Int(*i),
            MapKey::UInt(u) => Value::UInt(*u),
            MapKey::String(s) => Value::String(s.clone().into()),
        }
    }
}

impl From<&str> for MapKey {
    fn from(s: &str) -> Self {
        MapKey::String(Arc::from(s))
    }
}

impl From<String> for MapKey {
    fn from(s: String) -> Self {
        MapKey::String(Arc::from(s))
    }
}

impl From<bool> for MapKey {
    fn from(b: bool) -> Self {
        MapKey::Bool(b)
    }
}

impl From<i64> for MapKey {
    fn from(i: i64) -> Self {
        MapKey::Int(i)
    }
}

impl From<u64> for MapKey {
    fn from(u: u64) -> Self {
        MapKey::UInt(u)
    }
}

/// A CEL map with insertion-order iteration.
#[derive(Debug, Clone, Default)]
pub struct ValueMap {
    entries: IndexMap<MapKey, Value>,
}

impl ValueMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: impl IntoIterator<Item = (MapKey, Value)>) -> Self {
        Self {
            entries: entries.into_iter().collect(),
        }
    }

    /// Insert an entry, returning the previous value for the key if any.
    pub fn insert(&mut self, key: MapKey, value: Value) -> Option<Value> {
        self.entries.insert(key, value)
    }

    pub fn get(&self, key: &MapKey) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Exact lookup, then integer coercion for in-range values.
    pub fn get_coerced(&self, key: &MapKey, heterogeneous: bool) -> Option<&Value> {
        if let Some(v) = self.entries.get(key) {
            return Some(v);
        }
        if !heterogeneous {
            return None;
        }
        match key {
            MapKey::Int(i) if *i >= 0 => self.entries.get(&MapKey::UInt(*i as u64)),
            MapKey::UInt(u) if *u <= i64::MAX as u64 => self.entries.get(&MapKey::Int(*u as i64)),
            _ => None,
        }
    }

    pub fn contains_key(&self, key: &MapKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn contains_key_coerced(&self, key: &MapKey, heterogeneous: bool) -> bool {
        self.get_coerced(key, heterogeneous).is_some()
    }

    /// Look a value-typed key up, enforcing the valid key kinds.
    ///
    /// Doubles are admitted only under heterogeneous equality, where an
    /// integral double may address an int or uint key; a fractional double
    /// then matches nothing rather than erroring.
    pub fn lookup(&self, key: &Value, heterogeneous: bool) -> Result<Option<&Value>, EvalError> {
        if matches!(key, Value::Double(_)) && heterogeneous {
            return Ok(MapKey::lookup_key(key, true).and_then(|k| self.get_coerced(&k, true)));
        }
        match MapKey::from_value(key) {
            Some(map_key) => Ok(self.get_coerced(&map_key, heterogeneous)),
            None => Err(EvalError::invalid_argument(format!(
                "invalid map key type: '{}'",
                key.kind()
            ))),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&MapKey, &Value)> {
        self.entries.iter()
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &MapKey> {
        self.entries.keys()
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.entries.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insertion_order_preserved() {
        let mut map = ValueMap::new();
        map.insert(MapKey::from("z"), Value::Int(1));
        map.insert(MapKey::from("a"), Value::Int(2));
        map.insert(MapKey::Int(5), Value::Int(3));

        let keys: Vec<_> = map.keys().cloned().collect();
        assert_eq!(
            keys,
            vec![MapKey::from("z"), MapKey::from("a"), MapKey::Int(5)]
        );
    }

    #[test]
    fn insert_reports_duplicates() {
        let mut map = ValueMap::new();
        assert!(map.insert(MapKey::Int(1), Value::Int(10)).is_none());
        assert_eq!(map.insert(MapKey::Int(1), Value::Int(20)), Some(Value::Int(10)));
    }

    #[test]
    fn numeric_key_coercion() {
        let mut map = ValueMap::new();
        map.insert(MapKey::Int(2), Value::from("two"));

        assert!(map.get_coerced(&MapKey::UInt(2), true).is_some());
        assert!(map.get_coerced(&MapKey::UInt(2), false).is_none());
        assert!(map
            .lookup(&Value::Double(2.0), true)
            .unwrap()
            .is_some());
        assert!(map.lookup(&Value::Double(2.5), true).unwrap().is_none());
        assert!(map.lookup(&Value::Double(2.0), false).is_err());
    }

    #[test]
    fn invalid_key_kinds_error() {
        let map = ValueMap::new();
        assert!(map.lookup(&Value::Null, true).is_err());
        assert!(map
            .lookup(&Value::List(Arc::new(crate::value::ListValue::from_values(vec![]))), true)
            .is_err());
    }
}
