//! Runtime values.
//!
//! [`Value`] is the tagged universe every expression evaluates over:
//! primitives, temporal values, strings and bytes, lists, maps, structured
//! records, reified types, optionals, and the two propagating categories
//! (errors and unknowns).
//!
//! # Creating values
//!
//! ```rust
//! use cel_runtime::Value;
//!
//! let v: Value = 42i64.into();
//! let v: Value = true.into();
//! let v: Value = "hello".into();
//! let list = Value::list([1i64, 2, 3]);
//! let map = Value::map([("port", 8080i64)]);
//! ```
//!
//! # Extracting values
//!
//! ```rust
//! use cel_runtime::Value;
//!
//! let v = Value::Int(42);
//! let i = i64::try_from(&v).unwrap();
//! assert_eq!(i, 42);
//! ```

mod buffer;
mod json;
mod map;

pub use buffer::{BytesBuffer, StrBuffer};
pub use map::{MapKey, ValueMap};

use std::cmp::Ordering;
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use cel_runtime_common::{CelType, Kind};

use crate::attribute::UnknownSet;
use crate::error::EvalError;
use crate::record::RecordValue;

/// Error returned when converting a value to a specific native type fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueError {
    pub expected: &'static str,
    pub found: String,
}

impl fmt::Display for ValueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "expected {}, found {}", self.expected, self.found)
    }
}

impl std::error::Error for ValueError {}

/// A CEL runtime value.
#[derive(Debug, Clone)]
pub enum Value {
    /// Null value.
    Null,
    /// Boolean.
    Bool(bool),
    /// Signed 64-bit integer.
    Int(i64),
    /// Unsigned 64-bit integer.
    UInt(u64),
    /// 64-bit floating point.
    Double(f64),
    /// Unicode string, contiguous or chunked.
    String(StrBuffer),
    /// Byte sequence, contiguous or chunked.
    Bytes(BytesBuffer),
    /// Homogeneous list with a cached element type.
    List(Arc<ListValue>),
    /// Key-value map with insertion-order iteration.
    Map(Arc<ValueMap>),
    /// Signed nanosecond duration.
    Duration(Duration),
    /// Nanoseconds from the Unix epoch.
    Timestamp(Timestamp),
    /// Structured record behind a provider handle.
    Record(RecordValue),
    /// Reified type.
    Type(TypeValue),
    /// Optional value (present or absent).
    Optional(OptionalValue),
    /// Evaluation error; propagates through operators.
    Error(Arc<EvalError>),
    /// Set of attributes whose values were withheld from this evaluation.
    Unknown(Arc<UnknownSet>),
}

/// An ordered list with its element type computed at construction.
#[derive(Debug, Clone)]
pub struct ListValue {
    elements: Vec<Value>,
    elem_type: CelType,
}

impl ListValue {
    pub fn from_values(elements: Vec<Value>) -> Self {
        let elem_type = unified_elem_type(&elements);
        Self {
            elements,
            elem_type,
        }
    }

    /// The cached element type: the common type of all elements, `dyn` for
    /// mixed or empty lists.
    pub fn elem_type(&self) -> &CelType {
        &self.elem_type
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.elements.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Value> {
        self.elements.iter()
    }

    pub fn as_slice(&self) -> &[Value] {
        &self.elements
    }
}

fn unified_elem_type(elements: &[Value]) -> CelType {
    let mut iter = elements.iter();
    let first = match iter.next() {
        Some(v) => v.cel_type(),
        None => return CelType::Dyn,
    };
    for v in iter {
        if v.cel_type() != first {
            return CelType::Dyn;
        }
    }
    first
}

/// A CEL timestamp: seconds and nanos from the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestamp {
    pub seconds: i64,
    /// Always in `0..1_000_000_000`.
    pub nanos: i32,
}

impl Timestamp {
    /// 0001-01-01T00:00:00Z.
    pub const MIN_SECONDS: i64 = -62_135_596_800;
    /// 9999-12-31T23:59:59Z.
    pub const MAX_SECONDS: i64 = 253_402_300_799;

    pub fn new(seconds: i64, nanos: i32) -> Self {
        Self { seconds, nanos }
    }

    pub fn from_seconds(seconds: i64) -> Self {
        Self { seconds, nanos: 0 }
    }

    pub fn is_valid(&self) -> bool {
        self.seconds >= Self::MIN_SECONDS && self.seconds <= Self::MAX_SECONDS
    }

    pub fn to_datetime_utc(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        chrono::DateTime::from_timestamp(self.seconds, self.nanos as u32)
    }

    pub fn from_datetime<Tz: chrono::TimeZone>(dt: &chrono::DateTime<Tz>) -> Self {
        Self {
            seconds: dt.timestamp(),
            nanos: dt.timestamp_subsec_nanos() as i32,
        }
    }

    /// Shift by a duration, overflowing to an error outside the valid range.
    pub fn checked_add(&self, d: &Duration) -> Result<Timestamp, EvalError> {
        let (extra, nanos) = normalize_nanos(self.nanos as i64 + d.nanos as i64);
        let seconds = self
            .seconds
            .checked_add(d.seconds)
            .and_then(|s| s.checked_add(extra))
            .ok_or_else(|| EvalError::overflow("timestamp arithmetic overflow"))?;
        let ts = Timestamp::new(seconds, nanos);
        if ts.is_valid() {
            Ok(ts)
        } else {
            Err(EvalError::overflow(
                "timestamp out of range: must be between year 0001 and 9999",
            ))
        }
    }

    pub fn checked_sub(&self, d: &Duration) -> Result<Timestamp, EvalError> {
        self.checked_add(&Duration::new(
            d.seconds.checked_neg().ok_or_else(|| {
                EvalError::overflow("timestamp arithmetic overflow")
            })?,
            -d.nanos,
        ))
    }

    /// The duration between two timestamps.
    pub fn since(&self, other: &Timestamp) -> Result<Duration, EvalError> {
        let total = (self.seconds as i128 - other.seconds as i128) * 1_000_000_000
            + (self.nanos as i128 - other.nanos as i128);
        Duration::from_nanos(total)
    }
}

/// A CEL duration: signed seconds and nanos, same sign.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Duration {
    pub seconds: i64,
    /// `0..1_000_000_000` for positive, `-999_999_999..=0` for negative.
    pub nanos: i32,
}

impl Duration {
    /// One less than the full span of the timestamp range, so subtracting
    /// the extreme timestamps from each other overflows.
    pub const MAX_SECONDS: i64 = 315_537_897_598;
    pub const MIN_SECONDS: i64 = -315_537_897_598;

    pub fn new(seconds: i64, nanos: i32) -> Self {
        Self { seconds, nanos }
    }

    pub fn from_seconds(seconds: i64) -> Self {
        Self { seconds, nanos: 0 }
    }

    pub fn from_nanos(total: i128) -> Result<Self, EvalError> {
        let seconds = total / 1_000_000_000;
        let nanos = (total % 1_000_000_000) as i32;
        if seconds < Self::MIN_SECONDS as i128 || seconds > Self::MAX_SECONDS as i128 {
            return Err(EvalError::overflow(
                "duration out of range: must be within approximately 10000 years",
            ));
        }
        Ok(Self::new(seconds as i64, nanos))
    }

    pub fn to_nanos(&self) -> i128 {
        self.seconds as i128 * 1_000_000_000 + self.nanos as i128
    }

    pub fn is_negative(&self) -> bool {
        self.seconds < 0 || (self.seconds == 0 && self.nanos < 0)
    }

    pub fn is_valid(&self) -> bool {
        self.seconds >= Self::MIN_SECONDS && self.seconds <= Self::MAX_SECONDS
    }

    pub fn checked_add(&self, other: &Duration) -> Result<Duration, EvalError> {
        Duration::from_nanos(self.to_nanos() + other.to_nanos())
    }

    pub fn checked_sub(&self, other: &Duration) -> Result<Duration, EvalError> {
        Duration::from_nanos(self.to_nanos() - other.to_nanos())
    }

    pub fn checked_neg(&self) -> Result<Duration, EvalError> {
        Duration::from_nanos(-self.to_nanos())
    }

    /// Whole hours, truncated toward zero.
    pub fn hours(&self) -> i64 {
        self.seconds / 3600
    }

    /// Whole minutes, truncated toward zero.
    pub fn minutes(&self) -> i64 {
        self.seconds / 60
    }

    pub fn total_seconds(&self) -> i64 {
        self.seconds
    }

    /// Millisecond component, signed like the duration.
    pub fn milliseconds(&self) -> i64 {
        (self.nanos / 1_000_000) as i64
    }
}

/// Normalize nanos into `0..1_000_000_000`, borrowing from seconds.
pub(crate) fn normalize_nanos(nanos: i64) -> (i64, i32) {
    (
        nanos.div_euclid(1_000_000_000),
        nanos.rem_euclid(1_000_000_000) as i32,
    )
}

/// A reified type value, as produced by `type(x)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeValue {
    ty: CelType,
}

impl TypeValue {
    pub fn new(ty: CelType) -> Self {
        Self { ty }
    }

    /// The underlying type.
    pub fn ty(&self) -> &CelType {
        &self.ty
    }

    /// The type's display name (`"int"`, `"list<int>"`, …).
    pub fn name(&self) -> String {
        self.ty.display_name()
    }
}

/// A CEL optional value.
#[derive(Debug, Clone)]
pub enum OptionalValue {
    /// Absent.
    None,
    /// Present, carrying the inner value.
    Some(Box<Value>),
}

impl OptionalValue {
    pub fn none() -> Self {
        OptionalValue::None
    }

    pub fn some(value: Value) -> Self {
        OptionalValue::Some(Box::new(value))
    }

    pub fn is_present(&self) -> bool {
        matches!(self, OptionalValue::Some(_))
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            OptionalValue::None => None,
            OptionalValue::Some(v) => Some(v),
        }
    }

    pub fn unwrap_or(self, default: Value) -> Value {
        match self {
            OptionalValue::None => default,
            OptionalValue::Some(v) => *v,
        }
    }
}

// ==================== Constructors ====================

impl Value {
    /// Create a list from items convertible to values.
    pub fn list<T: Into<Value>>(items: impl IntoIterator<Item = T>) -> Self {
        Value::List(Arc::new(ListValue::from_values(
            items.into_iter().map(Into::into).collect(),
        )))
    }

    /// Create a map from key/value pairs.
    pub fn map<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<MapKey>,
        V: Into<Value>,
    {
        Value::Map(Arc::new(ValueMap::from_entries(
            entries.into_iter().map(|(k, v)| (k.into(), v.into())),
        )))
    }

    pub fn timestamp(seconds: i64, nanos: i32) -> Self {
        Value::Timestamp(Timestamp::new(seconds, nanos))
    }

    pub fn duration(seconds: i64, nanos: i32) -> Self {
        Value::Duration(Duration::new(seconds, nanos))
    }

    /// Create a type value for the given type.
    pub fn type_of(ty: CelType) -> Self {
        Value::Type(TypeValue::new(ty))
    }

    pub fn optional_none() -> Self {
        Value::Optional(OptionalValue::None)
    }

    pub fn optional_some(value: Value) -> Self {
        Value::Optional(OptionalValue::some(value))
    }

    /// Create an error value.
    pub fn error(err: impl Into<EvalError>) -> Self {
        Value::Error(Arc::new(err.into()))
    }

    /// Create an unknown value carrying one attribute.
    pub fn unknown(set: UnknownSet) -> Self {
        Value::Unknown(Arc::new(set))
    }
}

// ==================== Kind & type information ====================

impl Value {
    /// The kind of this value; O(1), never allocates.
    pub fn kind(&self) -> Kind {
        match self {
            Value::Null => Kind::Null,
            Value::Bool(_) => Kind::Bool,
            Value::Int(_) => Kind::Int,
            Value::UInt(_) => Kind::Uint,
            Value::Double(_) => Kind::Double,
            Value::String(_) => Kind::String,
            Value::Bytes(_) => Kind::Bytes,
            Value::List(_) => Kind::List,
            Value::Map(_) => Kind::Map,
            Value::Duration(_) => Kind::Duration,
            Value::Timestamp(_) => Kind::Timestamp,
            Value::Record(_) => Kind::Record,
            Value::Type(_) => Kind::Type,
            Value::Optional(_) => Kind::Opt,
            Value::Error(_) => Kind::Error,
            Value::Unknown(_) => Kind::Unknown,
        }
    }

    /// The runtime CEL type of this value.
    pub fn cel_type(&self) -> CelType {
        match self {
            Value::Null => CelType::Null,
            Value::Bool(_) => CelType::Bool,
            Value::Int(_) => CelType::Int,
            Value::UInt(_) => CelType::Uint,
            Value::Double(_) => CelType::Double,
            Value::String(_) => CelType::String,
            Value::Bytes(_) => CelType::Bytes,
            Value::List(l) => CelType::List(Arc::new(l.elem_type().clone())),
            Value::Map(_) => CelType::map(CelType::Dyn, CelType::Dyn),
            Value::Duration(_) => CelType::Duration,
            Value::Timestamp(_) => CelType::Timestamp,
            Value::Record(r) => CelType::record(r.type_name()),
            Value::Type(t) => CelType::type_of(t.ty().clone()),
            Value::Optional(opt) => match opt {
                OptionalValue::None => CelType::optional(CelType::Dyn),
                OptionalValue::Some(v) => CelType::optional(v.cel_type()),
            },
            Value::Error(_) => CelType::Error,
            Value::Unknown(_) => CelType::Unknown,
        }
    }

    /// The type value `type(self)` evaluates to.
    pub fn type_value(&self) -> TypeValue {
        TypeValue::new(match self {
            Value::Type(_) => CelType::type_of(CelType::Dyn),
            other => other.cel_type(),
        })
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Value::Error(_))
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Value::Unknown(_))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

// ==================== From implementations ====================

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i as i64)
    }
}

impl From<u64> for Value {
    fn from(u: u64) -> Self {
        Value::UInt(u)
    }
}

impl From<u32> for Value {
    fn from(u: u32) -> Self {
        Value::UInt(u as u64)
    }
}

impl From<f64> for Value {
    fn from(d: f64) -> Self {
        Value::Double(d)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(StrBuffer::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(StrBuffer::from(s))
    }
}

impl From<Arc<str>> for Value {
    fn from(s: Arc<str>) -> Self {
        Value::String(StrBuffer::from(s))
    }
}

impl From<StrBuffer> for Value {
    fn from(s: StrBuffer) -> Self {
        Value::String(s)
    }
}

impl From<&[u8]> for Value {
    fn from(b: &[u8]) -> Self {
        Value::Bytes(BytesBuffer::from(b))
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(BytesBuffer::from(b))
    }
}

impl From<BytesBuffer> for Value {
    fn from(b: BytesBuffer) -> Self {
        Value::Bytes(b)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::List(Arc::new(ListValue::from_values(v)))
    }
}

impl From<ValueMap> for Value {
    fn from(m: ValueMap) -> Self {
        Value::Map(Arc::new(m))
    }
}

impl From<Timestamp> for Value {
    fn from(t: Timestamp) -> Self {
        Value::Timestamp(t)
    }
}

impl From<Duration> for Value {
    fn from(d: Duration) -> Self {
        Value::Duration(d)
    }
}

impl From<EvalError> for Value {
    fn from(e: EvalError) -> Self {
        Value::Error(Arc::new(e))
    }
}

// ==================== TryFrom implementations ====================

macro_rules! try_from_value {
    ($native:ty, $variant:ident, $expected:expr) => {
        impl TryFrom<&Value> for $native {
            type Error = ValueError;
            fn try_from(v: &Value) -> Result<Self, ValueError> {
                match v {
                    Value::$variant(x) => Ok(*x),
                    other => Err(ValueError {
                        expected: $expected,
                        found: other.kind().as_str().to_string(),
                    }),
                }
            }
        }

        impl TryFrom<Value> for $native {
            type Error = ValueError;
            fn try_from(v: Value) -> Result<Self, ValueError> {
                <$native>::try_from(&v)
            }
        }
    };
}

try_from_value!(bool, Bool, "bool");
try_from_value!(i64, Int, "int");
try_from_value!(u64, UInt, "uint");
try_from_value!(f64, Double, "double");
try_from_value!(Timestamp, Timestamp, "timestamp");
try_from_value!(Duration, Duration, "duration");

impl TryFrom<Value> for String {
    type Error = ValueError;
    fn try_from(v: Value) -> Result<Self, ValueError> {
        match v {
            Value::String(s) => Ok(s.as_cow().into_owned()),
            other => Err(ValueError {
                expected: "string",
                found: other.kind().as_str().to_string(),
            }),
        }
    }
}

impl<'a> TryFrom<&'a Value> for &'a StrBuffer {
    type Error = ValueError;
    fn try_from(v: &'a Value) -> Result<Self, ValueError> {
        match v {
            Value::String(s) => Ok(s),
            other => Err(ValueError {
                expected: "string",
                found: other.kind().as_str().to_string(),
            }),
        }
    }
}

impl<'a> TryFrom<&'a Value> for &'a BytesBuffer {
    type Error = ValueError;
    fn try_from(v: &'a Value) -> Result<Self, ValueError> {
        match v {
            Value::Bytes(b) => Ok(b),
            other => Err(ValueError {
                expected: "bytes",
                found: other.kind().as_str().to_string(),
            }),
        }
    }
}

impl<'a> TryFrom<&'a Value> for &'a ListValue {
    type Error = ValueError;
    fn try_from(v: &'a Value) -> Result<Self, ValueError> {
        match v {
            Value::List(l) => Ok(l),
            other => Err(ValueError {
                expected: "list",
                found: other.kind().as_str().to_string(),
            }),
        }
    }
}

impl<'a> TryFrom<&'a Value> for &'a ValueMap {
    type Error = ValueError;
    fn try_from(v: &'a Value) -> Result<Self, ValueError> {
        match v {
            Value::Map(m) => Ok(m),
            other => Err(ValueError {
                expected: "map",
                found: other.kind().as_str().to_string(),
            }),
        }
    }
}

impl<'a> TryFrom<&'a Value> for &'a OptionalValue {
    type Error = ValueError;
    fn try_from(v: &'a Value) -> Result<Self, ValueError> {
        match v {
            Value::Optional(o) => Ok(o),
            other => Err(ValueError {
                expected: "optional",
                found: other.kind().as_str().to_string(),
            }),
        }
    }
}

impl<'a> TryFrom<&'a Value> for &'a EvalError {
    type Error = ValueError;
    fn try_from(v: &'a Value) -> Result<Self, ValueError> {
        match v {
            Value::Error(e) => Ok(e),
            other => Err(ValueError {
                expected: "error",
                found: other.kind().as_str().to_string(),
            }),
        }
    }
}

// ==================== Equality ====================

impl Value {
    /// Structural equality with explicit numeric semantics.
    ///
    /// With `heterogeneous` set, int, uint, and double compare equal when
    /// they denote the same mathematical value; otherwise cross-numeric
    /// comparisons are false. NaN never equals anything, per IEEE 754.
    pub fn equals_with(&self, other: &Value, heterogeneous: bool) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::UInt(a), Value::UInt(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::List(a), Value::List(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .zip(b.iter())
                        .all(|(x, y)| x.equals_with(y, heterogeneous))
            }
            (Value::Map(a), Value::Map(b)) => {
                if a.len() != b.len() {
                    return false;
                }
                a.iter().all(|(key, va)| {
                    b.get_coerced(key, heterogeneous)
                        .is_some_and(|vb| va.equals_with(vb, heterogeneous))
                })
            }
            (Value::Duration(a), Value::Duration(b)) => a == b,
            (Value::Timestamp(a), Value::Timestamp(b)) => a == b,
            (Value::Record(a), Value::Record(b)) => a.record_eq(b),
            (Value::Type(a), Value::Type(b)) => a == b,
            (Value::Optional(a), Value::Optional(b)) => match (a, b) {
                (OptionalValue::None, OptionalValue::None) => true,
                (OptionalValue::Some(x), OptionalValue::Some(y)) => {
                    x.equals_with(y, heterogeneous)
                }
                _ => false,
            },
            // Cross-numeric arms, gated on the heterogeneous option.
            (Value::Int(a), Value::UInt(b)) if heterogeneous => {
                *a >= 0 && *a as u64 == *b
            }
            (Value::UInt(a), Value::Int(b)) if heterogeneous => {
                *b >= 0 && *a == *b as u64
            }
            (Value::Int(a), Value::Double(b)) if heterogeneous => int_eq_double(*a, *b),
            (Value::Double(a), Value::Int(b)) if heterogeneous => int_eq_double(*b, *a),
            (Value::UInt(a), Value::Double(b)) if heterogeneous => uint_eq_double(*a, *b),
            (Value::Double(a), Value::UInt(b)) if heterogeneous => uint_eq_double(*b, *a),
            _ => false,
        }
    }

    /// Three-way comparison where CEL defines an ordering.
    ///
    /// Same-kind comparisons work for bool, the numerics, string, bytes,
    /// timestamp, and duration; cross-numeric comparisons require the
    /// heterogeneous option.
    pub fn compare_with(&self, other: &Value, heterogeneous: bool) -> Option<Ordering> {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::UInt(a), Value::UInt(b)) => Some(a.cmp(b)),
            (Value::Double(a), Value::Double(b)) => a.partial_cmp(b),
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::Bytes(a), Value::Bytes(b)) => Some(a.cmp(b)),
            (Value::Timestamp(a), Value::Timestamp(b)) => {
                Some((a.seconds, a.nanos).cmp(&(b.seconds, b.nanos)))
            }
            (Value::Duration(a), Value::Duration(b)) => Some(a.to_nanos().cmp(&b.to_nanos())),
            (Value::Int(a), Value::UInt(b)) if heterogeneous => {
                if *a < 0 {
                    Some(Ordering::Less)
                } else {
                    (*a as u64).partial_cmp(b)
                }
            }
            (Value::UInt(a), Value::Int(b)) if heterogeneous => {
                if *b < 0 {
                    Some(Ordering::Greater)
                } else {
                    a.partial_cmp(&(*b as u64))
                }
            }
            (Value::Int(a), Value::Double(b)) if heterogeneous => (*a as f64).partial_cmp(b),
            (Value::Double(a), Value::Int(b)) if heterogeneous => a.partial_cmp(&(*b as f64)),
            (Value::UInt(a), Value::Double(b)) if heterogeneous => (*a as f64).partial_cmp(b),
            (Value::Double(a), Value::UInt(b)) if heterogeneous => a.partial_cmp(&(*b as f64)),
            _ => None,
        }
    }

    /// A hash that is stable within one process and agrees with
    /// heterogeneous equality: numerics denoting the same mathematical
    /// value hash identically.
    pub fn hash64(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.hash_into(&mut hasher);
        hasher.finish()
    }

    fn hash_into(&self, state: &mut DefaultHasher) {
        match self {
            Value::Null => state.write_u8(0),
            Value::Bool(b) => {
                state.write_u8(1);
                b.hash(state);
            }
            Value::Int(i) => hash_numeric_i64(*i, state),
            Value::UInt(u) => {
                if *u <= i64::MAX as u64 {
                    hash_numeric_i64(*u as i64, state);
                } else {
                    state.write_u8(3);
                    state.write_u64(*u);
                }
            }
            Value::Double(d) => {
                if d.fract() == 0.0 && *d >= i64::MIN as f64 && *d <= i64::MAX as f64 {
                    hash_numeric_i64(*d as i64, state);
                } else if d.fract() == 0.0 && *d >= 0.0 && *d <= u64::MAX as f64 {
                    state.write_u8(3);
                    state.write_u64(*d as u64);
                } else {
                    state.write_u8(4);
                    state.write_u64(d.to_bits());
                }
            }
            Value::String(s) => {
                state.write_u8(5);
                s.hash(state);
            }
            Value::Bytes(b) => {
                state.write_u8(6);
                b.hash(state);
            }
            Value::List(l) => {
                state.write_u8(7);
                state.write_usize(l.len());
                for v in l.iter() {
                    state.write_u64(v.hash64());
                }
            }
            Value::Map(m) => {
                state.write_u8(8);
                state.write_usize(m.len());
                // Order-insensitive: maps are equal regardless of insertion
                // order, so fold entry hashes commutatively.
                let mut acc = 0u64;
                for (k, v) in m.iter() {
                    acc = acc.wrapping_add(k.to_value().hash64() ^ v.hash64());
                }
                state.write_u64(acc);
            }
            Value::Duration(d) => {
                state.write_u8(9);
                state.write_i128(d.to_nanos());
            }
            Value::Timestamp(t) => {
                state.write_u8(10);
                state.write_i64(t.seconds);
                state.write_i32(t.nanos);
            }
            Value::Record(r) => {
                state.write_u8(11);
                r.type_name().hash(state);
            }
            Value::Type(t) => {
                state.write_u8(12);
                t.name().hash(state);
            }
            Value::Optional(o) => {
                state.write_u8(13);
                match o {
                    OptionalValue::None => state.write_u8(0),
                    OptionalValue::Some(v) => state.write_u64(v.hash64()),
                }
            }
            Value::Error(e) => {
                state.write_u8(14);
                e.message.hash(state);
            }
            Value::Unknown(u) => {
                state.write_u8(15);
                state.write_usize(u.attributes().len());
            }
        }
    }
}

fn hash_numeric_i64(value: i64, state: &mut DefaultHasher) {
    state.write_u8(2);
    state.write_i64(value);
}

fn int_eq_double(i: i64, d: f64) -> bool {
    if d.is_nan() {
        return false;
    }
    let as_double = i as f64;
    as_double == d && as_double as i64 == i
}

fn uint_eq_double(u: u64, d: f64) -> bool {
    if d.is_nan() {
        return false;
    }
    let as_double = u as f64;
    as_double == d && as_double as u64 == u
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.equals_with(other, true)
    }
}

// ==================== Display ====================

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(v) => write!(f, "{}", v),
            Value::Int(v) => write!(f, "{}", v),
            Value::UInt(v) => write!(f, "{}u", v),
            Value::Double(v) => write!(f, "{}", format_double(*v)),
            Value::String(v) => write!(f, "{:?}", v.as_cow()),
            Value::Bytes(v) => write!(f, "{:?}", v),
            Value::List(v) => {
                write!(f, "[")?;
                for (i, elem) in v.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", elem)?;
                }
                write!(f, "]")
            }
            Value::Map(m) => {
                write!(f, "{{")?;
                for (i, (key, value)) in m.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", key.to_value(), value)?;
                }
                write!(f, "}}")
            }
            Value::Duration(d) => {
                write!(f, "duration(\"{}\")", crate::time::format_duration(d))
            }
            Value::Timestamp(t) => {
                write!(f, "timestamp(\"{}\")", crate::time::format_timestamp(t))
            }
            Value::Record(r) => write!(f, "{}{{...}}", r.type_name()),
            Value::Type(t) => write!(f, "{}", t.name()),
            Value::Optional(o) => match o {
                OptionalValue::None => write!(f, "optional.none()"),
                OptionalValue::Some(v) => write!(f, "optional.of({})", v),
            },
            Value::Error(e) => write!(f, "error({})", e),
            Value::Unknown(u) => write!(f, "{}", u),
        }
    }
}

/// CEL text form of a double: integral values keep a trailing `.0`.
pub(crate) fn format_double(d: f64) -> String {
    if d.is_nan() {
        "NaN".to_string()
    } else if d.is_infinite() {
        if d.is_sign_positive() {
            "+infinity".to_string()
        } else {
            "-infinity".to_string()
        }
    } else if d.fract() == 0.0 && d.abs() < 1e15 {
        format!("{:.1}", d)
    } else {
        d.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heterogeneous_equality() {
        assert_eq!(Value::Int(42), Value::UInt(42));
        assert_eq!(Value::Int(42), Value::Double(42.0));
        assert_eq!(Value::UInt(42), Value::Double(42.0));
        assert_ne!(Value::Int(-1), Value::UInt(1));
        assert_ne!(Value::Int(1), Value::Double(1.5));
        assert_ne!(Value::Double(f64::NAN), Value::Double(f64::NAN));
    }

    #[test]
    fn homogeneous_equality() {
        assert!(!Value::Int(42).equals_with(&Value::UInt(42), false));
        assert!(!Value::Int(42).equals_with(&Value::Double(42.0), false));
        assert!(Value::Int(42).equals_with(&Value::Int(42), false));
    }

    #[test]
    fn list_and_map_equality() {
        let a = Value::list([1i64, 2, 3]);
        let b = Value::map([(1i64, Value::Int(1)), (2i64, Value::Int(2))]);
        assert_eq!(a, Value::list([1i64, 2, 3]));
        assert_ne!(a, Value::list([1i64, 2]));
        // {1: 1} == {1u: 1} under heterogeneous key coercion.
        let c = Value::map([(1u64, Value::Int(1)), (2u64, Value::Int(2))]);
        assert_eq!(b, c);
        assert!(!b.equals_with(&c, false));
    }

    #[test]
    fn cross_numeric_ordering() {
        assert_eq!(
            Value::Int(-1).compare_with(&Value::UInt(1), true),
            Some(Ordering::Less)
        );
        assert_eq!(
            Value::UInt(2).compare_with(&Value::Int(1), true),
            Some(Ordering::Greater)
        );
        assert_eq!(
            Value::Int(1).compare_with(&Value::Double(1.5), true),
            Some(Ordering::Less)
        );
        assert_eq!(Value::Int(1).compare_with(&Value::UInt(1), false), None);
        assert_eq!(Value::from("a").compare_with(&Value::Int(1), true), None);
    }

    #[test]
    fn numeric_hashes_agree() {
        for v in [0i64, 1, 42, 1 << 40, -7] {
            let int = Value::Int(v);
            let double = Value::Double(v as f64);
            assert_eq!(int.hash64(), double.hash64(), "int/double {}", v);
            if v >= 0 {
                let uint = Value::UInt(v as u64);
                assert_eq!(int.hash64(), uint.hash64(), "int/uint {}", v);
            }
        }
        assert_ne!(Value::Int(1).hash64(), Value::Int(2).hash64());
    }

    #[test]
    fn map_hash_is_order_insensitive() {
        let a = Value::map([("x", 1i64), ("y", 2i64)]);
        let b = Value::map([("y", 2i64), ("x", 1i64)]);
        assert_eq!(a.hash64(), b.hash64());
    }

    #[test]
    fn list_elem_type_is_cached() {
        let ints = ListValue::from_values(vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(*ints.elem_type(), CelType::Int);
        let mixed = ListValue::from_values(vec![Value::Int(1), Value::from("x")]);
        assert_eq!(*mixed.elem_type(), CelType::Dyn);
        let empty = ListValue::from_values(vec![]);
        assert_eq!(*empty.elem_type(), CelType::Dyn);
    }

    #[test]
    fn timestamp_arithmetic() {
        let ts = Timestamp::new(100, 500_000_000);
        let shifted = ts.checked_add(&Duration::new(2, 600_000_000)).unwrap();
        assert_eq!(shifted.seconds, 103);
        assert_eq!(shifted.nanos, 100_000_000);

        let back = shifted.checked_sub(&Duration::new(2, 600_000_000)).unwrap();
        assert_eq!(back, ts);

        let max = Timestamp::new(Timestamp::MAX_SECONDS, 0);
        assert!(max.checked_add(&Duration::from_seconds(1)).is_err());
    }

    #[test]
    fn timestamp_difference() {
        let a = Timestamp::new(100, 0);
        let b = Timestamp::new(90, 500_000_000);
        let d = a.since(&b).unwrap();
        assert_eq!(d.seconds, 9);
        assert_eq!(d.nanos, 500_000_000);

        let min = Timestamp::new(Timestamp::MIN_SECONDS, 0);
        let max = Timestamp::new(Timestamp::MAX_SECONDS, 0);
        assert!(max.since(&min).is_err());
    }

    #[test]
    fn duration_arithmetic() {
        let d = Duration::new(1, 500_000_000);
        let sum = d.checked_add(&Duration::new(0, 700_000_000)).unwrap();
        assert_eq!(sum.seconds, 2);
        assert_eq!(sum.nanos, 200_000_000);

        let neg = d.checked_neg().unwrap();
        assert!(neg.is_negative());
        assert_eq!(neg.seconds, -1);
        assert_eq!(neg.nanos, -500_000_000);

        let max = Duration::from_seconds(Duration::MAX_SECONDS);
        assert!(max.checked_add(&Duration::from_seconds(1)).is_err());
    }

    #[test]
    fn type_values() {
        let tv = Value::Int(1).type_value();
        assert_eq!(tv.name(), "int");
        let tt = Value::Type(tv).type_value();
        assert_eq!(tt.name(), "type(dyn)");
    }

    #[test]
    fn display_scalars() {
        assert_eq!(Value::Null.to_string(), "null");
        assert_eq!(Value::Bool(true).to_string(), "true");
        assert_eq!(Value::Int(42).to_string(), "42");
        assert_eq!(Value::UInt(42).to_string(), "42u");
        assert_eq!(Value::Double(1.5).to_string(), "1.5");
        assert_eq!(Value::Double(2.0).to_string(), "2.0");
        assert_eq!(Value::from("hi").to_string(), "\"hi\"");
        assert_eq!(Value::from(vec![0x41u8, 0x00]).to_string(), "b\"A\\x00\"");
        assert_eq!(Value::list([1i64, 2]).to_string(), "[1, 2]");
        assert_eq!(
            Value::duration(90, 0).to_string(),
            "duration(\"90s\")"
        );
    }

    #[test]
    fn try_from_extraction() {
        let v = Value::Int(42);
        assert_eq!(i64::try_from(&v).unwrap(), 42);
        let err = u64::try_from(&v).unwrap_err();
        assert_eq!(err.expected, "uint");
        assert_eq!(err.found, "int");

        let v = Value::from("text");
        assert_eq!(String::try_from(v).unwrap(), "text");
    }

    #[test]
    fn normalize_nanos_borrows() {
        assert_eq!(normalize_nanos(1_500_000_000), (1, 500_000_000));
        assert_eq!(normalize_nanos(-1), (-1, 999_999_999));
        assert_eq!(normalize_nanos(999_999_999), (0, 999_999_999));
    }
}
