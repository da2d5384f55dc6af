//! Structured records.
//!
//! The engine never sees concrete message classes; it goes through the
//! [`RecordProvider`] contract for field introspection and construction and
//! holds finished records behind [`RecordValue`] handles. Providers may own
//! records that outlive any single evaluation.
//!
//! [`DeclaredRecordProvider`] is the descriptor-free implementation backed
//! by registered schemas; the protobuf-descriptor implementation lives in
//! [`crate::proto`]. Both convert the well-known wrapper types to native
//! values on construction.

use std::collections::HashMap;
use std::sync::Arc;

use cel_runtime_common::CelType;
use indexmap::IndexMap;

use crate::error::EvalError;
use crate::value::{Duration, ListValue, Timestamp, Value, ValueMap};

/// One field of a record type: name, field number, type, and presence
/// discipline.
#[derive(Debug, Clone)]
pub struct FieldInfo {
    pub name: Arc<str>,
    pub number: i32,
    pub ty: CelType,
    /// Explicit presence (messages, wrappers, proto2-style optionals):
    /// `has()` reports whether the field was set. Without it, scalars
    /// follow default-is-unset.
    pub explicit_presence: bool,
}

impl FieldInfo {
    pub fn new(name: &str, number: i32, ty: CelType) -> Self {
        let explicit_presence = matches!(
            ty,
            CelType::Record(_) | CelType::Wrapper(_) | CelType::Duration | CelType::Timestamp
        );
        Self {
            name: Arc::from(name),
            number,
            ty,
            explicit_presence,
        }
    }

    /// Override the presence discipline.
    pub fn with_explicit_presence(mut self, explicit: bool) -> Self {
        self.explicit_presence = explicit;
        self
    }
}

/// A record instance held by a provider.
pub trait RecordRef: Send + Sync {
    /// Fully qualified type name.
    fn type_name(&self) -> &str;

    /// Field access by name, with zero-value defaults for unset fields.
    fn get_field(&self, name: &str) -> Result<Value, EvalError>;

    /// Field access by field number.
    fn get_field_by_number(&self, number: i32) -> Result<Value, EvalError>;

    /// Presence by name, per the field's presence discipline.
    fn has_field(&self, name: &str) -> Result<bool, EvalError>;

    /// Presence by field number.
    fn has_field_by_number(&self, number: i32) -> Result<bool, EvalError>;

    /// The set fields, for equality, JSON, and debug output.
    fn fields_snapshot(&self) -> Vec<(Arc<str>, Value)>;
}

/// A non-owning handle to a record.
#[derive(Clone)]
pub struct RecordValue {
    inner: Arc<dyn RecordRef>,
}

impl RecordValue {
    pub fn new(record: Arc<dyn RecordRef>) -> Self {
        Self { inner: record }
    }

    pub fn type_name(&self) -> &str {
        self.inner.type_name()
    }

    pub fn get_field(&self, name: &str) -> Result<Value, EvalError> {
        self.inner.get_field(name)
    }

    pub fn get_field_by_number(&self, number: i32) -> Result<Value, EvalError> {
        self.inner.get_field_by_number(number)
    }

    pub fn has_field(&self, name: &str) -> Result<bool, EvalError> {
        self.inner.has_field(name)
    }

    pub fn has_field_by_number(&self, number: i32) -> Result<bool, EvalError> {
        self.inner.has_field_by_number(number)
    }

    pub fn fields_snapshot(&self) -> Vec<(Arc<str>, Value)> {
        self.inner.fields_snapshot()
    }

    /// Structural equality: same type name, same set fields.
    pub fn record_eq(&self, other: &RecordValue) -> bool {
        if self.type_name() != other.type_name() {
            return false;
        }
        let mine = self.fields_snapshot();
        let theirs: HashMap<Arc<str>, Value> = other.fields_snapshot().into_iter().collect();
        mine.len() == theirs.len()
            && mine
                .iter()
                .all(|(name, value)| theirs.get(name).is_some_and(|v| v == value))
    }
}

impl std::fmt::Debug for RecordValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordValue")
            .field("type_name", &self.type_name())
            .finish()
    }
}

/// Incremental record construction.
pub trait RecordBuilder {
    /// Set a field by name. Unknown fields are `NoSuchField`; values of the
    /// wrong type are `InvalidArgument`.
    fn set_field(&mut self, name: &str, value: Value) -> Result<(), EvalError>;

    /// Finish. Well-known types build to their native value form.
    fn build(self: Box<Self>) -> Result<Value, EvalError>;
}

/// Field introspection and construction for named record types.
pub trait RecordProvider: Send + Sync {
    /// The fields of a record type, in declaration order, or `None` for an
    /// unknown type name.
    fn find_record(&self, type_name: &str) -> Option<Vec<FieldInfo>>;

    /// A builder for the type, or `None` for an unknown type name.
    fn new_builder(&self, type_name: &str) -> Option<Box<dyn RecordBuilder>>;
}

/// A provider that knows no types.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyRecordProvider;

impl RecordProvider for EmptyRecordProvider {
    fn find_record(&self, _type_name: &str) -> Option<Vec<FieldInfo>> {
        None
    }

    fn new_builder(&self, _type_name: &str) -> Option<Box<dyn RecordBuilder>> {
        None
    }
}

/// The zero value for a field type: primitives their zero, containers
/// empty, wrappers and messages null-ish per protobuf semantics.
pub fn zero_value(ty: &CelType) -> Value {
    match ty {
        CelType::Bool => Value::Bool(false),
        CelType::Int => Value::Int(0),
        CelType::Uint => Value::UInt(0),
        CelType::Double => Value::Double(0.0),
        CelType::String => Value::from(""),
        CelType::Bytes => Value::from(Vec::<u8>::new()),
        CelType::List(_) => Value::List(Arc::new(ListValue::from_values(Vec::new()))),
        CelType::Map(_, _) => Value::Map(Arc::new(ValueMap::new())),
        CelType::Duration => Value::Duration(Duration::new(0, 0)),
        CelType::Timestamp => Value::Timestamp(Timestamp::new(0, 0)),
        CelType::Wrapper(_) => Value::Null,
        _ => Value::Null,
    }
}

/// Whether a value equals the zero value of its own kind, the proto3
/// default-is-unset test.
pub fn is_zero_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !*b,
        Value::Int(i) => *i == 0,
        Value::UInt(u) => *u == 0,
        Value::Double(d) => *d == 0.0,
        Value::String(s) => s.is_empty(),
        Value::Bytes(b) => b.is_empty(),
        Value::List(l) => l.is_empty(),
        Value::Map(m) => m.is_empty(),
        Value::Duration(d) => d.to_nanos() == 0,
        Value::Timestamp(t) => t.seconds == 0 && t.nanos == 0,
        _ => false,
    }
}

/// Whether `value` is an acceptable assignment for a field of type `ty`.
/// `Dyn` accepts everything; numeric kinds are not coerced.
fn assignable(ty: &CelType, value: &Value) -> bool {
    match ty {
        CelType::Dyn | CelType::Any => true,
        CelType::Wrapper(inner) => value.is_null() || assignable(inner, value),
        CelType::List(_) => matches!(value, Value::List(_)),
        CelType::Map(_, _) => matches!(value, Value::Map(_)),
        CelType::Record(name) => match value {
            Value::Record(r) => r.type_name() == name.as_ref(),
            _ => false,
        },
        other => value.kind() == other.kind(),
    }
}

// ==================== Well-known types ====================

/// Try to build a well-known type from its set fields, converting to the
/// native value form. Returns `None` for ordinary types.
pub fn build_well_known(
    type_name: &str,
    fields: &IndexMap<Arc<str>, Value>,
) -> Option<Result<Value, EvalError>> {
    let field = |name: &str| fields.get(name).cloned();
    match type_name {
        "google.protobuf.BoolValue" => Some(Ok(field("value").unwrap_or(Value::Bool(false)))),
        "google.protobuf.Int32Value" | "google.protobuf.Int64Value" => {
            Some(Ok(field("value").unwrap_or(Value::Int(0))))
        }
        "google.protobuf.UInt32Value" | "google.protobuf.UInt64Value" => {
            Some(Ok(field("value").unwrap_or(Value::UInt(0))))
        }
        "google.protobuf.FloatValue" | "google.protobuf.DoubleValue" => {
            Some(Ok(field("value").unwrap_or(Value::Double(0.0))))
        }
        "google.protobuf.StringValue" => Some(Ok(field("value").unwrap_or_else(|| Value::from("")))),
        "google.protobuf.BytesValue" => {
            Some(Ok(field("value").unwrap_or_else(|| Value::from(Vec::<u8>::new()))))
        }
        "google.protobuf.Duration" => {
            let seconds = match field("seconds") {
                Some(Value::Int(s)) => s,
                None => 0,
                Some(other) => {
                    return Some(Err(EvalError::invalid_argument(format!(
                        "Duration.seconds must be int, got {}",
                        other.kind()
                    ))))
                }
            };
            let nanos = match field("nanos") {
                Some(Value::Int(n)) => n as i32,
                None => 0,
                Some(other) => {
                    return Some(Err(EvalError::invalid_argument(format!(
                        "Duration.nanos must be int, got {}",
                        other.kind()
                    ))))
                }
            };
            let d = Duration::new(seconds, nanos);
            Some(if d.is_valid() {
                Ok(Value::Duration(d))
            } else {
                Err(EvalError::overflow("duration out of range"))
            })
        }
        "google.protobuf.Timestamp" => {
            let seconds = match field("seconds") {
                Some(Value::Int(s)) => s,
                None => 0,
                Some(other) => {
                    return Some(Err(EvalError::invalid_argument(format!(
                        "Timestamp.seconds must be int, got {}",
                        other.kind()
                    ))))
                }
            };
            let nanos = match field("nanos") {
                Some(Value::Int(n)) => n as i32,
                None => 0,
                Some(other) => {
                    return Some(Err(EvalError::invalid_argument(format!(
                        "Timestamp.nanos must be int, got {}",
                        other.kind()
                    ))))
                }
            };
            let ts = Timestamp::new(seconds, nanos);
            Some(if ts.is_valid() {
                Ok(Value::Timestamp(ts))
            } else {
                Err(EvalError::overflow("timestamp out of range"))
            })
        }
        "google.protobuf.Struct" => Some(match field("fields") {
            Some(Value::Map(m)) => Ok(Value::Map(m)),
            None => Ok(Value::Map(Arc::new(ValueMap::new()))),
            Some(other) => Err(EvalError::invalid_argument(format!(
                "Struct.fields must be map, got {}",
                other.kind()
            ))),
        }),
        "google.protobuf.ListValue" => Some(match field("values") {
            Some(Value::List(l)) => Ok(Value::List(l)),
            None => Ok(Value::List(Arc::new(ListValue::from_values(Vec::new())))),
            Some(other) => Err(EvalError::invalid_argument(format!(
                "ListValue.values must be list, got {}",
                other.kind()
            ))),
        }),
        // The dynamic Value message carries whichever member was set.
        "google.protobuf.Value" => Some(Ok(fields
            .values()
            .next()
            .cloned()
            .unwrap_or(Value::Null))),
        _ => None,
    }
}

/// A builder for a well-known type, independent of any provider. Lets the
/// evaluator construct `google.protobuf.*` values even when the configured
/// provider knows no types.
pub fn well_known_builder(type_name: &str) -> Option<Box<dyn RecordBuilder>> {
    is_well_known(type_name).then(|| {
        Box::new(WellKnownBuilder {
            type_name: Arc::from(type_name),
            fields: IndexMap::new(),
        }) as Box<dyn RecordBuilder>
    })
}

/// Whether a type name denotes a well-known type with a native value form.
pub fn is_well_known(type_name: &str) -> bool {
    matches!(
        type_name,
        "google.protobuf.BoolValue"
            | "google.protobuf.Int32Value"
            | "google.protobuf.Int64Value"
            | "google.protobuf.UInt32Value"
            | "google.protobuf.UInt64Value"
            | "google.protobuf.FloatValue"
            | "google.protobuf.DoubleValue"
            | "google.protobuf.StringValue"
            | "google.protobuf.BytesValue"
            | "google.protobuf.Duration"
            | "google.protobuf.Timestamp"
            | "google.protobuf.Struct"
            | "google.protobuf.ListValue"
            | "google.protobuf.Value"
    )
}

// ==================== Declared (in-memory) provider ====================

#[derive(Debug)]
struct RecordSchema {
    type_name: Arc<str>,
    fields: Vec<FieldInfo>,
}

impl RecordSchema {
    fn field(&self, name: &str) -> Option<&FieldInfo> {
        self.fields.iter().find(|f| f.name.as_ref() == name)
    }

    fn field_by_number(&self, number: i32) -> Option<&FieldInfo> {
        self.fields.iter().find(|f| f.number == number)
    }
}

type SchemaTable = HashMap<String, Arc<RecordSchema>>;

/// An in-memory provider over registered schemas.
///
/// Intended for tests and embedders that do not carry protobuf
/// descriptors; field numbers and presence rules behave like proto3.
#[derive(Debug, Clone, Default)]
pub struct DeclaredRecordProvider {
    schemas: Arc<SchemaTable>,
}

/// Builder for [`DeclaredRecordProvider`].
#[derive(Debug, Default)]
pub struct DeclaredRecordProviderBuilder {
    schemas: SchemaTable,
}

impl DeclaredRecordProviderBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a record type with its fields.
    pub fn record(mut self, type_name: &str, fields: Vec<FieldInfo>) -> Self {
        self.schemas.insert(
            type_name.to_string(),
            Arc::new(RecordSchema {
                type_name: Arc::from(type_name),
                fields,
            }),
        );
        self
    }

    pub fn build(self) -> DeclaredRecordProvider {
        DeclaredRecordProvider {
            schemas: Arc::new(self.schemas),
        }
    }
}

impl DeclaredRecordProvider {
    pub fn builder() -> DeclaredRecordProviderBuilder {
        DeclaredRecordProviderBuilder::new()
    }

    /// An empty record of a declared type, used for unset message fields.
    fn empty_record(&self, type_name: &str) -> Option<Value> {
        let schema = self.schemas.get(type_name)?.clone();
        Some(Value::Record(RecordValue::new(Arc::new(DeclaredRecord {
            schema,
            provider: self.clone(),
            fields: IndexMap::new(),
        }))))
    }
}

impl RecordProvider for DeclaredRecordProvider {
    fn find_record(&self, type_name: &str) -> Option<Vec<FieldInfo>> {
        self.schemas.get(type_name).map(|s| s.fields.clone())
    }

    fn new_builder(&self, type_name: &str) -> Option<Box<dyn RecordBuilder>> {
        if is_well_known(type_name) {
            return Some(Box::new(WellKnownBuilder {
                type_name: Arc::from(type_name),
                fields: IndexMap::new(),
            }));
        }
        let schema = self.schemas.get(type_name)?.clone();
        Some(Box::new(DeclaredRecordBuilder {
            schema,
            provider: self.clone(),
            fields: IndexMap::new(),
        }))
    }
}

struct DeclaredRecord {
    schema: Arc<RecordSchema>,
    provider: DeclaredRecordProvider,
    fields: IndexMap<Arc<str>, Value>,
}

impl DeclaredRecord {
    fn field_value(&self, info: &FieldInfo) -> Value {
        if let Some(v) = self.fields.get(&info.name) {
            return v.clone();
        }
        // Unset message fields read as an empty record of the field type.
        if let CelType::Record(name) = &info.ty {
            if let Some(empty) = self.provider.empty_record(name) {
                return empty;
            }
        }
        zero_value(&info.ty)
    }

    fn field_presence(&self, info: &FieldInfo) -> bool {
        match self.fields.get(&info.name) {
            None => false,
            Some(v) => info.explicit_presence || !is_zero_value(v),
        }
    }
}

impl RecordRef for DeclaredRecord {
    fn type_name(&self) -> &str {
        &self.schema.type_name
    }

    fn get_field(&self, name: &str) -> Result<Value, EvalError> {
        let info = self
            .schema
            .field(name)
            .ok_or_else(|| EvalError::no_such_field(name))?;
        Ok(self.field_value(info))
    }

    fn get_field_by_number(&self, number: i32) -> Result<Value, EvalError> {
        let info = self
            .schema
            .field_by_number(number)
            .ok_or_else(|| EvalError::no_such_field(&number.to_string()))?;
        Ok(self.field_value(info))
    }

    fn has_field(&self, name: &str) -> Result<bool, EvalError> {
        let info = self
            .schema
            .field(name)
            .ok_or_else(|| EvalError::no_such_field(name))?;
        Ok(self.field_presence(info))
    }

    fn has_field_by_number(&self, number: i32) -> Result<bool, EvalError> {
        let info = self
            .schema
            .field_by_number(number)
            .ok_or_else(|| EvalError::no_such_field(&number.to_string()))?;
        Ok(self.field_presence(info))
    }

    fn fields_snapshot(&self) -> Vec<(Arc<str>, Value)> {
        self.fields
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

struct DeclaredRecordBuilder {
    schema: Arc<RecordSchema>,
    provider: DeclaredRecordProvider,
    fields: IndexMap<Arc<str>, Value>,
}

impl RecordBuilder for DeclaredRecordBuilder {
    fn set_field(&mut self, name: &str, value: Value) -> Result<(), EvalError> {
        let info = self
            .schema
            .field(name)
            .ok_or_else(|| EvalError::no_such_field(name))?;
        if !assignable(&info.ty, &value) {
            return Err(EvalError::invalid_argument(format!(
                "cannot assign {} to field '{}' of type {}",
                value.kind(),
                name,
                info.ty
            )));
        }
        self.fields.insert(info.name.clone(), value);
        Ok(())
    }

    fn build(self: Box<Self>) -> Result<Value, EvalError> {
        Ok(Value::Record(RecordValue::new(Arc::new(DeclaredRecord {
            schema: self.schema,
            provider: self.provider,
            fields: self.fields,
        }))))
    }
}

/// Builder for the well-known types: collects fields untyped, then
/// converts to the native value form.
struct WellKnownBuilder {
    type_name: Arc<str>,
    fields: IndexMap<Arc<str>, Value>,
}

impl RecordBuilder for WellKnownBuilder {
    fn set_field(&mut self, name: &str, value: Value) -> Result<(), EvalError> {
        self.fields.insert(Arc::from(name), value);
        Ok(())
    }

    fn build(self: Box<Self>) -> Result<Value, EvalError> {
        match build_well_known(&self.type_name, &self.fields) {
            Some(result) => result,
            None => Err(EvalError::internal(format!(
                "'{}' is not a well-known type",
                self.type_name
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> DeclaredRecordProvider {
        DeclaredRecordProvider::builder()
            .record(
                "test.Account",
                vec![
                    FieldInfo::new("name", 1, CelType::String),
                    FieldInfo::new("balance", 2, CelType::Int),
                    FieldInfo::new("owner", 3, CelType::record("test.User")),
                    FieldInfo::new("labels", 4, CelType::list(CelType::String)),
                    FieldInfo::new("nickname", 5, CelType::wrapper(CelType::String)),
                ],
            )
            .record("test.User", vec![FieldInfo::new("id", 1, CelType::Int)])
            .build()
    }

    fn build_account(fields: &[(&str, Value)]) -> RecordValue {
        let provider = provider();
        let mut builder = provider.new_builder("test.Account").unwrap();
        for (name, value) in fields {
            builder.set_field(name, value.clone()).unwrap();
        }
        match builder.build().unwrap() {
            Value::Record(r) => r,
            other => panic!("expected record, got {:?}", other),
        }
    }

    #[test]
    fn field_introspection() {
        let provider = provider();
        let fields = provider.find_record("test.Account").unwrap();
        assert_eq!(fields.len(), 5);
        assert_eq!(fields[0].name.as_ref(), "name");
        assert_eq!(fields[1].number, 2);
        assert!(provider.find_record("test.Missing").is_none());
    }

    #[test]
    fn unset_fields_read_zero_values() {
        let account = build_account(&[]);
        assert_eq!(account.get_field("name").unwrap(), Value::from(""));
        assert_eq!(account.get_field("balance").unwrap(), Value::Int(0));
        assert_eq!(account.get_field("labels").unwrap(), Value::list(Vec::<Value>::new()));
        // Unset wrapper reads null.
        assert_eq!(account.get_field("nickname").unwrap(), Value::Null);
        // Unset message field reads an empty record.
        match account.get_field("owner").unwrap() {
            Value::Record(r) => assert_eq!(r.type_name(), "test.User"),
            other => panic!("expected record, got {:?}", other),
        }
        assert!(account.get_field("bogus").is_err());
    }

    #[test]
    fn field_access_by_number() {
        let account = build_account(&[("balance", Value::Int(12))]);
        assert_eq!(account.get_field_by_number(2).unwrap(), Value::Int(12));
        assert!(account.get_field_by_number(99).is_err());
    }

    #[test]
    fn presence_rules() {
        // Default-is-unset for plain scalars.
        let unset = build_account(&[("balance", Value::Int(0))]);
        assert!(!unset.has_field("balance").unwrap());
        let set = build_account(&[("balance", Value::Int(5))]);
        assert!(set.has_field("balance").unwrap());

        // Explicit presence for wrappers: zero still counts as set.
        let nick = build_account(&[("nickname", Value::from(""))]);
        assert!(nick.has_field("nickname").unwrap());
        assert!(!build_account(&[]).has_field("nickname").unwrap());

        assert!(build_account(&[]).has_field("bogus").is_err());
    }

    #[test]
    fn builder_rejects_bad_fields() {
        let provider = provider();
        let mut builder = provider.new_builder("test.Account").unwrap();
        let err = builder.set_field("bogus", Value::Int(1)).unwrap_err();
        assert_eq!(err.kind, crate::error::EvalErrorKind::NoSuchField);
        let err = builder.set_field("balance", Value::from("text")).unwrap_err();
        assert_eq!(err.kind, crate::error::EvalErrorKind::InvalidArgument);
    }

    #[test]
    fn record_equality() {
        let a = build_account(&[("balance", Value::Int(1))]);
        let b = build_account(&[("balance", Value::Int(1))]);
        let c = build_account(&[("balance", Value::Int(2))]);
        assert!(a.record_eq(&b));
        assert!(!a.record_eq(&c));
    }

    #[test]
    fn well_known_types_build_native() {
        let provider = provider();

        let mut builder = provider.new_builder("google.protobuf.Duration").unwrap();
        builder.set_field("seconds", Value::Int(90)).unwrap();
        assert_eq!(builder.build().unwrap(), Value::duration(90, 0));

        let mut builder = provider.new_builder("google.protobuf.Int64Value").unwrap();
        builder.set_field("value", Value::Int(7)).unwrap();
        assert_eq!(builder.build().unwrap(), Value::Int(7));

        let builder = provider.new_builder("google.protobuf.BoolValue").unwrap();
        assert_eq!(builder.build().unwrap(), Value::Bool(false));

        let mut builder = provider.new_builder("google.protobuf.Timestamp").unwrap();
        builder.set_field("seconds", Value::Int(1234567890)).unwrap();
        assert_eq!(builder.build().unwrap(), Value::timestamp(1234567890, 0));
    }

    #[test]
    fn zero_values() {
        assert_eq!(zero_value(&CelType::Int), Value::Int(0));
        assert_eq!(zero_value(&CelType::String), Value::from(""));
        assert_eq!(zero_value(&CelType::wrapper(CelType::Int)), Value::Null);
        assert!(is_zero_value(&Value::Int(0)));
        assert!(is_zero_value(&Value::from("")));
        assert!(!is_zero_value(&Value::Int(1)));
        assert!(!is_zero_value(&Value::Bool(true)));
    }
}
