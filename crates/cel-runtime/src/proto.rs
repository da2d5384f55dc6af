//! Protobuf-descriptor record provider.
//!
//! [`ProtoRecordProvider`] serves record types out of a
//! `prost_reflect::DescriptorPool`, holding instances as `DynamicMessage`s.
//! Well-known types are transparent: reading or building
//! `google.protobuf.Int64Value` yields a plain int, `Timestamp` and
//! `Duration` their native forms, `Struct`/`Value`/`ListValue` maps and
//! lists. `Any` packs through the wrapper types.

use std::collections::HashMap;
use std::sync::Arc;

use cel_runtime_common::CelType;
use prost::Message;
use prost_reflect::{
    DescriptorPool, DynamicMessage, FieldDescriptor, Kind as ProtoKind, MessageDescriptor,
    ReflectMessage,
};

use crate::error::EvalError;
use crate::record::{
    is_zero_value, FieldInfo, RecordBuilder, RecordProvider, RecordRef, RecordValue,
};
use crate::value::{Duration, ListValue, MapKey, Timestamp, Value, ValueMap};

/// A provider backed by a descriptor pool.
#[derive(Debug, Clone)]
pub struct ProtoRecordProvider {
    pool: DescriptorPool,
}

impl ProtoRecordProvider {
    pub fn new(pool: DescriptorPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DescriptorPool {
        &self.pool
    }

    /// Wrap an existing message as a record value, unwrapping well-known
    /// types to their native form.
    pub fn value_from_message(&self, message: DynamicMessage) -> Value {
        message_to_value(message, &self.pool)
    }
}

impl RecordProvider for ProtoRecordProvider {
    fn find_record(&self, type_name: &str) -> Option<Vec<FieldInfo>> {
        let descriptor = self.pool.get_message_by_name(type_name)?;
        Some(
            descriptor
                .fields()
                .map(|fd| {
                    FieldInfo::new(fd.name(), fd.number() as i32, field_cel_type(&fd))
                        .with_explicit_presence(fd.supports_presence())
                })
                .collect(),
        )
    }

    fn new_builder(&self, type_name: &str) -> Option<Box<dyn RecordBuilder>> {
        let descriptor = self.pool.get_message_by_name(type_name)?;
        Some(Box::new(ProtoRecordBuilder {
            message: DynamicMessage::new(descriptor),
            pool: self.pool.clone(),
        }))
    }
}

/// A record backed by a dynamic message.
struct ProtoRecord {
    message: DynamicMessage,
    pool: DescriptorPool,
    /// Cached so `type_name` can borrow.
    type_name: Arc<str>,
}

impl ProtoRecord {
    fn new(message: DynamicMessage, pool: DescriptorPool) -> Self {
        let type_name = Arc::from(message.descriptor().full_name());
        Self {
            message,
            pool,
            type_name,
        }
    }

    fn descriptor(&self) -> MessageDescriptor {
        self.message.descriptor()
    }

    fn read(&self, fd: &FieldDescriptor) -> Value {
        let raw = self.message.get_field(fd);
        proto_to_value(raw.as_ref(), &self.pool)
    }

    fn presence(&self, fd: &FieldDescriptor) -> bool {
        if fd.supports_presence() {
            self.message.has_field(fd)
        } else {
            !is_zero_value(&self.read(fd))
        }
    }
}

impl RecordRef for ProtoRecord {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn get_field(&self, name: &str) -> Result<Value, EvalError> {
        let fd = self
            .descriptor()
            .get_field_by_name(name)
            .ok_or_else(|| EvalError::no_such_field(name))?;
        Ok(self.read(&fd))
    }

    fn get_field_by_number(&self, number: i32) -> Result<Value, EvalError> {
        let fd = self
            .descriptor()
            .get_field(number as u32)
            .ok_or_else(|| EvalError::no_such_field(&number.to_string()))?;
        Ok(self.read(&fd))
    }

    fn has_field(&self, name: &str) -> Result<bool, EvalError> {
        let fd = self
            .descriptor()
            .get_field_by_name(name)
            .ok_or_else(|| EvalError::no_such_field(name))?;
        Ok(self.presence(&fd))
    }

    fn has_field_by_number(&self, number: i32) -> Result<bool, EvalError> {
        let fd = self
            .descriptor()
            .get_field(number as u32)
            .ok_or_else(|| EvalError::no_such_field(&number.to_string()))?;
        Ok(self.presence(&fd))
    }

    fn fields_snapshot(&self) -> Vec<(Arc<str>, Value)> {
        self.descriptor()
            .fields()
            .filter(|fd| self.message.has_field(fd))
            .map(|fd| (Arc::from(fd.name()), self.read(&fd)))
            .collect()
    }
}

struct ProtoRecordBuilder {
    message: DynamicMessage,
    pool: DescriptorPool,
}

impl RecordBuilder for ProtoRecordBuilder {
    fn set_field(&mut self, name: &str, value: Value) -> Result<(), EvalError> {
        let fd = self
            .message
            .descriptor()
            .get_field_by_name(name)
            .ok_or_else(|| EvalError::no_such_field(name))?;
        // Null assignments leave message and wrapper fields unset.
        if value.is_null() && matches!(fd.kind(), ProtoKind::Message(_)) && !fd.is_list() {
            return Ok(());
        }
        let converted = value_to_proto(&value, &fd, &self.pool)?;
        self.message.set_field(&fd, converted);
        Ok(())
    }

    fn build(self: Box<Self>) -> Result<Value, EvalError> {
        Ok(message_to_value(self.message, &self.pool))
    }
}

// ==================== Descriptor typing ====================

fn field_cel_type(fd: &FieldDescriptor) -> CelType {
    if fd.is_map() {
        if let ProtoKind::Message(entry) = fd.kind() {
            let key = scalar_cel_type(&entry.map_entry_key_field().kind());
            let value = scalar_cel_type(&entry.map_entry_value_field().kind());
            return CelType::map(key, value);
        }
        return CelType::map(CelType::Dyn, CelType::Dyn);
    }
    let elem = scalar_cel_type(&fd.kind());
    if fd.is_list() {
        CelType::list(elem)
    } else {
        elem
    }
}

fn scalar_cel_type(kind: &ProtoKind) -> CelType {
    match kind {
        ProtoKind::Double | ProtoKind::Float => CelType::Double,
        ProtoKind::Int32
        | ProtoKind::Int64
        | ProtoKind::Sint32
        | ProtoKind::Sint64
        | ProtoKind::Sfixed32
        | ProtoKind::Sfixed64 => CelType::Int,
        ProtoKind::Uint32 | ProtoKind::Uint64 | ProtoKind::Fixed32 | ProtoKind::Fixed64 => {
            CelType::Uint
        }
        ProtoKind::Bool => CelType::Bool,
        ProtoKind::String => CelType::String,
        ProtoKind::Bytes => CelType::Bytes,
        ProtoKind::Enum(_) => CelType::Int,
        ProtoKind::Message(m) => match m.full_name() {
            "google.protobuf.Timestamp" => CelType::Timestamp,
            "google.protobuf.Duration" => CelType::Duration,
            "google.protobuf.BoolValue" => CelType::wrapper(CelType::Bool),
            "google.protobuf.Int32Value" | "google.protobuf.Int64Value" => {
                CelType::wrapper(CelType::Int)
            }
            "google.protobuf.UInt32Value" | "google.protobuf.UInt64Value" => {
                CelType::wrapper(CelType::Uint)
            }
            "google.protobuf.FloatValue" | "google.protobuf.DoubleValue" => {
                CelType::wrapper(CelType::Double)
            }
            "google.protobuf.StringValue" => CelType::wrapper(CelType::String),
            "google.protobuf.BytesValue" => CelType::wrapper(CelType::Bytes),
            "google.protobuf.Struct" => CelType::map(CelType::String, CelType::Dyn),
            "google.protobuf.Value" => CelType::Dyn,
            "google.protobuf.ListValue" => CelType::list(CelType::Dyn),
            "google.protobuf.Any" => CelType::Any,
            name => CelType::record(name),
        },
    }
}

// ==================== Proto -> Value ====================

/// Unwrap a message to its native CEL form, or wrap it as a record.
fn message_to_value(message: DynamicMessage, pool: &DescriptorPool) -> Value {
    let descriptor = message.descriptor();
    match descriptor.full_name() {
        "google.protobuf.Timestamp" => {
            let seconds = read_i64(&message, "seconds").unwrap_or(0);
            let nanos = read_i64(&message, "nanos").unwrap_or(0) as i32;
            Value::Timestamp(Timestamp::new(seconds, nanos))
        }
        "google.protobuf.Duration" => {
            let seconds = read_i64(&message, "seconds").unwrap_or(0);
            let nanos = read_i64(&message, "nanos").unwrap_or(0) as i32;
            Value::Duration(Duration::new(seconds, nanos))
        }
        "google.protobuf.Int32Value" | "google.protobuf.Int64Value" => {
            Value::Int(read_i64(&message, "value").unwrap_or(0))
        }
        "google.protobuf.UInt32Value" | "google.protobuf.UInt64Value" => {
            Value::UInt(read_u64(&message, "value").unwrap_or(0))
        }
        "google.protobuf.FloatValue" | "google.protobuf.DoubleValue" => {
            Value::Double(read_f64(&message, "value").unwrap_or(0.0))
        }
        "google.protobuf.BoolValue" => Value::Bool(read_bool(&message, "value").unwrap_or(false)),
        "google.protobuf.StringValue" => match read_field(&message, "value") {
            Some(prost_reflect::Value::String(s)) => Value::from(s),
            _ => Value::from(""),
        },
        "google.protobuf.BytesValue" => match read_field(&message, "value") {
            Some(prost_reflect::Value::Bytes(b)) => Value::from(b.to_vec()),
            _ => Value::from(Vec::<u8>::new()),
        },
        "google.protobuf.Value" => google_value_to_value(&message, pool),
        "google.protobuf.Struct" => google_struct_to_value(&message, pool),
        "google.protobuf.ListValue" => google_list_to_value(&message, pool),
        "google.protobuf.Any" => match unpack_any(&message, pool) {
            Ok(value) => value,
            Err(err) => Value::error(err),
        },
        _ => Value::Record(RecordValue::new(Arc::new(ProtoRecord::new(
            message,
            pool.clone(),
        )))),
    }
}

fn read_field(message: &DynamicMessage, name: &str) -> Option<prost_reflect::Value> {
    let fd = message.descriptor().get_field_by_name(name)?;
    Some(message.get_field(&fd).into_owned())
}

fn read_i64(message: &DynamicMessage, name: &str) -> Option<i64> {
    match read_field(message, name)? {
        prost_reflect::Value::I64(v) => Some(v),
        prost_reflect::Value::I32(v) => Some(v as i64),
        _ => None,
    }
}

fn read_u64(message: &DynamicMessage, name: &str) -> Option<u64> {
    match read_field(message, name)? {
        prost_reflect::Value::U64(v) => Some(v),
        prost_reflect::Value::U32(v) => Some(v as u64),
        _ => None,
    }
}

fn read_f64(message: &DynamicMessage, name: &str) -> Option<f64> {
    match read_field(message, name)? {
        prost_reflect::Value::F64(v) => Some(v),
        prost_reflect::Value::F32(v) => Some(v as f64),
        _ => None,
    }
}

fn read_bool(message: &DynamicMessage, name: &str) -> Option<bool> {
    match read_field(message, name)? {
        prost_reflect::Value::Bool(v) => Some(v),
        _ => None,
    }
}

fn proto_to_value(raw: &prost_reflect::Value, pool: &DescriptorPool) -> Value {
    match raw {
        prost_reflect::Value::Bool(b) => Value::Bool(*b),
        prost_reflect::Value::I32(i) => Value::Int(*i as i64),
        prost_reflect::Value::I64(i) => Value::Int(*i),
        prost_reflect::Value::U32(u) => Value::UInt(*u as u64),
        prost_reflect::Value::U64(u) => Value::UInt(*u),
        prost_reflect::Value::F32(f) => Value::Double(*f as f64),
        prost_reflect::Value::F64(f) => Value::Double(*f),
        prost_reflect::Value::String(s) => Value::from(s.as_str()),
        prost_reflect::Value::Bytes(b) => Value::from(b.to_vec()),
        prost_reflect::Value::EnumNumber(n) => Value::Int(*n as i64),
        prost_reflect::Value::Message(m) => message_to_value(m.clone(), pool),
        prost_reflect::Value::List(items) => Value::List(Arc::new(ListValue::from_values(
            items.iter().map(|v| proto_to_value(v, pool)).collect(),
        ))),
        prost_reflect::Value::Map(entries) => {
            let mut map = ValueMap::new();
            for (key, value) in entries {
                let map_key = match key {
                    prost_reflect::MapKey::Bool(b) => MapKey::Bool(*b),
                    prost_reflect::MapKey::I32(i) => MapKey::Int(*i as i64),
                    prost_reflect::MapKey::I64(i) => MapKey::Int(*i),
                    prost_reflect::MapKey::U32(u) => MapKey::UInt(*u as u64),
                    prost_reflect::MapKey::U64(u) => MapKey::UInt(*u),
                    prost_reflect::MapKey::String(s) => MapKey::from(s.as_str()),
                };
                map.insert(map_key, proto_to_value(value, pool));
            }
            Value::Map(Arc::new(map))
        }
    }
}

fn google_value_to_value(message: &DynamicMessage, pool: &DescriptorPool) -> Value {
    let descriptor = message.descriptor();
    for name in [
        "null_value",
        "bool_value",
        "number_value",
        "string_value",
        "struct_value",
        "list_value",
    ] {
        let Some(fd) = descriptor.get_field_by_name(name) else {
            continue;
        };
        if !message.has_field(&fd) {
            continue;
        }
        let raw = message.get_field(&fd);
        return match (name, raw.as_ref()) {
            ("null_value", _) => Value::Null,
            ("bool_value", prost_reflect::Value::Bool(b)) => Value::Bool(*b),
            ("number_value", prost_reflect::Value::F64(d)) => Value::Double(*d),
            ("string_value", prost_reflect::Value::String(s)) => Value::from(s.as_str()),
            ("struct_value", prost_reflect::Value::Message(m)) => {
                google_struct_to_value(m, pool)
            }
            ("list_value", prost_reflect::Value::Message(m)) => google_list_to_value(m, pool),
            _ => Value::Null,
        };
    }
    Value::Null
}

fn google_struct_to_value(message: &DynamicMessage, pool: &DescriptorPool) -> Value {
    let mut map = ValueMap::new();
    if let Some(prost_reflect::Value::Map(entries)) = read_field(message, "fields") {
        for (key, value) in &entries {
            if let prost_reflect::MapKey::String(name) = key {
                let converted = match value {
                    prost_reflect::Value::Message(m) => google_value_to_value(m, pool),
                    _ => Value::Null,
                };
                map.insert(MapKey::from(name.as_str()), converted);
            }
        }
    }
    Value::Map(Arc::new(map))
}

fn google_list_to_value(message: &DynamicMessage, pool: &DescriptorPool) -> Value {
    let mut items = Vec::new();
    if let Some(prost_reflect::Value::List(values)) = read_field(message, "values") {
        for value in &values {
            items.push(match value {
                prost_reflect::Value::Message(m) => google_value_to_value(m, pool),
                _ => Value::Null,
            });
        }
    }
    Value::List(Arc::new(ListValue::from_values(items)))
}

fn unpack_any(message: &DynamicMessage, pool: &DescriptorPool) -> Result<Value, EvalError> {
    let type_url = match read_field(message, "type_url") {
        Some(prost_reflect::Value::String(s)) => s,
        _ => return Err(EvalError::invalid_argument("Any without type_url")),
    };
    let payload = match read_field(message, "value") {
        Some(prost_reflect::Value::Bytes(b)) => b,
        _ => return Err(EvalError::invalid_argument("Any without value")),
    };
    let type_name = type_url.rsplit('/').next().unwrap_or(&type_url);
    let descriptor = pool.get_message_by_name(type_name).ok_or_else(|| {
        EvalError::invalid_argument(format!("Any holds unknown type '{}'", type_name))
    })?;
    let inner = DynamicMessage::decode(descriptor, payload.as_ref())
        .map_err(|e| EvalError::invalid_argument(format!("malformed Any payload: {}", e)))?;
    Ok(message_to_value(inner, pool))
}

// ==================== Value -> Proto ====================

fn value_to_proto(
    value: &Value,
    fd: &FieldDescriptor,
    pool: &DescriptorPool,
) -> Result<prost_reflect::Value, EvalError> {
    if fd.is_map() {
        let Value::Map(map) = value else {
            return Err(bad_assignment(value, fd));
        };
        let ProtoKind::Message(entry) = fd.kind() else {
            return Err(EvalError::internal("map field without entry message"));
        };
        let value_fd = entry.map_entry_value_field();
        let mut out = HashMap::new();
        for (key, val) in map.iter() {
            let proto_key = match key {
                MapKey::Bool(b) => prost_reflect::MapKey::Bool(*b),
                MapKey::Int(i) => prost_reflect::MapKey::I64(*i),
                MapKey::UInt(u) => prost_reflect::MapKey::U64(*u),
                MapKey::String(s) => prost_reflect::MapKey::String(s.to_string()),
            };
            out.insert(proto_key, scalar_to_proto(val, &value_fd.kind(), pool)?);
        }
        return Ok(prost_reflect::Value::Map(out));
    }
    if fd.is_list() {
        let Value::List(list) = value else {
            return Err(bad_assignment(value, fd));
        };
        let mut out = Vec::with_capacity(list.len());
        for item in list.iter() {
            out.push(scalar_to_proto(item, &fd.kind(), pool)?);
        }
        return Ok(prost_reflect::Value::List(out));
    }
    scalar_to_proto(value, &fd.kind(), pool)
}

fn bad_assignment(value: &Value, fd: &FieldDescriptor) -> EvalError {
    EvalError::invalid_argument(format!(
        "cannot assign {} to field '{}'",
        value.kind(),
        fd.name()
    ))
}

fn scalar_to_proto(
    value: &Value,
    kind: &ProtoKind,
    pool: &DescriptorPool,
) -> Result<prost_reflect::Value, EvalError> {
    use prost_reflect::Value as P;
    let err = || {
        EvalError::invalid_argument(format!(
            "cannot convert {} for proto field",
            value.kind()
        ))
    };
    Ok(match (kind, value) {
        (ProtoKind::Bool, Value::Bool(b)) => P::Bool(*b),
        (ProtoKind::Int32 | ProtoKind::Sint32 | ProtoKind::Sfixed32, Value::Int(i)) => {
            let narrowed = i32::try_from(*i)
                .map_err(|_| EvalError::overflow("int out of range for 32-bit field"))?;
            P::I32(narrowed)
        }
        (ProtoKind::Int64 | ProtoKind::Sint64 | ProtoKind::Sfixed64, Value::Int(i)) => P::I64(*i),
        (ProtoKind::Uint32 | ProtoKind::Fixed32, Value::UInt(u)) => {
            let narrowed = u32::try_from(*u)
                .map_err(|_| EvalError::overflow("uint out of range for 32-bit field"))?;
            P::U32(narrowed)
        }
        (ProtoKind::Uint64 | ProtoKind::Fixed64, Value::UInt(u)) => P::U64(*u),
        (ProtoKind::Float, Value::Double(d)) => P::F32(*d as f32),
        (ProtoKind::Double, Value::Double(d)) => P::F64(*d),
        (ProtoKind::Double, Value::Int(i)) => P::F64(*i as f64),
        (ProtoKind::Double, Value::UInt(u)) => P::F64(*u as f64),
        (ProtoKind::String, Value::String(s)) => P::String(s.as_cow().into_owned()),
        (ProtoKind::Bytes, Value::Bytes(b)) => {
            P::Bytes(prost::bytes::Bytes::from(b.as_cow().into_owned()))
        }
        (ProtoKind::Enum(_), Value::Int(i)) => {
            let narrowed = i32::try_from(*i)
                .map_err(|_| EvalError::overflow("enum value out of range"))?;
            P::EnumNumber(narrowed)
        }
        (ProtoKind::Message(descriptor), _) => {
            P::Message(value_to_message(value, descriptor, pool)?)
        }
        _ => return Err(err()),
    })
}

fn value_to_message(
    value: &Value,
    descriptor: &MessageDescriptor,
    pool: &DescriptorPool,
) -> Result<DynamicMessage, EvalError> {
    let mut message = DynamicMessage::new(descriptor.clone());
    let set = |message: &mut DynamicMessage, name: &str, v: prost_reflect::Value| {
        if let Some(fd) = descriptor.get_field_by_name(name) {
            message.set_field(&fd, v);
        }
    };
    match (descriptor.full_name(), value) {
        ("google.protobuf.Timestamp", Value::Timestamp(ts)) => {
            set(&mut message, "seconds", prost_reflect::Value::I64(ts.seconds));
            set(&mut message, "nanos", prost_reflect::Value::I32(ts.nanos));
        }
        ("google.protobuf.Duration", Value::Duration(d)) => {
            set(&mut message, "seconds", prost_reflect::Value::I64(d.seconds));
            set(&mut message, "nanos", prost_reflect::Value::I32(d.nanos));
        }
        ("google.protobuf.BoolValue", Value::Bool(b)) => {
            set(&mut message, "value", prost_reflect::Value::Bool(*b));
        }
        ("google.protobuf.Int32Value", Value::Int(i)) => {
            let narrowed = i32::try_from(*i)
                .map_err(|_| EvalError::overflow("int out of range for Int32Value"))?;
            set(&mut message, "value", prost_reflect::Value::I32(narrowed));
        }
        ("google.protobuf.Int64Value", Value::Int(i)) => {
            set(&mut message, "value", prost_reflect::Value::I64(*i));
        }
        ("google.protobuf.UInt32Value", Value::UInt(u)) => {
            let narrowed = u32::try_from(*u)
                .map_err(|_| EvalError::overflow("uint out of range for UInt32Value"))?;
            set(&mut message, "value", prost_reflect::Value::U32(narrowed));
        }
        ("google.protobuf.UInt64Value", Value::UInt(u)) => {
            set(&mut message, "value", prost_reflect::Value::U64(*u));
        }
        ("google.protobuf.FloatValue", Value::Double(d)) => {
            set(&mut message, "value", prost_reflect::Value::F32(*d as f32));
        }
        ("google.protobuf.DoubleValue", Value::Double(d)) => {
            set(&mut message, "value", prost_reflect::Value::F64(*d));
        }
        ("google.protobuf.StringValue", Value::String(s)) => {
            set(
                &mut message,
                "value",
                prost_reflect::Value::String(s.as_cow().into_owned()),
            );
        }
        ("google.protobuf.BytesValue", Value::Bytes(b)) => {
            set(
                &mut message,
                "value",
                prost_reflect::Value::Bytes(prost::bytes::Bytes::from(b.as_cow().into_owned())),
            );
        }
        ("google.protobuf.Value", _) => return value_to_google_value(value, descriptor, pool),
        ("google.protobuf.Struct", Value::Map(_)) => {
            return value_to_google_struct(value, descriptor, pool)
        }
        ("google.protobuf.ListValue", Value::List(_)) => {
            return value_to_google_list(value, descriptor, pool)
        }
        ("google.protobuf.Any", _) => return pack_any(value, descriptor, pool),
        (_, Value::Record(record)) => {
            if record.type_name() != descriptor.full_name() {
                return Err(EvalError::invalid_argument(format!(
                    "cannot assign {} to field of type {}",
                    record.type_name(),
                    descriptor.full_name()
                )));
            }
            for (name, field_value) in record.fields_snapshot() {
                let fd = descriptor
                    .get_field_by_name(&name)
                    .ok_or_else(|| EvalError::no_such_field(&name))?;
                let converted = value_to_proto(&field_value, &fd, pool)?;
                message.set_field(&fd, converted);
            }
        }
        _ => {
            return Err(EvalError::invalid_argument(format!(
                "cannot convert {} to {}",
                value.kind(),
                descriptor.full_name()
            )))
        }
    }
    Ok(message)
}

fn value_to_google_value(
    value: &Value,
    descriptor: &MessageDescriptor,
    pool: &DescriptorPool,
) -> Result<DynamicMessage, EvalError> {
    let mut message = DynamicMessage::new(descriptor.clone());
    let field = |name: &str| {
        descriptor
            .get_field_by_name(name)
            .ok_or_else(|| EvalError::internal("google.protobuf.Value missing field"))
    };
    match value {
        Value::Null => message.set_field(&field("null_value")?, prost_reflect::Value::EnumNumber(0)),
        Value::Bool(b) => message.set_field(&field("bool_value")?, prost_reflect::Value::Bool(*b)),
        Value::Int(i) => {
            message.set_field(&field("number_value")?, prost_reflect::Value::F64(*i as f64))
        }
        Value::UInt(u) => {
            message.set_field(&field("number_value")?, prost_reflect::Value::F64(*u as f64))
        }
        Value::Double(d) => {
            message.set_field(&field("number_value")?, prost_reflect::Value::F64(*d))
        }
        Value::String(s) => message.set_field(
            &field("string_value")?,
            prost_reflect::Value::String(s.as_cow().into_owned()),
        ),
        Value::Map(_) => {
            let struct_desc = pool
                .get_message_by_name("google.protobuf.Struct")
                .ok_or_else(|| EvalError::internal("google.protobuf.Struct not in pool"))?;
            let inner = value_to_google_struct(value, &struct_desc, pool)?;
            message.set_field(&field("struct_value")?, prost_reflect::Value::Message(inner));
        }
        Value::List(_) => {
            let list_desc = pool
                .get_message_by_name("google.protobuf.ListValue")
                .ok_or_else(|| EvalError::internal("google.protobuf.ListValue not in pool"))?;
            let inner = value_to_google_list(value, &list_desc, pool)?;
            message.set_field(&field("list_value")?, prost_reflect::Value::Message(inner));
        }
        other => {
            return Err(EvalError::type_conversion(
                other.kind().as_str(),
                "google.protobuf.Value",
            ))
        }
    }
    Ok(message)
}

fn value_to_google_struct(
    value: &Value,
    descriptor: &MessageDescriptor,
    pool: &DescriptorPool,
) -> Result<DynamicMessage, EvalError> {
    let Value::Map(map) = value else {
        return Err(EvalError::type_conversion(
            value.kind().as_str(),
            "google.protobuf.Struct",
        ));
    };
    let value_desc = pool
        .get_message_by_name("google.protobuf.Value")
        .ok_or_else(|| EvalError::internal("google.protobuf.Value not in pool"))?;
    let mut message = DynamicMessage::new(descriptor.clone());
    if let Some(fields_fd) = descriptor.get_field_by_name("fields") {
        let mut entries = HashMap::new();
        for (key, val) in map.iter() {
            let MapKey::String(name) = key else {
                return Err(EvalError::invalid_argument(
                    "Struct keys must be strings",
                ));
            };
            let converted = value_to_google_value(val, &value_desc, pool)?;
            entries.insert(
                prost_reflect::MapKey::String(name.to_string()),
                prost_reflect::Value::Message(converted),
            );
        }
        message.set_field(&fields_fd, prost_reflect::Value::Map(entries));
    }
    Ok(message)
}

fn value_to_google_list(
    value: &Value,
    descriptor: &MessageDescriptor,
    pool: &DescriptorPool,
) -> Result<DynamicMessage, EvalError> {
    let Value::List(list) = value else {
        return Err(EvalError::type_conversion(
            value.kind().as_str(),
            "google.protobuf.ListValue",
        ));
    };
    let value_desc = pool
        .get_message_by_name("google.protobuf.Value")
        .ok_or_else(|| EvalError::internal("google.protobuf.Value not in pool"))?;
    let mut message = DynamicMessage::new(descriptor.clone());
    if let Some(values_fd) = descriptor.get_field_by_name("values") {
        let mut items = Vec::with_capacity(list.len());
        for item in list.iter() {
            let converted = value_to_google_value(item, &value_desc, pool)?;
            items.push(prost_reflect::Value::Message(converted));
        }
        message.set_field(&values_fd, prost_reflect::Value::List(items));
    }
    Ok(message)
}

/// Pack a value into `google.protobuf.Any`, wrapping primitives in their
/// wrapper messages first.
fn pack_any(
    value: &Value,
    descriptor: &MessageDescriptor,
    pool: &DescriptorPool,
) -> Result<DynamicMessage, EvalError> {
    let wrapper_name = match value {
        Value::Record(r) => r.type_name().to_string(),
        Value::Bool(_) => "google.protobuf.BoolValue".to_string(),
        Value::Int(_) => "google.protobuf.Int64Value".to_string(),
        Value::UInt(_) => "google.protobuf.UInt64Value".to_string(),
        Value::Double(_) => "google.protobuf.DoubleValue".to_string(),
        Value::String(_) => "google.protobuf.StringValue".to_string(),
        Value::Bytes(_) => "google.protobuf.BytesValue".to_string(),
        Value::Timestamp(_) => "google.protobuf.Timestamp".to_string(),
        Value::Duration(_) => "google.protobuf.Duration".to_string(),
        Value::Map(_) => "google.protobuf.Struct".to_string(),
        Value::List(_) => "google.protobuf.ListValue".to_string(),
        Value::Null => "google.protobuf.Value".to_string(),
        other => {
            return Err(EvalError::type_conversion(
                other.kind().as_str(),
                "google.protobuf.Any",
            ))
        }
    };
    let inner_desc = pool
        .get_message_by_name(&wrapper_name)
        .ok_or_else(|| EvalError::internal(format!("{} not in pool", wrapper_name)))?;
    let inner = value_to_message(value, &inner_desc, pool)?;

    let mut message = DynamicMessage::new(descriptor.clone());
    if let Some(fd) = descriptor.get_field_by_name("type_url") {
        message.set_field(
            &fd,
            prost_reflect::Value::String(format!("type.googleapis.com/{}", wrapper_name)),
        );
    }
    if let Some(fd) = descriptor.get_field_by_name("value") {
        message.set_field(
            &fd,
            prost_reflect::Value::Bytes(prost::bytes::Bytes::from(inner.encode_to_vec())),
        );
    }
    Ok(message)
}
