//! The CEL structural type universe.

use std::fmt;
use std::sync::Arc;

use crate::Kind;

/// A CEL type.
///
/// Types are value objects: equality is structural and ignores allocation
/// identity. Parameterized kinds box their parameters in `Arc` so types stay
/// cheap to clone and share across threads.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CelType {
    /// Null type.
    Null,
    /// Boolean.
    Bool,
    /// Signed 64-bit integer.
    Int,
    /// Unsigned 64-bit integer.
    Uint,
    /// 64-bit floating point.
    Double,
    /// Unicode string.
    String,
    /// Byte sequence.
    Bytes,
    /// google.protobuf.Duration.
    Duration,
    /// google.protobuf.Timestamp.
    Timestamp,
    /// Homogeneous list: `list<T>`.
    List(Arc<CelType>),
    /// Key-value map: `map<K, V>`.
    Map(Arc<CelType>, Arc<CelType>),
    /// Structured record identified by its fully qualified type name.
    Record(Arc<str>),
    /// Protobuf wrapper type (e.g. `google.protobuf.Int64Value`).
    Wrapper(Arc<CelType>),
    /// Optional value: `optional<T>`.
    Opt(Arc<CelType>),
    /// Abstract, application-defined type with parameters.
    Opaque {
        name: Arc<str>,
        params: Arc<[CelType]>,
    },
    /// Function type with argument and result types.
    Function {
        result: Arc<CelType>,
        args: Arc<[CelType]>,
    },
    /// Type parameter for generic declarations (`T` in `list<T>`).
    TypeParam(Arc<str>),
    /// Dynamic type, compatible with everything.
    Dyn,
    /// Error type.
    Error,
    /// google.protobuf.Any.
    Any,
    /// The type of an unknown value.
    Unknown,
    /// The type of a type value: `type(T)`.
    TypeOfType(Arc<CelType>),
}

impl CelType {
    /// Create a list type with the given element type.
    pub fn list(elem: CelType) -> Self {
        CelType::List(Arc::new(elem))
    }

    /// Create a map type with the given key and value types.
    pub fn map(key: CelType, value: CelType) -> Self {
        CelType::Map(Arc::new(key), Arc::new(value))
    }

    /// Create a record type with the given fully qualified name.
    pub fn record(name: &str) -> Self {
        CelType::Record(Arc::from(name))
    }

    /// Create a wrapper type around a primitive.
    pub fn wrapper(inner: CelType) -> Self {
        CelType::Wrapper(Arc::new(inner))
    }

    /// Create an optional type.
    pub fn optional(inner: CelType) -> Self {
        CelType::Opt(Arc::new(inner))
    }

    /// Create an opaque type with the given name and parameters.
    pub fn opaque(name: &str, params: &[CelType]) -> Self {
        CelType::Opaque {
            name: Arc::from(name),
            params: Arc::from(params),
        }
    }

    /// Create a function type.
    pub fn function(result: CelType, args: &[CelType]) -> Self {
        CelType::Function {
            result: Arc::new(result),
            args: Arc::from(args),
        }
    }

    /// Create a type parameter.
    pub fn type_param(name: &str) -> Self {
        CelType::TypeParam(Arc::from(name))
    }

    /// Create the reified type of `inner`: `type(inner)`.
    pub fn type_of(inner: CelType) -> Self {
        CelType::TypeOfType(Arc::new(inner))
    }

    /// The runtime kind of values inhabiting this type.
    pub fn kind(&self) -> Kind {
        match self {
            CelType::Null => Kind::Null,
            CelType::Bool => Kind::Bool,
            CelType::Int => Kind::Int,
            CelType::Uint => Kind::Uint,
            CelType::Double => Kind::Double,
            CelType::String => Kind::String,
            CelType::Bytes => Kind::Bytes,
            CelType::Duration => Kind::Duration,
            CelType::Timestamp => Kind::Timestamp,
            CelType::List(_) => Kind::List,
            CelType::Map(_, _) => Kind::Map,
            CelType::Record(_) => Kind::Record,
            CelType::Wrapper(inner) => inner.kind(),
            CelType::Opt(_) => Kind::Opt,
            CelType::Opaque { .. } => Kind::Record,
            CelType::Function { .. } => Kind::Dyn,
            CelType::TypeParam(_) => Kind::Dyn,
            CelType::Dyn => Kind::Dyn,
            CelType::Error => Kind::Error,
            CelType::Any => Kind::Dyn,
            CelType::Unknown => Kind::Unknown,
            CelType::TypeOfType(_) => Kind::Type,
        }
    }

    /// Type parameters of this type, for generic kinds.
    ///
    /// Lists expose one parameter, maps two, optionals and wrappers one,
    /// opaque and function types their declared parameter lists. All other
    /// kinds expose none.
    pub fn params(&self) -> Vec<&CelType> {
        match self {
            CelType::List(elem) => vec![elem],
            CelType::Map(key, value) => vec![key, value],
            CelType::Wrapper(inner) | CelType::Opt(inner) | CelType::TypeOfType(inner) => {
                vec![inner]
            }
            CelType::Opaque { params, .. } => params.iter().collect(),
            CelType::Function { result, args } => {
                let mut out: Vec<&CelType> = vec![result];
                out.extend(args.iter());
                out
            }
            _ => Vec::new(),
        }
    }

    /// The display name of this type as it appears in CEL.
    pub fn display_name(&self) -> String {
        match self {
            CelType::Null => "null_type".to_string(),
            CelType::Bool => "bool".to_string(),
            CelType::Int => "int".to_string(),
            CelType::Uint => "uint".to_string(),
            CelType::Double => "double".to_string(),
            CelType::String => "string".to_string(),
            CelType::Bytes => "bytes".to_string(),
            CelType::Duration => "google.protobuf.Duration".to_string(),
            CelType::Timestamp => "google.protobuf.Timestamp".to_string(),
            CelType::List(elem) => format!("list<{}>", elem.display_name()),
            CelType::Map(key, value) => {
                format!("map<{}, {}>", key.display_name(), value.display_name())
            }
            CelType::Record(name) => name.to_string(),
            CelType::Wrapper(inner) => format!("wrapper<{}>", inner.display_name()),
            CelType::Opt(inner) => format!("optional<{}>", inner.display_name()),
            CelType::Opaque { name, params } => {
                if params.is_empty() {
                    name.to_string()
                } else {
                    let params: Vec<String> = params.iter().map(|p| p.display_name()).collect();
                    format!("{}<{}>", name, params.join(", "))
                }
            }
            CelType::Function { result, args } => {
                let args: Vec<String> = args.iter().map(|a| a.display_name()).collect();
                format!("({}) -> {}", args.join(", "), result.display_name())
            }
            CelType::TypeParam(name) => name.to_string(),
            CelType::Dyn => "dyn".to_string(),
            CelType::Error => "*error*".to_string(),
            CelType::Any => "google.protobuf.Any".to_string(),
            CelType::Unknown => "*unknown*".to_string(),
            CelType::TypeOfType(inner) => format!("type({})", inner.display_name()),
        }
    }
}

impl fmt::Display for CelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_name())
    }
}
