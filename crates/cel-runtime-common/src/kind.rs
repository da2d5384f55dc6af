//! Runtime value kinds.

use std::fmt;

/// The kind of a runtime value.
///
/// Every value exposes its kind in O(1) without allocation. Kinds are also
/// the vocabulary of function overload signatures: an overload declares one
/// `Kind` per parameter, with [`Kind::Dyn`] matching any argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Null,
    Bool,
    Int,
    Uint,
    Double,
    String,
    Bytes,
    Duration,
    Timestamp,
    List,
    Map,
    Record,
    Type,
    Opt,
    Error,
    Unknown,
    /// Matches any kind in an overload signature.
    Dyn,
}

impl Kind {
    /// Returns the display name of this kind as used in CEL diagnostics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::Null => "null_type",
            Kind::Bool => "bool",
            Kind::Int => "int",
            Kind::Uint => "uint",
            Kind::Double => "double",
            Kind::String => "string",
            Kind::Bytes => "bytes",
            Kind::Duration => "google.protobuf.Duration",
            Kind::Timestamp => "google.protobuf.Timestamp",
            Kind::List => "list",
            Kind::Map => "map",
            Kind::Record => "record",
            Kind::Type => "type",
            Kind::Opt => "optional_type",
            Kind::Error => "*error*",
            Kind::Unknown => "*unknown*",
            Kind::Dyn => "dyn",
        }
    }

    /// Returns true if this kind matches `other` in an overload signature.
    ///
    /// `Dyn` matches everything; all other kinds match only themselves.
    pub fn matches(&self, other: Kind) -> bool {
        *self == Kind::Dyn || *self == other
    }

    /// Returns true for the three numeric kinds.
    pub fn is_numeric(&self) -> bool {
        matches!(self, Kind::Int | Kind::Uint | Kind::Double)
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dyn_matches_everything() {
        for kind in [Kind::Null, Kind::Int, Kind::List, Kind::Record, Kind::Error] {
            assert!(Kind::Dyn.matches(kind));
            assert!(kind.matches(kind));
        }
        assert!(!Kind::Int.matches(Kind::Uint));
    }

    #[test]
    fn numeric_kinds() {
        assert!(Kind::Int.is_numeric());
        assert!(Kind::Uint.is_numeric());
        assert!(Kind::Double.is_numeric());
        assert!(!Kind::String.is_numeric());
    }
}
