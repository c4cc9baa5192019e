use serde::{Deserialize, Serialize};
use std::fmt;

/// Process-unique record identity carried by every record.
/// Example: `0b6f1f5e-7a7c-4d8e-9a51-2c8f7f0c6b11`
pub type RecordId = uuid::Uuid;
/// Name of a field in a record's value map.
/// Examples: `mass`, `logp`, `donors`
pub type FieldName = String;
/// Key of a dataset-level or field-level metadata property.
/// Examples: `history`, `description`, `source`
pub type PropertyKey = String;
/// Name of an execution option used by option-driven thin field rules.
/// Example: `field`
pub type OptionName = String;
/// Media type string resolved through the handler registry.
/// Example: `application/x-molecule-record+json`
pub type MediaType = String;
/// Warning/log message text.
/// Example: `Added field mass`
pub type LogMessage = String;

/// Kind tag for a record. The set of kinds is closed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordType {
    /// Identity plus field values.
    Basic,
    /// Identity, structure source, and field values.
    Molecule,
}

impl RecordType {
    /// Whether records of `other` can stand in where `self` is expected.
    ///
    /// `Basic` accepts every kind; `Molecule` accepts only molecules.
    pub fn is_assignable_from(self, other: RecordType) -> bool {
        self == other || self == RecordType::Basic
    }

    /// Canonical name used in logs and serialized metadata.
    pub const fn as_str(self) -> &'static str {
        match self {
            RecordType::Basic => "Basic",
            RecordType::Molecule => "Molecule",
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Value-type tag recorded per field in set metadata.
///
/// Null values have no type and are never recorded.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueType {
    /// JSON boolean.
    Boolean,
    /// Number without a fractional part.
    Integer,
    /// Any other number.
    Float,
    /// JSON string.
    Text,
    /// JSON array.
    Array,
    /// JSON object.
    Object,
}

impl ValueType {
    /// Classify a JSON value, returning `None` for null.
    pub fn of(value: &serde_json::Value) -> Option<Self> {
        use serde_json::Value;
        match value {
            Value::Null => None,
            Value::Bool(_) => Some(ValueType::Boolean),
            Value::Number(number) if number.is_f64() => Some(ValueType::Float),
            Value::Number(_) => Some(ValueType::Integer),
            Value::String(_) => Some(ValueType::Text),
            Value::Array(_) => Some(ValueType::Array),
            Value::Object(_) => Some(ValueType::Object),
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueType::Boolean => "Boolean",
            ValueType::Integer => "Integer",
            ValueType::Float => "Float",
            ValueType::Text => "Text",
            ValueType::Array => "Array",
            ValueType::Object => "Object",
        };
        f.write_str(name)
    }
}
