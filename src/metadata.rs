//! Descriptive metadata for record sets.
//!
//! A [`SetMetadata`] manages three kinds of information:
//! - the value type of each field (`field_types`), which implies that all
//!   values of one field share a type;
//! - free-form properties per field (`field_properties`);
//! - free-form properties of the set as a whole (`properties`).
//!
//! Metadata is persisted as its own JSON document, separate from the record
//! data, because the count and field types are only known once the data has
//! been streamed.

use chrono::Utc;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::io::Read;
use tracing::{info, warn};

use crate::constants::metadata::{
    HISTORY_DATE_FORMAT, HISTORY_SEPARATOR, PROP_CREATED, PROP_DESCRIPTION, PROP_HISTORY,
    PROP_SOURCE,
};
use crate::errors::DatasetError;
use crate::types::{FieldName, PropertyKey, RecordType, ValueType};

/// Field name → value type, in first-recorded order.
pub type FieldTypeMap = IndexMap<FieldName, ValueType>;
/// Free-form property map.
pub type PropertyMap = IndexMap<PropertyKey, Value>;

/// Record count of a set. `Unknown` is distinct from an empty set.
///
/// Serialized as a number, with `-1` standing for unknown.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "i64", from = "i64")]
pub enum SetSize {
    /// Count not yet determined.
    #[default]
    Unknown,
    /// Exact record count.
    Known(u64),
}

impl SetSize {
    /// Count, if known.
    pub fn known(self) -> Option<u64> {
        match self {
            SetSize::Unknown => None,
            SetSize::Known(count) => Some(count),
        }
    }
}

impl From<SetSize> for i64 {
    fn from(size: SetSize) -> Self {
        match size {
            SetSize::Unknown => -1,
            SetSize::Known(count) => i64::try_from(count).unwrap_or(i64::MAX),
        }
    }
}

impl From<i64> for SetSize {
    fn from(raw: i64) -> Self {
        u64::try_from(raw).map(SetSize::Known).unwrap_or(SetSize::Unknown)
    }
}

impl fmt::Display for SetSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SetSize::Unknown => f.write_str("unknown"),
            SetSize::Known(count) => write!(f, "{count}"),
        }
    }
}

/// Descriptive summary of a record set's contents.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SetMetadata {
    record_type: RecordType,
    #[serde(default)]
    size: SetSize,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    field_types: FieldTypeMap,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    properties: PropertyMap,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    field_properties: IndexMap<FieldName, PropertyMap>,
}

impl SetMetadata {
    /// Metadata with unknown size and no field information.
    pub fn new(record_type: RecordType) -> Self {
        Self {
            record_type,
            size: SetSize::Unknown,
            field_types: FieldTypeMap::new(),
            properties: PropertyMap::new(),
            field_properties: IndexMap::new(),
        }
    }

    /// Builder-style size.
    pub fn with_size(mut self, size: SetSize) -> Self {
        self.size = size;
        self
    }

    /// Builder-style field types.
    pub fn with_field_types(mut self, field_types: FieldTypeMap) -> Self {
        self.field_types = field_types;
        self
    }

    /// Record type tag.
    pub fn record_type(&self) -> RecordType {
        self.record_type
    }

    /// Record count.
    pub fn size(&self) -> SetSize {
        self.size
    }

    /// Overwrite the record count.
    pub fn set_size(&mut self, size: SetSize) {
        self.size = size;
    }

    /// Value type of every typed field.
    pub fn field_types(&self) -> &FieldTypeMap {
        &self.field_types
    }

    /// Value type of `field`.
    pub fn field_type(&self, field: &str) -> Option<ValueType> {
        self.field_types.get(field).copied()
    }

    /// Explicitly set the type of a field, replacing any previous entry.
    pub fn set_field_type(&mut self, field: impl Into<FieldName>, value_type: ValueType) {
        self.field_types.insert(field.into(), value_type);
    }

    /// Replace the whole field-type map and prune field properties of fields no
    /// longer present.
    pub fn replace_field_types(&mut self, field_types: FieldTypeMap) {
        self.field_properties
            .retain(|field, _| field_types.contains_key(field));
        self.field_types = field_types;
    }

    /// Set-level properties.
    pub fn properties(&self) -> &PropertyMap {
        &self.properties
    }

    /// One set-level property.
    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    /// Set a set-level property, returning the previous value.
    pub fn put_property(&mut self, key: impl Into<PropertyKey>, value: Value) -> Option<Value> {
        self.properties.insert(key.into(), value)
    }

    /// Per-field properties.
    pub fn field_properties(&self) -> &IndexMap<FieldName, PropertyMap> {
        &self.field_properties
    }

    /// One property of `field`.
    pub fn field_property(&self, field: &str, key: &str) -> Option<&Value> {
        self.field_properties.get(field).and_then(|props| props.get(key))
    }

    /// Set a field property. Setting `null` clears it.
    pub fn put_field_property(
        &mut self,
        field: &str,
        key: impl Into<PropertyKey>,
        value: Value,
    ) -> Option<Value> {
        let key = key.into();
        if value.is_null() {
            return self.clear_field_property(field, &key);
        }
        self.field_properties
            .entry(field.to_string())
            .or_default()
            .insert(key, value)
    }

    /// Remove one property of `field`.
    pub fn clear_field_property(&mut self, field: &str, key: &str) -> Option<Value> {
        self.field_properties
            .get_mut(field)
            .and_then(|props| props.shift_remove(key))
    }

    /// Collect one property across all fields, keyed by field name.
    pub fn collect_field_properties(&self, key: &str) -> IndexMap<FieldName, Value> {
        self.field_properties
            .iter()
            .filter_map(|(field, props)| props.get(key).map(|v| (field.clone(), v.clone())))
            .collect()
    }

    /// Register a new field: its type plus `created`, `source` and `description`
    /// field properties, and a dataset history entry.
    ///
    /// Returns the timestamp used so callers can stamp further properties.
    pub fn create_field(
        &mut self,
        name: &str,
        source: Option<&str>,
        description: Option<&str>,
        value_type: Option<ValueType>,
    ) -> String {
        let now = now();
        self.put_field_property(name, PROP_CREATED, Value::String(now.clone()));
        if let Some(value_type) = value_type {
            self.field_types.insert(name.to_string(), value_type);
        }
        if let Some(source) = source {
            self.put_field_property(name, PROP_SOURCE, Value::String(source.to_string()));
        }
        if let Some(description) = description {
            self.put_field_property(
                name,
                PROP_DESCRIPTION,
                Value::String(description.to_string()),
            );
        }
        self.append_history_at(&format!("Added field {name}"), &now);
        now
    }

    /// Append a timestamped line to the dataset history.
    pub fn append_history(&mut self, message: &str) {
        self.append_history_at(message, &now());
    }

    fn append_history_at(&mut self, message: &str, timestamp: &str) {
        let entry = format!("[{timestamp}] {message}");
        let updated = match self.properties.get(PROP_HISTORY).and_then(Value::as_str) {
            Some(existing) => format!("{existing}{HISTORY_SEPARATOR}{entry}"),
            None => entry,
        };
        self.properties
            .insert(PROP_HISTORY.to_string(), Value::String(updated));
    }

    /// Append a timestamped line to one field's history.
    pub fn append_field_history(&mut self, field: &str, message: &str) {
        let entry = format!("[{}] {message}", now());
        let updated = match self
            .field_property(field, PROP_HISTORY)
            .and_then(Value::as_str)
        {
            Some(existing) => format!("{existing}{HISTORY_SEPARATOR}{entry}"),
            None => entry,
        };
        self.put_field_property(field, PROP_HISTORY, Value::String(updated));
    }

    /// Combine several metadata records into one.
    ///
    /// Zero inputs yield `None` and one input is returned unchanged. Otherwise
    /// the record type of the first input is kept, later field types and
    /// properties override earlier ones, and the size is kept only when every
    /// input agrees; disagreeing sizes collapse to `Known(0)`.
    pub fn merge<'a, I>(metadatas: I) -> Option<SetMetadata>
    where
        I: IntoIterator<Item = &'a SetMetadata>,
    {
        let all: Vec<&SetMetadata> = metadatas.into_iter().collect();
        let (first, rest) = all.split_first()?;
        if rest.is_empty() {
            return Some((*first).clone());
        }
        let mut merged = (*first).clone();
        for meta in rest {
            if meta.record_type != merged.record_type {
                info!(
                    kept = %merged.record_type,
                    other = %meta.record_type,
                    "merging metadata of differing record types"
                );
            }
            if merged.size != meta.size {
                merged.size = SetSize::Known(0);
            }
            for (field, value_type) in &meta.field_types {
                if let Some(previous) = merged.field_types.insert(field.clone(), *value_type)
                    && previous != *value_type
                {
                    warn!(
                        field = %field,
                        previous = %previous,
                        replacement = %value_type,
                        "field type conflict while merging metadata"
                    );
                }
            }
            for (key, value) in &meta.properties {
                merged.properties.insert(key.clone(), value.clone());
            }
            for (field, props) in &meta.field_properties {
                let target = merged.field_properties.entry(field.clone()).or_default();
                for (key, value) in props {
                    target.insert(key.clone(), value.clone());
                }
            }
        }
        Some(merged)
    }

    /// Serialize as a JSON document.
    pub fn to_json(&self) -> Result<String, DatasetError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a JSON document produced by [`SetMetadata::to_json`].
    pub fn from_json(json: &str) -> Result<Self, DatasetError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Parse a JSON document from `reader`.
    pub fn from_reader(reader: impl Read) -> Result<Self, DatasetError> {
        Ok(serde_json::from_reader(reader)?)
    }
}

impl fmt::Display for SetMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SetMetadata [size:{} type:{} fields:[",
            self.size, self.record_type
        )?;
        for (idx, (field, value_type)) in self.field_types.iter().enumerate() {
            if idx > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{field}:{value_type}")?;
        }
        f.write_str("]]")
    }
}

fn now() -> String {
    Utc::now().format(HISTORY_DATE_FORMAT).to_string()
}
