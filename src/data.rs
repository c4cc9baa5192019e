use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use crate::types::{FieldName, RecordId, RecordType};

/// Ordered field-value map carried by every record.
pub type FieldMap = IndexMap<FieldName, Value>;

/// A domain record that can flow through a `RecordSet`.
///
/// The set of implementors is closed: [`BasicRecord`], [`MoleculeRecord`] and the
/// tagged union [`AnyRecord`].
pub trait Record: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
    /// Record type assumed for sets of this Rust type when no metadata says otherwise.
    const DEFAULT_TYPE: RecordType;

    /// Identity shared by a record and all of its clones and projections.
    fn id(&self) -> RecordId;
    /// Kind tag of this instance.
    fn record_type(&self) -> RecordType;
    /// Field values.
    fn values(&self) -> &FieldMap;
    /// Mutable field values.
    fn values_mut(&mut self) -> &mut FieldMap;
    /// Widen into the tagged union.
    fn into_any(self) -> AnyRecord;
    /// Narrow from the tagged union; `None` when the kind is not assignable.
    fn from_any(record: AnyRecord) -> Option<Self>;

    /// Clone with identity and core payload kept and every field value cleared.
    fn bare(&self) -> Self {
        let mut bare = self.clone();
        bare.values_mut().clear();
        bare
    }

    /// Value of `field`, if set.
    fn value(&self, field: &str) -> Option<&Value> {
        self.values().get(field)
    }

    /// Set `field`, returning the previous value.
    fn put_value(&mut self, field: impl Into<FieldName>, value: Value) -> Option<Value> {
        self.values_mut().insert(field.into(), value)
    }
}

/// Record carrying only an identity and field values.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BasicRecord {
    /// Process-unique identity.
    pub id: RecordId,
    /// Field values.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub values: FieldMap,
}

impl BasicRecord {
    /// Create a record with a fresh identity.
    pub fn new(values: FieldMap) -> Self {
        Self::with_id(RecordId::new_v4(), values)
    }

    /// Create a record with a known identity.
    pub fn with_id(id: RecordId, values: FieldMap) -> Self {
        Self { id, values }
    }
}

impl Record for BasicRecord {
    const DEFAULT_TYPE: RecordType = RecordType::Basic;

    fn id(&self) -> RecordId {
        self.id
    }

    fn record_type(&self) -> RecordType {
        RecordType::Basic
    }

    fn values(&self) -> &FieldMap {
        &self.values
    }

    fn values_mut(&mut self) -> &mut FieldMap {
        &mut self.values
    }

    fn into_any(self) -> AnyRecord {
        AnyRecord::Basic(self)
    }

    fn from_any(record: AnyRecord) -> Option<Self> {
        match record {
            AnyRecord::Basic(record) => Some(record),
            // Molecules are assignable to basic records; the structure is not carried.
            AnyRecord::Molecule(record) => Some(BasicRecord {
                id: record.id,
                values: record.values,
            }),
        }
    }
}

/// Record carrying a molecular structure in its original textual form.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MoleculeRecord {
    /// Process-unique identity.
    pub id: RecordId,
    /// Structure source (smiles, molfile, inchi, ...).
    pub source: String,
    /// Optional format hint for `source`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    /// Field values.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub values: FieldMap,
}

impl MoleculeRecord {
    /// Create a molecule with a fresh identity and no values.
    pub fn new(source: impl Into<String>, format: Option<&str>) -> Self {
        Self::with_id(RecordId::new_v4(), source, format)
    }

    /// Create a molecule with a known identity and no values.
    pub fn with_id(id: RecordId, source: impl Into<String>, format: Option<&str>) -> Self {
        Self {
            id,
            source: source.into(),
            format: format.map(str::to_string),
            values: FieldMap::new(),
        }
    }

    /// Builder-style value insertion.
    pub fn with_value(mut self, field: impl Into<FieldName>, value: Value) -> Self {
        self.values.insert(field.into(), value);
        self
    }
}

impl Record for MoleculeRecord {
    const DEFAULT_TYPE: RecordType = RecordType::Molecule;

    fn id(&self) -> RecordId {
        self.id
    }

    fn record_type(&self) -> RecordType {
        RecordType::Molecule
    }

    fn values(&self) -> &FieldMap {
        &self.values
    }

    fn values_mut(&mut self) -> &mut FieldMap {
        &mut self.values
    }

    fn into_any(self) -> AnyRecord {
        AnyRecord::Molecule(self)
    }

    fn from_any(record: AnyRecord) -> Option<Self> {
        match record {
            AnyRecord::Molecule(record) => Some(record),
            AnyRecord::Basic(_) => None,
        }
    }
}

/// Tagged union over every record kind.
///
/// Used where the kind is only known at runtime, e.g. records deserialized from a
/// stage response.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum AnyRecord {
    /// A basic record.
    Basic(BasicRecord),
    /// A molecule record.
    Molecule(MoleculeRecord),
}

impl Record for AnyRecord {
    const DEFAULT_TYPE: RecordType = RecordType::Basic;

    fn id(&self) -> RecordId {
        match self {
            AnyRecord::Basic(record) => record.id,
            AnyRecord::Molecule(record) => record.id,
        }
    }

    fn record_type(&self) -> RecordType {
        match self {
            AnyRecord::Basic(_) => RecordType::Basic,
            AnyRecord::Molecule(_) => RecordType::Molecule,
        }
    }

    fn values(&self) -> &FieldMap {
        match self {
            AnyRecord::Basic(record) => &record.values,
            AnyRecord::Molecule(record) => &record.values,
        }
    }

    fn values_mut(&mut self) -> &mut FieldMap {
        match self {
            AnyRecord::Basic(record) => &mut record.values,
            AnyRecord::Molecule(record) => &mut record.values,
        }
    }

    fn into_any(self) -> AnyRecord {
        self
    }

    fn from_any(record: AnyRecord) -> Option<Self> {
        Some(record)
    }
}

impl From<BasicRecord> for AnyRecord {
    fn from(record: BasicRecord) -> Self {
        AnyRecord::Basic(record)
    }
}

impl From<MoleculeRecord> for AnyRecord {
    fn from(record: MoleculeRecord) -> Self {
        AnyRecord::Molecule(record)
    }
}
