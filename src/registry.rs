use std::collections::HashMap;

use crate::constants::media::{
    BASIC_RECORD_JSON, BASIC_RECORD_SET, METADATA_JSON, MOLECULE_RECORD_JSON, MOLECULE_RECORD_SET,
};
use crate::errors::DatasetError;
use crate::types::{MediaType, RecordType};

/// Per-record-type handling details.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TypeHandler {
    /// Record type handled.
    pub record_type: RecordType,
    /// Media type of the serialized records (JSON Lines).
    pub item_media_type: MediaType,
    /// Media type of a whole record set of this type.
    pub set_media_type: MediaType,
}

/// Explicit lookup table from record type to its handler.
///
/// Build one at startup and pass it to the operations that serialize record
/// sets; there is no process-wide default instance.
#[derive(Clone, Debug)]
pub struct HandlerRegistry {
    handlers: HashMap<RecordType, TypeHandler>,
    metadata_media_type: MediaType,
}

impl HandlerRegistry {
    /// Registry without any record handlers.
    pub fn empty() -> Self {
        Self {
            handlers: HashMap::new(),
            metadata_media_type: METADATA_JSON.to_string(),
        }
    }

    /// Registry with handlers for every built-in record type.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(TypeHandler {
            record_type: RecordType::Basic,
            item_media_type: BASIC_RECORD_JSON.to_string(),
            set_media_type: BASIC_RECORD_SET.to_string(),
        });
        registry.register(TypeHandler {
            record_type: RecordType::Molecule,
            item_media_type: MOLECULE_RECORD_JSON.to_string(),
            set_media_type: MOLECULE_RECORD_SET.to_string(),
        });
        registry
    }

    /// Register (or replace) the handler for `handler.record_type`.
    pub fn register(&mut self, handler: TypeHandler) -> Option<TypeHandler> {
        self.handlers.insert(handler.record_type, handler)
    }

    /// Handler for `record_type`.
    pub fn resolve(&self, record_type: RecordType) -> Result<&TypeHandler, DatasetError> {
        self.handlers.get(&record_type).ok_or_else(|| {
            DatasetError::Configuration(format!("no handler registered for {record_type}"))
        })
    }

    /// Reverse lookup from an item or set media type.
    pub fn record_type_for(&self, media_type: &str) -> Option<RecordType> {
        self.handlers
            .values()
            .find(|handler| {
                handler.item_media_type == media_type || handler.set_media_type == media_type
            })
            .map(|handler| handler.record_type)
    }

    /// Media type of metadata documents.
    pub fn metadata_media_type(&self) -> &str {
        &self.metadata_media_type
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
