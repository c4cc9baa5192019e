use std::borrow::Cow;

use indexmap::IndexMap;
use serde_json::Value;

use crate::constants::artifacts::{DATA_NAME, METADATA_NAME};
use crate::types::OptionName;

/// Execution options consulted by option-driven thin field rules.
pub type ExecutionOptions = IndexMap<OptionName, Value>;

/// Controls how record sets are turned into persisted artifacts.
#[derive(Clone, Debug)]
pub struct DatasetConfig {
    /// Gzip the record data artifact.
    pub gzip_data: bool,
    /// Name given to the record data artifact.
    pub data_name: Cow<'static, str>,
    /// Name given to the metadata artifact.
    pub metadata_name: Cow<'static, str>,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            gzip_data: true,
            data_name: Cow::Borrowed(DATA_NAME),
            metadata_name: Cow::Borrowed(METADATA_NAME),
        }
    }
}
