use std::io;

use thiserror::Error;

use crate::types::{RecordId, RecordType};

/// Error type for record-set consumption, metadata derivation, and thin execution.
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("input not defined or already consumed")]
    AlreadyConsumed,
    #[error("inconsistent record type: previously found {expected} but now encountered {found}")]
    InconsistentType {
        expected: RecordType,
        found: RecordType,
    },
    #[error("record set is of type {found} but {expected} was expected")]
    TypeMismatch {
        expected: RecordType,
        found: RecordType,
    },
    #[error("tapped stream failed: {0}")]
    StreamFailed(String),
    #[error("record {0} not found in recombination cache")]
    CacheMiss(RecordId),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("configuration error: {0}")]
    Configuration(String),
}
