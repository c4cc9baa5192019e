#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

/// Recombination caches for thin round trips.
pub mod cache;
/// Artifact and execution configuration types.
pub mod config;
/// Centralized constants used across record sets, metadata, and thin execution.
pub mod constants;
/// Record types.
pub mod data;
/// Set metadata and merging.
pub mod metadata;
/// Round-trip counters.
pub mod metrics;
/// Record sets and their representations.
pub mod record_set;
/// Record type to media type handlers.
pub mod registry;
/// Metadata derivation over single-pass streams.
pub mod tap;
/// Thin projection and recombination.
pub mod thin;
/// Byte sources backing serialized record sets (memory and filesystem).
pub mod transport;
/// Shared type aliases.
pub mod types;

mod errors;

pub use cache::{CacheStrategy, RecombinationCache};
pub use config::{DatasetConfig, ExecutionOptions};
pub use data::{AnyRecord, BasicRecord, FieldMap, MoleculeRecord, Record};
pub use errors::DatasetError;
pub use metadata::{SetMetadata, SetSize};
pub use metrics::{RoundTripCounters, RoundTripStats};
pub use record_set::{RecordIter, RecordSet, RecordStream, RepresentationKind};
pub use registry::{HandlerRegistry, TypeHandler};
pub use tap::{Completion, MetadataHandle, MetadataTap, SharedMetadata};
pub use thin::{ThinDescriptor, ThinFieldRule, ThinProjector};
pub use transport::{ByteSource, BytesSource, FileSource, ReaderSource};
pub use types::{
    FieldName, LogMessage, MediaType, OptionName, PropertyKey, RecordId, RecordType, ValueType,
};
