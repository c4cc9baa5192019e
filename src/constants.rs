/// Constants used by dataset metadata properties.
pub mod metadata {
    /// Dataset/field property holding a free-text description.
    pub const PROP_DESCRIPTION: &str = "description";
    /// Field property naming the producer of a field.
    pub const PROP_SOURCE: &str = "source";
    /// Field property holding the creation timestamp of a field.
    pub const PROP_CREATED: &str = "created";
    /// Dataset/field property holding timestamped history lines.
    pub const PROP_HISTORY: &str = "history";
    /// `chrono` format used for `created` and history timestamps.
    pub const HISTORY_DATE_FORMAT: &str = "%d-%b-%Y %H:%M:%S %Z";
    /// Separator between concatenated history/description entries.
    pub const HISTORY_SEPARATOR: &str = "\n";
}

/// Constants used by serialized record-set artifacts.
pub mod artifacts {
    /// Default artifact name for the record data (JSON Lines).
    pub const DATA_NAME: &str = "data";
    /// Default artifact name for the metadata document.
    pub const METADATA_NAME: &str = "metadata";
    /// Filename suffix marking gzip-compressed files.
    pub const GZIP_SUFFIX: &str = ".gz";
    /// Leading magic bytes of a gzip stream.
    pub const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
}

/// Media types served by the default handler registry.
pub mod media {
    /// Record set metadata document.
    pub const METADATA_JSON: &str = "application/x-recordset-metadata+json";
    /// Basic record JSON Lines content.
    pub const BASIC_RECORD_JSON: &str = "application/x-basic-record+json";
    /// Molecule record JSON Lines content.
    pub const MOLECULE_RECORD_JSON: &str = "application/x-molecule-record+json";
    /// Record set of basic records.
    pub const BASIC_RECORD_SET: &str = "application/x-recordset-basic+json";
    /// Record set of molecule records.
    pub const MOLECULE_RECORD_SET: &str = "application/x-recordset-molecule+json";
    /// Fallback content type for unknown byte streams.
    pub const OCTET_STREAM: &str = "application/octet-stream";
}

/// Constants used by thin execution.
pub mod thin {
    /// Default input name for thin descriptors.
    pub const DEFAULT_INPUT: &str = "input";
    /// Default output name for thin descriptors.
    pub const DEFAULT_OUTPUT: &str = "output";
    /// Filtering flag assumed when a descriptor leaves it unset.
    pub const DEFAULT_FILTERING: bool = false;
    /// Preserve flag assumed when a descriptor leaves it unset.
    pub const DEFAULT_PRESERVE: bool = true;
    /// Log message used when a stage result has no cached original.
    pub const CACHE_MISS_MSG: &str = "record not found in recombination cache; dropping result";
}
