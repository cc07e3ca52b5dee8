use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Per-series metadata document, persisted next to the chunk files.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct SeriesMeta {
    pub block_size: u32,
    pub max_entries_per_chunk: u32,
    pub last_entry_synced: u64,
    pub page_size: u64,

    /// Free-form user map.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gzip_level: Option<u32>,

    // Present only on the root sub-series of a varlen series.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_field: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length_profile: Option<Vec<u32>>,
}

/// Database-level metadata document (optional, at the database root).
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct DatabaseMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}
