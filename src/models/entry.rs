//! File entries and search hits materialized from object keys.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One file as surfaced by a `FilesOf` listing.
///
/// Carries the parsed key segments plus whatever metadata the catalog
/// backend reported. Size and timestamp are optional because some listing
/// sources only return bare keys.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    /// Top-level field the file belongs to.
    pub field: String,

    /// Category within the field.
    pub category: String,

    /// Filename segment, kept verbatim (may contain further separators).
    pub filename: String,

    /// Size in bytes, when the backend reported one.
    pub size: Option<i64>,

    /// Last-modified timestamp, when the backend reported one.
    pub last_modified: Option<DateTime<Utc>>,
}

/// Search projection of a file: just the three segments, no metadata.
///
/// Results from field- and global-scope searches carry enough to render a
/// hit and navigate to it, nothing more.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub field: String,
    pub category: String,
    pub filename: String,
}

impl From<&FileEntry> for SearchHit {
    fn from(entry: &FileEntry) -> Self {
        Self {
            field: entry.field.clone(),
            category: entry.category.clone(),
            filename: entry.filename.clone(),
        }
    }
}
