//! Represents an object stored by the catalog server.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Metadata row for one stored object.
///
/// The payload bytes live on disk under the storage directory; this struct
/// only tracks where the object sits in the field/category hierarchy and
/// what was uploaded.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct StoredObject {
    /// Internal UUID for DB indexing.
    pub id: Uuid,

    /// Full object key, unique across the store.
    pub key: String,

    /// Field segment of the key.
    pub field: String,

    /// Category segment of the key.
    pub category: String,

    /// Filename segment of the key.
    pub filename: String,

    /// Content type (MIME type) supplied at upload time.
    pub content_type: Option<String>,

    /// Size in bytes.
    pub size_bytes: i64,

    /// MD5 checksum computed while streaming the upload.
    pub etag: Option<String>,

    /// Timestamp of the most recent upload to this key.
    pub last_modified: DateTime<Utc>,
}
