//! src/services/store.rs
//!
//! StoreService — the catalog server's storage core, backed by SQLite for
//! metadata and local disk for payloads. Objects live on disk mirroring
//! their key layout (`base_path/<field>/<category>/<filename>`) so the
//! tree stays inspectable; listings come from SQLite, which indexes the
//! parsed key segments.

use crate::{key::KeyCodec, models::object::StoredObject};
use bytes::Bytes;
use chrono::Utc;
use futures::{Stream, StreamExt, pin_mut};
use md5::Context;
use sqlx::SqlitePool;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    sync::Arc,
};
use thiserror::Error;
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::debug;
use uuid::Uuid;

const MIGRATIONS_SQL: &str = include_str!("../../migrations/0001_init.sql");

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object `{0}` not found")]
    ObjectNotFound(String),
    #[error("object `{key}` exceeds the {limit}-byte upload limit")]
    ObjectTooLarge { key: String, limit: u64 },
    #[error("invalid object key: {0}")]
    InvalidKey(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// StoreService provides the operations the catalog API needs:
/// - Upload an object (stream bytes to disk, upsert metadata into SQLite)
/// - Get an object (metadata from SQLite, payload handle from disk)
/// - List distinct fields, categories of a field, files of a category
///
/// Deliberately small: no versioning, no delete, no multi-tenancy. One
/// namespace, overwrite-on-reupload.
#[derive(Clone)]
pub struct StoreService {
    /// Shared SQLite connection pool used for metadata operations.
    pub db: Arc<SqlitePool>,

    /// Base directory on disk where object payloads are stored.
    pub base_path: PathBuf,

    codec: KeyCodec,
}

impl StoreService {
    /// Create a StoreService over the given pool, payload directory, and
    /// key codec.
    pub fn new(db: Arc<SqlitePool>, base_path: impl Into<PathBuf>, codec: KeyCodec) -> Self {
        Self {
            db,
            base_path: base_path.into(),
            codec,
        }
    }

    /// Apply the schema to a pool. Idempotent; runs at server startup and
    /// in tests against in-memory databases.
    pub async fn migrate(db: &SqlitePool) -> StoreResult<()> {
        for statement in MIGRATIONS_SQL.split(';') {
            let statement = statement.trim();
            if statement.is_empty() {
                continue;
            }
            sqlx::query(statement).execute(db).await?;
        }
        Ok(())
    }

    pub fn codec(&self) -> &KeyCodec {
        &self.codec
    }

    /// Reject keys that could escape the storage directory.
    ///
    /// The codec already enforces the root and segment structure; this
    /// adds the filesystem-level concerns: no control bytes, no
    /// backslashes, no `.`/`..` path segments anywhere in the key.
    fn ensure_key_safe(&self, key: &str) -> StoreResult<()> {
        if key
            .bytes()
            .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0')
        {
            return Err(StoreError::InvalidKey(
                "key contains control characters or backslashes".to_string(),
            ));
        }
        if key.split('/').any(|segment| segment == "." || segment == "..") {
            return Err(StoreError::InvalidKey(
                "key contains dot path segments".to_string(),
            ));
        }
        Ok(())
    }

    /// Parse and vet a key for storage use.
    fn checked_parts(&self, key: &str) -> StoreResult<crate::key::KeyParts> {
        self.ensure_key_safe(key)?;
        let parts = self
            .codec
            .parse(key)
            .map_err(|err| StoreError::InvalidKey(err.to_string()))?;
        if parts.is_placeholder() {
            return Err(StoreError::InvalidKey(
                "keys ending in the separator are folder placeholders".to_string(),
            ));
        }
        Ok(parts)
    }

    /// Payload path mirroring the key layout under the base directory.
    fn object_path(&self, parts: &crate::key::KeyParts) -> PathBuf {
        let mut path = self.base_path.join(&parts.field);
        path.push(&parts.category);
        path.push(&parts.filename);
        path
    }

    /// Stream-upload an object to disk and upsert its metadata.
    ///
    /// - Writes bytes incrementally to a temporary file.
    /// - Computes MD5/etag and size while streaming.
    /// - Enforces `max_bytes` mid-stream, before the disk fills.
    /// - Atomically renames into the final location.
    /// - Upserts the metadata row (re-upload overwrites).
    ///
    /// Ensures durable writes (fsync) and cleans up temp files on errors.
    pub async fn upload_object_stream<S>(
        &self,
        key: &str,
        content_type: Option<String>,
        max_bytes: u64,
        stream: S,
    ) -> StoreResult<StoredObject>
    where
        S: Stream<Item = io::Result<Bytes>> + Send + 'static,
    {
        let parts = self.checked_parts(key)?;

        let file_path = self.object_path(&parts);
        let parent = file_path.parent().map(Path::to_path_buf).ok_or_else(|| {
            StoreError::Io(io::Error::new(
                ErrorKind::Other,
                "object path missing parent directory",
            ))
        })?;
        fs::create_dir_all(&parent).await?;
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));
        let mut file = File::create(&tmp_path).await?;

        let mut size_bytes: i64 = 0;
        let mut digest = Context::new();
        pin_mut!(stream);
        while let Some(chunk_res) = stream.next().await {
            let chunk = match chunk_res {
                Ok(chunk) => chunk,
                Err(err) => {
                    let _ = fs::remove_file(&tmp_path).await;
                    return Err(StoreError::Io(err));
                }
            };
            size_bytes += chunk.len() as i64;
            if size_bytes as u64 > max_bytes {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(StoreError::ObjectTooLarge {
                    key: key.to_string(),
                    limit: max_bytes,
                });
            }
            digest.consume(&chunk);
            if let Err(err) = file.write_all(&chunk).await {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(StoreError::Io(err));
            }
        }
        if let Err(err) = file.flush().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StoreError::Io(err));
        }
        if let Err(err) = file.sync_all().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StoreError::Io(err));
        }

        if let Err(err) = fs::rename(&tmp_path, &file_path).await {
            if err.kind() == ErrorKind::AlreadyExists {
                fs::remove_file(&file_path).await?;
                fs::rename(&tmp_path, &file_path).await?;
            } else {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(StoreError::Io(err));
            }
        }

        let last_modified = Utc::now();
        let etag = format!("{:x}", digest.compute());

        let insert_result = sqlx::query_as::<_, StoredObject>(
            r#"
            INSERT INTO objects (
                id, key, field, category, filename, content_type,
                size_bytes, etag, last_modified
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                content_type = excluded.content_type,
                size_bytes = excluded.size_bytes,
                etag = excluded.etag,
                last_modified = excluded.last_modified
            RETURNING id, key, field, category, filename, content_type,
                      size_bytes, etag, last_modified
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(key)
        .bind(&parts.field)
        .bind(&parts.category)
        .bind(&parts.filename)
        .bind(content_type)
        .bind(size_bytes)
        .bind(&etag)
        .bind(last_modified)
        .fetch_one(&*self.db)
        .await;

        match insert_result {
            Ok(object) => {
                debug!("stored `{}` ({} bytes, etag {})", key, size_bytes, etag);
                Ok(object)
            }
            Err(err) => {
                let _ = fs::remove_file(&file_path).await;
                Err(StoreError::Sqlx(err))
            }
        }
    }

    /// Fetch an object for reading.
    ///
    /// Returns metadata and an opened File handle ready for streaming out.
    /// Returns ObjectNotFound if metadata exists but the file is missing.
    pub async fn get_object_reader(&self, key: &str) -> StoreResult<(StoredObject, File)> {
        let parts = self.checked_parts(key)?;
        let object = sqlx::query_as::<_, StoredObject>(
            "SELECT id, key, field, category, filename, content_type,
                    size_bytes, etag, last_modified
             FROM objects WHERE key = ?",
        )
        .bind(key)
        .fetch_one(&*self.db)
        .await
        .map_err(|err| match err {
            sqlx::Error::RowNotFound => StoreError::ObjectNotFound(key.to_string()),
            other => StoreError::Sqlx(other),
        })?;

        let file_path = self.object_path(&parts);
        let file = File::open(&file_path).await.map_err(|err| {
            if err.kind() == io::ErrorKind::NotFound {
                StoreError::ObjectNotFound(key.to_string())
            } else {
                StoreError::Io(err)
            }
        })?;

        Ok((object, file))
    }

    /// Distinct field names, sorted.
    pub async fn list_fields(&self) -> StoreResult<Vec<String>> {
        let fields =
            sqlx::query_scalar::<_, String>("SELECT DISTINCT field FROM objects ORDER BY field ASC")
                .fetch_all(&*self.db)
                .await?;
        Ok(fields)
    }

    /// Distinct category names under one field, sorted.
    pub async fn list_categories(&self, field: &str) -> StoreResult<Vec<String>> {
        let categories = sqlx::query_scalar::<_, String>(
            "SELECT DISTINCT category FROM objects WHERE field = ? ORDER BY category ASC",
        )
        .bind(field)
        .fetch_all(&*self.db)
        .await?;
        Ok(categories)
    }

    /// Every object under one field/category, sorted by filename without
    /// regard to case.
    pub async fn list_files(&self, field: &str, category: &str) -> StoreResult<Vec<StoredObject>> {
        let objects = sqlx::query_as::<_, StoredObject>(
            "SELECT id, key, field, category, filename, content_type,
                    size_bytes, etag, last_modified
             FROM objects WHERE field = ? AND category = ?
             ORDER BY LOWER(filename) ASC",
        )
        .bind(field)
        .bind(category)
        .fetch_all(&*self.db)
        .await?;
        Ok(objects)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use sqlx::sqlite::SqlitePoolOptions;
    use tempfile::TempDir;

    const TEST_MAX_BYTES: u64 = 1024 * 1024;

    async fn test_store() -> (StoreService, TempDir) {
        let tmp = TempDir::new().unwrap();
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        StoreService::migrate(&pool).await.unwrap();
        let store = StoreService::new(Arc::new(pool), tmp.path(), KeyCodec::default());
        (store, tmp)
    }

    fn byte_stream(chunks: Vec<&'static [u8]>) -> impl Stream<Item = io::Result<Bytes>> + Send {
        stream::iter(
            chunks
                .into_iter()
                .map(|chunk| Ok(Bytes::from_static(chunk))),
        )
    }

    #[tokio::test]
    async fn upload_then_read_round_trips() {
        let (store, _tmp) = test_store().await;
        let key = "uploadedfiles/IT/Linux Notes/setup.pdf";

        let object = store
            .upload_object_stream(
                key,
                Some("application/pdf".to_string()),
                TEST_MAX_BYTES,
                byte_stream(vec![b"hello ", b"world"]),
            )
            .await
            .unwrap();
        assert_eq!(object.size_bytes, 11);
        assert_eq!(object.field, "IT");
        assert_eq!(object.category, "Linux Notes");
        assert_eq!(object.filename, "setup.pdf");
        assert_eq!(object.etag.as_deref(), Some("5eb63bbbe01eeed093cb22bb8f5acdc3"));

        let (meta, file) = store.get_object_reader(key).await.unwrap();
        assert_eq!(meta.size_bytes, 11);
        let mut contents = Vec::new();
        let mut reader = tokio::io::BufReader::new(file);
        tokio::io::AsyncReadExt::read_to_end(&mut reader, &mut contents)
            .await
            .unwrap();
        assert_eq!(contents, b"hello world");
    }

    #[tokio::test]
    async fn reupload_overwrites_the_previous_object() {
        let (store, _tmp) = test_store().await;
        let key = "uploadedfiles/IT/Linux Notes/setup.pdf";

        let first = store
            .upload_object_stream(key, None, TEST_MAX_BYTES, byte_stream(vec![b"v1"]))
            .await
            .unwrap();
        let second = store
            .upload_object_stream(key, None, TEST_MAX_BYTES, byte_stream(vec![b"version2"]))
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.size_bytes, 8);
        assert_ne!(first.etag, second.etag);

        let files = store.list_files("IT", "Linux Notes").await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].size_bytes, 8);
    }

    #[tokio::test]
    async fn oversized_upload_is_rejected_mid_stream() {
        let (store, tmp) = test_store().await;
        let key = "uploadedfiles/IT/Linux Notes/big.pdf";

        let err = store
            .upload_object_stream(key, None, 8, byte_stream(vec![b"12345", b"67890"]))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ObjectTooLarge { .. }));

        // No temp file or row left behind.
        let category_dir = tmp.path().join("IT").join("Linux Notes");
        let leftovers = std::fs::read_dir(&category_dir)
            .map(|entries| entries.count())
            .unwrap_or(0);
        assert_eq!(leftovers, 0);
        assert!(matches!(
            store.get_object_reader(key).await.unwrap_err(),
            StoreError::ObjectNotFound(_)
        ));
    }

    #[tokio::test]
    async fn traversal_keys_are_rejected() {
        let (store, _tmp) = test_store().await;

        for key in [
            "uploadedfiles/../etc/passwd",
            "uploadedfiles/IT/../../etc/passwd",
            "uploadedfiles/IT/Notes/..",
            "uploadedfiles/IT/Notes/sub\\dir",
        ] {
            let err = store
                .upload_object_stream(key, None, TEST_MAX_BYTES, byte_stream(vec![b"x"]))
                .await
                .unwrap_err();
            assert!(matches!(err, StoreError::InvalidKey(_)), "key: {key}");
        }
    }

    #[tokio::test]
    async fn placeholder_and_foreign_keys_are_rejected() {
        let (store, _tmp) = test_store().await;

        let err = store
            .upload_object_stream(
                "uploadedfiles/IT/Linux Notes/",
                None,
                TEST_MAX_BYTES,
                byte_stream(vec![b"x"]),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidKey(_)));

        let err = store
            .upload_object_stream(
                "elsewhere/IT/Linux Notes/a.pdf",
                None,
                TEST_MAX_BYTES,
                byte_stream(vec![b"x"]),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidKey(_)));
    }

    #[tokio::test]
    async fn listings_are_distinct_and_sorted() {
        let (store, _tmp) = test_store().await;
        for key in [
            "uploadedfiles/IT/Security/policy.pdf",
            "uploadedfiles/IT/Linux Notes/setup.pdf",
            "uploadedfiles/IT/Linux Notes/Alpha.pdf",
            "uploadedfiles/HR/Payroll/jan.pdf",
        ] {
            store
                .upload_object_stream(key, None, TEST_MAX_BYTES, byte_stream(vec![b"x"]))
                .await
                .unwrap();
        }

        assert_eq!(store.list_fields().await.unwrap(), vec!["HR", "IT"]);
        assert_eq!(
            store.list_categories("IT").await.unwrap(),
            vec!["Linux Notes", "Security"]
        );

        let files = store.list_files("IT", "Linux Notes").await.unwrap();
        let names: Vec<&str> = files.iter().map(|f| f.filename.as_str()).collect();
        // Case-insensitive filename order.
        assert_eq!(names, vec!["Alpha.pdf", "setup.pdf"]);

        assert!(store.list_categories("Legal").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_object_maps_to_not_found() {
        let (store, _tmp) = test_store().await;
        assert!(matches!(
            store
                .get_object_reader("uploadedfiles/IT/Linux Notes/ghost.pdf")
                .await
                .unwrap_err(),
            StoreError::ObjectNotFound(_)
        ));
    }
}
