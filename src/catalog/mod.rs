//! The catalog service seam.
//!
//! Everything above this trait (hierarchy cache, search, navigation,
//! transfers) is written against `dyn CatalogService` and never learns
//! which backend answers listings or mints transfer URLs. Two backends
//! ship with the crate: [`RestCatalog`] speaks JSON to the companion API
//! server, [`MemoryCatalog`] serves tests and offline tooling.

use crate::models::transfer::PresignedTransfer;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod memory;
pub mod rest;

pub use memory::MemoryCatalog;
pub use rest::RestCatalog;

/// One raw listing row: a full object key plus whatever metadata the
/// backend tracks for it.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct KeyRecord {
    pub key: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
}

impl KeyRecord {
    /// A record carrying nothing but the key.
    pub fn bare(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            size: None,
            last_modified: None,
        }
    }
}

/// Errors surfaced by catalog backends.
///
/// `Clone` matters here: an in-flight listing shared by several waiters
/// must be able to hand the same failure to each of them.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CatalogError {
    /// A listing call failed in transport or at the service. Nothing was
    /// cached; the next call retries from scratch.
    #[error("listing failed: {0}")]
    ListingFailed(String),
    /// The service declined to mint a transfer URL.
    #[error("presign rejected: {0}")]
    PresignRejected(String),
}

impl CatalogError {
    /// The backend's message without the taxonomy prefix.
    pub fn detail(&self) -> &str {
        match self {
            Self::ListingFailed(detail) | Self::PresignRejected(detail) => detail,
        }
    }
}

pub type CatalogResult<T> = Result<T, CatalogError>;

/// Listings and transfer-URL minting for one object namespace.
#[async_trait]
pub trait CatalogService: Send + Sync {
    /// Names one level below `prefix` — fields under the root, or
    /// categories under a field. Returned sorted, deduplicated.
    async fn list_prefix_children(&self, prefix: &str) -> CatalogResult<Vec<String>>;

    /// Every key under `prefix`, placeholders included. Callers filter.
    async fn list_keys_under(&self, prefix: &str) -> CatalogResult<Vec<KeyRecord>>;

    /// Mint a URL that accepts one PUT of `content_type` bytes for the
    /// key composed from the three segments.
    async fn presign_upload(
        &self,
        field: &str,
        category: &str,
        filename: &str,
        content_type: &str,
    ) -> CatalogResult<PresignedTransfer>;

    /// Mint a URL that serves one GET of the addressed object.
    async fn presign_download(
        &self,
        field: &str,
        category: &str,
        filename: &str,
    ) -> CatalogResult<PresignedTransfer>;
}
