//! Presigned transfer descriptors handed out by the catalog service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which way the bytes flow once the URL is used.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransferDirection {
    Upload,
    Download,
}

/// A short-lived capability URL for one object.
///
/// Whoever holds the URL can perform exactly one kind of operation on
/// exactly one key until `expires_at`; no other credentials are involved.
/// The catalog client never inspects the URL, it only hands it to the
/// transfer layer.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PresignedTransfer {
    /// Fully-qualified URL to PUT or GET.
    pub url: String,

    /// The object key the URL was minted for.
    pub key: String,

    /// Upload or download.
    pub direction: TransferDirection,

    /// Expiry instant, when the issuer reported one.
    pub expires_at: Option<DateTime<Utc>>,

    /// Content type bound into an upload URL; `None` for downloads.
    pub content_type: Option<String>,
}
