//! src/services/transfer_broker.rs
//!
//! Byte transfers by delegation. The broker asks the catalog for a
//! presigned URL, moves the payload against that URL directly, and then
//! tells the hierarchy cache which scopes the upload made stale. Listing
//! traffic and byte traffic never share a path.

use crate::{
    catalog::{CatalogError, CatalogService},
    config::UploadPolicy,
    key::{KeyParts, sanitize_segment},
    models::{
        scope::ListingScope,
        transfer::{PresignedTransfer, TransferDirection},
    },
    services::hierarchy_cache::HierarchyCache,
};
use bytes::Bytes;
use futures::{StreamExt, stream};
use reqwest::header::CONTENT_TYPE;
use std::{io, sync::Arc};
use thiserror::Error;
use tracing::{debug, warn};

/// Upload payloads stream to the presigned URL in slices this large;
/// progress is reported as each slice is pulled off the wire.
const UPLOAD_CHUNK_BYTES: usize = 64 * 1024;

const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransferError {
    /// A client-side precondition failed. The catalog was never contacted.
    #[error("validation failed: {0}")]
    ValidationFailed(String),
    /// The catalog refused to mint a transfer URL.
    #[error("presign rejected: {0}")]
    PresignRejected(String),
    /// The byte transfer itself failed after a URL was issued.
    #[error("transfer failed: {0}")]
    TransferFailed(String),
}

pub type TransferResult<T> = Result<T, TransferError>;

/// Brokers uploads and downloads for one catalog, and keeps the shared
/// hierarchy cache honest about what an upload changed.
pub struct TransferBroker {
    catalog: Arc<dyn CatalogService>,
    cache: Arc<HierarchyCache>,
    policy: UploadPolicy,
    http: reqwest::Client,
}

impl TransferBroker {
    pub fn new(
        catalog: Arc<dyn CatalogService>,
        cache: Arc<HierarchyCache>,
        policy: UploadPolicy,
    ) -> Self {
        Self {
            catalog,
            cache,
            policy,
            http: reqwest::Client::new(),
        }
    }

    pub fn policy(&self) -> &UploadPolicy {
        &self.policy
    }

    /// Check everything that can be checked without the catalog: segment
    /// names, filename extension, and payload size against the policy.
    pub fn validate_upload(
        &self,
        field: &str,
        category: &str,
        filename: &str,
        size_bytes: u64,
    ) -> TransferResult<()> {
        let (field, category, filename) = sanitized_names(field, category, filename)?;
        debug!("validated upload names `{}`/`{}`/`{}`", field, category, filename);
        if !self.policy.allows(&filename) {
            return Err(TransferError::ValidationFailed(format!(
                "file type of `{filename}` is not allowed"
            )));
        }
        if size_bytes > self.policy.max_upload_bytes {
            return Err(TransferError::ValidationFailed(format!(
                "`{filename}` exceeds the {}-byte upload limit",
                self.policy.max_upload_bytes
            )));
        }
        Ok(())
    }

    /// Ask the catalog for an upload URL. Names are sanitized and policy-
    /// checked first; invalid input never reaches the catalog.
    pub async fn request_upload(
        &self,
        field: &str,
        category: &str,
        filename: &str,
        content_type: &str,
    ) -> TransferResult<PresignedTransfer> {
        let (field, category, filename) = sanitized_names(field, category, filename)?;
        if !self.policy.allows(&filename) {
            return Err(TransferError::ValidationFailed(format!(
                "file type of `{filename}` is not allowed"
            )));
        }
        self.catalog
            .presign_upload(&field, &category, &filename, content_type)
            .await
            .map_err(as_presign_rejection)
    }

    /// Ask the catalog for a download URL for an existing object.
    pub async fn request_download(
        &self,
        field: &str,
        category: &str,
        filename: &str,
    ) -> TransferResult<PresignedTransfer> {
        let (field, category, filename) = sanitized_names(field, category, filename)?;
        self.catalog
            .presign_download(&field, &category, &filename)
            .await
            .map_err(as_presign_rejection)
    }

    /// PUT `payload` against an upload URL, reporting progress as the
    /// bytes go out and invalidating the scopes the upload made stale.
    ///
    /// `on_progress` receives whole percentages, non-decreasing, ending
    /// at 100 exactly when the last byte has been handed to the wire.
    pub async fn perform_upload<F>(
        &self,
        transfer: &PresignedTransfer,
        payload: Bytes,
        mut on_progress: F,
    ) -> TransferResult<()>
    where
        F: FnMut(u8) + Send + 'static,
    {
        if transfer.direction != TransferDirection::Upload {
            return Err(TransferError::ValidationFailed(
                "a download URL cannot accept an upload".to_string(),
            ));
        }

        // Membership is judged against the listings cached *before* the
        // upload: that is the last state the user saw.
        let parts = self.cache.codec().parse(&transfer.key).ok();
        let known_fields = self.cache.peek_fields().await;
        let known_categories = match &parts {
            Some(parts) => self.cache.peek_categories(&parts.field).await,
            None => None,
        };

        let content_type = transfer
            .content_type
            .clone()
            .unwrap_or_else(|| FALLBACK_CONTENT_TYPE.to_string());
        let request = self
            .http
            .put(&transfer.url)
            .header(CONTENT_TYPE, &content_type);

        let total = payload.len();
        let send_result = if total == 0 {
            let result = request.body(Vec::new()).send().await;
            if result.is_ok() {
                on_progress(100);
            }
            result
        } else {
            let mut slices = Vec::with_capacity(total.div_ceil(UPLOAD_CHUNK_BYTES));
            let mut start = 0;
            while start < total {
                let end = (start + UPLOAD_CHUNK_BYTES).min(total);
                slices.push(payload.slice(start..end));
                start = end;
            }

            let mut sent = 0usize;
            let mut last_percent = 0u8;
            let body = stream::iter(slices).map(move |slice| {
                sent += slice.len();
                let percent = ((sent as u64 * 100) / total as u64) as u8;
                if percent != last_percent {
                    last_percent = percent;
                    on_progress(percent);
                }
                Ok::<Bytes, io::Error>(slice)
            });
            request.body(reqwest::Body::wrap_stream(body)).send().await
        };

        match send_result {
            Ok(response) if response.status().is_success() => {}
            Ok(response) => {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                return Err(TransferError::TransferFailed(format!(
                    "upload PUT returned {status}: {body}"
                )));
            }
            Err(err) => return Err(TransferError::TransferFailed(err.to_string())),
        }

        match parts {
            Some(parts) => {
                self.invalidate_after_upload(&parts, known_fields, known_categories)
                    .await;
            }
            None => warn!(
                "uploaded key `{}` does not parse; listings were not invalidated",
                transfer.key
            ),
        }
        Ok(())
    }

    /// GET the object behind a download URL and buffer it.
    pub async fn perform_download(&self, transfer: &PresignedTransfer) -> TransferResult<Bytes> {
        if transfer.direction != TransferDirection::Download {
            return Err(TransferError::ValidationFailed(
                "an upload URL cannot serve a download".to_string(),
            ));
        }
        let response = self
            .http
            .get(&transfer.url)
            .send()
            .await
            .map_err(|err| TransferError::TransferFailed(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(TransferError::TransferFailed(format!(
                "download GET returned {status}: {body}"
            )));
        }
        response
            .bytes()
            .await
            .map_err(|err| TransferError::TransferFailed(err.to_string()))
    }

    /// Validate, presign, and perform one upload end to end. Returns the
    /// transfer so the caller knows the final key.
    pub async fn upload<F>(
        &self,
        field: &str,
        category: &str,
        filename: &str,
        content_type: &str,
        payload: Bytes,
        on_progress: F,
    ) -> TransferResult<PresignedTransfer>
    where
        F: FnMut(u8) + Send + 'static,
    {
        self.validate_upload(field, category, filename, payload.len() as u64)?;
        let transfer = self
            .request_upload(field, category, filename, content_type)
            .await?;
        self.perform_upload(&transfer, payload, on_progress).await?;
        Ok(transfer)
    }

    /// Drop the scopes an upload changed. The files listing is always
    /// stale; category and field listings only if the upload introduced a
    /// name they did not contain. With no cached listing to compare
    /// against, new is assumed and the ancestor is invalidated too.
    async fn invalidate_after_upload(
        &self,
        parts: &KeyParts,
        known_fields: Option<Arc<Vec<String>>>,
        known_categories: Option<Arc<Vec<String>>>,
    ) {
        self.cache
            .invalidate(&ListingScope::files_of(&parts.field, &parts.category))
            .await;

        let category_known = known_categories
            .map(|categories| categories.iter().any(|name| name == &parts.category))
            .unwrap_or(false);
        if !category_known {
            self.cache
                .invalidate(&ListingScope::categories_of(&parts.field))
                .await;
        }

        let field_known = known_fields
            .map(|fields| fields.iter().any(|name| name == &parts.field))
            .unwrap_or(false);
        if !field_known {
            self.cache.invalidate(&ListingScope::Fields).await;
        }

        debug!(
            "upload to `{}`/`{}` invalidated listings (new category: {}, new field: {})",
            parts.field, parts.category, !category_known, !field_known
        );
    }
}

fn sanitized_names(
    field: &str,
    category: &str,
    filename: &str,
) -> TransferResult<(String, String, String)> {
    let field = sanitize_segment(field);
    let category = sanitize_segment(category);
    let filename = sanitize_segment(filename);
    if field.is_empty() || category.is_empty() || filename.is_empty() {
        return Err(TransferError::ValidationFailed(
            "field, category, and filename are required".to_string(),
        ));
    }
    Ok((field, category, filename))
}

fn as_presign_rejection(err: CatalogError) -> TransferError {
    TransferError::PresignRejected(err.detail().to_string())
}
