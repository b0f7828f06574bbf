//! JSON catalog client for the companion API server.
//!
//! Listing prefixes are translated to the server's query endpoints; the
//! caller keeps thinking in prefixes while the wire stays plain JSON.

use crate::{
    catalog::{CatalogError, CatalogResult, CatalogService, KeyRecord},
    key::KeyCodec,
    models::{
        scope::ListingScope,
        transfer::{PresignedTransfer, TransferDirection},
    },
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// Catalog backend speaking to the fileshelf API server over HTTP.
pub struct RestCatalog {
    http: reqwest::Client,
    base_url: String,
    codec: KeyCodec,
}

#[derive(Debug, Deserialize)]
struct FieldsResponse {
    fields: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct CategoriesResponse {
    categories: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct FilesResponse {
    files: Vec<KeyRecord>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PresignUploadRequest<'a> {
    field: &'a str,
    category: &'a str,
    filename: &'a str,
    content_type: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PresignDownloadRequest<'a> {
    field: &'a str,
    category: &'a str,
    filename: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PresignResponse {
    url: String,
    key: String,
    expires_at: Option<DateTime<Utc>>,
}

impl RestCatalog {
    /// Point a client at a server base URL, e.g. `http://127.0.0.1:3000`.
    pub fn new(base_url: impl Into<String>, codec: KeyCodec) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            http: reqwest::Client::new(),
            base_url,
            codec,
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: String) -> CatalogResult<T> {
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|err| CatalogError::ListingFailed(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(CatalogError::ListingFailed(format!(
                "server returned {status}: {body}"
            )));
        }
        response
            .json::<T>()
            .await
            .map_err(|err| CatalogError::ListingFailed(err.to_string()))
    }

    async fn post_presign<B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> CatalogResult<PresignResponse> {
        let response = self
            .http
            .post(self.endpoint(path))
            .json(body)
            .send()
            .await
            .map_err(|err| CatalogError::PresignRejected(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(CatalogError::PresignRejected(format!(
                "server returned {status}: {body}"
            )));
        }
        response
            .json::<PresignResponse>()
            .await
            .map_err(|err| CatalogError::PresignRejected(err.to_string()))
    }
}

#[async_trait]
impl CatalogService for RestCatalog {
    async fn list_prefix_children(&self, prefix: &str) -> CatalogResult<Vec<String>> {
        let scope = self
            .codec
            .classify_prefix(prefix)
            .map_err(|err| CatalogError::ListingFailed(err.to_string()))?;
        match scope {
            ListingScope::Fields => {
                let body: FieldsResponse = self.get_json(self.endpoint("/api/list-fields")).await?;
                Ok(body.fields)
            }
            ListingScope::CategoriesOf { field } => {
                let url = format!(
                    "{}?field={}",
                    self.endpoint("/api/list-categories"),
                    utf8_percent_encode(&field, NON_ALPHANUMERIC)
                );
                let body: CategoriesResponse = self.get_json(url).await?;
                Ok(body.categories)
            }
            ListingScope::FilesOf { .. } => Err(CatalogError::ListingFailed(format!(
                "prefix `{prefix}` addresses file keys, not child names"
            ))),
        }
    }

    async fn list_keys_under(&self, prefix: &str) -> CatalogResult<Vec<KeyRecord>> {
        let scope = self
            .codec
            .classify_prefix(prefix)
            .map_err(|err| CatalogError::ListingFailed(err.to_string()))?;
        match scope {
            ListingScope::FilesOf { field, category } => {
                let url = format!(
                    "{}?field={}&category={}",
                    self.endpoint("/api/list-files"),
                    utf8_percent_encode(&field, NON_ALPHANUMERIC),
                    utf8_percent_encode(&category, NON_ALPHANUMERIC)
                );
                let body: FilesResponse = self.get_json(url).await?;
                Ok(body.files)
            }
            other => Err(CatalogError::ListingFailed(format!(
                "prefix `{prefix}` ({other}) addresses child names, not file keys"
            ))),
        }
    }

    async fn presign_upload(
        &self,
        field: &str,
        category: &str,
        filename: &str,
        content_type: &str,
    ) -> CatalogResult<PresignedTransfer> {
        let content_type = if content_type.is_empty() {
            FALLBACK_CONTENT_TYPE
        } else {
            content_type
        };
        let request = PresignUploadRequest {
            field,
            category,
            filename,
            content_type,
        };
        let body = self.post_presign("/api/presign-upload", &request).await?;
        Ok(PresignedTransfer {
            url: body.url,
            key: body.key,
            direction: TransferDirection::Upload,
            expires_at: body.expires_at,
            content_type: Some(content_type.to_string()),
        })
    }

    async fn presign_download(
        &self,
        field: &str,
        category: &str,
        filename: &str,
    ) -> CatalogResult<PresignedTransfer> {
        let request = PresignDownloadRequest {
            field,
            category,
            filename,
        };
        let body = self.post_presign("/api/presign-download", &request).await?;
        Ok(PresignedTransfer {
            url: body.url,
            key: body.key,
            direction: TransferDirection::Download,
            expires_at: body.expires_at,
            content_type: None,
        })
    }
}
