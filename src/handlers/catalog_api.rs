//! HTTP handlers for the catalog API.
//!
//! The five JSON endpoints the client stack drives:
//! - GET  /api/list-fields
//! - GET  /api/list-categories?field=
//! - GET  /api/list-files?field=&category=
//! - POST /api/presign-upload
//! - POST /api/presign-download
//!
//! Names arrive raw and are sanitized here before they ever touch a key;
//! listing responses carry full keys so clients keep a single key parser.

use crate::{
    errors::AppError,
    handlers::ServerState,
    key::sanitize_segment,
    models::transfer::TransferDirection,
};
use axum::{
    Json,
    extract::{Query, State},
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// Query params accepted by the listing endpoints.
#[derive(Debug, Deserialize)]
pub struct ListCategoriesQuery {
    pub field: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListFilesQuery {
    pub field: Option<String>,
    pub category: Option<String>,
}

/// Request body for `POST /api/presign-upload`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresignUploadReq {
    pub field: Option<String>,
    pub category: Option<String>,
    pub filename: Option<String>,
    pub content_type: Option<String>,
}

/// Request body for `POST /api/presign-download`. Accepts either a full
/// key or the three name segments.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresignDownloadReq {
    pub key: Option<String>,
    pub field: Option<String>,
    pub category: Option<String>,
    pub filename: Option<String>,
}

/// GET `/api/list-fields` — distinct field names, sorted.
pub async fn list_fields(
    State(state): State<ServerState>,
) -> Result<impl IntoResponse, AppError> {
    let fields = state.store.list_fields().await?;
    Ok(Json(FieldsResponse { fields }))
}

/// GET `/api/list-categories?field=` — categories under one field, sorted.
pub async fn list_categories(
    State(state): State<ServerState>,
    Query(q): Query<ListCategoriesQuery>,
) -> Result<impl IntoResponse, AppError> {
    let field = sanitize_segment(q.field.as_deref().unwrap_or(""));
    if field.is_empty() {
        return Err(AppError::bad_request("field is required"));
    }
    let categories = state.store.list_categories(&field).await?;
    Ok(Json(CategoriesResponse { categories }))
}

/// GET `/api/list-files?field=&category=` — files under one category,
/// sorted by lowercase filename.
pub async fn list_files(
    State(state): State<ServerState>,
    Query(q): Query<ListFilesQuery>,
) -> Result<impl IntoResponse, AppError> {
    let field = sanitize_segment(q.field.as_deref().unwrap_or(""));
    let category = sanitize_segment(q.category.as_deref().unwrap_or(""));
    if field.is_empty() || category.is_empty() {
        return Err(AppError::bad_request("field and category are required"));
    }
    let files = state
        .store
        .list_files(&field, &category)
        .await?
        .into_iter()
        .map(|object| FileRow {
            key: object.key,
            name: object.filename,
            size: object.size_bytes,
            last_modified: Some(object.last_modified),
        })
        .collect();
    Ok(Json(FilesResponse { files }))
}

/// POST `/api/presign-upload` — validate names against the upload policy,
/// compose the key, and mint a signed PUT URL.
pub async fn presign_upload(
    State(state): State<ServerState>,
    Json(payload): Json<PresignUploadReq>,
) -> Result<impl IntoResponse, AppError> {
    let field = sanitize_segment(payload.field.as_deref().unwrap_or(""));
    let category = sanitize_segment(payload.category.as_deref().unwrap_or(""));
    let filename = sanitize_segment(payload.filename.as_deref().unwrap_or(""));
    if field.is_empty() || category.is_empty() || filename.is_empty() {
        return Err(AppError::bad_request(
            "field, category, and filename are required",
        ));
    }
    if !state.policy.allows(&filename) {
        return Err(AppError::bad_request(format!(
            "file type of `{filename}` is not allowed"
        )));
    }

    let content_type = payload
        .content_type
        .filter(|ct| !ct.is_empty())
        .unwrap_or_else(|| FALLBACK_CONTENT_TYPE.to_string());
    let key = state.codec.compose(&field, &category, &filename);
    let transfer = state
        .signer
        .presign(TransferDirection::Upload, &key, Some(&content_type));

    Ok(Json(PresignResponse {
        url: transfer.url,
        key: transfer.key,
        expires_at: transfer.expires_at,
    }))
}

/// POST `/api/presign-download` — mint a signed GET URL for an existing
/// key or for a (field, category, filename) triple.
pub async fn presign_download(
    State(state): State<ServerState>,
    Json(payload): Json<PresignDownloadReq>,
) -> Result<impl IntoResponse, AppError> {
    let key = match payload.key.filter(|key| !key.is_empty()) {
        Some(key) => {
            state
                .codec
                .parse(&key)
                .map_err(|err| AppError::bad_request(err.to_string()))?;
            key
        }
        None => {
            let field = sanitize_segment(payload.field.as_deref().unwrap_or(""));
            let category = sanitize_segment(payload.category.as_deref().unwrap_or(""));
            let filename = sanitize_segment(payload.filename.as_deref().unwrap_or(""));
            if field.is_empty() || category.is_empty() || filename.is_empty() {
                return Err(AppError::bad_request(
                    "key or (field, category, filename) required",
                ));
            }
            state.codec.compose(&field, &category, &filename)
        }
    };

    let transfer = state.signer.presign(TransferDirection::Download, &key, None);
    Ok(Json(PresignResponse {
        url: transfer.url,
        key: transfer.key,
        expires_at: transfer.expires_at,
    }))
}

#[derive(Debug, Serialize)]
pub struct FieldsResponse {
    pub fields: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct CategoriesResponse {
    pub categories: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct FilesResponse {
    pub files: Vec<FileRow>,
}

/// One listing row. `key` is the full object key; `name` repeats the
/// filename for readers of the raw API.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRow {
    pub key: String,
    pub name: String,
    pub size: i64,
    pub last_modified: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresignResponse {
    pub url: String,
    pub key: String,
    pub expires_at: Option<DateTime<Utc>>,
}
