//! Handlers for the presigned blob endpoints.
//! Every request must carry a valid signature for its exact method, key,
//! and (for uploads) content type; bodies stream through without buffering.

use crate::{
    errors::AppError,
    handlers::ServerState,
    models::{object::StoredObject, transfer::TransferDirection},
};
use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use futures::StreamExt;
use serde::Deserialize;
use std::io;
use tokio_util::io::ReaderStream;

/// Query params carried by every presigned URL.
#[derive(Debug, Deserialize)]
pub struct SignatureQuery {
    pub expires: i64,
    pub signature: String,
}

/// Upload a blob to `PUT /blob/{*key}`.
pub async fn put_blob(
    State(state): State<ServerState>,
    Path(key): Path<String>,
    Query(sig): Query<SignatureQuery>,
    headers: HeaderMap,
    body: Body,
) -> Result<impl IntoResponse, AppError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string());

    state.signer.verify(
        TransferDirection::Upload,
        &key,
        content_type.as_deref(),
        sig.expires,
        &sig.signature,
    )?;

    let stream = body
        .into_data_stream()
        .map(|chunk| chunk.map_err(|err| io::Error::new(io::ErrorKind::Other, err)));

    let object = state
        .store
        .upload_object_stream(&key, content_type, state.policy.max_upload_bytes, stream)
        .await?;

    let etag = object.etag.as_ref().map(|e| format!("\"{}\"", e));
    let mut resp_headers = HeaderMap::new();
    if let Some(value) = etag.as_deref() {
        if let Ok(header_value) = HeaderValue::from_str(value) {
            resp_headers.insert(header::ETAG, header_value);
        }
    }

    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::OK;
    *response.headers_mut() = resp_headers;
    Ok(response)
}

/// Download a blob from `GET /blob/{*key}` as a streaming response.
pub async fn get_blob(
    State(state): State<ServerState>,
    Path(key): Path<String>,
    Query(sig): Query<SignatureQuery>,
) -> Result<Response, AppError> {
    state.signer.verify(
        TransferDirection::Download,
        &key,
        None,
        sig.expires,
        &sig.signature,
    )?;

    let (meta, file) = state.store.get_object_reader(&key).await?;
    let stream = ReaderStream::new(file);
    let body = Body::from_stream(stream);

    let mut response = Response::new(body);
    *response.status_mut() = StatusCode::OK;
    set_blob_headers(response.headers_mut(), &meta);

    Ok(response)
}

fn set_blob_headers(headers: &mut HeaderMap, meta: &StoredObject) {
    let content_type = meta
        .content_type
        .clone()
        .unwrap_or_else(|| "application/octet-stream".into());
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );

    headers.insert(
        header::CONTENT_LENGTH,
        HeaderValue::from_str(&meta.size_bytes.max(0).to_string())
            .unwrap_or_else(|_| HeaderValue::from_static("0")),
    );

    if let Some(etag) = meta.etag.as_ref() {
        let quoted = format!("\"{}\"", etag);
        if let Ok(value) = HeaderValue::from_str(&quoted) {
            headers.insert(header::ETAG, value);
        }
    }

    headers.insert(
        header::LAST_MODIFIED,
        HeaderValue::from_str(&meta.last_modified.to_rfc2822())
            .unwrap_or_else(|_| HeaderValue::from_static("")),
    );
}
