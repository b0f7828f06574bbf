//! Defines routes for the catalog API and the presigned blob endpoints.
//!
//! ## Structure
//! - **Catalog endpoints** (JSON)
//!   - `GET  /api/list-fields` — distinct top-level fields
//!   - `GET  /api/list-categories?field=` — categories under one field
//!   - `GET  /api/list-files?field=&category=` — files under one category
//!   - `POST /api/presign-upload` — mint a signed PUT URL
//!   - `POST /api/presign-download` — mint a signed GET URL
//!
//! - **Blob endpoints** (presigned, signature-checked)
//!   - `PUT /blob/{*key}` — upload object bytes
//!   - `GET /blob/{*key}` — download object bytes
//!
//! The wildcard `*key` allows nested keys like `uploadedfiles/IT/Linux Notes/setup.pdf`.

use crate::handlers::{
    ServerState,
    blob::{get_blob, put_blob},
    catalog_api::{list_categories, list_fields, list_files, presign_download, presign_upload},
    health::{healthz, readyz},
};
use axum::{
    Router,
    routing::{get, post, put},
};

/// Build and return the router for all catalog and blob routes.
///
/// The router carries shared state (`ServerState`) to all handlers.
pub fn routes() -> Router<ServerState> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // catalog API
        .route("/api/list-fields", get(list_fields))
        .route("/api/list-categories", get(list_categories))
        .route("/api/list-files", get(list_files))
        .route("/api/presign-upload", post(presign_upload))
        .route("/api/presign-download", post(presign_download))
        // presigned blob routes
        .route("/blob/{*key}", put(put_blob).get(get_blob))
}
