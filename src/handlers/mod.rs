use crate::{config::UploadPolicy, key::KeyCodec, services::presign::UrlSigner, services::store::StoreService};

pub mod blob;
pub mod catalog_api;
pub mod health;

/// Everything the handlers need, cloned per request by axum.
#[derive(Clone)]
pub struct ServerState {
    pub store: StoreService,
    pub signer: UrlSigner,
    pub policy: UploadPolicy,
    pub codec: KeyCodec,
}
