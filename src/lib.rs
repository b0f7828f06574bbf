//! fileshelf — a field/category file catalog over a flat object store.
//!
//! Objects live under keys of the form `<root>/<field>/<category>/<filename>`;
//! everything hierarchical about the system is derived from those keys by the
//! [`key::KeyCodec`]. The crate ships two halves:
//!
//! - the client stack: [`catalog::CatalogService`] backends, the listing
//!   cache, search index, navigation state machine, and transfer broker,
//!   wired together by [`services::session::ShelfSession`];
//! - the catalog server (`src/main.rs`): an axum API that stores payloads on
//!   disk, indexes keys in SQLite, and mints HMAC-presigned blob URLs.

pub mod catalog;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod key;
pub mod models;
pub mod routes;
pub mod services;

pub use key::KeyCodec;
pub use services::session::ShelfSession;
