//! Core data models for the field/category file catalog.
//!
//! These entities describe what the hierarchy, search, and transfer layers
//! exchange: listing scopes, materialized file entries, presigned transfers,
//! and the stored-object row the catalog server keeps in SQLite.

pub mod entry;
pub mod object;
pub mod scope;
pub mod transfer;
