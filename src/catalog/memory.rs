//! In-memory catalog backend.
//!
//! Serves listings straight from a key map, with a couple of knobs the
//! cache and search tests lean on: an artificial listing latency (to force
//! calls to overlap) and a failure switch (to observe error propagation).

use crate::{
    catalog::{CatalogError, CatalogResult, CatalogService, KeyRecord},
    key::KeyCodec,
    models::transfer::{PresignedTransfer, TransferDirection},
};
use async_trait::async_trait;
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
    time::Duration,
};
use tokio::sync::Mutex;

/// Catalog backend over an in-process key map.
pub struct MemoryCatalog {
    codec: KeyCodec,
    objects: Mutex<BTreeMap<String, KeyRecord>>,
    listing_calls: AtomicUsize,
    presign_calls: AtomicUsize,
    listing_latency: Option<Duration>,
    fail_listings: AtomicBool,
}

impl MemoryCatalog {
    pub fn new(codec: KeyCodec) -> Self {
        Self {
            codec,
            objects: Mutex::new(BTreeMap::new()),
            listing_calls: AtomicUsize::new(0),
            presign_calls: AtomicUsize::new(0),
            listing_latency: None,
            fail_listings: AtomicBool::new(false),
        }
    }

    /// Seed a catalog from bare keys.
    pub fn with_keys<I, S>(codec: KeyCodec, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let objects = keys
            .into_iter()
            .map(|key| {
                let record = KeyRecord::bare(key);
                (record.key.clone(), record)
            })
            .collect();
        Self {
            objects: Mutex::new(objects),
            ..Self::new(codec)
        }
    }

    /// Delay every listing call, so concurrent callers overlap in flight.
    pub fn with_listing_latency(mut self, latency: Duration) -> Self {
        self.listing_latency = Some(latency);
        self
    }

    /// Insert or replace one record.
    pub async fn put_record(&self, record: KeyRecord) {
        let mut objects = self.objects.lock().await;
        objects.insert(record.key.clone(), record);
    }

    /// Insert a bare key.
    pub async fn put_key(&self, key: impl Into<String>) {
        self.put_record(KeyRecord::bare(key)).await;
    }

    /// How many listing calls reached the backend. The hierarchy cache's
    /// whole job is to keep this number small.
    pub fn listing_calls(&self) -> usize {
        self.listing_calls.load(Ordering::SeqCst)
    }

    /// How many presign calls reached the backend. Client-side validation
    /// failures must leave this untouched.
    pub fn presign_calls(&self) -> usize {
        self.presign_calls.load(Ordering::SeqCst)
    }

    /// Make subsequent listing calls fail until switched back.
    pub fn set_fail_listings(&self, fail: bool) {
        self.fail_listings.store(fail, Ordering::SeqCst);
    }

    async fn enter_listing(&self) -> CatalogResult<()> {
        self.listing_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.listing_latency {
            tokio::time::sleep(latency).await;
        }
        if self.fail_listings.load(Ordering::SeqCst) {
            return Err(CatalogError::ListingFailed(
                "memory catalog set to fail".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl CatalogService for MemoryCatalog {
    async fn list_prefix_children(&self, prefix: &str) -> CatalogResult<Vec<String>> {
        self.enter_listing().await?;
        let objects = self.objects.lock().await;
        let mut children = BTreeSet::new();
        for key in objects.keys() {
            if let Some(rest) = key.strip_prefix(prefix) {
                if let Some(child) = rest.split('/').next() {
                    if !child.is_empty() {
                        children.insert(child.to_string());
                    }
                }
            }
        }
        Ok(children.into_iter().collect())
    }

    async fn list_keys_under(&self, prefix: &str) -> CatalogResult<Vec<KeyRecord>> {
        self.enter_listing().await?;
        let objects = self.objects.lock().await;
        Ok(objects
            .values()
            .filter(|record| record.key.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn presign_upload(
        &self,
        field: &str,
        category: &str,
        filename: &str,
        content_type: &str,
    ) -> CatalogResult<PresignedTransfer> {
        self.presign_calls.fetch_add(1, Ordering::SeqCst);
        let key = self.codec.compose(field, category, filename);
        Ok(PresignedTransfer {
            url: format!("memory:///{key}"),
            key,
            direction: TransferDirection::Upload,
            expires_at: None,
            content_type: Some(content_type.to_string()),
        })
    }

    async fn presign_download(
        &self,
        field: &str,
        category: &str,
        filename: &str,
    ) -> CatalogResult<PresignedTransfer> {
        self.presign_calls.fetch_add(1, Ordering::SeqCst);
        let key = self.codec.compose(field, category, filename);
        Ok(PresignedTransfer {
            url: format!("memory:///{key}"),
            key,
            direction: TransferDirection::Download,
            expires_at: None,
            content_type: None,
        })
    }
}
