//! src/services/hierarchy_cache.rs
//!
//! Per-scope listing cache with in-flight de-duplication. Each listing
//! scope resolves to at most one catalog call no matter how many callers
//! ask, and stays cached until explicitly invalidated. There is no TTL:
//! staleness is handled by the invalidation hooks on the upload path, and
//! by whoever owns the cache deciding to drop it.

use crate::{
    catalog::{CatalogResult, CatalogService},
    key::KeyCodec,
    models::{entry::FileEntry, scope::ListingScope},
};
use futures::{
    FutureExt,
    future::{BoxFuture, Shared},
};
use std::{
    collections::HashMap,
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};
use tokio::sync::Mutex;
use tracing::debug;

type SharedFetch<T> = Shared<BoxFuture<'static, CatalogResult<T>>>;

/// A cache slot is either a resolved listing or the one fetch currently
/// resolving it. Waiters clone the shared future instead of fetching.
enum Slot<T> {
    Ready(T),
    Pending(SharedFetch<T>),
}

/// Keyed slot map shared by the two listing shapes the cache stores.
struct SlotMap<T> {
    slots: Mutex<HashMap<String, Slot<T>>>,
}

impl<T> SlotMap<T>
where
    T: Clone + Send + 'static,
{
    fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Return the cached value, join the in-flight fetch, or start `fetch`
    /// as the single flight for this key.
    ///
    /// A successful fetch is promoted to `Ready` only if its slot is still
    /// the current one — an invalidation racing the fetch wins, and the
    /// next caller refetches. A failed fetch clears the slot so failures
    /// are never cached.
    async fn get_or_fetch<F>(&self, cache_key: String, fetch: F) -> CatalogResult<T>
    where
        F: Future<Output = CatalogResult<T>> + Send + 'static,
    {
        let pending = {
            let mut slots = self.slots.lock().await;
            match slots.get(&cache_key) {
                Some(Slot::Ready(value)) => return Ok(value.clone()),
                Some(Slot::Pending(flight)) => flight.clone(),
                None => {
                    let flight = fetch.boxed().shared();
                    slots.insert(cache_key.clone(), Slot::Pending(flight.clone()));
                    flight
                }
            }
        };

        let result = pending.clone().await;

        let mut slots = self.slots.lock().await;
        let still_current = matches!(
            slots.get(&cache_key),
            Some(Slot::Pending(current)) if current.ptr_eq(&pending)
        );
        if still_current {
            match &result {
                Ok(value) => {
                    slots.insert(cache_key, Slot::Ready(value.clone()));
                }
                Err(_) => {
                    slots.remove(&cache_key);
                }
            }
        }
        result
    }

    /// Cached value for `cache_key`, without fetching or waiting.
    async fn peek(&self, cache_key: &str) -> Option<T> {
        let slots = self.slots.lock().await;
        match slots.get(cache_key) {
            Some(Slot::Ready(value)) => Some(value.clone()),
            _ => None,
        }
    }

    async fn invalidate(&self, cache_key: &str) -> bool {
        let mut slots = self.slots.lock().await;
        slots.remove(cache_key).is_some()
    }
}

/// Listing payload for one scope: child names for `Fields` and
/// `CategoriesOf`, file entries for `FilesOf`.
#[derive(Debug, Clone)]
pub enum ScopeListing {
    Names(Arc<Vec<String>>),
    Files(Arc<Vec<FileEntry>>),
}

impl ScopeListing {
    pub fn len(&self) -> usize {
        match self {
            Self::Names(names) => names.len(),
            Self::Files(files) => files.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Cached view of the field → category → file hierarchy.
///
/// Shared by navigation, search, and the transfer broker; all of them see
/// the same listings and the same invalidations.
pub struct HierarchyCache {
    catalog: Arc<dyn CatalogService>,
    codec: KeyCodec,
    names: SlotMap<Arc<Vec<String>>>,
    files: SlotMap<Arc<Vec<FileEntry>>>,
    /// Bumped on every invalidation; the global search index stamps
    /// itself with this to detect expiry.
    generation: AtomicU64,
    /// Per-field stamps bumped when a `FilesOf` scope under the field is
    /// invalidated; field search indexes expire against these.
    file_generations: Mutex<HashMap<String, u64>>,
}

impl HierarchyCache {
    pub fn new(catalog: Arc<dyn CatalogService>, codec: KeyCodec) -> Self {
        Self {
            catalog,
            codec,
            names: SlotMap::new(),
            files: SlotMap::new(),
            generation: AtomicU64::new(0),
            file_generations: Mutex::new(HashMap::new()),
        }
    }

    pub fn codec(&self) -> &KeyCodec {
        &self.codec
    }

    /// Field names under the root, cached.
    pub async fn fields(&self) -> CatalogResult<Arc<Vec<String>>> {
        let catalog = Arc::clone(&self.catalog);
        let prefix = self.codec.fields_prefix();
        self.names
            .get_or_fetch(ListingScope::Fields.cache_key(), async move {
                debug!("listing fields under `{}`", prefix);
                let children = catalog.list_prefix_children(&prefix).await?;
                Ok(Arc::new(children))
            })
            .await
    }

    /// Category names under `field`, cached.
    pub async fn categories_of(&self, field: &str) -> CatalogResult<Arc<Vec<String>>> {
        let catalog = Arc::clone(&self.catalog);
        let prefix = self.codec.categories_prefix(field);
        self.names
            .get_or_fetch(ListingScope::categories_of(field).cache_key(), async move {
                debug!("listing categories under `{}`", prefix);
                let children = catalog.list_prefix_children(&prefix).await?;
                Ok(Arc::new(children))
            })
            .await
    }

    /// File entries under `field`/`category`, cached.
    ///
    /// Folder placeholders (keys ending in the separator) are dropped, and
    /// keys the codec cannot parse are skipped with a log line rather than
    /// failing the whole listing.
    pub async fn files_of(&self, field: &str, category: &str) -> CatalogResult<Arc<Vec<FileEntry>>> {
        let catalog = Arc::clone(&self.catalog);
        let codec = self.codec.clone();
        let prefix = self.codec.files_prefix(field, category);
        self.files
            .get_or_fetch(
                ListingScope::files_of(field, category).cache_key(),
                async move {
                    debug!("listing files under `{}`", prefix);
                    let records = catalog.list_keys_under(&prefix).await?;
                    let mut entries = Vec::with_capacity(records.len());
                    for record in records {
                        match codec.parse(&record.key) {
                            Ok(parts) if parts.is_placeholder() => continue,
                            Ok(parts) => entries.push(FileEntry {
                                field: parts.field,
                                category: parts.category,
                                filename: parts.filename,
                                size: record.size,
                                last_modified: record.last_modified,
                            }),
                            Err(err) => {
                                debug!("skipping malformed key `{}`: {}", record.key, err);
                            }
                        }
                    }
                    Ok(Arc::new(entries))
                },
            )
            .await
    }

    /// Listing for an arbitrary scope, shaped per scope kind.
    pub async fn list_scope(&self, scope: &ListingScope) -> CatalogResult<ScopeListing> {
        match scope {
            ListingScope::Fields => Ok(ScopeListing::Names(self.fields().await?)),
            ListingScope::CategoriesOf { field } => {
                Ok(ScopeListing::Names(self.categories_of(field).await?))
            }
            ListingScope::FilesOf { field, category } => {
                Ok(ScopeListing::Files(self.files_of(field, category).await?))
            }
        }
    }

    /// Cached field names, without fetching. Used to decide whether an
    /// upload introduced a brand-new field.
    pub async fn peek_fields(&self) -> Option<Arc<Vec<String>>> {
        self.names.peek(&ListingScope::Fields.cache_key()).await
    }

    /// Cached category names of `field`, without fetching.
    pub async fn peek_categories(&self, field: &str) -> Option<Arc<Vec<String>>> {
        self.names
            .peek(&ListingScope::categories_of(field).cache_key())
            .await
    }

    /// Drop the cached listing for exactly `scope`.
    ///
    /// Sibling and ancestor scopes keep their entries; derived search
    /// indexes notice through the generation stamps.
    pub async fn invalidate(&self, scope: &ListingScope) {
        let cache_key = scope.cache_key();
        let removed = match scope {
            ListingScope::Fields | ListingScope::CategoriesOf { .. } => {
                self.names.invalidate(&cache_key).await
            }
            ListingScope::FilesOf { .. } => self.files.invalidate(&cache_key).await,
        };
        if let ListingScope::FilesOf { field, .. } = scope {
            let mut generations = self.file_generations.lock().await;
            *generations.entry(field.clone()).or_insert(0) += 1;
        }
        self.generation.fetch_add(1, Ordering::SeqCst);
        debug!("invalidated scope `{}` (was cached: {})", cache_key, removed);
    }

    /// Cache-wide invalidation stamp.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Invalidation stamp for file listings under one field.
    pub async fn files_generation(&self, field: &str) -> u64 {
        let generations = self.file_generations.lock().await;
        generations.get(field).copied().unwrap_or(0)
    }
}
