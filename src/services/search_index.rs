//! src/services/search_index.rs
//!
//! Search over the cached hierarchy, at three widening scopes: one
//! category, one field, or everything. Field and global scopes derive
//! flattened hit indexes lazily and memoize them; the indexes expire
//! against the cache's generation stamps instead of wiring into every
//! invalidation call site.
//!
//! Matching is a case-insensitive substring test on the filename segment
//! only — field and category names never match.

use crate::{
    catalog::CatalogResult,
    models::entry::{FileEntry, SearchHit},
    services::hierarchy_cache::HierarchyCache,
};
use futures::{
    FutureExt,
    future::{BoxFuture, Shared},
};
use std::{collections::HashMap, sync::Arc};
use tokio::sync::Mutex;
use tracing::debug;

type SharedBuild = Shared<BoxFuture<'static, CatalogResult<Arc<Vec<SearchHit>>>>>;

/// Flattened hits for one field, stamped with the files-generation the
/// build observed.
struct FieldIndex {
    built_at: u64,
    hits: Arc<Vec<SearchHit>>,
}

/// Memoized union of every field index, stamped with the cache-wide
/// generation. Guarded so concurrent cold global searches derive once.
enum GlobalSlot {
    Empty,
    Pending { built_at: u64, flight: SharedBuild },
    Ready { built_at: u64, hits: Arc<Vec<SearchHit>> },
}

struct Inner {
    cache: Arc<HierarchyCache>,
    field_indexes: Mutex<HashMap<String, FieldIndex>>,
}

impl Inner {
    /// Return the field's hit index, rebuilding it if the field's file
    /// listings were invalidated since the last build.
    async fn ensure_field_index(&self, field: &str) -> CatalogResult<Arc<Vec<SearchHit>>> {
        let current_gen = self.cache.files_generation(field).await;
        {
            let indexes = self.field_indexes.lock().await;
            if let Some(index) = indexes.get(field) {
                if index.built_at == current_gen {
                    return Ok(Arc::clone(&index.hits));
                }
            }
        }

        debug!("deriving search index for field `{}`", field);
        let categories = self.cache.categories_of(field).await?;
        let mut hits = Vec::new();
        for category in categories.iter() {
            let files = self.cache.files_of(field, category).await?;
            hits.extend(files.iter().map(SearchHit::from));
        }
        let hits = Arc::new(hits);

        let mut indexes = self.field_indexes.lock().await;
        indexes.insert(
            field.to_string(),
            FieldIndex {
                built_at: current_gen,
                hits: Arc::clone(&hits),
            },
        );
        Ok(hits)
    }

    /// Union of every field's index, in field order.
    async fn build_global(&self) -> CatalogResult<Arc<Vec<SearchHit>>> {
        let fields = self.cache.fields().await?;
        let mut all = Vec::new();
        for field in fields.iter() {
            let hits = self.ensure_field_index(field).await?;
            all.extend(hits.iter().cloned());
        }
        Ok(Arc::new(all))
    }
}

/// Scope-aware search over the hierarchy cache.
pub struct SearchIndex {
    inner: Arc<Inner>,
    global: Mutex<GlobalSlot>,
}

impl SearchIndex {
    pub fn new(cache: Arc<HierarchyCache>) -> Self {
        Self {
            inner: Arc::new(Inner {
                cache,
                field_indexes: Mutex::new(HashMap::new()),
            }),
            global: Mutex::new(GlobalSlot::Empty),
        }
    }

    /// Filter one category's files. An empty query means "no filter":
    /// the full listing comes back, since the category view already shows
    /// a concrete list.
    pub async fn search_category(
        &self,
        field: &str,
        category: &str,
        query: &str,
    ) -> CatalogResult<Vec<FileEntry>> {
        let files = self.inner.cache.files_of(field, category).await?;
        if query.is_empty() {
            return Ok(files.as_ref().clone());
        }
        let needle = query.to_lowercase();
        Ok(files
            .iter()
            .filter(|entry| filename_matches(&entry.filename, &needle))
            .cloned()
            .collect())
    }

    /// Search every category of one field. An empty query returns no
    /// hits — the field view shows categories, not files, until filtered.
    pub async fn search_field(&self, field: &str, query: &str) -> CatalogResult<Vec<SearchHit>> {
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let hits = self.inner.ensure_field_index(field).await?;
        let needle = query.to_lowercase();
        Ok(hits
            .iter()
            .filter(|hit| filename_matches(&hit.filename, &needle))
            .cloned()
            .collect())
    }

    /// Search every field. An empty query returns no hits.
    pub async fn search_global(&self, query: &str) -> CatalogResult<Vec<SearchHit>> {
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let hits = self.global_index().await?;
        let needle = query.to_lowercase();
        Ok(hits
            .iter()
            .filter(|hit| filename_matches(&hit.filename, &needle))
            .cloned()
            .collect())
    }

    /// Current global index: cached if fresh, joined if building, rebuilt
    /// if expired or absent. Failed builds leave the slot empty so the
    /// next search retries.
    async fn global_index(&self) -> CatalogResult<Arc<Vec<SearchHit>>> {
        let current_gen = self.inner.cache.generation();
        let pending = {
            let mut slot = self.global.lock().await;
            match &*slot {
                GlobalSlot::Ready { built_at, hits } if *built_at == current_gen => {
                    return Ok(Arc::clone(hits));
                }
                GlobalSlot::Pending { flight, .. } => flight.clone(),
                _ => {
                    debug!("deriving global search index");
                    let inner = Arc::clone(&self.inner);
                    let flight = async move { inner.build_global().await }.boxed().shared();
                    *slot = GlobalSlot::Pending {
                        built_at: current_gen,
                        flight: flight.clone(),
                    };
                    flight
                }
            }
        };

        let result = pending.clone().await;

        let mut slot = self.global.lock().await;
        let stamped = match &*slot {
            GlobalSlot::Pending { built_at, flight } if flight.ptr_eq(&pending) => Some(*built_at),
            _ => None,
        };
        if let Some(built_at) = stamped {
            *slot = match &result {
                Ok(hits) => GlobalSlot::Ready {
                    built_at,
                    hits: Arc::clone(hits),
                },
                Err(_) => GlobalSlot::Empty,
            };
        }
        result
    }
}

fn filename_matches(filename: &str, needle_lower: &str) -> bool {
    filename.to_lowercase().contains(needle_lower)
}
