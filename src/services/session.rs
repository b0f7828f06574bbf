//! src/services/session.rs
//!
//! One browsing session: a hierarchy cache, a search index, a transfer
//! broker, and a navigator, all sharing the same catalog handle and the
//! same cached listings. Embedders construct one of these per catalog
//! and drive it; nothing in the stack reaches for globals.

use crate::{
    catalog::CatalogService,
    config::UploadPolicy,
    key::KeyCodec,
    services::{
        hierarchy_cache::HierarchyCache, navigation::Navigator, search_index::SearchIndex,
        transfer_broker::TransferBroker,
    },
};
use std::sync::Arc;

pub struct ShelfSession {
    pub cache: Arc<HierarchyCache>,
    pub search: SearchIndex,
    pub broker: TransferBroker,
    pub navigator: Navigator,
}

impl ShelfSession {
    pub fn new(catalog: Arc<dyn CatalogService>, codec: KeyCodec, policy: UploadPolicy) -> Self {
        let cache = Arc::new(HierarchyCache::new(Arc::clone(&catalog), codec));
        let search = SearchIndex::new(Arc::clone(&cache));
        let broker = TransferBroker::new(catalog, Arc::clone(&cache), policy);
        Self {
            cache,
            search,
            broker,
            navigator: Navigator::new(),
        }
    }
}
