//! Service layer: the client-side browsing stack (cache, search,
//! navigation, transfers) and the server-side store and URL signer.

pub mod hierarchy_cache;
pub mod navigation;
pub mod presign;
pub mod search_index;
pub mod session;
pub mod store;
pub mod transfer_broker;
