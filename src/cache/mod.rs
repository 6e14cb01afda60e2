//! Full-page response cache for the home page.
//!
//! Rendered responses are stored for a fixed TTL and served unchanged until
//! they expire or the cache is cleared. Writes to posts never invalidate
//! entries, so the home page may lag behind new content by up to one TTL.
//!
//! ```toml
//! [cache]
//! enabled = true
//! index_ttl_seconds = 20
//! max_entries = 256
//! ```

mod config;
mod keys;
mod lock;
mod middleware;
mod store;

pub use config::CacheConfig;
pub use keys::{PageKey, hash_query, hash_session, hash_value};
pub use middleware::{CacheState, page_cache_layer};
pub use store::{CachedResponse, PageCache, TtlPageStore};

/// Counter incremented when a cached page is served.
pub const METRIC_HIT: &str = "yatube_page_cache_hit_total";
/// Counter incremented when a cacheable request has to be rendered.
pub const METRIC_MISS: &str = "yatube_page_cache_miss_total";
/// Counter incremented when a rendered page is stored.
pub const METRIC_STORE: &str = "yatube_page_cache_store_total";
