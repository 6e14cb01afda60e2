//! TTL-bound storage for rendered pages.

use std::sync::RwLock;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::Response,
};
use bytes::Bytes;
use lru::LruCache;

use super::{CacheConfig, PageKey, lock::rw_read, lock::rw_write};

const SOURCE: &str = "cache::store";

/// Rendered HTTP response kept in memory.
#[derive(Debug, Clone)]
pub struct CachedResponse {
    status: StatusCode,
    headers: Vec<(HeaderName, HeaderValue)>,
    body: Bytes,
}

impl CachedResponse {
    pub fn new(status: StatusCode, headers: &HeaderMap, body: Bytes) -> Self {
        let stored_headers = headers
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();

        Self {
            status,
            headers: stored_headers,
            body,
        }
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;

        let headers = response.headers_mut();
        headers.clear();
        for (name, value) in self.headers {
            headers.append(name, value);
        }

        response
    }
}

/// Key-value page store with a fixed time-to-live.
pub trait PageCache: Send + Sync {
    fn get(&self, key: &PageKey) -> Option<CachedResponse>;

    fn put(&self, key: PageKey, response: CachedResponse);

    /// Drop every stored page.
    fn clear(&self);
}

struct Entry {
    response: CachedResponse,
    expires_at: Instant,
}

/// In-process [`PageCache`] bounded by entry count and age.
pub struct TtlPageStore {
    entries: RwLock<LruCache<PageKey, Entry>>,
    ttl: Duration,
}

impl TtlPageStore {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: RwLock::new(LruCache::new(config.max_entries_non_zero())),
            ttl: config.ttl(),
        }
    }

    /// Look up a page as of `now`; an expired page is removed and reported missing.
    pub fn get_at(&self, key: &PageKey, now: Instant) -> Option<CachedResponse> {
        let mut entries = rw_write(&self.entries, SOURCE, "get");
        let expired = match entries.get(key) {
            Some(entry) if entry.expires_at > now => return Some(entry.response.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.pop(key);
        }
        None
    }

    pub fn put_at(&self, key: PageKey, response: CachedResponse, now: Instant) {
        let entry = Entry {
            response,
            expires_at: now + self.ttl,
        };
        rw_write(&self.entries, SOURCE, "put").push(key, entry);
    }

    pub fn len(&self) -> usize {
        rw_read(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PageCache for TtlPageStore {
    fn get(&self, key: &PageKey) -> Option<CachedResponse> {
        self.get_at(key, Instant::now())
    }

    fn put(&self, key: PageKey, response: CachedResponse) {
        self.put_at(key, response, Instant::now());
    }

    fn clear(&self) {
        rw_write(&self.entries, SOURCE, "clear").clear();
    }
}
