//! Cache key definitions.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Identifies one cached page.
///
/// Pages vary on the session cookie so a signed-in navbar is never served to
/// another visitor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PageKey {
    pub path: String,
    pub query_hash: u64,
    pub session_hash: u64,
}

impl PageKey {
    pub fn new(path: &str, query: Option<&str>, session: Option<&str>) -> Self {
        Self {
            path: path.to_string(),
            query_hash: hash_query(query.unwrap_or("")),
            session_hash: hash_session(session),
        }
    }
}

/// Compute a hash for any hashable value.
pub fn hash_value<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

pub fn hash_query(query: &str) -> u64 {
    hash_value(&query)
}

/// Anonymous visitors share one hash.
pub fn hash_session(session: Option<&str>) -> u64 {
    hash_value(&session)
}
