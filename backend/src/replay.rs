//! Single-use keys with an expiry.
//!
//! Tracks envelope nonces and spent deposits. An entry only needs to live as
//! long as the thing it guards would still be accepted, so expired entries are
//! pruned as new ones arrive.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SeenSet {
    expires_at: BTreeMap<String, i64>,
}

impl SeenSet {
    /// Drop entries whose expiry has passed.
    pub fn prune(&mut self, now: i64) {
        self.expires_at.retain(|_, expires_at| *expires_at >= now);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.expires_at.contains_key(key)
    }

    /// Returns `false` if `key` was already present.
    pub fn insert(&mut self, key: String, expires_at: i64) -> bool {
        if self.expires_at.contains_key(&key) {
            return false;
        }
        self.expires_at.insert(key, expires_at);
        true
    }

    pub fn len(&self) -> usize {
        self.expires_at.len()
    }
}
