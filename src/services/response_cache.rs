// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Short-lived per-user cache of the cached-listing API responses.

use crate::models::{CachedChannel, CachedPlaylist};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// How long a listing stays cached.
pub const RESPONSE_CACHE_TTL: Duration = Duration::from_secs(60);

#[derive(Clone)]
struct Entry<T> {
    value: Arc<Vec<T>>,
    expires_at: Instant,
}

impl<T> Entry<T> {
    fn fresh(&self, now: Instant) -> Option<Arc<Vec<T>>> {
        (self.expires_at > now).then(|| self.value.clone())
    }
}

/// TTL cache keyed by user ID.
#[derive(Clone)]
pub struct ResponseCache {
    ttl: Duration,
    channels: Arc<DashMap<String, Entry<CachedChannel>>>,
    playlists: Arc<DashMap<String, Entry<CachedPlaylist>>>,
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new(RESPONSE_CACHE_TTL)
    }
}

impl ResponseCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            channels: Arc::new(DashMap::new()),
            playlists: Arc::new(DashMap::new()),
        }
    }

    pub fn get_channels(&self, user_id: &str) -> Option<Arc<Vec<CachedChannel>>> {
        self.channels
            .get(user_id)
            .and_then(|e| e.fresh(Instant::now()))
    }

    pub fn put_channels(
        &self,
        user_id: &str,
        channels: Vec<CachedChannel>,
    ) -> Arc<Vec<CachedChannel>> {
        let value = Arc::new(channels);
        self.channels.insert(
            user_id.to_string(),
            Entry {
                value: value.clone(),
                expires_at: Instant::now() + self.ttl,
            },
        );
        value
    }

    pub fn get_playlists(&self, user_id: &str) -> Option<Arc<Vec<CachedPlaylist>>> {
        self.playlists
            .get(user_id)
            .and_then(|e| e.fresh(Instant::now()))
    }

    pub fn put_playlists(
        &self,
        user_id: &str,
        playlists: Vec<CachedPlaylist>,
    ) -> Arc<Vec<CachedPlaylist>> {
        let value = Arc::new(playlists);
        self.playlists.insert(
            user_id.to_string(),
            Entry {
                value: value.clone(),
                expires_at: Instant::now() + self.ttl,
            },
        );
        value
    }

    /// Drop everything cached for a user.
    pub fn invalidate_user(&self, user_id: &str) {
        self.channels.remove(user_id);
        self.playlists.remove(user_id);
        tracing::debug!(user_id, "Response cache invalidated");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_get_and_invalidate() {
        let cache = ResponseCache::default();
        assert!(cache.get_channels("u1").is_none());

        cache.put_channels("u1", Vec::new());
        cache.put_playlists("u1", Vec::new());
        assert!(cache.get_channels("u1").is_some());
        assert!(cache.get_playlists("u1").is_some());
        assert!(cache.get_channels("u2").is_none());

        cache.invalidate_user("u1");
        assert!(cache.get_channels("u1").is_none());
        assert!(cache.get_playlists("u1").is_none());
    }

    #[test]
    fn test_expired_entry_is_a_miss() {
        let cache = ResponseCache::new(Duration::ZERO);
        cache.put_channels("u1", Vec::new());
        assert!(cache.get_channels("u1").is_none());
    }
}
