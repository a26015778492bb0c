// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-memory store used by tests and local runs without Firestore.
//!
//! Mirrors the Firestore layout: one map per collection, keyed by document ID.

use crate::db::{CacheStore, UserStore};
use crate::error::AppError;
use crate::models::{ApiUsage, CachedChannel, CachedPlaylist, User, UserTokens};
use async_trait::async_trait;
use chrono::NaiveDate;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};

/// DashMap-backed implementation of [`CacheStore`] and [`UserStore`].
pub struct MemoryStore {
    users: DashMap<String, User>,
    tokens: DashMap<String, UserTokens>,
    channels: DashMap<String, CachedChannel>,
    playlists: DashMap<String, CachedPlaylist>,
    usage: DashMap<String, ApiUsage>,
    connected: AtomicBool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            users: DashMap::new(),
            tokens: DashMap::new(),
            channels: DashMap::new(),
            playlists: DashMap::new(),
            usage: DashMap::new(),
            connected: AtomicBool::new(true),
        }
    }

    /// Simulate losing (or regaining) the database connection.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    fn check_connected(&self) -> Result<(), AppError> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(AppError::Database(
                "Database not connected (offline mode)".to_string(),
            ))
        }
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn get_channels(&self, user_id: &str) -> Result<Vec<CachedChannel>, AppError> {
        self.check_connected()?;
        let mut channels: Vec<CachedChannel> = self
            .channels
            .iter()
            .filter(|e| e.user_id == user_id)
            .map(|e| e.value().clone())
            .collect();
        channels.sort_by(|a, b| a.title.cmp(&b.title));
        Ok(channels)
    }

    async fn count_channels(&self, user_id: &str) -> Result<usize, AppError> {
        self.check_connected()?;
        Ok(self.channels.iter().filter(|e| e.user_id == user_id).count())
    }

    async fn has_channels(&self, user_id: &str) -> Result<bool, AppError> {
        self.check_connected()?;
        Ok(self.channels.iter().any(|e| e.user_id == user_id))
    }

    async fn save_channel(&self, channel: &CachedChannel) -> Result<(), AppError> {
        self.check_connected()?;
        self.channels.insert(channel.doc_id(), channel.clone());
        Ok(())
    }

    async fn insert_channels(&self, channels: &[CachedChannel]) -> Result<usize, AppError> {
        self.check_connected()?;
        let mut inserted = 0;
        for channel in channels {
            let doc_id = channel.doc_id();
            if self.channels.contains_key(&doc_id) {
                tracing::warn!(doc_id = %doc_id, "Skipping duplicate channel row");
                continue;
            }
            self.channels.insert(doc_id, channel.clone());
            inserted += 1;
        }
        Ok(inserted)
    }

    async fn delete_channels(&self, user_id: &str) -> Result<usize, AppError> {
        self.check_connected()?;
        let before = self.channels.len();
        self.channels.retain(|_, c| c.user_id != user_id);
        Ok(before - self.channels.len())
    }

    async fn get_playlists(&self, user_id: &str) -> Result<Vec<CachedPlaylist>, AppError> {
        self.check_connected()?;
        let mut playlists: Vec<CachedPlaylist> = self
            .playlists
            .iter()
            .filter(|e| e.user_id == user_id)
            .map(|e| e.value().clone())
            .collect();
        playlists.sort_by(|a, b| a.title.cmp(&b.title));
        Ok(playlists)
    }

    async fn count_playlists(&self, user_id: &str) -> Result<usize, AppError> {
        self.check_connected()?;
        Ok(self
            .playlists
            .iter()
            .filter(|e| e.user_id == user_id)
            .count())
    }

    async fn has_playlists(&self, user_id: &str) -> Result<bool, AppError> {
        self.check_connected()?;
        Ok(self.playlists.iter().any(|e| e.user_id == user_id))
    }

    async fn save_playlist(&self, playlist: &CachedPlaylist) -> Result<(), AppError> {
        self.check_connected()?;
        self.playlists.insert(playlist.doc_id(), playlist.clone());
        Ok(())
    }

    async fn insert_playlists(&self, playlists: &[CachedPlaylist]) -> Result<usize, AppError> {
        self.check_connected()?;
        let mut inserted = 0;
        for playlist in playlists {
            let doc_id = playlist.doc_id();
            if self.playlists.contains_key(&doc_id) {
                tracing::warn!(doc_id = %doc_id, "Skipping duplicate playlist row");
                continue;
            }
            self.playlists.insert(doc_id, playlist.clone());
            inserted += 1;
        }
        Ok(inserted)
    }

    async fn delete_playlists(&self, user_id: &str) -> Result<usize, AppError> {
        self.check_connected()?;
        let before = self.playlists.len();
        self.playlists.retain(|_, p| p.user_id != user_id);
        Ok(before - self.playlists.len())
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn get_user(&self, user_id: &str) -> Result<Option<User>, AppError> {
        self.check_connected()?;
        Ok(self.users.get(user_id).map(|u| u.value().clone()))
    }

    async fn upsert_user(&self, user: &User) -> Result<(), AppError> {
        self.check_connected()?;
        self.users.insert(user.user_id.clone(), user.clone());
        Ok(())
    }

    async fn list_active_user_ids(&self) -> Result<Vec<String>, AppError> {
        self.check_connected()?;
        Ok(self
            .users
            .iter()
            .filter(|u| !u.requires_reauth)
            .map(|u| u.user_id.clone())
            .collect())
    }

    async fn mark_reauth_required(&self, user_id: &str, reason: &str) -> Result<(), AppError> {
        self.check_connected()?;
        let mut user = self
            .users
            .get_mut(user_id)
            .ok_or_else(|| AppError::NotFound(format!("User {}", user_id)))?;
        user.requires_reauth = true;
        user.reauth_reason = Some(reason.to_string());
        user.reauth_flagged_at = Some(chrono::Utc::now().to_rfc3339());
        Ok(())
    }

    async fn get_tokens(&self, user_id: &str) -> Result<Option<UserTokens>, AppError> {
        self.check_connected()?;
        Ok(self.tokens.get(user_id).map(|t| t.value().clone()))
    }

    async fn set_tokens(&self, user_id: &str, tokens: &UserTokens) -> Result<(), AppError> {
        self.check_connected()?;
        self.tokens.insert(user_id.to_string(), tokens.clone());
        Ok(())
    }

    async fn delete_tokens(&self, user_id: &str) -> Result<(), AppError> {
        self.check_connected()?;
        self.tokens.remove(user_id);
        Ok(())
    }

    async fn get_api_usage(
        &self,
        user_id: &str,
        service: &str,
        date: NaiveDate,
    ) -> Result<u32, AppError> {
        self.check_connected()?;
        Ok(self
            .usage
            .get(&ApiUsage::doc_id_for(user_id, service, date))
            .map(|u| u.count)
            .unwrap_or(0))
    }

    async fn increment_api_usage(
        &self,
        user_id: &str,
        service: &str,
        date: NaiveDate,
    ) -> Result<u32, AppError> {
        self.check_connected()?;
        let mut entry = self
            .usage
            .entry(ApiUsage::doc_id_for(user_id, service, date))
            .or_insert_with(|| ApiUsage {
                user_id: user_id.to_string(),
                service: service.to_string(),
                date: date.format("%Y-%m-%d").to_string(),
                count: 0,
                updated_at: String::new(),
            });
        entry.count += 1;
        entry.updated_at = chrono::Utc::now().to_rfc3339();
        Ok(entry.count)
    }
}
