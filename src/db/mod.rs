// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Database layer (Firestore, plus an in-memory store for tests and local runs).

pub mod firestore;
pub mod memory;

pub use firestore::FirestoreDb;
pub use memory::MemoryStore;

use crate::error::AppError;
use crate::models::{CachedChannel, CachedPlaylist, User, UserTokens};
use async_trait::async_trait;
use chrono::NaiveDate;

/// Collection names as constants.
pub mod collections {
    pub const USERS: &str = "users";
    pub const TOKENS: &str = "tokens";
    pub const CACHED_CHANNELS: &str = "cached_channels";
    pub const CACHED_PLAYLISTS: &str = "cached_playlists";
    /// Daily usage counters (keyed by user, service and date)
    pub const API_USAGE: &str = "api_usage";
}

/// Per-user cache of subscribed channels and playlists.
///
/// Rows are unique per (user, entity id). Bulk inserts are best-effort:
/// a row that fails (e.g. already exists) does not stop the others.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Whether the backing store is reachable.
    fn is_connected(&self) -> bool;

    async fn get_channels(&self, user_id: &str) -> Result<Vec<CachedChannel>, AppError>;
    async fn count_channels(&self, user_id: &str) -> Result<usize, AppError>;
    /// Whether the user has at least one channel row.
    async fn has_channels(&self, user_id: &str) -> Result<bool, AppError>;
    /// Overwrite an existing (or create a new) channel row.
    async fn save_channel(&self, channel: &CachedChannel) -> Result<(), AppError>;
    /// Insert new rows; returns how many were inserted.
    async fn insert_channels(&self, channels: &[CachedChannel]) -> Result<usize, AppError>;
    /// Delete every channel row of a user; returns how many were deleted.
    async fn delete_channels(&self, user_id: &str) -> Result<usize, AppError>;

    async fn get_playlists(&self, user_id: &str) -> Result<Vec<CachedPlaylist>, AppError>;
    async fn count_playlists(&self, user_id: &str) -> Result<usize, AppError>;
    async fn has_playlists(&self, user_id: &str) -> Result<bool, AppError>;
    async fn save_playlist(&self, playlist: &CachedPlaylist) -> Result<(), AppError>;
    async fn insert_playlists(&self, playlists: &[CachedPlaylist]) -> Result<usize, AppError>;
    async fn delete_playlists(&self, user_id: &str) -> Result<usize, AppError>;
}

/// User records, the persisted credential mirror and the usage ledger.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get_user(&self, user_id: &str) -> Result<Option<User>, AppError>;
    async fn upsert_user(&self, user: &User) -> Result<(), AppError>;
    /// IDs of users whose credentials are still usable (not flagged for re-auth).
    async fn list_active_user_ids(&self) -> Result<Vec<String>, AppError>;
    /// Flag a user as requiring re-authentication.
    async fn mark_reauth_required(&self, user_id: &str, reason: &str) -> Result<(), AppError>;

    async fn get_tokens(&self, user_id: &str) -> Result<Option<UserTokens>, AppError>;
    async fn set_tokens(&self, user_id: &str, tokens: &UserTokens) -> Result<(), AppError>;
    async fn delete_tokens(&self, user_id: &str) -> Result<(), AppError>;

    /// Current counter for (user, service, date); 0 if absent.
    async fn get_api_usage(
        &self,
        user_id: &str,
        service: &str,
        date: NaiveDate,
    ) -> Result<u32, AppError>;
    /// Increment the counter and return its new value.
    async fn increment_api_usage(
        &self,
        user_id: &str,
        service: &str,
        date: NaiveDate,
    ) -> Result<u32, AppError>;
}
