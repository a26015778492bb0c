// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Cache sync orchestration.
//!
//! Drives initial population and the differential updaters for every
//! registered user (scheduled) or a single user (on demand), and implements
//! the destructive clear-and-resync.
//!
//! Runs are single-flight: a batch started while another is still running is
//! skipped, and all work on one user is serialized on a per-user lock.

use crate::db::CacheStore;
use crate::error::AppError;
use crate::services::channel_sync::{ChannelSyncStats, ChannelUpdater};
use crate::services::credentials::CredentialService;
use crate::services::playlist_sync::{PlaylistSyncStats, PlaylistUpdater};
use crate::services::population::CachePopulator;
use crate::services::response_cache::ResponseCache;
use crate::services::youtube::{Classifier, YouTubeApi};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Row counts per entity type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EntityCounts {
    pub channels: usize,
    pub playlists: usize,
}

/// Result of a successful clear-and-resync.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResyncSummary {
    pub deleted: EntityCounts,
    /// Counts right after population, before the forced differential pass.
    pub repopulated: EntityCounts,
    pub updated_at: DateTime<Utc>,
}

/// Typed failure of a clear-and-resync.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResyncError {
    #[error("database_not_connected")]
    StoreNotConnected,

    #[error("no_access_token")]
    NoAccessToken,

    #[error("{0}")]
    Failed(String),
}

/// Outcome of a scheduled batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
    Completed { synced: usize, skipped: usize },
    /// Another batch was still running; nothing was done.
    AlreadyRunning,
}

/// Per-user lock map.
type UserLocks = DashMap<String, Arc<Mutex<()>>>;

/// Orchestrates cache sync for all registered users.
pub struct CacheSyncService {
    credentials: CredentialService,
    store: Arc<dyn CacheStore>,
    channels: ChannelUpdater,
    playlists: PlaylistUpdater,
    populator: CachePopulator,
    response_cache: ResponseCache,
    batch_lock: Mutex<()>,
    user_locks: UserLocks,
}

impl CacheSyncService {
    pub fn new(
        credentials: CredentialService,
        store: Arc<dyn CacheStore>,
        api: Arc<dyn YouTubeApi>,
        classifier: Arc<dyn Classifier>,
        response_cache: ResponseCache,
    ) -> Self {
        Self {
            channels: ChannelUpdater::new(api.clone(), classifier.clone(), store.clone()),
            playlists: PlaylistUpdater::new(api.clone(), classifier, store.clone()),
            populator: CachePopulator::new(api, store.clone()),
            credentials,
            store,
            response_cache,
            batch_lock: Mutex::new(()),
            user_locks: DashMap::new(),
        }
    }

    pub fn credentials(&self) -> &CredentialService {
        &self.credentials
    }

    // ─── Credential lifecycle ────────────────────────────────────────────────

    pub async fn register_user_token(
        &self,
        user_id: &str,
        access_token: String,
        refresh_token: Option<String>,
        expiry: Option<DateTime<Utc>>,
    ) {
        self.credentials
            .register_user_token(user_id, access_token, refresh_token, expiry)
            .await;
    }

    pub async fn unregister_user_token(&self, user_id: &str) {
        self.credentials.unregister_user_token(user_id).await;
        self.user_locks.remove(user_id);
        self.response_cache.invalidate_user(user_id);
    }

    pub async fn preload_user_tokens(&self) -> Result<usize, AppError> {
        self.credentials.preload_user_tokens().await
    }

    // ─── Sync ────────────────────────────────────────────────────────────────

    /// Sync every registered user. Users without a usable credential are skipped.
    pub async fn update_all_caches(&self, force: bool) -> BatchOutcome {
        let Ok(_batch) = self.batch_lock.try_lock() else {
            tracing::warn!(force, "Cache sync batch already running, skipping");
            return BatchOutcome::AlreadyRunning;
        };

        let user_ids = self.credentials.store().user_ids();
        tracing::info!(users = user_ids.len(), force, "Starting cache sync batch");

        let mut synced = 0;
        let mut skipped = 0;
        for user_id in &user_ids {
            if self.update_user_caches(user_id, force).await {
                synced += 1;
            } else {
                skipped += 1;
            }
        }

        tracing::info!(synced, skipped, force, "Cache sync batch complete");
        BatchOutcome::Completed { synced, skipped }
    }

    /// Sync one user. Returns false iff no valid credential could be obtained.
    pub async fn update_user_caches(&self, user_id: &str, force: bool) -> bool {
        let Some(access_token) = self.credentials.ensure_valid_access_token(user_id).await else {
            tracing::info!(user_id, "No valid access token, skipping user");
            return false;
        };

        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;

        self.sync_user(user_id, &access_token, force).await;
        self.response_cache.invalidate_user(user_id);
        true
    }

    async fn sync_user(&self, user_id: &str, access_token: &str, force: bool) {
        if force && self.cache_is_empty(user_id).await {
            tracing::info!(user_id, "Cache empty, running initial population");
            if let Err(e) = self
                .populator
                .populate_initial_channels(user_id, access_token)
                .await
            {
                tracing::error!(user_id, error = %e, "Channel population failed");
            }
            if let Err(e) = self
                .populator
                .populate_initial_playlists(user_id, access_token)
                .await
            {
                tracing::error!(user_id, error = %e, "Playlist population failed");
            }
        }

        self.differential_pass(user_id, access_token, force).await;
    }

    async fn differential_pass(
        &self,
        user_id: &str,
        access_token: &str,
        force: bool,
    ) -> (ChannelSyncStats, PlaylistSyncStats) {
        let channels = self
            .channels
            .update_channel_cache(user_id, access_token, force)
            .await;
        let playlists = self
            .playlists
            .update_playlist_cache(user_id, access_token, force)
            .await;
        (channels, playlists)
    }

    /// No rows of either entity type. A failed lookup is treated as non-empty.
    async fn cache_is_empty(&self, user_id: &str) -> bool {
        let channels = self.store.has_channels(user_id).await;
        let playlists = self.store.has_playlists(user_id).await;

        match (channels, playlists) {
            (Ok(c), Ok(p)) => !c && !p,
            (Err(e), _) | (_, Err(e)) => {
                tracing::warn!(user_id, error = %e, "Failed to check for cached rows");
                false
            }
        }
    }

    // ─── Clear and resync ────────────────────────────────────────────────────

    /// Delete the user's cache and rebuild it from scratch.
    ///
    /// Nothing is touched when the store is down or no credential is available.
    /// Rows are deleted before repopulating; a failure after the delete leaves
    /// the cache partially empty and is returned as [`ResyncError::Failed`].
    pub async fn refresh_user_cache(&self, user_id: &str) -> Result<ResyncSummary, ResyncError> {
        if !self.store.is_connected() {
            tracing::warn!(user_id, "Resync refused, store not connected");
            return Err(ResyncError::StoreNotConnected);
        }

        let Some(access_token) = self.credentials.ensure_valid_access_token(user_id).await else {
            tracing::warn!(user_id, "Resync refused, no access token");
            return Err(ResyncError::NoAccessToken);
        };

        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;

        self.response_cache.invalidate_user(user_id);

        match self.resync(user_id, &access_token).await {
            Ok(summary) => {
                tracing::info!(
                    user_id,
                    deleted_channels = summary.deleted.channels,
                    deleted_playlists = summary.deleted.playlists,
                    repopulated_channels = summary.repopulated.channels,
                    repopulated_playlists = summary.repopulated.playlists,
                    "Cache resync complete"
                );
                Ok(summary)
            }
            Err(e) => {
                tracing::error!(user_id, error = %e, "Cache resync failed");
                Err(ResyncError::Failed(e.to_string()))
            }
        }
    }

    async fn resync(&self, user_id: &str, access_token: &str) -> Result<ResyncSummary, AppError> {
        let deleted = EntityCounts {
            channels: self.store.delete_channels(user_id).await?,
            playlists: self.store.delete_playlists(user_id).await?,
        };

        let repopulated = EntityCounts {
            channels: self
                .populator
                .populate_initial_channels(user_id, access_token)
                .await?,
            playlists: self
                .populator
                .populate_initial_playlists(user_id, access_token)
                .await?,
        };

        self.differential_pass(user_id, access_token, true).await;
        self.response_cache.invalidate_user(user_id);

        Ok(ResyncSummary {
            deleted,
            repopulated,
            updated_at: Utc::now(),
        })
    }

    fn user_lock(&self, user_id: &str) -> Arc<Mutex<()>> {
        self.user_locks
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}
