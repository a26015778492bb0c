// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Differential sync of cached playlists using ETag-conditional fetches.

use crate::db::CacheStore;
use crate::error::AppError;
use crate::models::CachedPlaylist;
use crate::services::youtube::{Classifier, PlaylistItemsPage, YouTubeApi};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Counts from one playlist pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlaylistSyncStats {
    pub updated: usize,
    /// Server answered "not modified"
    pub not_modified: usize,
    pub unchanged: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PlaylistWrite {
    /// Item count, ETag, thumbnail, flag and timestamp.
    Contents,
    /// Flag and timestamp only.
    FlagOnly,
    None,
}

/// Updates each cached playlist of a user.
#[derive(Clone)]
pub struct PlaylistUpdater {
    api: Arc<dyn YouTubeApi>,
    classifier: Arc<dyn Classifier>,
    store: Arc<dyn CacheStore>,
}

enum Outcome {
    Written,
    NotModified,
    Unchanged,
}

impl PlaylistUpdater {
    pub fn new(
        api: Arc<dyn YouTubeApi>,
        classifier: Arc<dyn Classifier>,
        store: Arc<dyn CacheStore>,
    ) -> Self {
        Self {
            api,
            classifier,
            store,
        }
    }

    /// Update every cached playlist of `user_id`.
    ///
    /// Never fails: a playlist that errors is logged and skipped.
    pub async fn update_playlist_cache(
        &self,
        user_id: &str,
        access_token: &str,
        force: bool,
    ) -> PlaylistSyncStats {
        let mut stats = PlaylistSyncStats::default();

        let playlists = match self.store.get_playlists(user_id).await {
            Ok(p) => p,
            Err(e) => {
                tracing::error!(user_id, error = %e, "Failed to load cached playlists");
                return stats;
            }
        };

        if playlists.is_empty() {
            tracing::info!(user_id, "No cached playlists to update");
            return stats;
        }

        for playlist in &playlists {
            match self.update_one(playlist, access_token, force).await {
                Ok(Outcome::Written) => stats.updated += 1,
                Ok(Outcome::NotModified) => stats.not_modified += 1,
                Ok(Outcome::Unchanged) => stats.unchanged += 1,
                Err(e) => {
                    stats.failed += 1;
                    tracing::warn!(
                        user_id,
                        playlist_id = %playlist.playlist_id,
                        error = %e,
                        "Playlist update failed, continuing"
                    );
                }
            }
        }

        tracing::info!(
            user_id,
            force,
            updated = stats.updated,
            not_modified = stats.not_modified,
            unchanged = stats.unchanged,
            failed = stats.failed,
            "Playlist cache pass complete"
        );
        stats
    }

    async fn update_one(
        &self,
        playlist: &CachedPlaylist,
        access_token: &str,
        force: bool,
    ) -> Result<Outcome, AppError> {
        // Forced passes never send the ETag, so they always get a full response.
        let etag = if force {
            None
        } else {
            playlist.etag.as_deref()
        };

        let page = self
            .api
            .list_playlist_items(access_token, &playlist.playlist_id, None, etag)
            .await?;

        if page.not_modified {
            tracing::debug!(playlist_id = %playlist.playlist_id, "Playlist not modified");
            return Ok(Outcome::NotModified);
        }

        let write = plan_playlist_write(playlist, &page, force);
        if write == PlaylistWrite::None {
            return Ok(Outcome::Unchanged);
        }

        let is_music = self.classify(playlist, access_token).await;
        let updated = apply_playlist_write(playlist, write, &page, is_music, Utc::now());
        self.store.save_playlist(&updated).await?;

        tracing::debug!(
            playlist_id = %playlist.playlist_id,
            item_count = updated.item_count,
            is_music = ?updated.is_music,
            "Playlist updated"
        );
        Ok(Outcome::Written)
    }

    /// Best-effort classification; failures leave the flag unknown.
    async fn classify(&self, playlist: &CachedPlaylist, access_token: &str) -> Option<bool> {
        match self
            .classifier
            .classify_playlist_as_music(access_token, &playlist.playlist_id)
            .await
        {
            Ok(flag) => Some(flag),
            Err(e) => {
                tracing::debug!(playlist_id = %playlist.playlist_id, error = %e, "Playlist classification failed");
                None
            }
        }
    }
}

fn plan_playlist_write(
    playlist: &CachedPlaylist,
    page: &PlaylistItemsPage,
    force: bool,
) -> PlaylistWrite {
    let etag_changed = page.etag != playlist.etag;

    if !page.items.is_empty() || etag_changed || force {
        PlaylistWrite::Contents
    } else if playlist.is_music.is_none() {
        PlaylistWrite::FlagOnly
    } else {
        PlaylistWrite::None
    }
}

fn apply_playlist_write(
    playlist: &CachedPlaylist,
    write: PlaylistWrite,
    page: &PlaylistItemsPage,
    is_music: Option<bool>,
    now: DateTime<Utc>,
) -> CachedPlaylist {
    let mut updated = playlist.clone();

    if write == PlaylistWrite::Contents {
        updated.item_count = page.total_results.unwrap_or(page.items.len() as u32);
        updated.etag = page.etag.clone();
        if let Some(thumbnail) = page.items.first().and_then(|i| i.thumbnail.clone()) {
            updated.thumbnail = Some(thumbnail);
        }
    }

    if is_music.is_some() {
        updated.is_music = is_music;
    }
    updated.cached_at = now;
    updated
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::youtube::PlaylistItem;

    fn playlist(etag: Option<&str>, is_music: Option<bool>) -> CachedPlaylist {
        CachedPlaylist {
            user_id: "u1".to_string(),
            playlist_id: "PL1".to_string(),
            title: "Mix".to_string(),
            description: String::new(),
            thumbnail: Some("old.jpg".to_string()),
            item_count: 3,
            channel_id: None,
            channel_title: None,
            privacy_status: Some("private".to_string()),
            etag: etag.map(str::to_string),
            is_music,
            cached_at: DateTime::<Utc>::UNIX_EPOCH,
        }
    }

    fn page(etag: Option<&str>, thumbs: &[Option<&str>], total: Option<u32>) -> PlaylistItemsPage {
        PlaylistItemsPage {
            items: thumbs
                .iter()
                .map(|t| PlaylistItem {
                    video_id: Some("v".to_string()),
                    title: None,
                    thumbnail: t.map(str::to_string),
                })
                .collect(),
            etag: etag.map(str::to_string),
            total_results: total,
            next_page_token: None,
            not_modified: false,
        }
    }

    #[test]
    fn test_plan_contents_when_items_returned() {
        let p = playlist(Some("e1"), Some(true));
        assert_eq!(
            plan_playlist_write(&p, &page(Some("e1"), &[None], None), false),
            PlaylistWrite::Contents
        );
    }

    #[test]
    fn test_plan_contents_when_etag_changed() {
        let p = playlist(Some("e1"), Some(true));
        assert_eq!(
            plan_playlist_write(&p, &page(Some("e2"), &[], Some(0)), false),
            PlaylistWrite::Contents
        );
    }

    #[test]
    fn test_plan_flag_only_or_nothing() {
        let empty = page(Some("e1"), &[], Some(0));
        assert_eq!(
            plan_playlist_write(&playlist(Some("e1"), None), &empty, false),
            PlaylistWrite::FlagOnly
        );
        assert_eq!(
            plan_playlist_write(&playlist(Some("e1"), Some(false)), &empty, false),
            PlaylistWrite::None
        );
        assert_eq!(
            plan_playlist_write(&playlist(Some("e1"), Some(false)), &empty, true),
            PlaylistWrite::Contents
        );
    }

    #[test]
    fn test_apply_contents_uses_total_and_first_thumbnail() {
        let updated = apply_playlist_write(
            &playlist(None, None),
            PlaylistWrite::Contents,
            &page(Some("e9"), &[Some("first.jpg"), Some("second.jpg")], Some(120)),
            Some(true),
            Utc::now(),
        );
        assert_eq!(updated.item_count, 120);
        assert_eq!(updated.etag.as_deref(), Some("e9"));
        assert_eq!(updated.thumbnail.as_deref(), Some("first.jpg"));
        assert_eq!(updated.is_music, Some(true));
    }

    #[test]
    fn test_apply_contents_falls_back_to_item_count_and_keeps_thumbnail() {
        let updated = apply_playlist_write(
            &playlist(None, None),
            PlaylistWrite::Contents,
            &page(Some("e9"), &[None, None], None),
            None,
            Utc::now(),
        );
        assert_eq!(updated.item_count, 2);
        assert_eq!(updated.thumbnail.as_deref(), Some("old.jpg"));
        assert_eq!(updated.is_music, None);
    }
}
