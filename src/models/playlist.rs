// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Cached playlist model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One of a user's playlists in the cache.
///
/// Stored at: `cached_playlists/{user_id}_{playlist_id}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedPlaylist {
    /// Owning user
    pub user_id: String,
    /// YouTube playlist ID
    pub playlist_id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub item_count: u32,
    #[serde(default)]
    pub channel_id: Option<String>,
    #[serde(default)]
    pub channel_title: Option<String>,
    /// "public", "unlisted" or "private"
    #[serde(default)]
    pub privacy_status: Option<String>,
    /// ETag of the last playlistItems listing, echoed back for conditional fetch
    #[serde(default)]
    pub etag: Option<String>,
    /// Music playlist flag (`None` = not yet classified)
    #[serde(default)]
    pub is_music: Option<bool>,
    /// Last time this row was written by a sync
    pub cached_at: DateTime<Utc>,
}

impl CachedPlaylist {
    /// Document ID, unique per (user, playlist).
    pub fn doc_id(&self) -> String {
        Self::doc_id_for(&self.user_id, &self.playlist_id)
    }

    pub fn doc_id_for(user_id: &str, playlist_id: &str) -> String {
        format!(
            "{}_{}",
            urlencoding::encode(user_id),
            urlencoding::encode(playlist_id)
        )
    }
}
