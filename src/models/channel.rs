// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Cached subscription channel model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One subscribed channel in a user's cache.
///
/// Stored at: `cached_channels/{user_id}_{channel_id}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedChannel {
    /// Owning user
    pub user_id: String,
    /// YouTube channel ID
    pub channel_id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub thumbnail: Option<String>,
    /// Subscription resource ID (needed to unsubscribe)
    pub subscription_id: String,

    // ─── Latest video snapshot ───────────────────────────────────
    #[serde(default)]
    pub latest_video_id: Option<String>,
    /// `Some("")` means the video was checked but had no title.
    #[serde(default)]
    pub latest_video_title: Option<String>,
    #[serde(default)]
    pub latest_video_thumbnail: Option<String>,
    /// Watermark for differential fetches
    #[serde(default)]
    pub latest_video_published_at: Option<DateTime<Utc>>,

    /// Music/artist channel flag (`None` = not yet classified)
    #[serde(default)]
    pub is_music: Option<bool>,
    /// Last time this row was written by a sync
    pub cached_at: DateTime<Utc>,
}

impl CachedChannel {
    /// Document ID, unique per (user, channel).
    pub fn doc_id(&self) -> String {
        Self::doc_id_for(&self.user_id, &self.channel_id)
    }

    pub fn doc_id_for(user_id: &str, channel_id: &str) -> String {
        format!(
            "{}_{}",
            urlencoding::encode(user_id),
            urlencoding::encode(channel_id)
        )
    }
}
