// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Differential sync of cached subscription channels.
//!
//! For each cached channel, only uploads newer than the stored watermark
//! (`latest_video_published_at`) are fetched, capped at a handful per channel
//! so a sync pass has a bounded quota cost.

use crate::db::CacheStore;
use crate::error::AppError;
use crate::models::CachedChannel;
use crate::services::youtube::{Classifier, VideoItem, YouTubeApi};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

/// Max uploads fetched per channel per pass.
pub const CHANNEL_FETCH_LIMIT: u32 = 5;

/// Uploads sampled when classifying a channel.
pub const CHANNEL_CLASSIFY_SAMPLE_SIZE: u32 = 5;

/// Watermark used for channels that were never checked.
const DEFAULT_LOOKBACK_DAYS: i64 = 7;

/// Counts from one channel pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelSyncStats {
    pub updated: usize,
    pub unchanged: usize,
    pub failed: usize,
}

/// What a channel row needs after a fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChannelWrite {
    /// New upload: snapshot, flag and timestamp.
    LatestVideo,
    /// Flag and timestamp only.
    FlagOnly,
    None,
}

/// Updates each cached channel of a user from its recent uploads.
#[derive(Clone)]
pub struct ChannelUpdater {
    api: Arc<dyn YouTubeApi>,
    classifier: Arc<dyn Classifier>,
    store: Arc<dyn CacheStore>,
}

impl ChannelUpdater {
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

    /// Update every cached channel of `user_id`.
    ///
    /// Never fails: a channel that errors is logged and skipped.
    pub async fn update_channel_cache(
        &self,
        user_id: &str,
        access_token: &str,
        force: bool,
    ) -> ChannelSyncStats {
        let mut stats = ChannelSyncStats::default();

        let channels = match self.store.get_channels(user_id).await {
            Ok(c) => c,
            Err(e) => {
                tracing::error!(user_id, error = %e, "Failed to load cached channels");
                return stats;
            }
        };

        if channels.is_empty() {
            tracing::info!(user_id, "No cached channels to update");
            return stats;
        }

        for channel in &channels {
            match self.update_one(channel, access_token, force).await {
                Ok(true) => stats.updated += 1,
                Ok(false) => stats.unchanged += 1,
                Err(e) => {
                    stats.failed += 1;
                    tracing::warn!(
                        user_id,
                        channel_id = %channel.channel_id,
                        error = %e,
                        "Channel update failed, continuing"
                    );
                }
            }
        }

        tracing::info!(
            user_id,
            force,
            updated = stats.updated,
            unchanged = stats.unchanged,
            failed = stats.failed,
            "Channel cache pass complete"
        );
        stats
    }

    /// Returns whether the row was written.
    async fn update_one(
        &self,
        channel: &CachedChannel,
        access_token: &str,
        force: bool,
    ) -> Result<bool, AppError> {
        let now = Utc::now();
        let watermark = effective_watermark(channel, force, now);

        let videos = self
            .api
            .list_channel_videos_since(
                access_token,
                &channel.channel_id,
                watermark,
                CHANNEL_FETCH_LIMIT,
            )
            .await?;
        let newest = newest_after(&videos, watermark);

        let write = plan_channel_write(channel, newest.is_some(), force);
        if write == ChannelWrite::None {
            return Ok(false);
        }

        let is_music = self.classify(channel, access_token).await;
        let updated = apply_channel_write(channel, write, newest, is_music, now);
        self.store.save_channel(&updated).await?;

        tracing::debug!(
            channel_id = %channel.channel_id,
            new_video = newest.is_some(),
            is_music = ?updated.is_music,
            "Channel updated"
        );
        Ok(true)
    }

    /// Best-effort classification; failures leave the flag unknown.
    async fn classify(&self, channel: &CachedChannel, access_token: &str) -> Option<bool> {
        match self
            .classifier
            .classify_channel_as_music(
                access_token,
                &channel.channel_id,
                CHANNEL_CLASSIFY_SAMPLE_SIZE,
            )
            .await
        {
            Ok(flag) => Some(flag),
            Err(e) => {
                tracing::debug!(channel_id = %channel.channel_id, error = %e, "Channel classification failed");
                None
            }
        }
    }
}

/// Epoch when forced; else the stored watermark, or a week ago if never set.
fn effective_watermark(
    channel: &CachedChannel,
    force: bool,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    if force {
        return DateTime::<Utc>::UNIX_EPOCH;
    }
    channel
        .latest_video_published_at
        .unwrap_or_else(|| now - Duration::days(DEFAULT_LOOKBACK_DAYS))
}

/// Most recent video published strictly after `watermark`.
fn newest_after(videos: &[VideoItem], watermark: DateTime<Utc>) -> Option<&VideoItem> {
    videos
        .iter()
        .filter(|v| v.published_at > watermark)
        .max_by_key(|v| v.published_at)
}

fn plan_channel_write(channel: &CachedChannel, has_new_video: bool, force: bool) -> ChannelWrite {
    if has_new_video {
        ChannelWrite::LatestVideo
    } else if channel.is_music.is_none() || force {
        ChannelWrite::FlagOnly
    } else {
        ChannelWrite::None
    }
}

fn apply_channel_write(
    channel: &CachedChannel,
    write: ChannelWrite,
    newest: Option<&VideoItem>,
    is_music: Option<bool>,
    now: DateTime<Utc>,
) -> CachedChannel {
    let mut updated = channel.clone();

    if let (ChannelWrite::LatestVideo, Some(video)) = (write, newest) {
        updated.latest_video_id = Some(video.video_id.clone());
        // Empty string marks "checked, but the video has no title".
        updated.latest_video_title = Some(video.title.clone().unwrap_or_default());
        updated.latest_video_thumbnail = video.thumbnail.clone();
        updated.latest_video_published_at = Some(video.published_at);
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
    use chrono::TimeZone;

    fn channel(published_at: Option<DateTime<Utc>>, is_music: Option<bool>) -> CachedChannel {
        CachedChannel {
            user_id: "u1".to_string(),
            channel_id: "UC1".to_string(),
            title: "Channel".to_string(),
            description: String::new(),
            thumbnail: None,
            subscription_id: "sub1".to_string(),
            latest_video_id: None,
            latest_video_title: None,
            latest_video_thumbnail: None,
            latest_video_published_at: published_at,
            is_music,
            cached_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    fn video(id: &str, title: Option<&str>, published_at: DateTime<Utc>) -> VideoItem {
        VideoItem {
            video_id: id.to_string(),
            title: title.map(str::to_string),
            thumbnail: None,
            published_at,
        }
    }

    #[test]
    fn test_watermark_forced_is_epoch() {
        let stored = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let c = channel(Some(stored), Some(false));
        assert_eq!(
            effective_watermark(&c, true, Utc::now()),
            DateTime::<Utc>::UNIX_EPOCH
        );
        assert_eq!(effective_watermark(&c, false, Utc::now()), stored);
    }

    #[test]
    fn test_watermark_defaults_to_a_week_ago() {
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).unwrap();
        let c = channel(None, None);
        assert_eq!(
            effective_watermark(&c, false, now),
            Utc.with_ymd_and_hms(2024, 3, 3, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_newest_after_is_strict_and_picks_latest() {
        let mark = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let videos = vec![
            video("at-mark", Some("a"), mark),
            video("older", Some("b"), mark + Duration::days(1)),
            video("newest", Some("c"), mark + Duration::days(4)),
        ];
        assert_eq!(newest_after(&videos, mark).unwrap().video_id, "newest");
        assert!(newest_after(&videos[..1], mark).is_none());
    }

    #[test]
    fn test_plan_channel_write() {
        assert_eq!(
            plan_channel_write(&channel(None, Some(true)), true, false),
            ChannelWrite::LatestVideo
        );
        assert_eq!(
            plan_channel_write(&channel(None, None), false, false),
            ChannelWrite::FlagOnly
        );
        assert_eq!(
            plan_channel_write(&channel(None, Some(false)), false, true),
            ChannelWrite::FlagOnly
        );
        assert_eq!(
            plan_channel_write(&channel(None, Some(false)), false, false),
            ChannelWrite::None
        );
    }

    #[test]
    fn test_missing_title_stored_as_empty_marker() {
        let now = Utc::now();
        let v = video("v1", None, Utc.with_ymd_and_hms(2024, 1, 5, 0, 0, 0).unwrap());
        let updated = apply_channel_write(
            &channel(None, None),
            ChannelWrite::LatestVideo,
            Some(&v),
            None,
            now,
        );
        assert_eq!(updated.latest_video_title.as_deref(), Some(""));
        assert_eq!(updated.latest_video_id.as_deref(), Some("v1"));
        assert_eq!(updated.cached_at, now);
    }

    #[test]
    fn test_failed_classification_keeps_known_flag() {
        let updated = apply_channel_write(
            &channel(None, Some(true)),
            ChannelWrite::FlagOnly,
            None,
            None,
            Utc::now(),
        );
        assert_eq!(updated.is_music, Some(true));
        assert!(updated.latest_video_id.is_none());
    }
}
