// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! One-shot full fetch of a user's subscriptions and playlists into an empty cache.

use crate::db::CacheStore;
use crate::error::AppError;
use crate::models::{CachedChannel, CachedPlaylist};
use crate::services::youtube::{Page, PlaylistSummary, YouTubeApi};
use chrono::Utc;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

/// Fills an empty cache from the full remote listings.
#[derive(Clone)]
pub struct CachePopulator {
    api: Arc<dyn YouTubeApi>,
    store: Arc<dyn CacheStore>,
}

impl CachePopulator {
    pub fn new(api: Arc<dyn YouTubeApi>, store: Arc<dyn CacheStore>) -> Self {
        Self { api, store }
    }

    /// Fetch every subscription and insert it; returns the number of rows inserted.
    ///
    /// Classification flags are left unset for the next differential pass.
    pub async fn populate_initial_channels(
        &self,
        user_id: &str,
        access_token: &str,
    ) -> Result<usize, AppError> {
        let subscriptions = fetch_all(|page_token| {
            let api = self.api.clone();
            async move {
                api.list_subscriptions(access_token, page_token.as_deref())
                    .await
            }
        })
        .await?;

        let now = Utc::now();
        let rows: Vec<CachedChannel> = subscriptions
            .into_iter()
            .map(|s| CachedChannel {
                user_id: user_id.to_string(),
                channel_id: s.channel_id,
                title: s.title,
                description: s.description,
                thumbnail: s.thumbnail,
                subscription_id: s.subscription_id,
                latest_video_id: None,
                latest_video_title: None,
                latest_video_thumbnail: None,
                latest_video_published_at: None,
                is_music: None,
                cached_at: now,
            })
            .collect();

        let fetched = rows.len();
        let inserted = self.store.insert_channels(&rows).await?;
        tracing::info!(user_id, fetched, inserted, "Populated channel cache");
        Ok(inserted)
    }

    /// Fetch every playlist and insert it; returns the number of rows inserted.
    pub async fn populate_initial_playlists(
        &self,
        user_id: &str,
        access_token: &str,
    ) -> Result<usize, AppError> {
        let playlists = fetch_all(|page_token| {
            let api = self.api.clone();
            async move { api.list_playlists(access_token, page_token.as_deref()).await }
        })
        .await?;

        let now = Utc::now();
        let rows: Vec<CachedPlaylist> = playlists
            .into_iter()
            .map(|p: PlaylistSummary| CachedPlaylist {
                user_id: user_id.to_string(),
                playlist_id: p.playlist_id,
                title: p.title,
                description: p.description,
                thumbnail: p.thumbnail,
                item_count: p.item_count,
                channel_id: p.channel_id,
                channel_title: p.channel_title,
                privacy_status: p.privacy_status,
                etag: None,
                is_music: None,
                cached_at: now,
            })
            .collect();

        let fetched = rows.len();
        let inserted = self.store.insert_playlists(&rows).await?;
        tracing::info!(user_id, fetched, inserted, "Populated playlist cache");
        Ok(inserted)
    }
}

/// Follow the page-token cursor until the listing is exhausted.
///
/// A page token seen twice ends the loop, so a misbehaving server cannot
/// keep it running forever.
async fn fetch_all<T, F, Fut>(mut fetch_page: F) -> Result<Vec<T>, AppError>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<Page<T>, AppError>>,
{
    let mut items = Vec::new();
    let mut seen_tokens = HashSet::new();
    let mut page_token: Option<String> = None;

    loop {
        let page = fetch_page(page_token.take()).await?;
        items.extend(page.items);

        match page.next_page_token {
            Some(next) if seen_tokens.insert(next.clone()) => page_token = Some(next),
            Some(next) => {
                tracing::warn!(page_token = %next, "Repeated page token, stopping pagination");
                break;
            }
            None => break,
        }
    }

    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_fetch_all_follows_cursor_to_exhaustion() {
        let calls = AtomicUsize::new(0);
        let items = fetch_all(|token| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                Ok(match token.as_deref() {
                    None => Page {
                        items: vec![1, 2],
                        next_page_token: Some("p2".to_string()),
                    },
                    Some("p2") => Page {
                        items: vec![3],
                        next_page_token: Some("p3".to_string()),
                    },
                    _ => Page {
                        items: vec![4],
                        next_page_token: None,
                    },
                })
            }
        })
        .await
        .unwrap();

        assert_eq!(items, vec![1, 2, 3, 4]);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_fetch_all_stops_on_repeated_token() {
        let items = fetch_all(|_| async {
            Ok(Page {
                items: vec!["x"],
                next_page_token: Some("same".to_string()),
            })
        })
        .await
        .unwrap();

        assert_eq!(items.len(), 2);
    }

    #[tokio::test]
    async fn test_fetch_all_propagates_page_error() {
        let result: Result<Vec<u8>, AppError> = fetch_all(|token| async move {
            match token {
                None => Ok(Page {
                    items: vec![1],
                    next_page_token: Some("p2".to_string()),
                }),
                Some(_) => Err(AppError::YouTubeApi("boom".to_string())),
            }
        })
        .await;

        assert!(result.is_err());
    }
}
