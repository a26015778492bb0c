// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! YouTube Data API client.
//!
//! Handles:
//! - Paginated subscription and playlist listings
//! - Recent-upload lookups for a channel (differential sync)
//! - Conditional playlist item fetches using ETags
//! - Music classification of channels and playlists by sampling video categories
//! - Rate limit / quota detection

use crate::error::AppError;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::StatusCode;
use serde::Deserialize;

/// YouTube's category ID for "Music".
const MUSIC_CATEGORY_ID: &str = "10";

/// Freebase topic URL suffix YouTube attaches to music channels.
const MUSIC_TOPIC_SUFFIX: &str = "/wiki/Music";

/// Auto-generated artist channels carry this title suffix.
const ARTIST_TOPIC_TITLE_SUFFIX: &str = " - Topic";

/// Max page size accepted by the list endpoints.
pub const MAX_PAGE_SIZE: u32 = 50;

/// Items sampled when classifying a playlist.
const PLAYLIST_SAMPLE_SIZE: u32 = 10;

// ─── Result records ─────────────────────────────────────────────────────────

/// One page of a paginated listing.
#[derive(Debug, Clone, Default)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_page_token: Option<String>,
}

/// A channel the user is subscribed to.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionItem {
    pub subscription_id: String,
    pub channel_id: String,
    pub title: String,
    pub description: String,
    pub thumbnail: Option<String>,
}

/// One of the user's own playlists.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaylistSummary {
    pub playlist_id: String,
    pub title: String,
    pub description: String,
    pub thumbnail: Option<String>,
    pub item_count: u32,
    pub channel_id: Option<String>,
    pub channel_title: Option<String>,
    pub privacy_status: Option<String>,
}

/// A video uploaded by a channel.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoItem {
    pub video_id: String,
    /// YouTube occasionally omits titles (e.g. deleted or private uploads).
    pub title: Option<String>,
    pub thumbnail: Option<String>,
    pub published_at: DateTime<Utc>,
}

/// An entry of a playlist.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaylistItem {
    pub video_id: Option<String>,
    pub title: Option<String>,
    pub thumbnail: Option<String>,
}

/// Result of a conditional playlist items fetch.
#[derive(Debug, Clone, Default)]
pub struct PlaylistItemsPage {
    pub items: Vec<PlaylistItem>,
    /// ETag of this response; echo it back to detect "no change".
    pub etag: Option<String>,
    /// Total number of items in the playlist, when reported.
    pub total_results: Option<u32>,
    pub next_page_token: Option<String>,
    /// The server answered 304 for the ETag that was sent.
    pub not_modified: bool,
}

impl PlaylistItemsPage {
    /// Response for an unchanged playlist.
    pub fn not_modified(etag: Option<String>) -> Self {
        Self {
            etag,
            not_modified: true,
            ..Default::default()
        }
    }
}

// ─── Capabilities ───────────────────────────────────────────────────────────

/// Remote listing operations used by the cache sync.
#[async_trait]
pub trait YouTubeApi: Send + Sync {
    async fn list_subscriptions(
        &self,
        access_token: &str,
        page_token: Option<&str>,
    ) -> Result<Page<SubscriptionItem>, AppError>;

    async fn list_playlists(
        &self,
        access_token: &str,
        page_token: Option<&str>,
    ) -> Result<Page<PlaylistSummary>, AppError>;

    /// Most recent uploads of a channel published after `since`, newest first.
    async fn list_channel_videos_since(
        &self,
        access_token: &str,
        channel_id: &str,
        since: DateTime<Utc>,
        max_results: u32,
    ) -> Result<Vec<VideoItem>, AppError>;

    /// List playlist items, sending `etag` as `If-None-Match` when present.
    async fn list_playlist_items(
        &self,
        access_token: &str,
        playlist_id: &str,
        page_token: Option<&str>,
        etag: Option<&str>,
    ) -> Result<PlaylistItemsPage, AppError>;
}

/// Best-effort music classification.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify_channel_as_music(
        &self,
        access_token: &str,
        channel_id: &str,
        sample_size: u32,
    ) -> Result<bool, AppError>;

    async fn classify_playlist_as_music(
        &self,
        access_token: &str,
        playlist_id: &str,
    ) -> Result<bool, AppError>;
}

// ─── HTTP client ────────────────────────────────────────────────────────────

/// YouTube Data API v3 client.
#[derive(Clone)]
pub struct YouTubeClient {
    http: reqwest::Client,
    base_url: String,
}

impl Default for YouTubeClient {
    fn default() -> Self {
        Self::new()
    }
}

impl YouTubeClient {
    pub fn new() -> Self {
        Self::with_base_url("https://www.googleapis.com/youtube/v3")
    }

    /// Point the client at a different API root (used against local fakes).
    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Generic GET request with JSON response.
    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        access_token: &str,
        query: &[(&str, String)],
    ) -> Result<T, AppError> {
        let url = format!("{}/{}", self.base_url, path);
        let response = self
            .http
            .get(&url)
            .bearer_auth(access_token)
            .query(query)
            .send()
            .await
            .map_err(|e| AppError::YouTubeApi(e.to_string()))?;

        check_response_json(response).await
    }

    /// Category IDs of the given videos (missing videos are skipped).
    async fn video_categories(
        &self,
        access_token: &str,
        video_ids: &[String],
    ) -> Result<Vec<String>, AppError> {
        if video_ids.is_empty() {
            return Ok(Vec::new());
        }

        let response: ApiListResponse<ApiVideo> = self
            .get_json(
                "videos",
                access_token,
                &[
                    ("part", "snippet".to_string()),
                    ("id", video_ids.join(",")),
                    ("maxResults", MAX_PAGE_SIZE.to_string()),
                ],
            )
            .await?;

        Ok(response
            .items
            .into_iter()
            .filter_map(|v| v.snippet.and_then(|s| s.category_id))
            .collect())
    }
}

#[async_trait]
impl YouTubeApi for YouTubeClient {
    async fn list_subscriptions(
        &self,
        access_token: &str,
        page_token: Option<&str>,
    ) -> Result<Page<SubscriptionItem>, AppError> {
        let mut query = vec![
            ("part", "snippet".to_string()),
            ("mine", "true".to_string()),
            ("maxResults", MAX_PAGE_SIZE.to_string()),
        ];
        if let Some(token) = page_token {
            query.push(("pageToken", token.to_string()));
        }

        let response: ApiListResponse<ApiSubscription> = self
            .get_json("subscriptions", access_token, &query)
            .await?;

        let items = response
            .items
            .into_iter()
            .filter_map(|s| {
                let channel_id = s.snippet.resource_id.channel_id?;
                Some(SubscriptionItem {
                    subscription_id: s.id,
                    channel_id,
                    title: s.snippet.title.unwrap_or_default(),
                    description: s.snippet.description.unwrap_or_default(),
                    thumbnail: s.snippet.thumbnails.and_then(|t| t.best()),
                })
            })
            .collect();

        Ok(Page {
            items,
            next_page_token: response.next_page_token,
        })
    }

    async fn list_playlists(
        &self,
        access_token: &str,
        page_token: Option<&str>,
    ) -> Result<Page<PlaylistSummary>, AppError> {
        let mut query = vec![
            ("part", "snippet,contentDetails,status".to_string()),
            ("mine", "true".to_string()),
            ("maxResults", MAX_PAGE_SIZE.to_string()),
        ];
        if let Some(token) = page_token {
            query.push(("pageToken", token.to_string()));
        }

        let response: ApiListResponse<ApiPlaylist> =
            self.get_json("playlists", access_token, &query).await?;

        let items = response
            .items
            .into_iter()
            .map(|p| PlaylistSummary {
                playlist_id: p.id,
                title: p.snippet.title.unwrap_or_default(),
                description: p.snippet.description.unwrap_or_default(),
                thumbnail: p.snippet.thumbnails.and_then(|t| t.best()),
                item_count: p.content_details.map(|c| c.item_count).unwrap_or(0),
                channel_id: p.snippet.channel_id,
                channel_title: p.snippet.channel_title,
                privacy_status: p.status.and_then(|s| s.privacy_status),
            })
            .collect();

        Ok(Page {
            items,
            next_page_token: response.next_page_token,
        })
    }

    async fn list_channel_videos_since(
        &self,
        access_token: &str,
        channel_id: &str,
        since: DateTime<Utc>,
        max_results: u32,
    ) -> Result<Vec<VideoItem>, AppError> {
        let response: ApiListResponse<ApiSearchResult> = self
            .get_json(
                "search",
                access_token,
                &[
                    ("part", "snippet".to_string()),
                    ("channelId", channel_id.to_string()),
                    (
                        "publishedAfter",
                        since.to_rfc3339_opts(SecondsFormat::Secs, true),
                    ),
                    ("order", "date".to_string()),
                    ("type", "video".to_string()),
                    ("maxResults", max_results.to_string()),
                ],
            )
            .await?;

        Ok(response
            .items
            .into_iter()
            .filter_map(|r| {
                let video_id = r.id.video_id?;
                let published_at = DateTime::parse_from_rfc3339(r.snippet.published_at.as_deref()?)
                    .ok()?
                    .with_timezone(&Utc);
                Some(VideoItem {
                    video_id,
                    title: r.snippet.title,
                    thumbnail: r.snippet.thumbnails.and_then(|t| t.best()),
                    published_at,
                })
            })
            .collect())
    }

    async fn list_playlist_items(
        &self,
        access_token: &str,
        playlist_id: &str,
        page_token: Option<&str>,
        etag: Option<&str>,
    ) -> Result<PlaylistItemsPage, AppError> {
        let url = format!("{}/playlistItems", self.base_url);
        let mut query = vec![
            ("part", "snippet".to_string()),
            ("playlistId", playlist_id.to_string()),
            ("maxResults", MAX_PAGE_SIZE.to_string()),
        ];
        if let Some(token) = page_token {
            query.push(("pageToken", token.to_string()));
        }

        let mut request = self.http.get(&url).bearer_auth(access_token).query(&query);
        if let Some(etag) = etag {
            request = request.header(reqwest::header::IF_NONE_MATCH, etag);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AppError::YouTubeApi(e.to_string()))?;

        if response.status() == StatusCode::NOT_MODIFIED {
            return Ok(PlaylistItemsPage::not_modified(etag.map(str::to_string)));
        }

        let response: ApiListResponse<ApiPlaylistItem> = check_response_json(response).await?;

        let items = response
            .items
            .into_iter()
            .map(|item| PlaylistItem {
                video_id: item.snippet.resource_id.video_id,
                title: item.snippet.title,
                thumbnail: item.snippet.thumbnails.and_then(|t| t.best()),
            })
            .collect();

        Ok(PlaylistItemsPage {
            items,
            etag: response.etag,
            total_results: response.page_info.and_then(|p| p.total_results),
            next_page_token: response.next_page_token,
            not_modified: false,
        })
    }
}

#[async_trait]
impl Classifier for YouTubeClient {
    async fn classify_channel_as_music(
        &self,
        access_token: &str,
        channel_id: &str,
        sample_size: u32,
    ) -> Result<bool, AppError> {
        // Topic metadata is cheap (1 quota unit) and decisive when present.
        let channels: ApiListResponse<ApiChannel> = self
            .get_json(
                "channels",
                access_token,
                &[
                    ("part", "snippet,topicDetails".to_string()),
                    ("id", channel_id.to_string()),
                ],
            )
            .await?;

        if let Some(channel) = channels.items.first() {
            if channel.has_music_topic() {
                return Ok(true);
            }
        }

        let recent = self
            .list_channel_videos_since(
                access_token,
                channel_id,
                DateTime::<Utc>::UNIX_EPOCH,
                sample_size,
            )
            .await?;
        let video_ids: Vec<String> = recent.into_iter().map(|v| v.video_id).collect();
        let categories = self.video_categories(access_token, &video_ids).await?;

        Ok(is_mostly_music(&categories))
    }

    async fn classify_playlist_as_music(
        &self,
        access_token: &str,
        playlist_id: &str,
    ) -> Result<bool, AppError> {
        let page = self
            .list_playlist_items(access_token, playlist_id, None, None)
            .await?;
        let video_ids: Vec<String> = page
            .items
            .into_iter()
            .filter_map(|i| i.video_id)
            .take(PLAYLIST_SAMPLE_SIZE as usize)
            .collect();
        let categories = self.video_categories(access_token, &video_ids).await?;

        Ok(is_mostly_music(&categories))
    }
}

/// True when more than half of the sampled videos are in the Music category.
pub fn is_mostly_music(categories: &[String]) -> bool {
    if categories.is_empty() {
        return false;
    }
    let music = categories
        .iter()
        .filter(|c| c.as_str() == MUSIC_CATEGORY_ID)
        .count();
    music * 2 > categories.len()
}

/// Check response and parse JSON body.
async fn check_response_json<T: for<'de> Deserialize<'de>>(
    response: reqwest::Response,
) -> Result<T, AppError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(classify_error(status, &body));
    }

    response
        .json()
        .await
        .map_err(|e| AppError::YouTubeApi(format!("JSON parse error: {}", e)))
}

/// Map a failed YouTube response to an error.
fn classify_error(status: StatusCode, body: &str) -> AppError {
    if status == StatusCode::TOO_MANY_REQUESTS
        || (status == StatusCode::FORBIDDEN
            && (body.contains("quotaExceeded") || body.contains("rateLimitExceeded")))
    {
        tracing::warn!(status = %status, "YouTube quota or rate limit hit");
        return AppError::YouTubeApi(AppError::YOUTUBE_RATE_LIMIT.to_string());
    }

    if status == StatusCode::UNAUTHORIZED {
        return AppError::YouTubeApi(AppError::YOUTUBE_TOKEN_ERROR.to_string());
    }

    AppError::YouTubeApi(format!("HTTP {}: {}", status, body))
}

// ─── Wire format ────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiListResponse<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
    etag: Option<String>,
    next_page_token: Option<String>,
    page_info: Option<ApiPageInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiPageInfo {
    total_results: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct ApiThumbnail {
    url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ApiThumbnails {
    default: Option<ApiThumbnail>,
    medium: Option<ApiThumbnail>,
    high: Option<ApiThumbnail>,
}

impl ApiThumbnails {
    /// Highest resolution thumbnail available.
    fn best(self) -> Option<String> {
        [self.high, self.medium, self.default]
            .into_iter()
            .flatten()
            .find_map(|t| t.url)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiResourceId {
    channel_id: Option<String>,
    video_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiSubscription {
    id: String,
    snippet: ApiSubscriptionSnippet,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiSubscriptionSnippet {
    title: Option<String>,
    description: Option<String>,
    #[serde(default)]
    resource_id: ApiResourceId,
    thumbnails: Option<ApiThumbnails>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiPlaylist {
    id: String,
    snippet: ApiPlaylistSnippet,
    content_details: Option<ApiPlaylistContentDetails>,
    status: Option<ApiStatus>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiPlaylistSnippet {
    title: Option<String>,
    description: Option<String>,
    channel_id: Option<String>,
    channel_title: Option<String>,
    thumbnails: Option<ApiThumbnails>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiPlaylistContentDetails {
    #[serde(default)]
    item_count: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiStatus {
    privacy_status: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiSearchResult {
    #[serde(default)]
    id: ApiResourceId,
    snippet: ApiSearchSnippet,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiSearchSnippet {
    title: Option<String>,
    published_at: Option<String>,
    thumbnails: Option<ApiThumbnails>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiPlaylistItem {
    snippet: ApiPlaylistItemSnippet,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiPlaylistItemSnippet {
    title: Option<String>,
    #[serde(default)]
    resource_id: ApiResourceId,
    thumbnails: Option<ApiThumbnails>,
}

#[derive(Debug, Deserialize)]
struct ApiVideo {
    snippet: Option<ApiVideoSnippet>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiVideoSnippet {
    category_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiChannel {
    snippet: Option<ApiChannelSnippet>,
    topic_details: Option<ApiTopicDetails>,
}

#[derive(Debug, Deserialize)]
struct ApiChannelSnippet {
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiTopicDetails {
    #[serde(default)]
    topic_categories: Vec<String>,
}

impl ApiChannel {
    fn has_music_topic(&self) -> bool {
        let artist_channel = self
            .snippet
            .as_ref()
            .and_then(|s| s.title.as_deref())
            .is_some_and(|t| t.ends_with(ARTIST_TOPIC_TITLE_SUFFIX));

        let music_topic = self.topic_details.as_ref().is_some_and(|d| {
            d.topic_categories
                .iter()
                .any(|c| c.ends_with(MUSIC_TOPIC_SUFFIX))
        });

        artist_channel || music_topic
    }
}
