// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tubesync::config::Config;
use tubesync::db::{FirestoreDb, MemoryStore};
use tubesync::error::AppError;
use tubesync::routes::create_router;
use tubesync::services::google_oauth::RefreshedToken;
use tubesync::services::youtube::{
    Page, PlaylistItem, PlaylistItemsPage, PlaylistSummary, SubscriptionItem, VideoItem,
};
use tubesync::services::{
    CacheSyncService, Classifier, CredentialService, CredentialStore, IdentityProvider,
    KmsService, ResponseCache, UsageLedger, YouTubeApi,
};
use tubesync::AppState;

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

/// Parse an RFC 3339 timestamp.
#[allow(dead_code)]
pub fn ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .expect("valid RFC 3339 timestamp")
        .with_timezone(&Utc)
}

/// Unique user ID for test isolation.
#[allow(dead_code)]
pub fn unique_user_id() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    format!("test-user-{}", nanos)
}

// ═══════════════════════════════════════════════════════════════════════════
// FAKE YOUTUBE
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Clone, Default)]
struct FakePlaylistState {
    items: Vec<PlaylistItem>,
    etag: Option<String>,
    total_results: Option<u32>,
}

/// Scripted YouTube API: listings are paged, uploads are filtered by date and
/// playlists answer "not modified" when the current ETag is echoed back.
#[allow(dead_code)]
#[derive(Default)]
pub struct FakeYouTube {
    page_size: Mutex<usize>,
    subscriptions: Mutex<Vec<SubscriptionItem>>,
    playlists: Mutex<Vec<PlaylistSummary>>,
    uploads: Mutex<HashMap<String, Vec<VideoItem>>>,
    playlist_items: Mutex<HashMap<String, FakePlaylistState>>,
    failing_channels: Mutex<HashSet<String>>,
    failing_playlists: Mutex<HashSet<String>>,
    fail_listings: AtomicBool,
    /// `since` of every uploads lookup, per channel.
    pub uploads_since: Mutex<Vec<(String, DateTime<Utc>)>>,
    /// ETag sent with every playlist items fetch.
    pub etags_sent: Mutex<Vec<(String, Option<String>)>>,
    pub listing_calls: AtomicUsize,
}

#[allow(dead_code)]
impl FakeYouTube {
    pub fn new() -> Arc<Self> {
        let fake = Self::default();
        *fake.page_size.lock().unwrap() = 2;
        Arc::new(fake)
    }

    pub fn add_subscription(&self, channel_id: &str, title: &str) {
        self.subscriptions.lock().unwrap().push(SubscriptionItem {
            subscription_id: format!("sub-{}", channel_id),
            channel_id: channel_id.to_string(),
            title: title.to_string(),
            description: String::new(),
            thumbnail: Some(format!("https://img.example/{}.jpg", channel_id)),
        });
    }

    pub fn add_playlist(&self, playlist_id: &str, title: &str, item_count: u32) {
        self.playlists.lock().unwrap().push(PlaylistSummary {
            playlist_id: playlist_id.to_string(),
            title: title.to_string(),
            description: String::new(),
            thumbnail: None,
            item_count,
            channel_id: Some("UC-me".to_string()),
            channel_title: Some("Me".to_string()),
            privacy_status: Some("private".to_string()),
        });
    }

    pub fn add_upload(
        &self,
        channel_id: &str,
        video_id: &str,
        title: Option<&str>,
        published_at: DateTime<Utc>,
    ) {
        self.uploads
            .lock()
            .unwrap()
            .entry(channel_id.to_string())
            .or_default()
            .push(VideoItem {
                video_id: video_id.to_string(),
                title: title.map(str::to_string),
                thumbnail: Some(format!("https://img.example/{}.jpg", video_id)),
                published_at,
            });
    }

    /// Replace the contents of a playlist and its current ETag.
    pub fn set_playlist_items(&self, playlist_id: &str, etag: &str, video_ids: &[&str]) {
        self.playlist_items.lock().unwrap().insert(
            playlist_id.to_string(),
            FakePlaylistState {
                items: video_ids
                    .iter()
                    .map(|id| PlaylistItem {
                        video_id: Some(id.to_string()),
                        title: Some(format!("Video {}", id)),
                        thumbnail: Some(format!("https://img.example/{}.jpg", id)),
                    })
                    .collect(),
                etag: Some(etag.to_string()),
                total_results: Some(video_ids.len() as u32),
            },
        );
    }

    pub fn fail_channel(&self, channel_id: &str) {
        self.failing_channels
            .lock()
            .unwrap()
            .insert(channel_id.to_string());
    }

    pub fn fail_playlist(&self, playlist_id: &str) {
        self.failing_playlists
            .lock()
            .unwrap()
            .insert(playlist_id.to_string());
    }

    pub fn fail_listings(&self, fail: bool) {
        self.fail_listings.store(fail, Ordering::SeqCst);
    }

    pub fn uploads_calls(&self) -> usize {
        self.uploads_since.lock().unwrap().len()
    }

    fn page<T: Clone>(&self, all: &[T], page_token: Option<&str>) -> Page<T> {
        let size = *self.page_size.lock().unwrap();
        let start: usize = page_token
            .and_then(|t| t.strip_prefix("page-"))
            .and_then(|n| n.parse().ok())
            .unwrap_or(0);
        let end = (start + size).min(all.len());
        Page {
            items: all[start.min(end)..end].to_vec(),
            next_page_token: (end < all.len()).then(|| format!("page-{}", end)),
        }
    }
}

#[async_trait]
impl YouTubeApi for FakeYouTube {
    async fn list_subscriptions(
        &self,
        _access_token: &str,
        page_token: Option<&str>,
    ) -> Result<Page<SubscriptionItem>, AppError> {
        self.listing_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_listings.load(Ordering::SeqCst) {
            return Err(AppError::YouTubeApi("listing unavailable".to_string()));
        }
        let all = self.subscriptions.lock().unwrap().clone();
        Ok(self.page(&all, page_token))
    }

    async fn list_playlists(
        &self,
        _access_token: &str,
        page_token: Option<&str>,
    ) -> Result<Page<PlaylistSummary>, AppError> {
        self.listing_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_listings.load(Ordering::SeqCst) {
            return Err(AppError::YouTubeApi("listing unavailable".to_string()));
        }
        let all = self.playlists.lock().unwrap().clone();
        Ok(self.page(&all, page_token))
    }

    async fn list_channel_videos_since(
        &self,
        _access_token: &str,
        channel_id: &str,
        since: DateTime<Utc>,
        max_results: u32,
    ) -> Result<Vec<VideoItem>, AppError> {
        self.uploads_since
            .lock()
            .unwrap()
            .push((channel_id.to_string(), since));

        if self.failing_channels.lock().unwrap().contains(channel_id) {
            return Err(AppError::YouTubeApi("channel lookup failed".to_string()));
        }

        let mut videos: Vec<VideoItem> = self
            .uploads
            .lock()
            .unwrap()
            .get(channel_id)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter(|v| v.published_at > since)
            .collect();
        videos.sort_by(|a, b| b.published_at.cmp(&a.published_at));
        videos.truncate(max_results as usize);
        Ok(videos)
    }

    async fn list_playlist_items(
        &self,
        _access_token: &str,
        playlist_id: &str,
        _page_token: Option<&str>,
        etag: Option<&str>,
    ) -> Result<PlaylistItemsPage, AppError> {
        self.etags_sent
            .lock()
            .unwrap()
            .push((playlist_id.to_string(), etag.map(str::to_string)));

        if self.failing_playlists.lock().unwrap().contains(playlist_id) {
            return Err(AppError::YouTubeApi("playlist fetch failed".to_string()));
        }

        let state = self
            .playlist_items
            .lock()
            .unwrap()
            .get(playlist_id)
            .cloned()
            .unwrap_or_default();

        if etag.is_some() && etag.map(str::to_string) == state.etag {
            return Ok(PlaylistItemsPage::not_modified(state.etag));
        }

        Ok(PlaylistItemsPage {
            items: state.items,
            etag: state.etag,
            total_results: state.total_results,
            next_page_token: None,
            not_modified: false,
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// FAKE CLASSIFIER
// ═══════════════════════════════════════════════════════════════════════════

#[allow(dead_code)]
pub struct FakeClassifier {
    pub is_music: AtomicBool,
    pub fail: AtomicBool,
    pub calls: AtomicUsize,
}

#[allow(dead_code)]
impl FakeClassifier {
    pub fn new(is_music: bool) -> Arc<Self> {
        Arc::new(Self {
            is_music: AtomicBool::new(is_music),
            fail: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        })
    }

    fn answer(&self) -> Result<bool, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            Err(AppError::YouTubeApi("classification failed".to_string()))
        } else {
            Ok(self.is_music.load(Ordering::SeqCst))
        }
    }
}

#[async_trait]
impl Classifier for FakeClassifier {
    async fn classify_channel_as_music(
        &self,
        _access_token: &str,
        _channel_id: &str,
        _sample_size: u32,
    ) -> Result<bool, AppError> {
        self.answer()
    }

    async fn classify_playlist_as_music(
        &self,
        _access_token: &str,
        _playlist_id: &str,
    ) -> Result<bool, AppError> {
        self.answer()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// FAKE IDENTITY PROVIDER
// ═══════════════════════════════════════════════════════════════════════════

/// How the fake identity provider answers refresh requests.
#[allow(dead_code)]
#[derive(Debug, Clone)]
pub enum RefreshBehavior {
    /// Issue `access_token` valid for an hour.
    Issue(String),
    /// Issue a token without reporting its lifetime.
    IssueWithoutExpiry(String),
    InvalidGrant,
    Unavailable,
}

#[allow(dead_code)]
pub struct FakeIdentity {
    behavior: Mutex<RefreshBehavior>,
    delay: Duration,
    pub calls: AtomicUsize,
}

#[allow(dead_code)]
impl FakeIdentity {
    pub fn new(behavior: RefreshBehavior) -> Arc<Self> {
        Self::with_delay(behavior, Duration::ZERO)
    }

    /// Each refresh takes `delay`, to make concurrent refreshes overlap.
    pub fn with_delay(behavior: RefreshBehavior, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            behavior: Mutex::new(behavior),
            delay,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn set_behavior(&self, behavior: RefreshBehavior) {
        *self.behavior.lock().unwrap() = behavior;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityProvider for FakeIdentity {
    async fn refresh_access_token(&self, _refresh_token: &str) -> Result<RefreshedToken, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let behavior = self.behavior.lock().unwrap().clone();
        match behavior {
            RefreshBehavior::Issue(token) => Ok(RefreshedToken {
                access_token: token,
                refresh_token: None,
                expiry: Some(Utc::now() + chrono::Duration::hours(1)),
            }),
            RefreshBehavior::IssueWithoutExpiry(token) => Ok(RefreshedToken {
                access_token: token,
                refresh_token: None,
                expiry: None,
            }),
            RefreshBehavior::InvalidGrant => Err(AppError::InvalidGrant),
            RefreshBehavior::Unavailable => {
                Err(AppError::YouTubeApi("token endpoint unavailable".to_string()))
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// HARNESS
// ═══════════════════════════════════════════════════════════════════════════

/// A sync service wired to in-memory fakes.
#[allow(dead_code)]
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub youtube: Arc<FakeYouTube>,
    pub classifier: Arc<FakeClassifier>,
    pub identity: Arc<FakeIdentity>,
    pub response_cache: ResponseCache,
    pub sync: Arc<CacheSyncService>,
}

#[allow(dead_code)]
impl Harness {
    pub fn new() -> Self {
        Self::with_identity(FakeIdentity::new(RefreshBehavior::Issue(
            "refreshed-token".to_string(),
        )))
    }

    pub fn with_identity(identity: Arc<FakeIdentity>) -> Self {
        let store = Arc::new(MemoryStore::new());
        let youtube = FakeYouTube::new();
        let classifier = FakeClassifier::new(true);
        let response_cache = ResponseCache::default();

        let credentials = CredentialService::new(
            CredentialStore::new(),
            identity.clone(),
            store.clone(),
            KmsService::new_mock(),
        );
        let sync = Arc::new(CacheSyncService::new(
            credentials,
            store.clone(),
            youtube.clone(),
            classifier.clone(),
            response_cache.clone(),
        ));

        Self {
            store,
            youtube,
            classifier,
            identity,
            response_cache,
            sync,
        }
    }

    /// Register a user with a token valid for an hour.
    pub async fn register(&self, user_id: &str) {
        self.sync
            .register_user_token(
                user_id,
                format!("access-{}", user_id),
                Some(format!("refresh-{}", user_id)),
                Some(Utc::now() + chrono::Duration::hours(1)),
            )
            .await;
    }

    /// Register a user whose access token has already expired.
    pub async fn register_expired(&self, user_id: &str) {
        self.sync
            .register_user_token(
                user_id,
                format!("stale-{}", user_id),
                Some(format!("refresh-{}", user_id)),
                Some(Utc::now() - chrono::Duration::minutes(5)),
            )
            .await;
    }

    pub fn credentials(&self) -> &CredentialService {
        self.sync.credentials()
    }
}

/// Create a test app backed by the harness.
/// Returns the router and the shared state.
#[allow(dead_code)]
pub fn create_test_app(harness: &Harness) -> (axum::Router, Arc<AppState>) {
    let state = Arc::new(AppState {
        config: Config::test_default(),
        cache_store: harness.store.clone(),
        sync_service: harness.sync.clone(),
        response_cache: harness.response_cache.clone(),
        usage: UsageLedger::new(harness.store.clone()),
    });

    (create_router(state.clone()), state)
}

/// Session JWT for `user_id`, signed like the login frontend does.
#[allow(dead_code)]
pub fn create_test_jwt(user_id: &str, signing_key: &[u8]) -> String {
    use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
    use tubesync::middleware::auth::Claims;

    let now = Utc::now().timestamp() as usize;
    let claims = Claims {
        sub: user_id.to_string(),
        iat: now,
        exp: now + 3600,
    };

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(signing_key),
    )
    .expect("Failed to create JWT")
}
