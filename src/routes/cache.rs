// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Cached listing and sync routes for authenticated users.

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::{CachedChannel, CachedPlaylist};
use crate::services::usage::SERVICE_CACHE_RESYNC;
use crate::services::{ResyncError, ResyncSummary};
use crate::AppState;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Cache routes (require authentication via JWT).
/// The auth middleware is applied in routes/mod.rs for these routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/cache/channels", get(get_channels))
        .route("/api/cache/playlists", get(get_playlists))
        .route("/api/cache/sync", post(sync_cache))
        .route("/api/cache/refresh", post(refresh_cache))
}

// ─── Listings ────────────────────────────────────────────────

#[derive(Serialize)]
pub struct ChannelsResponse {
    pub channels: Vec<CachedChannel>,
    pub count: usize,
}

#[derive(Serialize)]
pub struct PlaylistsResponse {
    pub playlists: Vec<CachedPlaylist>,
    pub count: usize,
}

/// Cached subscription channels of the current user.
async fn get_channels(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<ChannelsResponse>> {
    let channels = match state.response_cache.get_channels(&user.user_id) {
        Some(cached) => cached,
        None => {
            let rows = state.cache_store.get_channels(&user.user_id).await?;
            state.response_cache.put_channels(&user.user_id, rows)
        }
    };

    Ok(Json(ChannelsResponse {
        count: channels.len(),
        channels: channels.as_ref().clone(),
    }))
}

/// Cached playlists of the current user.
async fn get_playlists(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<PlaylistsResponse>> {
    let playlists = match state.response_cache.get_playlists(&user.user_id) {
        Some(cached) => cached,
        None => {
            let rows = state.cache_store.get_playlists(&user.user_id).await?;
            state.response_cache.put_playlists(&user.user_id, rows)
        }
    };

    Ok(Json(PlaylistsResponse {
        count: playlists.len(),
        playlists: playlists.as_ref().clone(),
    }))
}

// ─── Sync ────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct SyncRequest {
    #[serde(default)]
    pub force: bool,
}

#[derive(Serialize)]
pub struct SyncResponse {
    /// False when no valid YouTube credential is available.
    pub updated: bool,
}

/// Run a differential sync for the current user.
async fn sync_cache(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<SyncRequest>,
) -> Json<SyncResponse> {
    let updated = state
        .sync_service
        .update_user_caches(&user.user_id, req.force)
        .await;
    Json(SyncResponse { updated })
}

#[derive(Serialize)]
struct ResyncOk {
    ok: bool,
    #[serde(flatten)]
    summary: ResyncSummary,
}

#[derive(Serialize)]
struct ResyncFailed {
    ok: bool,
    error: String,
}

/// Clear the current user's cache and rebuild it. Limited per user per day.
async fn refresh_cache(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Response> {
    let allowed = state
        .usage
        .try_consume(
            &user.user_id,
            SERVICE_CACHE_RESYNC,
            state.config.resync_daily_limit,
        )
        .await?;
    if !allowed {
        return Err(AppError::RateLimited(format!(
            "Cache resync is limited to {} per day",
            state.config.resync_daily_limit
        )));
    }

    let response = match state.sync_service.refresh_user_cache(&user.user_id).await {
        Ok(summary) => Json(ResyncOk { ok: true, summary }).into_response(),
        Err(e) => {
            let status = match e {
                ResyncError::StoreNotConnected => StatusCode::SERVICE_UNAVAILABLE,
                ResyncError::NoAccessToken => StatusCode::UNAUTHORIZED,
                ResyncError::Failed(_) => StatusCode::INTERNAL_SERVER_ERROR,
            };
            (
                status,
                Json(ResyncFailed {
                    ok: false,
                    error: e.to_string(),
                }),
            )
                .into_response()
        }
    };

    Ok(response)
}
