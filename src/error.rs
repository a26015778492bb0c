// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types with consistent API responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Application error type that converts to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Authentication required")]
    Unauthorized,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("YouTube API error: {0}")]
    YouTubeApi(String),

    /// The identity provider rejected the refresh credential permanently.
    #[error("Refresh token rejected (invalid_grant)")]
    InvalidGrant,

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Error message used when the YouTube API reports quota exhaustion or rate limiting.
    pub const YOUTUBE_RATE_LIMIT: &'static str = "YouTube rate limit exceeded";

    /// Error message used when the YouTube API rejects the access token.
    pub const YOUTUBE_TOKEN_ERROR: &'static str = "YouTube access token invalid or expired";

    /// Returns true if the error indicates the YouTube access token was rejected.
    pub fn is_youtube_token_error(&self) -> bool {
        matches!(self, AppError::YouTubeApi(msg) if msg == Self::YOUTUBE_TOKEN_ERROR)
    }

    /// Returns true if the error indicates a rate limit or quota condition.
    pub fn is_rate_limited(&self) -> bool {
        match self {
            AppError::RateLimited(_) => true,
            AppError::YouTubeApi(msg) => msg == Self::YOUTUBE_RATE_LIMIT,
            _ => false,
        }
    }
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details) = match &self {
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized", None),
            AppError::InvalidToken => (StatusCode::UNAUTHORIZED, "invalid_token", None),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", Some(msg.clone())),
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "bad_request", Some(msg.clone()))
            }
            AppError::RateLimited(msg) => (
                StatusCode::TOO_MANY_REQUESTS,
                "rate_limited",
                Some(msg.clone()),
            ),
            AppError::YouTubeApi(msg) => {
                (StatusCode::BAD_GATEWAY, "youtube_error", Some(msg.clone()))
            }
            AppError::InvalidGrant => (StatusCode::UNAUTHORIZED, "invalid_grant", None),
            AppError::Database(msg) => {
                tracing::error!(error = %msg, "Database error");
                (StatusCode::INTERNAL_SERVER_ERROR, "database_error", None)
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AppError>;
