// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Google OAuth token refresh.

use crate::error::AppError;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// A freshly issued access token.
#[derive(Debug, Clone, PartialEq)]
pub struct RefreshedToken {
    pub access_token: String,
    /// Set only when the provider rotated the refresh token.
    pub refresh_token: Option<String>,
    pub expiry: Option<DateTime<Utc>>,
}

/// Credential refresh primitive of an OAuth identity provider.
///
/// Implementations must return [`AppError::InvalidGrant`] when the refresh
/// token is permanently rejected, and any other error for transient failures.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn refresh_access_token(&self, refresh_token: &str) -> Result<RefreshedToken, AppError>;
}

/// Google OAuth 2.0 client.
#[derive(Clone)]
pub struct GoogleOAuthClient {
    http: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: String,
}

impl GoogleOAuthClient {
    pub fn new(client_id: String, client_secret: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            token_url: GOOGLE_TOKEN_URL.to_string(),
            client_id,
            client_secret,
        }
    }
}

#[async_trait]
impl IdentityProvider for GoogleOAuthClient {
    async fn refresh_access_token(&self, refresh_token: &str) -> Result<RefreshedToken, AppError> {
        let response = self
            .http
            .post(&self.token_url)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .map_err(|e| AppError::YouTubeApi(format!("Token refresh request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if is_invalid_grant(&body) {
                return Err(AppError::InvalidGrant);
            }
            tracing::error!(status = %status, body = %body, "Google token refresh failed");
            return Err(AppError::YouTubeApi(format!(
                "Token refresh failed with status {}",
                status
            )));
        }

        let token: TokenRefreshResponse = response
            .json()
            .await
            .map_err(|e| AppError::YouTubeApi(format!("Failed to parse token response: {}", e)))?;

        Ok(token.into_refreshed(Utc::now()))
    }
}

/// Token refresh response from Google.
#[derive(Debug, Clone, Deserialize)]
struct TokenRefreshResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    /// Lifetime in seconds
    #[serde(default)]
    expires_in: Option<i64>,
}

impl TokenRefreshResponse {
    fn into_refreshed(self, now: DateTime<Utc>) -> RefreshedToken {
        RefreshedToken {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expiry: self.expires_in.map(|secs| now + Duration::seconds(secs)),
        }
    }
}

/// Google reports a revoked/expired refresh token as `{"error": "invalid_grant"}`.
fn is_invalid_grant(body: &str) -> bool {
    #[derive(Deserialize)]
    struct OAuthErrorBody {
        error: Option<String>,
    }

    serde_json::from_str::<OAuthErrorBody>(body)
        .ok()
        .and_then(|b| b.error)
        .is_some_and(|e| e == "invalid_grant")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_is_invalid_grant() {
        assert!(is_invalid_grant(
            r#"{"error":"invalid_grant","error_description":"Token has been expired or revoked."}"#
        ));
        assert!(!is_invalid_grant(r#"{"error":"invalid_client"}"#));
        assert!(!is_invalid_grant("Service Unavailable"));
    }

    #[test]
    fn test_refresh_response_expiry_from_expires_in() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let resp = TokenRefreshResponse {
            access_token: "new".to_string(),
            refresh_token: None,
            expires_in: Some(3599),
        };

        let refreshed = resp.into_refreshed(now);
        assert_eq!(refreshed.access_token, "new");
        assert_eq!(refreshed.expiry, Some(now + Duration::seconds(3599)));
        assert!(refreshed.refresh_token.is_none());
    }

    #[test]
    fn test_refresh_response_without_expiry() {
        let resp: TokenRefreshResponse =
            serde_json::from_str(r#"{"access_token":"a","token_type":"Bearer"}"#).unwrap();
        assert!(resp.into_refreshed(Utc::now()).expiry.is_none());
    }
}
