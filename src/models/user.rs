// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! User model for storage and API.

use serde::{Deserialize, Serialize};

/// Re-auth reason recorded when Google rejects the refresh token.
pub const REAUTH_REASON_INVALID_GRANT: &str = "invalid_grant";

/// User profile stored in Firestore.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Google account subject (also used as document ID)
    pub user_id: String,
    /// Email address (may be None if not shared)
    pub email: Option<String>,
    pub display_name: Option<String>,
    /// When user first connected
    pub created_at: String,
    /// Last activity timestamp
    pub last_active: String,
    /// Set when stored credentials can no longer be refreshed
    #[serde(default)]
    pub requires_reauth: bool,
    /// Why re-authentication is required (e.g. "invalid_grant")
    #[serde(default)]
    pub reauth_reason: Option<String>,
    #[serde(default)]
    pub reauth_flagged_at: Option<String>,
}

/// User's OAuth tokens (encrypted in Firestore).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserTokens {
    /// Encrypted access token (base64)
    pub access_token_encrypted: String,
    /// Encrypted refresh token (base64)
    #[serde(default)]
    pub refresh_token_encrypted: Option<String>,
    /// When the access token expires (ISO 8601)
    #[serde(default)]
    pub expires_at: Option<String>,
    /// Granted OAuth scopes
    #[serde(default)]
    pub scopes: Vec<String>,
}
