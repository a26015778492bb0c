// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-memory OAuth credentials and their refresh lifecycle.
//!
//! The [`CredentialStore`] is the process-wide map of users whose caches can
//! be synced. [`CredentialService`] keeps those credentials valid:
//! - Expiry check with a 60-second safety window
//! - Refresh against Google, serialized per user
//! - Encrypted mirror in Firestore (best effort) for preload at boot
//! - Teardown and re-auth flag when Google rejects the refresh token

use crate::db::UserStore;
use crate::error::AppError;
use crate::models::user::REAUTH_REASON_INVALID_GRANT;
use crate::models::{User, UserTokens};
use crate::services::google_oauth::IdentityProvider;
use crate::services::kms::{self, KmsService};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// A credential is treated as expired this long before its actual expiry.
pub const EXPIRY_SAFETY_WINDOW_SECS: i64 = 60;

/// Assumed lifetime when the provider does not report one (Google issues 1h tokens).
const FALLBACK_TOKEN_LIFETIME_SECS: i64 = 55 * 60;

/// Scope recorded with persisted tokens.
const YOUTUBE_SCOPE: &str = "https://www.googleapis.com/auth/youtube";

/// OAuth credential of one user.
#[derive(Debug, Clone, PartialEq)]
pub struct UserCredential {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expiry: Option<DateTime<Utc>>,
}

impl UserCredential {
    /// Expired iff `expiry - safety window <= now`. No recorded expiry counts as valid.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.expiry {
            Some(expiry) => expiry - Duration::seconds(EXPIRY_SAFETY_WINDOW_SECS) <= now,
            None => false,
        }
    }
}

/// Process-wide map of user ID to credential.
#[derive(Clone, Default)]
pub struct CredentialStore {
    inner: Arc<DashMap<String, UserCredential>>,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, user_id: &str) -> Option<UserCredential> {
        self.inner.get(user_id).map(|c| c.value().clone())
    }

    pub fn insert(&self, user_id: &str, credential: UserCredential) {
        self.inner.insert(user_id.to_string(), credential);
    }

    /// Replace the credential only if the user is still registered.
    pub fn update_existing(&self, user_id: &str, credential: UserCredential) -> bool {
        match self.inner.get_mut(user_id) {
            Some(mut entry) => {
                *entry = credential;
                true
            }
            None => false,
        }
    }

    pub fn remove(&self, user_id: &str) -> Option<UserCredential> {
        self.inner.remove(user_id).map(|(_, c)| c)
    }

    pub fn contains(&self, user_id: &str) -> bool {
        self.inner.contains_key(user_id)
    }

    /// Snapshot of registered user IDs, sorted for a stable batch order.
    pub fn user_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.inner.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// Per-user refresh locks.
pub type RefreshLocks = Arc<DashMap<String, Arc<Mutex<()>>>>;

/// Keeps the credentials in a [`CredentialStore`] valid.
#[derive(Clone)]
pub struct CredentialService {
    store: CredentialStore,
    refresh_locks: RefreshLocks,
    provider: Arc<dyn IdentityProvider>,
    users: Arc<dyn UserStore>,
    kms: KmsService,
}

impl CredentialService {
    pub fn new(
        store: CredentialStore,
        provider: Arc<dyn IdentityProvider>,
        users: Arc<dyn UserStore>,
        kms: KmsService,
    ) -> Self {
        Self {
            store,
            refresh_locks: Arc::new(DashMap::new()),
            provider,
            users,
            kms,
        }
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    // ─── Lifecycle ───────────────────────────────────────────────────────────

    /// Register (or replace) a user's credential, e.g. after login.
    ///
    /// The encrypted mirror and an active user record are written best-effort
    /// so the user is preloaded again after a restart.
    pub async fn register_user_token(
        &self,
        user_id: &str,
        access_token: String,
        refresh_token: Option<String>,
        expiry: Option<DateTime<Utc>>,
    ) {
        let credential = UserCredential {
            access_token,
            refresh_token,
            expiry,
        };

        let lock = self.refresh_lock(user_id);
        let _guard = lock.lock().await;

        self.store.insert(user_id, credential.clone());
        tracing::info!(user_id, "Registered user token for cache sync");

        if let Err(e) = self.persist(user_id, &credential).await {
            tracing::warn!(user_id, error = %e, "Failed to persist registered token, continuing anyway");
        }
        if let Err(e) = self.activate_user(user_id).await {
            tracing::warn!(user_id, error = %e, "Failed to record active user, continuing anyway");
        }
    }

    /// Remove a user's credential, e.g. on logout.
    ///
    /// Waits for an in-flight refresh of the same user, so a refresh cannot
    /// bring the credential back.
    pub async fn unregister_user_token(&self, user_id: &str) {
        let lock = self.refresh_lock(user_id);
        let _guard = lock.lock().await;

        self.store.remove(user_id);
        self.refresh_locks.remove(user_id);
        tracing::info!(user_id, "Unregistered user token");

        if let Err(e) = self.users.delete_tokens(user_id).await {
            tracing::warn!(user_id, error = %e, "Failed to delete persisted tokens");
        }
    }

    /// Re-seed the store from persisted tokens of every user not flagged for re-auth.
    ///
    /// Returns the number of users loaded.
    pub async fn preload_user_tokens(&self) -> Result<usize, AppError> {
        let user_ids = self.users.list_active_user_ids().await?;
        let mut loaded = 0;

        for user_id in user_ids {
            let tokens = match self.users.get_tokens(&user_id).await {
                Ok(Some(t)) => t,
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!(user_id = %user_id, error = %e, "Failed to read persisted tokens");
                    continue;
                }
            };

            let (access_token, refresh_token) = match kms::decrypt_tokens(
                &self.kms,
                &user_id,
                &tokens.access_token_encrypted,
                tokens.refresh_token_encrypted.as_deref(),
            )
            .await
            {
                Ok(t) => t,
                Err(e) => {
                    tracing::warn!(user_id = %user_id, error = %e, "Failed to decrypt tokens (skipping)");
                    continue;
                }
            };

            let expiry = tokens
                .expires_at
                .as_deref()
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| dt.with_timezone(&Utc));

            self.store.insert(
                &user_id,
                UserCredential {
                    access_token,
                    refresh_token,
                    expiry,
                },
            );
            loaded += 1;
        }

        tracing::info!(count = loaded, "Preloaded user tokens");
        Ok(loaded)
    }

    // ─── Refresh ─────────────────────────────────────────────────────────────

    /// Return a currently valid access token for `user_id`, refreshing if needed.
    ///
    /// - `None` if the user is not registered, or Google rejected the refresh
    ///   token (the user is then torn down and flagged for re-auth).
    /// - The stale token if it cannot be refreshed for any other reason.
    pub async fn ensure_valid_access_token(&self, user_id: &str) -> Option<String> {
        let credential = match self.store.get(user_id) {
            Some(c) => c,
            None => {
                tracing::debug!(user_id, "No registered token for user");
                return None;
            }
        };

        if !credential.is_expired(Utc::now()) {
            return Some(credential.access_token);
        }

        let lock = self.refresh_lock(user_id);
        let _guard = lock.lock().await;

        // Another task may have refreshed (or torn down) while we waited.
        let credential = self.store.get(user_id)?;
        if !credential.is_expired(Utc::now()) {
            return Some(credential.access_token);
        }

        let Some(refresh_token) = credential.refresh_token.clone() else {
            tracing::warn!(user_id, "Access token expired and no refresh token, using stale token");
            return Some(credential.access_token);
        };

        tracing::info!(user_id, "Access token expired, refreshing");

        match self.provider.refresh_access_token(&refresh_token).await {
            Ok(refreshed) => {
                let updated = UserCredential {
                    access_token: refreshed.access_token,
                    refresh_token: refreshed.refresh_token.or(Some(refresh_token)),
                    expiry: Some(refreshed.expiry.unwrap_or_else(|| {
                        Utc::now() + Duration::seconds(FALLBACK_TOKEN_LIFETIME_SECS)
                    })),
                };
                if !self.store.update_existing(user_id, updated.clone()) {
                    tracing::info!(user_id, "User unregistered during refresh, discarding token");
                    return None;
                }

                if let Err(e) = self.persist(user_id, &updated).await {
                    tracing::warn!(user_id, error = %e, "Failed to persist refreshed token, continuing anyway");
                }

                tracing::info!(user_id, "Token refreshed");
                Some(updated.access_token)
            }
            Err(AppError::InvalidGrant) => {
                tracing::warn!(user_id, "Refresh token rejected (invalid_grant), requiring re-auth");
                self.tear_down(user_id).await;
                None
            }
            Err(e) => {
                tracing::warn!(user_id, error = %e, "Token refresh failed, using stale token");
                Some(credential.access_token)
            }
        }
    }

    fn refresh_lock(&self, user_id: &str) -> Arc<Mutex<()>> {
        self.refresh_locks
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Create the user record if missing and clear any re-auth flag.
    async fn activate_user(&self, user_id: &str) -> Result<(), AppError> {
        let now = Utc::now().to_rfc3339();
        let user = match self.users.get_user(user_id).await? {
            Some(mut user) => {
                user.requires_reauth = false;
                user.reauth_reason = None;
                user.reauth_flagged_at = None;
                user.last_active = now;
                user
            }
            None => User {
                user_id: user_id.to_string(),
                email: None,
                display_name: None,
                created_at: now.clone(),
                last_active: now,
                requires_reauth: false,
                reauth_reason: None,
                reauth_flagged_at: None,
            },
        };

        self.users.upsert_user(&user).await
    }

    /// Drop all credentials of a user whose refresh token is no longer valid.
    async fn tear_down(&self, user_id: &str) {
        self.store.remove(user_id);

        if let Err(e) = self.users.delete_tokens(user_id).await {
            tracing::warn!(user_id, error = %e, "Failed to clear persisted tokens");
        }
        if let Err(e) = self
            .users
            .mark_reauth_required(user_id, REAUTH_REASON_INVALID_GRANT)
            .await
        {
            tracing::warn!(user_id, error = %e, "Failed to flag user for re-auth");
        }
    }

    /// Write the encrypted mirror of a credential.
    async fn persist(&self, user_id: &str, credential: &UserCredential) -> Result<(), AppError> {
        let (access_enc, refresh_enc) = kms::encrypt_tokens(
            &self.kms,
            user_id,
            &credential.access_token,
            credential.refresh_token.as_deref(),
        )
        .await?;

        let tokens = UserTokens {
            access_token_encrypted: access_enc,
            refresh_token_encrypted: refresh_enc,
            expires_at: credential.expiry.map(|e| e.to_rfc3339()),
            scopes: vec![YOUTUBE_SCOPE.to_string()],
        };

        self.users.set_tokens(user_id, &tokens).await
    }
}
