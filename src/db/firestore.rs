// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore client wrapper with typed operations.
//!
//! Provides high-level operations for:
//! - Users (profile storage and re-auth flag)
//! - Tokens (encrypted OAuth tokens)
//! - Cached channels and playlists (per-user YouTube cache)
//! - API usage (daily counters)

use crate::db::{collections, CacheStore, UserStore};
use crate::error::AppError;
use crate::models::{ApiUsage, CachedChannel, CachedPlaylist, User, UserTokens};
use async_trait::async_trait;
use chrono::NaiveDate;
use futures_util::{stream, StreamExt};

const MAX_CONCURRENT_DB_OPS: usize = 50;
// Firestore limits batch/transaction writes to 500 operations.
// We use a safe limit of 400 to allow headroom.
const BATCH_SIZE: usize = 400;

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: Option<firestore::FirestoreDb>,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, AppError> {
        // If the emulator environment variable is set, use unauthenticated connection
        // to avoid local credential warnings and leakage.
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self, AppError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create an offline client.
    ///
    /// All database operations will return an error if called.
    pub fn new_mock() -> Self {
        Self { client: None }
    }

    /// Helper to get the client or return an error if offline.
    fn get_client(&self) -> Result<&firestore::FirestoreDb, AppError> {
        self.client
            .as_ref()
            .ok_or_else(|| AppError::Database("Database not connected (offline mode)".to_string()))
    }

    // ─── Helper Methods ────────────────────────────────────────────

    /// Query every document of `collection` owned by `user_id`.
    async fn query_by_user<T>(&self, collection: &str, user_id: &str) -> Result<Vec<T>, AppError>
    where
        T: for<'de> serde::Deserialize<'de> + Send,
    {
        self.get_client()?
            .fluent()
            .select()
            .from(collection)
            .filter(|q| q.for_all([q.field("user_id").eq(user_id)]))
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Whether any document of `collection` is owned by `user_id` (reads at most one).
    async fn any_for_user(&self, collection: &str, user_id: &str) -> Result<bool, AppError> {
        let docs = self
            .get_client()?
            .fluent()
            .select()
            .from(collection)
            .filter(|q| q.for_all([q.field("user_id").eq(user_id)]))
            .limit(1)
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(!docs.is_empty())
    }

    /// Overwrite a document.
    async fn set_doc<T>(&self, collection: &str, doc_id: &str, object: &T) -> Result<(), AppError>
    where
        T: serde::Serialize + for<'de> serde::Deserialize<'de> + Send + Sync,
    {
        let _: T = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collection)
            .document_id(doc_id)
            .object(object)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    /// Create documents that must not already exist, tolerating per-row failures.
    ///
    /// Returns the number of documents created.
    async fn insert_many<T, F>(
        &self,
        items: &[T],
        collection: &str,
        id_extractor: F,
    ) -> Result<usize, AppError>
    where
        T: serde::Serialize + for<'de> serde::Deserialize<'de> + Clone + Send + Sync,
        F: Fn(&T) -> String,
    {
        let client = self.get_client()?;

        let rows: Vec<(String, T)> = items
            .iter()
            .map(|item| (id_extractor(item), item.clone()))
            .collect();

        let results = stream::iter(rows)
            .map(|(doc_id, item)| async move {
                let _: T = client
                    .fluent()
                    .insert()
                    .into(collection)
                    .document_id(&doc_id)
                    .object(&item)
                    .execute()
                    .await
                    .map_err(|e| AppError::Database(e.to_string()))?;
                Ok::<_, AppError>(doc_id)
            })
            .buffer_unordered(MAX_CONCURRENT_DB_OPS)
            .collect::<Vec<Result<String, AppError>>>()
            .await;

        let mut inserted = 0;
        for result in results {
            match result {
                Ok(_) => inserted += 1,
                Err(e) => {
                    tracing::warn!(collection, error = %e, "Skipping row that failed to insert");
                }
            }
        }

        Ok(inserted)
    }

    /// Helper to batch delete documents using transactions.
    async fn batch_delete<T, F>(
        &self,
        items: &[T],
        collection: &str,
        id_extractor: F,
    ) -> Result<(), AppError>
    where
        F: Fn(&T) -> String,
    {
        let client = self.get_client()?;

        for chunk in items.chunks(BATCH_SIZE) {
            let mut transaction = client
                .begin_transaction()
                .await
                .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

            for item in chunk {
                let doc_id = id_extractor(item);
                client
                    .fluent()
                    .delete()
                    .from(collection)
                    .document_id(&doc_id)
                    .add_to_transaction(&mut transaction)
                    .map_err(|e| {
                        AppError::Database(format!(
                            "Failed to add deletion to transaction for {}: {}",
                            collection, e
                        ))
                    })?;
            }

            transaction.commit().await.map_err(|e| {
                AppError::Database(format!("Failed to commit batch deletion: {}", e))
            })?;
        }

        Ok(())
    }
}

#[async_trait]
impl CacheStore for FirestoreDb {
    fn is_connected(&self) -> bool {
        self.client.is_some()
    }

    // ─── Channel Operations ──────────────────────────────────────

    async fn get_channels(&self, user_id: &str) -> Result<Vec<CachedChannel>, AppError> {
        self.query_by_user(collections::CACHED_CHANNELS, user_id)
            .await
    }

    async fn count_channels(&self, user_id: &str) -> Result<usize, AppError> {
        Ok(self.get_channels(user_id).await?.len())
    }

    async fn has_channels(&self, user_id: &str) -> Result<bool, AppError> {
        self.any_for_user(collections::CACHED_CHANNELS, user_id)
            .await
    }

    async fn save_channel(&self, channel: &CachedChannel) -> Result<(), AppError> {
        self.set_doc(collections::CACHED_CHANNELS, &channel.doc_id(), channel)
            .await
    }

    async fn insert_channels(&self, channels: &[CachedChannel]) -> Result<usize, AppError> {
        self.insert_many(channels, collections::CACHED_CHANNELS, |c| c.doc_id())
            .await
    }

    async fn delete_channels(&self, user_id: &str) -> Result<usize, AppError> {
        let channels = self.get_channels(user_id).await?;
        let count = channels.len();
        self.batch_delete(&channels, collections::CACHED_CHANNELS, |c| c.doc_id())
            .await?;
        tracing::debug!(user_id, count, "Deleted cached channels");
        Ok(count)
    }

    // ─── Playlist Operations ─────────────────────────────────────

    async fn get_playlists(&self, user_id: &str) -> Result<Vec<CachedPlaylist>, AppError> {
        self.query_by_user(collections::CACHED_PLAYLISTS, user_id)
            .await
    }

    async fn count_playlists(&self, user_id: &str) -> Result<usize, AppError> {
        Ok(self.get_playlists(user_id).await?.len())
    }

    async fn has_playlists(&self, user_id: &str) -> Result<bool, AppError> {
        self.any_for_user(collections::CACHED_PLAYLISTS, user_id)
            .await
    }

    async fn save_playlist(&self, playlist: &CachedPlaylist) -> Result<(), AppError> {
        self.set_doc(collections::CACHED_PLAYLISTS, &playlist.doc_id(), playlist)
            .await
    }

    async fn insert_playlists(&self, playlists: &[CachedPlaylist]) -> Result<usize, AppError> {
        self.insert_many(playlists, collections::CACHED_PLAYLISTS, |p| p.doc_id())
            .await
    }

    async fn delete_playlists(&self, user_id: &str) -> Result<usize, AppError> {
        let playlists = self.get_playlists(user_id).await?;
        let count = playlists.len();
        self.batch_delete(&playlists, collections::CACHED_PLAYLISTS, |p| p.doc_id())
            .await?;
        tracing::debug!(user_id, count, "Deleted cached playlists");
        Ok(count)
    }
}

#[async_trait]
impl UserStore for FirestoreDb {
    // ─── User Operations ─────────────────────────────────────────

    async fn get_user(&self, user_id: &str) -> Result<Option<User>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::USERS)
            .obj()
            .one(user_id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn upsert_user(&self, user: &User) -> Result<(), AppError> {
        self.set_doc(collections::USERS, &user.user_id, user).await
    }

    async fn list_active_user_ids(&self) -> Result<Vec<String>, AppError> {
        let users: Vec<User> = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::USERS)
            .filter(|q| q.for_all([q.field("requires_reauth").eq(false)]))
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(users.into_iter().map(|u| u.user_id).collect())
    }

    async fn mark_reauth_required(&self, user_id: &str, reason: &str) -> Result<(), AppError> {
        let mut user = self
            .get_user(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {}", user_id)))?;

        user.requires_reauth = true;
        user.reauth_reason = Some(reason.to_string());
        user.reauth_flagged_at = Some(chrono::Utc::now().to_rfc3339());

        self.upsert_user(&user).await
    }

    // ─── Token Operations ────────────────────────────────────────

    async fn get_tokens(&self, user_id: &str) -> Result<Option<UserTokens>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::TOKENS)
            .obj()
            .one(user_id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn set_tokens(&self, user_id: &str, tokens: &UserTokens) -> Result<(), AppError> {
        self.set_doc(collections::TOKENS, user_id, tokens).await
    }

    async fn delete_tokens(&self, user_id: &str) -> Result<(), AppError> {
        self.get_client()?
            .fluent()
            .delete()
            .from(collections::TOKENS)
            .document_id(user_id)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    // ─── Usage Ledger ────────────────────────────────────────────

    async fn get_api_usage(
        &self,
        user_id: &str,
        service: &str,
        date: NaiveDate,
    ) -> Result<u32, AppError> {
        let usage: Option<ApiUsage> = self
            .get_client()?
            .fluent()
            .select()
            .by_id_in(collections::API_USAGE)
            .obj()
            .one(&ApiUsage::doc_id_for(user_id, service, date))
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(usage.map(|u| u.count).unwrap_or(0))
    }

    /// Increment inside a transaction so concurrent requests don't lose counts.
    async fn increment_api_usage(
        &self,
        user_id: &str,
        service: &str,
        date: NaiveDate,
    ) -> Result<u32, AppError> {
        let client = self.get_client()?;
        let doc_id = ApiUsage::doc_id_for(user_id, service, date);

        let mut transaction = client
            .begin_transaction()
            .await
            .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

        let current: Option<ApiUsage> = client
            .fluent()
            .select()
            .by_id_in(collections::API_USAGE)
            .obj()
            .one(&doc_id)
            .await
            .map_err(|e| {
                AppError::Database(format!("Failed to read usage in transaction: {}", e))
            })?;

        let mut usage = current.unwrap_or_else(|| ApiUsage {
            user_id: user_id.to_string(),
            service: service.to_string(),
            date: date.format("%Y-%m-%d").to_string(),
            count: 0,
            updated_at: String::new(),
        });
        usage.count += 1;
        usage.updated_at = chrono::Utc::now().to_rfc3339();

        client
            .fluent()
            .update()
            .in_col(collections::API_USAGE)
            .document_id(&doc_id)
            .object(&usage)
            .add_to_transaction(&mut transaction)
            .map_err(|e| {
                AppError::Database(format!("Failed to add usage to transaction: {}", e))
            })?;

        transaction
            .commit()
            .await
            .map_err(|e| AppError::Database(format!("Transaction commit failed: {}", e)))?;

        Ok(usage.count)
    }
}
