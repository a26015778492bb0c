// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Cloud KMS service for encrypting/decrypting the persisted OAuth tokens.
//!
//! Every ciphertext is bound to its owner: the user ID is passed to KMS as
//! additional authenticated data, so a token copied onto another user's
//! document fails to decrypt.

use crate::error::AppError;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use google_cloud_googleapis::cloud::kms::v1::{DecryptRequest, EncryptRequest};
use std::sync::Arc;

/// KMS encryption service.
#[derive(Clone)]
pub struct KmsService {
    /// Format: projects/{project}/locations/{location}/keyRings/{ring}/cryptoKeys/{key}
    key_path: String,
    /// `None` in mock mode (debug builds only)
    client: Option<Arc<google_cloud_kms::client::Client>>,
}

impl KmsService {
    const KEY_RING_NAME: &str = "tubesync";

    /// Connect to Cloud KMS.
    pub async fn new(project_id: &str, location: &str, key_name: &str) -> Result<Self, AppError> {
        let key_path = format!(
            "projects/{}/locations/{}/keyRings/{}/cryptoKeys/{}",
            project_id,
            location,
            Self::KEY_RING_NAME,
            key_name
        );

        let config = google_cloud_kms::client::ClientConfig::default()
            .with_auth()
            .await
            .map_err(|e| {
                AppError::Internal(anyhow::anyhow!("Failed to create KMS auth config: {}", e))
            })?;

        let client = google_cloud_kms::client::Client::new(config)
            .await
            .map_err(|e| {
                AppError::Internal(anyhow::anyhow!("Failed to create KMS client: {}", e))
            })?;

        tracing::info!(key = %key_path, "KMS client ready");

        Ok(Self {
            key_path,
            client: Some(Arc::new(client)),
        })
    }

    /// Offline mode: base64 instead of encryption. Debug/test builds only.
    #[cfg(debug_assertions)]
    pub fn new_mock() -> Self {
        Self {
            key_path: "projects/mock/locations/mock/keyRings/mock/cryptoKeys/mock".to_string(),
            client: None,
        }
    }

    fn client(&self) -> Result<&google_cloud_kms::client::Client, AppError> {
        self.client
            .as_deref()
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("KMS client not connected")))
    }

    /// Encrypt `plaintext` for `user_id`; returns base64 ciphertext.
    pub async fn encrypt(&self, plaintext: &str, user_id: &str) -> Result<String, AppError> {
        #[cfg(debug_assertions)]
        {
            if self.client.is_none() {
                return Ok(BASE64.encode(plaintext));
            }
        }

        let req = EncryptRequest {
            name: self.key_path.clone(),
            plaintext: plaintext.as_bytes().to_vec(),
            additional_authenticated_data: user_id.as_bytes().to_vec(),
            ..Default::default()
        };

        let response = self
            .client()?
            .encrypt(req, None)
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("KMS encrypt failed: {}", e)))?;

        Ok(BASE64.encode(response.ciphertext))
    }

    /// Decrypt base64 ciphertext that was encrypted for `user_id`.
    pub async fn decrypt(&self, ciphertext_b64: &str, user_id: &str) -> Result<String, AppError> {
        let bytes = BASE64.decode(ciphertext_b64).map_err(|e| {
            AppError::Internal(anyhow::anyhow!("Base64 ciphertext decode failed: {}", e))
        })?;

        #[cfg(debug_assertions)]
        {
            if self.client.is_none() {
                return String::from_utf8(bytes).map_err(|e| {
                    AppError::Internal(anyhow::anyhow!("UTF-8 decode failed (mock): {}", e))
                });
            }
        }

        let req = DecryptRequest {
            name: self.key_path.clone(),
            ciphertext: bytes,
            additional_authenticated_data: user_id.as_bytes().to_vec(),
            ..Default::default()
        };

        let response = self
            .client()?
            .decrypt(req, None)
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("KMS decrypt failed: {}", e)))?;

        String::from_utf8(response.plaintext)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("UTF-8 decode failed: {}", e)))
    }
}

/// Encrypt a user's tokens before storing.
///
/// The refresh token is optional: Google only returns one on first consent.
pub async fn encrypt_tokens(
    kms: &KmsService,
    user_id: &str,
    access_token: &str,
    refresh_token: Option<&str>,
) -> Result<(String, Option<String>), AppError> {
    let encrypted_access = kms.encrypt(access_token, user_id).await?;
    let encrypted_refresh = match refresh_token {
        Some(token) => Some(kms.encrypt(token, user_id).await?),
        None => None,
    };
    Ok((encrypted_access, encrypted_refresh))
}

/// Decrypt a user's tokens after retrieval.
pub async fn decrypt_tokens(
    kms: &KmsService,
    user_id: &str,
    encrypted_access: &str,
    encrypted_refresh: Option<&str>,
) -> Result<(String, Option<String>), AppError> {
    let access_token = kms.decrypt(encrypted_access, user_id).await?;
    let refresh_token = match encrypted_refresh {
        Some(token) => Some(kms.decrypt(token, user_id).await?),
        None => None,
    };
    Ok((access_token, refresh_token))
}
