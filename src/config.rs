// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.
//!
//! On Cloud Run, secrets are injected as environment variables via secret
//! bindings, so everything is read once at startup.

use std::env;

/// Default cadence for the background cache sync (every 30 minutes).
pub const DEFAULT_SYNC_CRON: &str = "*/30 * * * *";

/// Default number of on-demand full resyncs a user may trigger per UTC day.
pub const DEFAULT_RESYNC_DAILY_LIMIT: u32 = 3;

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- Environment Variables (non-sensitive) ---
    /// Google OAuth client ID (public)
    pub google_client_id: String,
    /// Frontend URL for CORS
    pub frontend_url: String,
    /// GCP project ID
    pub gcp_project_id: String,
    /// GCP region (KMS key location)
    pub gcp_region: String,
    /// Server port
    pub port: u16,
    /// Cron expression for the scheduled cache sync
    pub sync_cron: String,
    /// Run one sync pass shortly after startup
    pub sync_on_startup: bool,
    /// Make the startup pass a forced (full) sync
    pub sync_force_on_startup: bool,
    /// Daily limit for on-demand full resyncs per user
    pub resync_daily_limit: u32,
    /// Use the in-memory store instead of Firestore (local development)
    pub use_memory_store: bool,

    // --- Secrets ---
    /// Google OAuth client secret
    pub google_client_secret: String,
    /// JWT signing key for session tokens (raw bytes)
    pub jwt_signing_key: Vec<u8>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// A `.env` file is honored for local development.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        Ok(Self {
            google_client_id: env::var("GOOGLE_CLIENT_ID")
                .map_err(|_| ConfigError::Missing("GOOGLE_CLIENT_ID"))?,
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            gcp_project_id: env::var("GCP_PROJECT_ID").unwrap_or_else(|_| "local-dev".to_string()),
            gcp_region: env::var("GCP_REGION").unwrap_or_else(|_| "us-west1".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),
            sync_cron: env::var("SYNC_CRON").unwrap_or_else(|_| DEFAULT_SYNC_CRON.to_string()),
            sync_on_startup: env_flag("SYNC_ON_STARTUP"),
            sync_force_on_startup: env_flag("SYNC_FORCE_ON_STARTUP"),
            resync_daily_limit: env::var("RESYNC_DAILY_LIMIT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_RESYNC_DAILY_LIMIT),
            use_memory_store: env_flag("USE_MEMORY_STORE"),
            google_client_secret: env::var("GOOGLE_CLIENT_SECRET")
                .map_err(|_| ConfigError::Missing("GOOGLE_CLIENT_SECRET"))?
                .trim()
                .to_string(),
            jwt_signing_key: env::var("JWT_SIGNING_KEY")
                .map_err(|_| ConfigError::Missing("JWT_SIGNING_KEY"))?
                .into_bytes(),
        })
    }

    /// Config for tests: memory store, no startup sync.
    pub fn test_default() -> Self {
        Self {
            google_client_id: "test_client_id".to_string(),
            frontend_url: "http://localhost:5173".to_string(),
            gcp_project_id: "test-project".to_string(),
            gcp_region: "us-west1".to_string(),
            port: 8080,
            sync_cron: DEFAULT_SYNC_CRON.to_string(),
            sync_on_startup: false,
            sync_force_on_startup: false,
            resync_daily_limit: DEFAULT_RESYNC_DAILY_LIMIT,
            use_memory_store: true,
            google_client_secret: "test_secret".to_string(),
            jwt_signing_key: b"test_jwt_key_32_bytes_minimum!!".to_vec(),
        }
    }
}

/// Parse a boolean flag; accepts "1", "true", "yes" (case-insensitive).
fn env_flag(name: &str) -> bool {
    env::var(name)
        .map(|v| parse_flag(&v))
        .unwrap_or(false)
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes"
    )
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
}
