// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! TubeSync API Server
//!
//! Keeps a cached copy of each user's YouTube subscriptions and playlists
//! fresh with a scheduled, quota-aware differential sync.

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tubesync::{
    config::Config,
    db::{CacheStore, FirestoreDb, MemoryStore, UserStore},
    error::AppError,
    services::{
        start_scheduled_sync, CacheSyncService, CredentialService, CredentialStore,
        GoogleOAuthClient, KmsService, ResponseCache, UsageLedger, YouTubeClient,
    },
    AppState,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging for GCP
    init_logging();

    // Load configuration from environment
    let config = Config::from_env().expect("Failed to load configuration");
    tracing::info!(port = config.port, "Starting TubeSync API");

    // Storage: Firestore, or the in-memory store for local development
    let (cache_store, user_store): (Arc<dyn CacheStore>, Arc<dyn UserStore>) =
        if config.use_memory_store {
            tracing::warn!("Using in-memory store, cache is lost on restart");
            let store = Arc::new(MemoryStore::new());
            (store.clone() as Arc<dyn CacheStore>, store as Arc<dyn UserStore>)
        } else {
            let db = Arc::new(
                FirestoreDb::new(&config.gcp_project_id)
                    .await
                    .expect("Failed to connect to Firestore"),
            );
            (db.clone() as Arc<dyn CacheStore>, db as Arc<dyn UserStore>)
        };

    let kms = init_kms(&config)
        .await
        .expect("Failed to initialize KMS service");

    // Credentials live in memory; the encrypted Firestore mirror re-seeds them at boot
    let identity = Arc::new(GoogleOAuthClient::new(
        config.google_client_id.clone(),
        config.google_client_secret.clone(),
    ));
    let credentials = CredentialService::new(
        CredentialStore::new(),
        identity,
        user_store.clone(),
        kms,
    );

    let youtube = Arc::new(YouTubeClient::new());
    let response_cache = ResponseCache::default();
    let sync_service = Arc::new(CacheSyncService::new(
        credentials,
        cache_store.clone(),
        youtube.clone(),
        youtube,
        response_cache.clone(),
    ));

    match sync_service.preload_user_tokens().await {
        Ok(count) => tracing::info!(count, "User tokens preloaded"),
        Err(e) => tracing::error!(error = %e, "Failed to preload user tokens"),
    }

    let _scheduler = start_scheduled_sync(
        sync_service.clone(),
        &config.sync_cron,
        config.sync_on_startup,
        config.sync_force_on_startup,
    )?;

    // Build shared state
    let state = Arc::new(AppState {
        config: config.clone(),
        cache_store,
        sync_service,
        response_cache,
        usage: UsageLedger::new(user_store),
    });

    // Build router
    let app = tubesync::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// KMS for the token mirror. Local memory-store runs use the mock in debug builds.
async fn init_kms(config: &Config) -> Result<KmsService, AppError> {
    #[cfg(debug_assertions)]
    {
        if config.use_memory_store {
            tracing::warn!("Using mock KMS (base64 only)");
            return Ok(KmsService::new_mock());
        }
    }

    let kms = KmsService::new(
        &config.gcp_project_id,
        &config.gcp_region,
        "token-encryption",
    )
    .await?;
    tracing::info!("KMS service initialized");
    Ok(kms)
}

/// Initialize structured JSON logging (GCP-compliant).
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("tubesync=debug".parse().unwrap())
                .add_directive("info".parse().unwrap()),
        )
        .with(format)
        .init();
}
