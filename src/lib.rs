// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! TubeSync: cached view of a user's YouTube subscriptions and playlists
//!
//! This crate keeps per-user OAuth credentials valid and runs quota-aware
//! differential syncs between the YouTube Data API and a Firestore cache,
//! and serves the cached listings over a small JSON API.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;

use config::Config;
use db::CacheStore;
use services::{CacheSyncService, ResponseCache, UsageLedger};
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub cache_store: Arc<dyn CacheStore>,
    pub sync_service: Arc<CacheSyncService>,
    pub response_cache: ResponseCache,
    pub usage: UsageLedger,
}
