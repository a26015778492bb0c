// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod cache_sync;
pub mod channel_sync;
pub mod credentials;
pub mod google_oauth;
pub mod kms;
pub mod playlist_sync;
pub mod population;
pub mod response_cache;
pub mod scheduler;
pub mod usage;
pub mod youtube;

pub use cache_sync::{BatchOutcome, CacheSyncService, ResyncError, ResyncSummary};
pub use credentials::{CredentialService, CredentialStore, UserCredential};
pub use google_oauth::{GoogleOAuthClient, IdentityProvider};
pub use kms::KmsService;
pub use response_cache::ResponseCache;
pub use scheduler::{start_scheduled_sync, SchedulerHandle};
pub use usage::UsageLedger;
pub use youtube::{Classifier, YouTubeApi, YouTubeClient};
