// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod channel;
pub mod playlist;
pub mod usage;
pub mod user;

pub use channel::CachedChannel;
pub use playlist::CachedPlaylist;
pub use usage::ApiUsage;
pub use user::{User, UserTokens};
