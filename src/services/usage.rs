// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Per-user daily usage ledger for quota-expensive operations.

use crate::db::UserStore;
use crate::error::AppError;
use chrono::Utc;
use std::sync::Arc;

/// Ledger service name of the on-demand cache resync.
pub const SERVICE_CACHE_RESYNC: &str = "cache_resync";

#[derive(Clone)]
pub struct UsageLedger {
    users: Arc<dyn UserStore>,
}

impl UsageLedger {
    pub fn new(users: Arc<dyn UserStore>) -> Self {
        Self { users }
    }

    /// Today's count for `service`.
    pub async fn used_today(&self, user_id: &str, service: &str) -> Result<u32, AppError> {
        self.users
            .get_api_usage(user_id, service, Utc::now().date_naive())
            .await
    }

    /// Record one use if the daily `limit` is not yet reached.
    ///
    /// Returns false (and records nothing) when the limit is spent.
    pub async fn try_consume(
        &self,
        user_id: &str,
        service: &str,
        limit: u32,
    ) -> Result<bool, AppError> {
        let today = Utc::now().date_naive();
        let used = self.users.get_api_usage(user_id, service, today).await?;
        if used >= limit {
            tracing::info!(user_id, service, used, limit, "Daily limit reached");
            return Ok(false);
        }

        let count = self
            .users
            .increment_api_usage(user_id, service, today)
            .await?;
        tracing::debug!(user_id, service, count, limit, "Usage recorded");
        Ok(count <= limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;

    #[tokio::test]
    async fn test_try_consume_stops_at_limit() {
        let ledger = UsageLedger::new(Arc::new(MemoryStore::new()));

        assert!(ledger.try_consume("u1", SERVICE_CACHE_RESYNC, 2).await.unwrap());
        assert!(ledger.try_consume("u1", SERVICE_CACHE_RESYNC, 2).await.unwrap());
        assert!(!ledger.try_consume("u1", SERVICE_CACHE_RESYNC, 2).await.unwrap());
        assert_eq!(ledger.used_today("u1", SERVICE_CACHE_RESYNC).await.unwrap(), 2);

        // Other users have their own budget.
        assert!(ledger.try_consume("u2", SERVICE_CACHE_RESYNC, 2).await.unwrap());
    }
}
