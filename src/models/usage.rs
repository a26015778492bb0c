// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Daily API usage ledger.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Per-(user, service, UTC date) usage counter.
///
/// Stored at: `api_usage/{user_id}_{service}_{YYYY-MM-DD}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiUsage {
    pub user_id: String,
    pub service: String,
    /// UTC date ("YYYY-MM-DD")
    pub date: String,
    pub count: u32,
    /// Last increment (ISO 8601)
    pub updated_at: String,
}

impl ApiUsage {
    pub fn doc_id_for(user_id: &str, service: &str, date: NaiveDate) -> String {
        format!(
            "{}_{}_{}",
            urlencoding::encode(user_id),
            urlencoding::encode(service),
            date.format("%Y-%m-%d")
        )
    }
}
