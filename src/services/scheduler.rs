// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Cron-driven background cache sync.

use crate::config::DEFAULT_SYNC_CRON;
use crate::error::AppError;
use crate::services::cache_sync::{BatchOutcome, CacheSyncService};
use chrono::Utc;
use cron::Schedule;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Delay before the optional startup run.
pub const STARTUP_SYNC_DELAY: Duration = Duration::from_secs(10);

/// Handle to the running scheduler.
pub struct SchedulerHandle {
    ticker: JoinHandle<()>,
    startup: Option<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Stop scheduling new runs. Runs already started finish on their own.
    pub fn stop(&self) {
        self.ticker.abort();
        if let Some(startup) = &self.startup {
            startup.abort();
        }
    }
}

/// Day names indexed by standard crontab day-of-week number (0 and 7 are Sunday).
const DAY_NAMES: [&str; 8] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

/// Parse a cron expression.
///
/// Standard 5-field expressions (`min hour dom mon dow`) use crontab
/// day-of-week numbers (Sunday = 0 or 7) and run at second 0. 6- and 7-field
/// expressions are passed through unchanged and use the `cron` crate's own
/// numbering (Sunday = 1).
pub fn parse_schedule(expr: &str) -> Result<Schedule, AppError> {
    let expr = expr.trim();
    let expr = if expr.is_empty() { DEFAULT_SYNC_CRON } else { expr };

    let fields: Vec<&str> = expr.split_whitespace().collect();
    let normalized = if let [min, hour, dom, month, dow] = fields[..] {
        format!(
            "0 {} {} {} {} {}",
            min,
            hour,
            dom,
            month,
            day_of_week_names(dow)
        )
    } else {
        expr.to_string()
    };

    Schedule::from_str(&normalized)
        .map_err(|e| AppError::BadRequest(format!("Invalid cron expression '{}': {}", expr, e)))
}

/// Start the recurring sync. Must be called from within a tokio runtime.
///
/// Every tick spawns `update_all_caches(false)` without waiting for it.
/// With `run_on_startup`, one extra run fires shortly after start, forced
/// only when `force_on_startup` is set.
pub fn start_scheduled_sync(
    sync: Arc<CacheSyncService>,
    cron_expression: &str,
    run_on_startup: bool,
    force_on_startup: bool,
) -> Result<SchedulerHandle, AppError> {
    let schedule = parse_schedule(cron_expression)?;
    tracing::info!(cron = cron_expression, "Scheduled cache sync enabled");

    let startup = run_on_startup.then(|| {
        let sync = sync.clone();
        tokio::spawn(async move {
            tokio::time::sleep(STARTUP_SYNC_DELAY).await;
            tracing::info!(force = force_on_startup, "Running startup cache sync");
            log_outcome(sync.update_all_caches(force_on_startup).await);
        })
    });

    let ticker = tokio::spawn(async move {
        loop {
            let Some(next) = schedule.upcoming(Utc).next() else {
                tracing::warn!("Cron schedule has no upcoming runs, stopping scheduler");
                break;
            };
            let wait = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);
            tokio::time::sleep(wait).await;

            tracing::debug!(at = %next, "Cache sync tick");
            let sync = sync.clone();
            tokio::spawn(async move {
                log_outcome(sync.update_all_caches(false).await);
            });
        }
    });

    Ok(SchedulerHandle { ticker, startup })
}

/// Rewrite numeric crontab days of week as names, e.g. `1-5` to `Mon-Fri`.
fn day_of_week_names(field: &str) -> String {
    field
        .split(',')
        .map(day_of_week_item)
        .collect::<Vec<_>>()
        .join(",")
}

fn day_of_week_item(item: &str) -> String {
    let (range, step) = match item.split_once('/') {
        Some((range, step)) => (range, Some(step)),
        None => (item, None),
    };

    let mapped = match range.split_once('-') {
        Some((start, end)) => match (day_number(start), day_number(end)) {
            // A range ending in 7 wraps to Sunday, which sorts first for `cron`.
            (Some(s), Some(7)) if s > 0 && step.is_none() => {
                format!("{}-Sat,Sun", DAY_NAMES[s])
            }
            (Some(s), Some(e)) => format!("{}-{}", DAY_NAMES[s], DAY_NAMES[e.min(6)]),
            _ => range.to_string(),
        },
        None => match day_number(range) {
            Some(n) => DAY_NAMES[n].to_string(),
            None => range.to_string(),
        },
    };

    match step {
        Some(step) => format!("{}/{}", mapped, step),
        None => mapped,
    }
}

fn day_number(token: &str) -> Option<usize> {
    token.parse::<usize>().ok().filter(|n| *n < DAY_NAMES.len())
}

fn log_outcome(outcome: BatchOutcome) {
    match outcome {
        BatchOutcome::Completed { synced, skipped } => {
            tracing::info!(synced, skipped, "Scheduled cache sync finished");
        }
        BatchOutcome::AlreadyRunning => {
            tracing::info!("Scheduled cache sync skipped, previous run still active");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike, Weekday};

    fn upcoming_weekdays(expr: &str, count: usize) -> Vec<Weekday> {
        parse_schedule(expr)
            .unwrap()
            .upcoming(Utc)
            .take(count)
            .map(|t| t.weekday())
            .collect()
    }

    #[test]
    fn test_five_field_expression_gets_seconds() {
        let schedule = parse_schedule("*/30 * * * *").unwrap();
        let next = schedule.upcoming(Utc).next().unwrap();
        assert_eq!(next.second(), 0);
        assert!(next.minute() == 0 || next.minute() == 30);
    }

    #[test]
    fn test_six_field_expression_passes_through() {
        let schedule = parse_schedule("15 0 * * * *").unwrap();
        let next = schedule.upcoming(Utc).next().unwrap();
        assert_eq!(next.second(), 15);
        assert_eq!(next.minute(), 0);
    }

    #[test]
    fn test_empty_expression_uses_default() {
        let schedule = parse_schedule("  ").unwrap();
        let next = schedule.upcoming(Utc).next().unwrap();
        assert_eq!(next.minute() % 30, 0);
    }

    #[test]
    fn test_weekday_range_uses_crontab_numbering() {
        let days = upcoming_weekdays("0 9 * * 1-5", 10);
        assert_eq!(days.len(), 10);
        assert!(days
            .iter()
            .all(|d| !matches!(d, Weekday::Sat | Weekday::Sun)));
    }

    #[test]
    fn test_zero_and_seven_are_sunday() {
        assert!(upcoming_weekdays("0 3 * * 0", 3)
            .iter()
            .all(|d| *d == Weekday::Sun));
        assert!(upcoming_weekdays("0 3 * * 7", 3)
            .iter()
            .all(|d| *d == Weekday::Sun));
    }

    #[test]
    fn test_range_ending_in_seven_includes_sunday() {
        let mut days = upcoming_weekdays("0 0 * * 5-7", 6);
        days.sort_by_key(|d| d.num_days_from_monday());
        days.dedup();
        assert_eq!(days, vec![Weekday::Fri, Weekday::Sat, Weekday::Sun]);
    }

    #[test]
    fn test_day_of_week_names() {
        assert_eq!(day_of_week_names("*"), "*");
        assert_eq!(day_of_week_names("1-5"), "Mon-Fri");
        assert_eq!(day_of_week_names("0,6"), "Sun,Sat");
        assert_eq!(day_of_week_names("*/2"), "*/2");
        assert_eq!(day_of_week_names("MON-FRI"), "MON-FRI");
    }

    #[test]
    fn test_invalid_expression_is_rejected() {
        assert!(matches!(
            parse_schedule("every half hour"),
            Err(AppError::BadRequest(_))
        ));
    }
}
