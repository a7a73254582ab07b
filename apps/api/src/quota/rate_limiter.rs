//! Per-user multi-window rate limiter.
//!
//! Three sliding counters (daily / hourly / per-minute) plus a 1-second
//! anti-loop guard, enforced inside a single read-modify-write
//! transaction so concurrent requests from one user serialize on the
//! row lock. Infrastructure failures fail open: availability of the
//! product outweighs strict quota enforcement during a storage outage.
//! A genuine limit breach always fails closed.

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::AppError;

const HOUR_MS: i64 = 3_600_000;
const MINUTE_MS: i64 = 60_000;
const MIN_CALL_GAP_MS: i64 = 1000;

/// Quota tier; selected by the caller, never computed here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Free,
    Premium,
}

#[derive(Debug, Clone, Copy)]
pub struct RateLimits {
    pub daily: i32,
    pub hourly: i32,
    pub per_minute: i32,
}

impl Tier {
    pub fn limits(self) -> RateLimits {
        match self {
            Tier::Free => RateLimits {
                daily: 100,
                hourly: 30,
                per_minute: 5,
            },
            Tier::Premium => RateLimits {
                daily: 500,
                hourly: 100,
                per_minute: 10,
            },
        }
    }
}

/// Which window rejected the request; surfaced in the error message so
/// clients can show an appropriate cooldown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BreachedWindow {
    #[error("daily limit reached, resets at midnight UTC")]
    Daily,
    #[error("hourly limit reached, try again later")]
    Hourly,
    #[error("per-minute limit reached, slow down")]
    Minute,
    #[error("requests too frequent, wait a moment")]
    Cooldown,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UsageRecord {
    pub user_id: Uuid,
    pub date: NaiveDate,
    pub daily_count: i32,
    pub hourly_count: i32,
    pub last_hour_reset: DateTime<Utc>,
    pub minute_count: i32,
    pub last_minute_reset: DateTime<Utc>,
    pub total_calls: i64,
    pub last_call_at: Option<DateTime<Utc>>,
}

impl UsageRecord {
    pub fn fresh(user_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            date: now.date_naive(),
            daily_count: 0,
            hourly_count: 0,
            last_hour_reset: now,
            minute_count: 0,
            last_minute_reset: now,
            total_calls: 0,
            last_call_at: None,
        }
    }
}

/// Rolls expired windows forward. On a date change all three counters
/// reset and `total_calls` carries forward unreset; otherwise the
/// hourly and minute checks run independently of each other.
pub fn apply_window_resets(record: &mut UsageRecord, now: DateTime<Utc>) {
    if record.date != now.date_naive() {
        record.date = now.date_naive();
        record.daily_count = 0;
        record.hourly_count = 0;
        record.minute_count = 0;
        record.last_hour_reset = now;
        record.last_minute_reset = now;
        return;
    }

    if now - record.last_hour_reset > Duration::milliseconds(HOUR_MS) {
        record.hourly_count = 0;
        record.last_hour_reset = now;
    }
    if now - record.last_minute_reset > Duration::milliseconds(MINUTE_MS) {
        record.minute_count = 0;
        record.last_minute_reset = now;
    }
}

/// Checks the windows in priority order: daily, hourly, minute, then
/// the anti-loop cooldown. Does not mutate the record.
pub fn check_limits(
    record: &UsageRecord,
    limits: &RateLimits,
    now: DateTime<Utc>,
) -> Result<(), BreachedWindow> {
    if record.daily_count >= limits.daily {
        return Err(BreachedWindow::Daily);
    }
    if record.hourly_count >= limits.hourly {
        return Err(BreachedWindow::Hourly);
    }
    if record.minute_count >= limits.per_minute {
        return Err(BreachedWindow::Minute);
    }
    if let Some(last) = record.last_call_at {
        if now - last < Duration::milliseconds(MIN_CALL_GAP_MS) {
            return Err(BreachedWindow::Cooldown);
        }
    }
    Ok(())
}

/// Admits one call: bumps all three counters and `total_calls`.
pub fn admit(record: &mut UsageRecord, now: DateTime<Utc>) {
    record.daily_count += 1;
    record.hourly_count += 1;
    record.minute_count += 1;
    record.total_calls += 1;
    record.last_call_at = Some(now);
}

/// Admission seam for the generation endpoints. Handler tests
/// substitute a scripted gate, the same way the orchestrator swaps out
/// its model client.
#[async_trait]
pub trait QuotaGate: Send + Sync {
    async fn check(&self, user_id: Uuid, feature: &str, tier: Tier) -> Result<(), AppError>;
}

pub struct PgQuotaGate {
    pool: PgPool,
}

impl PgQuotaGate {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// A limit breach rejects with `RESOURCE_EXHAUSTED`; a storage failure
/// logs and admits.
#[async_trait]
impl QuotaGate for PgQuotaGate {
    async fn check(&self, user_id: Uuid, feature: &str, tier: Tier) -> Result<(), AppError> {
        match enforce(&self.pool, user_id, tier, Utc::now()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(breached)) => {
                info!(%user_id, feature, window = ?breached, "rate limit breached");
                Err(AppError::RateLimited(format!(
                    "Rate limit exceeded: {breached}"
                )))
            }
            Err(e) => {
                warn!(%user_id, feature, error = %e, "rate limiter unavailable, failing open");
                Ok(())
            }
        }
    }
}

async fn enforce(
    pool: &PgPool,
    user_id: Uuid,
    tier: Tier,
    now: DateTime<Utc>,
) -> Result<Result<(), BreachedWindow>, sqlx::Error> {
    let mut tx = pool.begin().await?;

    // Seed the row before locking it. A `SELECT ... FOR UPDATE` on a
    // missing row locks nothing, so two concurrent first requests would
    // both build a fresh record and the later write would discard the
    // earlier increment. After this insert the lock always has a row.
    let seed = UsageRecord::fresh(user_id, now);
    sqlx::query(
        r#"
        INSERT INTO usage_records
            (user_id, date, daily_count, hourly_count, last_hour_reset,
             minute_count, last_minute_reset, total_calls, last_call_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        ON CONFLICT (user_id) DO NOTHING
        "#,
    )
    .bind(seed.user_id)
    .bind(seed.date)
    .bind(seed.daily_count)
    .bind(seed.hourly_count)
    .bind(seed.last_hour_reset)
    .bind(seed.minute_count)
    .bind(seed.last_minute_reset)
    .bind(seed.total_calls)
    .bind(seed.last_call_at)
    .execute(&mut *tx)
    .await?;

    let mut record: UsageRecord =
        sqlx::query_as("SELECT * FROM usage_records WHERE user_id = $1 FOR UPDATE")
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await?;

    apply_window_resets(&mut record, now);

    if let Err(breached) = check_limits(&record, &tier.limits(), now) {
        // Dropping the transaction rolls back; the breach never increments.
        return Ok(Err(breached));
    }

    admit(&mut record, now);

    sqlx::query(
        r#"
        UPDATE usage_records SET
            date = $2,
            daily_count = $3,
            hourly_count = $4,
            last_hour_reset = $5,
            minute_count = $6,
            last_minute_reset = $7,
            total_calls = $8,
            last_call_at = $9
        WHERE user_id = $1
        "#,
    )
    .bind(record.user_id)
    .bind(record.date)
    .bind(record.daily_count)
    .bind(record.hourly_count)
    .bind(record.last_hour_reset)
    .bind(record.minute_count)
    .bind(record.last_minute_reset)
    .bind(record.total_calls)
    .bind(record.last_call_at)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(Ok(()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record_at(now: DateTime<Utc>) -> UsageRecord {
        UsageRecord::fresh(Uuid::new_v4(), now)
    }

    fn ts(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    #[test]
    fn test_minute_window_rejects_independently_of_other_windows() {
        let now = ts("2026-03-01T10:00:00Z");
        let mut record = record_at(now);
        let limits = Tier::Free.limits();

        // Five admitted calls inside one minute, spaced past the cooldown.
        for i in 0..limits.per_minute {
            let call_time = now + Duration::seconds(2 * i as i64);
            apply_window_resets(&mut record, call_time);
            check_limits(&record, &limits, call_time).unwrap();
            admit(&mut record, call_time);
        }

        // Daily and hourly are far under their limits; the minute window
        // still rejects the sixth call.
        let sixth = now + Duration::seconds(12);
        apply_window_resets(&mut record, sixth);
        assert!(record.daily_count < limits.daily);
        assert!(record.hourly_count < limits.hourly);
        assert_eq!(
            check_limits(&record, &limits, sixth),
            Err(BreachedWindow::Minute)
        );
    }

    #[test]
    fn test_minute_window_reset_preserves_daily_count() {
        let now = ts("2026-03-01T10:00:00Z");
        let mut record = record_at(now);
        let limits = Tier::Free.limits();

        record.daily_count = 42;
        record.minute_count = limits.per_minute;

        let later = now + Duration::seconds(61);
        apply_window_resets(&mut record, later);

        assert_eq!(record.minute_count, 0);
        assert_eq!(record.daily_count, 42);
        assert!(check_limits(&record, &limits, later).is_ok());
    }

    #[test]
    fn test_hourly_and_minute_resets_are_independent() {
        let now = ts("2026-03-01T10:00:00Z");
        let mut record = record_at(now);
        record.hourly_count = 10;
        record.minute_count = 3;

        // 61 minutes later, both windows have lapsed and both reset.
        let later = now + Duration::minutes(61);
        apply_window_resets(&mut record, later);
        assert_eq!(record.hourly_count, 0);
        assert_eq!(record.minute_count, 0);

        // 2 minutes further on, only the minute window lapses.
        let mut record2 = record_at(now);
        record2.hourly_count = 10;
        record2.minute_count = 3;
        let soon = now + Duration::minutes(2);
        apply_window_resets(&mut record2, soon);
        assert_eq!(record2.hourly_count, 10);
        assert_eq!(record2.minute_count, 0);
    }

    #[test]
    fn test_date_change_resets_counters_but_not_total_calls() {
        let now = ts("2026-03-01T23:59:00Z");
        let mut record = record_at(now);
        record.daily_count = 99;
        record.hourly_count = 20;
        record.minute_count = 4;
        record.total_calls = 500;

        let next_day = ts("2026-03-02T00:01:00Z");
        apply_window_resets(&mut record, next_day);

        assert_eq!(record.date, next_day.date_naive());
        assert_eq!(record.daily_count, 0);
        assert_eq!(record.hourly_count, 0);
        assert_eq!(record.minute_count, 0);
        assert_eq!(record.total_calls, 500);
    }

    #[test]
    fn test_rejection_priority_daily_before_hourly_before_minute() {
        let now = ts("2026-03-01T10:00:00Z");
        let limits = Tier::Free.limits();

        let mut record = record_at(now);
        record.daily_count = limits.daily;
        record.hourly_count = limits.hourly;
        record.minute_count = limits.per_minute;
        assert_eq!(
            check_limits(&record, &limits, now),
            Err(BreachedWindow::Daily)
        );

        record.daily_count = 0;
        assert_eq!(
            check_limits(&record, &limits, now),
            Err(BreachedWindow::Hourly)
        );

        record.hourly_count = 0;
        assert_eq!(
            check_limits(&record, &limits, now),
            Err(BreachedWindow::Minute)
        );
    }

    #[test]
    fn test_cooldown_guard_rejects_calls_under_one_second_apart() {
        let now = ts("2026-03-01T10:00:00Z");
        let mut record = record_at(now);
        let limits = Tier::Free.limits();

        admit(&mut record, now);

        let too_soon = now + Duration::milliseconds(500);
        assert_eq!(
            check_limits(&record, &limits, too_soon),
            Err(BreachedWindow::Cooldown)
        );

        let ok = now + Duration::milliseconds(1000);
        assert!(check_limits(&record, &limits, ok).is_ok());
    }

    #[test]
    fn test_second_admission_builds_on_the_first() {
        // Serialized on the row lock, the second request must start
        // from the first's counters, not from a fresh zeroed row.
        let now = ts("2026-03-01T10:00:00Z");
        let mut record = record_at(now);
        let limits = Tier::Free.limits();

        apply_window_resets(&mut record, now);
        check_limits(&record, &limits, now).unwrap();
        admit(&mut record, now);

        let second = now + Duration::seconds(2);
        apply_window_resets(&mut record, second);
        check_limits(&record, &limits, second).unwrap();
        admit(&mut record, second);

        assert_eq!(record.daily_count, 2);
        assert_eq!(record.total_calls, 2);
    }

    #[test]
    fn test_fresh_record_starts_with_zeroed_counters() {
        // The seeded row counts nothing; only `admit` increments, so
        // the first admitted call lands at exactly 1.
        let now = ts("2026-03-01T10:00:00Z");
        let record = record_at(now);
        assert_eq!(record.daily_count, 0);
        assert_eq!(record.hourly_count, 0);
        assert_eq!(record.minute_count, 0);
        assert_eq!(record.total_calls, 0);
        assert_eq!(record.last_call_at, None);
    }

    #[test]
    fn test_admit_increments_all_counters_once() {
        let now = ts("2026-03-01T10:00:00Z");
        let mut record = record_at(now);

        admit(&mut record, now);

        assert_eq!(record.daily_count, 1);
        assert_eq!(record.hourly_count, 1);
        assert_eq!(record.minute_count, 1);
        assert_eq!(record.total_calls, 1);
        assert_eq!(record.last_call_at, Some(now));
    }

    #[test]
    fn test_premium_tier_has_higher_limits() {
        let free = Tier::Free.limits();
        let premium = Tier::Premium.limits();
        assert_eq!((premium.daily, premium.hourly, premium.per_minute), (500, 100, 10));
        assert!(premium.daily > free.daily);
    }
}
