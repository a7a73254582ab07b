//! Flat daily credit ledger — the coarser quota mechanism, gating the
//! tutoring chat. Independent of the multi-window limiter.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use tracing::warn;
use uuid::Uuid;

pub const DAILY_CREDITS: i32 = 30;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserProfile {
    pub user_id: Uuid,
    pub credits: i32,
    pub last_credit_reset: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreditOutcome {
    Allowed { remaining: i32 },
    Denied,
}

/// Grants a fresh allotment the first time a request arrives after the
/// UTC midnight boundary. Returns whether a reset happened.
pub fn apply_daily_reset(profile: &mut UserProfile, now: DateTime<Utc>) -> bool {
    let crossed_midnight = match profile.last_credit_reset {
        None => true,
        Some(last) => last.date_naive() < now.date_naive(),
    };
    if crossed_midnight {
        profile.credits = DAILY_CREDITS;
        profile.last_credit_reset = Some(now);
    }
    crossed_midnight
}

/// Deducts one credit if any remain. Credits never go below zero.
pub fn deduct(profile: &mut UserProfile) -> CreditOutcome {
    if profile.credits > 0 {
        profile.credits -= 1;
        CreditOutcome::Allowed {
            remaining: profile.credits,
        }
    } else {
        CreditOutcome::Denied
    }
}

/// Deduction seam for the chat handler; faked in handler tests.
#[async_trait]
pub trait CreditGate: Send + Sync {
    async fn check_and_deduct(&self, user_id: Uuid) -> CreditOutcome;
}

pub struct PgCreditGate {
    pool: PgPool,
}

impl PgCreditGate {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Checks and deducts one credit inside a single transaction, so two
/// concurrent requests from the same user cannot double-spend. A
/// storage failure logs and admits, matching the limiter's fail-open
/// policy.
#[async_trait]
impl CreditGate for PgCreditGate {
    async fn check_and_deduct(&self, user_id: Uuid) -> CreditOutcome {
        match deduct_transactional(&self.pool, user_id, Utc::now()).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(%user_id, error = %e, "credit ledger unavailable, failing open");
                CreditOutcome::Allowed {
                    remaining: DAILY_CREDITS,
                }
            }
        }
    }
}

async fn deduct_transactional(
    pool: &PgPool,
    user_id: Uuid,
    now: DateTime<Utc>,
) -> Result<CreditOutcome, sqlx::Error> {
    let mut tx = pool.begin().await?;

    // Seed the row before locking it, same first-contact hazard as the
    // limiter: a `FOR UPDATE` on a missing row locks nothing, and two
    // concurrent first messages would both spend from a fresh allotment
    // while the ledger records only one deduction.
    sqlx::query(
        r#"
        INSERT INTO user_profiles (user_id, credits, last_credit_reset)
        VALUES ($1, $2, NULL)
        ON CONFLICT (user_id) DO NOTHING
        "#,
    )
    .bind(user_id)
    .bind(DAILY_CREDITS)
    .execute(&mut *tx)
    .await?;

    let mut profile: UserProfile =
        sqlx::query_as("SELECT * FROM user_profiles WHERE user_id = $1 FOR UPDATE")
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await?;

    apply_daily_reset(&mut profile, now);
    let outcome = deduct(&mut profile);

    if matches!(outcome, CreditOutcome::Denied) {
        // Nothing to persist; the row lock releases on rollback.
        return Ok(outcome);
    }

    sqlx::query(
        "UPDATE user_profiles SET credits = $2, last_credit_reset = $3 WHERE user_id = $1",
    )
    .bind(profile.user_id)
    .bind(profile.credits)
    .bind(profile.last_credit_reset)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    fn profile(credits: i32, last_reset: Option<&str>) -> UserProfile {
        UserProfile {
            user_id: Uuid::new_v4(),
            credits,
            last_credit_reset: last_reset.map(|s| ts(s)),
        }
    }

    #[test]
    fn test_zero_credits_reset_yesterday_grants_fresh_allotment() {
        let mut p = profile(0, Some("2026-03-01T18:00:00Z"));
        let now = ts("2026-03-02T09:00:00Z");

        assert!(apply_daily_reset(&mut p, now));
        assert_eq!(p.credits, DAILY_CREDITS);

        // The current request then spends one of the fresh credits.
        assert_eq!(
            deduct(&mut p),
            CreditOutcome::Allowed {
                remaining: DAILY_CREDITS - 1
            }
        );
    }

    #[test]
    fn test_zero_credits_reset_today_is_denied() {
        let mut p = profile(0, Some("2026-03-02T00:10:00Z"));
        let now = ts("2026-03-02T09:00:00Z");

        assert!(!apply_daily_reset(&mut p, now));
        assert_eq!(deduct(&mut p), CreditOutcome::Denied);
        assert_eq!(p.credits, 0);
    }

    #[test]
    fn test_missing_reset_timestamp_counts_as_stale() {
        let mut p = profile(0, None);
        assert!(apply_daily_reset(&mut p, ts("2026-03-02T09:00:00Z")));
        assert_eq!(p.credits, DAILY_CREDITS);
    }

    #[test]
    fn test_deduct_decrements_without_reset_same_day() {
        let mut p = profile(5, Some("2026-03-02T08:00:00Z"));
        let now = ts("2026-03-02T09:00:00Z");

        assert!(!apply_daily_reset(&mut p, now));
        assert_eq!(deduct(&mut p), CreditOutcome::Allowed { remaining: 4 });
    }

    #[test]
    fn test_second_first_day_deduction_sees_the_first() {
        // Serialized on the row lock, a user's second-ever message must
        // spend from 29, not from a second fresh allotment of 30.
        let mut p = profile(DAILY_CREDITS, None);
        let now = ts("2026-03-02T09:00:00Z");

        apply_daily_reset(&mut p, now);
        assert_eq!(
            deduct(&mut p),
            CreditOutcome::Allowed {
                remaining: DAILY_CREDITS - 1
            }
        );

        apply_daily_reset(&mut p, now);
        assert_eq!(
            deduct(&mut p),
            CreditOutcome::Allowed {
                remaining: DAILY_CREDITS - 2
            }
        );
    }

    #[test]
    fn test_credits_never_go_below_zero() {
        let mut p = profile(1, Some("2026-03-02T08:00:00Z"));
        assert_eq!(deduct(&mut p), CreditOutcome::Allowed { remaining: 0 });
        assert_eq!(deduct(&mut p), CreditOutcome::Denied);
        assert_eq!(p.credits, 0);
    }
}
