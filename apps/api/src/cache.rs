//! Redis-backed response cache keyed by (kind, input hash).
//!
//! Caching is an optimization, never a correctness requirement: every
//! read or write failure is logged and swallowed, and expiry is
//! delegated to Redis TTLs so a lookup can never observe a stale entry.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use tracing::warn;

const HOUR: u64 = 3600;
const DAY: u64 = 24 * HOUR;

/// Feature whose result is being cached. Drives both the cache key
/// namespace and the TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheKind {
    ResumeAnalysis,
    SkillRoadmap,
    StudySummary,
    Flashcards,
    Quiz,
    InterviewQuestions,
}

impl CacheKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CacheKind::ResumeAnalysis => "resume_analysis",
            CacheKind::SkillRoadmap => "skill_roadmap",
            CacheKind::StudySummary => "study_summary",
            CacheKind::Flashcards => "flashcards",
            CacheKind::Quiz => "quiz",
            CacheKind::InterviewQuestions => "interview_questions",
        }
    }

    /// How quickly the underlying input's "correct answer" goes stale.
    pub fn ttl(self) -> Duration {
        let secs = match self {
            CacheKind::ResumeAnalysis => DAY,
            CacheKind::SkillRoadmap => 30 * DAY,
            CacheKind::StudySummary | CacheKind::Flashcards | CacheKind::Quiz => 7 * DAY,
            CacheKind::InterviewQuestions => HOUR,
        };
        Duration::from_secs(secs)
    }
}

impl fmt::Display for CacheKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CacheKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "resume_analysis" => Ok(CacheKind::ResumeAnalysis),
            "skill_roadmap" => Ok(CacheKind::SkillRoadmap),
            "study_summary" => Ok(CacheKind::StudySummary),
            "flashcards" => Ok(CacheKind::Flashcards),
            "quiz" => Ok(CacheKind::Quiz),
            "interview_questions" => Ok(CacheKind::InterviewQuestions),
            other => Err(format!("unknown kind '{other}'")),
        }
    }
}

/// Stored once per successful AI call; never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedResult {
    pub response: serde_json::Value,
    pub model: String,
    pub tokens_used: u32,
    pub created_at: DateTime<Utc>,
}

fn cache_key(kind: CacheKind, input_hash: &str) -> String {
    format!("cache:{}:{}", kind.as_str(), input_hash)
}

/// Storage seam for the response cache. Handler tests substitute an
/// in-memory fake, the same way the orchestrator swaps out its model
/// client.
#[async_trait]
pub trait ResponseCache: Send + Sync {
    async fn get(&self, kind: CacheKind, input_hash: &str) -> Option<CachedResult>;
    async fn put(&self, kind: CacheKind, input_hash: &str, result: &CachedResult);
}

pub struct RedisCache {
    client: redis::Client,
}

impl RedisCache {
    pub fn new(client: redis::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ResponseCache for RedisCache {
    /// Looks up an unexpired cached result. Any infrastructure or
    /// decode problem degrades to a miss.
    async fn get(&self, kind: CacheKind, input_hash: &str) -> Option<CachedResult> {
        let key = cache_key(kind, input_hash);

        let mut conn = match self.client.get_multiplexed_async_connection().await {
            Ok(c) => c,
            Err(e) => {
                warn!(%key, error = %e, "cache read failed, treating as miss");
                return None;
            }
        };

        let raw: Option<String> = match conn.get(&key).await {
            Ok(v) => v,
            Err(e) => {
                warn!(%key, error = %e, "cache read failed, treating as miss");
                return None;
            }
        };

        raw.and_then(|payload| match serde_json::from_str(&payload) {
            Ok(result) => Some(result),
            Err(e) => {
                warn!(%key, error = %e, "cached payload undecodable, treating as miss");
                None
            }
        })
    }

    /// Writes a result with the kind's TTL. Fire-and-forget: failures
    /// are logged, the caller still returns the fresh result.
    async fn put(&self, kind: CacheKind, input_hash: &str, result: &CachedResult) {
        let key = cache_key(kind, input_hash);

        let payload = match serde_json::to_string(result) {
            Ok(p) => p,
            Err(e) => {
                warn!(%key, error = %e, "cache write skipped, unserializable result");
                return;
            }
        };

        let mut conn = match self.client.get_multiplexed_async_connection().await {
            Ok(c) => c,
            Err(e) => {
                warn!(%key, error = %e, "cache write failed");
                return;
            }
        };

        if let Err(e) = conn
            .set_ex::<_, _, ()>(&key, payload, kind.ttl().as_secs())
            .await
        {
            warn!(%key, error = %e, "cache write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key_is_namespaced_by_kind_and_hash() {
        assert_eq!(
            cache_key(CacheKind::ResumeAnalysis, "ab12cd34ef56ab12"),
            "cache:resume_analysis:ab12cd34ef56ab12"
        );
    }

    #[test]
    fn test_ttls_reflect_staleness_of_each_feature() {
        assert_eq!(CacheKind::InterviewQuestions.ttl(), Duration::from_secs(HOUR));
        assert_eq!(CacheKind::ResumeAnalysis.ttl(), Duration::from_secs(DAY));
        assert_eq!(CacheKind::Quiz.ttl(), Duration::from_secs(7 * DAY));
        assert_eq!(CacheKind::SkillRoadmap.ttl(), Duration::from_secs(30 * DAY));
    }

    #[test]
    fn test_kind_round_trips_through_str() {
        for kind in [
            CacheKind::ResumeAnalysis,
            CacheKind::SkillRoadmap,
            CacheKind::StudySummary,
            CacheKind::Flashcards,
            CacheKind::Quiz,
            CacheKind::InterviewQuestions,
        ] {
            assert_eq!(kind.as_str().parse::<CacheKind>().unwrap(), kind);
        }
        assert!("pdf_export".parse::<CacheKind>().is_err());
    }
}
