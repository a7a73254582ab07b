//! AI call orchestration: prompt assembly, retry with exponential
//! backoff, JSON extraction, required-field validation, and per-attempt
//! structured telemetry.
//!
//! Every model call in the service goes through [`Orchestrator`]. The
//! transport client underneath does no retrying of its own, so parse
//! failures and missing required fields share one retry budget with
//! transport errors.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::ai::extract::{extract_json, Strategy};
use crate::errors::AppError;
use crate::llm_client::{ModelClient, ModelRequest, TokenUsage};

const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1000);
const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(10_000);

/// Separator between the system instruction and the user prompt.
const SYSTEM_SEPARATOR: &str = "\n\n---\n\n";

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("AI call failed after {attempts} attempts: {cause}")]
    Exhausted { attempts: u32, cause: String },

    #[error("AI call cancelled by caller deadline")]
    Cancelled,
}

impl From<OrchestratorError> for AppError {
    fn from(e: OrchestratorError) -> Self {
        match e {
            OrchestratorError::Cancelled => AppError::DeadlineExceeded,
            exhausted => AppError::Llm(exhausted.to_string()),
        }
    }
}

/// Per-call options and telemetry context.
#[derive(Debug, Clone)]
pub struct GenerateOptions<'a> {
    pub system_instruction: Option<&'a str>,
    pub max_retries: u32,
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
    /// Field names the parsed object must contain (non-null). A miss
    /// counts as an attempt failure and burns a retry.
    pub required_fields: &'a [&'a str],
    /// Overall budget for the call, retries included. Expiry aborts
    /// the loop with [`OrchestratorError::Cancelled`].
    pub deadline: Option<Duration>,
    pub feature: &'a str,
    pub user_id: Option<Uuid>,
    pub input_hash: &'a str,
}

impl<'a> GenerateOptions<'a> {
    pub fn new(feature: &'a str) -> Self {
        Self {
            system_instruction: None,
            max_retries: DEFAULT_MAX_RETRIES,
            temperature: None,
            max_output_tokens: None,
            required_fields: &[],
            deadline: None,
            feature,
            user_id: None,
            input_hash: "",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CallMetadata {
    pub model: String,
    pub cached: bool,
    pub latency_ms: u64,
    pub retry_count: u32,
    /// True when the heuristic repair strategy produced the JSON.
    pub repaired: bool,
}

#[derive(Debug, Clone)]
pub struct Generated<T> {
    pub result: T,
    pub usage: TokenUsage,
    pub metadata: CallMetadata,
}

/// Single orchestrator shared across handlers; cheap to clone.
#[derive(Clone)]
pub struct Orchestrator {
    client: Arc<dyn ModelClient>,
    base_delay: Duration,
    max_delay: Duration,
}

impl Orchestrator {
    pub fn new(client: Arc<dyn ModelClient>) -> Self {
        Self {
            client,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }

    #[cfg(test)]
    fn with_backoff(client: Arc<dyn ModelClient>, base: Duration, max: Duration) -> Self {
        Self {
            client,
            base_delay: base,
            max_delay: max,
        }
    }

    /// Calls the model expecting a JSON result, retrying until a value
    /// parses, passes the required-field check, and deserializes as `T`.
    pub async fn generate<T: DeserializeOwned>(
        &self,
        prompt: &str,
        opts: &GenerateOptions<'_>,
    ) -> Result<Generated<T>, OrchestratorError> {
        let required = opts.required_fields;
        self.run(prompt, opts, true, |text| {
            let (value, strategy) = extract_json(text)
                .map_err(|e| e.to_string())?;
            check_required_fields(&value, required)?;
            let result: T = serde_json::from_value(value)
                .map_err(|e| format!("parsed JSON did not match expected shape: {e}"))?;
            Ok((result, Some(strategy)))
        })
        .await
    }

    /// Calls the model and passes the text through unchanged. Used by
    /// the tutoring chat, where the reply is prose.
    pub async fn generate_text(
        &self,
        prompt: &str,
        opts: &GenerateOptions<'_>,
    ) -> Result<Generated<String>, OrchestratorError> {
        self.run(prompt, opts, false, |text| Ok((text.to_string(), None)))
            .await
    }

    async fn run<T>(
        &self,
        prompt: &str,
        opts: &GenerateOptions<'_>,
        json_mode: bool,
        parse: impl Fn(&str) -> Result<(T, Option<Strategy>), String>,
    ) -> Result<Generated<T>, OrchestratorError> {
        let final_prompt = match opts.system_instruction {
            Some(system) => format!("{system}{SYSTEM_SEPARATOR}{prompt}"),
            None => prompt.to_string(),
        };

        let started = tokio::time::Instant::now();
        let deadline_at = opts.deadline.map(|d| started + d);
        let attempts = opts.max_retries.max(1);
        let mut last_error = String::new();

        for attempt in 0..attempts {
            if attempt > 0 {
                let delay = backoff_delay(attempt - 1, self.base_delay, self.max_delay);
                warn!(
                    feature = opts.feature,
                    input_hash = opts.input_hash,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "retrying AI call after backoff"
                );
                self.sleep_within_deadline(delay, deadline_at).await?;
            }

            let request = ModelRequest {
                prompt: &final_prompt,
                temperature: opts.temperature,
                max_output_tokens: opts.max_output_tokens,
                json_mode,
            };

            let attempt_started = tokio::time::Instant::now();
            let response = match self.call_within_deadline(request, deadline_at).await? {
                Ok(r) => r,
                Err(e) => {
                    let latency_ms = attempt_started.elapsed().as_millis() as u64;
                    last_error = e.to_string();
                    warn!(
                        feature = opts.feature,
                        user_id = ?opts.user_id,
                        input_hash = opts.input_hash,
                        attempt,
                        latency_ms,
                        error = %last_error,
                        "ai_call_failed"
                    );
                    continue;
                }
            };

            let latency_ms = attempt_started.elapsed().as_millis() as u64;

            match parse(&response.text) {
                Ok((result, strategy)) => {
                    let repaired = strategy == Some(Strategy::Repair);
                    info!(
                        feature = opts.feature,
                        user_id = ?opts.user_id,
                        input_hash = opts.input_hash,
                        attempt,
                        latency_ms,
                        tokens = response.usage.total_tokens,
                        repaired,
                        "ai_call_succeeded"
                    );
                    return Ok(Generated {
                        result,
                        usage: response.usage,
                        metadata: CallMetadata {
                            model: self.client.model_name().to_string(),
                            cached: false,
                            latency_ms: started.elapsed().as_millis() as u64,
                            retry_count: attempt,
                            repaired,
                        },
                    });
                }
                Err(msg) => {
                    last_error = msg;
                    warn!(
                        feature = opts.feature,
                        user_id = ?opts.user_id,
                        input_hash = opts.input_hash,
                        attempt,
                        latency_ms,
                        tokens = response.usage.total_tokens,
                        error = %last_error,
                        "ai_call_failed"
                    );
                }
            }
        }

        Err(OrchestratorError::Exhausted {
            attempts,
            cause: last_error,
        })
    }

    async fn call_within_deadline(
        &self,
        request: ModelRequest<'_>,
        deadline_at: Option<tokio::time::Instant>,
    ) -> Result<Result<crate::llm_client::ModelResponse, crate::llm_client::ModelError>, OrchestratorError>
    {
        match deadline_at {
            Some(at) => tokio::time::timeout_at(at, self.client.complete(request))
                .await
                .map_err(|_| OrchestratorError::Cancelled),
            None => Ok(self.client.complete(request).await),
        }
    }

    async fn sleep_within_deadline(
        &self,
        delay: Duration,
        deadline_at: Option<tokio::time::Instant>,
    ) -> Result<(), OrchestratorError> {
        if let Some(at) = deadline_at {
            if tokio::time::Instant::now() + delay >= at {
                return Err(OrchestratorError::Cancelled);
            }
        }
        tokio::time::sleep(delay).await;
        Ok(())
    }
}

/// `min(base * 2^retry, ceiling)`.
fn backoff_delay(retry: u32, base: Duration, max: Duration) -> Duration {
    base.saturating_mul(1u32 << retry.min(16)).min(max)
}

/// A missing or null required field is indistinguishable from a parse
/// failure for retry purposes. Non-object values skip the check.
fn check_required_fields(value: &Value, required: &[&str]) -> Result<(), String> {
    if required.is_empty() {
        return Ok(());
    }
    let Some(object) = value.as_object() else {
        return Ok(());
    };
    for field in required {
        match object.get(*field) {
            Some(v) if !v.is_null() => {}
            _ => return Err(format!("response missing required field `{field}`")),
        }
    }
    Ok(())
}
