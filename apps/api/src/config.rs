use std::time::Duration;

use anyhow::{Context, Result};

use crate::llm_client::RetryPolicy;
use crate::pipeline::PipelineConfig;

/// Application configuration loaded from environment variables.
/// Startup fails if a required variable is missing or a tunable does not parse.
#[derive(Debug, Clone)]
pub struct Config {
    pub anthropic_api_key: String,
    /// Signal Cache backing store. Unset disables the cache.
    pub redis_url: Option<String>,
    pub port: u16,
    pub rust_log: String,
    /// Global token ceiling. Unset means unlimited.
    pub token_budget: Option<u64>,
    pub pipeline: PipelineConfig,
    pub retry: RetryPolicy,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let pipeline_defaults = PipelineConfig::default();
        let retry_defaults = RetryPolicy::default();

        let confidence_threshold: f64 = parse_env(
            "SIGNAL_CONFIDENCE_THRESHOLD",
            pipeline_defaults.confidence_threshold,
        )?;
        if !(0.0..=1.0).contains(&confidence_threshold) {
            anyhow::bail!(
                "SIGNAL_CONFIDENCE_THRESHOLD must be between 0 and 1, got {confidence_threshold}"
            );
        }
        let max_attempts: u32 = parse_env("LLM_MAX_ATTEMPTS", retry_defaults.max_attempts)?;
        if max_attempts == 0 {
            anyhow::bail!("LLM_MAX_ATTEMPTS must be at least 1");
        }

        Ok(Config {
            anthropic_api_key: require_env("ANTHROPIC_API_KEY")?,
            redis_url: optional_env("REDIS_URL"),
            port: parse_env("PORT", 8080u16).context("PORT must be a valid port number")?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            token_budget: optional_env("TOKEN_BUDGET")
                .map(|v| v.parse::<u64>())
                .transpose()
                .context("TOKEN_BUDGET must be a non-negative integer")?,
            pipeline: PipelineConfig {
                confidence_threshold,
                cache_ttl: Duration::from_secs(parse_env(
                    "SIGNAL_CACHE_TTL_SECS",
                    pipeline_defaults.cache_ttl.as_secs(),
                )?),
                deadline: Duration::from_secs(parse_env(
                    "JOB_DEADLINE_SECS",
                    pipeline_defaults.deadline.as_secs(),
                )?),
            },
            retry: RetryPolicy {
                max_attempts,
                base_delay: Duration::from_millis(parse_env(
                    "LLM_BASE_DELAY_MS",
                    retry_defaults.base_delay.as_millis() as u64,
                )?),
                call_timeout: Duration::from_secs(parse_env(
                    "LLM_CALL_TIMEOUT_SECS",
                    retry_defaults.call_timeout.as_secs(),
                )?),
                ..retry_defaults
            },
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match optional_env(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("Environment variable '{key}' has invalid value '{raw}'")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_env_falls_back_to_default() {
        assert_eq!(
            parse_env::<u64>("TAILOR_TEST_UNSET_VARIABLE", 42).unwrap(),
            42
        );
    }

    #[test]
    fn test_parse_env_rejects_garbage() {
        std::env::set_var("TAILOR_TEST_GARBAGE_VARIABLE", "not-a-number");
        let err = parse_env::<u64>("TAILOR_TEST_GARBAGE_VARIABLE", 1).unwrap_err();
        assert!(err.to_string().contains("TAILOR_TEST_GARBAGE_VARIABLE"));
        std::env::remove_var("TAILOR_TEST_GARBAGE_VARIABLE");
    }

    #[test]
    fn test_blank_optional_is_unset() {
        std::env::set_var("TAILOR_TEST_BLANK_VARIABLE", "   ");
        assert!(optional_env("TAILOR_TEST_BLANK_VARIABLE").is_none());
        std::env::remove_var("TAILOR_TEST_BLANK_VARIABLE");
    }
}
