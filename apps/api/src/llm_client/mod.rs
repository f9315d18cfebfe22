/// LLM Client: the single point of entry for all generative calls in Tailor.
///
/// ARCHITECTURAL RULE: No other module may call the provider API directly.
/// Pipeline stages depend on the `GenerativeClient` trait and go through
/// `call_structured`, which consults the cost governor and decodes the reply
/// into a typed value. Provider error types never leave this module.
///
/// Model: claude-sonnet-4-5 (hardcoded, not configurable)
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

pub mod budget;
pub mod prompts;
#[cfg(test)]
pub mod testing;

use budget::CostGovernor;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
/// The model used for all generative calls in Tailor.
pub const MODEL: &str = "claude-sonnet-4-5";

/// The pipeline's own view of a failed generative call.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GenerativeError {
    #[error("generative call timed out after {attempts} attempt(s)")]
    Timeout { attempts: u32 },

    #[error("rate limited after {attempts} attempt(s)")]
    RateLimited { attempts: u32 },

    #[error("provider returned status {status}: {message}")]
    Provider { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("provider returned empty content")]
    EmptyContent,

    #[error("request budget exhausted")]
    BudgetExhausted,
}

impl GenerativeError {
    pub fn is_malformed(&self) -> bool {
        matches!(self, GenerativeError::Malformed(_) | GenerativeError::EmptyContent)
    }
}

/// Names and describes the JSON document a caller expects back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseShape {
    pub name: &'static str,
    pub schema: &'static str,
}

#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub system: String,
    pub prompt: String,
    pub shape: ResponseShape,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl GenerationRequest {
    /// Rough token estimate used to reserve budget before the call is issued.
    pub fn estimated_tokens(&self) -> u64 {
        let chars = self.system.len() + self.prompt.len() + self.shape.schema.len();
        (chars as u64).div_ceil(4) + self.max_tokens as u64
    }

    /// The user message actually sent: the prompt followed by the response shape.
    pub fn render(&self) -> String {
        format!(
            "{}\n\nRespond with a single JSON document ({}) matching:\n{}",
            self.prompt, self.shape.name, self.shape.schema
        )
    }
}

/// "Generate structured JSON from a prompt." Implementations hold no state
/// across calls and may be shared by any number of concurrent jobs.
#[async_trait]
pub trait GenerativeClient: Send + Sync {
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<serde_json::Value, GenerativeError>;
}

/// Reserves budget, issues the call and decodes the reply into `T`.
/// A refused reservation never reaches the provider.
pub async fn call_structured<T: DeserializeOwned>(
    client: &dyn GenerativeClient,
    governor: &dyn CostGovernor,
    request: &GenerationRequest,
) -> Result<T, GenerativeError> {
    if !governor.try_reserve(request.estimated_tokens()) {
        warn!(shape = request.shape.name, "Generative call refused by cost governor");
        return Err(GenerativeError::BudgetExhausted);
    }
    let value = client.generate(request).await?;
    decode_structured(value)
}

/// Strict decode of a provider reply into a typed schema.
pub fn decode_structured<T: DeserializeOwned>(
    value: serde_json::Value,
) -> Result<T, GenerativeError> {
    serde_json::from_value(value).map_err(|e| GenerativeError::Malformed(e.to_string()))
}

// ────────────────────────────────────────────────────────────────────────────
// Retry policy
// ────────────────────────────────────────────────────────────────────────────

/// Bounded exponential backoff with jitter, plus a per-attempt timeout.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Fractional jitter: a delay `d` becomes uniform in `[d(1-j), d(1+j)]`.
    pub jitter: f64,
    pub call_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            jitter: 0.3,
            call_timeout: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Un-jittered delay before retry number `retry` (1-based): base * 2^(retry-1), capped.
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    pub fn jittered_backoff(&self, retry: u32) -> Duration {
        let base = self.backoff(retry);
        let jitter = self.jitter.clamp(0.0, 1.0);
        if jitter == 0.0 {
            return base;
        }
        let scale = rand::thread_rng().gen_range((1.0 - jitter)..=(1.0 + jitter));
        base.mul_f64(scale)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Anthropic adapter
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    system: &'a str,
    messages: Vec<AnthropicMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlock>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: u32,
    output_tokens: u32,
}

impl AnthropicResponse {
    fn text(&self) -> Option<&str> {
        self.content
            .iter()
            .find(|b| b.block_type == "text")
            .and_then(|b| b.text.as_deref())
    }
}

#[derive(Debug, Deserialize)]
struct AnthropicError {
    error: AnthropicErrorBody,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorBody {
    message: String,
}

struct AttemptFailure {
    error: GenerativeError,
    retryable: bool,
}

impl AttemptFailure {
    fn retry(error: GenerativeError) -> Self {
        Self {
            error,
            retryable: true,
        }
    }

    fn fatal(error: GenerativeError) -> Self {
        Self {
            error,
            retryable: false,
        }
    }
}

/// HTTP adapter for the Anthropic Messages API.
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    api_key: String,
    base_url: String,
    retry: RetryPolicy,
}

impl LlmClient {
    pub fn new(api_key: String, retry: RetryPolicy) -> Result<Self, GenerativeError> {
        Self::with_base_url(api_key, ANTHROPIC_API_URL.to_string(), retry)
    }

    /// Points the client at a custom endpoint (used by tests).
    pub fn with_base_url(
        api_key: String,
        base_url: String,
        retry: RetryPolicy,
    ) -> Result<Self, GenerativeError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| GenerativeError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            api_key,
            base_url,
            retry,
        })
    }

    async fn attempt(
        &self,
        body: &AnthropicRequest<'_>,
    ) -> Result<serde_json::Value, AttemptFailure> {
        let response = self
            .client
            .post(&self.base_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AttemptFailure::retry(GenerativeError::Timeout { attempts: 1 })
                } else {
                    AttemptFailure::retry(GenerativeError::Transport(e.to_string()))
                }
            })?;

        let status = response.status();

        if status.as_u16() == 429 {
            return Err(AttemptFailure::retry(GenerativeError::RateLimited {
                attempts: 1,
            }));
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<AnthropicError>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            let error = GenerativeError::Provider {
                status: status.as_u16(),
                message,
            };
            return Err(if status.is_server_error() {
                AttemptFailure::retry(error)
            } else {
                AttemptFailure::fatal(error)
            });
        }

        let parsed: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| AttemptFailure::fatal(GenerativeError::Malformed(e.to_string())))?;

        if let Some(usage) = &parsed.usage {
            debug!(
                "LLM call succeeded: input_tokens={}, output_tokens={}",
                usage.input_tokens, usage.output_tokens
            );
        }

        let text = parsed
            .text()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| AttemptFailure::fatal(GenerativeError::EmptyContent))?;

        parse_json_document(text).map_err(AttemptFailure::fatal)
    }
}

#[async_trait]
impl GenerativeClient for LlmClient {
    /// Retries timeouts, 429 and 5xx with jittered exponential backoff.
    /// Malformed output is returned immediately; repairing it is the caller's call.
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<serde_json::Value, GenerativeError> {
        let content = request.render();
        let body = AnthropicRequest {
            model: MODEL,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            system: &request.system,
            messages: vec![AnthropicMessage {
                role: "user",
                content: &content,
            }],
        };

        let max_attempts = self.retry.max_attempts.max(1);
        let mut last_error = GenerativeError::Timeout { attempts: 0 };

        for attempt in 1..=max_attempts {
            if attempt > 1 {
                let delay = self.retry.jittered_backoff(attempt - 1);
                warn!(
                    shape = request.shape.name,
                    "LLM call attempt {} failed ({}), retrying after {}ms...",
                    attempt - 1,
                    last_error,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }

            let outcome = match tokio::time::timeout(self.retry.call_timeout, self.attempt(&body))
                .await
            {
                Ok(outcome) => outcome,
                Err(_) => Err(AttemptFailure::retry(GenerativeError::Timeout { attempts: 1 })),
            };

            match outcome {
                Ok(value) => return Ok(value),
                Err(failure) if failure.retryable => last_error = failure.error,
                Err(failure) => return Err(failure.error),
            }
        }

        Err(match last_error {
            GenerativeError::Timeout { .. } => GenerativeError::Timeout {
                attempts: max_attempts,
            },
            GenerativeError::RateLimited { .. } => GenerativeError::RateLimited {
                attempts: max_attempts,
            },
            other => other,
        })
    }
}

/// Parses model text as a JSON object or array, tolerating code fences.
fn parse_json_document(text: &str) -> Result<serde_json::Value, GenerativeError> {
    let value: serde_json::Value = serde_json::from_str(strip_json_fences(text))
        .map_err(|e| GenerativeError::Malformed(e.to_string()))?;
    if value.is_object() || value.is_array() {
        Ok(value)
    } else {
        Err(GenerativeError::Malformed(
            "expected a JSON object or array".to_string(),
        ))
    }
}

/// Strips ```json ... ``` or ``` ... ``` code fences from LLM output.
fn strip_json_fences(text: &str) -> &str {
    let text = text.trim();
    if let Some(stripped) = text.strip_prefix("```json") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else if let Some(stripped) = text.strip_prefix("```") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::budget::{TokenBudget, Unlimited};
    use super::testing::ScriptedClient;
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const SHAPE: ResponseShape = ResponseShape {
        name: "ping",
        schema: r#"{"ok": true}"#,
    };

    fn request() -> GenerationRequest {
        GenerationRequest {
            system: "system".into(),
            prompt: "prompt".into(),
            shape: SHAPE,
            max_tokens: 100,
            temperature: 0.2,
        }
    }

    fn fast_retry(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            jitter: 0.3,
            call_timeout: Duration::from_millis(500),
        }
    }

    fn text_reply(text: &str) -> serde_json::Value {
        json!({
            "content": [{"type": "text", "text": text}],
            "usage": {"input_tokens": 10, "output_tokens": 5}
        })
    }

    async fn client_for(server: &MockServer, retry: RetryPolicy) -> LlmClient {
        LlmClient::with_base_url(
            "test-key".into(),
            format!("{}/v1/messages", server.uri()),
            retry,
        )
        .unwrap()
    }

    #[test]
    fn test_strip_json_fences_with_json_tag() {
        let input = "```json\n{\"key\": \"value\"}\n```";
        assert_eq!(strip_json_fences(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_strip_json_fences_without_tag() {
        let input = "```\n{\"key\": \"value\"}\n```";
        assert_eq!(strip_json_fences(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_strip_json_fences_no_fences() {
        let input = "{\"key\": \"value\"}";
        assert_eq!(strip_json_fences(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_parse_json_document_rejects_scalars() {
        assert!(parse_json_document("42").unwrap_err().is_malformed());
        assert!(parse_json_document("not json").unwrap_err().is_malformed());
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
            ..RetryPolicy::default()
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(350));
    }

    #[test]
    fn test_jittered_backoff_stays_within_band() {
        let policy = RetryPolicy {
            base_delay: Duration::from_millis(1000),
            jitter: 0.3,
            ..RetryPolicy::default()
        };
        for _ in 0..50 {
            let d = policy.jittered_backoff(1).as_millis();
            assert!((700..=1300).contains(&d), "delay {d}ms outside jitter band");
        }
    }

    #[test]
    fn test_estimated_tokens_includes_max_tokens() {
        let req = request();
        assert!(req.estimated_tokens() > req.max_tokens as u64);
    }

    #[tokio::test]
    async fn test_generate_returns_parsed_json() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(text_reply(r#"{"ok": true}"#)))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, fast_retry(3)).await;
        let value = client.generate(&request()).await.unwrap();
        assert_eq!(value, json!({"ok": true}));
    }

    #[tokio::test]
    async fn test_generate_accepts_fenced_json() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(text_reply("```json\n{\"ok\": 1}\n```")),
            )
            .mount(&server)
            .await;

        let client = client_for(&server, fast_retry(1)).await;
        assert_eq!(client.generate(&request()).await.unwrap(), json!({"ok": 1}));
    }

    #[tokio::test]
    async fn test_generate_retries_server_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(text_reply(r#"{"ok": true}"#)))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, fast_retry(3)).await;
        assert!(client.generate(&request()).await.is_ok());
    }

    #[tokio::test]
    async fn test_generate_gives_up_after_max_attempts_on_rate_limit() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .expect(3)
            .mount(&server)
            .await;

        let client = client_for(&server, fast_retry(3)).await;
        let err = client.generate(&request()).await.unwrap_err();
        assert_eq!(err, GenerativeError::RateLimited { attempts: 3 });
    }

    #[tokio::test]
    async fn test_generate_does_not_retry_client_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_json(json!({"error": {"message": "bad request"}})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, fast_retry(3)).await;
        let err = client.generate(&request()).await.unwrap_err();
        assert_eq!(
            err,
            GenerativeError::Provider {
                status: 400,
                message: "bad request".into()
            }
        );
    }

    #[tokio::test]
    async fn test_generate_reports_malformed_without_retry() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(text_reply("Sure! Here it is")))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, fast_retry(3)).await;
        assert!(client.generate(&request()).await.unwrap_err().is_malformed());
    }

    #[tokio::test]
    async fn test_generate_times_out_each_attempt() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(text_reply(r#"{"ok": true}"#))
                    .set_delay(Duration::from_millis(300)),
            )
            .mount(&server)
            .await;

        let retry = RetryPolicy {
            call_timeout: Duration::from_millis(30),
            ..fast_retry(2)
        };
        let client = client_for(&server, retry).await;
        assert_eq!(
            client.generate(&request()).await.unwrap_err(),
            GenerativeError::Timeout { attempts: 2 }
        );
    }

    #[tokio::test]
    async fn test_call_structured_decodes_typed_value() {
        #[derive(Deserialize)]
        struct Ping {
            ok: bool,
        }
        let client = ScriptedClient::new().on("ping", vec![Ok(json!({"ok": true}))]);
        let ping: Ping = call_structured(&client, &Unlimited, &request()).await.unwrap();
        assert!(ping.ok);
    }

    #[tokio::test]
    async fn test_call_structured_maps_schema_mismatch_to_malformed() {
        #[derive(Debug, Deserialize)]
        #[allow(dead_code)]
        struct Ping {
            ok: bool,
        }
        let client = ScriptedClient::new().on("ping", vec![Ok(json!({"ok": "yes"}))]);
        let err = call_structured::<Ping>(&client, &Unlimited, &request())
            .await
            .unwrap_err();
        assert!(err.is_malformed());
    }

    #[tokio::test]
    async fn test_call_structured_skips_call_when_budget_refuses() {
        let client = ScriptedClient::new().on("ping", vec![Ok(json!({"ok": true}))]);
        let budget = TokenBudget::new(1);
        let err = call_structured::<serde_json::Value>(&client, &budget, &request())
            .await
            .unwrap_err();
        assert_eq!(err, GenerativeError::BudgetExhausted);
        assert_eq!(client.calls(), 0);
    }
}
