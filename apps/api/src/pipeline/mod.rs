//! Pipeline orchestrator.
//!
//! Runs a job through `INGEST → EXTRACT_SIGNALS → PROCESS → VALIDATE → OUTPUT`
//! and ends in `COMPLETED`, or in `FAILED` with a single `FailureReason`. The
//! orchestrator only sequences stages, looks up the idempotency key, logs stage
//! entry/exit and maps stage errors to failures. It never retries a stage.

pub mod coverage;
pub mod handlers;
pub mod single_flight;
pub mod stages;
pub mod state;
pub mod store;

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};
use uuid::Uuid;

use crate::errors::{FailureKind, FailureReason, StageError};
use crate::generation::fused::FusedProcessor;
use crate::llm_client::budget::CostGovernor;
use crate::llm_client::GenerativeClient;
use crate::models::job::{Job, JobOutput};
use crate::signals::cache::SignalCache;
use crate::signals::SignalExtractor;
use crate::validation::Validator;

use single_flight::KeyedLocks;
use state::{JobState, LogEntry, LogLevel, Stage};
use store::{JobResultStore, StoreError};

/// Pipeline tunables. None of the defaults is load-bearing for correctness.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Local extraction at or above this confidence skips the generative fallback.
    pub confidence_threshold: f64,
    pub cache_ttl: Duration,
    /// Wraps the whole run, replay lookup included.
    pub deadline: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.7,
            cache_ttl: Duration::from_secs(3600),
            deadline: Duration::from_secs(180),
        }
    }
}

pub struct Pipeline {
    extractor: SignalExtractor,
    fused: FusedProcessor,
    validator: Validator,
    cache: Arc<dyn SignalCache>,
    store: Arc<dyn JobResultStore>,
    locks: KeyedLocks,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(
        client: Arc<dyn GenerativeClient>,
        governor: Arc<dyn CostGovernor>,
        cache: Arc<dyn SignalCache>,
        store: Arc<dyn JobResultStore>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            extractor: SignalExtractor::new(
                Arc::clone(&client),
                Arc::clone(&governor),
                config.confidence_threshold,
            ),
            fused: FusedProcessor::new(Arc::clone(&client), Arc::clone(&governor)),
            validator: Validator::new(client, governor),
            cache,
            store,
            locks: KeyedLocks::new(),
            config,
        }
    }

    /// Runs one job to completion or failure. A job whose key already has a
    /// stored output gets that output back without any stage running.
    pub async fn run(&self, job: Job) -> Result<JobOutput, FailureReason> {
        let job_id = job
            .job_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let mut reached = Stage::Ingest;
        let outcome =
            tokio::time::timeout(self.config.deadline, self.drive(job_id.clone(), job, &mut reached))
                .await;

        match outcome {
            Ok(result) => result,
            Err(_) => {
                error!(
                    job_id = %job_id,
                    stage = %reached,
                    "Job deadline of {:?} exceeded", self.config.deadline
                );
                Err(FailureReason {
                    job_id,
                    stage: reached,
                    kind: FailureKind::Timeout,
                    message: format!("deadline of {:?} exceeded", self.config.deadline),
                })
            }
        }
    }

    async fn drive(
        &self,
        job_id: String,
        job: Job,
        reached: &mut Stage,
    ) -> Result<JobOutput, FailureReason> {
        let fail = |stage: Stage, err: StageError| {
            LogEntry::record(
                &job_id,
                Stage::Failed,
                LogLevel::Error,
                format!("failed during {stage}: {err}"),
            );
            FailureReason {
                job_id: job_id.clone(),
                stage,
                kind: err.kind(),
                message: err.to_string(),
            }
        };

        let mut state = JobState::new(job_id.clone(), job);

        // INGEST
        *reached = Stage::Ingest;
        state.enter(Stage::Ingest);
        let mut state = stages::ingest(state).map_err(|e| fail(Stage::Ingest, e))?;

        let _flight = self.locks.acquire(&state.idempotency_key).await;
        if let Some(output) = self
            .replay(&state.idempotency_key)
            .await
            .map_err(|e| fail(Stage::Ingest, e))?
        {
            info!(
                job_id = %job_id,
                key = %state.idempotency_key,
                "Returning stored output without re-running"
            );
            return Ok(output);
        }
        state.leave();

        // EXTRACT_SIGNALS
        *reached = Stage::ExtractSignals;
        state.enter(Stage::ExtractSignals);
        let mut state = stages::extract_signals(
            state,
            self.cache.as_ref(),
            &self.extractor,
            self.config.cache_ttl,
        )
        .await
        .map_err(|e| fail(Stage::ExtractSignals, e))?;
        state.leave();

        // PROCESS
        *reached = Stage::Process;
        state.enter(Stage::Process);
        let mut state = stages::process(state, &self.fused)
            .await
            .map_err(|e| fail(Stage::Process, e))?;
        state.leave();

        // VALIDATE
        *reached = Stage::Validate;
        state.enter(Stage::Validate);
        let mut state = stages::validate(state, &self.validator)
            .await
            .map_err(|e| fail(Stage::Validate, e))?;
        state.leave();

        // OUTPUT
        *reached = Stage::Output;
        state.enter(Stage::Output);
        let mut output = stages::output(state).map_err(|e| fail(Stage::Output, e))?;
        output.logs.push(LogEntry::record(
            &job_id,
            Stage::Output,
            LogLevel::Info,
            "leaving OUTPUT",
        ));

        *reached = Stage::Completed;
        output.logs.push(LogEntry::record(
            &job_id,
            Stage::Completed,
            LogLevel::Info,
            format!("completed with {} results", output.results.len()),
        ));

        if let Err(e) = self.store.put(&output.idempotency_key, &output).await {
            warn!(job_id = %job_id, "Failed to store job output, replay unavailable: {e}");
        }
        Ok(output)
    }

    /// An unavailable store is a miss; a corrupt entry is fatal.
    async fn replay(&self, key: &str) -> Result<Option<JobOutput>, StageError> {
        match self.store.get(key).await {
            Ok(found) => Ok(found),
            Err(StoreError::Unavailable(e)) => {
                warn!("Job store unavailable, running without replay: {e}");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::prompts::FUSED_SHAPE;
    use crate::llm_client::budget::{TokenBudget, Unlimited};
    use crate::llm_client::testing::ScriptedClient;
    use crate::llm_client::GenerativeError;
    use crate::models::job::{FlagKind, FlagSource, ItemStatus, SignalSource};
    use crate::normalize::{normalize_text, signal_key};
    use crate::signals::cache::{DisabledSignalCache, InMemorySignalCache};
    use crate::signals::local::extract_local;
    use crate::signals::prompts::EXTRACT_SHAPE;
    use crate::validation::prompts::CONSISTENCY_SHAPE;
    use serde_json::{json, Value};
    use super::store::InMemoryJobStore;

    const REFERENCE: &str = "We are hiring a data analyst to build Tableau dashboards for \
        executive stakeholders. The analyst will apply analytical thinking, write SQL \
        queries and communicate insights across product teams.";

    fn job(id: &str, items: Value) -> Job {
        job_with_reference(id, REFERENCE, items)
    }

    fn job_with_reference(id: &str, reference: &str, items: Value) -> Job {
        serde_json::from_value(json!({
            "job_id": id,
            "role": "Data Analyst",
            "reference_text": reference,
            "items": items,
        }))
        .unwrap()
    }

    fn fused_reply(entries: &[(usize, &str)]) -> Value {
        let results: Vec<Value> = entries
            .iter()
            .map(|(index, variant)| {
                json!({
                    "item_index": index,
                    "variants": [variant],
                    "scores": {"relevance": 80, "impact": 60, "clarity": 85},
                    "rationale": "Aligned with the role"
                })
            })
            .collect();
        json!({ "results": results })
    }

    fn no_violations() -> Vec<Result<Value, GenerativeError>> {
        vec![Ok(json!({"violations": []}))]
    }

    /// Local extraction is always trusted, so only the fused and consistency
    /// calls reach the client.
    fn local_only() -> PipelineConfig {
        PipelineConfig {
            confidence_threshold: 0.0,
            ..PipelineConfig::default()
        }
    }

    fn pipeline(
        client: Arc<ScriptedClient>,
        cache: Arc<dyn SignalCache>,
        config: PipelineConfig,
    ) -> Pipeline {
        Pipeline::new(
            client,
            Arc::new(Unlimited),
            cache,
            Arc::new(InMemoryJobStore::new()),
            config,
        )
    }

    #[tokio::test]
    async fn test_end_to_end_keeps_tool_out_of_revision() {
        assert!(extract_local(REFERENCE)
            .signals
            .tools
            .iter()
            .any(|t| t == "Tableau"));

        let client = Arc::new(
            ScriptedClient::new()
                .on(
                    FUSED_SHAPE.name,
                    vec![Ok(fused_reply(&[(
                        0,
                        "Applied analytical thinking to build Tableau dashboards for stakeholders",
                    )]))],
                )
                .on(CONSISTENCY_SHAPE.name, no_violations()),
        );
        let pipeline = pipeline(client.clone(), Arc::new(DisabledSignalCache), local_only());

        let output = pipeline
            .run(job("job-e2e", json!([{"text": "Built dashboards for stakeholders"}])))
            .await
            .unwrap();

        let result = &output.results[0];
        assert_eq!(result.original, "Built dashboards for stakeholders");
        assert!(result
            .revised
            .iter()
            .all(|v| !v.to_lowercase().contains("tableau")));
        assert!(result
            .flags
            .iter()
            .any(|f| f.kind == FlagKind::FabricatedTool));
        assert!(output.summary.top_terms.iter().any(|t| t == "Tableau"));
        assert_eq!(output.signal_source, SignalSource::Local);

        let fused_prompt = &client.requests()[0].prompt;
        assert!(fused_prompt.contains("Tableau"));
        assert_eq!(client.calls_for(EXTRACT_SHAPE.name), 0);
    }

    #[tokio::test]
    async fn test_transferable_competency_may_be_added() {
        let client = Arc::new(
            ScriptedClient::new()
                .on(
                    FUSED_SHAPE.name,
                    vec![Ok(fused_reply(&[(
                        0,
                        "Applied analytical thinking to build dashboards for stakeholders",
                    )]))],
                )
                .on(CONSISTENCY_SHAPE.name, no_violations()),
        );
        let pipeline = pipeline(client, Arc::new(DisabledSignalCache), local_only());

        let output = pipeline
            .run(job("job-competency", json!([{"text": "Built dashboards for stakeholders"}])))
            .await
            .unwrap();

        let result = &output.results[0];
        assert_eq!(
            result.revised[0],
            "Applied analytical thinking to build dashboards for stakeholders"
        );
        assert!(!result
            .flags
            .iter()
            .any(|f| f.kind == FlagKind::FabricatedTool));
        assert_eq!(result.status, ItemStatus::Processed);
    }

    #[tokio::test]
    async fn test_metric_isolation() {
        let client = Arc::new(
            ScriptedClient::new()
                .on(
                    FUSED_SHAPE.name,
                    vec![Ok(fused_reply(&[
                        (0, "Grew newsletter signups to 45 users"),
                        (1, "Redesigned onboarding emails, lifting open rates by 45%"),
                    ]))],
                )
                .on(CONSISTENCY_SHAPE.name, no_violations()),
        );
        let pipeline = pipeline(client, Arc::new(DisabledSignalCache), local_only());

        let output = pipeline
            .run(job(
                "job-metrics",
                json!([
                    {"text": "Grew newsletter signups", "metrics": {"users": 45}},
                    {"text": "Redesigned onboarding emails"}
                ]),
            ))
            .await
            .unwrap();

        assert!(output.results[0].revised[0].contains("45"));
        assert!(!output.results[1].revised[0].contains("45"));
        assert!(output.results[1]
            .flags
            .iter()
            .any(|f| f.kind == FlagKind::BorrowedMetric));
    }

    #[tokio::test]
    async fn test_fabricated_tool_flag_from_both_passes() {
        let client = Arc::new(
            ScriptedClient::new()
                .on(
                    FUSED_SHAPE.name,
                    vec![Ok(fused_reply(&[(0, "Built Tableau dashboards for stakeholders")]))],
                )
                .on(
                    CONSISTENCY_SHAPE.name,
                    vec![Ok(json!({"violations": [
                        {"item_index": 0, "variant_index": 0, "type": "fabricated_tool",
                         "detail": "Tableau is not in the original"}
                    ]}))],
                ),
        );
        let pipeline = pipeline(client, Arc::new(DisabledSignalCache), local_only());

        let output = pipeline
            .run(job("job-fabricated", json!([{"text": "Built dashboards for stakeholders"}])))
            .await
            .unwrap();

        let sources: Vec<FlagSource> = output.results[0]
            .flags
            .iter()
            .filter(|f| f.kind == FlagKind::FabricatedTool)
            .map(|f| f.source)
            .collect();
        assert!(sources.contains(&FlagSource::Rule));
        assert!(sources.contains(&FlagSource::Consistency));
        assert_eq!(
            output
                .flags
                .iter()
                .filter(|f| f.kind == FlagKind::FabricatedTool)
                .count(),
            2
        );
    }

    #[tokio::test]
    async fn test_order_preserved_when_reply_is_shuffled() {
        let client = Arc::new(
            ScriptedClient::new()
                .on(
                    FUSED_SHAPE.name,
                    vec![Ok(fused_reply(&[
                        (2, "Wrote weekly SQL reports for finance"),
                        (0, "Built dashboards for stakeholders"),
                        (1, "Led onboarding for new analysts"),
                    ]))],
                )
                .on(CONSISTENCY_SHAPE.name, no_violations()),
        );
        let pipeline = pipeline(client, Arc::new(DisabledSignalCache), local_only());
        let items = [
            "Built dashboards for stakeholders",
            "Led onboarding for new analysts",
            "Wrote weekly SQL reports for finance",
        ];

        let output = pipeline
            .run(job(
                "job-order",
                json!(items.iter().map(|t| json!({"text": t})).collect::<Vec<_>>()),
            ))
            .await
            .unwrap();

        let originals: Vec<&str> = output.results.iter().map(|r| r.original.as_str()).collect();
        assert_eq!(originals, items);
        for (result, item) in output.results.iter().zip(items) {
            assert_eq!(result.revised[0], item);
        }
    }

    #[tokio::test]
    async fn test_replay_is_byte_identical_and_skips_stages() {
        let client = Arc::new(
            ScriptedClient::new()
                .on(
                    FUSED_SHAPE.name,
                    vec![Ok(fused_reply(&[(0, "Built stakeholder dashboards")]))],
                )
                .on(CONSISTENCY_SHAPE.name, no_violations()),
        );
        let pipeline = pipeline(client.clone(), Arc::new(DisabledSignalCache), local_only());
        let items = json!([{"text": "Built dashboards for stakeholders"}]);

        let first = pipeline.run(job("job-replay", items.clone())).await.unwrap();
        let calls = client.calls();
        let second = pipeline.run(job("job-replay", items)).await.unwrap();

        assert_eq!(
            serde_json::to_vec(&first).unwrap(),
            serde_json::to_vec(&second).unwrap()
        );
        assert_eq!(client.calls(), calls);
        assert_eq!(client.calls_for(FUSED_SHAPE.name), 1);
    }

    #[tokio::test]
    async fn test_concurrent_duplicates_run_once() {
        let client = Arc::new(
            ScriptedClient::new()
                .on(
                    FUSED_SHAPE.name,
                    vec![Ok(fused_reply(&[(0, "Built stakeholder dashboards")]))],
                )
                .on(CONSISTENCY_SHAPE.name, no_violations())
                .with_delay(Duration::from_millis(20)),
        );
        let pipeline = pipeline(client.clone(), Arc::new(DisabledSignalCache), local_only());
        let items = json!([{"text": "Built dashboards for stakeholders"}]);

        let (a, b) = tokio::join!(
            pipeline.run(job("job-dup", items.clone())),
            pipeline.run(job("job-dup", items))
        );

        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(client.calls_for(FUSED_SHAPE.name), 1);
    }

    #[tokio::test]
    async fn test_always_timing_out_client_still_completes() {
        let timeout = || vec![Err(GenerativeError::Timeout { attempts: 3 })];
        let client = Arc::new(
            ScriptedClient::new()
                .on(EXTRACT_SHAPE.name, timeout())
                .on(FUSED_SHAPE.name, timeout())
                .on(CONSISTENCY_SHAPE.name, timeout()),
        );
        let config = PipelineConfig {
            confidence_threshold: extract_local(REFERENCE).confidence,
            ..PipelineConfig::default()
        };
        let pipeline = pipeline(client.clone(), Arc::new(DisabledSignalCache), config);

        let output = pipeline
            .run(job(
                "job-degraded",
                json!([{"text": "Built dashboards for stakeholders"}, {"text": "Led onboarding"}]),
            ))
            .await
            .unwrap();

        assert_eq!(output.results.len(), 2);
        assert!(output
            .results
            .iter()
            .all(|r| r.status == ItemStatus::ProcessingFailed));
        assert!(output
            .flags
            .iter()
            .any(|f| f.kind == FlagKind::ConsistencyCheckSkipped));
        assert_eq!(output.signal_source, SignalSource::Local);
        assert_eq!(client.calls_for(EXTRACT_SHAPE.name), 0);
        assert_eq!(
            output.logs.last().map(|l| l.stage),
            Some(Stage::Completed)
        );
    }

    #[tokio::test]
    async fn test_failed_fallback_degrades_to_local_and_is_not_cached() {
        let client = Arc::new(
            ScriptedClient::new()
                .on(
                    EXTRACT_SHAPE.name,
                    vec![Err(GenerativeError::RateLimited { attempts: 3 })],
                )
                .on(
                    FUSED_SHAPE.name,
                    vec![Ok(fused_reply(&[(0, "Built stakeholder dashboards")]))],
                )
                .on(CONSISTENCY_SHAPE.name, no_violations()),
        );
        let cache = Arc::new(InMemorySignalCache::new());
        let config = PipelineConfig {
            confidence_threshold: 1.1,
            ..PipelineConfig::default()
        };
        let pipeline = pipeline(client, cache.clone(), config);

        let output = pipeline
            .run(job("job-fallback", json!([{"text": "Built dashboards for stakeholders"}])))
            .await
            .unwrap();

        assert_eq!(output.signal_source, SignalSource::LocalAfterFallbackFailure);
        assert!(output
            .logs
            .iter()
            .any(|l| l.level == LogLevel::Warn && l.stage == Stage::ExtractSignals));
        let hash = signal_key(&normalize_text(REFERENCE));
        assert!(cache.get(&hash).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cache_does_not_change_signals() {
        let script = || {
            ScriptedClient::new()
                .on(
                    FUSED_SHAPE.name,
                    vec![Ok(fused_reply(&[(0, "Built stakeholder dashboards")]))],
                )
                .on(CONSISTENCY_SHAPE.name, no_violations())
        };
        let items = json!([{"text": "Built dashboards for stakeholders"}]);

        let uncached = pipeline(Arc::new(script()), Arc::new(DisabledSignalCache), local_only())
            .run(job("job-uncached", items.clone()))
            .await
            .unwrap();

        let cached = pipeline(
            Arc::new(script()),
            Arc::new(InMemorySignalCache::new()),
            local_only(),
        );
        let cold = cached.run(job("job-cold", items.clone())).await.unwrap();
        let warm = cached.run(job("job-warm", items)).await.unwrap();

        assert_eq!(cold.signal_source, SignalSource::Local);
        assert_eq!(warm.signal_source, SignalSource::Cache);
        assert_eq!(uncached.summary.top_terms, cold.summary.top_terms);
        assert_eq!(cold.summary.top_terms, warm.summary.top_terms);
    }

    #[tokio::test]
    async fn test_case_variant_reference_gets_its_own_signals() {
        let script = || {
            ScriptedClient::new()
                .on(
                    FUSED_SHAPE.name,
                    vec![Ok(fused_reply(&[(0, "Built backend services in Rust for clients")]))],
                )
                .on(CONSISTENCY_SHAPE.name, no_violations())
        };
        let lower = "we build backend services in rust and swift for our clients.";
        let upper = "We build backend services in Rust and Swift for our clients.";
        let items = json!([{"text": "Built backend services for clients"}]);
        let tool_flagged = |output: &JobOutput| {
            output.results[0]
                .flags
                .iter()
                .any(|f| f.kind == FlagKind::FabricatedTool)
        };

        let uncached = pipeline(Arc::new(script()), Arc::new(DisabledSignalCache), local_only())
            .run(job_with_reference("job-upper-uncached", upper, items.clone()))
            .await
            .unwrap();

        let cached = pipeline(
            Arc::new(script()),
            Arc::new(InMemorySignalCache::new()),
            local_only(),
        );
        cached
            .run(job_with_reference("job-lower", lower, items.clone()))
            .await
            .unwrap();
        let warm = cached
            .run(job_with_reference("job-upper", upper, items))
            .await
            .unwrap();

        assert_eq!(warm.signal_source, SignalSource::Local);
        assert!(tool_flagged(&uncached));
        assert_eq!(tool_flagged(&warm), tool_flagged(&uncached));
        assert_eq!(warm.results[0].revised, uncached.results[0].revised);
        assert!(warm.results[0].revised.iter().all(|v| !v.contains("Rust")));
    }

    #[tokio::test]
    async fn test_corrupt_cache_entry_fails_job() {
        let client = Arc::new(ScriptedClient::new());
        let cache = Arc::new(InMemorySignalCache::new());
        let hash = signal_key(&normalize_text(REFERENCE));
        cache
            .put_raw(&hash, "{\"terms\": 7}", Duration::from_secs(60))
            .await;
        let pipeline = pipeline(client.clone(), cache, local_only());

        let reason = pipeline
            .run(job("job-corrupt", json!([{"text": "Built dashboards"}])))
            .await
            .unwrap_err();

        assert_eq!(reason.stage, Stage::ExtractSignals);
        assert_eq!(reason.kind, FailureKind::CacheCorrupt);
        assert_eq!(reason.job_id, "job-corrupt");
        assert_eq!(client.calls(), 0);
    }

    #[tokio::test]
    async fn test_invalid_input_fails_before_any_call() {
        let client = Arc::new(ScriptedClient::new());
        let pipeline = pipeline(client.clone(), Arc::new(DisabledSignalCache), local_only());

        let reason = pipeline
            .run(job("job-empty", json!([])))
            .await
            .unwrap_err();

        assert_eq!(reason.stage, Stage::Ingest);
        assert_eq!(reason.kind, FailureKind::InvalidInput);
        assert_eq!(client.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_fails_with_stage_reached() {
        let client = Arc::new(
            ScriptedClient::new()
                .on(
                    FUSED_SHAPE.name,
                    vec![Ok(fused_reply(&[(0, "Built stakeholder dashboards")]))],
                )
                .with_delay(Duration::from_secs(600)),
        );
        let pipeline = pipeline(client, Arc::new(DisabledSignalCache), local_only());

        let reason = pipeline
            .run(job("job-slow", json!([{"text": "Built dashboards for stakeholders"}])))
            .await
            .unwrap_err();

        assert_eq!(reason.kind, FailureKind::Timeout);
        assert_eq!(reason.stage, Stage::Process);
    }

    #[tokio::test]
    async fn test_exhausted_budget_degrades_every_generative_stage() {
        let client = Arc::new(ScriptedClient::new());
        let pipeline = Pipeline::new(
            client.clone(),
            Arc::new(TokenBudget::new(0)),
            Arc::new(DisabledSignalCache),
            Arc::new(InMemoryJobStore::new()),
            PipelineConfig {
                confidence_threshold: 1.1,
                ..PipelineConfig::default()
            },
        );

        let output = pipeline
            .run(job("job-broke", json!([{"text": "Built dashboards for stakeholders"}])))
            .await
            .unwrap();

        assert_eq!(client.calls(), 0);
        assert_eq!(output.signal_source, SignalSource::LocalAfterFallbackFailure);
        assert_eq!(output.results[0].status, ItemStatus::ProcessingFailed);
    }

    #[tokio::test]
    async fn test_generated_job_id_when_absent() {
        let client = Arc::new(
            ScriptedClient::new()
                .on(
                    FUSED_SHAPE.name,
                    vec![Ok(fused_reply(&[(0, "Built stakeholder dashboards")]))],
                )
                .on(CONSISTENCY_SHAPE.name, no_violations()),
        );
        let pipeline = pipeline(client, Arc::new(DisabledSignalCache), local_only());
        let mut job = job("", json!([{"text": "Built dashboards for stakeholders"}]));
        job.job_id = None;

        let output = pipeline.run(job).await.unwrap();

        assert!(Uuid::parse_str(&output.job_id).is_ok());
        assert!(output.logs.iter().all(|l| l.job_id == output.job_id));
    }
}
