//! The five stage functions. Each takes the job's state by value and hands it
//! back, or raises a job-fatal `StageError`. Degradation is handled inside the
//! stage and only shows up as log entries and flags.

use std::time::Duration;

use crate::errors::StageError;
use crate::generation::fused::{FusedInput, FusedProcessor};
use crate::models::job::{
    ItemStatus, JobOutput, SignalSource, Summary, ValidationFlag, MAX_EXTRA_CONTEXT_CHARS,
    MAX_ITEMS, MAX_REFERENCE_CHARS, MAX_ROLE_CHARS,
};
use crate::normalize::{
    idempotency_key, normalize_items, normalize_text, reference_hash, signal_key,
};
use crate::pipeline::coverage::{check_invariants, compute_coverage, compute_diff};
use crate::pipeline::state::{JobState, LogLevel};
use crate::sanitize::filter_injection;
use crate::signals::cache::SignalCache;
use crate::signals::SignalExtractor;
use crate::validation::{ValidationInput, Validator};

// ────────────────────────────────────────────────────────────────────────────
// INGEST
// ────────────────────────────────────────────────────────────────────────────

/// Validates and normalizes the request and derives the idempotency key.
/// Makes no external call.
pub fn ingest(mut state: JobState) -> Result<JobState, StageError> {
    state
        .job
        .options
        .validate()
        .map_err(StageError::InvalidInput)?;

    let (reference, mut filtered) =
        filter_injection(&normalize_text(&state.job.reference_text));
    if reference.is_empty() {
        return Err(StageError::InvalidInput(
            "reference_text is required".to_string(),
        ));
    }
    let reference_chars = reference.chars().count();
    if reference_chars > MAX_REFERENCE_CHARS {
        return Err(StageError::InvalidInput(format!(
            "reference_text is {reference_chars} characters, limit is {MAX_REFERENCE_CHARS}"
        )));
    }

    if state.job.items.is_empty() {
        return Err(StageError::InvalidInput("items must not be empty".to_string()));
    }
    if state.job.items.len() > MAX_ITEMS {
        return Err(StageError::InvalidInput(format!(
            "{} items submitted, limit is {MAX_ITEMS}",
            state.job.items.len()
        )));
    }
    let items: Vec<_> = normalize_items(&state.job.items)
        .into_iter()
        .map(|mut item| {
            let (text, count) = filter_injection(&item.text);
            filtered += count;
            item.text = text;
            item
        })
        .collect();
    if items.is_empty() {
        return Err(StageError::InvalidInput(
            "every item is empty after normalization".to_string(),
        ));
    }

    let (role, count) = filter_injection(&normalize_text(&state.job.role));
    filtered += count;
    if role.chars().count() > MAX_ROLE_CHARS {
        return Err(StageError::InvalidInput(format!(
            "role exceeds {MAX_ROLE_CHARS} characters"
        )));
    }
    let extra_context = state
        .job
        .extra_context
        .as_deref()
        .map(normalize_text)
        .filter(|c| !c.is_empty())
        .map(|c| {
            let (clean, count) = filter_injection(&c);
            filtered += count;
            clean
        });
    if extra_context
        .as_ref()
        .is_some_and(|c| c.chars().count() > MAX_EXTRA_CONTEXT_CHARS)
    {
        return Err(StageError::InvalidInput(format!(
            "extra_context exceeds {MAX_EXTRA_CONTEXT_CHARS} characters"
        )));
    }

    if filtered > 0 {
        state.log(
            LogLevel::Warn,
            format!("filtered {filtered} prompt-injection markers from caller text"),
        );
    }
    let dropped = state.job.items.len() - items.len();
    if dropped > 0 {
        state.log(
            LogLevel::Warn,
            format!("dropped {dropped} items that were empty after normalization"),
        );
    }

    state.reference_hash = reference_hash(&reference);
    state.signal_key = signal_key(&reference);
    state.idempotency_key = idempotency_key(
        &state.job_id,
        &state.reference_hash,
        &items,
        &state.job.options,
        &role,
        extra_context.as_deref(),
    );
    state.log(
        LogLevel::Info,
        format!(
            "normalized {} items and a {reference_chars}-character reference",
            items.len()
        ),
    );
    state.reference_text = reference;
    state.items = items;
    state.role = role;
    state.extra_context = extra_context;
    Ok(state)
}

// ────────────────────────────────────────────────────────────────────────────
// EXTRACT_SIGNALS
// ────────────────────────────────────────────────────────────────────────────

/// Read-through the Signal Cache. A corrupt entry is fatal; an unavailable
/// store is a miss.
pub async fn extract_signals(
    mut state: JobState,
    cache: &dyn SignalCache,
    extractor: &SignalExtractor,
    cache_ttl: Duration,
) -> Result<JobState, StageError> {
    if let Some(signals) = cache.get(&state.signal_key).await? {
        state.log(
            LogLevel::Info,
            format!("signal cache hit with {} terms", signals.terms.len()),
        );
        state.signals = Some(signals);
        state.signal_source = Some(SignalSource::Cache);
        return Ok(state);
    }

    let extracted = extractor.extract(&state.reference_text).await;
    if let Some(e) = &extracted.fallback_error {
        state.log(
            LogLevel::Warn,
            format!("generative extraction failed, keeping local signals: {e}"),
        );
    }
    state.log(
        LogLevel::Info,
        format!(
            "extracted {} terms ({} tools) from {:?} with confidence {:.2}",
            extracted.signals.terms.len(),
            extracted.signals.tools.len(),
            extracted.source,
            extracted.confidence
        ),
    );

    // A degraded result is not cached so a later run can still try the fallback.
    if extracted.source != SignalSource::LocalAfterFallbackFailure {
        cache
            .put(&state.signal_key, &extracted.signals, cache_ttl)
            .await;
    }
    state.signals = Some(extracted.signals);
    state.signal_source = Some(extracted.source);
    Ok(state)
}

// ────────────────────────────────────────────────────────────────────────────
// PROCESS
// ────────────────────────────────────────────────────────────────────────────

/// One fused call for the whole job. Always yields one result per item.
pub async fn process(mut state: JobState, fused: &FusedProcessor) -> Result<JobState, StageError> {
    let outcome = {
        let signals = state.signals.as_ref().ok_or_else(|| {
            StageError::InvariantViolation("no signals before PROCESS".to_string())
        })?;
        fused
            .process(FusedInput {
                signals,
                items: &state.items,
                options: &state.job.options,
                role: &state.role,
                extra_context: state.extra_context.as_deref(),
            })
            .await
    };

    if let Some(e) = &outcome.error {
        state.log(LogLevel::Warn, format!("fused call degraded: {e}"));
    }
    let failed = outcome
        .results
        .iter()
        .filter(|r| r.status == ItemStatus::ProcessingFailed)
        .count();
    state.log(
        LogLevel::Info,
        format!(
            "processed {} items in {} calls, {failed} placeholders",
            outcome.results.len(),
            outcome.calls
        ),
    );
    state.results = outcome.results;
    Ok(state)
}

// ────────────────────────────────────────────────────────────────────────────
// VALIDATE
// ────────────────────────────────────────────────────────────────────────────

pub async fn validate(mut state: JobState, validator: &Validator) -> Result<JobState, StageError> {
    let results = std::mem::take(&mut state.results);
    let outcome = {
        let signals = state.signals.as_ref().ok_or_else(|| {
            StageError::InvariantViolation("no signals before VALIDATE".to_string())
        })?;
        validator
            .validate(
                results,
                ValidationInput {
                    signals,
                    items: &state.items,
                    max_words: state.job.options.max_words,
                },
            )
            .await
    };

    if !outcome.consistency_checked {
        state.log(LogLevel::Warn, "consistency check skipped, rule checks only");
    }
    let flag_count: usize = outcome.results.iter().map(|r| r.flags.len()).sum();
    state.log(
        LogLevel::Info,
        format!(
            "validation raised {flag_count} item flags and {} job flags",
            outcome.job_flags.len()
        ),
    );
    state.results = outcome.results;
    state.job_flags.extend(outcome.job_flags);
    Ok(state)
}

// ────────────────────────────────────────────────────────────────────────────
// OUTPUT
// ────────────────────────────────────────────────────────────────────────────

/// Re-checks the output invariants, then assembles the summary, diffs and the
/// combined flag list.
pub fn output(mut state: JobState) -> Result<JobOutput, StageError> {
    let signals = state.signals.take().ok_or_else(|| {
        StageError::InvariantViolation("no signals before OUTPUT".to_string())
    })?;
    let signal_source = state.signal_source.ok_or_else(|| {
        StageError::InvariantViolation("no signal source before OUTPUT".to_string())
    })?;

    check_invariants(
        &state.items,
        &state.results,
        &signals.tools,
        state.job.options.max_words,
    )
    .map_err(StageError::InvariantViolation)?;

    for result in &mut state.results {
        if let Some(first) = result.revised.first() {
            result.diff = compute_diff(&result.original, first, &signals);
        }
    }
    let coverage = compute_coverage(&signals, &state.results);
    state.log(
        LogLevel::Info,
        format!(
            "coverage {} hit, {} missed",
            coverage.hit.len(),
            coverage.miss.len()
        ),
    );

    let mut flags: Vec<ValidationFlag> = state
        .results
        .iter()
        .flat_map(|r| r.flags.iter().cloned())
        .collect();
    flags.extend(state.job_flags.iter().cloned());

    Ok(JobOutput {
        job_id: state.job_id,
        idempotency_key: state.idempotency_key,
        signal_source,
        summary: Summary {
            role: state.role,
            top_terms: signals.terms,
            coverage,
        },
        results: state.results,
        flags,
        logs: state.logs,
    })
}
