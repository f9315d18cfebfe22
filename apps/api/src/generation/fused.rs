//! Fused Processor: rewrites and scores every item of a job in one generative call.
//!
//! Flow: build prompt → call → strict decode → (malformed? one repair call) →
//!       salvage what decodes → placeholders for the rest.
//!
//! The Nth result always belongs to the Nth item, whatever order the model
//! answered in.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Deserialize;
use tracing::{info, warn};

use crate::generation::prompts::{FUSED_PROMPT_TEMPLATE, FUSED_SHAPE, FUSED_SYSTEM};
use crate::generation::tone::guidance_for;
use crate::llm_client::budget::CostGovernor;
use crate::llm_client::prompts::{fill_template, CATEGORY_RULES, REPAIR_INSTRUCTION};
use crate::llm_client::{call_structured, GenerationRequest, GenerativeClient, GenerativeError};
use crate::models::job::{ItemDiff, ItemResult, ItemStatus, JobOptions, ScoreTriple};
use crate::models::signals::SignalSet;
use crate::normalize::NormalizedItem;

/// Output tokens allowed per item, plus a fixed allowance for the envelope.
const TOKENS_PER_ITEM: u32 = 400;
const BASE_TOKENS: u32 = 512;

/// Everything the fused call is built from.
#[derive(Debug, Clone, Copy)]
pub struct FusedInput<'a> {
    pub signals: &'a SignalSet,
    pub items: &'a [NormalizedItem],
    pub options: &'a JobOptions,
    pub role: &'a str,
    pub extra_context: Option<&'a str>,
}

#[derive(Debug, Clone)]
pub struct FusedOutcome {
    /// One result per input item, in input order.
    pub results: Vec<ItemResult>,
    /// Generative calls issued (1, or 2 with a repair).
    pub calls: u32,
    /// Why some or all items fell back to placeholders.
    pub error: Option<GenerativeError>,
}

#[derive(Debug, Deserialize)]
struct FusedReply {
    results: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct FusedEntry {
    item_index: usize,
    variants: Vec<String>,
    scores: ScoreTriple,
    #[serde(default)]
    rationale: String,
}

#[derive(Debug, Clone, PartialEq)]
struct Accepted {
    variants: Vec<String>,
    scores: ScoreTriple,
    rationale: String,
}

pub struct FusedProcessor {
    client: Arc<dyn GenerativeClient>,
    governor: Arc<dyn CostGovernor>,
}

impl FusedProcessor {
    pub fn new(client: Arc<dyn GenerativeClient>, governor: Arc<dyn CostGovernor>) -> Self {
        Self { client, governor }
    }

    /// Never fails: unprocessable items come back as processing-failed placeholders.
    pub async fn process(&self, input: FusedInput<'_>) -> FusedOutcome {
        let count = input.items.len();
        if count == 0 {
            return FusedOutcome {
                results: Vec::new(),
                calls: 0,
                error: None,
            };
        }
        let keep = usize::from(input.options.variants.max(1));

        let mut request = GenerationRequest {
            system: FUSED_SYSTEM.to_string(),
            prompt: build_fused_prompt(&input),
            shape: FUSED_SHAPE,
            max_tokens: BASE_TOKENS + TOKENS_PER_ITEM * count as u32,
            temperature: 0.3,
        };

        let first = self
            .call(&request)
            .await
            .and_then(|reply| parse_reply(reply, count, keep));
        let error = match first {
            Ok(accepted) => {
                info!("Fused call processed {} items", count);
                return assemble(input.items, accepted.into_iter().enumerate().collect(), None, 1);
            }
            Err(e) if e.is_malformed() => e,
            Err(e) => {
                warn!("Fused call failed, emitting placeholders: {e}");
                return assemble(input.items, BTreeMap::new(), Some(e), 1);
            }
        };

        warn!("Fused reply malformed ({error}), retrying once with repair instruction");
        request.prompt = format!(
            "{}\n\n{}\nProblem with the previous reply: {}",
            request.prompt, REPAIR_INSTRUCTION, error
        );

        match self.call(&request).await {
            Ok(reply) => match parse_reply(reply.clone(), count, keep) {
                Ok(accepted) => {
                    info!("Fused repair call processed {} items", count);
                    assemble(input.items, accepted.into_iter().enumerate().collect(), None, 2)
                }
                Err(e) => {
                    let salvaged = salvage_reply(reply, count, keep);
                    warn!(
                        "Fused repair reply still malformed ({e}); salvaged {}/{} items",
                        salvaged.len(),
                        count
                    );
                    assemble(input.items, salvaged, Some(e), 2)
                }
            },
            Err(e) => {
                warn!("Fused repair call failed, emitting placeholders: {e}");
                assemble(input.items, BTreeMap::new(), Some(e), 2)
            }
        }
    }

    async fn call(&self, request: &GenerationRequest) -> Result<serde_json::Value, GenerativeError> {
        call_structured(self.client.as_ref(), self.governor.as_ref(), request).await
    }
}

fn assemble(
    items: &[NormalizedItem],
    mut accepted: BTreeMap<usize, Accepted>,
    error: Option<GenerativeError>,
    calls: u32,
) -> FusedOutcome {
    let reason = error
        .as_ref()
        .map(ToString::to_string)
        .unwrap_or_else(|| "no usable result for this item".to_string());

    let results = items
        .iter()
        .enumerate()
        .map(|(index, item)| match accepted.remove(&index) {
            Some(a) => ItemResult {
                original: item.text.clone(),
                revised: a.variants,
                scores: a.scores,
                rationale: a.rationale,
                diff: ItemDiff::default(),
                status: ItemStatus::Processed,
                flags: Vec::new(),
            },
            None => ItemResult::processing_failed(index, &item.text, &reason),
        })
        .collect();

    FusedOutcome {
        results,
        calls,
        error,
    }
}

/// Strict decode: every item answered exactly once with a usable entry.
fn parse_reply(
    reply: serde_json::Value,
    count: usize,
    keep: usize,
) -> Result<Vec<Accepted>, GenerativeError> {
    let reply: FusedReply = serde_json::from_value(reply)
        .map_err(|e| GenerativeError::Malformed(e.to_string()))?;

    let mut by_index: BTreeMap<usize, Accepted> = BTreeMap::new();
    for entry in reply.results {
        let (index, accepted) = accept_entry(entry, count, keep).map_err(GenerativeError::Malformed)?;
        if by_index.insert(index, accepted).is_some() {
            return Err(GenerativeError::Malformed(format!(
                "item_index {index} answered more than once"
            )));
        }
    }

    let missing: Vec<usize> = (0..count).filter(|i| !by_index.contains_key(i)).collect();
    if !missing.is_empty() {
        return Err(GenerativeError::Malformed(format!(
            "no result for item_index {missing:?}"
        )));
    }
    Ok(by_index.into_values().collect())
}

/// Best effort: keeps the first usable entry per index, ignores the rest.
fn salvage_reply(reply: serde_json::Value, count: usize, keep: usize) -> BTreeMap<usize, Accepted> {
    let Ok(reply) = serde_json::from_value::<FusedReply>(reply) else {
        return BTreeMap::new();
    };
    let mut by_index = BTreeMap::new();
    for entry in reply.results {
        if let Ok((index, accepted)) = accept_entry(entry, count, keep) {
            by_index.entry(index).or_insert(accepted);
        }
    }
    by_index
}

fn accept_entry(
    entry: serde_json::Value,
    count: usize,
    keep: usize,
) -> Result<(usize, Accepted), String> {
    let entry: FusedEntry = serde_json::from_value(entry).map_err(|e| e.to_string())?;
    if entry.item_index >= count {
        return Err(format!(
            "item_index {} out of range for {count} items",
            entry.item_index
        ));
    }
    if !entry.scores.in_range() {
        return Err(format!(
            "scores for item_index {} exceed 100",
            entry.item_index
        ));
    }
    let variants: Vec<String> = entry
        .variants
        .iter()
        .map(|v| v.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|v| !v.is_empty())
        .take(keep)
        .collect();
    if variants.is_empty() {
        return Err(format!("item_index {} has no variants", entry.item_index));
    }
    Ok((
        entry.item_index,
        Accepted {
            variants,
            scores: entry.scores,
            rationale: entry.rationale.trim().to_string(),
        },
    ))
}

// ────────────────────────────────────────────────────────────────────────────
// Prompt
// ────────────────────────────────────────────────────────────────────────────

/// Builds the fused prompt. Each item block carries only that item's metrics.
pub fn build_fused_prompt(input: &FusedInput<'_>) -> String {
    let signals = input.signals;
    let top_terms = signals
        .terms
        .iter()
        .map(|t| {
            let weight = signals.weights.get(t).copied().unwrap_or(0.0);
            format!("- {t} ({weight:.2})")
        })
        .collect::<Vec<_>>()
        .join("\n");

    let role = if input.role.trim().is_empty() {
        "(not specified; infer from the prioritized terms)"
    } else {
        input.role
    };

    let top_terms = or_none(top_terms);
    let competencies = or_none(signals.competencies.join(", "));
    let tools = or_none(signals.tools.join(", "));
    let domain_terms = or_none(signals.domain_terms.join(", "));
    let tone = guidance_for(input.options.tone).render();
    let max_words = input.options.max_words.to_string();
    let variants = input.options.variants.to_string();
    let extra_context = or_none(input.extra_context.unwrap_or_default().to_string());
    let items = render_items(input.items);

    fill_template(
        FUSED_PROMPT_TEMPLATE,
        &[
            ("role", role),
            ("category_rules", CATEGORY_RULES),
            ("top_terms", top_terms.as_str()),
            ("competencies", competencies.as_str()),
            ("tools", tools.as_str()),
            ("domain_terms", domain_terms.as_str()),
            ("tone", tone.as_str()),
            ("max_words", max_words.as_str()),
            ("variants", variants.as_str()),
            ("extra_context", extra_context.as_str()),
            ("items", items.as_str()),
        ],
    )
}

fn render_items(items: &[NormalizedItem]) -> String {
    items
        .iter()
        .enumerate()
        .map(|(index, item)| format!("[{index}] {}\n{}", item.text, render_metrics(item)))
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub(crate) fn render_metrics(item: &NormalizedItem) -> String {
    if item.metrics.is_empty() {
        return "METRICS: none (do not add any numbers)".to_string();
    }
    let pairs = item
        .metrics
        .iter()
        .map(|(k, v)| match v {
            serde_json::Value::String(s) => format!("{k}={s}"),
            other => format!("{k}={other}"),
        })
        .collect::<Vec<_>>()
        .join(", ");
    format!("METRICS (this bullet only): {pairs}")
}

fn or_none(text: String) -> String {
    if text.trim().is_empty() {
        "(none)".to_string()
    } else {
        text
    }
}

/// Item indices referenced in a prompt, for tests and diagnostics.
#[cfg(test)]
fn prompt_item_indices(prompt: &str) -> std::collections::BTreeSet<usize> {
    prompt
        .lines()
        .filter_map(|l| l.strip_prefix('['))
        .filter_map(|l| l.split(']').next())
        .filter_map(|n| n.parse().ok())
        .collect()
}
