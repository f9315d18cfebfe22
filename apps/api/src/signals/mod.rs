// Signal extraction: local first, one generative fallback when confidence is low.
// All generative calls go through llm_client::call_structured.

pub mod cache;
pub mod local;
pub mod prompts;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Deserialize;
use tracing::{info, warn};

use crate::llm_client::budget::CostGovernor;
use crate::llm_client::prompts::JSON_ONLY_SYSTEM;
use crate::llm_client::{call_structured, GenerationRequest, GenerativeClient, GenerativeError};
use crate::models::job::SignalSource;
use crate::models::signals::{SignalSet, TermCandidate, TermCategory, MAX_TERMS};
use crate::normalize::truncate_chars;

use local::{extract_local, LocalExtraction};
use prompts::{EXTRACT_PROMPT_TEMPLATE, EXTRACT_SHAPE, EXTRACT_SYSTEM, MAX_PROMPT_REFERENCE_CHARS};

/// Weight given to fallback terms the model categorized but did not weigh.
const DEFAULT_FALLBACK_WEIGHT: f64 = 0.5;

/// The confidence gate, as a value.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionDecision {
    /// Local result is good enough to use as is.
    Local { signals: SignalSet, confidence: f64 },
    /// Local result is kept only as the fallback's safety net.
    NeedsFallback { local: SignalSet, confidence: f64 },
}

pub fn decide(extraction: LocalExtraction, threshold: f64) -> ExtractionDecision {
    if extraction.confidence >= threshold {
        ExtractionDecision::Local {
            signals: extraction.signals,
            confidence: extraction.confidence,
        }
    } else {
        ExtractionDecision::NeedsFallback {
            local: extraction.signals,
            confidence: extraction.confidence,
        }
    }
}

/// What the extractor settled on.
#[derive(Debug, Clone)]
pub struct Extracted {
    pub signals: SignalSet,
    pub source: SignalSource,
    pub confidence: f64,
    /// Set when the fallback was attempted and failed.
    pub fallback_error: Option<GenerativeError>,
}

/// The fallback's reply, decoded strictly.
#[derive(Debug, Deserialize)]
struct ExtractedSignals {
    top_terms: Vec<String>,
    weights: BTreeMap<String, f64>,
    #[serde(default)]
    synonyms: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    soft_skills: Vec<String>,
    #[serde(default)]
    hard_tools: Vec<String>,
    #[serde(default)]
    domain_terms: Vec<String>,
}

impl ExtractedSignals {
    /// Rebuilds the reply through `SignalSet::build` so the model cannot break
    /// the set's invariants. Categorized terms missing from `top_terms` are added.
    fn into_signal_set(self) -> SignalSet {
        let weight_of = |term: &str| {
            self.weights
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(term))
                .map(|(_, w)| *w)
                .unwrap_or(DEFAULT_FALLBACK_WEIGHT)
        };
        let category_of = |term: &str| {
            let hit = |bucket: &Vec<String>| bucket.iter().any(|t| t.eq_ignore_ascii_case(term));
            if hit(&self.hard_tools) {
                Some(TermCategory::Tool)
            } else if hit(&self.domain_terms) {
                Some(TermCategory::Domain)
            } else if hit(&self.soft_skills) {
                Some(TermCategory::Competency)
            } else {
                None
            }
        };

        let mut candidates = Vec::new();
        let bucketed = self
            .hard_tools
            .iter()
            .chain(self.domain_terms.iter())
            .chain(self.soft_skills.iter());
        for term in self.top_terms.iter().chain(bucketed) {
            let mut candidate = TermCandidate::new(term.clone(), weight_of(term), category_of(term));
            if let Some(synonyms) = self.synonyms.get(term) {
                candidate.synonyms = synonyms.clone();
            }
            candidates.push(candidate);
        }
        SignalSet::build(candidates, MAX_TERMS)
    }
}

pub struct SignalExtractor {
    client: Arc<dyn GenerativeClient>,
    governor: Arc<dyn CostGovernor>,
    threshold: f64,
}

impl SignalExtractor {
    pub fn new(
        client: Arc<dyn GenerativeClient>,
        governor: Arc<dyn CostGovernor>,
        threshold: f64,
    ) -> Self {
        Self {
            client,
            governor,
            threshold,
        }
    }

    /// Never fails: a failed fallback keeps the local result.
    pub async fn extract(&self, reference: &str) -> Extracted {
        match decide(extract_local(reference), self.threshold) {
            ExtractionDecision::Local {
                signals,
                confidence,
            } => {
                info!(
                    "High confidence ({:.2}), using local extraction",
                    confidence
                );
                Extracted {
                    signals,
                    source: SignalSource::Local,
                    confidence,
                    fallback_error: None,
                }
            }
            ExtractionDecision::NeedsFallback { local, confidence } => {
                info!(
                    threshold = self.threshold,
                    "Low confidence ({:.2}), using generative fallback", confidence
                );
                match self.fallback(reference).await {
                    Ok(signals) => Extracted {
                        signals,
                        source: SignalSource::Generative,
                        confidence,
                        fallback_error: None,
                    },
                    Err(e) => {
                        warn!("Generative extraction failed, keeping local result: {e}");
                        Extracted {
                            signals: local,
                            source: SignalSource::LocalAfterFallbackFailure,
                            confidence,
                            fallback_error: Some(e),
                        }
                    }
                }
            }
        }
    }

    async fn fallback(&self, reference: &str) -> Result<SignalSet, GenerativeError> {
        let request = GenerationRequest {
            system: format!("{EXTRACT_SYSTEM} {JSON_ONLY_SYSTEM}"),
            prompt: EXTRACT_PROMPT_TEMPLATE.replace(
                "{reference}",
                &truncate_chars(reference, MAX_PROMPT_REFERENCE_CHARS),
            ),
            shape: EXTRACT_SHAPE,
            max_tokens: 2048,
            temperature: 0.0,
        };
        let reply: ExtractedSignals =
            call_structured(self.client.as_ref(), self.governor.as_ref(), &request).await?;
        let signals = reply.into_signal_set();
        if signals.is_empty() {
            return Err(GenerativeError::Malformed(
                "extraction returned no terms".to_string(),
            ));
        }
        Ok(signals)
    }
}
