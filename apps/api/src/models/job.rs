//! Job inputs and outputs: the values that cross the `Pipeline::run` boundary.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::pipeline::state::LogEntry;

/// Input limits applied at ingestion.
pub const MAX_REFERENCE_CHARS: usize = 50_000;
pub const MAX_ITEMS: usize = 20;
pub const MAX_ITEM_CHARS: usize = 1_000;
pub const MAX_ROLE_CHARS: usize = 200;
pub const MAX_EXTRA_CONTEXT_CHARS: usize = 5_000;
pub const MAX_WORDS_LIMIT: usize = 100;
pub const MAX_VARIANTS: u8 = 3;

// ────────────────────────────────────────────────────────────────────────────
// Input
// ────────────────────────────────────────────────────────────────────────────

/// One request to process a batch of items against one reference document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Caller-supplied identifier. Generated when absent, in which case the
    /// run can never be replayed from the result store.
    #[serde(default)]
    pub job_id: Option<String>,
    /// Target role the items are being tailored for.
    #[serde(default)]
    pub role: String,
    pub reference_text: String,
    pub items: Vec<JobItem>,
    #[serde(default)]
    pub options: JobOptions,
    #[serde(default)]
    pub extra_context: Option<String>,
}

/// A single input item with the metrics the caller supplied for it alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobItem {
    pub text: String,
    #[serde(default)]
    pub metrics: BTreeMap<String, serde_json::Value>,
}

impl From<&str> for JobItem {
    fn from(text: &str) -> Self {
        Self {
            text: text.to_string(),
            metrics: BTreeMap::new(),
        }
    }
}

/// Writing tone requested by the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tone {
    #[default]
    Concise,
    Impactful,
    Technical,
    Collaborative,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobOptions {
    #[serde(default = "default_max_words")]
    pub max_words: usize,
    #[serde(default)]
    pub tone: Tone,
    #[serde(default = "default_variants")]
    pub variants: u8,
}

fn default_max_words() -> usize {
    30
}

fn default_variants() -> u8 {
    1
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            max_words: default_max_words(),
            tone: Tone::default(),
            variants: default_variants(),
        }
    }
}

impl JobOptions {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_words == 0 || self.max_words > MAX_WORDS_LIMIT {
            return Err(format!(
                "max_words must be between 1 and {MAX_WORDS_LIMIT}, got {}",
                self.max_words
            ));
        }
        if self.variants == 0 || self.variants > MAX_VARIANTS {
            return Err(format!(
                "variants must be between 1 and {MAX_VARIANTS}, got {}",
                self.variants
            ));
        }
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Output
// ────────────────────────────────────────────────────────────────────────────

/// Relevance / impact / clarity, each on a 0–100 scale.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreTriple {
    pub relevance: u8,
    pub impact: u8,
    pub clarity: u8,
}

impl ScoreTriple {
    pub const ZERO: ScoreTriple = ScoreTriple {
        relevance: 0,
        impact: 0,
        clarity: 0,
    };

    pub fn in_range(&self) -> bool {
        self.relevance <= 100 && self.impact <= 100 && self.clarity <= 100
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemDiff {
    pub added_terms: Vec<String>,
    pub removed: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Processed,
    ProcessingFailed,
}

/// One input item's outcome. The Nth result always belongs to the Nth item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemResult {
    pub original: String,
    pub revised: Vec<String>,
    pub scores: ScoreTriple,
    pub rationale: String,
    pub diff: ItemDiff,
    pub status: ItemStatus,
    pub flags: Vec<ValidationFlag>,
}

impl ItemResult {
    /// The placeholder emitted when an item could not be processed.
    pub fn processing_failed(index: usize, original: &str, reason: &str) -> Self {
        Self {
            original: original.to_string(),
            revised: vec![original.to_string()],
            scores: ScoreTriple::ZERO,
            rationale: format!("Processing failed: {reason}"),
            diff: ItemDiff::default(),
            status: ItemStatus::ProcessingFailed,
            flags: vec![ValidationFlag::pipeline(
                FlagKind::ProcessingFailed,
                Some(index),
                reason,
            )],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FlagKind {
    Pii,
    FabricatedTool,
    BorrowedMetric,
    ActivityMismatch,
    InventedFact,
    PassiveVoice,
    FillerPhrase,
    VagueOutcome,
    Overlength,
    ProcessingFailed,
    ConsistencyCheckSkipped,
}

/// Which pass raised a flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagSource {
    Rule,
    Consistency,
    Pipeline,
}

/// A finding surfaced to the caller. Never blocks output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationFlag {
    pub kind: FlagKind,
    /// `None` for job-level flags.
    pub item_index: Option<usize>,
    pub variant_index: Option<usize>,
    pub detail: String,
    pub source: FlagSource,
}

impl ValidationFlag {
    pub fn rule(kind: FlagKind, item: usize, variant: usize, detail: impl Into<String>) -> Self {
        Self {
            kind,
            item_index: Some(item),
            variant_index: Some(variant),
            detail: detail.into(),
            source: FlagSource::Rule,
        }
    }

    pub fn consistency(
        kind: FlagKind,
        item: usize,
        variant: Option<usize>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            item_index: Some(item),
            variant_index: variant,
            detail: detail.into(),
            source: FlagSource::Consistency,
        }
    }

    pub fn pipeline(kind: FlagKind, item: Option<usize>, detail: impl Into<String>) -> Self {
        Self {
            kind,
            item_index: item,
            variant_index: None,
            detail: detail.into(),
            source: FlagSource::Pipeline,
        }
    }
}

/// Where the job's `SignalSet` came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalSource {
    Cache,
    Local,
    Generative,
    /// Local result kept after the generative fallback failed or was refused.
    LocalAfterFallbackFailure,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Coverage {
    pub hit: Vec<String>,
    pub miss: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub role: String,
    pub top_terms: Vec<String>,
    pub coverage: Coverage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobOutput {
    pub job_id: String,
    pub idempotency_key: String,
    pub signal_source: SignalSource,
    pub summary: Summary,
    pub results: Vec<ItemResult>,
    /// Every flag raised during the run, item-level and job-level.
    pub flags: Vec<ValidationFlag>,
    pub logs: Vec<LogEntry>,
}
