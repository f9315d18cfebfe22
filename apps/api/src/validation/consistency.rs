//! Consistency pass: one batched generative call per job that compares every
//! rewritten variant with its original.

use serde::Deserialize;
use tracing::warn;

use crate::generation::fused::render_metrics;
use crate::llm_client::budget::CostGovernor;
use crate::llm_client::prompts::{fill_template, JSON_ONLY_SYSTEM};
use crate::llm_client::{call_structured, GenerationRequest, GenerativeClient, GenerativeError};
use crate::models::job::{FlagKind, ValidationFlag};
use crate::normalize::NormalizedItem;
use crate::validation::prompts::{
    CONSISTENCY_PROMPT_TEMPLATE, CONSISTENCY_SHAPE, CONSISTENCY_SYSTEM,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
enum ViolationKind {
    #[serde(alias = "hard_tool_fabrication")]
    FabricatedTool,
    ActivityMismatch,
    BorrowedMetric,
    #[serde(alias = "invented_facts")]
    InventedFact,
}

impl ViolationKind {
    fn flag_kind(self) -> FlagKind {
        match self {
            ViolationKind::FabricatedTool => FlagKind::FabricatedTool,
            ViolationKind::ActivityMismatch => FlagKind::ActivityMismatch,
            ViolationKind::BorrowedMetric => FlagKind::BorrowedMetric,
            ViolationKind::InventedFact => FlagKind::InventedFact,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Violation {
    item_index: usize,
    #[serde(default)]
    variant_index: Option<usize>,
    #[serde(rename = "type")]
    kind: ViolationKind,
    #[serde(default)]
    detail: String,
}

#[derive(Debug, Deserialize)]
struct ConsistencyReply {
    violations: Vec<Violation>,
}

/// One item as shown to the checker.
#[derive(Debug, Clone, Copy)]
pub struct ConsistencyItem<'a> {
    pub item_index: usize,
    pub item: &'a NormalizedItem,
    pub variants: &'a [String],
}

/// Returns the violations found as flags. Violations naming an item that was
/// not submitted are dropped.
pub async fn check_batch(
    client: &dyn GenerativeClient,
    governor: &dyn CostGovernor,
    tools: &[String],
    items: &[ConsistencyItem<'_>],
) -> Result<Vec<ValidationFlag>, GenerativeError> {
    let request = GenerationRequest {
        system: format!("{CONSISTENCY_SYSTEM} {JSON_ONLY_SYSTEM}"),
        prompt: build_consistency_prompt(tools, items),
        shape: CONSISTENCY_SHAPE,
        max_tokens: 1024,
        temperature: 0.1,
    };
    let reply: ConsistencyReply = call_structured(client, governor, &request).await?;

    let mut flags = Vec::new();
    for violation in reply.violations {
        let Some(item) = items.iter().find(|i| i.item_index == violation.item_index) else {
            warn!(
                "Consistency check named unknown item_index {}, ignoring",
                violation.item_index
            );
            continue;
        };
        let variant = violation
            .variant_index
            .filter(|v| *v < item.variants.len());
        let detail = if violation.detail.trim().is_empty() {
            format!("{:?} reported by consistency check", violation.kind)
        } else {
            violation.detail.trim().to_string()
        };
        flags.push(ValidationFlag::consistency(
            violation.kind.flag_kind(),
            item.item_index,
            variant,
            detail,
        ));
    }
    Ok(flags)
}

fn build_consistency_prompt(tools: &[String], items: &[ConsistencyItem<'_>]) -> String {
    let tools = if tools.is_empty() {
        "(none)".to_string()
    } else {
        tools.join(", ")
    };
    let blocks = items
        .iter()
        .map(|i| {
            let variants = i
                .variants
                .iter()
                .enumerate()
                .map(|(v, text)| format!("  ({v}) {text}"))
                .collect::<Vec<_>>()
                .join("\n");
            format!(
                "[{}] ORIGINAL: {}\n{}\nVARIANTS:\n{}",
                i.item_index,
                i.item.text,
                render_metrics(i.item),
                variants
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    fill_template(
        CONSISTENCY_PROMPT_TEMPLATE,
        &[("tools", tools.as_str()), ("items", blocks.as_str())],
    )
}
