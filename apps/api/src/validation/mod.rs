// Validator: local rule pass on every variant, then one batched consistency call.
// Flags only accumulate; no pass removes a flag another pass raised.

pub mod consistency;
pub mod fixes;
pub mod prompts;
pub mod rules;

use std::sync::Arc;

use tracing::{info, warn};

use crate::llm_client::budget::CostGovernor;
use crate::llm_client::GenerativeClient;
use crate::models::job::{FlagKind, ItemResult, ItemStatus, ValidationFlag};
use crate::models::signals::SignalSet;
use crate::normalize::NormalizedItem;

use consistency::{check_batch, ConsistencyItem};
use rules::{check_variant, RuleContext};

#[derive(Debug, Clone, Copy)]
pub struct ValidationInput<'a> {
    pub signals: &'a SignalSet,
    pub items: &'a [NormalizedItem],
    pub max_words: usize,
}

#[derive(Debug, Clone)]
pub struct ValidationOutcome {
    pub results: Vec<ItemResult>,
    /// Flags that belong to the job rather than one item.
    pub job_flags: Vec<ValidationFlag>,
    pub consistency_checked: bool,
}

pub struct Validator {
    client: Arc<dyn GenerativeClient>,
    governor: Arc<dyn CostGovernor>,
}

impl Validator {
    pub fn new(client: Arc<dyn GenerativeClient>, governor: Arc<dyn CostGovernor>) -> Self {
        Self { client, governor }
    }

    /// Never fails: a failed consistency call leaves the rule pass as the result.
    pub async fn validate(
        &self,
        mut results: Vec<ItemResult>,
        input: ValidationInput<'_>,
    ) -> ValidationOutcome {
        let tools = &input.signals.tools;

        for (index, (result, item)) in results.iter_mut().zip(input.items).enumerate() {
            let ctx = RuleContext {
                item_index: index,
                original: &item.text,
                metrics: &item.metrics,
                tools,
                max_words: input.max_words,
            };
            let mut revised = Vec::with_capacity(result.revised.len());
            for (variant_index, variant) in result.revised.iter().enumerate() {
                let checked = check_variant(&ctx, variant_index, variant);
                result.flags.extend(checked.flags);
                revised.push(checked.text);
            }
            result.revised = revised;
        }

        let rule_flags: usize = results.iter().map(|r| r.flags.len()).sum();
        info!("Rule pass completed with {} flags", rule_flags);

        let mut job_flags = Vec::new();
        let checked = {
            let batch: Vec<ConsistencyItem<'_>> = results
                .iter()
                .zip(input.items)
                .enumerate()
                .filter(|(_, (r, _))| r.status == ItemStatus::Processed)
                .map(|(index, (r, item))| ConsistencyItem {
                    item_index: index,
                    item,
                    variants: &r.revised,
                })
                .collect();
            if batch.is_empty() {
                None
            } else {
                Some(check_batch(self.client.as_ref(), self.governor.as_ref(), tools, &batch).await)
            }
        };

        let Some(checked) = checked else {
            job_flags.push(ValidationFlag::pipeline(
                FlagKind::ConsistencyCheckSkipped,
                None,
                "no rewritten variants to check",
            ));
            return ValidationOutcome {
                results,
                job_flags,
                consistency_checked: false,
            };
        };

        match checked {
            Ok(flags) => {
                info!("Consistency pass raised {} flags", flags.len());
                for flag in flags {
                    if let Some(result) = flag.item_index.and_then(|i| results.get_mut(i)) {
                        result.flags.push(flag);
                    }
                }
                ValidationOutcome {
                    results,
                    job_flags,
                    consistency_checked: true,
                }
            }
            Err(e) => {
                warn!("Consistency check failed, keeping rule pass only: {e}");
                job_flags.push(ValidationFlag::pipeline(
                    FlagKind::ConsistencyCheckSkipped,
                    None,
                    format!("consistency check skipped: {e}"),
                ));
                ValidationOutcome {
                    results,
                    job_flags,
                    consistency_checked: false,
                }
            }
        }
    }
}
