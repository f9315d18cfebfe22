// Prompt constants for the batched consistency check.

use crate::llm_client::ResponseShape;

pub const CONSISTENCY_SYSTEM: &str = "You are a fact-checker ensuring resume edits do not \
    fabricate information. You MUST respond with valid JSON only.";

pub const CONSISTENCY_SHAPE: ResponseShape = ResponseShape {
    name: "consistency_violations",
    schema: r#"{
  "violations": [
    {
      "item_index": 0,
      "variant_index": 0,
      "type": "fabricated_tool | activity_mismatch | borrowed_metric | invented_fact",
      "detail": "Added Marketo, which the original does not mention"
    }
  ]
}"#,
};

/// Replace: {tools}, {items}
pub const CONSISTENCY_PROMPT_TEMPLATE: &str = r#"Compare each original resume bullet with its revised variants.

KNOWN TOOLS from the job description (factual claims, flag any added to a variant but absent from its original):
{tools}

Check every variant for these fabrication types:
1. fabricated_tool: a specific platform or tool in the variant but NOT in the original.
2. activity_mismatch: the fundamental activity changed (design work reframed as marketing work).
3. borrowed_metric: a number in the variant that is not in the original or its METRICS line.
4. invented_fact: new companies, titles or achievements not in the original.

BULLETS:
{items}

Report only real violations. If every variant is consistent, return {"violations": []}."#;
