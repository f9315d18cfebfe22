// Prompt constants for the fused rewrite-and-score call.
// Reuses cross-cutting fragments from llm_client::prompts.

use crate::llm_client::ResponseShape;

/// System prompt for the fused call.
pub const FUSED_SYSTEM: &str = "You are an expert resume writer. You rewrite resume bullets \
    toward a target role and score them, using ONLY facts already present in each bullet. \
    You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT invent facts, tools or numbers.";

pub const FUSED_SHAPE: ResponseShape = ResponseShape {
    name: "fused_results",
    schema: r#"{
  "results": [
    {
      "item_index": 0,
      "variants": ["Rewritten bullet"],
      "scores": {"relevance": 80, "impact": 70, "clarity": 90},
      "rationale": "One sentence on what changed and why it fits the role."
    }
  ]
}"#,
};

/// Fused prompt template.
/// Replace: {role}, {category_rules}, {top_terms}, {competencies}, {tools},
///          {domain_terms}, {tone}, {max_words}, {variants}, {extra_context}, {items}
pub const FUSED_PROMPT_TEMPLATE: &str = r#"Rewrite each bullet below for the target role: {role}

{category_rules}

PRIORITIZED TERMS (weight 0.0-1.0, higher matters more):
{top_terms}

competencies (may be attributed when the bullet's activity supports them):
{competencies}

tools (NEVER add one unless that bullet already names it):
{tools}

domain_terms (may be added freely as contextual framing):
{domain_terms}

TONE: {tone}

ADDITIONAL CONTEXT ABOUT THE CANDIDATE (background only, never a source of new facts):
{extra_context}

BULLETS:
{items}

For EVERY bullet return exactly one entry in "results" with its item_index.
HARD RULES:
1. Produce {variants} variant(s) per bullet, each at most {max_words} words.
2. Keep the bullet's core activity. Design work stays design work.
3. Numbers may come ONLY from that bullet's own text or its own METRICS line.
4. Scores are integers from 0 to 100: relevance to the role, impact, clarity.
5. Keep the rationale to one sentence."#;
