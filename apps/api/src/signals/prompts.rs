// Prompt constants for generative signal extraction.
// Reuses the JSON-only system fragment from llm_client::prompts.

use crate::llm_client::ResponseShape;

/// Reference text beyond this many characters is not sent to the fallback.
pub const MAX_PROMPT_REFERENCE_CHARS: usize = 4_000;

pub const EXTRACT_SYSTEM: &str = "You are an expert at analyzing job descriptions and \
    extracting the terms an applicant tracking system would match a resume against. \
    Prioritize technical skills and tools, then domain expertise, then core competencies, \
    then industry terminology. You MUST respond with valid JSON only.";

pub const EXTRACT_SHAPE: ResponseShape = ResponseShape {
    name: "extracted_signals",
    schema: r#"{
  "top_terms": ["term", "..."],
  "weights": {"term": 0.9},
  "synonyms": {"term": ["alternate form"]},
  "soft_skills": ["analytical thinking"],
  "hard_tools": ["Tableau"],
  "domain_terms": ["B2B SaaS"]
}"#,
};

/// Replace `{reference}` before sending.
pub const EXTRACT_PROMPT_TEMPLATE: &str = r#"Extract and categorize the keywords of the following job description.

Job Description:
{reference}

Guidelines:
- top_terms: up to 25 of the most important keywords or phrases, most important first.
- weights: importance of each top term from 0.0 to 1.0 (1.0 = must-have, 0.5 = nice-to-have).
- synonyms: alternative surface forms that mean the same thing.

Put every keyword into exactly ONE of three categories:
1. soft_skills: transferable competencies that can be inferred from work
   (analytical thinking, problem-solving, communication, stakeholder management).
2. hard_tools: specific named tools, platforms, languages and products
   (Marketo, Salesforce, Google Analytics, Figma, Tableau, Excel). These are factual claims.
3. domain_terms: industry and context terminology (B2B healthcare, SaaS, demand generation).

If unsure, prefer hard_tools over soft_skills: anything with a brand or product name is a tool."#;
