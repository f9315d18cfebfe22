// Shared prompt fragments.
// Each stage that makes generative calls defines its own prompts.rs alongside it.
// This file contains the cross-cutting pieces.

/// System prompt that enforces JSON-only output.
pub const JSON_ONLY_SYSTEM: &str = "You are a precise, structured assistant. \
    You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences. \
    Do NOT include explanations or apologies.";

/// The three buckets every fused rewrite is held to.
pub const CATEGORY_RULES: &str = "\
    CRITICAL: Reference terms fall into three categories and each has its own rule. \
    - competencies (soft skills, ways of working): may be reworded freely when the original \
      activity supports them. \
    - tools (products, languages, frameworks, platforms): may appear ONLY if the original \
      bullet already names them. NEVER add a tool the original does not mention. \
    - domain_terms (industry and subject vocabulary): may be added freely \
      as contextual framing. \
    Numbers and metrics may come ONLY from the bullet itself or its own metrics block. \
    NEVER move a number from one bullet to another and NEVER invent one.";

/// Fills `{name}` placeholders in one pass over the template. Substituted
/// values are never scanned again, so caller text that looks like a
/// placeholder stays literal. Braces that do not name a variable are kept.
pub fn fill_template(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let hit = after.find('}').and_then(|close| {
            let name = &after[..close];
            vars.iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| (close, *value))
        });
        match hit {
            Some((close, value)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Appended to a prompt when the previous reply did not match the schema.
pub const REPAIR_INSTRUCTION: &str = "\
    Your previous reply did not match the required JSON schema. \
    Reply again with ONLY the JSON document, exactly matching the schema, \
    with every required field present.";
