//! Rule pass: local checks run on every variant, no external call.
//!
//! Order per variant:
//! 1. fabricated tool / borrowed metric → flag and revert the variant to the original
//! 2. safe mechanical fixes (filler, leading passive markers, spacing, capitalization)
//! 3. word limit → truncate and flag
//! 4. PII, passive construction and vague outcomes → flag only

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::models::job::{FlagKind, ValidationFlag};
use crate::normalize::word_count;
use crate::validation::fixes::{apply_safe_fixes, truncate_words};

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").unwrap()
});

static PHONE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{3}[-.]?\d{3}[-.]?\d{4}\b").unwrap());

static GOVERNMENT_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").unwrap());

/// A number not glued to a preceding letter ("B2B" is not a metric).
static NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|[^A-Za-z0-9.,])(\d+(?:[.,]\d+)*)").unwrap());

static PASSIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:was|were|been|being|is|are)\s+(?:\w+ly\s+)?\w+(?:ed|en)\b(?:\s+by\b)?")
        .unwrap()
});

const VAGUE_VERBS: &[&str] = &[
    "improved",
    "enhanced",
    "helped",
    "worked on",
    "assisted",
    "supported",
    "participated",
    "involved",
];

const VAGUE_SCALE_WORDS: &[&str] = &[
    "significant",
    "major",
    "large",
    "huge",
    "massive",
    "substantial",
    "considerable",
    "many",
    "numerous",
    "various",
    "several",
];

/// What the rule pass needs to know about one item.
#[derive(Debug, Clone, Copy)]
pub struct RuleContext<'a> {
    pub item_index: usize,
    pub original: &'a str,
    pub metrics: &'a BTreeMap<String, serde_json::Value>,
    pub tools: &'a [String],
    pub max_words: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CheckedVariant {
    pub text: String,
    pub flags: Vec<ValidationFlag>,
}

/// Runs every local rule on one variant and returns the text to emit.
pub fn check_variant(ctx: &RuleContext<'_>, variant_index: usize, text: &str) -> CheckedVariant {
    let mut flags = Vec::new();
    let flag = |kind: FlagKind, detail: String| {
        ValidationFlag::rule(kind, ctx.item_index, variant_index, detail)
    };

    let fabricated = fabricated_tools(ctx.original, text, ctx.tools);
    let borrowed = borrowed_numbers(ctx.original, ctx.metrics, text);
    for tool in &fabricated {
        flags.push(flag(
            FlagKind::FabricatedTool,
            format!("'{tool}' is not named in the original; reverted to original"),
        ));
    }
    for number in &borrowed {
        flags.push(flag(
            FlagKind::BorrowedMetric,
            format!("'{number}' is not in the original or its metrics; reverted to original"),
        ));
    }
    let candidate = if fabricated.is_empty() && borrowed.is_empty() {
        text
    } else {
        ctx.original
    };

    let fixed = apply_safe_fixes(candidate);
    if !fixed.removed_filler.is_empty() {
        flags.push(flag(
            FlagKind::FillerPhrase,
            format!("removed filler: {}", fixed.removed_filler.join(", ")),
        ));
    }
    match &fixed.removed_passive_marker {
        Some(marker) => flags.push(flag(
            FlagKind::PassiveVoice,
            format!("removed leading '{marker}'"),
        )),
        None => {
            if let Some(m) = PASSIVE.find(&fixed.text) {
                flags.push(flag(
                    FlagKind::PassiveVoice,
                    format!("passive construction '{}'", m.as_str()),
                ));
            }
        }
    }

    let mut emitted = fixed.text;
    let words = word_count(&emitted);
    if words > ctx.max_words {
        emitted = truncate_words(&emitted, ctx.max_words);
        flags.push(flag(
            FlagKind::Overlength,
            format!("trimmed from {words} to {} words", ctx.max_words),
        ));
    }

    for finding in pii_findings(&emitted) {
        flags.push(flag(FlagKind::Pii, format!("PII detected: {finding}")));
    }
    if let Some(detail) = vague_outcome(&emitted) {
        flags.push(flag(FlagKind::VagueOutcome, detail));
    }

    CheckedVariant {
        text: emitted,
        flags,
    }
}

/// Case-insensitive match of `term` in `text` at word boundaries.
pub fn mentions_term(text: &str, term: &str) -> bool {
    let term = term.trim().to_lowercase();
    if term.is_empty() {
        return false;
    }
    let text = text.to_lowercase();
    let is_word = |c: char| c.is_alphanumeric();
    text.match_indices(&term).any(|(start, _)| {
        let before = text[..start].chars().next_back();
        let after = text[start + term.len()..].chars().next();
        !before.is_some_and(is_word) && !after.is_some_and(is_word)
    })
}

/// Tools a variant names that the original does not contain (case-insensitive substring).
pub fn fabricated_tools(original: &str, variant: &str, tools: &[String]) -> Vec<String> {
    let original_lower = original.to_lowercase();
    tools
        .iter()
        .filter(|tool| mentions_term(variant, tool))
        .filter(|tool| !original_lower.contains(&tool.to_lowercase()))
        .cloned()
        .collect()
}

/// Numbers a variant uses that appear neither in the original nor in the item's own metrics.
/// Values are compared as numbers, so "45.0" matches 45. A fractional metric
/// such as 0.45 also allows its percentage, 45.
pub fn borrowed_numbers(
    original: &str,
    metrics: &BTreeMap<String, serde_json::Value>,
    variant: &str,
) -> Vec<String> {
    let mut allowed: Vec<f64> = numbers_in(original).into_iter().map(|(_, v)| v).collect();
    for value in metrics.values() {
        collect_metric_numbers(value, &mut allowed);
    }
    let mut borrowed = Vec::new();
    for (raw, value) in numbers_in(variant) {
        let known = allowed.iter().any(|a| same_number(*a, value));
        if !known && !borrowed.contains(&raw) {
            borrowed.push(raw);
        }
    }
    borrowed
}

fn same_number(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-9 * a.abs().max(b.abs()).max(1.0)
}

/// Every number in `text`, as written (thousands separators dropped) and parsed.
fn numbers_in(text: &str) -> Vec<(String, f64)> {
    NUMBER
        .captures_iter(text)
        .filter_map(|c| c.get(1))
        .filter_map(|m| {
            let raw = m.as_str().replace(',', "");
            raw.parse::<f64>().ok().map(|v| (raw, v))
        })
        .collect()
}

fn collect_metric_numbers(value: &serde_json::Value, out: &mut Vec<f64>) {
    match value {
        serde_json::Value::Number(n) => {
            if let Some(v) = n.as_f64() {
                out.push(v);
                if v != 0.0 && v.abs() < 1.0 {
                    out.push(v * 100.0);
                }
            }
        }
        serde_json::Value::String(s) => out.extend(numbers_in(s).into_iter().map(|(_, v)| v)),
        serde_json::Value::Array(values) => {
            for v in values {
                collect_metric_numbers(v, out);
            }
        }
        serde_json::Value::Object(map) => {
            for v in map.values() {
                collect_metric_numbers(v, out);
            }
        }
        _ => {}
    }
}

pub fn pii_findings(text: &str) -> Vec<&'static str> {
    let mut findings = Vec::new();
    if EMAIL.is_match(text) {
        findings.push("email address");
    }
    if PHONE.is_match(text) {
        findings.push("phone number");
    }
    if GOVERNMENT_ID.is_match(text) {
        findings.push("government ID");
    }
    findings
}

/// A vague verb or scale word with no quantified outcome anywhere in the text.
pub fn vague_outcome(text: &str) -> Option<String> {
    let quantified = text.chars().any(|c| c.is_ascii_digit())
        || text.contains('%')
        || text.contains('$')
        || text.contains('€')
        || text.contains('£');
    if quantified {
        return None;
    }

    let lower = text.to_lowercase();
    if let Some(verb) = VAGUE_VERBS.iter().find(|v| mentions_term(&lower, v)) {
        return Some(format!("vague verb '{verb}' without a quantified outcome"));
    }
    VAGUE_SCALE_WORDS
        .iter()
        .find(|w| mentions_term(&lower, w))
        .map(|w| format!("vague scale word '{w}' without a number"))
}
