//! Input canonicalization and content hashing.
//!
//! Normalized text keeps its original casing for downstream use; case folding is
//! applied only to the bytes that get hashed.
#![allow(dead_code)]

use std::sync::LazyLock;

use regex::Regex;
use sha2::{Digest, Sha256};

use crate::models::job::{JobItem, JobOptions, MAX_ITEM_CHARS};

static HTML_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]{1,200}>").unwrap());
static LEADING_BULLET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\-\*•·▪◦‣>\s]+").unwrap());

/// An item that survived normalization, with its own metrics attached.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedItem {
    pub text: String,
    pub metrics: std::collections::BTreeMap<String, serde_json::Value>,
}

/// Canonicalizes free text: folds typographic punctuation, strips markup,
/// invisible characters and emoji, and collapses whitespace.
pub fn normalize_text(text: &str) -> String {
    let without_tags = HTML_TAG.replace_all(text, " ");
    let folded: String = without_tags
        .chars()
        .filter_map(fold_char)
        .collect();
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Best-effort decode for raw bytes. Invalid UTF-8 sequences are dropped, never fatal.
pub fn normalize_bytes(bytes: &[u8]) -> String {
    normalize_text(&String::from_utf8_lossy(bytes))
}

/// Normalizes each item, strips leading bullet glyphs, caps the length and drops
/// items that end up empty. Metrics stay attached to their own item.
pub fn normalize_items(items: &[JobItem]) -> Vec<NormalizedItem> {
    items
        .iter()
        .filter_map(|item| {
            let text = normalize_text(&item.text);
            let text = LEADING_BULLET.replace(&text, "").trim().to_string();
            if text.is_empty() {
                return None;
            }
            Some(NormalizedItem {
                text: truncate_chars(&text, MAX_ITEM_CHARS),
                metrics: item.metrics.clone(),
            })
        })
        .collect()
}

/// Hex SHA-256 of arbitrary content.
pub fn content_hash(content: &str) -> String {
    format!("{:x}", Sha256::digest(content.as_bytes()))
}

/// Case-insensitive hash of a normalized reference document. Feeds the
/// idempotency key.
pub fn reference_hash(normalized_reference: &str) -> String {
    content_hash(&normalized_reference.to_lowercase())
}

/// Case-preserving hash of a normalized reference document. Keys the Signal
/// Cache: local extraction reads casing, so two documents that differ only in
/// case may not share an entry.
pub fn signal_key(normalized_reference: &str) -> String {
    content_hash(normalized_reference)
}

/// Deterministic key over everything that determines a job's output.
pub fn idempotency_key(
    job_id: &str,
    reference_hash: &str,
    items: &[NormalizedItem],
    options: &JobOptions,
    role: &str,
    extra_context: Option<&str>,
) -> String {
    let items_joined = items
        .iter()
        .map(|item| {
            let metrics = serde_json::to_string(&item.metrics).unwrap_or_default();
            format!("{}##{}", item.text, metrics)
        })
        .collect::<Vec<_>>()
        .join("||");
    let options_json = serde_json::to_string(options).unwrap_or_default();
    content_hash(&format!(
        "{job_id}::{reference_hash}::{items_joined}::{options_json}::{role}::{}",
        extra_context.unwrap_or("")
    ))
}

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Truncates to at most `max` characters without splitting a code point.
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].trim_end().to_string(),
        None => text.to_string(),
    }
}

fn fold_char(c: char) -> Option<char> {
    match c {
        '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{2032}' => Some('\''),
        '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{2033}' => Some('"'),
        '\u{2010}'..='\u{2015}' | '\u{2212}' => Some('-'),
        '\u{00A0}' | '\u{2007}' | '\u{202F}' | '\u{2000}'..='\u{200A}' => Some(' '),
        '\u{2026}' => Some('.'),
        // Zero-width, bidi controls, BOM, variation selectors, replacement char.
        '\u{200B}'..='\u{200F}'
        | '\u{202A}'..='\u{202E}'
        | '\u{2060}'..='\u{2064}'
        | '\u{FEFF}'
        | '\u{FE00}'..='\u{FE0F}'
        | '\u{FFFD}' => None,
        // Emoji and pictographs.
        '\u{1F000}'..='\u{1FAFF}' | '\u{2600}'..='\u{27BF}' => None,
        c if c.is_control() && !c.is_whitespace() => None,
        c => Some(c),
    }
}
