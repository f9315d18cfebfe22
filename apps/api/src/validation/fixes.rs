//! Safe mechanical fixes. These only ever remove wording or adjust spacing and
//! case; they never add content.

use std::sync::LazyLock;

use regex::Regex;

static LEADING_PASSIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^((?:was\s+)?(?:responsible\s+for|tasked\s+with|involved\s+in|in\s+charge\s+of|duties\s+included))[\s:,-]+",
    )
    .unwrap()
});

/// (pattern, replacement, label)
static FILLERS: LazyLock<Vec<(Regex, &'static str, &'static str)>> = LazyLock::new(|| {
    [
        (r"(?i)\bin\s+order\s+to\b", "to", "in order to"),
        (r"(?i)\bsuccessfully\s+", "", "successfully"),
        (r"(?i)\beffectively\s+", "", "effectively"),
        (r"(?i)\bbasically\s+", "", "basically"),
        (r"(?i)\bactually\s+", "", "actually"),
        (r"(?i)\breally\s+", "", "really"),
        (r"(?i)\bvery\s+", "", "very"),
        (r"(?i)\bhighly\s+skilled\s+", "", "highly skilled"),
    ]
    .into_iter()
    .map(|(pattern, replacement, label)| (Regex::new(pattern).unwrap(), replacement, label))
    .collect()
});

static SPACE_BEFORE_PUNCT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+([,.;:!?])").unwrap());

#[derive(Debug, Clone, PartialEq)]
pub struct FixOutcome {
    pub text: String,
    pub removed_filler: Vec<String>,
    pub removed_passive_marker: Option<String>,
}

/// Applies every safe fix. Returns the input unchanged if fixing would empty it.
pub fn apply_safe_fixes(text: &str) -> FixOutcome {
    let mut current = collapse(text);
    let mut removed_filler = Vec::new();
    let mut removed_passive_marker = None;

    if let Some(caps) = LEADING_PASSIVE.captures(&current) {
        if let (Some(whole), Some(marker)) = (caps.get(0), caps.get(1)) {
            removed_passive_marker = Some(marker.as_str().to_string());
            current = current[whole.end()..].to_string();
        }
    }

    for (pattern, replacement, label) in FILLERS.iter() {
        if pattern.is_match(&current) {
            removed_filler.push(label.to_string());
            current = pattern.replace_all(&current, *replacement).into_owned();
        }
    }

    let current = capitalize_first(&collapse(&SPACE_BEFORE_PUNCT.replace_all(&current, "$1")));

    if current.is_empty() {
        return FixOutcome {
            text: collapse(text),
            removed_filler: Vec::new(),
            removed_passive_marker: None,
        };
    }

    FixOutcome {
        text: current,
        removed_filler,
        removed_passive_marker,
    }
}

/// Keeps the first `max_words` words and drops dangling punctuation.
pub fn truncate_words(text: &str, max_words: usize) -> String {
    let kept = text
        .split_whitespace()
        .take(max_words)
        .collect::<Vec<_>>()
        .join(" ");
    kept.trim_end_matches([',', ';', ':', '-', '(']).to_string()
}

fn collapse(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn capitalize_first(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
