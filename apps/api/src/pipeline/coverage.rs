// Output assembly helpers: coverage, per-item diff and the final invariant check.

use std::collections::HashSet;

use crate::models::job::{Coverage, ItemDiff, ItemResult};
use crate::models::signals::SignalSet;
use crate::normalize::{word_count, NormalizedItem};
use crate::validation::rules::{fabricated_tools, mentions_term};

const DIFF_STOPWORDS: &[&str] = &[
    "the", "and", "for", "with", "from", "into", "that", "this", "their", "them", "then",
    "than", "over", "across", "within", "while", "which", "were", "have", "been", "also",
    "more", "most", "each", "other", "such", "through", "using", "used", "about", "after",
    "before", "under", "between", "some", "very",
];

/// A term is hit when it, or one of its synonyms, appears in any final variant.
pub fn compute_coverage(signals: &SignalSet, results: &[ItemResult]) -> Coverage {
    let variants: Vec<&str> = results
        .iter()
        .flat_map(|r| r.revised.iter().map(String::as_str))
        .collect();

    let mut coverage = Coverage::default();
    for term in &signals.terms {
        let synonyms = signals.synonyms.get(term).map(Vec::as_slice).unwrap_or(&[]);
        let hit = variants.iter().any(|variant| {
            mentions_term(variant, term) || synonyms.iter().any(|s| mentions_term(variant, s))
        });
        if hit {
            coverage.hit.push(term.clone());
        } else {
            coverage.miss.push(term.clone());
        }
    }
    coverage
}

/// Compares the first variant with the original.
pub fn compute_diff(original: &str, revised: &str, signals: &SignalSet) -> ItemDiff {
    let added_terms = signals
        .terms
        .iter()
        .filter(|term| mentions_term(revised, term) && !mentions_term(original, term))
        .cloned()
        .collect();

    let revised_words: HashSet<String> = content_words(revised).into_iter().collect();
    let mut removed: Vec<String> = Vec::new();
    for word in content_words(original) {
        if !revised_words.contains(&word) && !removed.contains(&word) {
            removed.push(word);
        }
    }

    ItemDiff {
        added_terms,
        removed,
    }
}

fn content_words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric() && c != '-' && c != '+' && c != '#')
        .map(|w| w.trim_matches('-').to_lowercase())
        .filter(|w| w.chars().count() > 3 && !DIFF_STOPWORDS.contains(&w.as_str()))
        .collect()
}

/// Last line of defence before a job is emitted. Any failure here means an
/// earlier stage broke its contract.
pub fn check_invariants(
    items: &[NormalizedItem],
    results: &[ItemResult],
    tools: &[String],
    max_words: usize,
) -> Result<(), String> {
    if items.len() != results.len() {
        return Err(format!(
            "{} items produced {} results",
            items.len(),
            results.len()
        ));
    }

    for (index, (item, result)) in items.iter().zip(results).enumerate() {
        if result.original != item.text {
            return Err(format!("result {index} does not belong to item {index}"));
        }
        if result.revised.is_empty() {
            return Err(format!("result {index} has no variants"));
        }
        if !result.scores.in_range() {
            return Err(format!("result {index} has scores outside 0-100"));
        }
        for (variant_index, variant) in result.revised.iter().enumerate() {
            let words = word_count(variant);
            if words > max_words {
                return Err(format!(
                    "item {index} variant {variant_index} has {words} words, limit is {max_words}"
                ));
            }
            let fabricated = fabricated_tools(&item.text, variant, tools);
            if !fabricated.is_empty() {
                return Err(format!(
                    "item {index} variant {variant_index} names {} absent from the original",
                    fabricated.join(", ")
                ));
            }
        }
    }
    Ok(())
}
