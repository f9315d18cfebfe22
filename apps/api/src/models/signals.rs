//! The categorized, weighted term data derived from one reference document.
//!
//! `SignalSet` is only ever produced through [`SignalSet::build`], which enforces the
//! set's invariants no matter where the candidates came from (local extraction, a
//! generative call, or a cache entry that is re-validated on read).
#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

/// Upper bound on prioritized terms kept per reference document.
pub const MAX_TERMS: usize = 25;

/// The three mutually exclusive term buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TermCategory {
    /// Safe to attribute to an item when the work plausibly demonstrates it.
    Competency,
    /// A named product or technology. A factual claim: never added to an item.
    Tool,
    /// Contextual or industry framing, safe to add.
    Domain,
}

impl TermCategory {
    /// Tie-break when the same term is proposed under two categories.
    /// Tools win so that ambiguous names are treated as factual claims.
    fn precedence(self) -> u8 {
        match self {
            TermCategory::Tool => 2,
            TermCategory::Domain => 1,
            TermCategory::Competency => 0,
        }
    }
}

/// A proposed term before invariants are applied.
#[derive(Debug, Clone)]
pub struct TermCandidate {
    pub term: String,
    pub weight: f64,
    pub category: Option<TermCategory>,
    pub synonyms: Vec<String>,
}

impl TermCandidate {
    pub fn new(term: impl Into<String>, weight: f64, category: Option<TermCategory>) -> Self {
        Self {
            term: term.into(),
            weight,
            category,
            synonyms: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SignalSet {
    /// Prioritized terms, highest weight first.
    pub terms: Vec<String>,
    /// Weight per term in `[0, 1]`.
    pub weights: BTreeMap<String, f64>,
    pub synonyms: BTreeMap<String, Vec<String>>,
    pub competencies: Vec<String>,
    pub tools: Vec<String>,
    pub domain_terms: Vec<String>,
}

impl SignalSet {
    /// Builds a set from raw candidates.
    ///
    /// Terms are trimmed and de-duplicated case-insensitively (first surface form wins,
    /// highest weight wins, tool beats domain beats competency), weights are clamped to
    /// `[0, 1]`, the list is ordered by weight and capped at `max_terms`, and buckets
    /// only ever reference retained terms.
    pub fn build(candidates: Vec<TermCandidate>, max_terms: usize) -> Self {
        struct Merged {
            term: String,
            weight: f64,
            category: Option<TermCategory>,
            synonyms: Vec<String>,
        }

        let mut order: Vec<String> = Vec::new();
        let mut merged: HashMap<String, Merged> = HashMap::new();

        for candidate in candidates {
            let term = collapse_spaces(&candidate.term);
            if term.is_empty() {
                continue;
            }
            let key = term.to_lowercase();
            let weight = clamp_weight(candidate.weight);

            match merged.get_mut(&key) {
                Some(existing) => {
                    existing.weight = existing.weight.max(weight);
                    existing.category = match (existing.category, candidate.category) {
                        (Some(a), Some(b)) if b.precedence() > a.precedence() => Some(b),
                        (None, b) => b,
                        (a, _) => a,
                    };
                    existing.synonyms.extend(candidate.synonyms);
                }
                None => {
                    order.push(key.clone());
                    merged.insert(
                        key,
                        Merged {
                            term,
                            weight,
                            category: candidate.category,
                            synonyms: candidate.synonyms,
                        },
                    );
                }
            }
        }

        let mut ranked: Vec<Merged> = order
            .into_iter()
            .filter_map(|key| merged.remove(&key))
            .collect();
        ranked.sort_by(|a, b| {
            b.weight
                .partial_cmp(&a.weight)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.term.to_lowercase().cmp(&b.term.to_lowercase()))
        });
        ranked.truncate(max_terms);

        let mut set = SignalSet::default();
        for entry in ranked {
            let term_lower = entry.term.to_lowercase();
            let mut synonyms: Vec<String> = Vec::new();
            for synonym in entry.synonyms {
                let synonym = collapse_spaces(&synonym);
                let lower = synonym.to_lowercase();
                if synonym.is_empty()
                    || lower == term_lower
                    || synonyms.iter().any(|s| s.to_lowercase() == lower)
                {
                    continue;
                }
                synonyms.push(synonym);
            }
            if !synonyms.is_empty() {
                set.synonyms.insert(entry.term.clone(), synonyms);
            }
            match entry.category {
                Some(TermCategory::Competency) => set.competencies.push(entry.term.clone()),
                Some(TermCategory::Tool) => set.tools.push(entry.term.clone()),
                Some(TermCategory::Domain) => set.domain_terms.push(entry.term.clone()),
                None => {}
            }
            set.weights.insert(entry.term.clone(), entry.weight);
            set.terms.push(entry.term);
        }
        set
    }

    /// Checks the invariants `build` establishes. Used on data that crossed a
    /// serialization boundary (cache entries).
    pub fn validate(&self) -> Result<(), String> {
        if self.terms.len() > MAX_TERMS {
            return Err(format!(
                "{} terms exceeds the maximum of {MAX_TERMS}",
                self.terms.len()
            ));
        }

        let mut seen: HashMap<String, Option<TermCategory>> = HashMap::new();
        for term in &self.terms {
            if seen.insert(term.to_lowercase(), None).is_some() {
                return Err(format!("duplicate term '{term}'"));
            }
            match self.weights.get(term) {
                Some(w) if (0.0..=1.0).contains(w) => {}
                Some(w) => return Err(format!("weight {w} for '{term}' is outside [0, 1]")),
                None => return Err(format!("term '{term}' has no weight")),
            }
        }

        let buckets = [
            (TermCategory::Competency, &self.competencies),
            (TermCategory::Tool, &self.tools),
            (TermCategory::Domain, &self.domain_terms),
        ];
        for (category, bucket) in buckets {
            for term in bucket {
                match seen.get_mut(&term.to_lowercase()) {
                    None => return Err(format!("bucketed term '{term}' is not a listed term")),
                    Some(Some(other)) => {
                        return Err(format!(
                            "term '{term}' is in both {other:?} and {category:?}"
                        ))
                    }
                    Some(slot) => *slot = Some(category),
                }
            }
        }
        Ok(())
    }

    pub fn category_of(&self, term: &str) -> Option<TermCategory> {
        let lower = term.to_lowercase();
        let hit = |bucket: &Vec<String>| bucket.iter().any(|t| t.to_lowercase() == lower);
        if hit(&self.tools) {
            Some(TermCategory::Tool)
        } else if hit(&self.domain_terms) {
            Some(TermCategory::Domain)
        } else if hit(&self.competencies) {
            Some(TermCategory::Competency)
        } else {
            None
        }
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

fn clamp_weight(weight: f64) -> f64 {
    if weight.is_nan() {
        0.0
    } else {
        weight.clamp(0.0, 1.0)
    }
}

fn collapse_spaces(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(term: &str, weight: f64, category: Option<TermCategory>) -> TermCandidate {
        TermCandidate::new(term, weight, category)
    }

    #[test]
    fn test_build_orders_by_weight_and_caps() {
        let candidates = (0..30)
            .map(|i| candidate(&format!("term{i:02}"), i as f64 / 30.0, None))
            .collect();
        let set = SignalSet::build(candidates, MAX_TERMS);
        assert_eq!(set.terms.len(), MAX_TERMS);
        assert_eq!(set.terms[0], "term29");
        assert!(set.validate().is_ok());
    }

    #[test]
    fn test_build_clamps_weights() {
        let set = SignalSet::build(
            vec![
                candidate("SQL", 3.5, Some(TermCategory::Tool)),
                candidate("agile", -1.0, Some(TermCategory::Domain)),
                candidate("curiosity", f64::NAN, Some(TermCategory::Competency)),
            ],
            MAX_TERMS,
        );
        assert_eq!(set.weights["SQL"], 1.0);
        assert_eq!(set.weights["agile"], 0.0);
        assert_eq!(set.weights["curiosity"], 0.0);
    }

    #[test]
    fn test_duplicate_term_prefers_tool_category() {
        let set = SignalSet::build(
            vec![
                candidate("Tableau", 0.4, Some(TermCategory::Competency)),
                candidate("tableau", 0.9, Some(TermCategory::Tool)),
            ],
            MAX_TERMS,
        );
        assert_eq!(set.terms, vec!["Tableau"]);
        assert_eq!(set.tools, vec!["Tableau"]);
        assert!(set.competencies.is_empty());
        assert_eq!(set.weights["Tableau"], 0.9);
    }

    #[test]
    fn test_buckets_only_reference_retained_terms() {
        let mut candidates: Vec<TermCandidate> = (0..MAX_TERMS)
            .map(|i| candidate(&format!("heavy{i}"), 0.9, None))
            .collect();
        candidates.push(candidate("Figma", 0.1, Some(TermCategory::Tool)));
        let set = SignalSet::build(candidates, MAX_TERMS);
        assert!(!set.terms.contains(&"Figma".to_string()));
        assert!(set.tools.is_empty());
        assert!(set.validate().is_ok());
    }

    #[test]
    fn test_synonyms_drop_self_and_duplicates() {
        let mut c = candidate("stakeholder management", 0.7, Some(TermCategory::Competency));
        c.synonyms = vec![
            "Stakeholder Management".into(),
            "partner management".into(),
            "Partner  management".into(),
        ];
        let set = SignalSet::build(vec![c], MAX_TERMS);
        assert_eq!(
            set.synonyms["stakeholder management"],
            vec!["partner management".to_string()]
        );
    }

    #[test]
    fn test_validate_rejects_overlapping_buckets() {
        let mut set = SignalSet::build(
            vec![candidate("Excel", 0.8, Some(TermCategory::Tool))],
            MAX_TERMS,
        );
        set.domain_terms.push("Excel".into());
        assert!(set.validate().unwrap_err().contains("both"));
    }

    #[test]
    fn test_validate_rejects_unlisted_bucket_term() {
        let mut set = SignalSet::default();
        set.tools.push("Marketo".into());
        assert!(set.validate().is_err());
    }

    #[test]
    fn test_category_of_is_case_insensitive() {
        let set = SignalSet::build(
            vec![
                candidate("Power BI", 0.9, Some(TermCategory::Tool)),
                candidate("SaaS", 0.6, Some(TermCategory::Domain)),
            ],
            MAX_TERMS,
        );
        assert_eq!(set.category_of("power bi"), Some(TermCategory::Tool));
        assert_eq!(set.category_of("saas"), Some(TermCategory::Domain));
        assert_eq!(set.category_of("python"), None);
    }
}
