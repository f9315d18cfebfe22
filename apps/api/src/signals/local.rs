//! Local Signal Extractor: TF-IDF ranking plus pattern recognition, no network.
//!
//! Algorithm:
//! 1. Split the reference into sentences; each sentence is one IDF "document".
//!    Score every unigram and bigram by tf * idf and normalize to `[0, 1]`.
//! 2. Recognize named tools (curated list, CamelCase product names, capitalized
//!    multi-word phrases) and put them in the tool bucket.
//! 3. Recognize curated competency and domain phrases; classify the remaining
//!    high-weight n-grams as competency or domain by keyword hints.
//! 4. Confidence = density of recognized terms, agreement between the pattern
//!    and statistical passes, and how many of the three buckets were filled.
//!
//! Deterministic: every map iterated here is ordered.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use regex::Regex;

use crate::models::signals::{SignalSet, TermCandidate, TermCategory, MAX_TERMS};

/// Pattern-recognized tools never weigh less than this.
const TOOL_WEIGHT_FLOOR: f64 = 0.75;
/// Pattern-recognized competencies and domain phrases never weigh less than this.
const PATTERN_WEIGHT_FLOOR: f64 = 0.6;
/// Statistical terms below this normalized score are dropped.
const MIN_STAT_WEIGHT: f64 = 0.2;
/// How many statistical n-grams are considered.
const STAT_CANDIDATES: usize = 40;
/// One recognized term per twenty words counts as fully dense.
const TARGET_DENSITY: f64 = 0.05;

const DENSITY_WEIGHT: f64 = 0.4;
const AGREEMENT_WEIGHT: f64 = 0.3;
const COVERAGE_WEIGHT: f64 = 0.3;

/// Output of one local extraction.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalExtraction {
    pub signals: SignalSet,
    pub confidence: f64,
}

// ────────────────────────────────────────────────────────────────────────────
// Curated vocabularies
// ────────────────────────────────────────────────────────────────────────────

/// Canonical spellings of well-known tools and platforms.
const KNOWN_TOOLS: &[&str] = &[
    "Python", "Java", "JavaScript", "TypeScript", "Rust", "Swift", "Kotlin", "Scala", "Ruby",
    "React", "Angular", "Vue", "Node.js", "Django", "Flask", "Spring", "Laravel", "Rails",
    "AWS", "Azure", "GCP", "Google Cloud", "Docker", "Kubernetes", "Terraform",
    "SQL", "PostgreSQL", "MySQL", "MongoDB", "Redis", "Elasticsearch", "Snowflake", "BigQuery",
    "Git", "GitHub", "GitLab", "Jenkins", "CI/CD", "Jira", "Confluence",
    "Salesforce", "HubSpot", "Marketo", "Pardot", "Zapier", "Monday.com",
    "Tableau", "Power BI", "Looker", "Google Analytics", "Mixpanel", "Amplitude",
    "Figma", "Sketch", "Adobe Creative Suite", "Canva",
    "Excel", "PowerPoint", "ChatGPT", "Spark", "Airflow", "dbt", "Pandas",
];

/// Tools whose names are also ordinary English words. These only match with
/// their canonical capitalization.
const AMBIGUOUS_TOOLS: &[&str] = &["Rust", "Swift", "Spring", "Rails", "Sketch", "Spark", "Ruby"];

/// (canonical, aliases) for transferable competencies.
const COMPETENCIES: &[(&str, &[&str])] = &[
    ("analytical thinking", &["analytical thinking", "analytical skills", "analytical"]),
    ("problem solving", &["problem solving", "problem-solving", "problem solver"]),
    ("communication", &["communication", "communicator"]),
    ("collaboration", &["collaboration", "collaborative", "teamwork"]),
    ("leadership", &["leadership"]),
    ("stakeholder management", &["stakeholder management", "stakeholder communication"]),
    ("attention to detail", &["attention to detail", "detail-oriented", "detail oriented"]),
    ("adaptability", &["adaptability", "adaptable"]),
    ("critical thinking", &["critical thinking"]),
    ("project management", &["project management"]),
    ("time management", &["time management"]),
    ("cross-functional collaboration", &["cross-functional", "cross functional"]),
    ("strategic thinking", &["strategic thinking", "strategic"]),
    ("mentoring", &["mentoring", "mentorship"]),
    ("data-driven decision making", &["data-driven", "data driven"]),
    ("prioritization", &["prioritization", "prioritize"]),
    ("ownership", &["ownership"]),
    ("storytelling", &["storytelling", "data storytelling"]),
    ("curiosity", &["curiosity", "curious"]),
];

/// (canonical, aliases) for domain and industry framing.
const DOMAINS: &[(&str, &[&str])] = &[
    ("B2B", &["b2b"]),
    ("B2C", &["b2c"]),
    ("SaaS", &["saas"]),
    ("API", &["api", "apis"]),
    ("KPI", &["kpi", "kpis"]),
    ("ROI", &["roi"]),
    ("MVP", &["mvp"]),
    ("healthcare", &["healthcare", "health care"]),
    ("fintech", &["fintech"]),
    ("e-commerce", &["e-commerce", "ecommerce"]),
    ("retail", &["retail"]),
    ("manufacturing", &["manufacturing"]),
    ("startup", &["startup", "start-up"]),
    ("enterprise", &["enterprise"]),
    ("SMB", &["smb"]),
    ("mid-market", &["mid-market"]),
    ("agile", &["agile"]),
    ("scrum", &["scrum"]),
    ("kanban", &["kanban"]),
    ("demand generation", &["demand generation", "demand gen"]),
    ("patient engagement", &["patient engagement"]),
    ("supply chain", &["supply chain"]),
    ("machine learning", &["machine learning"]),
    ("dashboards", &["dashboards", "dashboarding"]),
    ("reporting", &["reporting"]),
];

/// Words that mark an unrecognized n-gram as a competency rather than domain.
const COMPETENCY_HINTS: &[&str] = &[
    "thinking", "communication", "collaboration", "leadership", "management", "solving",
    "skills", "mentoring", "teamwork", "initiative", "judgment", "organization",
];

/// Words that disqualify a capitalized phrase from being a product name.
const GENERAL_WORDS: &[&str] = &[
    "senior", "junior", "lead", "principal", "staff", "head", "chief", "manager", "director",
    "analyst", "engineer", "developer", "designer", "scientist", "specialist", "associate",
    "intern", "coordinator", "consultant", "officer", "team", "department", "about", "us",
    "we", "you", "our", "your", "the", "a", "an", "and", "or", "of", "in", "for", "with",
    "required", "preferred", "responsibilities", "requirements", "qualifications", "benefits",
    "nice", "to", "have", "must", "what", "who", "why", "how", "job", "role", "position",
    "description", "summary", "overview", "company", "remote", "hybrid", "full", "time",
    "equal", "opportunity", "employer", "bonus", "plus", "skills", "experience", "teams",
    "product", "products", "service", "services", "client", "clients", "customer",
    "customers", "business", "stakeholders", "engineering", "marketing", "sales",
    "operations", "group",
];

/// Generic action verbs. They carry no signal about the role and never rank.
const VERB_STOPWORDS: &[&str] = &[
    "build", "builds", "building", "built", "create", "creates", "creating", "develop",
    "develops", "developing", "deliver", "delivers", "delivering", "drive", "drives",
    "driving", "manage", "manages", "managing", "support", "supports", "supporting",
    "ensure", "ensures", "make", "makes", "making", "use", "uses", "write", "writes",
    "writing", "work", "works", "working", "hire", "hiring", "seek", "seeking", "apply",
    "communicate", "collaborate", "partner", "own", "owns",
];

const STOPWORDS: &[&str] = &[
    "a", "about", "above", "across", "after", "all", "also", "am", "an", "and", "any", "are",
    "as", "at", "be", "been", "being", "both", "but", "by", "can", "could", "do", "does",
    "each", "either", "etc", "every", "for", "from", "get", "has", "have", "help", "how", "if",
    "in", "into", "is", "it", "its", "join", "just", "like", "looking", "may", "more", "most",
    "must", "need", "needs", "new", "no", "not", "of", "on", "one", "or", "other", "our",
    "out", "over", "own", "per", "plus", "role", "should", "so", "some", "such", "than",
    "that", "the", "their", "them", "then", "there", "these", "they", "this", "those",
    "through", "to", "up", "us", "using", "very", "want", "was", "we", "well", "were",
    "what", "when", "where", "which", "while", "who", "whom", "why", "will", "with",
    "within", "work", "would", "you", "your", "ability", "able", "experience", "years",
    "year", "strong", "required", "preferred", "including", "include", "includes",
    "knowledge", "skills", "skill", "responsibilities", "requirements", "qualifications",
    "candidate", "ideal", "opportunity", "team", "teams", "company", "great", "excellent",
    "good", "nice", "bonus", "across", "based", "related", "relevant", "understanding",
];

// ────────────────────────────────────────────────────────────────────────────
// Patterns
// ────────────────────────────────────────────────────────────────────────────

static SENTENCE_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.!?;]+(?:\s+|$)|\s[•·▪-]\s").unwrap());

static TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z][A-Za-z0-9+#]*(?:[./\-][A-Za-z0-9+#]+)*").unwrap());

static KNOWN_TOOL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    let alternation = KNOWN_TOOLS
        .iter()
        .map(|t| regex::escape(t))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"(?i)\b(?:{alternation})\b|\bC\+\+|\bC#")).unwrap()
});

static CAMEL_CASE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Z][a-z]+[A-Z][A-Za-z]+\b").unwrap());

static CAPITALIZED_PHRASE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Z][a-z]+(?:\s+[A-Z][A-Za-z]+)+\b").unwrap());

static COMPETENCY_PATTERNS: LazyLock<Vec<(Regex, &'static str)>> =
    LazyLock::new(|| alias_patterns(COMPETENCIES));

static DOMAIN_PATTERNS: LazyLock<Vec<(Regex, &'static str)>> =
    LazyLock::new(|| alias_patterns(DOMAINS));

fn alias_patterns(
    table: &'static [(&'static str, &'static [&'static str])],
) -> Vec<(Regex, &'static str)> {
    table
        .iter()
        .map(|(canonical, aliases)| {
            let alternation = aliases
                .iter()
                .map(|a| regex::escape(a).replace(r"\-", r"[\s-]?").replace(' ', r"[\s-]+"))
                .collect::<Vec<_>>()
                .join("|");
            // Aliases are plain ASCII words, so the pattern is always valid.
            let re = Regex::new(&format!(r"(?i)\b(?:{alternation})\b")).unwrap();
            (re, *canonical)
        })
        .collect()
}

// ────────────────────────────────────────────────────────────────────────────
// Extraction
// ────────────────────────────────────────────────────────────────────────────

/// Extracts a `SignalSet` and a confidence score from normalized reference text.
pub fn extract_local(reference: &str) -> LocalExtraction {
    let sentences = split_sentences(reference);
    let word_total: usize = sentences.iter().map(Vec::len).sum();
    if word_total == 0 {
        return LocalExtraction {
            signals: SignalSet::default(),
            confidence: 0.0,
        };
    }

    let stats = rank_ngrams(&sentences);
    let stat_weight = |term: &str| stats.get(&term.to_lowercase()).copied().unwrap_or(0.0);

    let tools = recognize_tools(reference);
    let competencies = recognize(reference, &COMPETENCY_PATTERNS);
    let domains = recognize(reference, &DOMAIN_PATTERNS);

    let mut candidates = Vec::new();
    for tool in &tools {
        candidates.push(TermCandidate::new(
            tool.clone(),
            stat_weight(tool).max(TOOL_WEIGHT_FLOOR),
            Some(TermCategory::Tool),
        ));
    }
    for term in &competencies {
        candidates.push(TermCandidate::new(
            *term,
            stat_weight(term).max(PATTERN_WEIGHT_FLOOR),
            Some(TermCategory::Competency),
        ));
    }
    for term in &domains {
        candidates.push(TermCandidate::new(
            *term,
            stat_weight(term).max(PATTERN_WEIGHT_FLOOR),
            Some(TermCategory::Domain),
        ));
    }

    let tool_tokens: BTreeSet<String> = tools
        .iter()
        .flat_map(|t| t.split_whitespace().map(str::to_lowercase).collect::<Vec<_>>())
        .collect();

    let mut ranked: Vec<(&String, &f64)> = stats.iter().collect();
    ranked.sort_by(|a, b| {
        b.1.partial_cmp(a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.0.cmp(b.0))
    });
    let top_stats: Vec<(&String, f64)> = ranked
        .into_iter()
        .take(STAT_CANDIDATES)
        .map(|(t, w)| (t, *w))
        .collect();

    for (ngram, weight) in &top_stats {
        if *weight < MIN_STAT_WEIGHT {
            continue;
        }
        // An n-gram that mentions a tool must not re-enter as a freely addable term.
        if ngram.split(' ').any(|w| tool_tokens.contains(w)) {
            continue;
        }
        candidates.push(TermCandidate::new(
            ngram.as_str(),
            *weight,
            Some(classify_general(ngram)),
        ));
    }

    let signals = SignalSet::build(candidates, MAX_TERMS);

    let recognized: BTreeSet<String> = tools
        .iter()
        .map(|t| t.to_lowercase())
        .chain(competencies.iter().map(|t| t.to_lowercase()))
        .chain(domains.iter().map(|t| t.to_lowercase()))
        .collect();
    let confidence = score_confidence(&recognized, &top_stats, word_total, &signals);

    LocalExtraction {
        signals,
        confidence,
    }
}

fn split_sentences(text: &str) -> Vec<Vec<String>> {
    SENTENCE_BREAK
        .split(text)
        .map(|sentence| {
            TOKEN
                .find_iter(sentence)
                .map(|m| m.as_str().to_lowercase())
                .collect::<Vec<_>>()
        })
        .filter(|tokens| !tokens.is_empty())
        .collect()
}

fn is_stopword(token: &str) -> bool {
    token.len() < 2 || STOPWORDS.contains(&token) || VERB_STOPWORDS.contains(&token)
}

/// TF-IDF over unigrams and bigrams with sentences as documents, normalized so
/// the best n-gram scores 1.0. Uses the smoothed idf `ln((1+n)/(1+df)) + 1`.
fn rank_ngrams(sentences: &[Vec<String>]) -> BTreeMap<String, f64> {
    let mut tf: BTreeMap<String, usize> = BTreeMap::new();
    let mut df: BTreeMap<String, usize> = BTreeMap::new();

    for tokens in sentences {
        let mut seen: BTreeSet<String> = BTreeSet::new();
        for (i, token) in tokens.iter().enumerate() {
            if is_stopword(token) {
                continue;
            }
            seen.insert(token.clone());
            if let Some(next) = tokens.get(i + 1) {
                if !is_stopword(next) {
                    seen.insert(format!("{token} {next}"));
                }
            }
        }
        for ngram in seen {
            *df.entry(ngram).or_default() += 1;
        }
        for (i, token) in tokens.iter().enumerate() {
            if is_stopword(token) {
                continue;
            }
            *tf.entry(token.clone()).or_default() += 1;
            if let Some(next) = tokens.get(i + 1) {
                if !is_stopword(next) {
                    *tf.entry(format!("{token} {next}")).or_default() += 1;
                }
            }
        }
    }

    let n = sentences.len() as f64;
    let raw: BTreeMap<String, f64> = tf
        .into_iter()
        .map(|(term, count)| {
            let doc_freq = df.get(&term).copied().unwrap_or(1) as f64;
            let idf = ((1.0 + n) / (1.0 + doc_freq)).ln() + 1.0;
            (term, count as f64 * idf)
        })
        .collect();

    let max = raw.values().copied().fold(0.0_f64, f64::max);
    if max <= 0.0 {
        return BTreeMap::new();
    }
    raw.into_iter().map(|(t, s)| (t, s / max)).collect()
}

/// Known tools, CamelCase product names and capitalized multi-word phrases,
/// in canonical casing, first occurrence first.
fn recognize_tools(text: &str) -> Vec<String> {
    fn push(term: String, found: &mut Vec<String>) {
        if !found.iter().any(|f| f.eq_ignore_ascii_case(&term)) {
            found.push(term);
        }
    }

    let mut found: Vec<String> = Vec::new();

    for m in KNOWN_TOOL_PATTERN.find_iter(text) {
        let matched = m.as_str();
        let canonical = KNOWN_TOOLS
            .iter()
            .find(|t| t.eq_ignore_ascii_case(matched))
            .copied()
            .unwrap_or(matched);
        if AMBIGUOUS_TOOLS.contains(&canonical) && matched != canonical {
            continue;
        }
        push(canonical.to_string(), &mut found);
    }

    for m in CAMEL_CASE.find_iter(text) {
        push(m.as_str().to_string(), &mut found);
    }

    for m in CAPITALIZED_PHRASE.find_iter(text) {
        let phrase = m.as_str().split_whitespace().collect::<Vec<_>>().join(" ");
        let general = phrase
            .split(' ')
            .any(|w| GENERAL_WORDS.contains(&w.to_lowercase().as_str()));
        let covered = found
            .iter()
            .any(|f| phrase.to_lowercase().contains(&f.to_lowercase()));
        if !general && !covered {
            push(phrase, &mut found);
        }
    }

    found
}

fn recognize(text: &str, patterns: &[(Regex, &'static str)]) -> Vec<&'static str> {
    patterns
        .iter()
        .filter(|(re, _)| re.is_match(text))
        .map(|(_, canonical)| *canonical)
        .collect()
}

fn classify_general(ngram: &str) -> TermCategory {
    let competency = ngram.split(' ').any(|w| {
        COMPETENCY_HINTS.contains(&w)
            || COMPETENCIES
                .iter()
                .any(|(_, aliases)| aliases.contains(&w))
    });
    if competency {
        TermCategory::Competency
    } else {
        TermCategory::Domain
    }
}

fn score_confidence(
    recognized: &BTreeSet<String>,
    top_stats: &[(&String, f64)],
    word_total: usize,
    signals: &SignalSet,
) -> f64 {
    if recognized.is_empty() && signals.is_empty() {
        return 0.0;
    }

    let density = recognized.len() as f64 / word_total.max(1) as f64;
    let density_score = (density / TARGET_DENSITY).min(1.0);

    let statistical: BTreeSet<&str> = top_stats.iter().map(|(t, _)| t.as_str()).collect();
    let agreement = if recognized.is_empty() {
        0.0
    } else {
        let agreeing = recognized
            .iter()
            .filter(|term| {
                statistical.contains(term.as_str())
                    || term.split(' ').any(|w| statistical.contains(w))
            })
            .count();
        agreeing as f64 / recognized.len() as f64
    };

    let filled = [
        !signals.competencies.is_empty(),
        !signals.tools.is_empty(),
        !signals.domain_terms.is_empty(),
    ]
    .iter()
    .filter(|f| **f)
    .count();
    let coverage = filled as f64 / 3.0;

    (DENSITY_WEIGHT * density_score + AGREEMENT_WEIGHT * agreement + COVERAGE_WEIGHT * coverage)
        .clamp(0.0, 1.0)
}
