//! Tone calibration: maps the requested tone to verb sets and a style note.
//!
//! Tone only shapes phrasing. It never relaxes the category rules: no tone
//! may introduce a tool or a number the original item does not carry.

use crate::models::job::Tone;

/// Verb sets and phrasing calibrated to one tone.
#[derive(Debug, Clone)]
pub struct ToneGuidance {
    pub style: &'static str,
    pub strong_verbs: Vec<&'static str>,
    pub avoid_verbs: Vec<&'static str>,
}

/// Returns the guidance for a requested tone.
pub fn guidance_for(tone: Tone) -> ToneGuidance {
    match tone {
        Tone::Concise => ToneGuidance {
            style: "Short and direct. Lead with the action, end with the outcome, no filler.",
            strong_verbs: vec!["Built", "Led", "Reduced", "Improved", "Launched", "Analyzed"],
            avoid_verbs: vec!["responsible for", "helped with", "worked on", "assisted"],
        },
        Tone::Impactful => ToneGuidance {
            style: "Outcome first. Emphasize the result and its scope where the item supports it.",
            strong_verbs: vec![
                "Drove",
                "Delivered",
                "Accelerated",
                "Increased",
                "Transformed",
                "Spearheaded",
            ],
            avoid_verbs: vec!["participated in", "was involved in", "supported", "helped"],
        },
        Tone::Technical => ToneGuidance {
            style: "Precise about methods and systems already named in the item.",
            strong_verbs: vec![
                "Engineered",
                "Implemented",
                "Designed",
                "Automated",
                "Optimized",
                "Instrumented",
            ],
            avoid_verbs: vec!["leveraged", "utilized", "synergized", "handled"],
        },
        Tone::Collaborative => ToneGuidance {
            style: "Credit the team context. Show partnership and shared outcomes.",
            strong_verbs: vec![
                "Partnered with",
                "Collaborated on",
                "Facilitated",
                "Enabled",
                "Coordinated",
                "Contributed to",
            ],
            avoid_verbs: vec!["single-handedly", "solely", "owned end-to-end"],
        },
    }
}

impl ToneGuidance {
    /// Prompt fragment describing this tone.
    pub fn render(&self) -> String {
        format!(
            "{} Prefer verbs like: {}. Avoid: {}.",
            self.style,
            self.strong_verbs.join(", "),
            self.avoid_verbs.join(", ")
        )
    }
}
