// src/classification/keywords.rs - Keyword vocabularies for text-based stage signals
use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::core::Stage;

/// Tools, services and technology-platform vocabulary.
pub const PLATFORM_KEYWORDS: &[&str] = &[
    "platform",
    "tools",
    "research tools",
    "instrument",
    "instruments",
    "instrumentation",
    "sequencing",
    "software",
    "ai",
    "machine learning",
    "computational",
    "analytics",
    "data",
    "reagent",
    "reagents",
    "assay",
    "assays",
    "cro",
    "contract research",
    "services",
    "manufacturing",
    "cdmo",
    "synthetic biology",
    "automation",
    "screening",
    "bioprocessing",
    "microfluidics",
    "imaging",
    "devices",
    "antibody discovery",
    "discovery engine",
];

/// Drug-development vocabulary.
pub const THERAPEUTIC_KEYWORDS: &[&str] = &[
    "therapeutic",
    "therapeutics",
    "therapy",
    "therapies",
    "drug",
    "drugs",
    "treatment",
    "treatments",
    "medicine",
    "medicines",
    "pharmaceutical",
    "oncology",
    "cancer",
    "tumor",
    "vaccine",
    "vaccines",
    "gene therapy",
    "cell therapy",
    "small molecule",
    "biologic",
    "biologics",
    "immunotherapy",
    "rare disease",
    "neurology",
    "neurodegenerative",
    "cardiovascular",
    "inflammation",
    "autoimmune",
    "infectious disease",
    "fibrosis",
    "metabolic disease",
    "ophthalmology",
];

static PHASE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bphase\s*-?\s*(iii|ii|i|3|2|1)\b").expect("phase regex is valid"));

/// Lower-cased text with every non-alphanumeric run turned into one space and
/// padded on both ends, so `" kw "` matches whole words only.
fn padded_words(text: &str) -> String {
    let cleaned: String = text
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    format!(" {} ", cleaned.split_whitespace().collect::<Vec<_>>().join(" "))
}

/// Number of distinct `keywords` present in `text` as whole words.
pub fn count_keywords(text: &str, keywords: &[&str]) -> usize {
    let padded = padded_words(text);
    keywords
        .iter()
        .filter(|kw| padded.contains(&format!(" {} ", kw)))
        .count()
}

pub fn contains_any_keyword(text: &str, keywords: &[&str]) -> bool {
    count_keywords(text, keywords) > 0
}

/// Highest clinical phase named explicitly in `text`.
pub fn explicit_phase(text: &str) -> Option<Stage> {
    let lower = text.to_lowercase();
    PHASE_PATTERN
        .captures_iter(&lower)
        .filter_map(|caps| match caps.get(1).map(|m| m.as_str()) {
            Some("iii") | Some("3") => Some(3u8),
            Some("ii") | Some("2") => Some(2),
            Some("i") | Some("1") => Some(1),
            _ => None,
        })
        .max()
        .map(|phase| match phase {
            3 => Stage::PhaseIII,
            2 => Stage::PhaseII,
            _ => Stage::PhaseI,
        })
}
