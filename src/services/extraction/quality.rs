//! Text Quality Gate
//!
//! Cheap heuristic run before any text-path LLM call: scanned or corrupted
//! documents often survive text extraction as noise, and sending that noise
//! to a provider wastes a call that the vision path would handle better.

/// Default minimum quality below which the text path is skipped.
pub const DEFAULT_MIN_TEXT_QUALITY: f64 = 0.25;

/// Weight of the printable-character ratio in the score.
const PRINTABLE_WEIGHT: f64 = 0.5;

/// Weight of domain-keyword presence in the score.
const KEYWORD_WEIGHT: f64 = 0.3;

/// Weight of the word-count factor in the score.
const WORD_COUNT_WEIGHT: f64 = 0.2;

/// Word count at which the word-count factor saturates.
const WORD_COUNT_SATURATION: f64 = 50.0;

/// Keywords expected in damage-estimate text.
pub const ESTIMATE_KEYWORDS: &[&str] = &[
    "claim", "estimate", "insured", "carrier", "deductible", "rcv", "acv", "total", "loss",
];

/// Keywords expected in roof-measurement text.
pub const ROOF_KEYWORDS: &[&str] = &[
    "roof", "area", "eave", "ridge", "rake", "valley", "pitch", "facet", "square",
];

/// Score text quality in `[0.0, 1.0]`.
///
/// Combines the ratio of printable characters, the fraction of domain
/// keywords present, and a saturating word-count factor.
pub fn text_quality_score(text: &str, keywords: &[&str]) -> f64 {
    if text.trim().is_empty() {
        return 0.0;
    }

    let total_chars = text.chars().count();
    let printable = text
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_ascii_punctuation() || *c == ' ')
        .count();
    let printable_ratio = printable as f64 / total_chars as f64;

    let lowered = text.to_lowercase();
    let keyword_hits = keywords.iter().filter(|k| lowered.contains(**k)).count();
    let keyword_ratio = if keywords.is_empty() {
        0.0
    } else {
        keyword_hits as f64 / keywords.len() as f64
    };

    let word_count = text.split_whitespace().count();
    let word_factor = (word_count as f64 / WORD_COUNT_SATURATION).min(1.0);

    let score = PRINTABLE_WEIGHT * printable_ratio
        + KEYWORD_WEIGHT * keyword_ratio
        + WORD_COUNT_WEIGHT * word_factor;
    score.clamp(0.0, 1.0)
}
