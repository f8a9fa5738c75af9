//! Extraction Fusion
//!
//! Per-field selection between the text-path and vision-path candidates, and
//! the all-or-nothing policy for collections. The rules, in order:
//!
//! 1. When a value-validity predicate is supplied and exactly one candidate
//!    passes it, that candidate wins regardless of confidence.
//! 2. Otherwise the higher-confidence candidate wins.
//! 3. On ties, prefer the candidate carrying a non-null value.
//!
//! The winner's source is rewritten to `Hybrid` and its rationale mentions
//! both inputs, preserving auditability.

use claimlens_core::{ExtractedField, FieldSource};

/// A value-validity predicate used during fusion, e.g. "must be a positive
/// number". Applied only to present values; a null candidate never passes.
pub type ValidityCheck<'a, T> = &'a dyn Fn(&T) -> bool;

/// Fuse two candidates for the same logical field.
///
/// With a single candidate the field is returned unchanged; with none, a
/// missing field is produced.
pub fn fuse_fields<T: Clone>(
    text: Option<ExtractedField<T>>,
    vision: Option<ExtractedField<T>>,
    validity: Option<ValidityCheck<'_, T>>,
) -> ExtractedField<T> {
    let (text, vision) = match (text, vision) {
        (Some(text), Some(vision)) => (text, vision),
        (Some(single), None) | (None, Some(single)) => return single,
        (None, None) => return ExtractedField::missing("no extraction path produced this field", FieldSource::Fallback),
    };

    let text_valid = passes(&text, validity);
    let vision_valid = passes(&vision, validity);

    let text_wins = match (text_valid, vision_valid) {
        (true, false) => true,
        (false, true) => false,
        // Both pass or both fail: fall through to confidence comparison.
        _ => {
            if (text.confidence - vision.confidence).abs() < f64::EPSILON {
                // Tie: prefer the non-null value.
                text.is_present() || !vision.is_present()
            } else {
                text.confidence > vision.confidence
            }
        }
    };

    let (mut winner, loser, winner_label, loser_label) = if text_wins {
        (text, vision, "text", "vision")
    } else {
        (vision, text, "vision", "text")
    };

    winner.source = FieldSource::Hybrid;
    let merged_rationale = format!(
        "{} path won (confidence {:.2}): {}; {} path (confidence {:.2}): {}",
        winner_label, winner.confidence, winner.rationale, loser_label, loser.confidence, loser.rationale
    );
    winner.rationale = merged_rationale;
    winner
}

fn passes<T>(field: &ExtractedField<T>, validity: Option<ValidityCheck<'_, T>>) -> bool {
    match (&field.value, validity) {
        (Some(value), Some(check)) => check(value),
        // No predicate: neither candidate gets a validity edge.
        (_, None) => false,
        (None, Some(_)) => false,
    }
}

/// Fuse two collection candidates (e.g. line items).
///
/// Collections are all-or-nothing rather than merged element-by-element:
/// adequate text quality plus a non-empty text list wins; otherwise a
/// non-empty vision list; otherwise an empty list at zero confidence.
pub fn fuse_collection<T: Clone>(
    text_quality_adequate: bool,
    text: Option<ExtractedField<Vec<T>>>,
    vision: Option<ExtractedField<Vec<T>>>,
) -> ExtractedField<Vec<T>> {
    if text_quality_adequate {
        if let Some(text) = text {
            if text.value.as_ref().map(|v| !v.is_empty()).unwrap_or(false) {
                return text;
            }
        }
    }

    if let Some(vision) = vision {
        if vision.value.as_ref().map(|v| !v.is_empty()).unwrap_or(false) {
            return vision;
        }
    }

    ExtractedField::new(
        Vec::new(),
        0.0,
        "neither path produced a usable collection",
        FieldSource::Fallback,
    )
}
