//! Review Checks
//!
//! The rule half of the supervisor: a data-driven table of checks evaluated
//! against a `ReviewInput`. Checks are pure functions over the immutable
//! input; new checks are added by appending to `builtin_checks`.

use crate::models::{CheckResult, NumericCrossCheck, ReviewInput, ReviewIssue};

/// A single review check: an id, a name, and a pure evaluation function.
#[derive(Clone)]
pub struct ReviewCheck {
    /// Stable identifier
    pub id: &'static str,
    /// Display name
    pub name: &'static str,
    /// Evaluate the check against the input
    pub run: fn(&ReviewInput) -> CheckResult,
}

/// The built-in check table, in evaluation order.
pub fn builtin_checks() -> Vec<ReviewCheck> {
    vec![
        ReviewCheck {
            id: "mandatory-fields",
            name: "Mandatory field presence",
            run: check_mandatory_fields,
        },
        ReviewCheck {
            id: "confidence-floors",
            name: "Per-field confidence floors",
            run: check_confidence_floors,
        },
        ReviewCheck {
            id: "numeric-sanity",
            name: "Cross-record numeric sanity",
            run: check_numeric_sanity,
        },
        ReviewCheck {
            id: "error-consistency",
            name: "Status/error-list consistency",
            run: check_error_consistency,
        },
    ]
}

/// Every mandatory field must be present. Absence is critical.
fn check_mandatory_fields(input: &ReviewInput) -> CheckResult {
    let issues: Vec<ReviewIssue> = input
        .fields
        .iter()
        .filter(|f| f.mandatory && !f.present)
        .map(|f| {
            ReviewIssue::critical(format!("mandatory field '{}' was not extracted", f.name))
                .with_suggestion(format!(
                    "re-run extraction for '{}' or review the source document",
                    f.name
                ))
        })
        .collect();

    if issues.is_empty() {
        CheckResult::passed("mandatory-fields", "Mandatory field presence")
    } else {
        CheckResult::failed("mandatory-fields", "Mandatory field presence", issues)
    }
}

/// Present fields below their confidence floor are flagged, never blocking.
fn check_confidence_floors(input: &ReviewInput) -> CheckResult {
    let issues: Vec<ReviewIssue> = input
        .fields
        .iter()
        .filter(|f| f.present && f.confidence < f.confidence_floor)
        .map(|f| {
            ReviewIssue::warning(format!(
                "field '{}' confidence {:.2} is below floor {:.2}",
                f.name, f.confidence, f.confidence_floor
            ))
        })
        .collect();

    if issues.is_empty() {
        CheckResult::passed("confidence-floors", "Per-field confidence floors")
    } else {
        CheckResult::failed("confidence-floors", "Per-field confidence floors", issues)
    }
}

/// Relative difference between two values, against the larger magnitude.
fn relative_difference(left: f64, right: f64) -> f64 {
    let max = left.abs().max(right.abs());
    if max == 0.0 {
        0.0
    } else {
        (left - right).abs() / max
    }
}

fn cross_check_issue(check: &NumericCrossCheck) -> Option<ReviewIssue> {
    let (left, right) = (check.left?, check.right?);
    let diff = relative_difference(left, right);
    if diff > check.warn_ratio {
        Some(ReviewIssue::warning(format!(
            "{}: {} ({:.1}) differs from {} ({:.1}) by {:.0}%",
            check.name,
            check.left_label,
            left,
            check.right_label,
            right,
            diff * 100.0
        )))
    } else {
        None
    }
}

/// Numeric pairs across records must agree within their configured ratio.
fn check_numeric_sanity(input: &ReviewInput) -> CheckResult {
    if input.cross_checks.is_empty() {
        return CheckResult::skipped(
            "numeric-sanity",
            "Cross-record numeric sanity",
            "no numeric pairs available",
        );
    }

    let issues: Vec<ReviewIssue> = input
        .cross_checks
        .iter()
        .filter_map(cross_check_issue)
        .collect();

    if issues.is_empty() {
        CheckResult::passed("numeric-sanity", "Cross-record numeric sanity")
    } else {
        CheckResult::failed("numeric-sanity", "Cross-record numeric sanity", issues)
    }
}

/// A non-completed status with an empty error list is an internal
/// inconsistency: something failed without recording why.
fn check_error_consistency(input: &ReviewInput) -> CheckResult {
    if input.orchestrator_status.is_failure() && input.error_count == 0 {
        CheckResult::failed(
            "error-consistency",
            "Status/error-list consistency",
            vec![ReviewIssue::warning(format!(
                "status is {} but no errors were recorded",
                input.orchestrator_status
            ))],
        )
    } else {
        CheckResult::passed("error-consistency", "Status/error-list consistency")
    }
}
