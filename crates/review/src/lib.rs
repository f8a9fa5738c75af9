//! ClaimLens Review
//!
//! The supervisor's rule half: a data-driven table of review checks
//! (mandatory-field presence, confidence floors, cross-record numeric
//! sanity) evaluated against a domain-light view of a finished job, and a
//! pipeline that assembles the terminal report. The application maps its
//! records into `ReviewInput`; this crate stays free of pipeline types so
//! the dependency direction is unidirectional.

pub mod checks;
pub mod models;
pub mod pipeline;

pub use checks::{builtin_checks, ReviewCheck};
pub use models::{
    CheckResult, CheckStatus, FieldSummary, NumericCrossCheck, ReviewInput, ReviewIssue,
    ReviewReport, Severity,
};
pub use pipeline::ReviewPipeline;
