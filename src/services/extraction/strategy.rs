//! Extraction Strategy
//!
//! Policy selecting which extraction path(s) run for a document.

use serde::{Deserialize, Serialize};

/// Which extraction paths a stage runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStrategy {
    /// Only the text path; its failure is terminal for the stage
    TextOnly,
    /// Only the vision path; its failure is terminal for the stage
    VisionOnly,
    /// Both paths run; vision always contributes
    Hybrid,
    /// Text first; vision only when the text result's aggregate confidence
    /// falls below the stage threshold (cheap path first)
    Fallback,
}

impl Default for ExtractionStrategy {
    fn default() -> Self {
        Self::Fallback
    }
}

impl ExtractionStrategy {
    /// Whether the text path runs under this strategy.
    pub fn runs_text(&self) -> bool {
        !matches!(self, ExtractionStrategy::VisionOnly)
    }

    /// Whether the vision path runs unconditionally under this strategy.
    pub fn always_runs_vision(&self) -> bool {
        matches!(self, ExtractionStrategy::VisionOnly | ExtractionStrategy::Hybrid)
    }
}

impl std::fmt::Display for ExtractionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractionStrategy::TextOnly => write!(f, "text_only"),
            ExtractionStrategy::VisionOnly => write!(f, "vision_only"),
            ExtractionStrategy::Hybrid => write!(f, "hybrid"),
            ExtractionStrategy::Fallback => write!(f, "fallback"),
        }
    }
}

impl std::str::FromStr for ExtractionStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text_only" => Ok(ExtractionStrategy::TextOnly),
            "vision_only" => Ok(ExtractionStrategy::VisionOnly),
            "hybrid" => Ok(ExtractionStrategy::Hybrid),
            "fallback" => Ok(ExtractionStrategy::Fallback),
            other => Err(format!("unknown extraction strategy: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_selection() {
        assert!(ExtractionStrategy::TextOnly.runs_text());
        assert!(!ExtractionStrategy::TextOnly.always_runs_vision());

        assert!(!ExtractionStrategy::VisionOnly.runs_text());
        assert!(ExtractionStrategy::VisionOnly.always_runs_vision());

        assert!(ExtractionStrategy::Hybrid.runs_text());
        assert!(ExtractionStrategy::Hybrid.always_runs_vision());

        assert!(ExtractionStrategy::Fallback.runs_text());
        assert!(!ExtractionStrategy::Fallback.always_runs_vision());
    }

    #[test]
    fn test_round_trip() {
        for strategy in [
            ExtractionStrategy::TextOnly,
            ExtractionStrategy::VisionOnly,
            ExtractionStrategy::Hybrid,
            ExtractionStrategy::Fallback,
        ] {
            let parsed: ExtractionStrategy = strategy.to_string().parse().unwrap();
            assert_eq!(parsed, strategy);
        }
    }
}
