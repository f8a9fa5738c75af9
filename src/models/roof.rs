//! Roof Measurement Models
//!
//! The fused, structured view of a roof-measurement report.

use claimlens_core::{mean_confidence, ExtractedField, FieldSource};
use serde::{Deserialize, Serialize};

/// Square feet per roofing square.
pub const SQFT_PER_SQUARE: f64 = 100.0;

/// Fused extraction result for a roof-measurement report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoofMeasurementRecord {
    /// Total roof area in square feet
    pub total_area_sqft: ExtractedField<f64>,
    /// Total eave length in linear feet
    pub eave_length_ft: ExtractedField<f64>,
    /// Total rake length in linear feet
    pub rake_length_ft: ExtractedField<f64>,
    /// Combined ridge and hip length in linear feet
    pub ridge_hip_length_ft: ExtractedField<f64>,
    /// Total valley length in linear feet
    pub valley_length_ft: ExtractedField<f64>,
    /// Number of stories
    pub story_count: ExtractedField<u32>,
    /// Predominant pitch, e.g. "6/12"
    pub pitch: ExtractedField<String>,
    /// Number of roof facets
    pub facet_count: ExtractedField<u32>,
}

impl RoofMeasurementRecord {
    /// An empty record with every field missing, for failed extractions.
    pub fn empty(rationale: &str, source: FieldSource) -> Self {
        Self {
            total_area_sqft: ExtractedField::missing(rationale, source),
            eave_length_ft: ExtractedField::missing(rationale, source),
            rake_length_ft: ExtractedField::missing(rationale, source),
            ridge_hip_length_ft: ExtractedField::missing(rationale, source),
            valley_length_ft: ExtractedField::missing(rationale, source),
            story_count: ExtractedField::missing(rationale, source),
            pitch: ExtractedField::missing(rationale, source),
            facet_count: ExtractedField::missing(rationale, source),
        }
    }

    /// Whether any measurement was extracted.
    pub fn has_usable_data(&self) -> bool {
        self.total_area_sqft.is_present()
            || self.eave_length_ft.is_present()
            || self.rake_length_ft.is_present()
            || self.ridge_hip_length_ft.is_present()
            || self.valley_length_ft.is_present()
            || self.story_count.is_present()
            || self.pitch.is_present()
            || self.facet_count.is_present()
    }

    /// Confidence of every field, in declaration order.
    pub fn field_confidences(&self) -> Vec<(&'static str, f64)> {
        vec![
            ("total_area_sqft", self.total_area_sqft.confidence),
            ("eave_length_ft", self.eave_length_ft.confidence),
            ("rake_length_ft", self.rake_length_ft.confidence),
            ("ridge_hip_length_ft", self.ridge_hip_length_ft.confidence),
            ("valley_length_ft", self.valley_length_ft.confidence),
            ("story_count", self.story_count.confidence),
            ("pitch", self.pitch.confidence),
            ("facet_count", self.facet_count.confidence),
        ]
    }

    /// Mean confidence across all fields.
    pub fn aggregate_confidence(&self) -> f64 {
        let confidences: Vec<f64> = self.field_confidences().iter().map(|(_, c)| *c).collect();
        mean_confidence(&confidences)
    }

    /// Total area expressed in roofing squares, when present.
    pub fn total_area_squares(&self) -> Option<f64> {
        self.total_area_sqft.value.map(|sqft| sqft / SQFT_PER_SQUARE)
    }

    /// Pitch rise parsed from the "rise/12" notation, when present.
    pub fn pitch_rise(&self) -> Option<u32> {
        let pitch = self.pitch.value.as_deref()?;
        let rise = pitch.split('/').next()?.trim();
        rise.parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_record() {
        let record = RoofMeasurementRecord::empty("no document", FieldSource::Text);
        assert!(!record.has_usable_data());
        assert_eq!(record.total_area_squares(), None);
    }

    #[test]
    fn test_area_in_squares() {
        let mut record = RoofMeasurementRecord::empty("test", FieldSource::Text);
        record.total_area_sqft =
            ExtractedField::new(3250.0, 0.9, "summary page", FieldSource::Text);
        assert!(record.has_usable_data());
        assert!((record.total_area_squares().unwrap() - 32.5).abs() < 1e-9);
    }

    #[test]
    fn test_pitch_rise_parsing() {
        let mut record = RoofMeasurementRecord::empty("test", FieldSource::Text);
        record.pitch = ExtractedField::new("8/12".to_string(), 0.8, "diagram", FieldSource::Vision);
        assert_eq!(record.pitch_rise(), Some(8));

        record.pitch = ExtractedField::new("steep".to_string(), 0.4, "guess", FieldSource::Vision);
        assert_eq!(record.pitch_rise(), None);
    }

    #[test]
    fn test_aggregate_confidence_mixed() {
        let mut record = RoofMeasurementRecord::empty("test", FieldSource::Text);
        record.eave_length_ft = ExtractedField::new(150.0, 0.8, "table", FieldSource::Text);
        let aggregate = record.aggregate_confidence();
        assert!(aggregate > 0.0 && aggregate < 0.2);
    }
}
