//! Estimate Models
//!
//! The fused, structured view of an insurance damage estimate: named header
//! fields plus the line-item list, every value wrapped in `ExtractedField`.

use claimlens_core::{mean_confidence, ExtractedField, FieldSource};
use serde::{Deserialize, Serialize};

/// One line item on an estimate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    /// Item description, e.g. "Remove & replace laminated shingles"
    pub description: String,
    /// Quantity in the item's unit
    pub quantity: f64,
    /// Unit of measure, e.g. "SQ", "LF", "EA"
    pub unit: String,
    /// Price per unit, when stated
    pub unit_price: Option<f64>,
    /// Extended total, when stated
    pub total: Option<f64>,
}

impl LineItem {
    /// Create a line item without pricing.
    pub fn new(description: impl Into<String>, quantity: f64, unit: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            quantity,
            unit: unit.into(),
            unit_price: None,
            total: None,
        }
    }

    /// Attach pricing.
    pub fn with_pricing(mut self, unit_price: f64, total: f64) -> Self {
        self.unit_price = Some(unit_price);
        self.total = Some(total);
        self
    }

    /// Whether the description mentions any of the given keywords
    /// (case-insensitive).
    pub fn mentions_any(&self, keywords: &[&str]) -> bool {
        let description = self.description.to_lowercase();
        keywords.iter().any(|k| description.contains(&k.to_lowercase()))
    }
}

/// Fused extraction result for a damage estimate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EstimateRecord {
    /// Property street address
    pub property_address: ExtractedField<String>,
    /// Carrier claim number
    pub claim_number: ExtractedField<String>,
    /// Insurance carrier name
    pub carrier: ExtractedField<String>,
    /// Date of loss, as printed on the estimate
    pub date_of_loss: ExtractedField<String>,
    /// Total replacement cost value
    pub total_rcv: ExtractedField<f64>,
    /// Total actual cash value
    pub total_acv: ExtractedField<f64>,
    /// Policy deductible
    pub deductible: ExtractedField<f64>,
    /// The estimate's line items (all-or-nothing collection)
    pub line_items: ExtractedField<Vec<LineItem>>,
}

impl EstimateRecord {
    /// An empty record with every field missing, for failed extractions.
    pub fn empty(rationale: &str, source: FieldSource) -> Self {
        Self {
            property_address: ExtractedField::missing(rationale, source),
            claim_number: ExtractedField::missing(rationale, source),
            carrier: ExtractedField::missing(rationale, source),
            date_of_loss: ExtractedField::missing(rationale, source),
            total_rcv: ExtractedField::missing(rationale, source),
            total_acv: ExtractedField::missing(rationale, source),
            deductible: ExtractedField::missing(rationale, source),
            line_items: ExtractedField::missing(rationale, source),
        }
    }

    /// The line items, or an empty slice when the collection is missing.
    pub fn items(&self) -> &[LineItem] {
        self.line_items.value.as_deref().unwrap_or(&[])
    }

    /// Whether any extracted data is usable: at least one header field or a
    /// non-empty line-item list.
    pub fn has_usable_data(&self) -> bool {
        self.property_address.is_present()
            || self.claim_number.is_present()
            || self.carrier.is_present()
            || self.date_of_loss.is_present()
            || self.total_rcv.is_present()
            || self.total_acv.is_present()
            || self.deductible.is_present()
            || !self.items().is_empty()
    }

    /// Confidence of every field, in declaration order.
    pub fn field_confidences(&self) -> Vec<(&'static str, f64)> {
        vec![
            ("property_address", self.property_address.confidence),
            ("claim_number", self.claim_number.confidence),
            ("carrier", self.carrier.confidence),
            ("date_of_loss", self.date_of_loss.confidence),
            ("total_rcv", self.total_rcv.confidence),
            ("total_acv", self.total_acv.confidence),
            ("deductible", self.deductible.confidence),
            ("line_items", self.line_items.confidence),
        ]
    }

    /// Mean confidence across all fields.
    pub fn aggregate_confidence(&self) -> f64 {
        let confidences: Vec<f64> = self.field_confidences().iter().map(|(_, c)| *c).collect();
        mean_confidence(&confidences)
    }

    /// Sum of quantities over line items whose unit matches (case-insensitive).
    pub fn total_quantity_for_unit(&self, unit: &str) -> f64 {
        self.items()
            .iter()
            .filter(|item| item.unit.eq_ignore_ascii_case(unit))
            .map(|item| item.quantity)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_record_has_no_usable_data() {
        let record = EstimateRecord::empty("extraction failed", FieldSource::Text);
        assert!(!record.has_usable_data());
        assert_eq!(record.aggregate_confidence(), 0.0);
    }

    #[test]
    fn test_single_field_makes_data_usable() {
        let mut record = EstimateRecord::empty("partial", FieldSource::Text);
        record.claim_number =
            ExtractedField::new("CLM-2024-0142".to_string(), 0.9, "header match", FieldSource::Text);
        assert!(record.has_usable_data());
        assert!(record.aggregate_confidence() > 0.0);
    }

    #[test]
    fn test_line_item_keyword_match() {
        let item = LineItem::new("Asphalt starter course - universal", 150.0, "LF");
        assert!(item.mentions_any(&["starter"]));
        assert!(!item.mentions_any(&["ridge", "valley"]));
    }

    #[test]
    fn test_total_quantity_for_unit() {
        let mut record = EstimateRecord::empty("test", FieldSource::Text);
        record.line_items = ExtractedField::new(
            vec![
                LineItem::new("Laminated shingles", 32.5, "SQ"),
                LineItem::new("Drip edge", 120.0, "LF"),
                LineItem::new("Ridge cap", 45.0, "lf"),
            ],
            0.9,
            "parsed table",
            FieldSource::Text,
        );
        assert!((record.total_quantity_for_unit("LF") - 165.0).abs() < 1e-9);
        assert!((record.total_quantity_for_unit("SQ") - 32.5).abs() < 1e-9);
        assert_eq!(record.total_quantity_for_unit("EA"), 0.0);
    }

    #[test]
    fn test_record_serialization_round_trip() {
        let mut record = EstimateRecord::empty("test", FieldSource::Text);
        record.total_rcv = ExtractedField::new(18432.10, 0.85, "totals row", FieldSource::Hybrid);
        let json = serde_json::to_string(&record).unwrap();
        let parsed: EstimateRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.total_rcv.value, Some(18432.10));
    }
}
