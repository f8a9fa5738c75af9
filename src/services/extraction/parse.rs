//! Response Parsing
//!
//! Parses provider responses into typed payloads. A response that is not in
//! the expected structured form triggers a degraded fallback parse within the
//! same attempt (line-splitting) rather than consuming a retry.

use claimlens_core::{CoreError, CoreResult, ExtractedField, FieldSource};
use serde::Deserialize;
use tracing::debug;

use crate::models::LineItem;

/// Confidence assigned to values recovered by the degraded fallback parse.
pub const FALLBACK_PARSE_CONFIDENCE: f64 = 0.3;

/// One field payload as requested from the provider.
#[derive(Debug, Clone, Deserialize)]
pub struct FieldPayload {
    /// The extracted value (string or number), null when absent
    pub value: Option<serde_json::Value>,
    /// Provider's self-reported confidence
    pub confidence: Option<f64>,
    /// Provider's reasoning
    pub rationale: Option<String>,
}

/// Line-item list payload as requested from the provider.
#[derive(Debug, Clone, Deserialize)]
pub struct LineItemsPayload {
    /// The items
    #[serde(default)]
    pub line_items: Vec<LineItemPayload>,
    /// Provider's self-reported confidence
    pub confidence: Option<f64>,
}

/// One line item as returned by the provider.
#[derive(Debug, Clone, Deserialize)]
pub struct LineItemPayload {
    pub description: String,
    pub quantity: Option<serde_json::Value>,
    pub unit: Option<String>,
    pub unit_price: Option<serde_json::Value>,
    pub total: Option<serde_json::Value>,
}

impl LineItemPayload {
    /// Convert into the domain line item; items without a quantity default
    /// to 1 EA rather than being dropped.
    pub fn into_line_item(self) -> LineItem {
        LineItem {
            description: self.description,
            quantity: self.quantity.as_ref().and_then(coerce_f64).unwrap_or(1.0),
            unit: self.unit.unwrap_or_else(|| "EA".to_string()),
            unit_price: self.unit_price.as_ref().and_then(coerce_f64),
            total: self.total.as_ref().and_then(coerce_f64),
        }
    }
}

/// Extract the JSON object from a provider response.
///
/// Tolerates surrounding prose and markdown code fences; fails when no
/// object can be located or parsed.
pub fn extract_json_object(content: &str) -> CoreResult<serde_json::Value> {
    let trimmed = content.trim();

    // Fast path: the whole response is the object.
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) {
        if value.is_object() {
            return Ok(value);
        }
    }

    // Locate the outermost braces and try again.
    let start = trimmed.find('{');
    let end = trimmed.rfind('}');
    if let (Some(start), Some(end)) = (start, end) {
        if start < end {
            let candidate = &trimmed[start..=end];
            if let Ok(value) = serde_json::from_str::<serde_json::Value>(candidate) {
                if value.is_object() {
                    return Ok(value);
                }
            }
        }
    }

    Err(CoreError::parse("response contained no parseable JSON object"))
}

/// Parse a per-field response into an `ExtractedField`.
///
/// On a parse failure, degrades to taking the first non-empty line as a
/// string value at `FALLBACK_PARSE_CONFIDENCE` with `Fallback` provenance.
pub fn parse_field_response(content: &str, source: FieldSource) -> ExtractedField<serde_json::Value> {
    match extract_json_object(content)
        .and_then(|v| serde_json::from_value::<FieldPayload>(v).map_err(CoreError::from))
    {
        Ok(payload) => {
            let rationale = payload
                .rationale
                .unwrap_or_else(|| "no rationale given".to_string());
            ExtractedField::from_option(
                payload.value.filter(|v| !v.is_null()),
                payload.confidence.unwrap_or(0.5),
                rationale,
                source,
            )
        }
        Err(e) => {
            debug!(error = %e, "field response not structured, using fallback parse");
            fallback_field_parse(content)
        }
    }
}

/// Degraded line-splitting parse for an unstructured field response.
fn fallback_field_parse(content: &str) -> ExtractedField<serde_json::Value> {
    let first_line = content
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && *line != "```" && !line.starts_with("```"));

    match first_line {
        Some(line) => ExtractedField::new(
            serde_json::Value::String(line.to_string()),
            FALLBACK_PARSE_CONFIDENCE,
            "recovered from unstructured response by line splitting",
            FieldSource::Fallback,
        ),
        None => ExtractedField::missing("response was empty", FieldSource::Fallback),
    }
}

/// Parse a line-items response.
///
/// On a parse failure, degrades to a line-splitting parse that recognizes
/// `description  quantity  unit` rows.
pub fn parse_line_items_response(
    content: &str,
    source: FieldSource,
) -> ExtractedField<Vec<LineItem>> {
    match extract_json_object(content)
        .and_then(|v| serde_json::from_value::<LineItemsPayload>(v).map_err(CoreError::from))
    {
        Ok(payload) => {
            let confidence = payload.confidence.unwrap_or(0.6);
            let items: Vec<LineItem> = payload
                .line_items
                .into_iter()
                .map(LineItemPayload::into_line_item)
                .collect();
            ExtractedField::new(items, confidence, "parsed structured line items", source)
        }
        Err(e) => {
            debug!(error = %e, "line items response not structured, using fallback parse");
            fallback_line_items_parse(content)
        }
    }
}

/// Degraded parse: one item per line matching `description qty UNIT`.
fn fallback_line_items_parse(content: &str) -> ExtractedField<Vec<LineItem>> {
    let row =
        regex::Regex::new(r"^(?P<desc>.+?)\s{2,}(?P<qty>[\d,]+(?:\.\d+)?)\s+(?P<unit>[A-Za-z]{1,4})\s*$")
            .expect("valid line item regex");

    let items: Vec<LineItem> = content
        .lines()
        .filter_map(|line| {
            let caps = row.captures(line.trim_end())?;
            let quantity: f64 = caps["qty"].replace(',', "").parse().ok()?;
            Some(LineItem::new(caps["desc"].trim(), quantity, caps["unit"].to_uppercase()))
        })
        .collect();

    if items.is_empty() {
        ExtractedField::new(
            Vec::new(),
            0.0,
            "no line items recoverable from unstructured response",
            FieldSource::Fallback,
        )
    } else {
        ExtractedField::new(
            items,
            FALLBACK_PARSE_CONFIDENCE,
            "recovered line items by line splitting",
            FieldSource::Fallback,
        )
    }
}

/// Read one field payload out of a vision-record object.
///
/// The vision path returns a single object keyed by field name; a missing or
/// malformed key degrades to a missing field rather than failing the record.
pub fn field_from_value(
    value: Option<&serde_json::Value>,
    source: FieldSource,
) -> ExtractedField<serde_json::Value> {
    let Some(value) = value else {
        return ExtractedField::missing("field absent from response", source);
    };

    match serde_json::from_value::<FieldPayload>(value.clone()) {
        Ok(payload) => {
            let rationale = payload
                .rationale
                .unwrap_or_else(|| "no rationale given".to_string());
            ExtractedField::from_option(
                payload.value.filter(|v| !v.is_null()),
                payload.confidence.unwrap_or(0.5),
                rationale,
                source,
            )
        }
        Err(e) => ExtractedField::missing(format!("field payload malformed: {e}"), source),
    }
}

/// Read the line-item list out of a vision-record object.
pub fn line_items_from_value(
    value: Option<&serde_json::Value>,
    source: FieldSource,
) -> ExtractedField<Vec<LineItem>> {
    let Some(value) = value else {
        return ExtractedField::missing("line items absent from response", source);
    };

    match serde_json::from_value::<LineItemsPayload>(value.clone()) {
        Ok(payload) => {
            let confidence = payload.confidence.unwrap_or(0.6);
            let items: Vec<LineItem> = payload
                .line_items
                .into_iter()
                .map(LineItemPayload::into_line_item)
                .collect();
            ExtractedField::new(items, confidence, "parsed structured line items", source)
        }
        Err(e) => ExtractedField::missing(format!("line items payload malformed: {e}"), source),
    }
}

/// Coerce a JSON value to f64, accepting numbers and currency-formatted
/// strings ("$18,432.10").
pub fn coerce_f64(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => {
            let cleaned: String = s
                .chars()
                .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
                .collect();
            cleaned.parse().ok()
        }
        _ => None,
    }
}

/// Coerce a JSON value to u32.
pub fn coerce_u32(value: &serde_json::Value) -> Option<u32> {
    coerce_f64(value).and_then(|f| {
        if f >= 0.0 && f.fract() == 0.0 {
            Some(f as u32)
        } else {
            None
        }
    })
}

/// Coerce a JSON value to a trimmed, non-empty string.
pub fn coerce_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
