//! Parsing and normalization of structured extraction responses.
//!
//! The extraction service is asked for a flat JSON object keyed by the
//! field schema. Anything that does not fit that shape is `Malformed`;
//! values are never coerced from other JSON types.

use chrono::{Datelike, NaiveDate, NaiveTime, Weekday};
use serde_json::Value;

use crate::adapters::ExtractionOutcome;
use crate::domain::WorkdayFields;

/// Accepted date layouts, normalized to DD/MM/YYYY
const DATE_FORMATS: [&str; 7] = [
    "%d/%m/%Y", "%d-%m-%Y", "%Y-%m-%d", "%d.%m.%Y", "%d/%m/%y", "%d-%m-%y", "%y-%m-%d",
];

/// Accepted time layouts, normalized to HH:MM
const TIME_FORMATS: [&str; 6] = ["%H:%M", "%H:%M:%S", "%I:%M %p", "%I:%M:%S %p", "%H.%M", "%I.%M %p"];

/// Parse a raw model response into workday fields
pub fn parse_extraction(content: &str, schema: &[&str]) -> ExtractionOutcome {
    let body = strip_code_fence(content);

    let value: Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(e) => return ExtractionOutcome::Malformed(format!("invalid JSON: {}", e)),
    };

    let object = match value.as_object() {
        Some(o) => o,
        None => return ExtractionOutcome::Malformed("response is not a JSON object".to_string()),
    };

    if !schema.iter().any(|name| object.contains_key(*name)) {
        return ExtractionOutcome::Malformed("response contains none of the expected fields".to_string());
    }

    let mut fields = WorkdayFields::default();
    for name in schema {
        let text = match object.get(*name) {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.trim().to_string(),
            Some(other) => {
                return ExtractionOutcome::Malformed(format!(
                    "field '{}' has non-string value {}",
                    name, other
                ))
            }
        };
        fields.set(name, text);
    }

    normalize(&mut fields);
    ExtractionOutcome::Fields(fields)
}

/// Remove a surrounding markdown code fence, if any
pub fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let without_open = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    without_open
        .strip_suffix("```")
        .unwrap_or(without_open)
        .trim()
}

/// Normalize dates and times, and derive the weekday from the date
fn normalize(fields: &mut WorkdayFields) {
    if let Some(date) = parse_date(&fields.date) {
        fields.date = date.format("%d/%m/%Y").to_string();
        fields.day = hebrew_day(date.weekday()).to_string();
    }
    if let Some(date) = parse_date(&fields.recording_date) {
        fields.recording_date = date.format("%d/%m/%Y").to_string();
    }
    fields.start_time = format_time(&fields.start_time);
    fields.end_time = format_time(&fields.end_time);
}

/// Parse a date in any accepted layout
pub fn parse_date(input: &str) -> Option<NaiveDate> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }

    DATE_FORMATS.iter().find_map(|fmt| {
        NaiveDate::parse_from_str(input, fmt)
            .ok()
            // "%Y" happily reads "25" as year 25; leave that to the "%y" layouts
            .filter(|d| d.year() >= 1000)
    })
}

/// Normalize a time to HH:MM, returning the input unchanged if unrecognized
pub fn format_time(input: &str) -> String {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(trimmed, fmt).ok())
        .map(|t| t.format("%H:%M").to_string())
        .unwrap_or_else(|| trimmed.to_string())
}

/// Hebrew weekday name
pub fn hebrew_day(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Sun => "ראשון",
        Weekday::Mon => "שני",
        Weekday::Tue => "שלישי",
        Weekday::Wed => "רביעי",
        Weekday::Thu => "חמישי",
        Weekday::Fri => "שישי",
        Weekday::Sat => "שבת",
    }
}
