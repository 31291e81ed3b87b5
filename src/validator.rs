//! Schema Validator
//!
//! Evaluates a record sequence against the [Rule Catalog](crate::catalog) entry for a schema:
//! - **Fail closed**: an empty record sequence is invalid, with a single "no data" error
//! - **Header short-circuit**: missing required columns in the first record yield one
//!   aggregated error and no row-level checks
//! - **Sampling**: only the first [`SAMPLE_ROWS`] records are evaluated
//! - **Bounded errors**: messages are collected in record order, then rule order, and
//!   truncated to the schema's error cap
//! - **Pass-through**: identifiers without a catalog entry are always valid

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use crate::catalog::{self, FieldCheck, FieldRule, MessageStyle, SAMPLE_ROWS, SchemaRules};
use crate::error::UploadError;
use crate::record::{CellValue, Record};
use crate::schema::SchemaId;

pub const NO_DATA_MESSAGE: &str = "No data found in file";

static ASCII_DIGITS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]+$").expect("static pattern"));

/// Year alone or year-month, e.g. `2024` or `2024-03`
static PARTIAL_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([0-9]{4})(?:[-/](0?[1-9]|1[0-2]))?$").expect("static pattern")
});

static FLOAT_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[+-]?(?:[0-9]+(?:\.[0-9]*)?|\.[0-9]+)(?:[eE][+-]?[0-9]+)?")
        .expect("static pattern")
});

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S%.f",
    "%Y/%m/%d %H:%M",
    "%Y/%m/%dT%H:%M:%S%.f",
    "%Y/%m/%dT%H:%M",
    "%m/%d/%Y %H:%M:%S%.f",
    "%m/%d/%Y %H:%M",
    "%m/%d/%Y %I:%M:%S %p",
    "%m/%d/%Y %I:%M %p",
    "%d-%m-%Y %H:%M:%S%.f",
    "%d-%m-%Y %H:%M",
    "%d %b %Y %H:%M:%S",
    "%b %d %Y %H:%M:%S",
    "%b %d, %Y %H:%M:%S",
    "%b %d, %Y %H:%M",
    "%b %d %Y %H:%M",
    "%d %b %Y %H:%M",
];

const OFFSET_DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f%z", "%Y-%m-%d %H:%M:%S%.f %z"];

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d-%m-%Y", "%d %b %Y", "%b %d, %Y", "%B %d, %Y",
];

/// Pass/fail result plus the capped error list for one validation run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub is_valid: bool,
    pub errors: Vec<String>,
}

impl Verdict {
    /// A verdict with no errors
    pub fn valid() -> Self {
        Self {
            is_valid: true,
            errors: Vec::new(),
        }
    }

    /// A failing verdict carrying a single message
    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            errors: vec![message.into()],
        }
    }

    /// Build a verdict from all collected errors, keeping at most `cap` of them
    fn from_errors(mut errors: Vec<String>, cap: usize) -> Self {
        let is_valid = errors.is_empty();
        errors.truncate(cap);
        Self { is_valid, errors }
    }

    /// Errors joined the way the dispatcher reports a failure reason
    pub fn reason(&self) -> String {
        self.errors.join("; ")
    }
}

/// Validate `records` against the catalog entry named by a raw schema identifier.
///
/// Identifiers with no catalog entry pass through as valid.
pub fn validate(schema_id: &str, records: &[Record]) -> Verdict {
    match catalog::lookup(schema_id) {
        Some(rules) => evaluate(rules, records),
        None => Verdict::valid(),
    }
}

/// Validate `records` against the catalog entry for a known schema
pub fn validate_schema(schema: SchemaId, records: &[Record]) -> Verdict {
    evaluate(catalog::rules_for(schema), records)
}

fn evaluate(rules: &SchemaRules, records: &[Record]) -> Verdict {
    let Some(first) = records.first() else {
        return Verdict::rejected(NO_DATA_MESSAGE);
    };

    let missing: Vec<String> = rules
        .header_columns
        .iter()
        .filter(|column| !first.contains_column(column))
        .map(|column| column.to_string())
        .collect();
    if !missing.is_empty() {
        return Verdict::rejected(UploadError::SchemaMismatch { missing }.to_string());
    }

    let errors: Vec<String> = records
        .iter()
        .take(SAMPLE_ROWS)
        .enumerate()
        .flat_map(|(index, record)| {
            // Row 1 is the header
            let row = index + 2;
            rules.rules.iter().filter_map(move |rule| {
                check_field(rule, record.get(rule.column), rules.style)
                    .map(|message| UploadError::FieldConstraint { row, message }.to_string())
            })
        })
        .collect();

    Verdict::from_errors(errors, rules.error_cap)
}

/// Evaluate one rule against one cell, returning the violation message if any
fn check_field(rule: &FieldRule, value: Option<&CellValue>, style: MessageStyle) -> Option<String> {
    let column = rule.column;
    let value = match value {
        Some(value) if !value.is_blank() => value,
        _ if rule.required => {
            return Some(match style {
                MessageStyle::Detailed => format!("'{}' is required", column),
                MessageStyle::Terse => format!("Missing or empty '{}'", column),
            });
        }
        _ => return None,
    };

    let failure = match rule.check {
        FieldCheck::Present => None,
        FieldCheck::PositiveInteger => {
            (!is_integer_where(value, |n| n > 0.0)).then(|| "must be a positive integer".to_string())
        }
        FieldCheck::NonNegativeInteger => (!is_integer_where(value, |n| n >= 0.0))
            .then(|| "must be a non-negative integer".to_string()),
        FieldCheck::FixedDigits { digits } => {
            let text = value.trimmed();
            if !ASCII_DIGITS.is_match(&text) || text.len() != digits {
                Some(format!("must be exactly {} digits", digits))
            } else if !is_integer_where(&CellValue::Text(text), |n| n > 0.0) {
                Some("must be a positive integer".to_string())
            } else {
                None
            }
        }
        FieldCheck::FloatRange { min, max } => match parse_float_prefix(value) {
            Some(number) if number >= min && number <= max => None,
            _ => Some(format!("must be a valid number between {} and {}", min, max)),
        },
        FieldCheck::Length { min, max } => {
            let length = value.trimmed().chars().count();
            (length < min || length > max)
                .then(|| format!("must be between {} and {} characters", min, max))
        }
        FieldCheck::DateTime => {
            (!is_datetime(value)).then(|| "must be a valid date-time format".to_string())
        }
        FieldCheck::OneOf { allowed, label } => {
            let text = value.to_string();
            if allowed.contains(&text.as_str()) {
                None
            } else {
                return Some(match style {
                    MessageStyle::Terse => format!("Invalid {}", label),
                    MessageStyle::Detailed => {
                        format!("'{}' must be one of {}", column, allowed.join(", "))
                    }
                });
            }
        }
    }?;

    Some(format!("'{}' {}", column, failure))
}

/// Integer-parseable (finite, no fractional part) and satisfying `bound`
fn is_integer_where(value: &CellValue, bound: impl Fn(f64) -> bool) -> bool {
    value
        .as_number()
        .is_some_and(|number| number.is_finite() && number.fract() == 0.0 && bound(number))
}

/// Leading-numeric-prefix float parse: `"12.5 N"` reads as `12.5`
fn parse_float_prefix(value: &CellValue) -> Option<f64> {
    match value {
        CellValue::Number(number) => Some(*number).filter(|n| n.is_finite()),
        CellValue::Text(text) => FLOAT_PREFIX
            .find(text.trim_start())
            .and_then(|prefix| prefix.as_str().parse::<f64>().ok()),
        CellValue::Bool(_) | CellValue::Empty => None,
    }
}

/// Permissive date-time check; numeric cells count as serial or epoch timestamps
fn is_datetime(value: &CellValue) -> bool {
    let text = match value {
        CellValue::Number(number) => return number.is_finite(),
        CellValue::Bool(_) => return true,
        CellValue::Empty => return false,
        CellValue::Text(text) => text.trim(),
    };

    DateTime::parse_from_rfc3339(text).is_ok()
        || DateTime::parse_from_rfc2822(text).is_ok()
        || OFFSET_DATETIME_FORMATS
            .iter()
            .any(|format| DateTime::parse_from_str(text, format).is_ok())
        || DATETIME_FORMATS
            .iter()
            .any(|format| NaiveDateTime::parse_from_str(text, format).is_ok())
        || DATE_FORMATS
            .iter()
            .any(|format| NaiveDate::parse_from_str(text, format).is_ok())
        || PARTIAL_DATE.is_match(text)
}
