//! Rule Catalog
//!
//! Static, read-only field rules for every upload schema. Each entry lists the header
//! columns that must exist in the first record, the ordered per-row rules, and the maximum
//! number of error messages a verdict may carry.
//!
//! Adding a schema means adding a [`SchemaId`] variant and one [`SchemaRules`] entry here.

use crate::schema::SchemaId;

/// Number of leading records evaluated against row rules
pub const SAMPLE_ROWS: usize = 10;

/// Constraint applied to a present (non-blank) cell
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldCheck {
    /// Only required-ness applies
    Present,
    /// Integer value greater than zero
    PositiveInteger,
    /// Integer value of zero or more
    NonNegativeInteger,
    /// Exactly `digits` ASCII digits, then a positive integer
    FixedDigits { digits: usize },
    /// Float within an inclusive range
    FloatRange { min: f64, max: f64 },
    /// Trimmed text length within an inclusive range
    Length { min: usize, max: usize },
    /// Anything a permissive date parser accepts
    DateTime,
    /// Exact, case-sensitive match against a fixed set
    OneOf {
        allowed: &'static [&'static str],
        label: &'static str,
    },
}

/// How violation messages are phrased for a schema
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageStyle {
    /// `'Field' is required`, `'Field' must be ...`
    Detailed,
    /// `Missing or empty 'field'`, `Invalid <label>`
    Terse,
}

/// One ordered constraint on a single column
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldRule {
    pub column: &'static str,
    pub required: bool,
    pub check: FieldCheck,
}

impl FieldRule {
    const fn required(column: &'static str, check: FieldCheck) -> Self {
        Self {
            column,
            required: true,
            check,
        }
    }

    const fn optional(column: &'static str, check: FieldCheck) -> Self {
        Self {
            column,
            required: false,
            check,
        }
    }
}

/// Catalog entry for one schema
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SchemaRules {
    pub schema: SchemaId,
    /// Columns that must appear in the first record's header
    pub header_columns: &'static [&'static str],
    pub rules: &'static [FieldRule],
    pub error_cap: usize,
    pub style: MessageStyle,
}

pub const SEVERITY_LEVELS: &[&str] = &["Low", "Medium", "High", "Critical"];
pub const DOCUMENT_STATUSES: &[&str] = &["Pending", "Approved", "Rejected", "Archived"];

static RTIS_RULES: SchemaRules = SchemaRules {
    schema: SchemaId::Rtis,
    header_columns: &[
        "Sr.No.",
        "Device Id",
        "Loco No.",
        "Lattitude",
        "Longitude",
        "Station",
        "Event Time",
        "Event Type",
        "Speed",
        "Division Code",
        "Reporting Time",
    ],
    rules: &[
        FieldRule::required("Sr.No.", FieldCheck::PositiveInteger),
        FieldRule::required("Device Id", FieldCheck::FixedDigits { digits: 4 }),
        FieldRule::required("Loco No.", FieldCheck::FixedDigits { digits: 5 }),
        FieldRule::required(
            "Lattitude",
            FieldCheck::FloatRange {
                min: -90.0,
                max: 90.0,
            },
        ),
        FieldRule::required(
            "Longitude",
            FieldCheck::FloatRange {
                min: -180.0,
                max: 180.0,
            },
        ),
        FieldRule::required("Station", FieldCheck::Length { min: 1, max: 30 }),
        FieldRule::required("Event Time", FieldCheck::DateTime),
        FieldRule::required("Event Type", FieldCheck::Length { min: 1, max: 5 }),
        FieldRule::required("Speed", FieldCheck::NonNegativeInteger),
        FieldRule::required("Division Code", FieldCheck::Length { min: 1, max: 20 }),
        FieldRule::required("Reporting Time", FieldCheck::DateTime),
    ],
    error_cap: 10,
    style: MessageStyle::Detailed,
};

static SNT_RULES: SchemaRules = SchemaRules {
    schema: SchemaId::Snt,
    header_columns: &["ticket_id", "officer_id"],
    rules: &[
        FieldRule::required("ticket_id", FieldCheck::Present),
        FieldRule::required("officer_id", FieldCheck::Present),
        FieldRule::optional(
            "severity",
            FieldCheck::OneOf {
                allowed: SEVERITY_LEVELS,
                label: "severity level",
            },
        ),
    ],
    error_cap: 5,
    style: MessageStyle::Terse,
};

static FSD_RULES: SchemaRules = SchemaRules {
    schema: SchemaId::Fsd,
    header_columns: &["file_id", "document_type"],
    rules: &[
        FieldRule::required("file_id", FieldCheck::Present),
        FieldRule::required("document_type", FieldCheck::Present),
        FieldRule::optional(
            "status",
            FieldCheck::OneOf {
                allowed: DOCUMENT_STATUSES,
                label: "status value",
            },
        ),
    ],
    error_cap: 5,
    style: MessageStyle::Terse,
};

static CMS_RULES: SchemaRules = SchemaRules {
    schema: SchemaId::Cms,
    header_columns: &["case_id", "case_number", "assigned_to"],
    rules: &[
        FieldRule::required("case_id", FieldCheck::Present),
        FieldRule::required("case_number", FieldCheck::Present),
        FieldRule::required("assigned_to", FieldCheck::Present),
    ],
    error_cap: 5,
    style: MessageStyle::Terse,
};

/// Catalog entry for a known schema
pub fn rules_for(schema: SchemaId) -> &'static SchemaRules {
    match schema {
        SchemaId::Rtis => &RTIS_RULES,
        SchemaId::Snt => &SNT_RULES,
        SchemaId::Fsd => &FSD_RULES,
        SchemaId::Cms => &CMS_RULES,
    }
}

/// Catalog entry for a raw schema identifier, `None` when no entry exists
pub fn lookup(schema_id: &str) -> Option<&'static SchemaRules> {
    schema_id.parse::<SchemaId>().ok().map(rules_for)
}
