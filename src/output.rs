//! Session Output and Reporting
//!
//! Renders the upload session for the terminal or as JSON.

use serde::Serialize;

use crate::aggregator::{Slot, StatusIndicator, UploadState, UploadStatus};
use crate::cli::{OutputFormat, VerbosityLevel};
use crate::error::Result;
use crate::schema::SchemaId;

/// Output formatter for the session summary
pub struct Output {
    format: OutputFormat,
    verbosity: VerbosityLevel,
    show_colors: bool,
}

/// Machine-readable view of one slot
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotReport {
    pub schema: SchemaId,
    pub status: Option<UploadStatus>,
    pub file: Option<String>,
    pub rows: Option<usize>,
    pub errors: Vec<String>,
}

/// Machine-readable view of the whole session
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionReport {
    pub all_submitted: bool,
    pub all_succeeded: bool,
    pub slots: Vec<SlotReport>,
}

impl SessionReport {
    pub fn from_state(state: &UploadState) -> Self {
        Self {
            all_submitted: state.all_submitted(),
            all_succeeded: state.all_succeeded(),
            slots: state
                .slots()
                .map(|(schema, slot)| SlotReport {
                    schema,
                    status: slot.status,
                    file: slot.file.as_ref().map(|file| file.name.clone()),
                    rows: slot.records.as_ref().map(|records| records.rows),
                    errors: split_reason(slot),
                })
                .collect(),
        }
    }
}

/// Individual messages of the slot's last failure
fn split_reason(slot: &Slot) -> Vec<String> {
    slot.last_error
        .as_deref()
        .map(|reason| reason.split("; ").map(str::to_string).collect())
        .unwrap_or_default()
}

impl Output {
    pub fn new(format: OutputFormat, verbosity: VerbosityLevel) -> Self {
        Self {
            format,
            verbosity,
            show_colors: atty::is(atty::Stream::Stdout),
        }
    }

    /// Force colors on or off
    pub fn with_colors(mut self, show_colors: bool) -> Self {
        self.show_colors = show_colors;
        self
    }

    fn colorize(&self, text: &str, color: &str) -> String {
        if self.show_colors {
            format!("\x1b[{}m{}\x1b[0m", color, text)
        } else {
            text.to_string()
        }
    }

    pub fn render(&self, state: &UploadState) -> Result<String> {
        match self.format {
            OutputFormat::Human => Ok(self.format_session(state)),
            OutputFormat::Json => {
                let mut json = serde_json::to_string_pretty(&SessionReport::from_state(state))?;
                json.push('\n');
                Ok(json)
            }
        }
    }

    pub fn format_session(&self, state: &UploadState) -> String {
        let mut output = String::new();

        if self.verbosity > VerbosityLevel::Quiet {
            for (schema, slot) in state.slots() {
                output.push_str(&self.format_slot(schema, slot));
                output.push('\n');
            }
            output.push('\n');
        }

        output.push_str(&self.format_summary(state));
        output.push('\n');
        output
    }

    pub fn format_slot(&self, schema: SchemaId, slot: &Slot) -> String {
        let indicator = slot.indicator();
        let marker = self.colorize(
            &format!("{} {:<10}", indicator.symbol, indicator.label),
            indicator.color,
        );
        let mut line = format!("{:<4}  {}", schema.as_str(), marker);

        if let Some(file) = &slot.file {
            line.push_str(&format!("  {}", file.name));
        }

        match (&slot.records, slot.status) {
            (Some(records), _) => {
                line.push_str(&format!(
                    " ({} row{})",
                    records.rows,
                    if records.rows == 1 { "" } else { "s" }
                ));
            }
            (None, Some(UploadStatus::Error)) => {
                let errors = split_reason(slot);
                if self.verbosity >= VerbosityLevel::Verbose {
                    for error in &errors {
                        line.push_str(&format!("\n    {}", error));
                    }
                } else if let Some(reason) = &slot.last_error {
                    line.push_str(&format!(" - {}", reason));
                }
            }
            (None, _) => {}
        }

        line
    }

    fn format_summary(&self, state: &UploadState) -> String {
        let succeeded = state
            .slots()
            .filter(|(_, slot)| slot.status == Some(UploadStatus::Success))
            .count();
        let total = SchemaId::ALL.len();

        if state.all_succeeded() {
            self.colorize(
                &format!("All {} uploads validated, ready for processing", total),
                StatusIndicator::for_status(Some(UploadStatus::Success)).color,
            )
        } else {
            format!("{}/{} uploads validated", succeeded, total)
        }
    }
}
