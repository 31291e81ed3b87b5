//! Tabular file parsing
//!
//! Converts raw bytes from a CSV file or a spreadsheet workbook into an ordered sequence of
//! [`Record`]s. Workbooks are read with calamine (xlsx, xls, xlsb, ods) and only the first
//! sheet is used. CSV goes through the csv crate with flexible row lengths.
//!
//! Header text is taken verbatim: no trimming and no case folding, so rule lookups must use
//! the exact header spelling.

use calamine::{Data, Ods, Reader, Sheets, Xls, Xlsb, Xlsx, open_workbook_auto_from_rs};
use chrono::{NaiveDate, TimeDelta};
use csv::ReaderBuilder;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{Cursor, Read, Seek};
use std::path::Path;
use tracing::debug;

use crate::error::{ParseError, ParseResult};
use crate::record::{CellValue, Record};

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const CFB_MAGIC: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

/// Encoding hint for a tabular source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    Csv,
    Xlsx,
    Xls,
    Xlsb,
    Ods,
    /// Detect from the leading bytes
    Auto,
}

impl SourceFormat {
    /// Pick a format from a file extension, falling back to detection
    pub fn from_path(path: &Path) -> Self {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(Self::from_extension)
            .unwrap_or(SourceFormat::Auto)
    }

    pub fn from_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "csv" | "txt" => SourceFormat::Csv,
            "xlsx" | "xlsm" => SourceFormat::Xlsx,
            "xls" => SourceFormat::Xls,
            "xlsb" => SourceFormat::Xlsb,
            "ods" => SourceFormat::Ods,
            _ => SourceFormat::Auto,
        }
    }

    /// Guess the container from magic bytes. Anything that is not a ZIP or CFB container
    /// is treated as delimited text.
    pub fn sniff(bytes: &[u8]) -> Self {
        if bytes.starts_with(ZIP_MAGIC) {
            SourceFormat::Xlsx
        } else if bytes.starts_with(CFB_MAGIC) {
            SourceFormat::Xls
        } else {
            SourceFormat::Csv
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SourceFormat::Csv => "csv",
            SourceFormat::Xlsx => "xlsx",
            SourceFormat::Xls => "xls",
            SourceFormat::Xlsb => "xlsb",
            SourceFormat::Ods => "ods",
            SourceFormat::Auto => "auto",
        }
    }
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw file contents plus the metadata the dispatcher reports back
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub name: String,
    pub size: u64,
    pub format: SourceFormat,
    pub bytes: Vec<u8>,
}

impl SourceFile {
    /// Wrap in-memory bytes; the format hint comes from the name's extension
    pub fn from_bytes(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let name = name.into();
        Self {
            format: SourceFormat::from_path(Path::new(&name)),
            size: bytes.len() as u64,
            name,
            bytes,
        }
    }

    /// Read a file from disk without blocking the runtime
    pub async fn read(path: &Path) -> ParseResult<Self> {
        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        Ok(Self {
            name,
            size: bytes.len() as u64,
            format: SourceFormat::from_path(path),
            bytes,
        })
    }

    pub fn parse(&self) -> ParseResult<Vec<Record>> {
        parse(&self.bytes, self.format)
    }
}

/// Read and parse a file, using its extension as the format hint
pub async fn parse_file(path: &Path) -> ParseResult<Vec<Record>> {
    let source = SourceFile::read(path).await?;
    tokio::task::spawn_blocking(move || source.parse())
        .await
        .map_err(|e| ParseError::unreadable(SourceFormat::from_path(path).as_str(), e))?
}

/// Parse raw bytes into records using `hint` as the preferred format.
///
/// When the hinted format cannot decode the bytes, the content decides the fallback:
/// delimited text is read as CSV and any ZIP or CFB container is tried as every workbook
/// format calamine knows. [`ParseError::UnreadableSource`] means neither attempt worked.
pub fn parse(bytes: &[u8], hint: SourceFormat) -> ParseResult<Vec<Record>> {
    let detected = SourceFormat::sniff(bytes);
    // A container is never delimited text, whatever its name says
    let preferred = match (hint, detected) {
        (SourceFormat::Auto, _) | (SourceFormat::Csv, SourceFormat::Xlsx | SourceFormat::Xls) => {
            detected
        }
        (other, _) => other,
    };
    let fallback = match detected {
        SourceFormat::Csv => SourceFormat::Csv,
        _ => SourceFormat::Auto,
    };

    match parse_as(bytes, preferred) {
        Err(error @ ParseError::UnreadableSource { .. }) if fallback != preferred => {
            debug!(
                hint = %preferred,
                fallback = %fallback,
                %error,
                "preferred format failed, retrying"
            );
            // Report the preferred format's failure when nothing else can read the bytes
            parse_as(bytes, fallback).map_err(|fallback_error| match fallback_error {
                ParseError::UnreadableSource { .. } => error,
                other => other,
            })
        }
        result => result,
    }
}

fn parse_as(bytes: &[u8], format: SourceFormat) -> ParseResult<Vec<Record>> {
    let cursor = Cursor::new(bytes.to_vec());
    match format {
        SourceFormat::Csv => parse_csv(bytes),
        SourceFormat::Xlsx => {
            let workbook: Xlsx<_> =
                Xlsx::new(cursor).map_err(|e| ParseError::unreadable(format.as_str(), e))?;
            read_first_sheet(workbook, format)
        }
        SourceFormat::Xls => {
            let workbook: Xls<_> =
                Xls::new(cursor).map_err(|e| ParseError::unreadable(format.as_str(), e))?;
            read_first_sheet(workbook, format)
        }
        SourceFormat::Xlsb => {
            let workbook: Xlsb<_> =
                Xlsb::new(cursor).map_err(|e| ParseError::unreadable(format.as_str(), e))?;
            read_first_sheet(workbook, format)
        }
        SourceFormat::Ods => {
            let workbook: Ods<_> =
                Ods::new(cursor).map_err(|e| ParseError::unreadable(format.as_str(), e))?;
            read_first_sheet(workbook, format)
        }
        SourceFormat::Auto => {
            let workbook: Sheets<_> = open_workbook_auto_from_rs(cursor)
                .map_err(|e| ParseError::unreadable(format.as_str(), e))?;
            read_first_sheet(workbook, format)
        }
    }
}

fn parse_csv(bytes: &[u8]) -> ParseResult<Vec<Record>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(bytes);

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| ParseError::unreadable("csv", e))?
        .iter()
        .map(str::to_string)
        .collect();

    let mut records = Vec::new();
    for result in reader.records() {
        let row = result.map_err(|e| ParseError::unreadable("csv", e))?;
        let mut record = Record::new();

        for (col_idx, header) in headers.iter().enumerate() {
            if header.is_empty() {
                continue;
            }
            let value = match row.get(col_idx) {
                Some(text) if !text.is_empty() => CellValue::Text(text.to_string()),
                _ => CellValue::Empty,
            };
            record.insert(header.clone(), value);
        }

        if record.is_blank_row() {
            continue;
        }
        records.push(record);
    }

    if records.is_empty() {
        return Err(ParseError::EmptySource);
    }
    Ok(records)
}

fn read_first_sheet<RS, R>(mut workbook: R, format: SourceFormat) -> ParseResult<Vec<Record>>
where
    RS: Read + Seek,
    R: Reader<RS>,
    R::Error: fmt::Display,
{
    let sheet_name = workbook
        .sheet_names()
        .into_iter()
        .next()
        .ok_or_else(|| ParseError::unreadable(format.as_str(), "no sheets found in file"))?;

    let range = workbook
        .worksheet_range(&sheet_name)
        .map_err(|e| ParseError::unreadable(format.as_str(), e))?;

    let mut rows = range.rows();
    let Some(header_row) = rows.next() else {
        return Err(ParseError::EmptySource);
    };
    let headers: Vec<String> = header_row.iter().map(|cell| cell.to_string()).collect();

    let mut records = Vec::new();
    for data_row in rows {
        let mut record = Record::new();

        for (col_idx, header) in headers.iter().enumerate() {
            if header.is_empty() {
                continue;
            }
            let value = data_row.get(col_idx).map(cell_value).unwrap_or_default();
            record.insert(header.clone(), value);
        }

        if record.is_blank_row() {
            continue;
        }
        records.push(record);
    }

    debug!(sheet = %sheet_name, rows = records.len(), "parsed first worksheet");

    if records.is_empty() {
        return Err(ParseError::EmptySource);
    }
    Ok(records)
}

fn cell_value(cell: &Data) -> CellValue {
    match cell {
        Data::Empty => CellValue::Empty,
        Data::String(text) if text.is_empty() => CellValue::Empty,
        Data::String(text) => CellValue::Text(text.clone()),
        Data::Float(value) => CellValue::Number(*value),
        Data::Int(value) => CellValue::Number(*value as f64),
        Data::Bool(flag) => CellValue::Bool(*flag),
        Data::DateTime(datetime) => {
            let serial = datetime.as_f64();
            match excel_serial_to_iso(serial) {
                Some(iso) => CellValue::Text(iso),
                None => CellValue::Number(serial),
            }
        }
        Data::DateTimeIso(text) | Data::DurationIso(text) => CellValue::Text(text.clone()),
        Data::Error(error) => CellValue::Text(error.to_string()),
    }
}

/// Convert a 1900-system spreadsheet serial date into `YYYY-MM-DDTHH:MM:SS`
fn excel_serial_to_iso(serial: f64) -> Option<String> {
    if !serial.is_finite() {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let millis = (serial * 86_400_000.0).round() as i64;
    let datetime = epoch.checked_add_signed(TimeDelta::try_milliseconds(millis)?)?;
    Some(datetime.format("%Y-%m-%dT%H:%M:%S").to_string())
}
