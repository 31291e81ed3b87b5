//! Integration tests for spreadsheet uploads
//!
//! Workbooks are assembled in memory so every cell type is known up front:
//! - typed cells (numbers, dates, blanks) from xlsx
//! - first-sheet selection and empty sheets
//! - content detection when the name does not match the container

mod common;

use std::time::Duration;
use tokio_test::assert_ok;

use common::test_helpers::{
    FixtureSheet, RTIS_HEADER, SheetCell, UploadFixtures, ods_bytes, text_row, xlsx_bytes,
};
use validate_tabular::{
    CellValue, Dispatcher, ParseError, SchemaId, SourceFormat, UploadSession, UploadStatus,
    parse, parse_file, validate,
};

// 2024-03-01 10:15:00
const EVENT_SERIAL: f64 = 45352.42708333333;

fn cms_sheet(name: &str) -> FixtureSheet {
    FixtureSheet::new(
        name,
        vec![
            text_row(&["case_id", "case_number", "assigned_to", "opened"]),
            vec![
                "C-1".into(),
                SheetCell::Number(17.0),
                "asha".into(),
                SheetCell::Date(EVENT_SERIAL),
            ],
            vec![SheetCell::Blank; 4],
            vec![
                "C-2".into(),
                SheetCell::Number(18.5),
                "ravi".into(),
                SheetCell::Blank,
            ],
        ],
    )
}

fn rtis_sheet(device_id: f64) -> FixtureSheet {
    FixtureSheet::new(
        "RTIS",
        vec![
            text_row(&RTIS_HEADER.split(',').collect::<Vec<_>>()),
            vec![
                SheetCell::Number(1.0),
                SheetCell::Number(device_id),
                SheetCell::Number(56789.0),
                SheetCell::Number(28.61),
                SheetCell::Number(77.2),
                "NDLS".into(),
                SheetCell::Date(EVENT_SERIAL),
                "ARR".into(),
                SheetCell::Number(45.0),
                "DLI".into(),
                SheetCell::Date(EVENT_SERIAL + 1.0 / 1440.0),
            ],
        ],
    )
}

#[test]
fn test_xlsx_cells_keep_their_types() {
    let bytes = xlsx_bytes(&[cms_sheet("Cases")]);
    let records = assert_ok!(parse(&bytes, SourceFormat::Xlsx));

    // The all-blank row between the two cases is skipped
    assert_eq!(records.len(), 2);

    let first = &records[0];
    assert_eq!(first.get("case_id"), Some(&CellValue::from("C-1")));
    assert_eq!(first.get("case_number"), Some(&CellValue::Number(17.0)));
    assert_eq!(
        first.get("opened"),
        Some(&CellValue::from("2024-03-01T10:15:00"))
    );

    let second = &records[1];
    assert_eq!(second.get("case_number"), Some(&CellValue::Number(18.5)));
    assert_eq!(second.get("opened"), Some(&CellValue::Empty));
    assert_eq!(
        second.columns().collect::<Vec<_>>(),
        vec!["case_id", "case_number", "assigned_to", "opened"]
    );
}

#[test]
fn test_only_the_first_sheet_is_read() {
    let notes = FixtureSheet::new(
        "Notes",
        vec![text_row(&["note"]), text_row(&["ignore me"])],
    );
    let bytes = xlsx_bytes(&[cms_sheet("Cases"), notes]);

    let records = assert_ok!(parse(&bytes, SourceFormat::Xlsx));
    assert_eq!(records.len(), 2);
    assert!(records[0].contains_column("case_id"));
    assert!(!records[0].contains_column("note"));
}

#[test]
fn test_header_only_and_empty_sheets_are_empty_sources() {
    let header_only = xlsx_bytes(&[FixtureSheet::new(
        "Cases",
        vec![text_row(&["case_id", "case_number", "assigned_to"])],
    )]);
    assert!(matches!(
        parse(&header_only, SourceFormat::Xlsx),
        Err(ParseError::EmptySource)
    ));

    let no_cells = xlsx_bytes(&[FixtureSheet::new("Cases", Vec::new())]);
    assert!(matches!(
        parse(&no_cells, SourceFormat::Auto),
        Err(ParseError::EmptySource)
    ));
}

#[test]
fn test_numeric_device_id_from_workbook_is_digit_checked() {
    let bytes = xlsx_bytes(&[rtis_sheet(1234.0)]);
    let records = assert_ok!(parse(&bytes, SourceFormat::Xlsx));
    assert_eq!(records[0].get("Device Id"), Some(&CellValue::Number(1234.0)));
    let verdict = validate("RTIS", &records);
    assert!(verdict.is_valid, "{:?}", verdict.errors);

    let bytes = xlsx_bytes(&[rtis_sheet(123.0)]);
    let records = assert_ok!(parse(&bytes, SourceFormat::Xlsx));
    let verdict = validate("RTIS", &records);
    assert_eq!(
        verdict.errors,
        vec!["Row 2: 'Device Id' must be exactly 4 digits"]
    );
}

#[test]
fn test_ods_is_detected_whatever_the_hint() {
    let bytes = ods_bytes(&[cms_sheet("Cases")]);

    for hint in [
        SourceFormat::Ods,
        SourceFormat::Auto,
        SourceFormat::Csv,
        SourceFormat::Xlsx,
    ] {
        let records = parse(&bytes, hint)
            .unwrap_or_else(|e| panic!("hint {} failed: {}", hint, e));
        assert_eq!(records.len(), 2, "hint {}", hint);
        assert_eq!(records[0].get("case_number"), Some(&CellValue::Number(17.0)));
    }
}

#[tokio::test]
async fn test_misnamed_workbooks_are_parsed_from_disk() {
    let fixtures = UploadFixtures::new();

    let no_extension = fixtures
        .write_bytes("cms_upload", &ods_bytes(&[cms_sheet("Cases")]))
        .await;
    let records = assert_ok!(parse_file(&no_extension).await);
    assert_eq!(records.len(), 2);

    let wrong_extension = fixtures
        .write_bytes("rtis.csv", &xlsx_bytes(&[rtis_sheet(1234.0)]))
        .await;
    let records = assert_ok!(parse_file(&wrong_extension).await);
    assert!(validate("RTIS", &records).is_valid);
}

#[tokio::test]
async fn test_workbook_upload_reaches_success() {
    let fixtures = UploadFixtures::new();
    let path = fixtures
        .write_bytes("rtis.xlsx", &xlsx_bytes(&[rtis_sheet(1234.0)]))
        .await;

    let mut session = UploadSession::new(Dispatcher::new(Duration::from_millis(10)));
    session.submit_file(SchemaId::Rtis, path).await;
    session.wait_all().await;

    let slot = session.state().slot(SchemaId::Rtis);
    assert_eq!(slot.status, Some(UploadStatus::Success), "{:?}", slot.last_error);
    let processed = slot.records.as_ref().expect("records stored on success");
    assert_eq!(processed.name, "rtis.xlsx");
    assert_eq!(processed.rows, 1);
}
