use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tokio::fs;
use zip::CompressionMethod;
use zip::write::{FileOptions, ZipWriter};

use validate_tabular::SchemaId;

pub const RTIS_HEADER: &str = "Sr.No.,Device Id,Loco No.,Lattitude,Longitude,Station,Event Time,Event Type,Speed,Division Code,Reporting Time";

/// CSV body that passes validation for `schema`
pub fn valid_csv(schema: SchemaId) -> String {
    match schema {
        SchemaId::Rtis => format!(
            "{}\n1,1234,56789,28.61,77.20,NDLS,2024-03-01 10:15:00,ARR,45,DLI,2024-03-01T10:16:00Z\n\
             2,0456,01234,-12.5,-45.25,BCT,03/01/2024 11:00,DEP,0,BB,2024-03-01\n",
            RTIS_HEADER
        ),
        SchemaId::Snt => {
            "ticket_id,officer_id,severity\nT-1,OF-7,High\nT-2,OF-8,\n".to_string()
        }
        SchemaId::Fsd => {
            "file_id,document_type,status\nF-1,invoice,Approved\nF-2,memo,Pending\n".to_string()
        }
        SchemaId::Cms => {
            "case_id,case_number,assigned_to\nC-1,2024/001,asha\nC-2,2024/002,ravi\n".to_string()
        }
    }
}

/// SNT upload with an empty officer and an unknown severity in row 2
pub fn invalid_snt_csv() -> &'static str {
    "ticket_id,officer_id,severity\nT-1,,Urgent\n"
}

/// Temporary directory holding upload fixtures
pub struct UploadFixtures {
    pub temp_dir: TempDir,
}

impl UploadFixtures {
    pub fn new() -> Self {
        Self {
            temp_dir: TempDir::new().expect("Failed to create temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub async fn write(&self, name: &str, contents: &str) -> PathBuf {
        self.write_bytes(name, contents.as_bytes()).await
    }

    pub async fn write_bytes(&self, name: &str, contents: &[u8]) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        fs::write(&path, contents)
            .await
            .expect("Failed to write fixture");
        path
    }

    /// One valid CSV per schema, in schema order
    pub async fn write_all_valid(&self) -> Vec<(SchemaId, PathBuf)> {
        let mut uploads = Vec::new();
        for schema in SchemaId::ALL {
            let name = format!("{}.csv", schema.as_str().to_lowercase());
            let path = self.write(&name, &valid_csv(schema)).await;
            uploads.push((schema, path));
        }
        uploads
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.temp_dir.path().join("state").join("session.json")
    }
}

/// Cell content for generated workbooks
#[derive(Debug, Clone, PartialEq)]
pub enum SheetCell {
    Blank,
    Text(String),
    Number(f64),
    /// Spreadsheet serial date rendered with a date-time number format
    Date(f64),
}

impl From<&str> for SheetCell {
    fn from(text: &str) -> Self {
        SheetCell::Text(text.to_string())
    }
}

impl From<f64> for SheetCell {
    fn from(value: f64) -> Self {
        SheetCell::Number(value)
    }
}

/// One worksheet: a name and its rows, header first
pub struct FixtureSheet {
    pub name: String,
    pub rows: Vec<Vec<SheetCell>>,
}

impl FixtureSheet {
    pub fn new(name: &str, rows: Vec<Vec<SheetCell>>) -> Self {
        Self {
            name: name.to_string(),
            rows,
        }
    }
}

/// Row of text cells
pub fn text_row(cells: &[&str]) -> Vec<SheetCell> {
    cells.iter().map(|cell| SheetCell::from(*cell)).collect()
}

fn escape_xml(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn column_name(mut index: usize) -> String {
    let mut name = Vec::new();
    loop {
        name.push(b'A' + (index % 26) as u8);
        if index < 26 {
            break;
        }
        index = index / 26 - 1;
    }
    name.reverse();
    String::from_utf8(name).expect("ascii column name")
}

fn zip_archive(entries: &[(&str, String)]) -> Vec<u8> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::<()>::default().compression_method(CompressionMethod::Stored);
    for (name, contents) in entries {
        zip.start_file(*name, options)
            .expect("Failed to start archive entry");
        zip.write_all(contents.as_bytes())
            .expect("Failed to write archive entry");
    }
    zip.finish()
        .expect("Failed to finish archive")
        .into_inner()
}

/// Minimal xlsx workbook. Text cells are inline strings; `Date` cells use style 1, which
/// carries the built-in `m/d/yy h:mm` number format.
pub fn xlsx_bytes(sheets: &[FixtureSheet]) -> Vec<u8> {
    const MAIN_NS: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
    const REL_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

    let sheet_names: Vec<String> = (1..=sheets.len())
        .map(|n| format!("xl/worksheets/sheet{}.xml", n))
        .collect();
    let mut entries = Vec::new();

    let overrides: String = (1..=sheets.len())
        .map(|n| {
            format!(
                "<Override PartName=\"/xl/worksheets/sheet{}.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml\"/>",
                n
            )
        })
        .collect();
    entries.push((
        "[Content_Types].xml",
        format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?><Types xmlns=\"http://schemas.openxmlformats.org/package/2006/content-types\"><Default Extension=\"xml\" ContentType=\"application/xml\"/><Override PartName=\"/xl/workbook.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml\"/>{}</Types>",
            overrides
        ),
    ));

    let sheet_entries: String = sheets
        .iter()
        .enumerate()
        .map(|(idx, sheet)| {
            format!(
                "<sheet name=\"{}\" sheetId=\"{}\" r:id=\"rId{}\"/>",
                escape_xml(&sheet.name),
                idx + 1,
                idx + 1
            )
        })
        .collect();
    entries.push((
        "xl/workbook.xml",
        format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?><workbook xmlns=\"{}\" xmlns:r=\"{}\"><sheets>{}</sheets></workbook>",
            MAIN_NS, REL_NS, sheet_entries
        ),
    ));

    let relationships: String = (1..=sheets.len())
        .map(|n| {
            format!(
                "<Relationship Id=\"rId{}\" Type=\"{}/worksheet\" Target=\"worksheets/sheet{}.xml\"/>",
                n, REL_NS, n
            )
        })
        .collect();
    entries.push((
        "xl/_rels/workbook.xml.rels",
        format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?><Relationships xmlns=\"http://schemas.openxmlformats.org/package/2006/relationships\">{}</Relationships>",
            relationships
        ),
    ));

    entries.push((
        "xl/styles.xml",
        format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?><styleSheet xmlns=\"{}\"><cellXfs count=\"2\"><xf numFmtId=\"0\"/><xf numFmtId=\"22\" applyNumberFormat=\"1\"/></cellXfs></styleSheet>",
            MAIN_NS
        ),
    ));

    for (sheet, path) in sheets.iter().zip(&sheet_names) {
        let mut data = String::new();
        for (row_idx, row) in sheet.rows.iter().enumerate() {
            if row.iter().all(|cell| *cell == SheetCell::Blank) {
                continue;
            }
            let row_number = row_idx + 1;
            data.push_str(&format!("<row r=\"{}\">", row_number));
            for (col_idx, cell) in row.iter().enumerate() {
                let reference = format!("{}{}", column_name(col_idx), row_number);
                match cell {
                    SheetCell::Blank => {}
                    SheetCell::Text(text) => data.push_str(&format!(
                        "<c r=\"{}\" t=\"inlineStr\"><is><t>{}</t></is></c>",
                        reference,
                        escape_xml(text)
                    )),
                    SheetCell::Number(value) => data.push_str(&format!(
                        "<c r=\"{}\"><v>{}</v></c>",
                        reference, value
                    )),
                    SheetCell::Date(serial) => data.push_str(&format!(
                        "<c r=\"{}\" s=\"1\"><v>{}</v></c>",
                        reference, serial
                    )),
                }
            }
            data.push_str("</row>");
        }
        entries.push((
            path.as_str(),
            format!(
                "<?xml version=\"1.0\" encoding=\"UTF-8\"?><worksheet xmlns=\"{}\"><sheetData>{}</sheetData></worksheet>",
                MAIN_NS, data
            ),
        ));
    }

    zip_archive(&entries)
}

/// Minimal OpenDocument spreadsheet with the same cell model as [`xlsx_bytes`].
/// `Date` cells are written as plain floats.
pub fn ods_bytes(sheets: &[FixtureSheet]) -> Vec<u8> {
    let tables: String = sheets
        .iter()
        .map(|sheet| {
            let rows: String = sheet
                .rows
                .iter()
                .map(|row| {
                    let cells: String = row
                        .iter()
                        .map(|cell| match cell {
                            SheetCell::Blank => "<table:table-cell/>".to_string(),
                            SheetCell::Text(text) => format!(
                                "<table:table-cell office:value-type=\"string\" office:string-value=\"{}\"/>",
                                escape_xml(text)
                            ),
                            SheetCell::Number(value) | SheetCell::Date(value) => format!(
                                "<table:table-cell office:value-type=\"float\" office:value=\"{}\"/>",
                                value
                            ),
                        })
                        .collect();
                    format!("<table:table-row>{}</table:table-row>", cells)
                })
                .collect();
            format!(
                "<table:table table:name=\"{}\">{}</table:table>",
                escape_xml(&sheet.name),
                rows
            )
        })
        .collect();

    let content = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?><office:document-content xmlns:office=\"urn:oasis:names:tc:opendocument:xmlns:office:1.0\" xmlns:table=\"urn:oasis:names:tc:opendocument:xmlns:table:1.0\" xmlns:text=\"urn:oasis:names:tc:opendocument:xmlns:text:1.0\" office:version=\"1.2\"><office:body><office:spreadsheet>{}</office:spreadsheet></office:body></office:document-content>",
        tables
    );
    let manifest = "<?xml version=\"1.0\" encoding=\"UTF-8\"?><manifest:manifest xmlns:manifest=\"urn:oasis:names:tc:opendocument:xmlns:manifest:1.0\" manifest:version=\"1.2\"><manifest:file-entry manifest:full-path=\"/\" manifest:media-type=\"application/vnd.oasis.opendocument.spreadsheet\"/><manifest:file-entry manifest:full-path=\"content.xml\" manifest:media-type=\"text/xml\"/></manifest:manifest>".to_string();

    zip_archive(&[
        (
            "mimetype",
            "application/vnd.oasis.opendocument.spreadsheet".to_string(),
        ),
        ("META-INF/manifest.xml", manifest),
        ("content.xml", content),
    ])
}
