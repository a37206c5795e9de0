//! In-memory xlsx writer for the merged table.
//!
//! Emits the minimal part set a consumer needs: content types, the package
//! and workbook relationships, the workbook, a styles part carrying one
//! date-time format, and a single worksheet. Strings are written inline so
//! no shared string table is needed.

use crate::spreadsheet::cell::cell_reference;
use crate::spreadsheet::cell::datetime_to_serial;
use crate::table::MergedTable;
use crate::table::Value;
use quick_xml::escape::escape;
use std::io::Cursor;
use std::io::Write;
use thiserror::Error;
use zip::write::SimpleFileOptions;
use zip::CompressionMethod;
use zip::ZipWriter;

/// Worksheet name used for merged output.
pub const SHEET_NAME: &str = "Merged Data";

/// MIME type of the produced workbook.
pub const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// Characters Excel forbids in worksheet names.
const ILLEGAL_SHEET_NAME_CHARS: &[char] = &['[', ']', ':', '*', '?', '/', '\\'];

const MAX_SHEET_NAME_LEN: usize = 31;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("'{0}' is not a valid worksheet name")]
    InvalidSheetName(String),

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Zip(#[from] zip::result::ZipError),
}

/// Serializes the table to xlsx bytes under the default sheet name.
pub fn export(table: &MergedTable) -> Result<Vec<u8>, ExportError> {
    export_with_sheet_name(table, SHEET_NAME)
}

pub fn export_with_sheet_name(
    table: &MergedTable,
    sheet_name: &str,
) -> Result<Vec<u8>, ExportError> {
    validate_sheet_name(sheet_name)?;

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    zip.start_file("[Content_Types].xml", options)?;
    zip.write_all(CONTENT_TYPES.as_bytes())?;

    zip.start_file("_rels/.rels", options)?;
    zip.write_all(PACKAGE_RELATIONSHIPS.as_bytes())?;

    zip.start_file("xl/workbook.xml", options)?;
    zip.write_all(workbook_xml(sheet_name).as_bytes())?;

    zip.start_file("xl/_rels/workbook.xml.rels", options)?;
    zip.write_all(WORKBOOK_RELATIONSHIPS.as_bytes())?;

    zip.start_file("xl/styles.xml", options)?;
    zip.write_all(STYLES.as_bytes())?;

    zip.start_file("xl/worksheets/sheet1.xml", options)?;
    zip.write_all(worksheet_xml(table).as_bytes())?;

    Ok(zip.finish()?.into_inner())
}

fn validate_sheet_name(name: &str) -> Result<(), ExportError> {
    if name.is_empty()
        || name.chars().count() > MAX_SHEET_NAME_LEN
        || name.contains(ILLEGAL_SHEET_NAME_CHARS)
    {
        return Err(ExportError::InvalidSheetName(name.to_owned()));
    }
    Ok(())
}

const CONTENT_TYPES: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">"#,
    r#"<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>"#,
    r#"<Default Extension="xml" ContentType="application/xml"/>"#,
    r#"<Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/>"#,
    r#"<Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>"#,
    r#"<Override PartName="/xl/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml"/>"#,
    r#"</Types>"#,
);

const PACKAGE_RELATIONSHIPS: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
    r#"<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/>"#,
    r#"</Relationships>"#,
);

const WORKBOOK_RELATIONSHIPS: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
    r#"<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/>"#,
    r#"<Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/>"#,
    r#"</Relationships>"#,
);

/// Style index 1 is the date-time format (built-in id 22, "m/d/yy h:mm").
const STYLES: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    r#"<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">"#,
    r#"<fonts count="1"><font><sz val="11"/><name val="Calibri"/></font></fonts>"#,
    r#"<fills count="1"><fill><patternFill patternType="none"/></fill></fills>"#,
    r#"<borders count="1"><border/></borders>"#,
    r#"<cellStyleXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/></cellStyleXfs>"#,
    r#"<cellXfs count="2">"#,
    r#"<xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0"/>"#,
    r#"<xf numFmtId="22" fontId="0" fillId="0" borderId="0" xfId="0" applyNumberFormat="1"/>"#,
    r#"</cellXfs>"#,
    r#"</styleSheet>"#,
);

fn workbook_xml(sheet_name: &str) -> String {
    format!(
        concat!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
            r#"<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" "#,
            r#"xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">"#,
            r#"<sheets><sheet name="{name}" sheetId="1" r:id="rId1"/></sheets>"#,
            r#"</workbook>"#,
        ),
        name = escape(sheet_name),
    )
}

fn worksheet_xml(table: &MergedTable) -> String {
    let mut xml = String::from(concat!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
        r#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">"#,
        r#"<sheetData>"#,
    ));

    xml.push_str(r#"<row r="1">"#);
    for (col, title) in table.header.iter().enumerate() {
        push_inline_string(&mut xml, 0, col, title);
    }
    xml.push_str("</row>");

    for (index, row) in table.rows.iter().enumerate() {
        let row_index = index + 1;
        xml.push_str(&format!(r#"<row r="{}">"#, row_index + 1));
        for (col, value) in row.iter().enumerate() {
            push_cell(&mut xml, row_index, col, value);
        }
        xml.push_str("</row>");
    }

    xml.push_str("</sheetData></worksheet>");
    xml
}

fn push_cell(xml: &mut String, row: usize, col: usize, value: &Value) {
    let reference = cell_reference(row, col);
    match value {
        Value::Empty => (),
        Value::Text(text) => push_inline_string(xml, row, col, text),
        Value::Number(number) => {
            xml.push_str(&format!(r#"<c r="{reference}"><v>{number}</v></c>"#));
        }
        Value::Bool(flag) => {
            let bit = if *flag { 1 } else { 0 };
            xml.push_str(&format!(r#"<c r="{reference}" t="b"><v>{bit}</v></c>"#));
        }
        Value::DateTime(datetime) => {
            let serial = datetime_to_serial(datetime);
            xml.push_str(&format!(r#"<c r="{reference}" s="1"><v>{serial}</v></c>"#));
        }
    }
}

fn push_inline_string(xml: &mut String, row: usize, col: usize, text: &str) {
    let reference = cell_reference(row, col);
    xml.push_str(&format!(
        r#"<c r="{reference}" t="inlineStr"><is><t>{}</t></is></c>"#,
        escape(text),
    ));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spreadsheet::parse_bytes;
    use chrono::NaiveDate;

    fn table() -> MergedTable {
        let datetime = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap();
        MergedTable {
            header: vec!["name".to_owned(), "age".to_owned(), "joined".to_owned(), "active".to_owned()],
            rows: vec![
                vec![
                    Value::Text("Alice & Bob".to_owned()),
                    Value::Number(30.5),
                    Value::DateTime(datetime),
                    Value::Bool(true),
                ],
                vec![
                    Value::Text("Céline".to_owned()),
                    Value::Empty,
                    Value::Empty,
                    Value::Bool(false),
                ],
            ],
        }
    }

    #[test]
    fn exported_workbook_parses_back() {
        let table = table();
        let bytes = export(&table).unwrap();
        let parsed = parse_bytes("merged.xlsx", bytes).unwrap();
        assert_eq!(parsed.header, table.header);
        assert_eq!(parsed.rows, table.rows);
    }

    #[test]
    fn sheet_names_are_validated() {
        let table = table();
        assert!(export_with_sheet_name(&table, "").is_err());
        assert!(export_with_sheet_name(&table, "bad/name").is_err());
        assert!(export_with_sheet_name(&table, &"x".repeat(32)).is_err());
        assert!(export_with_sheet_name(&table, "Merged Data").is_ok());
    }

    #[test]
    fn worksheet_cells_are_escaped() {
        let xml = worksheet_xml(&table());
        assert!(xml.contains("Alice &amp; Bob"));
        assert!(!xml.contains("Alice & Bob"));
    }
}
