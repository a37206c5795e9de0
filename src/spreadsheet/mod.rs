//! Spreadsheet ingestion: container detection plus the xlsx and xls
//! readers, and the conversion of a raw worksheet into a [`TabularInput`].
//!
//! Only the first worksheet of a workbook is read; its first occupied row
//! becomes the header and everything below it becomes data.

pub(crate) mod cell;
mod xls;
mod xlsx;

use crate::helpers::biff8::Biff8Error;
use crate::helpers::cfb::CfbError;
use crate::helpers::source::Source;
use crate::spreadsheet::cell::Cell;
use crate::table::generated_column_name;
use crate::table::TabularInput;
use crate::table::Value;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

/// Errors raised while reading a workbook.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("'{name}' is not an Excel workbook (expected .xlsx or .xls content)")]
    UnrecognizedContainer { name: String },

    #[error("'{name}' is password protected")]
    PasswordProtected { name: String },

    #[error("'{name}' contains no worksheets")]
    EmptyWorkbook { name: String },

    #[error("worksheet '{sheet}' in '{name}' contains no cells")]
    EmptyWorksheet { name: String, sheet: String },

    #[error("workbook part '{0}' is missing")]
    MissingPart(String),

    #[error("unsupported code page '{0}'")]
    UnknownCodePage(u16),

    #[error("invalid formula result '{0}'")]
    MalformedFormula(u64),

    #[error("unknown XML entity '{0}'")]
    UnknownEntity(String),

    #[error("cell {reference} holds unreadable value '{value}'")]
    InvalidCellValue { reference: String, value: String },

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("{0}")]
    Xml(#[from] quick_xml::Error),

    #[error("{0}")]
    XmlEncoding(#[from] quick_xml::encoding::EncodingError),

    #[error("{0}")]
    XmlAttribute(#[from] quick_xml::events::attributes::AttrError),

    #[error("{0}")]
    Int(#[from] std::num::ParseIntError),

    #[error("{0}")]
    Cfb(#[from] CfbError),

    #[error("{0}")]
    Biff8(#[from] Biff8Error),
}

/// First worksheet of a workbook before grid normalization.
pub(crate) struct RawSheet {
    pub(crate) sheet_name: String,
    pub(crate) cells: Vec<Cell>,
    pub(crate) shared_strings: Vec<String>,
}

const ZIP_MAGIC: [u8; 4] = [0x50, 0x4B, 0x03, 0x04];
const OLE_MAGIC: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

/// Parses the first worksheet of the workbook at `path`.
pub fn parse_path<P: AsRef<Path>>(path: P) -> Result<TabularInput, ParseError> {
    let path = path.as_ref();
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let source = Source::open(path)?;
    parse_source(&name, source)
}

/// Parses the first worksheet of an in-memory workbook, as received from an
/// upload. `name` is only used in messages.
pub fn parse_bytes(name: &str, bytes: Vec<u8>) -> Result<TabularInput, ParseError> {
    parse_source(name, Source::from_bytes(bytes))
}

/// Dispatches on the container signature: ZIP local-file header for xlsx,
/// OLE compound-file header for xls. The file extension is never consulted.
fn parse_source(name: &str, mut source: Source) -> Result<TabularInput, ParseError> {
    let magic = source
        .peek::<8>()
        .map_err(|_| ParseError::UnrecognizedContainer {
            name: name.to_owned(),
        })?;
    let sheet = if magic[..4] == ZIP_MAGIC {
        xlsx::XlsxWorkbook::open(name, source)?.read_first_sheet()?
    } else if magic == OLE_MAGIC {
        xls::XlsWorkbook::open(name, &mut source)?.read_first_sheet()?
    } else {
        return Err(ParseError::UnrecognizedContainer {
            name: name.to_owned(),
        });
    };
    into_table(name, sheet)
}

/// Normalizes scattered cells into a rectangle. The first occupied row is
/// the header; unreadable or missing header cells get generated names; data
/// rows are padded with empty values to the full column span.
fn into_table(name: &str, sheet: RawSheet) -> Result<TabularInput, ParseError> {
    if sheet.cells.is_empty() {
        return Err(ParseError::EmptyWorksheet {
            name: name.to_owned(),
            sheet: sheet.sheet_name,
        });
    }

    let mut row_lower = usize::MAX;
    let mut row_upper = 0usize;
    let mut col_lower = usize::MAX;
    let mut col_upper = 0usize;
    let mut grid = HashMap::<(usize, usize), &Cell>::new();
    for cell in &sheet.cells {
        row_lower = row_lower.min(cell.row);
        row_upper = row_upper.max(cell.row);
        col_lower = col_lower.min(cell.col);
        col_upper = col_upper.max(cell.col);
        grid.insert((cell.row, cell.col), cell);
    }

    let mut header = Vec::with_capacity(col_upper - col_lower + 1);
    for col in col_lower..=col_upper {
        let title = match grid.get(&(row_lower, col)) {
            Some(cell) => cell.to_value(&sheet.shared_strings)?.to_string(),
            None => String::new(),
        };
        if title.is_empty() {
            header.push(generated_column_name(col - col_lower));
        } else {
            header.push(title);
        }
    }

    let mut rows = Vec::new();
    for row in (row_lower + 1)..=row_upper {
        let mut values = Vec::with_capacity(header.len());
        for col in col_lower..=col_upper {
            let value = match grid.get(&(row, col)) {
                Some(cell) => cell.to_value(&sheet.shared_strings)?,
                None => Value::Empty,
            };
            values.push(value);
        }
        rows.push(values);
    }

    Ok(TabularInput {
        name: name.to_owned(),
        header,
        rows,
    })
}
