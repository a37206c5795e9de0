//! Office Open XML workbook reader (.xlsx).

use crate::helpers::source::Source;
use crate::helpers::xml::XmlAttributeHelper;
use crate::helpers::xml::XmlNodeHelper;
use crate::helpers::xml::XmlReader;
use crate::helpers::xml::XmlTextContextHelper;
use crate::helpers::zip::ZipHelper;
use crate::match_xml_events;
use crate::spreadsheet::cell::Cell;
use crate::spreadsheet::cell::CellType;
use crate::spreadsheet::cell::reference_to_index;
use crate::spreadsheet::ParseError;
use crate::spreadsheet::RawSheet;
use quick_xml::events::Event;
use quick_xml::name::QName;
use std::borrow::Cow;
use std::collections::HashMap;
use std::io::BufReader;
use zip::read::ZipFile;
use zip::ZipArchive;

// XML tag names of the workbook parts we read
const TAG_CUSTOM_FORMATS: QName = QName(b"numFmts");
const TAG_CUSTOM_FORMAT: QName = QName(b"numFmt");
const TAG_FORMAT_INDEXES: QName = QName(b"cellXfs");
const TAG_FORMAT_INDEX: QName = QName(b"xf");
const TAG_SHARED_STRING_ITEM: QName = QName(b"si");
const TAG_PHONETIC_TEXT: QName = QName(b"rPh");
const TAG_TEXT: QName = QName(b"t");
const TAG_WORKBOOK_PROPERTIES: QName = QName(b"workbookPr");
const TAG_SHEET: QName = QName(b"sheet");
const TAG_ROW: QName = QName(b"row");
const TAG_CELL: QName = QName(b"c");
const TAG_INLINE_STRING: QName = QName(b"is");
const TAG_VALUE: QName = QName(b"v");

const TAG_RELATIONSHIP: &[u8] = b"Relationship";

const PART_RELATIONSHIPS: &str = "xl/_rels/workbook.xml.rels";
const PART_WORKBOOK: &str = "xl/workbook.xml";
const PART_STYLES: &str = "xl/styles.xml";
const PART_SHARED_STRINGS: &str = "xl/sharedStrings.xml";

pub(super) struct XlsxWorkbook {
    zip: ZipArchive<Source>,
    number_formats: Vec<CellType>,
    /// (sheet name, zip path) of the first worksheet
    first_sheet: (String, String),
}

impl XlsxWorkbook {
    pub(super) fn open(name: &str, source: Source) -> Result<XlsxWorkbook, ParseError> {
        let mut zip = ZipArchive::new(source)?;
        let (sheets, is_1904) = load_workbook(&mut zip)?;
        let first_sheet = sheets
            .into_iter()
            .next()
            .ok_or_else(|| ParseError::EmptyWorkbook {
                name: name.to_owned(),
            })?;
        let number_formats = load_number_formats(&mut zip, is_1904)?;
        Ok(XlsxWorkbook {
            zip,
            number_formats,
            first_sheet,
        })
    }

    pub(super) fn read_first_sheet(mut self) -> Result<RawSheet, ParseError> {
        let shared_strings = self.load_shared_strings()?;
        let (sheet_name, zip_path) = self.first_sheet;

        let mut cells = Vec::<Cell>::new();
        let mut row_count = 0usize;
        let mut col_count = 0usize;
        let mut row = 0usize;
        let mut col = 0usize;
        let mut kind = CellType::default();
        let mut value = String::new();
        let mut reader = self
            .zip
            .xml_reader(&zip_path)?
            .ok_or_else(|| ParseError::MissingPart(zip_path.to_owned()))?;
        match_xml_events!(reader => {
            Event::End(event) if event.name() == TAG_ROW => {
                row_count += 1;
                col_count = 0;
            }
            Event::Start(event) if event.name() == TAG_CELL => {
                (row, col) = event.get_attribute_value("r")?
                    .and_then(|reference| reference_to_index(&reference))
                    .unwrap_or((row_count, col_count));
                col_count += 1;
                kind = event.get_attribute_value("t")?.map(|t| {
                    match t.as_ref() {
                        "inlineStr" | "str" => CellType::InlineString,
                        "s" => CellType::SharedString,
                        "d" => CellType::IsoDateTime,
                        "b" => CellType::Boolean,
                        "e" => CellType::Error,
                        _ => CellType::Number,
                    }
                }).unwrap_or(CellType::Number);
                if let Some(format_id) = event.get_attribute_value("s")? {
                    if kind == CellType::Number && !format_id.is_empty() {
                        let index = format_id.parse::<usize>()?;
                        kind = self.number_formats.get(index).copied().unwrap_or(CellType::Number);
                    }
                }
            }
            Event::Start(event) if kind != CellType::Empty && event.name() == TAG_INLINE_STRING => {
                value = read_string_value(&mut reader, TAG_INLINE_STRING, false)?;
            }
            Event::Start(event) if kind != CellType::Empty && event.name() == TAG_VALUE => {
                value = read_string_value(&mut reader, TAG_VALUE, true)?;
            }
            Event::End(event) if kind != CellType::Empty && !value.is_empty() && event.name() == TAG_CELL => {
                cells.push(Cell {
                    row,
                    col,
                    kind,
                    value: value.to_owned(),
                });
                value.clear();
            }
        });

        Ok(RawSheet {
            sheet_name,
            cells,
            shared_strings,
        })
    }

    /// Loads the whole shared string table; every referenced index must
    /// resolve during value conversion.
    fn load_shared_strings(&mut self) -> Result<Vec<String>, ParseError> {
        let mut shared_strings = Vec::<String>::new();
        let mut reader = match self.zip.xml_reader(PART_SHARED_STRINGS)? {
            Some(reader) => reader,
            None => return Ok(shared_strings),
        };
        match_xml_events!(reader => {
            Event::Start(event) if event.name() == TAG_SHARED_STRING_ITEM => {
                let string = read_string_value(&mut reader, TAG_SHARED_STRING_ITEM, false)?;
                shared_strings.push(string);
            }
        });
        Ok(shared_strings)
    }
}

/// Reads workbook.xml: the worksheet list in order, and the date epoch flag.
fn load_workbook(
    zip: &mut ZipArchive<Source>,
) -> Result<(Vec<(String, String)>, bool), ParseError> {
    let relationships = load_relationships(zip, PART_RELATIONSHIPS)?;
    let mut reader = zip
        .xml_reader(PART_WORKBOOK)?
        .ok_or_else(|| ParseError::MissingPart(PART_WORKBOOK.to_owned()))?;
    let mut sheets: Vec<(String, String)> = Vec::new();
    let mut is_1904 = false;
    match_xml_events!(reader => {
        Event::Start(event) if event.name() == TAG_SHEET => {
            let mut name = None::<Cow<str>>;
            let mut id = None::<Cow<str>>;
            for result in event.attributes() {
                let attribute = result?;
                let key = attribute.key.local_name();
                if key.as_ref() == b"name" {
                    name = Some(attribute.get_value()?);
                } else if key.as_ref() == b"id" {
                    id = Some(attribute.get_value()?);
                }
            }
            if let Some((name, id)) = name.zip(id) {
                if let Some(path) = relationships.get(&id.to_string()) {
                    sheets.push((name.to_string(), path.to_owned()));
                }
            }
        }
        Event::Start(event) if event.name() == TAG_WORKBOOK_PROPERTIES => {
            is_1904 = event.get_attribute_value("date1904")?
                .map(|value| value.eq("1") || value.eq("true"))
                .unwrap_or(false);
        }
    });
    Ok((sheets, is_1904))
}

/// Maps relationship ids to worksheet paths inside the archive.
fn load_relationships(
    zip: &mut ZipArchive<Source>,
    path: &str,
) -> Result<HashMap<String, String>, ParseError> {
    let mut reader = zip
        .xml_reader(path)?
        .ok_or_else(|| ParseError::MissingPart(path.to_owned()))?;
    let mut relationships: HashMap<String, String> = HashMap::new();
    match_xml_events!(reader => {
        Event::Start(event) if event.local_name().as_ref() == TAG_RELATIONSHIP => {
            let id = event.get_attribute_value("Id")?;
            let kind = event.get_attribute_value("Type")?;
            let target = event.get_attribute_value("Target")?;
            if kind.map(|it| it.ends_with("/worksheet")).unwrap_or(true) {
                if let Some((id, target)) = id.zip(target) {
                    relationships.insert(id.to_string(), to_zip_path(target));
                }
            }
        }
    });
    Ok(relationships)
}

/// Reads styles.xml and resolves each cell-format index to a [`CellType`].
fn load_number_formats(
    zip: &mut ZipArchive<Source>,
    is_1904: bool,
) -> Result<Vec<CellType>, ParseError> {
    let mut reader = match zip.xml_reader(PART_STYLES)? {
        Some(reader) => reader,
        None => return Ok(Vec::new()),
    };

    let mut custom_formats_context = false;
    let mut custom_formats = HashMap::<String, CellType>::new();
    let mut format_indexes_context = false;
    let mut format_indexes = Vec::<String>::new();

    match_xml_events!(reader => {
        Event::Start(event) if !custom_formats_context && event.name() == TAG_CUSTOM_FORMATS => {
            custom_formats_context = true;
        }
        Event::End(event) if custom_formats_context && event.name() == TAG_CUSTOM_FORMATS => {
            custom_formats_context = false;
        }
        Event::Start(event) if custom_formats_context && event.name() == TAG_CUSTOM_FORMAT => {
            let id = event.get_attribute_value("numFmtId")?;
            let format = event.get_attribute_value("formatCode")?;
            if let Some((id, format)) = id.zip(format) {
                let style = CellType::from_custom_format(&format, is_1904);
                custom_formats.insert(id.to_string(), style);
            }
        }

        Event::Start(event) if !format_indexes_context && event.name() == TAG_FORMAT_INDEXES => {
            format_indexes_context = true;
        }
        Event::End(event) if format_indexes_context && event.name() == TAG_FORMAT_INDEXES => {
            format_indexes_context = false;
        }
        Event::Start(event) if format_indexes_context && event.name() == TAG_FORMAT_INDEX => {
            if let Some(id) = event.get_attribute_value("numFmtId")? {
                format_indexes.push(id.to_string());
            }
        }
    });

    Ok(resolve_number_formats(format_indexes, custom_formats, is_1904))
}

/// Resolves format ids through the custom table first, then the built-in
/// ids; anything unrecognized stays numeric.
pub(super) fn resolve_number_formats(
    format_indexes: Vec<String>,
    custom_formats: HashMap<String, CellType>,
    is_1904: bool,
) -> Vec<CellType> {
    format_indexes
        .iter()
        .map(|id| {
            custom_formats
                .get(id)
                .copied()
                .or_else(|| CellType::from_builtin_format_id(id, is_1904))
                .unwrap_or(CellType::Number)
        })
        .collect()
}

/// Normalizes a relationship target to a path inside the archive.
fn to_zip_path(path: Cow<'_, str>) -> String {
    if path.starts_with("/xl/") {
        path[1..].to_string()
    } else if path.starts_with("xl/") {
        path.to_string()
    } else {
        format!("xl/{path}")
    }
}

/// Reads text content up to `end_tag`, skipping phonetic annotations and
/// resolving entity references.
fn read_string_value(
    reader: &mut XmlReader<BufReader<ZipFile<'_, Source>>>,
    end_tag: QName,
    is_text_content: bool,
) -> Result<String, ParseError> {
    let mut is_phonetic_text = false;
    let mut is_text = is_text_content;
    let mut text = String::new();
    match_xml_events!(reader => {
        Event::End(event) if event.name() == end_tag => break,
        Event::Start(event) if event.name() == TAG_PHONETIC_TEXT => is_phonetic_text = true,
        Event::End(event) if event.name() == TAG_PHONETIC_TEXT => is_phonetic_text = false,
        Event::Start(event) if !is_phonetic_text && event.name() == TAG_TEXT => is_text = true,
        Event::End(event) if is_text && event.name() == TAG_TEXT => is_text = false,
        Event::Text(event) if is_text => text.push_str(&event.xml_content()?),
        Event::CData(event) if is_text => text.push_str(&event.xml_content()?),
        Event::GeneralRef(event) if is_text => text.push_bytes_ref(&event)?,
    });
    Ok(text)
}
