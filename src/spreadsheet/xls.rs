//! Legacy binary workbook reader (.xls, BIFF8 inside a CFB container).

use crate::helpers::biff8::Biff8Reader;
use crate::helpers::cfb::Cfb;
use crate::helpers::source::Source;
use crate::match_biff8_record;
use crate::spreadsheet::cell::to_error_literal;
use crate::spreadsheet::cell::Cell;
use crate::spreadsheet::cell::CellType;
use crate::spreadsheet::xlsx::resolve_number_formats;
use crate::spreadsheet::ParseError;
use crate::spreadsheet::RawSheet;
use either::Either;
use std::collections::HashMap;

// BIFF8 record type identifiers
const FORMULA: u16 = 6;
const EOF: u16 = 10;
const DATE1904: u16 = 34;
const FILE_PASS: u16 = 47;
const CODE_PAGE: u16 = 66;
const BOUND_SHEET8: u16 = 133;
const MUL_RK: u16 = 189;
const XF: u16 = 224;
const SST: u16 = 252;
const LABEL_SST: u16 = 253;
const NUMBER: u16 = 515;
const LABEL: u16 = 516;
const BOOL_ERR: u16 = 517;
const STRING: u16 = 519;
const RK: u16 = 638;
const FORMAT: u16 = 1054;
const BOF: u16 = 2057;

pub(super) struct XlsWorkbook {
    reader: Biff8Reader,
    shared_strings: Vec<String>,
    number_formats: Vec<CellType>,
    /// (sheet name, stream offset) of the first worksheet
    first_sheet: (String, usize),
}

impl XlsWorkbook {
    /// Reads the workbook globals substream: encoding, date epoch, formats,
    /// the shared string table, and the worksheet directory.
    pub(super) fn open(name: &str, source: &mut Source) -> Result<XlsWorkbook, ParseError> {
        let cfb = Cfb::new(source)?;
        let stream = match cfb.read("Workbook")? {
            Some(stream) => Some(stream),
            None => cfb.read("Book")?,
        };
        let mut reader = match stream {
            Some(stream) => Biff8Reader::new(stream),
            // Encrypted OOXML files are CFB containers as well
            None if cfb.exists("EncryptedPackage") => {
                return Err(ParseError::PasswordProtected {
                    name: name.to_owned(),
                })
            }
            None => {
                return Err(ParseError::EmptyWorkbook {
                    name: name.to_owned(),
                })
            }
        };

        let mut is_1904 = false;
        let mut shared_strings = Vec::new();
        let mut custom_formats: HashMap<String, CellType> = HashMap::new();
        let mut format_indexes: Vec<String> = Vec::new();
        let mut sheets: Vec<(String, usize)> = Vec::new();
        match_biff8_record!(reader => {
            EOF => break,
            FILE_PASS if reader.read_u16()? != 0 => {
                return Err(ParseError::PasswordProtected {
                    name: name.to_owned(),
                })
            }
            DATE1904 if reader.read_u16()? == 1 => is_1904 = true,
            CODE_PAGE => {
                let code_page = reader.read_u16()?;
                reader.encoding = codepage::to_encoding(code_page)
                    .ok_or(ParseError::UnknownCodePage(code_page))?;
            }
            FORMAT => {
                let id = reader.read_u16()?;
                let format = reader.read_unicode_string()?;
                custom_formats.insert(
                    id.to_string(),
                    CellType::from_custom_format(&format, is_1904),
                );
            }
            XF => {
                reader.skip(2)?;
                let id = reader.read_u16()?;
                format_indexes.push(id.to_string());
            }
            SST => shared_strings = load_shared_strings(&mut reader)?,
            BOUND_SHEET8 => {
                let pointer = reader.read_usize()?;
                reader.skip(2)?;
                let sheet_name = reader.read_short_unicode_string()?;
                sheets.push((sheet_name, pointer));
            }
        });
        let first_sheet = sheets
            .into_iter()
            .next()
            .ok_or_else(|| ParseError::EmptyWorkbook {
                name: name.to_owned(),
            })?;

        let number_formats = resolve_number_formats(format_indexes, custom_formats, is_1904);

        Ok(XlsWorkbook {
            reader,
            shared_strings,
            number_formats,
            first_sheet,
        })
    }

    pub(super) fn read_first_sheet(mut self) -> Result<RawSheet, ParseError> {
        let (sheet_name, pointer) = std::mem::take(&mut self.first_sheet);
        self.reader.goto(pointer);
        // Skip the substream BOF
        self.reader.next()?;

        let mut cells = Vec::<Cell>::new();
        while let Some(tag) = self.reader.next()? {
            match tag {
                BOF | EOF => break,
                MUL_RK => {
                    let row = self.reader.read_u16()? as usize;
                    let col_lower = self.reader.read_u16()? as usize;
                    let col_upper = self.reader.get_u16_back(2)? as usize;
                    for col in col_lower..=col_upper {
                        let index = self.reader.read_u16()? as usize;
                        let kind = self.number_format(index);
                        let value = self.reader.read_rk_number()?;
                        cells.push(Cell { row, col, kind, value });
                    }
                }
                BOOL_ERR | NUMBER | RK | LABEL_SST | LABEL | FORMULA => {
                    let row = self.reader.read_u16()? as usize;
                    let col = self.reader.read_u16()? as usize;
                    let (either, value) = match tag {
                        BOOL_ERR => read_bool_or_error_cell(&mut self.reader)?,
                        NUMBER => read_number_cell(&mut self.reader)?,
                        RK => read_rk_cell(&mut self.reader)?,
                        LABEL_SST => read_label_sst_cell(&mut self.reader)?,
                        LABEL => read_label_cell(&mut self.reader)?,
                        _ => read_formula_cell(&mut self.reader)?,
                    };
                    let kind = match either {
                        Either::Left(kind) => kind,
                        Either::Right(index) => self.number_format(index),
                    };
                    if !value.is_empty() {
                        cells.push(Cell { row, col, kind, value });
                    }
                }
                _ => (),
            }
        }

        Ok(RawSheet {
            sheet_name,
            cells,
            shared_strings: self.shared_strings,
        })
    }

    fn number_format(&self, index: usize) -> CellType {
        self.number_formats
            .get(index)
            .copied()
            .unwrap_or(CellType::Number)
    }
}

/// Reads the SST record payload into the shared string table.
fn load_shared_strings(reader: &mut Biff8Reader) -> Result<Vec<String>, ParseError> {
    let mut shared_strings: Vec<String> = Vec::new();
    reader.skip(4)?;
    let count = reader.read_usize()?;
    for _ in 0..count {
        let string = reader.read_rich_extended_string()?;
        shared_strings.push(string);
    }
    Ok(shared_strings)
}

/// BOOL_ERR stores either a boolean or an error code behind a flag byte.
/// Error codes degrade to their display literal.
fn read_bool_or_error_cell(
    reader: &mut Biff8Reader,
) -> Result<(Either<CellType, usize>, String), ParseError> {
    reader.skip(2)?;
    let value = reader.read_u8()?;
    let flag = reader.read_u8()?;
    if flag == 0 {
        Ok((Either::Left(CellType::Boolean), value.to_string()))
    } else {
        Ok((
            Either::Left(CellType::Error),
            to_error_literal(value).to_owned(),
        ))
    }
}

fn read_number_cell(
    reader: &mut Biff8Reader,
) -> Result<(Either<CellType, usize>, String), ParseError> {
    let index = reader.read_u16()? as usize;
    let value = reader.read_f64()?;
    Ok((Either::Right(index), value.to_string()))
}

fn read_rk_cell(
    reader: &mut Biff8Reader,
) -> Result<(Either<CellType, usize>, String), ParseError> {
    let index = reader.read_u16()? as usize;
    let value = reader.read_rk_number()?;
    Ok((Either::Right(index), value))
}

fn read_label_sst_cell(
    reader: &mut Biff8Reader,
) -> Result<(Either<CellType, usize>, String), ParseError> {
    reader.skip(2)?;
    let value = reader.read_usize()?;
    Ok((Either::Left(CellType::SharedString), value.to_string()))
}

fn read_label_cell(
    reader: &mut Biff8Reader,
) -> Result<(Either<CellType, usize>, String), ParseError> {
    reader.skip(2)?;
    let value = reader.read_unicode_string()?;
    Ok((Either::Left(CellType::InlineString), value))
}

/// FORMULA caches its last result inline: a number unless the top 16 bits
/// are all set, in which case a flag selects string, boolean, error, or
/// blank. String results arrive in the following STRING record.
fn read_formula_cell(
    reader: &mut Biff8Reader,
) -> Result<(Either<CellType, usize>, String), ParseError> {
    let index = reader.read_u16()? as usize;
    let formula = reader.read_u64()?;
    let is_number = (formula & 0xFFFF_0000_0000_0000) != 0xFFFF_0000_0000_0000;
    let flag = formula & 0xFF;
    if is_number {
        Ok((Either::Right(index), f64::from_bits(formula).to_string()))
    } else if flag == 0 {
        match reader.next()? {
            Some(STRING) => {
                let value = reader.read_unicode_string()?;
                Ok((Either::Left(CellType::InlineString), value))
            }
            _ => Err(ParseError::MalformedFormula(formula)),
        }
    } else if flag == 1 {
        let value = if (formula & 0xFF_0000) > 0 { "1" } else { "0" };
        Ok((Either::Left(CellType::Boolean), value.to_owned()))
    } else if flag == 2 {
        let code = ((formula >> 16) & 0xFF) as u8;
        let value = to_error_literal(code).to_owned();
        Ok((Either::Left(CellType::Error), value))
    } else if flag == 3 {
        Ok((Either::Left(CellType::InlineString), String::new()))
    } else {
        Err(ParseError::MalformedFormula(formula))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Value;

    fn record(kind: u16, payload: &[u8]) -> Vec<u8> {
        let mut bytes = kind.to_le_bytes().to_vec();
        bytes.extend_from_slice(&(payload.len() as u16).to_le_bytes());
        bytes.extend_from_slice(payload);
        bytes
    }

    fn reader_over(kind: u16, payload: &[u8]) -> Biff8Reader {
        let mut reader = Biff8Reader::new(record(kind, payload));
        reader.next().unwrap();
        reader
    }

    #[test]
    fn bool_err_splits_on_the_flag_byte() {
        let mut reader = reader_over(BOOL_ERR, &[0, 0, 1, 0]);
        let (kind, value) = read_bool_or_error_cell(&mut reader).unwrap();
        assert_eq!(kind, Either::Left(CellType::Boolean));
        assert_eq!(value, "1");

        let mut reader = reader_over(BOOL_ERR, &[0, 0, 0x07, 1]);
        let (kind, value) = read_bool_or_error_cell(&mut reader).unwrap();
        assert_eq!(kind, Either::Left(CellType::Error));
        assert_eq!(value, "#DIV/0!");
    }

    #[test]
    fn number_cells_carry_their_format_index() {
        let mut payload = vec![3, 0];
        payload.extend_from_slice(&30.5f64.to_le_bytes());
        let mut reader = reader_over(NUMBER, &payload);
        let (kind, value) = read_number_cell(&mut reader).unwrap();
        assert_eq!(kind, Either::Right(3));
        assert_eq!(value, "30.5");
    }

    #[test]
    fn formula_cells_decode_cached_booleans() {
        let mut payload = vec![0, 0];
        let cached: u64 = 0xFFFF_0000_0000_0000 | 0x01_0000 | 0x01;
        payload.extend_from_slice(&cached.to_le_bytes());
        let mut reader = reader_over(FORMULA, &payload);
        let (kind, value) = read_formula_cell(&mut reader).unwrap();
        assert_eq!(kind, Either::Left(CellType::Boolean));
        assert_eq!(value, "1");
    }

    #[test]
    fn formula_cells_decode_cached_numbers() {
        let mut payload = vec![0, 0];
        payload.extend_from_slice(&2.5f64.to_le_bytes());
        let mut reader = reader_over(FORMULA, &payload);
        let (kind, value) = read_formula_cell(&mut reader).unwrap();
        assert_eq!(kind, Either::Right(0));
        assert_eq!(value, "2.5");
    }

    #[test]
    fn formula_string_results_read_the_following_record() {
        let mut payload = vec![0, 0];
        let cached: u64 = 0xFFFF_0000_0000_0000;
        payload.extend_from_slice(&cached.to_le_bytes());
        let mut bytes = FORMULA.to_le_bytes().to_vec();
        bytes.extend_from_slice(&(payload.len() as u16).to_le_bytes());
        bytes.extend_from_slice(&payload);
        // STRING record: XLUnicodeString "ok", compressed
        bytes.extend_from_slice(&STRING.to_le_bytes());
        bytes.extend_from_slice(&5u16.to_le_bytes());
        bytes.extend_from_slice(&[2, 0, 0, b'o', b'k']);

        let mut reader = Biff8Reader::new(bytes);
        reader.next().unwrap();
        let (kind, value) = read_formula_cell(&mut reader).unwrap();
        assert_eq!(kind, Either::Left(CellType::InlineString));
        assert_eq!(value, "ok");
    }

    /// Workbook globals substream: one XF, an SST holding "Alice", and the
    /// worksheet directory pointing at `sheet_pointer`.
    fn globals(sheet_pointer: u32) -> Vec<u8> {
        let mut stream = record(BOF, &[0u8; 16]);
        stream.extend(record(XF, &[0, 0, 0, 0]));

        let mut sst = 1u32.to_le_bytes().to_vec();
        sst.extend_from_slice(&1u32.to_le_bytes());
        sst.extend_from_slice(&5u16.to_le_bytes());
        sst.push(0);
        sst.extend_from_slice(b"Alice");
        stream.extend(record(SST, &sst));

        let mut bound_sheet = sheet_pointer.to_le_bytes().to_vec();
        bound_sheet.extend_from_slice(&[0, 0, 6, 0]);
        bound_sheet.extend_from_slice(b"Sheet1");
        stream.extend(record(BOUND_SHEET8, &bound_sheet));

        stream.extend(record(EOF, &[]));
        stream
    }

    /// Worksheet substream: header row "Name"/"Age", one data row with a
    /// shared string and a number.
    fn worksheet() -> Vec<u8> {
        let mut stream = record(BOF, &[0u8; 16]);

        let mut name = vec![0, 0, 0, 0, 0, 0];
        name.extend_from_slice(&4u16.to_le_bytes());
        name.push(0);
        name.extend_from_slice(b"Name");
        stream.extend(record(LABEL, &name));

        let mut age = vec![0, 0, 1, 0, 0, 0];
        age.extend_from_slice(&3u16.to_le_bytes());
        age.push(0);
        age.extend_from_slice(b"Age");
        stream.extend(record(LABEL, &age));

        stream.extend(record(LABEL_SST, &[1, 0, 0, 0, 0, 0, 0, 0, 0, 0]));

        let mut number = vec![1, 0, 1, 0, 0, 0];
        number.extend_from_slice(&30f64.to_le_bytes());
        stream.extend(record(NUMBER, &number));

        stream.extend(record(EOF, &[]));
        stream
    }

    fn directory_entry(name: &str, sector: u32, size: u64) -> [u8; 128] {
        let mut entry = [0u8; 128];
        let mut offset = 0;
        for unit in name.encode_utf16() {
            entry[offset..offset + 2].copy_from_slice(&unit.to_le_bytes());
            offset += 2;
        }
        // Name length counts the UTF-16 null terminator
        entry[64..66].copy_from_slice(&(offset as u16 + 2).to_le_bytes());
        entry[116..120].copy_from_slice(&sector.to_le_bytes());
        entry[120..128].copy_from_slice(&size.to_le_bytes());
        entry
    }

    /// Wraps a BIFF8 stream in a minimal v3 compound file: one FAT sector,
    /// one directory sector, and the stream padded to eight 512-byte sectors
    /// so it travels the regular chain.
    fn cfb_container(stream: &[u8]) -> Vec<u8> {
        const FAT_SECT: u32 = 0xFFFF_FFFD;
        const END_OF_CHAIN: u32 = 0xFFFF_FFFE;
        const FREE_SECT: u32 = 0xFFFF_FFFF;

        let mut workbook = stream.to_vec();
        workbook.resize(4096, 0);

        let mut data = vec![0u8; 512];
        data[..8].copy_from_slice(&super::super::OLE_MAGIC);
        data[26..28].copy_from_slice(&3u16.to_le_bytes());
        data[30..32].copy_from_slice(&9u16.to_le_bytes());
        data[44..48].copy_from_slice(&1u32.to_le_bytes());
        data[48..52].copy_from_slice(&1u32.to_le_bytes());
        data[60..64].copy_from_slice(&END_OF_CHAIN.to_le_bytes());
        data[68..72].copy_from_slice(&END_OF_CHAIN.to_le_bytes());
        for offset in (76..512).step_by(4) {
            data[offset..offset + 4].copy_from_slice(&FREE_SECT.to_le_bytes());
        }
        data[76..80].copy_from_slice(&0u32.to_le_bytes());

        // Sector 0: the FAT. The workbook stream chains through sectors 2-9.
        let mut fat = vec![FAT_SECT, END_OF_CHAIN];
        fat.extend(3..10);
        fat.push(END_OF_CHAIN);
        fat.resize(128, FREE_SECT);
        for entry in fat {
            data.extend_from_slice(&entry.to_le_bytes());
        }

        // Sector 1: the directory
        data.extend_from_slice(&directory_entry("Root Entry", END_OF_CHAIN, 0));
        data.extend_from_slice(&directory_entry("Workbook", 2, workbook.len() as u64));
        data.extend_from_slice(&[0u8; 256]);

        data.extend_from_slice(&workbook);
        data
    }

    #[test]
    fn workbook_streams_parse_end_to_end() {
        let pointer = globals(0).len() as u32;
        let mut stream = globals(pointer);
        stream.extend(worksheet());

        let table = crate::spreadsheet::parse_bytes("people.xls", cfb_container(&stream)).unwrap();
        assert_eq!(table.header, ["Name", "Age"]);
        assert_eq!(
            table.rows,
            vec![vec![Value::Text("Alice".to_owned()), Value::Number(30.0)]]
        );
    }
}
