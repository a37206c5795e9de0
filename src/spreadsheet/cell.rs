//! Raw cell representation and the conversions between Excel's storage
//! formats and [`Value`].

use crate::spreadsheet::ParseError;
use crate::table::Value;
use chrono::Duration;
use chrono::NaiveDate;
use chrono::NaiveDateTime;
use chrono::Timelike;

/// Storage type of a raw cell, as declared by the containing record or the
/// cell's number format.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub(crate) enum CellType {
    #[default]
    Empty,
    /// Boolean stored as "1"/"0"
    Boolean,
    /// Plain numeric value
    Number,
    /// Numeric value whose format marks it as a date/time, 1900 epoch
    DateTime1900,
    /// Numeric value whose format marks it as a date/time, 1904 epoch
    DateTime1904,
    /// ISO 8601 date or date-time string (`t="d"` cells)
    IsoDateTime,
    /// String stored inline in the cell record
    InlineString,
    /// Index into the shared string table
    SharedString,
    /// Error literal such as `#DIV/0!`
    Error,
}

impl CellType {
    /// Classifies a built-in number format id. Ids 14-22 and 45-47 are the
    /// date/time formats; everything else keeps its numeric type.
    pub(crate) fn from_builtin_format_id(id: &str, is_1904: bool) -> Option<Self> {
        match id {
            "14" | "15" | "16" | "17" | "18" | "19" | "20" | "21" | "22" | "45" | "46" | "47" => {
                Some(Self::date_time(is_1904))
            }
            _ => None,
        }
    }

    /// Classifies a custom number format string by scanning its format codes
    /// for date/time placeholders, skipping quoted literals, escapes, and
    /// bracketed color/condition sections.
    pub(crate) fn from_custom_format(format: &str, is_1904: bool) -> Self {
        let mut is_escaped = false;
        let mut is_literal = false;
        let mut is_bracketed = false;
        let mut is_temporal = false;
        for character in format.chars() {
            match character {
                _ if is_escaped => is_escaped = false,
                '_' | '\\' if !is_escaped => is_escaped = true,

                '"' if is_literal => is_literal = false,
                '"' if !is_literal && !is_bracketed => is_literal = true,

                ']' if is_bracketed => is_bracketed = false,
                '[' if !is_bracketed && !is_literal => is_bracketed = true,
                _ if is_literal || is_bracketed => (),

                'Y' | 'y' | 'M' | 'D' | 'd' | 'H' | 'h' | 'S' | 's' => is_temporal = true,
                _ => (),
            }
        }

        if is_temporal {
            Self::date_time(is_1904)
        } else {
            Self::Number
        }
    }

    fn date_time(is_1904: bool) -> Self {
        if is_1904 {
            Self::DateTime1904
        } else {
            Self::DateTime1900
        }
    }
}

/// Maps BIFF8 error codes to their display literals.
pub(crate) fn to_error_literal(value: u8) -> &'static str {
    match value {
        0x00 => "#NULL!",
        0x07 => "#DIV/0!",
        0x0F => "#VALUE!",
        0x17 => "#REF!",
        0x1D => "#NAME?",
        0x24 => "#NUM!",
        0x2A => "#N/A",
        0x2B => "#GETTING_DATA",
        _ => "#ERROR!",
    }
}

/// A raw cell as parsed from either container, before value conversion.
#[derive(Clone, Debug)]
pub(crate) struct Cell {
    /// Row index (0-based)
    pub(crate) row: usize,
    /// Column index (0-based)
    pub(crate) col: usize,
    pub(crate) kind: CellType,
    /// Unconverted payload: literal text, numeric text, or a string index
    pub(crate) value: String,
}

impl Cell {
    /// Excel-style reference ("A1", "B2"), used in error messages.
    pub(crate) fn reference(&self) -> String {
        cell_reference(self.row, self.col)
    }

    /// Converts the raw payload into a typed [`Value`], resolving shared
    /// string indexes against `shared`.
    pub(crate) fn to_value(&self, shared: &[String]) -> Result<Value, ParseError> {
        let invalid = || ParseError::InvalidCellValue {
            reference: self.reference(),
            value: self.value.clone(),
        };
        match self.kind {
            CellType::Empty => Ok(Value::Empty),
            CellType::Boolean => Ok(Value::Bool(self.value == "1")),
            CellType::Number => self
                .value
                .parse::<f64>()
                .map(Value::Number)
                .map_err(|_| invalid()),
            CellType::DateTime1900 | CellType::DateTime1904 => {
                let serial = self.value.parse::<f64>().map_err(|_| invalid())?;
                let is_1904 = self.kind == CellType::DateTime1904;
                serial_to_datetime(serial, is_1904)
                    .map(Value::DateTime)
                    .ok_or_else(invalid)
            }
            CellType::IsoDateTime => parse_iso_datetime(&self.value)
                .map(Value::DateTime)
                .ok_or_else(invalid),
            CellType::InlineString => Ok(Value::Text(self.value.clone())),
            CellType::SharedString => {
                let index = self.value.parse::<usize>().map_err(|_| invalid())?;
                shared
                    .get(index)
                    .map(|string| Value::Text(string.clone()))
                    .ok_or_else(invalid)
            }
            // Error literals degrade to their display text; a stray #N/A
            // should not sink a whole merge.
            CellType::Error => Ok(Value::Text(self.value.clone())),
        }
    }
}

/// Converts 0-based row/column indexes to an Excel-style reference.
pub(crate) fn cell_reference(row: usize, col: usize) -> String {
    let row = (row + 1).to_string();
    let mut col = col as u32 + 1;
    let mut reference = String::new();
    while col > 0 {
        col -= 1;
        let digit = (b'A' + (col % 26) as u8) as char;
        col /= 26;
        reference.insert(0, digit);
    }
    reference.push_str(&row);
    reference
}

/// Converts an Excel-style reference back to 0-based (row, column) indexes.
pub(crate) fn reference_to_index(reference: &str) -> Option<(usize, usize)> {
    let split = reference.find(|c: char| c.is_ascii_digit())?;
    let (letters, digits) = reference.split_at(split);
    let col = letters
        .chars()
        .map(|letter| letter.to_ascii_uppercase() as usize - 'A' as usize + 1)
        .try_fold(0usize, |acc, digit| {
            if digit <= 26 {
                Some(acc * 26 + digit)
            } else {
                None
            }
        })?;
    let row = digits.parse::<usize>().ok()?;
    if col == 0 || row == 0 {
        None
    } else {
        Some((row - 1, col - 1))
    }
}

const EPOCH_1900: (i32, u32, u32) = (1899, 12, 30);
const MICROS_PER_DAY: f64 = 86_400_000_000.0;
/// Day offset between the 1904 and 1900 date systems
const DAYS_1904: i64 = 1462;

fn epoch() -> NaiveDate {
    let (year, month, day) = EPOCH_1900;
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or_default()
}

/// Converts an Excel serial number to a date-time. The 1900 system counts
/// 1900-02-29 as a real day (the Lotus 1-2-3 bug), so serials below 60 are
/// shifted by one.
pub(crate) fn serial_to_datetime(serial: f64, is_1904: bool) -> Option<NaiveDateTime> {
    let days = serial.trunc() as i64;
    let days = if is_1904 {
        days + DAYS_1904
    } else if days < 60 {
        days + 1
    } else {
        days
    };
    let date = epoch().checked_add_signed(Duration::days(days))?;
    let micros = (serial.fract().abs() * MICROS_PER_DAY).round() as i64;
    date.and_hms_opt(0, 0, 0)?
        .checked_add_signed(Duration::microseconds(micros))
}

/// Inverse of [`serial_to_datetime`] for the 1900 system, used on export.
pub(crate) fn datetime_to_serial(datetime: &NaiveDateTime) -> f64 {
    let days = (datetime.date() - epoch()).num_days();
    let days = if days < 61 { days - 1 } else { days };
    let time = datetime.time();
    let micros = time.num_seconds_from_midnight() as i64 * 1_000_000 + time.nanosecond() as i64 / 1_000;
    days as f64 + micros as f64 / MICROS_PER_DAY
}

fn parse_iso_datetime(value: &str) -> Option<NaiveDateTime> {
    if value.contains('T') {
        NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f").ok()
    } else {
        NaiveDate::parse_from_str(value, "%Y-%m-%d")
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(year: i32, month: u32, day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(year, month, day)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    #[test]
    fn serial_epoch_boundaries() {
        assert_eq!(serial_to_datetime(1.0, false), Some(date(1900, 1, 1)));
        // Serial 59 is the last day before the phantom leap day
        assert_eq!(serial_to_datetime(59.0, false), Some(date(1900, 2, 28)));
        assert_eq!(serial_to_datetime(61.0, false), Some(date(1900, 3, 1)));
        assert_eq!(serial_to_datetime(0.0, true), Some(date(1904, 1, 1)));
    }

    #[test]
    fn serial_round_trips_through_datetime() {
        for serial in [1.0, 59.0, 61.0, 45_413.0, 45_413.5, 45_413.25] {
            let datetime = serial_to_datetime(serial, false).unwrap();
            assert_eq!(datetime_to_serial(&datetime), serial);
        }
    }

    #[test]
    fn serial_fraction_is_time_of_day() {
        let datetime = serial_to_datetime(45_413.5, false).unwrap();
        assert_eq!(datetime.time().num_seconds_from_midnight(), 43_200);
    }

    #[test]
    fn builtin_formats_classify_dates() {
        assert_eq!(
            CellType::from_builtin_format_id("22", false),
            Some(CellType::DateTime1900)
        );
        assert_eq!(
            CellType::from_builtin_format_id("14", true),
            Some(CellType::DateTime1904)
        );
        assert_eq!(CellType::from_builtin_format_id("0", false), None);
        assert_eq!(CellType::from_builtin_format_id("2", false), None);
    }

    #[test]
    fn custom_formats_classify_dates() {
        assert_eq!(
            CellType::from_custom_format("yyyy-mm-dd", false),
            CellType::DateTime1900
        );
        assert_eq!(
            CellType::from_custom_format("hh:mm:ss", false),
            CellType::DateTime1900
        );
        assert_eq!(CellType::from_custom_format("#,##0.00", false), CellType::Number);
        // Quoted literals and color sections do not count as format codes
        assert_eq!(
            CellType::from_custom_format("0.0\"days\"", false),
            CellType::Number
        );
        assert_eq!(CellType::from_custom_format("[Red]0.0", false), CellType::Number);
    }

    #[test]
    fn references_convert_both_ways() {
        assert_eq!(cell_reference(0, 0), "A1");
        assert_eq!(cell_reference(1, 27), "AB2");
        assert_eq!(reference_to_index("A1"), Some((0, 0)));
        assert_eq!(reference_to_index("AB2"), Some((1, 27)));
        assert_eq!(reference_to_index("12"), None);
    }

    #[test]
    fn shared_string_cells_resolve_against_the_table() {
        let cell = Cell {
            row: 0,
            col: 0,
            kind: CellType::SharedString,
            value: "1".to_owned(),
        };
        let shared = vec!["Name".to_owned(), "Age".to_owned()];
        assert_eq!(cell.to_value(&shared).unwrap(), Value::Text("Age".to_owned()));

        let out_of_range = Cell {
            value: "7".to_owned(),
            ..cell
        };
        assert!(out_of_range.to_value(&shared).is_err());
    }

    #[test]
    fn error_cells_degrade_to_text() {
        let cell = Cell {
            row: 2,
            col: 1,
            kind: CellType::Error,
            value: "#DIV/0!".to_owned(),
        };
        assert_eq!(cell.to_value(&[]).unwrap(), Value::Text("#DIV/0!".to_owned()));
    }
}
