//! Tabular data model shared by the parsers, the merge step, and the
//! exporter.

use chrono::NaiveDateTime;
use std::fmt;

/// A single cell value after parsing.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Value {
    #[default]
    Empty,
    Bool(bool),
    Number(f64),
    Text(String),
    DateTime(NaiveDateTime),
}

impl Value {
    pub fn is_empty(&self) -> bool {
        matches!(self, Value::Empty)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Empty => Ok(()),
            Value::Bool(value) => write!(f, "{value}"),
            Value::Number(value) => write!(f, "{value}"),
            Value::Text(value) => write!(f, "{value}"),
            Value::DateTime(value) => write!(f, "{}", value.format("%Y-%m-%d %H:%M:%S")),
        }
    }
}

/// Header name for a column with no usable header cell ("column1",
/// "column2", ...).
pub(crate) fn generated_column_name(index: usize) -> String {
    format!("column{}", index + 1)
}

/// One parsed worksheet, normalized to a rectangle: every row has exactly
/// `header.len()` values.
#[derive(Clone, Debug, PartialEq)]
pub struct TabularInput {
    /// Display name of the originating file
    pub name: String,
    pub header: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl TabularInput {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.header.len()
    }
}

/// Result of merging one or more inputs. Holds the invariant that
/// `row_count()` equals the sum of the input row counts.
#[derive(Clone, Debug, PartialEq)]
pub struct MergedTable {
    pub header: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl MergedTable {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.header.len()
    }

    /// First `limit` rows, for display.
    pub fn preview(&self, limit: usize) -> &[Vec<Value>] {
        &self.rows[..limit.min(self.rows.len())]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn value_display() {
        assert_eq!(Value::Empty.to_string(), "");
        assert_eq!(Value::Bool(true).to_string(), "true");
        assert_eq!(Value::Number(2.5).to_string(), "2.5");
        assert_eq!(Value::Number(30.0).to_string(), "30");
        assert_eq!(Value::Text("Alice".to_owned()).to_string(), "Alice");

        let datetime = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap();
        assert_eq!(Value::DateTime(datetime).to_string(), "2024-03-01 09:30:00");
    }

    #[test]
    fn generated_column_names_are_one_based() {
        assert_eq!(generated_column_name(0), "column1");
        assert_eq!(generated_column_name(9), "column10");
    }

    #[test]
    fn preview_is_clamped_to_row_count() {
        let table = MergedTable {
            header: vec!["a".to_owned()],
            rows: vec![vec![Value::Number(1.0)], vec![Value::Number(2.0)]],
        };
        assert_eq!(table.preview(10).len(), 2);
        assert_eq!(table.preview(1).len(), 1);
        assert_eq!(table.preview(0).len(), 0);
    }
}
