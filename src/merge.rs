//! Positional concatenation of parsed inputs into one table.

use crate::table::generated_column_name;
use crate::table::MergedTable;
use crate::table::TabularInput;
use crate::table::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MergeError {
    #[error("no inputs to merge")]
    NoInputs,

    #[error("'{name}' has columns [{actual}] where [{expected}] were expected")]
    HeaderMismatch {
        name: String,
        expected: String,
        actual: String,
    },
}

/// How column-count differences between inputs are handled.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub enum MergePolicy {
    /// Take the widest input's column count; narrower inputs are padded
    /// with empty values and the header grows generated names as needed.
    #[default]
    Positional,
    /// Require every input to have the same column count.
    Strict,
}

/// Concatenates the inputs in the order given. The first input's header
/// wins; every input contributes all of its rows, so the output row count
/// is the sum of the input row counts.
pub fn merge(inputs: &[TabularInput], policy: MergePolicy) -> Result<MergedTable, MergeError> {
    let first = inputs.first().ok_or(MergeError::NoInputs)?;

    let width = match policy {
        MergePolicy::Positional => inputs
            .iter()
            .map(TabularInput::column_count)
            .max()
            .unwrap_or(0),
        MergePolicy::Strict => {
            for input in inputs {
                if input.header != first.header {
                    return Err(MergeError::HeaderMismatch {
                        name: input.name.clone(),
                        expected: first.header.join(", "),
                        actual: input.header.join(", "),
                    });
                }
            }
            first.column_count()
        }
    };

    let mut header = first.header.clone();
    while header.len() < width {
        header.push(generated_column_name(header.len()));
    }

    let mut rows = Vec::with_capacity(inputs.iter().map(TabularInput::row_count).sum());
    for input in inputs {
        for row in &input.rows {
            let mut values = row.clone();
            values.resize(width, Value::Empty);
            rows.push(values);
        }
    }

    Ok(MergedTable { header, rows })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(name: &str, header: &[&str], rows: &[&[f64]]) -> TabularInput {
        TabularInput {
            name: name.to_owned(),
            header: header.iter().map(|h| h.to_string()).collect(),
            rows: rows
                .iter()
                .map(|row| row.iter().copied().map(Value::Number).collect())
                .collect(),
        }
    }

    #[test]
    fn row_count_is_the_sum_of_input_row_counts() {
        let a = input("a.xlsx", &["x", "y"], &[&[1.0, 2.0], &[3.0, 4.0]]);
        let b = input("b.xlsx", &["x", "y"], &[&[5.0, 6.0]]);
        let merged = merge(&[a.clone(), b.clone()], MergePolicy::default()).unwrap();
        assert_eq!(merged.row_count(), a.row_count() + b.row_count());
        assert_eq!(merged.header, vec!["x", "y"]);
    }

    #[test]
    fn input_order_decides_row_order() {
        let a = input("a.xlsx", &["x"], &[&[1.0]]);
        let b = input("b.xlsx", &["x"], &[&[2.0]]);
        let forward = merge(&[a.clone(), b.clone()], MergePolicy::default()).unwrap();
        let backward = merge(&[b, a], MergePolicy::default()).unwrap();
        assert_eq!(forward.rows[0], vec![Value::Number(1.0)]);
        assert_eq!(backward.rows[0], vec![Value::Number(2.0)]);
    }

    #[test]
    fn single_input_merges_to_itself() {
        let a = input("a.xlsx", &["x"], &[&[1.0], &[2.0]]);
        let merged = merge(std::slice::from_ref(&a), MergePolicy::default()).unwrap();
        assert_eq!(merged.header, a.header);
        assert_eq!(merged.rows, a.rows);
    }

    #[test]
    fn no_inputs_is_an_error() {
        assert!(matches!(
            merge(&[], MergePolicy::default()),
            Err(MergeError::NoInputs)
        ));
    }

    #[test]
    fn narrower_inputs_are_padded() {
        let a = input("a.xlsx", &["x"], &[&[1.0]]);
        let b = input("b.xlsx", &["x", "y"], &[&[2.0, 3.0]]);
        let merged = merge(&[a, b], MergePolicy::Positional).unwrap();
        assert_eq!(merged.header, vec!["x", "column2"]);
        assert_eq!(merged.rows[0], vec![Value::Number(1.0), Value::Empty]);
        assert_eq!(merged.rows[1], vec![Value::Number(2.0), Value::Number(3.0)]);
    }

    #[test]
    fn strict_policy_rejects_header_mismatches() {
        let a = input("a.xlsx", &["x"], &[&[1.0]]);
        let b = input("b.xlsx", &["x", "y"], &[&[2.0, 3.0]]);
        let result = merge(&[a.clone(), b], MergePolicy::Strict);
        assert!(matches!(
            result,
            Err(MergeError::HeaderMismatch { name, .. }) if name == "b.xlsx"
        ));

        // Same column count but different names is still a mismatch
        let c = input("c.xlsx", &["z"], &[&[4.0]]);
        assert!(merge(&[a, c], MergePolicy::Strict).is_err());
    }
}
