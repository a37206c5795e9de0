//! The merge pipeline: parse every input in order, concatenate, export.

use crate::error::FuseError;
use crate::export;
use crate::merge::merge;
use crate::merge::MergePolicy;
use crate::spreadsheet;
use crate::table::MergedTable;
use crate::table::TabularInput;
use std::path::PathBuf;
use tracing::debug;
use tracing::info;

/// One workbook to merge, either on disk or already in memory.
pub enum Input {
    Path(PathBuf),
    Bytes { name: String, data: Vec<u8> },
}

impl Input {
    pub fn display_name(&self) -> String {
        match self {
            Input::Path(path) => path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
            Input::Bytes { name, .. } => name.clone(),
        }
    }
}

/// Receives a notification after each input has been parsed. `read` counts
/// finished inputs, `total` is the input count.
pub trait ProgressSink {
    fn on_file_read(&mut self, read: usize, total: usize, name: &str);
}

impl<F: FnMut(usize, usize, &str)> ProgressSink for F {
    fn on_file_read(&mut self, read: usize, total: usize, name: &str) {
        self(read, total, name)
    }
}

/// Sink for callers that do not track progress.
pub fn silent_progress() -> impl ProgressSink {
    |_: usize, _: usize, _: &str| ()
}

/// The merged table together with its xlsx serialization.
pub struct MergeOutcome {
    pub table: MergedTable,
    pub workbook: Vec<u8>,
}

/// Runs the whole pipeline over `inputs`, in order. The progress sink is
/// called synchronously after each file is parsed.
pub fn merge_inputs(
    inputs: Vec<Input>,
    policy: MergePolicy,
    progress: &mut dyn ProgressSink,
) -> Result<MergeOutcome, FuseError> {
    let total = inputs.len();
    let mut tables = Vec::<TabularInput>::with_capacity(total);
    for (index, input) in inputs.into_iter().enumerate() {
        let name = input.display_name();
        let table = match input {
            Input::Path(path) => spreadsheet::parse_path(&path),
            Input::Bytes { name, data } => spreadsheet::parse_bytes(&name, data),
        }
        .map_err(|source| FuseError::ParseFile {
            name: name.clone(),
            source,
        })?;
        debug!(
            name = %name,
            rows = table.row_count(),
            columns = table.column_count(),
            "parsed input"
        );
        progress.on_file_read(index + 1, total, &name);
        tables.push(table);
    }

    let table = merge(&tables, policy)?;
    info!(
        files = total,
        rows = table.row_count(),
        columns = table.column_count(),
        "merged inputs"
    );
    let workbook = export::export(&table)?;
    Ok(MergeOutcome { table, workbook })
}
