//! # sheetfuse
//!
//! Merge multiple Excel workbooks into a single spreadsheet. Each input's
//! first worksheet is read, the tables are concatenated positionally in the
//! order given, and the result is serialized back to a `.xlsx` workbook.
//!
//! ## Features
//!
//! - **Multi-format input**: Read Excel files (`.xlsx`, `.xls`) with format
//!   detection by content signature, never by extension
//! - **Positional merge**: Rows are stacked in input order under the first
//!   input's header; narrower inputs are padded
//! - **Typed values**: Text, numbers, booleans, and date-times survive the
//!   round trip into the merged workbook
//! - **Pure Rust implementation**: Hand-rolled ZIP/XML and CFB/BIFF8
//!   readers, no C dependencies
//!
//! The typical entry point is [`engine::merge_inputs`], which runs parse,
//! merge, and export in one call:
//!
//! ```no_run
//! use sheetfuse::engine::{merge_inputs, silent_progress, Input};
//! use sheetfuse::merge::MergePolicy;
//!
//! # fn main() -> Result<(), sheetfuse::FuseError> {
//! let inputs = vec![
//!     Input::Path("january.xlsx".into()),
//!     Input::Path("february.xls".into()),
//! ];
//! let outcome = merge_inputs(inputs, MergePolicy::default(), &mut silent_progress())?;
//! println!("{} rows merged", outcome.table.row_count());
//! # Ok(())
//! # }
//! ```

pub mod engine;
mod error;
pub mod export;
mod helpers;
pub mod merge;
pub mod spreadsheet;
pub mod table;

pub use crate::error::FuseError;
pub use crate::export::SHEET_NAME;
pub use crate::export::XLSX_CONTENT_TYPE;
pub use crate::merge::MergePolicy;
pub use crate::spreadsheet::parse_bytes;
pub use crate::spreadsheet::parse_path;
pub use crate::table::MergedTable;
pub use crate::table::TabularInput;
pub use crate::table::Value;
