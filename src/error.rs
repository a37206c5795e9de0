use crate::export::ExportError;
use crate::merge::MergeError;
use crate::spreadsheet::ParseError;
use thiserror::Error;

/// Top-level error for the merge pipeline. Parse failures carry the name of
/// the offending file; merge and export failures pass through.
#[derive(Error, Debug)]
pub enum FuseError {
    #[error("failed to read '{name}': {source}")]
    ParseFile {
        name: String,
        #[source]
        source: ParseError,
    },

    #[error("{0}")]
    Merge(#[from] MergeError),

    #[error("{0}")]
    Export(#[from] ExportError),
}

impl FuseError {
    /// Message suitable for end users, with the most common fix appended.
    pub fn user_message(&self) -> String {
        format!(
            "An error occurred during the merge: {self}. \
             Please check that all files share the same columns."
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_message_carries_the_column_hint() {
        let error = FuseError::Merge(MergeError::NoInputs);
        let message = error.user_message();
        assert!(message.contains("no inputs to merge"));
        assert!(message.contains("share the same columns"));
    }

    #[test]
    fn parse_failures_name_the_file() {
        let error = FuseError::ParseFile {
            name: "broken.xlsx".to_owned(),
            source: ParseError::UnrecognizedContainer {
                name: "broken.xlsx".to_owned(),
            },
        };
        assert!(error.to_string().contains("broken.xlsx"));
    }
}
