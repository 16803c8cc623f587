//! Error type shared by every stage of the analysis.

use splitcheck_tests::StatsError;

/// Any failure aborts the whole analysis.
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    /// Malformed input: missing column, unknown label, unparsable value, or a
    /// broken post-filter invariant. `row` is the 1-based data row when known.
    #[error("data validation failed{}: {message}", at_row_suffix(.row))]
    DataValidation { row: Option<usize>, message: String },

    #[error("invalid input to significance test: {0}")]
    InvalidInput(#[from] StatsError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl AnalysisError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        AnalysisError::DataValidation {
            row: None,
            message: message.into(),
        }
    }

    pub(crate) fn at_row(row: usize, message: impl Into<String>) -> Self {
        AnalysisError::DataValidation {
            row: Some(row),
            message: message.into(),
        }
    }
}

fn at_row_suffix(row: &Option<usize>) -> String {
    row.map(|r| format!(" at row {r}")).unwrap_or_default()
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
