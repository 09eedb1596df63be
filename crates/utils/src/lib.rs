pub mod columns;
pub mod numeric;
pub mod rows;

// Re-export commonly used items
pub use crate::columns::ColumnMap;
pub use crate::numeric::parse_numeric;
pub use crate::rows::split_row;

use serde::Serialize;
use thiserror::Error;

/// The only hard failures the engine produces. Everything else degrades to a
/// default value plus a recorded [`SkippedRow`].
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("input has fewer than two lines")]
    EmptyInput,
    #[error("missing required columns: {0}")]
    MissingColumns(String),
}

/// One dropped input row and why it was dropped. Collected instead of logged
/// so callers and tests can assert on how much of a file was ignored.
#[derive(Debug, Clone, Serialize)]
pub struct SkippedRow {
    pub line: usize,
    pub reason: String,
}

impl SkippedRow {
    pub fn new(line: usize, reason: impl Into<String>) -> Self {
        Self {
            line,
            reason: reason.into(),
        }
    }
}
