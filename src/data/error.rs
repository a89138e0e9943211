use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// A requested or required column does not fit the fixed record schema.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("unknown column '{0}'")]
    UnknownColumn(String),
    #[error("required column '{column}' missing from {source_name}")]
    MissingColumn {
        column: String,
        source_name: String,
    },
    #[error("column '{0}' is not numeric")]
    NotNumeric(&'static str),
}

/// The dataset could not be loaded. Fatal for the session.
#[derive(Debug, Error)]
pub enum DataLoadError {
    #[error("cannot open '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("'{}' is not readable as tabular data: {reason}", path.display())]
    Malformed { path: PathBuf, reason: String },
    #[error("unsupported file extension: .{0}")]
    UnsupportedFormat(String),
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// A single cell that failed to parse and was replaced by null.
///
/// Recovered where it happens and only ever logged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseWarning {
    pub row: usize,
    pub column: &'static str,
    pub raw: String,
}

impl fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "row {}: could not parse {} value '{}', treating as null",
            self.row, self.column, self.raw
        )
    }
}
