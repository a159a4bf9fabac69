//! Error types for the xlsxstream library

use thiserror::Error;

/// Result type alias for xlsxstream operations
pub type Result<T> = std::result::Result<T, XlsxError>;

/// Main error type for all reader operations
#[derive(Error, Debug)]
pub enum XlsxError {
    /// IO error wrapper
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Corrupt or unreadable ZIP container
    #[error("Container error: {0}")]
    Container(String),

    /// Missing or invalid relationship target
    #[error("Relationship error: {0}")]
    Relationship(String),

    /// Malformed XML in a workbook part
    #[error("XML error in {part}: {message}")]
    Xml { part: String, message: String },

    /// Invalid sheet name or sheet not found
    #[error("Sheet '{sheet}' not found. Available sheets: {available}")]
    SheetNotFound { sheet: String, available: String },

    /// A format string could not be parsed
    #[error("Format parse error: {0}")]
    FormatParse(String),

    /// A cell referenced a format id with no definition anywhere
    #[error("Unknown number format id: {0}")]
    UnknownFormatId(u32),

    /// Configuration value out of domain
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl XlsxError {
    pub(crate) fn xml(part: &str, err: impl std::fmt::Display) -> Self {
        XlsxError::Xml {
            part: part.to_string(),
            message: err.to_string(),
        }
    }
}
