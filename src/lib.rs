//! # xlsxstream
//!
//! A streaming reader for XLSX files with a faithful Excel number-format
//! engine and bounded-memory shared-string handling.
//!
//! ## Features
//!
//! - **Streaming read**: worksheets are pull-parsed row by row; no XML part
//!   is ever loaded fully into memory
//! - **Number formats**: arbitrary user-defined format strings
//!   (`[Red][>1000]#,##0.00 "USD";-#,##0.00;-;@`) render the way
//!   spreadsheet applications display them
//! - **Bounded shared strings**: a RAM cache under a configurable byte
//!   budget, overflowing to seek-optimized spill files, falling back to the
//!   original XML
//! - **Date handling**: serial dates with the 1900 leap-year quirk, forced
//!   output patterns, or `chrono` timestamps on request
//!
//! ## Quick start
//!
//! ```no_run
//! use xlsxstream::{ReaderOptions, SkipRows, XlsxReader};
//!
//! # fn main() -> xlsxstream::Result<()> {
//! let options = ReaderOptions {
//!     skip_empty_rows: SkipRows::All,
//!     ..ReaderOptions::default()
//! };
//! let mut reader = XlsxReader::open_with_options("data.xlsx", options)?;
//!
//! for sheet in reader.sheet_names() {
//!     for row in reader.rows(&sheet)? {
//!         let row = row?;
//!         println!("{}: {:?}", row.index, row.to_strings());
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod container;
pub mod error;
pub mod format;
pub mod options;
pub mod reader;
pub mod shared_strings;
pub mod styles;
pub mod types;
pub mod workbook;
pub mod worksheet;

pub use error::{Result, XlsxError};
pub use format::{FormatRegistry, ParsedFormat};
pub use options::{ReaderOptions, SharedStringOptions, SkipCells, SkipRows};
pub use reader::XlsxReader;
pub use types::{CellValue, Row};
pub use worksheet::RowStream;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_types_accessible() {
        let _ = std::marker::PhantomData::<XlsxError>;
        let _ = std::marker::PhantomData::<XlsxReader>;
        let _ = std::marker::PhantomData::<ReaderOptions>;
        let _ = std::marker::PhantomData::<Row>;
    }
}
