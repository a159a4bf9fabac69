//! Reader configuration

use crate::error::{Result, XlsxError};
use std::collections::HashMap;
use std::path::PathBuf;

/// Policy for cells that hold no value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SkipCells {
    /// Keep every position; gaps between occupied cells are filled with ""
    #[default]
    None,
    /// Drop every empty cell; remaining cells keep their column positions
    All,
    /// Keep interior gaps, drop empty cells after the last occupied one
    Trailing,
}

/// Policy for rows that hold no values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SkipRows {
    /// Emit empty rows, including rows synthesized for gaps in row numbering
    #[default]
    None,
    /// Suppress every empty row
    All,
    /// Emit interior empty rows, suppress the trailing run at sheet end
    Trailing,
}

/// Memory budget for the shared-string store
#[derive(Debug, Clone)]
pub struct SharedStringOptions {
    /// Retain entries in RAM until the cache budget is exhausted
    pub use_cache: bool,
    /// Cache budget in KiB; minimum 8
    pub cache_bytes_kb: u64,
    /// Write overflow entries to seek-optimized spill files
    pub use_spill: bool,
    /// Entries per spill file before rotating to a new one
    pub spill_entries_per_file: usize,
    /// Keep spill file handles open between lookups
    pub keep_handles: bool,
}

impl Default for SharedStringOptions {
    fn default() -> Self {
        SharedStringOptions {
            use_cache: true,
            cache_bytes_kb: 256,
            use_spill: true,
            spill_entries_per_file: 5000,
            keep_handles: true,
        }
    }
}

/// Configuration for [`XlsxReader`](crate::XlsxReader)
///
/// All fields have working defaults; construct with `ReaderOptions::default()`
/// and override what you need.
#[derive(Debug, Clone, Default)]
pub struct ReaderOptions {
    /// Directory for extracted parts and spill files; the system temp dir
    /// when unset. A uniquely named subdirectory is created per reader.
    pub temp_dir: Option<PathBuf>,
    pub skip_empty_cells: SkipCells,
    pub skip_empty_rows: SkipRows,
    /// Key cells by "A"/"B"/../"AA" labels instead of 0-based column indexes
    pub output_column_names: bool,
    pub shared_strings: SharedStringOptions,
    /// Format-id overrides; shadow the built-in table on conflict
    pub custom_formats: HashMap<u32, String>,
    /// Forced output patterns (internal date-code alphabet) per section kind
    pub force_date_format: Option<String>,
    pub force_time_format: Option<String>,
    pub force_datetime_format: Option<String>,
    /// Return raw values without applying number formats
    pub return_unformatted: bool,
    /// Return percentages as their stored decimal value
    pub return_percentage_decimal: bool,
    /// Return date/time cells as timestamps instead of rendered strings
    pub return_date_time_objects: bool,
}

impl ReaderOptions {
    /// Validate configuration values against their domains
    pub fn validate(&self) -> Result<()> {
        if self.shared_strings.cache_bytes_kb < 8 {
            return Err(XlsxError::Config(format!(
                "shared_strings.cache_bytes_kb must be >= 8, got {}",
                self.shared_strings.cache_bytes_kb
            )));
        }
        if self.shared_strings.spill_entries_per_file == 0 {
            return Err(XlsxError::Config(
                "shared_strings.spill_entries_per_file must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}
