//! XLSX reader
//!
//! Owns the container, the per-reader temp directory, the shared-string
//! store and the format registry, and hands out streaming row iterators.
//! Everything extracted or spilled during a session lives under one
//! uniquely named directory that is removed on close (or drop).

use crate::container::ZipContainer;
use crate::error::{Result, XlsxError};
use crate::format::{FormatBehavior, FormatRegistry};
use crate::options::ReaderOptions;
use crate::shared_strings::SharedStringStore;
use crate::styles::parse_styles;
use crate::types::Row;
use crate::workbook::{load_layout, WorkbookLayout};
use crate::worksheet::RowStream;
use indexmap::IndexMap;
use log::debug;
use std::collections::HashSet;
use std::path::PathBuf;
use tempfile::TempDir;

/// Streaming XLSX reader
///
/// # Example
///
/// ```no_run
/// use xlsxstream::XlsxReader;
///
/// let mut reader = XlsxReader::open("data.xlsx")?;
/// let sheet = reader.sheet_names().first().cloned().unwrap();
/// for row in reader.rows(&sheet)? {
///     let row = row?;
///     println!("{:?}", row.to_strings());
/// }
/// # Ok::<(), xlsxstream::XlsxError>(())
/// ```
pub struct XlsxReader {
    container: ZipContainer,
    layout: WorkbookLayout,
    strings: SharedStringStore,
    formats: FormatRegistry,
    options: ReaderOptions,
    temp_dir: Option<TempDir>,
    extracted: HashSet<String>,
}

impl XlsxReader {
    /// Open an XLSX file with default options
    pub fn open<P: Into<PathBuf>>(path: P) -> Result<Self> {
        Self::open_with_options(path, ReaderOptions::default())
    }

    /// Open an XLSX file
    ///
    /// Resolves the relationship chain, scans shared strings into the
    /// configured cache/spill strata and loads the style tables. Worksheet
    /// parts are extracted lazily on first iteration.
    pub fn open_with_options<P: Into<PathBuf>>(path: P, options: ReaderOptions) -> Result<Self> {
        options.validate()?;
        let path = path.into();

        let base = options
            .temp_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir);
        let temp_dir = tempfile::Builder::new()
            .prefix("xlsxstream_")
            .tempdir_in(base)?;

        let mut container = ZipContainer::open(&path)?;
        let layout = load_layout(&mut container)?;
        debug!(
            "opened {:?}: {} sheets, shared strings: {}, styles: {}",
            path,
            layout.sheets.len(),
            layout.shared_strings_path.is_some(),
            layout.styles_path.is_some()
        );

        let strings = match &layout.shared_strings_path {
            Some(part) if container.has_entry(part) => {
                let target = temp_dir.path().join(part);
                container.extract_entry(part, &target)?;
                SharedStringStore::scan(&target, temp_dir.path(), &options.shared_strings)?
            }
            _ => SharedStringStore::empty(),
        };

        let behavior = FormatBehavior {
            return_unformatted: options.return_unformatted,
            return_percentage_decimal: options.return_percentage_decimal,
            return_date_time_objects: options.return_date_time_objects,
            force_date_format: options.force_date_format.clone(),
            force_time_format: options.force_time_format.clone(),
            force_datetime_format: options.force_datetime_format.clone(),
        };
        let mut formats = FormatRegistry::new(options.custom_formats.clone(), behavior);
        if let Some(part) = &layout.styles_path {
            if container.has_entry(part) {
                let styles = parse_styles(&container.read_entry(part)?)?;
                for (id, code) in styles.formats {
                    formats.add_document_format(id, code);
                }
                formats.set_styles(styles.style_formats);
            }
        }

        Ok(XlsxReader {
            container,
            layout,
            strings,
            formats,
            options,
            temp_dir: Some(temp_dir),
            extracted: HashSet::new(),
        })
    }

    /// Worksheet names, in workbook order
    pub fn sheet_names(&self) -> Vec<String> {
        self.layout.sheets.iter().map(|s| s.name.clone()).collect()
    }

    /// Number of worksheets
    pub fn sheet_count(&self) -> usize {
        self.layout.sheets.len()
    }

    /// Stream the rows of a worksheet by name
    ///
    /// Iteration can be abandoned at any row boundary; calling `rows` again
    /// reopens the part from the beginning.
    pub fn rows(&mut self, sheet_name: &str) -> Result<RowStream<'_>> {
        let index = self
            .layout
            .sheets
            .iter()
            .position(|s| s.name == sheet_name)
            .ok_or_else(|| XlsxError::SheetNotFound {
                sheet: sheet_name.to_string(),
                available: self.sheet_names().join(", "),
            })?;
        self.rows_by_index(index)
    }

    /// Stream the rows of a worksheet by 0-based index
    pub fn rows_by_index(&mut self, index: usize) -> Result<RowStream<'_>> {
        let sheet = self
            .layout
            .sheets
            .get(index)
            .ok_or_else(|| XlsxError::SheetNotFound {
                sheet: format!("index {}", index),
                available: self.sheet_names().join(", "),
            })?
            .clone();

        let temp_dir = self
            .temp_dir
            .as_ref()
            .ok_or_else(|| XlsxError::Container("reader is closed".to_string()))?;
        let target = temp_dir.path().join(&sheet.path);
        if !self.extracted.contains(&sheet.path) {
            self.container.extract_entry(&sheet.path, &target)?;
            self.extracted.insert(sheet.path.clone());
        }

        RowStream::open(
            &target,
            sheet.path,
            &mut self.strings,
            &mut self.formats,
            self.options.skip_empty_cells,
            self.options.skip_empty_rows,
        )
    }

    /// Render a row as an ordered key → display-string map, keyed by
    /// column letters when `output_column_names` is set
    pub fn row_map(&self, row: &Row) -> IndexMap<String, String> {
        row.to_map(self.options.output_column_names)
    }

    /// Release all handles, remove spill files, extracted parts and the
    /// reader's temp directory
    pub fn close(mut self) -> Result<()> {
        self.strings.close();
        if let Some(temp_dir) = self.temp_dir.take() {
            temp_dir.close()?;
        }
        Ok(())
    }
}

impl Drop for XlsxReader {
    fn drop(&mut self) {
        self.strings.close();
        // TempDir removes itself when dropped
    }
}
