//! Worksheet row stream
//!
//! Pull-parses one extracted worksheet part and emits [`Row`]s in sheet
//! order, resolving shared strings and applying number formats per cell.
//! Gaps in row numbering are synthesized as empty rows, and the
//! empty-cell/empty-row policies decide what actually reaches the caller.

use crate::error::{Result, XlsxError};
use crate::format::{FormatRegistry, Formatted};
use crate::options::{SkipCells, SkipRows};
use crate::shared_strings::SharedStringStore;
use crate::types::{parse_column_index, CellValue, Row};
use crate::workbook::attribute;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::VecDeque;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

impl std::fmt::Debug for RowStream<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowStream")
            .field("part", &self.part)
            .field("next_row", &self.next_row)
            .field("finished", &self.finished)
            .finish()
    }
}

/// Streaming iterator over the rows of one worksheet
pub struct RowStream<'a> {
    reader: Reader<BufReader<File>>,
    buf: Vec<u8>,
    strings: &'a mut SharedStringStore,
    formats: &'a mut FormatRegistry,
    skip_empty_cells: SkipCells,
    skip_empty_rows: SkipRows,
    part: String,
    /// Rows ready to hand out
    ready: VecDeque<Row>,
    /// Empty rows held back until a later populated row proves them interior
    held_back: VecDeque<Row>,
    /// Next expected 1-based row number, for gap synthesis
    next_row: u32,
    finished: bool,
}

impl<'a> RowStream<'a> {
    pub(crate) fn open(
        path: &Path,
        part: String,
        strings: &'a mut SharedStringStore,
        formats: &'a mut FormatRegistry,
        skip_empty_cells: SkipCells,
        skip_empty_rows: SkipRows,
    ) -> Result<Self> {
        let file = File::open(path)?;
        Ok(RowStream {
            reader: Reader::from_reader(BufReader::new(file)),
            buf: Vec::new(),
            strings,
            formats,
            skip_empty_cells,
            skip_empty_rows,
            part,
            ready: VecDeque::new(),
            held_back: VecDeque::new(),
            next_row: 1,
            finished: false,
        })
    }

    /// Pull events until at least one row is ready or the sheet ends
    fn advance(&mut self) -> Result<()> {
        while self.ready.is_empty() && !self.finished {
            self.buf.clear();
            match self.reader.read_event_into(&mut self.buf) {
                Ok(Event::Start(e)) if e.local_name().as_ref() == b"row" => {
                    let e = e.into_owned();
                    let row = self.read_row(&e, false)?;
                    self.enqueue(row);
                }
                Ok(Event::Empty(e)) if e.local_name().as_ref() == b"row" => {
                    let e = e.into_owned();
                    let row = self.read_row(&e, true)?;
                    self.enqueue(row);
                }
                Ok(Event::Eof) => {
                    // Held-back rows are trailing by definition now
                    self.held_back.clear();
                    self.finished = true;
                }
                Err(e) => {
                    self.finished = true;
                    return Err(XlsxError::xml(&self.part, e));
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Parse one `<row>` element (and its cells unless self-closing)
    fn read_row(&mut self, row_start: &BytesStart, self_closing: bool) -> Result<Row> {
        let number = match attribute(row_start, "r", &self.part)? {
            Some(r) => r
                .parse::<u32>()
                .map_err(|e| XlsxError::xml(&self.part, e))?
                .max(1),
            None => self.next_row,
        };

        // Rows missing from the part surface as empty rows
        for gap in self.next_row..number {
            self.enqueue(Row::new(gap - 1));
        }
        self.next_row = number + 1;

        let capacity = attribute(row_start, "spans", &self.part)?
            .and_then(|spans| column_hint(&spans))
            .unwrap_or(0);
        let mut row = Row::with_capacity(number - 1, capacity);

        if !self_closing {
            self.read_cells(&mut row)?;
        }

        row.sort_positions();
        apply_cell_policy(&mut row, self.skip_empty_cells);
        Ok(row)
    }

    fn read_cells(&mut self, row: &mut Row) -> Result<()> {
        let mut previous_column: Option<u32> = None;
        loop {
            self.buf.clear();
            match self.reader.read_event_into(&mut self.buf) {
                Ok(Event::Start(e)) if e.local_name().as_ref() == b"c" => {
                    let e = e.into_owned();
                    let (column, value) = self.read_cell(&e, false, previous_column)?;
                    previous_column = Some(column);
                    row.insert(column, value);
                }
                Ok(Event::Empty(e)) if e.local_name().as_ref() == b"c" => {
                    let e = e.into_owned();
                    let (column, value) = self.read_cell(&e, true, previous_column)?;
                    previous_column = Some(column);
                    row.insert(column, value);
                }
                Ok(Event::End(e)) if e.local_name().as_ref() == b"row" => return Ok(()),
                Ok(Event::Eof) => return Ok(()),
                Err(e) => return Err(XlsxError::xml(&self.part, e)),
                _ => {}
            }
        }
    }

    /// Parse one `<c>` element into its column position and formatted value
    fn read_cell(
        &mut self,
        cell_start: &BytesStart,
        self_closing: bool,
        previous_column: Option<u32>,
    ) -> Result<(u32, CellValue)> {
        let column = match attribute(cell_start, "r", &self.part)? {
            Some(cell_ref) => parse_column_index(&cell_ref),
            None => previous_column.map(|c| c + 1).unwrap_or(0),
        };
        let cell_type = attribute(cell_start, "t", &self.part)?;
        let style = attribute(cell_start, "s", &self.part)?
            .and_then(|s| s.parse::<u32>().ok());

        let raw = if self_closing {
            String::new()
        } else {
            self.read_cell_content()?
        };

        let text = match cell_type.as_deref() {
            Some("s") => {
                let index = raw.trim().parse::<usize>().unwrap_or(usize::MAX);
                self.strings.get(index)
            }
            _ => raw,
        };

        let value = match self.formats.try_format(&text, style)? {
            Formatted::Text(s) if s.is_empty() => CellValue::Empty,
            Formatted::Text(s) => CellValue::Text(s),
            Formatted::DateTime(ts) => CellValue::DateTime(ts),
        };
        Ok((column, value))
    }

    /// Collect `<v>` text or the `<is>` text descendants; `<f>` formula
    /// bodies are skipped, their stored results are what we consume
    fn read_cell_content(&mut self) -> Result<String> {
        let mut value = String::new();
        let mut in_value = false;
        let mut in_formula = false;
        loop {
            self.buf.clear();
            match self.reader.read_event_into(&mut self.buf) {
                Ok(Event::Start(e)) => match e.local_name().as_ref() {
                    b"v" | b"t" => in_value = !in_formula,
                    b"f" => in_formula = true,
                    _ => {}
                },
                Ok(Event::End(e)) => match e.local_name().as_ref() {
                    b"c" => return Ok(value),
                    b"v" | b"t" => in_value = false,
                    b"f" => in_formula = false,
                    _ => {}
                },
                Ok(Event::Text(t)) if in_value => {
                    let chunk = t
                        .unescape()
                        .map_err(|e| XlsxError::xml(&self.part, e))?;
                    value.push_str(&chunk);
                }
                Ok(Event::Eof) => return Ok(value),
                Err(e) => return Err(XlsxError::xml(&self.part, e)),
                _ => {}
            }
        }
    }

    /// Route a completed row through the empty-row policy
    fn enqueue(&mut self, row: Row) {
        if row.is_empty() {
            match self.skip_empty_rows {
                SkipRows::None => self.ready.push_back(row),
                SkipRows::All => {}
                SkipRows::Trailing => self.held_back.push_back(row),
            }
        } else {
            while let Some(held) = self.held_back.pop_front() {
                self.ready.push_back(held);
            }
            self.ready.push_back(row);
        }
    }
}

impl Iterator for RowStream<'_> {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(row) = self.ready.pop_front() {
            return Some(Ok(row));
        }
        if self.finished {
            return None;
        }
        if let Err(e) = self.advance() {
            self.finished = true;
            return Some(Err(e));
        }
        self.ready.pop_front().map(Ok)
    }
}

/// Column-count hint from a `spans` attribute; a multi-range value takes
/// the last range's upper bound
fn column_hint(spans: &str) -> Option<usize> {
    let last = spans.split_whitespace().last()?;
    let (_, upper) = last.split_once(':')?;
    upper.parse::<usize>().ok()
}

fn apply_cell_policy(row: &mut Row, mode: SkipCells) {
    match mode {
        SkipCells::None => fill_gaps(row),
        SkipCells::All => row.retain(|_, value| !value.is_empty()),
        SkipCells::Trailing => {
            let last_occupied = row
                .cells()
                .filter(|(_, value)| !value.is_empty())
                .map(|(column, _)| column)
                .max();
            match last_occupied {
                Some(last) => {
                    row.retain(|column, _| column <= last);
                    fill_gaps(row);
                }
                None => row.retain(|_, _| false),
            }
        }
    }
}

/// Fill positions between column zero and the last occupied column
fn fill_gaps(row: &mut Row) {
    let Some(max) = row.last_column() else {
        return;
    };
    for column in 0..max {
        if row.get(column).is_none() {
            row.insert(column, CellValue::Empty);
        }
    }
    row.sort_positions();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::FormatBehavior;
    use std::collections::HashMap;
    use std::io::Write;

    const SHEET_NS: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";

    fn write_sheet(dir: &Path, body: &str) -> std::path::PathBuf {
        let path = dir.join("sheet1.xml");
        let mut file = File::create(&path).unwrap();
        write!(
            file,
            "<?xml version=\"1.0\"?><worksheet xmlns=\"{}\"><sheetData>{}</sheetData></worksheet>",
            SHEET_NS, body
        )
        .unwrap();
        path
    }

    fn collect(
        body: &str,
        cells: SkipCells,
        rows: SkipRows,
        formats: &mut FormatRegistry,
        strings: &mut SharedStringStore,
    ) -> Vec<Row> {
        let dir = tempfile::tempdir().unwrap();
        let path = write_sheet(dir.path(), body);
        let stream = RowStream::open(
            &path,
            "sheet1.xml".to_string(),
            strings,
            formats,
            cells,
            rows,
        )
        .unwrap();
        stream.collect::<Result<Vec<_>>>().unwrap()
    }

    fn plain_registry() -> FormatRegistry {
        FormatRegistry::new(HashMap::new(), FormatBehavior::default())
    }

    #[test]
    fn test_basic_rows_and_columns() {
        let mut formats = plain_registry();
        let mut strings = SharedStringStore::empty();
        let rows = collect(
            r#"<row r="1"><c r="A1"><v>1</v></c><c r="C1"><v>3</v></c></row>
               <row r="2"><c r="A2"><v>x</v></c></row>"#,
            SkipCells::None,
            SkipRows::None,
            &mut formats,
            &mut strings,
        );
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].index, 0);
        assert_eq!(rows[0].to_strings(), vec!["1", "", "3"]);
        assert_eq!(rows[1].to_strings(), vec!["x"]);
    }

    #[test]
    fn test_column_positions_strictly_increase() {
        let mut formats = plain_registry();
        let mut strings = SharedStringStore::empty();
        let rows = collect(
            r#"<row r="1"><c r="B1"><v>b</v></c><c><v>c</v></c><c r="F1"><v>f</v></c></row>"#,
            SkipCells::All,
            SkipRows::None,
            &mut formats,
            &mut strings,
        );
        let positions: Vec<u32> = rows[0].cells().map(|(c, _)| c).collect();
        assert_eq!(positions, vec![1, 2, 5]);
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_row_gap_synthesis() {
        let mut formats = plain_registry();
        let mut strings = SharedStringStore::empty();
        let body = r#"<row r="5"><c r="A5"><v>data</v></c></row>"#;

        let rows = collect(
            body,
            SkipCells::None,
            SkipRows::None,
            &mut formats,
            &mut strings,
        );
        assert_eq!(rows.len(), 5);
        assert!(rows[..4].iter().all(|r| r.is_empty()));
        assert_eq!(rows[4].index, 4);
        assert_eq!(rows[4].to_strings(), vec!["data"]);

        let rows = collect(
            body,
            SkipCells::None,
            SkipRows::All,
            &mut formats,
            &mut strings,
        );
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].to_strings(), vec!["data"]);
    }

    #[test]
    fn test_trailing_empty_rows_suppressed() {
        let mut formats = plain_registry();
        let mut strings = SharedStringStore::empty();
        let body = r#"<row r="1"><c r="A1"><v>first</v></c></row>
                      <row r="3"><c r="A3"><v>last</v></c></row>
                      <row r="4"/><row r="5"/>"#;
        let rows = collect(
            body,
            SkipCells::None,
            SkipRows::Trailing,
            &mut formats,
            &mut strings,
        );
        // The interior gap row stays, the trailing self-closed rows go
        assert_eq!(rows.len(), 3);
        assert!(rows[1].is_empty());
        assert_eq!(rows[2].to_strings(), vec!["last"]);
    }

    #[test]
    fn test_trailing_empty_cells_dropped() {
        let mut formats = plain_registry();
        let mut strings = SharedStringStore::empty();
        let body = r#"<row r="1"><c r="A1"><v>a</v></c><c r="C1"><v>c</v></c><c r="D1"/><c r="E1"/></row>"#;

        let rows = collect(
            body,
            SkipCells::Trailing,
            SkipRows::None,
            &mut formats,
            &mut strings,
        );
        assert_eq!(rows[0].to_strings(), vec!["a", "", "c"]);

        let rows = collect(
            body,
            SkipCells::None,
            SkipRows::None,
            &mut formats,
            &mut strings,
        );
        assert_eq!(rows[0].to_strings(), vec!["a", "", "c", "", ""]);
    }

    #[test]
    fn test_shared_and_inline_strings() {
        let dir = tempfile::tempdir().unwrap();
        let sst_path = dir.path().join("sharedStrings.xml");
        std::fs::write(
            &sst_path,
            "<sst><si><t>alpha</t></si><si><t>beta</t></si></sst>",
        )
        .unwrap();
        let mut strings = SharedStringStore::scan(
            &sst_path,
            dir.path(),
            &crate::options::SharedStringOptions::default(),
        )
        .unwrap();
        let mut formats = plain_registry();

        let rows = collect(
            r#"<row r="1">
                 <c r="A1" t="s"><v>1</v></c>
                 <c r="B1" t="inlineStr"><is><t>inline</t></is></c>
                 <c r="C1" t="s"><v>99</v></c>
               </row>"#,
            SkipCells::None,
            SkipRows::None,
            &mut formats,
            &mut strings,
        );
        assert_eq!(rows[0].to_strings(), vec!["beta", "inline", ""]);
    }

    #[test]
    fn test_formula_body_is_skipped() {
        let mut formats = plain_registry();
        let mut strings = SharedStringStore::empty();
        let rows = collect(
            r#"<row r="1"><c r="A1"><f>SUM(B1:B9)</f><v>42</v></c></row>"#,
            SkipCells::None,
            SkipRows::None,
            &mut formats,
            &mut strings,
        );
        assert_eq!(rows[0].to_strings(), vec!["42"]);
    }

    #[test]
    fn test_styles_applied_through_registry() {
        let mut formats = plain_registry();
        formats.set_styles(vec![Some(0), Some(2)]);
        let mut strings = SharedStringStore::empty();
        let rows = collect(
            r#"<row r="1"><c r="A1" s="1"><v>1234.5</v></c><c r="B1"><v>1234.5</v></c></row>"#,
            SkipCells::None,
            SkipRows::None,
            &mut formats,
            &mut strings,
        );
        assert_eq!(rows[0].to_strings(), vec!["1234.50", "1234.5"]);
    }

    #[test]
    fn test_column_hint() {
        assert_eq!(column_hint("1:5"), Some(5));
        assert_eq!(column_hint("1:3 6:8"), Some(8));
        assert_eq!(column_hint("junk"), None);
    }

    #[test]
    fn test_malformed_xml_aborts_sheet() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sheet1.xml");
        std::fs::write(
            &path,
            "<worksheet><sheetData><row r=\"1\"><c r=\"A1\"><v>1</v></c></badtag></row>",
        )
        .unwrap();
        let mut formats = plain_registry();
        let mut strings = SharedStringStore::empty();
        let stream = RowStream::open(
            &path,
            "sheet1.xml".to_string(),
            &mut strings,
            &mut formats,
            SkipCells::None,
            SkipRows::None,
        )
        .unwrap();
        let results: Vec<_> = stream.collect();
        assert!(results.iter().any(|r| r.is_err()));
    }
}
