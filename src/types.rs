//! Cell and row types emitted by the row stream

use chrono::NaiveDateTime;
use indexmap::IndexMap;
use std::fmt;

/// A single formatted cell value
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    /// Empty cell (gap filler or valueless `<c>` element)
    Empty,
    /// Formatted display string
    Text(String),
    /// Timestamp, emitted when `return_date_time_objects` is set
    DateTime(NaiveDateTime),
}

impl CellValue {
    /// Convert cell value to its display string
    pub fn as_string(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::Text(s) => s.clone(),
            CellValue::DateTime(d) => d.to_string(),
        }
    }

    /// Check if cell is empty (no value, or an empty display string)
    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.is_empty(),
            CellValue::DateTime(_) => false,
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_string())
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::Text(s.to_string())
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::Text(s)
    }
}

/// One worksheet row: cells keyed by 0-based column position, in column order
///
/// Positions are preserved even when empty cells are skipped, so a sparse row
/// keeps its original column geometry.
#[derive(Debug, Clone, Default)]
pub struct Row {
    /// Row index (0-based)
    pub index: u32,
    cells: IndexMap<u32, CellValue>,
}

impl Row {
    pub(crate) fn new(index: u32) -> Self {
        Row {
            index,
            cells: IndexMap::new(),
        }
    }

    pub(crate) fn with_capacity(index: u32, capacity: usize) -> Self {
        Row {
            index,
            cells: IndexMap::with_capacity(capacity),
        }
    }

    pub(crate) fn insert(&mut self, column: u32, value: CellValue) {
        self.cells.insert(column, value);
    }

    pub(crate) fn retain<F: FnMut(u32, &CellValue) -> bool>(&mut self, mut keep: F) {
        self.cells.retain(|col, value| keep(*col, value));
    }

    /// Restore ascending column order after out-of-order inserts
    pub(crate) fn sort_positions(&mut self) {
        self.cells.sort_keys();
    }

    /// Get cell at a column position
    pub fn get(&self, column: u32) -> Option<&CellValue> {
        self.cells.get(&column)
    }

    /// Iterate cells as (column position, value), ascending by position
    pub fn cells(&self) -> impl Iterator<Item = (u32, &CellValue)> {
        self.cells.iter().map(|(col, value)| (*col, value))
    }

    /// Iterate cells keyed by "A"/"B"/../"AA" style column labels
    pub fn labeled_cells(&self) -> impl Iterator<Item = (String, &CellValue)> {
        self.cells
            .iter()
            .map(|(col, value)| (column_label(*col), value))
    }

    /// Number of cells present
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// True when no cell holds a value
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty() || self.cells.values().all(|c| c.is_empty())
    }

    /// Convert row to a vector of display strings, in column order
    pub fn to_strings(&self) -> Vec<String> {
        self.cells.values().map(|c| c.as_string()).collect()
    }

    /// Ordered key → display-string map; keys are column letters when
    /// `column_names` is set, 0-based positions otherwise
    pub fn to_map(&self, column_names: bool) -> IndexMap<String, String> {
        self.cells
            .iter()
            .map(|(col, value)| {
                let key = if column_names {
                    column_label(*col)
                } else {
                    col.to_string()
                };
                (key, value.as_string())
            })
            .collect()
    }

    /// Highest occupied column position, if any cell is present
    pub fn last_column(&self) -> Option<u32> {
        self.cells.keys().max().copied()
    }
}

/// Decode the column letters of an A1-style reference ("A1" -> 0, "AA3" -> 26)
pub fn parse_column_index(cell_ref: &str) -> u32 {
    let mut col = 0u32;
    for ch in cell_ref.chars() {
        if ch.is_ascii_alphabetic() {
            col = col * 26 + (ch.to_ascii_uppercase() as u32 - 'A' as u32 + 1);
        } else {
            break;
        }
    }
    col.saturating_sub(1)
}

/// Decode the row digits of an A1-style reference ("B7" -> 7), 1-based
pub fn parse_row_number(cell_ref: &str) -> Option<u32> {
    let digits: String = cell_ref.chars().filter(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

/// Convert a 0-based column position to its letter label (0 -> "A", 26 -> "AA")
pub fn column_label(column: u32) -> String {
    let mut result = String::new();
    let mut col = column + 1;

    while col > 0 {
        col -= 1;
        result.insert(0, (b'A' + (col % 26) as u8) as char);
        col /= 26;
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_label() {
        assert_eq!(column_label(0), "A");
        assert_eq!(column_label(25), "Z");
        assert_eq!(column_label(26), "AA");
        assert_eq!(column_label(51), "AZ");
        assert_eq!(column_label(702), "AAA");
    }

    #[test]
    fn test_parse_column_index() {
        assert_eq!(parse_column_index("A1"), 0);
        assert_eq!(parse_column_index("B1"), 1);
        assert_eq!(parse_column_index("Z9"), 25);
        assert_eq!(parse_column_index("AA12"), 26);
        assert_eq!(parse_column_index("AZ3"), 51);
    }

    #[test]
    fn test_label_roundtrip() {
        for col in [0u32, 1, 25, 26, 27, 51, 52, 701, 702, 16383] {
            assert_eq!(parse_column_index(&format!("{}1", column_label(col))), col);
        }
    }

    #[test]
    fn test_parse_row_number() {
        assert_eq!(parse_row_number("B7"), Some(7));
        assert_eq!(parse_row_number("AA120"), Some(120));
        assert_eq!(parse_row_number("AA"), None);
    }

    #[test]
    fn test_row_position_order() {
        let mut row = Row::new(0);
        row.insert(0, CellValue::from("a"));
        row.insert(3, CellValue::from("d"));
        row.insert(5, CellValue::from("f"));
        let positions: Vec<u32> = row.cells().map(|(col, _)| col).collect();
        assert_eq!(positions, vec![0, 3, 5]);
        assert_eq!(row.last_column(), Some(5));
    }

    #[test]
    fn test_row_is_empty() {
        let mut row = Row::new(4);
        assert!(row.is_empty());
        row.insert(2, CellValue::Empty);
        assert!(row.is_empty());
        row.insert(3, CellValue::from("x"));
        assert!(!row.is_empty());
    }
}
