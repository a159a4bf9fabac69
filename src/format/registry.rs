//! Format registry
//!
//! Resolves a cell's style index to a number-format id and its format
//! string, shadowing built-ins with user overrides, and caches parsed
//! formats by id. Parsing happens lazily on first application, so a broken
//! custom format only surfaces when a cell actually uses it.

use crate::error::{Result, XlsxError};
use crate::format::value::{format_general, format_value, FormatBehavior, Formatted};
use crate::format::{parse_format, ParsedFormat};
use indexmap::IndexMap;
use std::collections::HashMap;

/// The built-in number formats of the XLSX specification
pub fn builtin_format(id: u32) -> Option<&'static str> {
    let code = match id {
        0 => "",
        1 => "0",
        2 => "0.00",
        3 => "#,##0",
        4 => "#,##0.00",
        9 => "0%",
        10 => "0.00%",
        11 => "0.00E+00",
        12 => "# ?/?",
        13 => "# ??/??",
        14 => "mm-dd-yy",
        15 => "d-mmm-yy",
        16 => "d-mmm",
        17 => "mmm-yy",
        18 => "h:mm AM/PM",
        19 => "h:mm:ss AM/PM",
        20 => "h:mm",
        21 => "h:mm:ss",
        22 => "m/d/yy h:mm",
        27 | 36 | 50 | 57 => "[$-404]e/m/d",
        30 => "m/d/yy",
        37 => "#,##0 ;(#,##0)",
        38 => "#,##0 ;[Red](#,##0)",
        39 => "#,##0.00;(#,##0.00)",
        40 => "#,##0.00;[Red](#,##0.00)",
        45 => "mm:ss",
        46 => "[h]:mm:ss",
        47 => "mmss.0",
        48 => "##0.0E+0",
        49 => "@",
        59 => "t0",
        60 => "t0.00",
        61 => "t#,##0",
        62 => "t#,##0.00",
        67 => "t0%",
        68 => "t0.00%",
        69 => "t# ?/?",
        70 => "t# ??/??",
        _ => return None,
    };
    Some(code)
}

/// Format tables and the per-document style map
pub struct FormatRegistry {
    /// User-supplied id → format string, shadowing the built-in table
    overrides: HashMap<u32, String>,
    /// Document-defined numFmts from the styles part
    document: IndexMap<u32, String>,
    /// cellXfs entry → format id; `None` means "do not format"
    styles: Vec<Option<u32>>,
    cache: IndexMap<u32, ParsedFormat>,
    behavior: FormatBehavior,
}

impl FormatRegistry {
    pub fn new(overrides: HashMap<u32, String>, behavior: FormatBehavior) -> Self {
        FormatRegistry {
            overrides,
            document: IndexMap::new(),
            styles: Vec::new(),
            cache: IndexMap::new(),
            behavior,
        }
    }

    pub fn add_document_format(&mut self, id: u32, code: String) {
        self.document.insert(id, code);
    }

    pub fn set_styles(&mut self, styles: Vec<Option<u32>>) {
        self.styles = styles;
    }

    /// Resolve a format id to its format string: overrides, then built-ins,
    /// then document formats. A miss is a hard error.
    pub fn format_code(&self, id: u32) -> Result<&str> {
        if let Some(code) = self.overrides.get(&id) {
            return Ok(code);
        }
        if let Some(code) = builtin_format(id) {
            return Ok(code);
        }
        if let Some(code) = self.document.get(&id) {
            return Ok(code);
        }
        Err(XlsxError::UnknownFormatId(id))
    }

    /// Format a raw cell value through its style. Empty values, style index
    /// zero/none and styles without a number format pass through.
    pub fn try_format(&mut self, raw: &str, style_index: Option<u32>) -> Result<Formatted> {
        if raw.is_empty() {
            return Ok(Formatted::Text(String::new()));
        }
        let format_id = match style_index {
            None | Some(0) => return Ok(Formatted::Text(raw.to_string())),
            Some(style) => match self.styles.get(style as usize) {
                Some(Some(id)) => *id,
                // No number format on this xf, or no styles part at all
                _ => return Ok(Formatted::Text(raw.to_string())),
            },
        };

        let code = self.format_code(format_id)?.to_string();
        if code.is_empty() || code.eq_ignore_ascii_case("general") {
            return Ok(Formatted::Text(format_general(raw)));
        }

        if !self.cache.contains_key(&format_id) {
            let parsed = parse_format(&code)?;
            self.cache.insert(format_id, parsed);
        }
        let parsed = &self.cache[&format_id];
        Ok(format_value(parsed, raw, &self.behavior))
    }
}
