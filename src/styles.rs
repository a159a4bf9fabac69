//! Styles part parsing
//!
//! Only number formats matter here: document-defined `numFmts` and the
//! `cellXfs` table mapping a cell's style index to its numFmtId. Fonts,
//! fills and borders are skipped outright.

use crate::error::{Result, XlsxError};
use crate::workbook::attribute;
use quick_xml::events::Event;
use quick_xml::Reader;

const PART: &str = "styles.xml";

/// Number-format content of one styles part
#[derive(Debug, Clone, Default)]
pub struct StylesPart {
    /// Document-defined numFmtId → format code
    pub formats: Vec<(u32, String)>,
    /// cellXfs entry → numFmtId; `None` when the xf applies no number format
    pub style_formats: Vec<Option<u32>>,
}

/// Parse styles.xml from a memory buffer
pub fn parse_styles(data: &[u8]) -> Result<StylesPart> {
    let mut reader = Reader::from_reader(data);
    let mut buf = Vec::new();
    let mut part = StylesPart::default();
    let mut in_cell_xfs = false;

    loop {
        buf.clear();
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"cellXfs" => in_cell_xfs = true,
                b"numFmt" => {
                    let id = attribute(&e, "numFmtId", PART)?;
                    let code = attribute(&e, "formatCode", PART)?;
                    if let (Some(id), Some(code)) = (id, code) {
                        let id = id
                            .parse::<u32>()
                            .map_err(|err| XlsxError::xml(PART, err))?;
                        part.formats.push((id, code));
                    }
                }
                b"xf" if in_cell_xfs => {
                    part.style_formats.push(xf_format_id(&e)?);
                }
                _ => {}
            },
            Ok(Event::End(e)) if e.local_name().as_ref() == b"cellXfs" => in_cell_xfs = false,
            Ok(Event::Eof) => break,
            Err(e) => return Err(XlsxError::xml(PART, e)),
            _ => {}
        }
    }
    Ok(part)
}

/// numFmtId of one cellXfs entry. An explicit applyNumberFormat="0" turns
/// the format off; an absent attribute leaves a present numFmtId in force.
fn xf_format_id(e: &quick_xml::events::BytesStart) -> Result<Option<u32>> {
    let apply = attribute(e, "applyNumberFormat", PART)?;
    if matches!(apply.as_deref(), Some("0") | Some("false")) {
        return Ok(None);
    }
    match attribute(e, "numFmtId", PART)? {
        Some(id) => Ok(id.parse::<u32>().ok()),
        None => Ok(None),
    }
}
