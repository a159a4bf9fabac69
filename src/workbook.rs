//! Workbook discovery
//!
//! Resolves the relationship chain `_rels/.rels` → workbook part →
//! workbook rels, yielding the worksheet, shared-string and styles part
//! paths. Both the 2006 `schemas.openxmlformats.org` edition and the
//! `purl.oclc.org/ooxml` edition of the relationship namespaces are
//! accepted.

use crate::container::ZipContainer;
use crate::error::{Result, XlsxError};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

const ROOT_RELS: &str = "_rels/.rels";

/// One `<Relationship>` element
#[derive(Debug, Clone)]
pub struct Relationship {
    pub id: String,
    pub rel_type: String,
    pub target: String,
}

/// One `<sheet>` element of workbook.xml, in workbook order
#[derive(Debug, Clone)]
pub struct SheetEntry {
    pub name: String,
    /// Archive path of the worksheet part
    pub path: String,
}

/// Resolved part layout of one workbook
#[derive(Debug, Clone)]
pub struct WorkbookLayout {
    pub sheets: Vec<SheetEntry>,
    pub shared_strings_path: Option<String>,
    pub styles_path: Option<String>,
}

/// A relationship type matches in either namespace edition
fn is_rel_type(rel_type: &str, kind: &str) -> bool {
    let (prefix, suffix) = match rel_type.rsplit_once('/') {
        Some(split) => split,
        None => return false,
    };
    suffix == kind
        && matches!(
            prefix,
            "http://schemas.openxmlformats.org/officeDocument/2006/relationships"
                | "http://schemas.openxmlformats.org/package/2006/relationships"
                | "http://purl.oclc.org/ooxml/officeDocument/relationships"
        )
}

/// Read the full relationship chain out of an opened container
pub fn load_layout(container: &mut ZipContainer) -> Result<WorkbookLayout> {
    let root_rels = container.read_entry(ROOT_RELS).map_err(|_| {
        XlsxError::Relationship(format!("missing {}", ROOT_RELS))
    })?;
    let workbook_path = parse_relationships(&root_rels, ROOT_RELS)?
        .into_iter()
        .find(|rel| is_rel_type(&rel.rel_type, "officeDocument"))
        .map(|rel| rel.target.trim_start_matches('/').to_string())
        .ok_or_else(|| {
            XlsxError::Relationship("no officeDocument relationship in root rels".to_string())
        })?;

    let workbook_data = container.read_entry(&workbook_path).map_err(|_| {
        XlsxError::Relationship(format!("missing workbook part {}", workbook_path))
    })?;
    let sheets = parse_workbook(&workbook_data, &workbook_path)?;

    let rels_path = rels_path_for(&workbook_path);
    let rels_data = container.read_entry(&rels_path).map_err(|_| {
        XlsxError::Relationship(format!("missing workbook rels {}", rels_path))
    })?;
    let rels = parse_relationships(&rels_data, &rels_path)?;

    let base_dir = workbook_path
        .rsplit_once('/')
        .map(|(dir, _)| dir)
        .unwrap_or("");

    let mut layout = WorkbookLayout {
        sheets: Vec::with_capacity(sheets.len()),
        shared_strings_path: None,
        styles_path: None,
    };
    for rel in &rels {
        if is_rel_type(&rel.rel_type, "sharedStrings") {
            layout.shared_strings_path = Some(resolve_target(base_dir, &rel.target));
        } else if is_rel_type(&rel.rel_type, "styles") {
            layout.styles_path = Some(resolve_target(base_dir, &rel.target));
        }
    }
    for (name, rel_id) in sheets {
        let rel = rels
            .iter()
            .find(|rel| rel.id == rel_id)
            .ok_or_else(|| {
                XlsxError::Relationship(format!(
                    "sheet '{}' references unknown relationship {}",
                    name, rel_id
                ))
            })?;
        layout.sheets.push(SheetEntry {
            name,
            path: resolve_target(base_dir, &rel.target),
        });
    }
    Ok(layout)
}

/// `xl/workbook.xml` → `xl/_rels/workbook.xml.rels`
fn rels_path_for(part: &str) -> String {
    match part.rsplit_once('/') {
        Some((dir, file)) => format!("{}/_rels/{}.rels", dir, file),
        None => format!("_rels/{}.rels", part),
    }
}

/// Resolve a relationship target against the directory of its source part
fn resolve_target(base_dir: &str, target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        return absolute.to_string();
    }
    let mut parts: Vec<&str> = base_dir.split('/').filter(|s| !s.is_empty()).collect();
    for segment in target.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    parts.join("/")
}

/// Parse the `<Relationship>` elements of a rels part
pub fn parse_relationships(data: &[u8], part: &str) -> Result<Vec<Relationship>> {
    let mut reader = Reader::from_reader(data);
    let mut buf = Vec::new();
    let mut rels = Vec::new();
    loop {
        buf.clear();
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e))
                if e.local_name().as_ref() == b"Relationship" =>
            {
                let id = attribute(&e, "Id", part)?;
                let rel_type = attribute(&e, "Type", part)?;
                let target = attribute(&e, "Target", part)?;
                if let (Some(id), Some(rel_type), Some(target)) = (id, rel_type, target) {
                    rels.push(Relationship {
                        id,
                        rel_type,
                        target,
                    });
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(XlsxError::xml(part, e)),
            _ => {}
        }
    }
    Ok(rels)
}

/// Parse the `<sheet>` list of workbook.xml as (name, relationship id)
fn parse_workbook(data: &[u8], part: &str) -> Result<Vec<(String, String)>> {
    let mut reader = Reader::from_reader(data);
    let mut buf = Vec::new();
    let mut sheets = Vec::new();
    loop {
        buf.clear();
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) if e.local_name().as_ref() == b"sheet" => {
                let name = attribute(&e, "name", part)?;
                // The relationship attribute is namespace-prefixed (r:id)
                let rel_id = attribute_local(&e, "id", part)?;
                if let (Some(name), Some(rel_id)) = (name, rel_id) {
                    sheets.push((name, rel_id));
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(XlsxError::xml(part, e)),
            _ => {}
        }
    }
    Ok(sheets)
}

/// Attribute by exact name
pub(crate) fn attribute(e: &BytesStart, name: &str, part: &str) -> Result<Option<String>> {
    for attr in e.attributes() {
        let attr = attr.map_err(|err| XlsxError::xml(part, err))?;
        if attr.key.as_ref() == name.as_bytes() {
            let value = attr.unescape_value().map_err(|err| XlsxError::xml(part, err))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

/// Attribute by local name, ignoring any namespace prefix
pub(crate) fn attribute_local(e: &BytesStart, name: &str, part: &str) -> Result<Option<String>> {
    for attr in e.attributes() {
        let attr = attr.map_err(|err| XlsxError::xml(part, err))?;
        if attr.key.local_name().as_ref() == name.as_bytes() {
            let value = attr.unescape_value().map_err(|err| XlsxError::xml(part, err))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_relationships() {
        let xml = br#"<?xml version="1.0"?>
            <Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
              <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/>
            </Relationships>"#;
        let rels = parse_relationships(xml, ROOT_RELS).unwrap();
        assert_eq!(rels.len(), 1);
        assert_eq!(rels[0].id, "rId1");
        assert_eq!(rels[0].target, "xl/workbook.xml");
        assert!(is_rel_type(&rels[0].rel_type, "officeDocument"));
    }

    #[test]
    fn test_both_namespace_editions_accepted() {
        for rel_type in [
            "http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet",
            "http://purl.oclc.org/ooxml/officeDocument/relationships/worksheet",
        ] {
            assert!(is_rel_type(rel_type, "worksheet"));
        }
        assert!(!is_rel_type(
            "http://example.com/relationships/worksheet",
            "worksheet"
        ));
        assert!(!is_rel_type(
            "http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles",
            "worksheet"
        ));
    }

    #[test]
    fn test_parse_workbook_sheets_keep_order() {
        let xml = br#"<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"
                       xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
              <sheets>
                <sheet name="Data" sheetId="1" r:id="rId2"/>
                <sheet name="Lookup" sheetId="2" r:id="rId1"/>
              </sheets>
            </workbook>"#;
        let sheets = parse_workbook(xml, "xl/workbook.xml").unwrap();
        assert_eq!(
            sheets,
            vec![
                ("Data".to_string(), "rId2".to_string()),
                ("Lookup".to_string(), "rId1".to_string())
            ]
        );
    }

    #[test]
    fn test_resolve_target() {
        assert_eq!(
            resolve_target("xl", "worksheets/sheet1.xml"),
            "xl/worksheets/sheet1.xml"
        );
        assert_eq!(resolve_target("xl", "/xl/styles.xml"), "xl/styles.xml");
        assert_eq!(
            resolve_target("xl", "../customXml/item1.xml"),
            "customXml/item1.xml"
        );
    }

    #[test]
    fn test_rels_path_for() {
        assert_eq!(
            rels_path_for("xl/workbook.xml"),
            "xl/_rels/workbook.xml.rels"
        );
        assert_eq!(rels_path_for("workbook.xml"), "_rels/workbook.xml.rels");
    }
}
