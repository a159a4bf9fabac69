//! The number-format engine
//!
//! Turns an Excel format string (e.g. `[Red][>1000]#,##0.00 "USD";-#,##0.00`)
//! into an applied, formatted value for a raw cell datum. The pipeline is
//! tokenizer → section classifier → section analyzer → value formatter, with
//! parsed formats cached by the registry.

pub mod analyzer;
pub mod classifier;
pub mod datetime;
pub mod registry;
pub mod tokenizer;
pub mod value;

use crate::error::Result;
use analyzer::{analyze, Section};
use classifier::{classify, Purpose};

pub use registry::FormatRegistry;
pub use value::{FormatBehavior, Formatted};

/// A fully parsed format: analyzed sections plus the ordered evaluation
/// plan of (section index, purpose) entries
#[derive(Debug, Clone)]
pub struct ParsedFormat {
    pub sections: Vec<Section>,
    pub entries: Vec<(usize, Purpose)>,
}

/// Parse a raw format string through the whole pipeline
pub fn parse_format(format: &str) -> Result<ParsedFormat> {
    let classified = classify(format)?;
    let sections = classified
        .sections
        .into_iter()
        .map(analyze)
        .collect::<Result<Vec<_>>>()?;
    Ok(ParsedFormat {
        sections,
        entries: classified.entries,
    })
}

impl ParsedFormat {
    /// First section admitting a numeric value, per the ordered entries
    pub(crate) fn section_for_numeric(&self, v: f64) -> Option<&Section> {
        self.entries
            .iter()
            .find(|(_, p)| match p {
                Purpose::Condition(op, k) => op.eval(v, *k),
                Purpose::DefaultNumber => true,
                Purpose::DefaultText => false,
            })
            .map(|(i, _)| &self.sections[*i])
    }

    /// First text-fallback section
    pub(crate) fn section_for_text(&self) -> Option<&Section> {
        self.entries
            .iter()
            .find(|(_, p)| matches!(p, Purpose::DefaultText))
            .map(|(i, _)| &self.sections[*i])
    }
}
