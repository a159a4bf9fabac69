//! Section classification
//!
//! Assigns each `;`-delimited section of a format string a purpose (an
//! explicit condition, default number, or default text), synthesizes the
//! defaults Excel guarantees, and decides per section whether a minus sign
//! must be prepended for negative values.

use crate::error::{Result, XlsxError};
use crate::format::tokenizer::{split_sections, tokenize_section, Token};

/// Comparison operator of a `[<>=…]` condition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CondOp {
    Lt,
    Le,
    Eq,
    Ne,
    Ge,
    Gt,
}

impl CondOp {
    pub fn eval(self, v: f64, k: i64) -> bool {
        let k = k as f64;
        match self {
            CondOp::Lt => v < k,
            CondOp::Le => v <= k,
            CondOp::Eq => v == k,
            CondOp::Ne => v != k,
            CondOp::Ge => v >= k,
            CondOp::Gt => v > k,
        }
    }
}

/// Why a section is selected at evaluation time
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Purpose {
    Condition(CondOp, i64),
    /// Matches any numeric value
    DefaultNumber,
    /// Matches any non-numeric value
    DefaultText,
}

impl Purpose {
    fn matches_numeric(self, v: f64) -> bool {
        match self {
            Purpose::Condition(op, k) => op.eval(v, k),
            Purpose::DefaultNumber => true,
            Purpose::DefaultText => false,
        }
    }
}

/// A section after classification, before semantic analysis
#[derive(Debug, Clone)]
pub struct ClassifiedSection {
    pub tokens: Vec<Token>,
    /// Contains a plain `@`
    pub text_kind: bool,
    /// A minus sign must be prepended when a negative value renders here
    pub prepend_minus: bool,
}

/// Ordered evaluation plan: sections plus an entry list of
/// (section index, purpose) pairs, tried in order against a value.
/// One section may appear under several purposes.
#[derive(Debug, Clone)]
pub struct ClassifiedFormat {
    pub sections: Vec<ClassifiedSection>,
    pub entries: Vec<(usize, Purpose)>,
}

/// Tokenize and classify a whole format string
pub fn classify(format: &str) -> Result<ClassifiedFormat> {
    let raw: Vec<Vec<Token>> = split_sections(format)
        .iter()
        .map(|s| tokenize_section(s))
        .collect::<Result<_>>()?;

    let conditions: Vec<Option<(CondOp, i64)>> =
        raw.iter().map(|t| detect_condition(t)).collect::<Result<_>>()?;

    let mut sections: Vec<ClassifiedSection> = raw
        .into_iter()
        .map(|tokens| ClassifiedSection {
            text_kind: is_text_kind(&tokens),
            tokens,
            prepend_minus: false,
        })
        .collect();

    let mut entries: Vec<(usize, Purpose)> = Vec::new();
    let has_conditions = conditions.iter().any(|c| c.is_some());
    let count = sections.len().min(4);

    if has_conditions {
        // Condition sections keep their condition; the remaining sections
        // are number fallbacks. With two or more of them the last one is
        // the text fallback, though a single explicit condition claims it
        // only when it actually carries an `@`.
        let condition_count = conditions.iter().filter(|c| c.is_some()).count();
        let remaining: Vec<usize> = (0..count).filter(|&i| conditions[i].is_none()).collect();
        for i in 0..count {
            let purpose = match conditions[i] {
                Some((op, k)) => Purpose::Condition(op, k),
                None => {
                    if remaining.len() >= 2
                        && remaining.last() == Some(&i)
                        && (condition_count != 1 || sections[i].text_kind)
                    {
                        Purpose::DefaultText
                    } else {
                        Purpose::DefaultNumber
                    }
                }
            };
            entries.push((i, purpose));
        }
    } else {
        match count {
            0 | 1 => {
                entries.push((0, Purpose::DefaultNumber));
                if sections.first().map(|s| s.text_kind).unwrap_or(false) {
                    entries.push((0, Purpose::DefaultText));
                }
            }
            _ => {
                entries.push((0, Purpose::Condition(CondOp::Gt, 0)));
                entries.push((1, Purpose::Condition(CondOp::Lt, 0)));
                if count >= 3 {
                    entries.push((2, Purpose::Condition(CondOp::Eq, 0)));
                }
                if count >= 4 {
                    entries.push((3, Purpose::DefaultText));
                }
                if count < 4 {
                    // The positive section doubles as the number fallback
                    entries.push((0, Purpose::DefaultNumber));
                }
            }
        }
    }

    // Guarantee a catching default for both value categories
    if !entries
        .iter()
        .any(|(_, p)| matches!(p, Purpose::DefaultNumber))
    {
        sections.push(synthetic_section("\"########\"")?);
        entries.push((sections.len() - 1, Purpose::DefaultNumber));
    }
    if !entries
        .iter()
        .any(|(_, p)| matches!(p, Purpose::DefaultText))
    {
        sections.push(synthetic_section("@")?);
        entries.push((sections.len() - 1, Purpose::DefaultText));
    }

    apply_prepend_minus(&mut sections, &entries);

    Ok(ClassifiedFormat { sections, entries })
}

impl ClassifiedFormat {
    /// Index of the first section whose purpose admits the numeric value
    pub fn select_numeric(&self, v: f64) -> Option<usize> {
        self.entries
            .iter()
            .find(|(_, p)| p.matches_numeric(v))
            .map(|(i, _)| *i)
    }

    /// Index of the first text-fallback section
    pub fn select_text(&self) -> Option<usize> {
        self.entries
            .iter()
            .find(|(_, p)| matches!(p, Purpose::DefaultText))
            .map(|(i, _)| *i)
    }
}

fn synthetic_section(source: &str) -> Result<ClassifiedSection> {
    let tokens = tokenize_section(source)?;
    Ok(ClassifiedSection {
        text_kind: is_text_kind(&tokens),
        tokens,
        prepend_minus: false,
    })
}

/// A text section carries a plain `@`
fn is_text_kind(tokens: &[Token]) -> bool {
    tokens
        .iter()
        .any(|t| t.is_plain() && t.code.contains('@'))
}

/// Parse a bracketed token of the shape `[<>=]+[+-]?\d+` into a condition.
/// A bracketed code matching the shape but naming no valid operator is a
/// hard parse error; anything else (colors, currency) is simply not a
/// condition.
fn detect_condition(tokens: &[Token]) -> Result<Option<(CondOp, i64)>> {
    for token in tokens {
        if token.bracket.is_none() {
            continue;
        }
        let code = token.code.as_str();
        let ops: String = code.chars().take_while(|c| "<>=".contains(*c)).collect();
        if ops.is_empty() {
            continue;
        }
        let rest = &code[ops.len()..];
        let digits = rest.strip_prefix(['+', '-']).unwrap_or(rest);
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            continue;
        }
        let op = match ops.as_str() {
            "<" => CondOp::Lt,
            "<=" => CondOp::Le,
            "=" => CondOp::Eq,
            "<>" => CondOp::Ne,
            ">=" => CondOp::Ge,
            ">" => CondOp::Gt,
            other => {
                return Err(XlsxError::FormatParse(format!(
                    "invalid condition operator {:?}",
                    other
                )))
            }
        };
        let value: i64 = rest.parse().map_err(|_| {
            XlsxError::FormatParse(format!("invalid condition value {:?}", rest))
        })?;
        return Ok(Some((op, value)));
    }
    Ok(None)
}

/// Reachability pass: a section needs a prepended minus only when both a
/// negative and a positive value can reach its rendering path through the
/// ordered entry list.
fn apply_prepend_minus(sections: &mut [ClassifiedSection], entries: &[(usize, Purpose)]) {
    let mut candidates: Vec<f64> = vec![-1e15, 1e15];
    for (_, purpose) in entries {
        if let Purpose::Condition(_, k) = purpose {
            let k = *k as f64;
            candidates.extend_from_slice(&[k - 1.0, k - 0.5, k, k + 0.5, k + 1.0]);
        }
    }

    let mut reach_neg = vec![false; sections.len()];
    let mut reach_pos = vec![false; sections.len()];

    for &v in &candidates {
        if let Some((section, _)) = entries.iter().find(|(_, p)| p.matches_numeric(v)) {
            if v < 0.0 {
                reach_neg[*section] = true;
            } else if v > 0.0 {
                reach_pos[*section] = true;
            }
        }
    }

    for (i, section) in sections.iter_mut().enumerate() {
        section.prepend_minus = reach_neg[i] && reach_pos[i];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_section_catches_both_signs() {
        let fmt = classify("0.00").unwrap();
        assert_eq!(fmt.select_numeric(5.0), Some(0));
        assert_eq!(fmt.select_numeric(-5.0), Some(0));
        assert_eq!(fmt.select_numeric(0.0), Some(0));
        assert!(fmt.sections[0].prepend_minus);
        // Synthetic text fallback appended
        assert!(fmt.select_text().is_some());
    }

    #[test]
    fn test_two_sections_sign_split() {
        let fmt = classify("0.00;(0.00)").unwrap();
        assert_eq!(fmt.select_numeric(5.0), Some(0));
        assert_eq!(fmt.select_numeric(-5.0), Some(1));
        // Zero falls through to the duplicated number fallback
        assert_eq!(fmt.select_numeric(0.0), Some(0));
        // Neither side renders its own minus
        assert!(!fmt.sections[0].prepend_minus);
        assert!(!fmt.sections[1].prepend_minus);
    }

    #[test]
    fn test_four_sections() {
        let fmt = classify("0;-0;\"zero\";@").unwrap();
        assert_eq!(fmt.select_numeric(1.0), Some(0));
        assert_eq!(fmt.select_numeric(-1.0), Some(1));
        assert_eq!(fmt.select_numeric(0.0), Some(2));
        assert_eq!(fmt.select_text(), Some(3));
    }

    #[test]
    fn test_explicit_condition() {
        let fmt = classify("[>1000]#,##0;0").unwrap();
        assert_eq!(fmt.select_numeric(1500.0), Some(0));
        assert_eq!(fmt.select_numeric(500.0), Some(1));
        // Negatives reach the fallback, so it renders a minus
        assert!(fmt.sections[1].prepend_minus);
    }

    #[test]
    fn test_equality_condition_never_prepends_minus() {
        let fmt = classify("[=-50]\"1st \"0;\"2nd \"0").unwrap();
        assert_eq!(fmt.select_numeric(-50.0), Some(0));
        assert_eq!(fmt.select_numeric(-30.0), Some(1));
        assert!(!fmt.sections[0].prepend_minus);
        assert!(fmt.sections[1].prepend_minus);
    }

    #[test]
    fn test_negative_condition_absorbs_sign() {
        // All negatives are caught by the condition, so the fallback only
        // ever sees non-negative values
        let fmt = classify("[<0]0;0").unwrap();
        assert!(!fmt.sections[0].prepend_minus);
        assert!(!fmt.sections[1].prepend_minus);
    }

    #[test]
    fn test_two_conditions_designate_the_text_section() {
        // With two explicit conditions the fourth section is the text
        // fallback even without an `@`
        let fmt = classify("[>100]0;[<0]0;0;\"n/a\"").unwrap();
        assert_eq!(fmt.select_numeric(150.0), Some(0));
        assert_eq!(fmt.select_numeric(-3.0), Some(1));
        assert_eq!(fmt.select_numeric(50.0), Some(2));
        assert_eq!(fmt.select_text(), Some(3));
        // No synthetic `@` section was appended
        assert_eq!(fmt.sections.len(), 4);
    }

    #[test]
    fn test_condition_with_text_kind_fallback_stays_numeric() {
        // The single remaining section is the number fallback even though
        // it is text kind; text values hit the synthetic `@`
        let fmt = classify("[<0]0;\"[\"@\"]\"").unwrap();
        assert_eq!(fmt.select_numeric(0.0), Some(1));
        let text_section = fmt.select_text().unwrap();
        assert_ne!(text_section, 1);
    }

    #[test]
    fn test_synthetic_number_fallback() {
        // Four plain sections leave no general number fallback; NaN-ish
        // values would hit the synthesized overflow section
        let fmt = classify("0;-0;\"zero\";@").unwrap();
        assert!(fmt
            .entries
            .iter()
            .any(|(_, p)| matches!(p, Purpose::DefaultNumber)));
    }

    #[test]
    fn test_condition_grammar() {
        let tokens = tokenize_ok("[>=12]0");
        assert_eq!(
            detect_condition(&tokens).unwrap(),
            Some((CondOp::Ge, 12))
        );
        let tokens = tokenize_ok("[<>-3]0");
        assert_eq!(detect_condition(&tokens).unwrap(), Some((CondOp::Ne, -3)));
        let tokens = tokenize_ok("[Red]0");
        assert_eq!(detect_condition(&tokens).unwrap(), None);
        let tokens = tokenize_ok("[><5]0");
        assert!(detect_condition(&tokens).is_err());
    }

    #[test]
    fn test_deterministic_classification() {
        let a = classify("[Red][>1000]#,##0.00 \"USD\";[Blue]-#,##0.00;-;@").unwrap();
        let b = classify("[Red][>1000]#,##0.00 \"USD\";[Blue]-#,##0.00;-;@").unwrap();
        assert_eq!(a.entries, b.entries);
        assert_eq!(a.sections.len(), b.sections.len());
    }

    fn tokenize_ok(s: &str) -> Vec<Token> {
        crate::format::tokenizer::tokenize_section(s).unwrap()
    }
}
