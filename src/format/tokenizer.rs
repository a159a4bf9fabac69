//! Format-string tokenizer
//!
//! Splits a raw Excel format string into `;`-delimited sections and each
//! section into tokens, tracking quoted and square-bracketed spans. The
//! token list of a section reconstructs its visible portion when the codes
//! are concatenated; the `"`, `[`, `]` delimiters themselves are removed.

use crate::error::{Result, XlsxError};

/// Token role within a section
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Ordinary run of format characters or literal text
    Text,
    /// `E+`, `E-`, `e+` or `e-` outside quotes and brackets
    ScientificMarker,
}

/// One token of a format section
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub code: String,
    /// Produced by literal-escape syntax: quote pairs or a backslash escape
    pub quoted: bool,
    /// Which square-bracketed span this token belongs to (0-based per section)
    pub bracket: Option<usize>,
    pub kind: TokenKind,
}

impl Token {
    fn text(code: String, quoted: bool, bracket: Option<usize>) -> Self {
        Token {
            code,
            quoted,
            bracket,
            kind: TokenKind::Text,
        }
    }

    /// Ordinary format characters: not quoted, not bracketed
    pub fn is_plain(&self) -> bool {
        !self.quoted && self.bracket.is_none() && self.kind == TokenKind::Text
    }

    pub fn is_marker(&self) -> bool {
        self.kind == TokenKind::ScientificMarker
    }
}

/// Split a format string into its `;`-delimited sections
///
/// Quotes suppress splitting; a semicolon immediately preceded by a
/// backslash is literal and stays in its section.
pub fn split_sections(format: &str) -> Vec<String> {
    let mut sections = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut prev = '\0';

    for ch in format.chars() {
        match ch {
            '"' if prev != '\\' => {
                quoted = !quoted;
                current.push(ch);
            }
            ';' if !quoted && prev != '\\' => {
                sections.push(std::mem::take(&mut current));
            }
            _ => current.push(ch),
        }
        prev = ch;
    }
    sections.push(current);
    sections
}

/// Tokenize one section
pub fn tokenize_section(section: &str) -> Result<Vec<Token>> {
    let mut tokens: Vec<Token> = Vec::new();
    let mut run = String::new();
    let mut quoted = false;
    let mut bracket: Option<usize> = None;
    let mut bracket_count = 0usize;

    let mut chars = section.chars().peekable();

    macro_rules! flush {
        () => {
            if !run.is_empty() {
                tokens.push(Token::text(std::mem::take(&mut run), quoted, bracket));
            }
        };
    }

    while let Some(ch) = chars.next() {
        if quoted {
            if ch == '"' {
                // Close the quoted span; an empty pair still yields a token
                tokens.push(Token::text(std::mem::take(&mut run), true, bracket));
                quoted = false;
            } else {
                run.push(ch);
            }
            continue;
        }

        if bracket.is_some() {
            match ch {
                ']' => {
                    flush!();
                    bracket = None;
                }
                // Brackets do not nest; an inner `[` is literal, and so are
                // backslashes inside brackets
                _ => run.push(ch),
            }
            continue;
        }

        match ch {
            '"' => {
                flush!();
                quoted = true;
            }
            '\\' => {
                // A backslash escapes the next character into a quoted token
                if let Some(escaped) = chars.next() {
                    flush!();
                    tokens.push(Token::text(escaped.to_string(), true, None));
                }
            }
            '[' => {
                flush!();
                bracket = Some(bracket_count);
                bracket_count += 1;
            }
            ']' => {
                return Err(XlsxError::FormatParse(format!(
                    "unexpected ']' in section {:?}",
                    section
                )));
            }
            'E' | 'e' if matches!(chars.peek(), Some(&'+') | Some(&'-')) => {
                let sign = chars.next().unwrap_or('+');
                flush!();
                tokens.push(Token {
                    code: format!("{}{}", ch, sign),
                    quoted: false,
                    bracket: None,
                    kind: TokenKind::ScientificMarker,
                });
            }
            _ => run.push(ch),
        }
    }

    // Open quotes are tolerated: the tail is treated as quoted. An open
    // bracket gets the same treatment.
    if quoted {
        tokens.push(Token::text(run, true, bracket));
    } else {
        flush!();
    }

    Ok(merge_tokens(tokens))
}

/// Merge successive tokens carrying identical (quoted, bracket) flags.
/// A scientific marker never merges with its neighbors.
fn merge_tokens(tokens: Vec<Token>) -> Vec<Token> {
    let mut merged: Vec<Token> = Vec::with_capacity(tokens.len());
    for token in tokens {
        match merged.last_mut() {
            Some(last)
                if !last.is_marker()
                    && !token.is_marker()
                    && last.quoted == token.quoted
                    && last.bracket == token.bracket =>
            {
                last.code.push_str(&token.code);
            }
            _ => merged.push(token),
        }
    }
    merged
}
