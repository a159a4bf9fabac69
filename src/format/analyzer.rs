//! Section analysis
//!
//! Walks the tokens of one classified section and derives its semantic
//! metadata: kind, decimal parts, exponent pattern, fraction patterns,
//! thousands scaling, percentage flag and the translated date code.

use crate::error::Result;
use crate::format::classifier::ClassifiedSection;
use crate::format::tokenizer::{Token, TokenKind};

/// What a section formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// Plain or scientific number (scientific when the exponent pattern is
    /// non-empty)
    Decimal,
    Fraction,
    DateTime,
    Text,
}

/// Calendar granularity of a date/time section
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateTimeKind {
    None,
    Date,
    Time,
    DateTime,
}

/// A fully analyzed format section
#[derive(Debug, Clone)]
pub struct Section {
    pub tokens: Vec<Token>,
    pub kind: Kind,
    pub percentage: bool,
    pub prepend_minus: bool,
    pub thousands_scale: u32,
    pub use_thousands_sep: bool,
    /// Digit pattern left of the decimal point (commas included as collected)
    pub decimal_left: String,
    /// Digit pattern right of the decimal point; numerator pattern for
    /// fractions
    pub decimal_right: String,
    pub exponent_pattern: String,
    pub whole_values_pattern: String,
    pub datetime_kind: DateTimeKind,
}

impl Section {
    pub fn is_scientific(&self) -> bool {
        !self.exponent_pattern.is_empty()
            && !(self.decimal_left.is_empty() && self.decimal_right.is_empty())
    }
}

const FORMAT_DIGITS: &str = "0#?";

/// Analyze one classified section into its semantic form
pub fn analyze(classified: ClassifiedSection) -> Result<Section> {
    let ClassifiedSection {
        tokens,
        prepend_minus,
        ..
    } = classified;

    // Colors and conditions are spent; only currency brackets survive
    let mut tokens: Vec<Token> = tokens
        .into_iter()
        .filter(|t| t.bracket.is_none() || t.code.starts_with('$'))
        .collect();

    let mut section = Section {
        tokens: Vec::new(),
        kind: Kind::Text,
        percentage: false,
        prepend_minus,
        thousands_scale: 0,
        use_thousands_sep: false,
        decimal_left: String::new(),
        decimal_right: String::new(),
        exponent_pattern: String::new(),
        whole_values_pattern: String::new(),
        datetime_kind: DateTimeKind::None,
    };

    if is_datetime(&tokens) {
        analyze_datetime(&mut tokens, &mut section);
        section.tokens = tokens;
        return Ok(section);
    }

    section.percentage = tokens
        .iter()
        .any(|t| t.is_plain() && t.code.contains('%'));

    section.kind = detect_numeric_kind(&tokens);

    // Width directives: `_X` pads with one space, `*X` fill is not
    // representable without a column width and is dropped
    for token in tokens.iter_mut().filter(|t| t.is_plain()) {
        token.code = strip_width_directives(&token.code);
    }

    match section.kind {
        Kind::Fraction => {
            let (whole, numerator, denominator) = fraction_patterns(&tokens);
            section.whole_values_pattern = whole;
            section.decimal_left = numerator;
            section.decimal_right = denominator;
        }
        Kind::Decimal => {
            extract_decimal_fields(&tokens, &mut section);
            section.thousands_scale = trailing_commas(&section.decimal_left)
                + trailing_commas(&section.decimal_right);
            let trimmed = section
                .decimal_left
                .trim_start_matches(',')
                .trim_end_matches(',');
            section.use_thousands_sep = trimmed.contains(',');
        }
        _ => {}
    }

    section.tokens = tokens;
    Ok(section)
}

/// A section is date/time-kind iff some plain token contains one of
/// `y m d h s a`, case-insensitively
fn is_datetime(tokens: &[Token]) -> bool {
    tokens.iter().any(|t| {
        t.is_plain()
            && t.code
                .chars()
                .any(|c| "ymdhsa".contains(c.to_ascii_lowercase()))
    })
}

fn analyze_datetime(tokens: &mut [Token], section: &mut Section) {
    section.kind = Kind::DateTime;

    let twelve_hour = tokens.iter().any(|t| {
        t.is_plain() && t.code.chars().any(|c| c.to_ascii_lowercase() == 'a')
    });

    let mut has_date = false;
    let mut has_time = false;

    for token in tokens.iter_mut() {
        if token.is_plain() {
            token.code = translate_date_code(&token.code.to_lowercase(), twelve_hour);
            has_date |= token.code.chars().any(|c| "YyFMnmjlDd".contains(c));
            has_time |= token.code.chars().any(|c| "HGhisA".contains(c));
        } else if token.bracket.is_some() {
            // `[$text-hex]` currency prefixes render as their text part
            token.code = currency_text(&token.code).to_string();
            token.quoted = true;
            token.bracket = None;
        }
    }

    section.datetime_kind = match (has_date, has_time) {
        (true, true) => DateTimeKind::DateTime,
        (true, false) => DateTimeKind::Date,
        (false, true) => DateTimeKind::Time,
        (false, false) => DateTimeKind::None,
    };
}

/// Extract the display text of a `[$text-hex]` or `[$text]` currency token
pub fn currency_text(code: &str) -> &str {
    let text = code.strip_prefix('$').unwrap_or(code);
    match text.rfind('-') {
        Some(pos) if text[pos + 1..].chars().all(|c| c.is_ascii_hexdigit()) => &text[..pos],
        _ => text,
    }
}

/// XLSX date codes, lowercased, to the internal single-letter alphabet.
/// Longest match wins; the 12h table differs in its hour codes.
fn translate_date_code(code: &str, twelve_hour: bool) -> String {
    const RULES: &[(&str, &str)] = &[
        ("am/pm", "A"),
        ("mmmmm", "M"),
        ("yyyy", "Y"),
        ("mmmm", "F"),
        ("dddd", "l"),
        ("mmm", "M"),
        ("ddd", "D"),
        (":mm", ":i"),
        ("yy", "y"),
        ("mm", "m"),
        ("dd", "d"),
        ("ss", "s"),
        (".s", ""),
        ("m", "n"),
        ("d", "j"),
        ("\\", ""),
    ];

    let mut out = String::with_capacity(code.len());
    let bytes = code.as_bytes();
    let mut pos = 0;

    'outer: while pos < bytes.len() {
        let rest = &code[pos..];
        if rest.starts_with("hh") {
            out.push(if twelve_hour { 'h' } else { 'H' });
            pos += 2;
            continue;
        }
        if rest.starts_with('h') {
            out.push('G');
            pos += 1;
            continue;
        }
        for (pattern, replacement) in RULES {
            if rest.starts_with(pattern) {
                out.push_str(replacement);
                pos += pattern.len();
                continue 'outer;
            }
        }
        let Some(ch) = rest.chars().next() else {
            break;
        };
        out.push(ch);
        pos += ch.len_utf8();
    }
    out
}

fn detect_numeric_kind(tokens: &[Token]) -> Kind {
    let plain = tokens.iter().filter(|t| t.is_plain());
    if plain.clone().any(|t| t.code.contains('/')) {
        return Kind::Fraction;
    }
    let has_marker = tokens.iter().any(|t| t.is_marker());
    if has_marker
        || tokens
            .iter()
            .filter(|t| t.is_plain())
            .any(|t| t.code.chars().any(|c| "0#?.,/".contains(c)))
    {
        return Kind::Decimal;
    }
    Kind::Text
}

fn strip_width_directives(code: &str) -> String {
    let mut out = String::with_capacity(code.len());
    let mut chars = code.chars();
    while let Some(ch) = chars.next() {
        match ch {
            '_' => {
                chars.next();
                out.push(' ');
            }
            '*' => {
                chars.next();
            }
            _ => out.push(ch),
        }
    }
    out
}

/// Collect the digit patterns around the decimal point and behind the
/// scientific marker
fn extract_decimal_fields(tokens: &[Token], section: &mut Section) {
    #[derive(PartialEq)]
    enum Side {
        Left,
        Right,
        Exponent,
    }
    let mut side = Side::Left;

    for token in tokens {
        if token.kind == TokenKind::ScientificMarker {
            side = Side::Exponent;
            continue;
        }
        if !token.is_plain() {
            continue;
        }
        for ch in token.code.chars() {
            match ch {
                '.' if side == Side::Left => side = Side::Right,
                c if FORMAT_DIGITS.contains(c) || c == ',' => match side {
                    Side::Left => section.decimal_left.push(c),
                    Side::Right => section.decimal_right.push(c),
                    Side::Exponent => {
                        if FORMAT_DIGITS.contains(c) {
                            section.exponent_pattern.push(c);
                        }
                    }
                },
                _ => {}
            }
        }
    }
}

fn trailing_commas(pattern: &str) -> u32 {
    pattern.chars().rev().take_while(|c| *c == ',').count() as u32
}

/// Role of one pattern-character run inside a fraction section
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FractionRun {
    Whole,
    Numerator,
    Denominator,
    /// Format characters after the denominator; rendered literally
    Tail,
}

/// One visible element of a fraction section, in document order
#[derive(Debug, Clone, PartialEq)]
pub enum FractionEvent<'a> {
    /// A format character belonging to a pattern run
    Pattern(FractionRun, char),
    /// The structural `/` between numerator and denominator
    Slash,
    /// A literal character of a plain token
    Literal(char),
    /// A quoted token or the display text of a currency bracket
    Text(&'a str),
}

/// Walk a fraction section, calling `visit` for every visible element.
/// Dots and commas inside plain tokens are transparent and never visited.
///
/// Pattern runs before the slash: digits before the first break form the
/// whole-value pattern, the remainder forms the numerator. Digits after the
/// slash form the denominator until the first non-format character.
pub fn walk_fraction<'a, F: FnMut(FractionEvent<'a>)>(tokens: &'a [Token], mut visit: F) {
    // First pass: does a break occur between digit runs before the slash?
    let mut runs_before_slash = 0usize;
    let mut in_run = false;
    'count: for token in tokens {
        if !token.is_plain() {
            in_run = false;
            continue;
        }
        for ch in token.code.chars() {
            match ch {
                '/' => break 'count,
                c if FORMAT_DIGITS.contains(c) => {
                    if !in_run {
                        runs_before_slash += 1;
                        in_run = true;
                    }
                }
                '.' | ',' => {}
                _ => in_run = false,
            }
        }
        in_run = false;
    }

    let has_whole = runs_before_slash >= 2;
    let mut seen_slash = false;
    let mut seen_denominator = false;
    let mut run_index = 0usize;
    let mut in_run = false;

    for token in tokens {
        if !token.is_plain() {
            if in_run && seen_slash {
                seen_denominator = true;
            }
            in_run = false;
            let text = if token.bracket.is_some() {
                currency_text(&token.code)
            } else {
                token.code.as_str()
            };
            visit(FractionEvent::Text(text));
            continue;
        }
        for ch in token.code.chars() {
            match ch {
                '.' | ',' => continue,
                '/' if !seen_slash => {
                    seen_slash = true;
                    in_run = false;
                    visit(FractionEvent::Slash);
                }
                c if FORMAT_DIGITS.contains(c) => {
                    if !in_run {
                        run_index += 1;
                        in_run = true;
                    }
                    let run = if !seen_slash {
                        if has_whole && run_index == 1 {
                            FractionRun::Whole
                        } else {
                            FractionRun::Numerator
                        }
                    } else if !seen_denominator {
                        FractionRun::Denominator
                    } else {
                        FractionRun::Tail
                    };
                    visit(FractionEvent::Pattern(run, c));
                }
                c => {
                    if in_run && seen_slash {
                        seen_denominator = true;
                    }
                    in_run = false;
                    visit(FractionEvent::Literal(c));
                }
            }
        }
        if in_run && seen_slash {
            seen_denominator = true;
        }
        in_run = false;
    }
}

fn fraction_patterns(tokens: &[Token]) -> (String, String, String) {
    let mut whole = String::new();
    let mut numerator = String::new();
    let mut denominator = String::new();
    walk_fraction(tokens, |event| {
        if let FractionEvent::Pattern(run, ch) = event {
            match run {
                FractionRun::Whole => whole.push(ch),
                FractionRun::Numerator => numerator.push(ch),
                FractionRun::Denominator => denominator.push(ch),
                FractionRun::Tail => {}
            }
        }
    });
    (whole, numerator, denominator)
}
