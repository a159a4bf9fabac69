//! Value formatting
//!
//! Applies a parsed format to one raw cell value: selects the matching
//! section, pre-scales percentages, and renders through the decimal,
//! scientific, fraction, date/time or text sub-formatter.

use crate::format::analyzer::{
    currency_text, walk_fraction, DateTimeKind, FractionEvent, FractionRun, Kind, Section,
};
use crate::format::datetime::{render_code, serial_to_datetime};
use crate::format::ParsedFormat;
use chrono::NaiveDateTime;

/// Output switches, a projection of the reader options
#[derive(Debug, Clone, Default)]
pub struct FormatBehavior {
    pub return_unformatted: bool,
    pub return_percentage_decimal: bool,
    pub return_date_time_objects: bool,
    pub force_date_format: Option<String>,
    pub force_time_format: Option<String>,
    pub force_datetime_format: Option<String>,
}

/// A formatted cell value
#[derive(Debug, Clone, PartialEq)]
pub enum Formatted {
    Text(String),
    DateTime(NaiveDateTime),
}

impl Formatted {
    pub fn into_string(self) -> String {
        match self {
            Formatted::Text(s) => s,
            Formatted::DateTime(ts) => ts.to_string(),
        }
    }
}

/// Format one raw value against a parsed format
///
/// Non-numeric input is routed to the text fallback and never fails; a
/// parsed format always carries catching defaults for both categories.
pub fn format_value(parsed: &ParsedFormat, raw: &str, behavior: &FormatBehavior) -> Formatted {
    match raw.trim().parse::<f64>() {
        Ok(v) if v.is_finite() => format_numeric(parsed, raw, v, behavior),
        _ => {
            let section = match parsed.section_for_text() {
                Some(section) => section,
                None => return Formatted::Text(raw.to_string()),
            };
            Formatted::Text(render_text(section, raw))
        }
    }
}

fn format_numeric(
    parsed: &ParsedFormat,
    raw: &str,
    value: f64,
    behavior: &FormatBehavior,
) -> Formatted {
    let section = match parsed.section_for_numeric(value) {
        Some(section) => section,
        None => return Formatted::Text(raw.to_string()),
    };

    let mut v = value;
    if section.percentage {
        if behavior.return_percentage_decimal {
            return Formatted::Text(raw.to_string());
        }
        v *= 100.0;
    }
    if behavior.return_unformatted {
        return if section.percentage {
            Formatted::Text(plain_number(v))
        } else {
            Formatted::Text(raw.to_string())
        };
    }

    match section.kind {
        Kind::DateTime => format_datetime(section, v, raw, behavior),
        Kind::Fraction => Formatted::Text(render_fraction(section, v)),
        Kind::Decimal => Formatted::Text(render_decimal(section, v, raw)),
        Kind::Text => Formatted::Text(render_text(section, raw)),
    }
}

/// The General format: scientific-notation literals are re-rendered in
/// plain decimal, everything else passes through verbatim
pub fn format_general(raw: &str) -> String {
    if !is_scientific_literal(raw) {
        return raw.to_string();
    }
    match raw.parse::<f64>() {
        Ok(v) => {
            let mut s = format!("{:.10}", v);
            if s.contains('.') {
                while s.ends_with('0') {
                    s.pop();
                }
                if s.ends_with('.') {
                    s.pop();
                }
            }
            s
        }
        Err(_) => raw.to_string(),
    }
}

/// Matches `\d+(\.\d+)?E[+-]\d+`
fn is_scientific_literal(raw: &str) -> bool {
    let Some((mantissa, exponent)) = raw.split_once('E') else {
        return false;
    };
    let mantissa_ok = match mantissa.split_once('.') {
        Some((int, frac)) => {
            !int.is_empty()
                && !frac.is_empty()
                && int.chars().all(|c| c.is_ascii_digit())
                && frac.chars().all(|c| c.is_ascii_digit())
        }
        None => !mantissa.is_empty() && mantissa.chars().all(|c| c.is_ascii_digit()),
    };
    let exponent_ok = exponent
        .strip_prefix(['+', '-'])
        .map(|d| !d.is_empty() && d.chars().all(|c| c.is_ascii_digit()))
        .unwrap_or(false);
    mantissa_ok && exponent_ok
}

/// Shortest plain (never scientific) rendering of a float
fn plain_number(v: f64) -> String {
    if v == v.trunc() && v.abs() < 9.2e18 {
        let mut buf = itoa::Buffer::new();
        buf.format(v as i64).to_string()
    } else {
        format!("{}", v)
    }
}

const FORMAT_DIGITS: &str = "0#?";

/// Fit an integer magnitude into a `0#?` pattern, right to left. Overflow
/// digits are prepended as-is.
fn pad_number(digits: &str, pattern: &str) -> String {
    let digit_chars: Vec<char> = digits.chars().collect();
    let mut remaining = digit_chars.len();
    let mut out: Vec<char> = Vec::with_capacity(pattern.len().max(remaining));

    for p in pattern.chars().rev() {
        match p {
            '0' => {
                if remaining > 0 {
                    remaining -= 1;
                    out.push(digit_chars[remaining]);
                } else {
                    out.push('0');
                }
            }
            '?' => {
                if remaining > 0 {
                    remaining -= 1;
                    out.push(digit_chars[remaining]);
                } else {
                    out.push(' ');
                }
            }
            '#' => {
                if remaining > 0 {
                    remaining -= 1;
                    out.push(digit_chars[remaining]);
                }
            }
            _ => {}
        }
    }
    for i in (0..remaining).rev() {
        out.push(digit_chars[i]);
    }
    out.iter().rev().collect()
}

/// Fit a decimal tail into a `0#?` pattern, left to right
fn pad_tail(digits: &str, pattern: &str) -> String {
    let mut iter = digits.chars();
    let mut out = String::with_capacity(pattern.len());
    for p in pattern.chars() {
        match p {
            '0' => out.push(iter.next().unwrap_or('0')),
            '?' => out.push(iter.next().unwrap_or(' ')),
            '#' => {
                if let Some(d) = iter.next() {
                    out.push(d);
                }
            }
            _ => {}
        }
    }
    out
}

/// Insert a separator every three characters from the right. A `?`-padding
/// space feeding a boundary turns that separator into a space.
fn group_thousands(padded: &str) -> String {
    let chars: Vec<char> = padded.chars().collect();
    let len = chars.len();
    let mut out = String::with_capacity(len + len / 3);
    for (i, ch) in chars.iter().enumerate() {
        out.push(*ch);
        let from_right = len - 1 - i;
        if from_right > 0 && from_right % 3 == 0 {
            out.push(if *ch == ' ' { ' ' } else { ',' });
        }
    }
    out
}

fn strip_commas(pattern: &str) -> String {
    pattern.chars().filter(|c| *c != ',').collect()
}

/// Round a magnitude to the pattern's precision (ties away from zero) and
/// split into the integer digits and the trailing-zero-trimmed fractional
/// digits
fn fixed_digits(magnitude: f64, precision: usize) -> (String, String) {
    let factor = 10f64.powi(precision as i32);
    let scaled = (magnitude * factor).round();

    if !(0.0..1e27).contains(&scaled) {
        let fixed = format!("{:.*}", precision, magnitude);
        let (int_part, frac_part) = match fixed.split_once('.') {
            Some((i, f)) => (i.to_string(), f.to_string()),
            None => (fixed, String::new()),
        };
        return (int_part, frac_part.trim_end_matches('0').to_string());
    }

    let mut digits = (scaled as u128).to_string();
    if digits.len() <= precision {
        digits.insert_str(0, &"0".repeat(precision + 1 - digits.len()));
    }
    let (int_part, frac_part) = digits.split_at(digits.len() - precision);
    (
        int_part.to_string(),
        frac_part.trim_end_matches('0').to_string(),
    )
}

struct ExponentOut {
    value: i64,
    digits: String,
}

fn render_decimal(section: &Section, v: f64, raw: &str) -> String {
    let negative = v < 0.0;
    let left_pattern = strip_commas(&section.decimal_left);
    let right_pattern = strip_commas(&section.decimal_right);

    let (magnitude, exponent) = if section.is_scientific() {
        let (scaled, e) = scientific_scale(v.abs(), left_pattern.len());
        (
            scaled,
            Some(ExponentOut {
                value: e,
                digits: pad_number(&e.abs().to_string(), &section.exponent_pattern),
            }),
        )
    } else {
        let scale = 1000f64.powi(section.thousands_scale as i32);
        (v.abs() / scale, None)
    };

    let (int_digits, frac_digits) = fixed_digits(magnitude, right_pattern.len());

    let padded = pad_number(&int_digits, &left_pattern);
    let mut left_out = if section.use_thousands_sep {
        group_thousands(&padded)
    } else {
        padded
    };
    let leading_commas: String = section
        .decimal_left
        .chars()
        .take_while(|c| *c == ',')
        .collect();
    if !leading_commas.is_empty() {
        left_out.insert_str(0, &leading_commas);
    }
    let right_out = pad_tail(&frac_digits, &right_pattern);

    let mut out = assemble(section, &left_out, &right_out, exponent.as_ref(), raw);
    if negative && section.prepend_minus {
        out.insert(0, '-');
    }
    out
}

/// Exponent choice for scientific rendering: normalize the magnitude so the
/// integer part fills the left pattern, from the `%.99f` expansion
fn scientific_scale(magnitude: f64, left_len: usize) -> (f64, i64) {
    if magnitude == 0.0 {
        return (0.0, 0);
    }
    let expanded = format!("{:.99}", magnitude);
    let (int_part, frac_part) = expanded.split_once('.').unwrap_or((expanded.as_str(), ""));

    let mut e: i64 = 0;
    if magnitude < 1.0 {
        let zeros = frac_part.chars().take_while(|c| *c == '0').count();
        e = -(zeros as i64 + 1);
    }
    e += int_part.len() as i64 - left_len as i64;

    (magnitude * 10f64.powi(-e as i32), e)
}

/// Token walk shared by plain and scientific decimals. Pattern characters
/// are replaced by the prepared digit streams, the first on each side
/// emitting the whole stream; everything else is literal.
fn assemble(
    section: &Section,
    left_out: &str,
    right_out: &str,
    exponent: Option<&ExponentOut>,
    raw: &str,
) -> String {
    #[derive(PartialEq)]
    enum Side {
        Left,
        Right,
        Exponent,
    }

    let mut out = String::new();
    let mut side = Side::Left;
    let mut left_done = false;
    let mut right_done = false;
    let mut exp_done = false;

    for token in &section.tokens {
        if token.is_marker() {
            side = Side::Exponent;
            if let Some(exp) = exponent {
                out.push(token.code.chars().next().unwrap_or('E'));
                if exp.value < 0 {
                    out.push('-');
                } else if token.code.ends_with('+') {
                    out.push('+');
                }
            }
            continue;
        }
        if token.quoted {
            out.push_str(&token.code);
            continue;
        }
        if token.bracket.is_some() {
            if token.code.starts_with('$') {
                out.push_str(currency_text(&token.code));
            }
            continue;
        }
        for ch in token.code.chars() {
            match ch {
                '.' if side == Side::Left => {
                    side = Side::Right;
                    out.push('.');
                }
                c if FORMAT_DIGITS.contains(c) || c == ',' => match side {
                    Side::Left => {
                        if !left_done {
                            out.push_str(left_out);
                            left_done = true;
                        }
                    }
                    Side::Right => {
                        if !right_done {
                            out.push_str(right_out);
                            right_done = true;
                        }
                    }
                    Side::Exponent => {
                        if !exp_done {
                            if let Some(exp) = exponent {
                                out.push_str(&exp.digits);
                            }
                            exp_done = true;
                        }
                    }
                },
                '@' => out.push_str(raw),
                other => out.push(other),
            }
        }
    }
    out
}

fn gcd(mut a: u128, mut b: u128) -> u128 {
    while b != 0 {
        let t = b;
        b = a % b;
        a = t;
    }
    a.max(1)
}

/// Decompose a magnitude into (whole, numerator, denominator) per the
/// section's fraction patterns
fn fraction_parts(section: &Section, magnitude: f64) -> (u128, u128, u128) {
    let has_whole = !section.whole_values_pattern.is_empty();

    if magnitude == magnitude.trunc() && magnitude < 1e27 {
        let n = magnitude as u128;
        return if has_whole { (n, 0, 0) } else { (0, n, 1) };
    }

    let mut s = plain_number(magnitude);
    if let Some((_, frac)) = s.split_once('.') {
        // Keep the exact-decimal math inside u128 range
        if frac.len() > 15 {
            s = format!("{:.15}", magnitude);
            while s.ends_with('0') {
                s.pop();
            }
        }
    }
    let (int_part, frac_part) = s.split_once('.').unwrap_or((s.as_str(), ""));
    let denom = 10u128.pow(frac_part.len() as u32);
    let num: u128 = format!("{}{}", int_part, frac_part).parse().unwrap_or(0);

    let g = gcd(num, denom);
    let (mut num, denom) = (num / g, denom / g);

    let mut whole = 0u128;
    if has_whole && magnitude > 1.0 {
        whole = num / denom;
        num %= denom;
    }
    (whole, num, denom)
}

fn render_fraction(section: &Section, v: f64) -> String {
    let negative = v < 0.0;
    let (whole, num, den) = fraction_parts(section, v.abs());

    let emit_whole = !section.whole_values_pattern.is_empty()
        && !(whole == 0 && !section.whole_values_pattern.contains('0'));
    let emit_frac = !(num == 0 && den == 0);

    let mut buf = itoa::Buffer::new();
    let whole_str = pad_number(buf.format(whole), &section.whole_values_pattern);
    let mut buf = itoa::Buffer::new();
    let num_str = pad_number(buf.format(num), &section.decimal_left);
    let mut buf = itoa::Buffer::new();
    let den_str = pad_number(buf.format(den), &section.decimal_right);

    let mut out = String::new();
    let mut pending = String::new();
    let mut whole_seen = false;
    let mut num_seen = false;
    let mut den_seen = false;
    let mut last_skipped = false;

    // A literal run leading into a skipped sub-stream is dropped with it;
    // runs before the first and after the last sub-stream always render
    let stream =
        |out: &mut String, pending: &mut String, active: bool, text: &str, last_skipped: &mut bool| {
            if active {
                if *last_skipped {
                    pending.clear();
                }
                out.push_str(pending);
                pending.clear();
                out.push_str(text);
                *last_skipped = false;
            } else {
                pending.clear();
                *last_skipped = true;
            }
        };

    walk_fraction(&section.tokens, |event| match event {
        FractionEvent::Text(text) => pending.push_str(text),
        FractionEvent::Literal(c) => pending.push(c),
        FractionEvent::Slash => {
            if emit_frac {
                if last_skipped {
                    pending.clear();
                }
                out.push_str(&pending);
                pending.clear();
                out.push('/');
                last_skipped = false;
            } else {
                pending.clear();
                last_skipped = true;
            }
        }
        FractionEvent::Pattern(run, c) => match run {
            FractionRun::Whole => {
                if !whole_seen {
                    whole_seen = true;
                    stream(&mut out, &mut pending, emit_whole, &whole_str, &mut last_skipped);
                }
            }
            FractionRun::Numerator => {
                if !num_seen {
                    num_seen = true;
                    stream(&mut out, &mut pending, emit_frac, &num_str, &mut last_skipped);
                }
            }
            FractionRun::Denominator => {
                if !den_seen {
                    den_seen = true;
                    stream(&mut out, &mut pending, emit_frac, &den_str, &mut last_skipped);
                }
            }
            FractionRun::Tail => pending.push(c),
        },
    });
    out.push_str(&pending);

    if negative && section.prepend_minus {
        out.insert(0, '-');
    }
    out
}

fn format_datetime(
    section: &Section,
    v: f64,
    raw: &str,
    behavior: &FormatBehavior,
) -> Formatted {
    let Some(ts) = serial_to_datetime(v) else {
        return Formatted::Text(raw.to_string());
    };

    if behavior.return_date_time_objects {
        return Formatted::DateTime(ts);
    }

    let forced = match section.datetime_kind {
        DateTimeKind::Date => behavior.force_date_format.as_deref(),
        DateTimeKind::Time => behavior.force_time_format.as_deref(),
        DateTimeKind::DateTime => behavior.force_datetime_format.as_deref(),
        DateTimeKind::None => None,
    };
    if let Some(pattern) = forced {
        return Formatted::Text(render_code(pattern, &ts));
    }

    let mut out = String::new();
    for token in &section.tokens {
        if token.quoted {
            out.push_str(&token.code);
        } else if token.bracket.is_some() {
            // Elapsed-time and color brackets render nothing
        } else {
            out.push_str(&render_code(&token.code, &ts));
        }
    }
    Formatted::Text(out)
}

fn render_text(section: &Section, raw: &str) -> String {
    let mut out = String::new();
    for token in &section.tokens {
        if token.quoted {
            out.push_str(&token.code);
        } else if token.bracket.is_some() {
            if token.code.starts_with('$') {
                out.push_str(currency_text(&token.code));
            }
        } else {
            out.push_str(&token.code.replace('@', raw));
        }
    }
    out
}
