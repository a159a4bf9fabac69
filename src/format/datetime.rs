//! XLSX serial-date conversion and date-code rendering
//!
//! Serial values count days from 1899-12-30T00:00 UTC (the epoch that
//! absorbs the Lotus 1-2-3 leap-year quirk); values above 60 carry a
//! one-day compensation. The rendered codes use the internal single-letter
//! alphabet produced by the analyzer's translation table.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Timelike};

const MONTHS: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

const WEEKDAYS: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

fn base_date() -> NaiveDateTime {
    // Day zero of the serial calendar. Together with the one-day
    // compensation for serials past the phantom 1900-02-29 this reproduces
    // the dates spreadsheet applications display.
    NaiveDate::from_ymd_opt(1899, 12, 31)
        .unwrap_or_default()
        .and_hms_opt(0, 0, 0)
        .unwrap_or_default()
}

/// Convert an XLSX serial value to a timestamp
///
/// Returns `None` when the value is outside chrono's representable range.
pub fn serial_to_datetime(v: f64) -> Option<NaiveDateTime> {
    if !v.is_finite() {
        return None;
    }

    let mut days = v.trunc() as i64;
    if days > 60 {
        days -= 1;
    }
    let seconds = (v.fract() * 86400.0).round() as i64;

    let base = base_date();
    if v < 0.0 {
        base.checked_sub_signed(Duration::days(days.abs() + 1))?
            .checked_sub_signed(Duration::seconds(seconds.abs()))
    } else {
        base.checked_add_signed(Duration::days(days))?
            .checked_add_signed(Duration::seconds(seconds))
    }
}

/// Render a translated date code against a timestamp; characters outside
/// the internal alphabet are literal
pub fn render_code(code: &str, ts: &NaiveDateTime) -> String {
    use std::fmt::Write;

    let mut out = String::with_capacity(code.len() * 2);
    for ch in code.chars() {
        match ch {
            'Y' => {
                let _ = write!(out, "{:04}", ts.year());
            }
            'y' => {
                let _ = write!(out, "{:02}", ts.year().rem_euclid(100));
            }
            'F' => out.push_str(MONTHS[ts.month0() as usize]),
            'M' => out.push_str(&MONTHS[ts.month0() as usize][..3]),
            'n' => {
                let _ = write!(out, "{}", ts.month());
            }
            'm' => {
                let _ = write!(out, "{:02}", ts.month());
            }
            'l' => out.push_str(WEEKDAYS[ts.weekday().num_days_from_monday() as usize]),
            'D' => out.push_str(&WEEKDAYS[ts.weekday().num_days_from_monday() as usize][..3]),
            'j' => {
                let _ = write!(out, "{}", ts.day());
            }
            'd' => {
                let _ = write!(out, "{:02}", ts.day());
            }
            'H' => {
                let _ = write!(out, "{:02}", ts.hour());
            }
            'G' => {
                let _ = write!(out, "{}", ts.hour());
            }
            'h' => {
                let hour = match ts.hour() % 12 {
                    0 => 12,
                    h => h,
                };
                let _ = write!(out, "{:02}", hour);
            }
            'i' => {
                let _ = write!(out, "{:02}", ts.minute());
            }
            's' => {
                let _ = write!(out, "{:02}", ts.second());
            }
            'A' => out.push_str(if ts.hour() < 12 { "AM" } else { "PM" }),
            other => out.push(other),
        }
    }
    out
}
