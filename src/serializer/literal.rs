//! URL and JSON literal formatting.
//!
//! Floating-point values use the shortest digits that round-trip. They switch
//! to scientific notation when the decimal exponent reaches 15 (7 for
//! `Edm.Single`) or drops to -5, written as `1E+15` / `1E-05`. Durations use
//! the ISO 8601 `[-]P[nD][T[nH][nM][n[.fffffff]S]]` form.

use super::JsonWriter;
use crate::error::{ODataError, Result};
use crate::model::ODataValue;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, FixedOffset, NaiveTime, TimeDelta, Timelike};
use std::fmt::Write as _;
use std::io::Write;

const DOUBLE_EXPONENT_LIMIT: i32 = 15;
const SINGLE_EXPONENT_LIMIT: i32 = 7;
const SMALL_EXPONENT_LIMIT: i32 = -5;

/// Format a double in its canonical literal form.
#[must_use]
pub fn format_double(value: f64) -> String {
    if let Some(token) = non_finite(value.is_nan(), value.is_infinite(), value < 0.0) {
        return token.to_string();
    }
    format_float(&format!("{value:e}"), DOUBLE_EXPONENT_LIMIT)
}

/// Format a single-precision float in its canonical literal form.
#[must_use]
pub fn format_single(value: f32) -> String {
    if let Some(token) = non_finite(value.is_nan(), value.is_infinite(), value < 0.0) {
        return token.to_string();
    }
    format_float(&format!("{value:e}"), SINGLE_EXPONENT_LIMIT)
}

fn non_finite(nan: bool, infinite: bool, negative: bool) -> Option<&'static str> {
    match (nan, infinite, negative) {
        (true, _, _) => Some("NaN"),
        (false, true, true) => Some("-INF"),
        (false, true, false) => Some("INF"),
        _ => None,
    }
}

/// Lay out Rust's shortest `{:e}` digits in fixed or scientific notation.
fn format_float(scientific: &str, limit: i32) -> String {
    let (mantissa, exponent) = scientific.split_once('e').unwrap_or((scientific, "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);
    let (negative, mantissa) = match mantissa.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, mantissa),
    };
    let digits: String = mantissa.chars().filter(char::is_ascii_digit).collect();
    let sign = if negative { "-" } else { "" };

    if digits.bytes().all(|b| b == b'0') {
        return format!("{sign}0");
    }

    if exponent >= limit || exponent <= SMALL_EXPONENT_LIMIT {
        let (first, rest) = digits.split_at(1);
        let fraction = if rest.is_empty() {
            String::new()
        } else {
            format!(".{rest}")
        };
        let exp_sign = if exponent < 0 { '-' } else { '+' };
        return format!("{sign}{first}{fraction}E{exp_sign}{:02}", exponent.unsigned_abs());
    }

    let point = exponent + 1;
    let body = if point <= 0 {
        format!("0.{}{digits}", "0".repeat(point.unsigned_abs() as usize))
    } else if point as usize >= digits.len() {
        format!("{digits}{}", "0".repeat(point as usize - digits.len()))
    } else {
        let (int_part, frac_part) = digits.split_at(point as usize);
        format!("{int_part}.{frac_part}")
    };
    format!("{sign}{body}")
}

/// JSON number token for a finite float literal: integral fixed-point
/// values get a `.0` suffix so they stay floating-point on the wire.
fn json_float(literal: String) -> String {
    if literal.contains(['.', 'E']) {
        literal
    } else {
        format!("{literal}.0")
    }
}

/// Format a duration as an ISO 8601 period.
#[must_use]
pub fn format_duration(value: TimeDelta) -> String {
    let negative = value < TimeDelta::zero();
    let magnitude = value.abs();
    let total_seconds = magnitude.num_seconds();
    let ticks = magnitude.subsec_nanos().unsigned_abs() / 100;

    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3_600;
    let minutes = (total_seconds % 3_600) / 60;
    let seconds = total_seconds % 60;

    let mut out = String::new();
    if negative {
        out.push('-');
    }
    out.push('P');
    if days > 0 {
        let _ = write!(out, "{days}D");
    }
    if hours > 0 || minutes > 0 || seconds > 0 || ticks > 0 {
        out.push('T');
        if hours > 0 {
            let _ = write!(out, "{hours}H");
        }
        if minutes > 0 {
            let _ = write!(out, "{minutes}M");
        }
        if seconds > 0 || ticks > 0 {
            let _ = write!(out, "{seconds}{}S", fraction_of_ticks(ticks));
        }
    } else if days == 0 {
        out.push_str("T0S");
    }
    out
}

/// `.fffffff` with trailing zeros trimmed, or empty.
fn fraction_of_ticks(ticks: u32) -> String {
    if ticks == 0 {
        return String::new();
    }
    let digits = format!("{ticks:07}");
    format!(".{}", digits.trim_end_matches('0'))
}

/// Parse an ISO 8601 day-time period such as `-P1DT2H3M4.5S`.
pub fn parse_duration(text: &str) -> Result<TimeDelta> {
    let invalid = || ODataError::validation(format!("'{text}' is not a valid Edm.Duration"));

    let (negative, rest) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let rest = rest.strip_prefix('P').ok_or_else(invalid)?;
    let (date_part, time_part) = match rest.split_once('T') {
        Some((d, t)) if !t.is_empty() => (d, Some(t)),
        Some(_) => return Err(invalid()),
        None => (rest, None),
    };
    if date_part.is_empty() && time_part.is_none() {
        return Err(invalid());
    }

    let mut total = TimeDelta::zero();
    if !date_part.is_empty() {
        let days: i64 = date_part
            .strip_suffix('D')
            .and_then(|d| d.parse().ok())
            .ok_or_else(invalid)?;
        total = TimeDelta::try_days(days).ok_or_else(invalid)?;
    }

    if let Some(mut time) = time_part {
        for (unit, seconds_per_unit) in [('H', 3_600_i64), ('M', 60)] {
            if let Some((amount, remainder)) = time.split_once(unit) {
                let amount: i64 = amount.parse().map_err(|_| invalid())?;
                let part = amount
                    .checked_mul(seconds_per_unit)
                    .and_then(TimeDelta::try_seconds)
                    .ok_or_else(invalid)?;
                total = total.checked_add(&part).ok_or_else(invalid)?;
                time = remainder;
            }
        }
        if !time.is_empty() {
            let seconds = time.strip_suffix('S').ok_or_else(invalid)?;
            let (whole, fraction) = seconds.split_once('.').unwrap_or((seconds, ""));
            let whole: i64 = whole.parse().map_err(|_| invalid())?;
            if fraction.len() > 7 || !fraction.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid());
            }
            let ticks: i64 = if fraction.is_empty() {
                0
            } else {
                format!("{fraction:0<7}").parse().map_err(|_| invalid())?
            };
            total = TimeDelta::try_seconds(whole)
                .and_then(|part| total.checked_add(&part))
                .and_then(|sum| sum.checked_add(&TimeDelta::nanoseconds(ticks * 100)))
                .ok_or_else(invalid)?;
        }
    }

    Ok(if negative { -total } else { total })
}

/// RFC 3339 with `Z` for a zero offset and trimmed fractional seconds.
#[must_use]
pub fn format_date_time_offset(value: &DateTime<FixedOffset>) -> String {
    let mut out = value.format("%Y-%m-%dT%H:%M:%S").to_string();
    out.push_str(&fraction_of_ticks(value.nanosecond() % 1_000_000_000 / 100));
    let offset = value.offset().local_minus_utc();
    if offset == 0 {
        out.push('Z');
    } else {
        let sign = if offset < 0 { '-' } else { '+' };
        let minutes = offset.unsigned_abs() / 60;
        let _ = write!(out, "{sign}{:02}:{:02}", minutes / 60, minutes % 60);
    }
    out
}

/// `hh:mm:ss[.fffffff]`.
#[must_use]
pub fn format_time_of_day(value: &NaiveTime) -> String {
    let mut out = value.format("%H:%M:%S").to_string();
    out.push_str(&fraction_of_ticks(value.nanosecond() % 1_000_000_000 / 100));
    out
}

/// Format a value as a URL literal (key predicates, function parameters).
pub fn format_uri_literal(value: &ODataValue) -> Result<String> {
    Ok(match value {
        ODataValue::Null => "null".to_string(),
        ODataValue::Boolean(b) => b.to_string(),
        ODataValue::Byte(v) => v.to_string(),
        ODataValue::SByte(v) => v.to_string(),
        ODataValue::Int16(v) => v.to_string(),
        ODataValue::Int32(v) => v.to_string(),
        ODataValue::Int64(v) => v.to_string(),
        ODataValue::Single(v) => format_single(*v),
        ODataValue::Double(v) => format_double(*v),
        ODataValue::Decimal(text) | ODataValue::Guid(text) => text.clone(),
        ODataValue::String(text) => format!("'{}'", text.replace('\'', "''")),
        ODataValue::Date(date) => date.format("%Y-%m-%d").to_string(),
        ODataValue::TimeOfDay(time) => format_time_of_day(time),
        ODataValue::DateTimeOffset(dt) => format_date_time_offset(dt),
        ODataValue::Duration(duration) => format!("duration'{}'", format_duration(*duration)),
        ODataValue::Binary(bytes) => format!("binary'{}'", BASE64.encode(bytes)),
        ODataValue::Enum { type_name, member } => {
            format!("{type_name}'{}'", member.replace('\'', "''"))
        }
        ODataValue::Collection(_) | ODataValue::Complex(_) => {
            let mut writer = JsonWriter::new(Vec::new(), false);
            write_json_value(&mut writer, value, false)?;
            String::from_utf8_lossy(&writer.into_inner()?).into_owned()
        }
    })
}

/// Write a value as a JSON token.
///
/// With `ieee754_compatible`, `Edm.Int64` and `Edm.Decimal` are written as
/// strings so JavaScript clients do not lose precision.
pub fn write_json_value<W: Write>(
    writer: &mut JsonWriter<W>,
    value: &ODataValue,
    ieee754_compatible: bool,
) -> Result<()> {
    match value {
        ODataValue::Null => writer.null(),
        ODataValue::Boolean(b) => writer.bool(*b),
        ODataValue::Byte(v) => writer.number(&v.to_string()),
        ODataValue::SByte(v) => writer.number(&v.to_string()),
        ODataValue::Int16(v) => writer.number(&v.to_string()),
        ODataValue::Int32(v) => writer.number(&v.to_string()),
        ODataValue::Int64(v) if ieee754_compatible => writer.string(&v.to_string()),
        ODataValue::Int64(v) => writer.number(&v.to_string()),
        ODataValue::Decimal(text) if ieee754_compatible => writer.string(text),
        ODataValue::Decimal(text) => writer.number(text),
        ODataValue::Single(v) if v.is_finite() => writer.number(&json_float(format_single(*v))),
        ODataValue::Single(v) => writer.string(&format_single(*v)),
        ODataValue::Double(v) if v.is_finite() => writer.number(&json_float(format_double(*v))),
        ODataValue::Double(v) => writer.string(&format_double(*v)),
        ODataValue::String(text) | ODataValue::Guid(text) => writer.string(text),
        ODataValue::Date(date) => writer.string(&date.format("%Y-%m-%d").to_string()),
        ODataValue::TimeOfDay(time) => writer.string(&format_time_of_day(time)),
        ODataValue::DateTimeOffset(dt) => writer.string(&format_date_time_offset(dt)),
        ODataValue::Duration(duration) => writer.string(&format_duration(*duration)),
        ODataValue::Binary(bytes) => writer.string(&BASE64.encode(bytes)),
        ODataValue::Enum { member, .. } => writer.string(member),
        ODataValue::Collection(items) => {
            writer.begin_array()?;
            for item in items {
                write_json_value(writer, item, ieee754_compatible)?;
            }
            writer.end_array()
        }
        ODataValue::Complex(properties) => {
            writer.begin_object()?;
            for (name, item) in properties {
                writer.key(name)?;
                write_json_value(writer, item, ieee754_compatible)?;
            }
            writer.end_object()
        }
    }
}
