use chrono::{DateTime, Utc};

use crate::error::TypeError;

/// Decimal places of the native token (lamports per SOL = 10^9).
pub const LAMPORTS_DECIMALS: u8 = 9;

/// Parse a decimal price into base units with `decimals` fractional digits.
///
/// Fractions finer than the smallest unit round up, so a buyer never pays
/// less than the operator asked for.
pub fn parse_price(input: &str, decimals: u8) -> Result<u64, TypeError> {
    let s = input.trim();
    let invalid = || TypeError::InvalidPrice(input.to_string());
    if s.is_empty() || s.starts_with('-') {
        return Err(invalid());
    }

    let (whole, frac) = match s.split_once('.') {
        Some((w, f)) => (w, f),
        None => (s, ""),
    };
    if whole.is_empty() && frac.is_empty() {
        return Err(invalid());
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) || !frac.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }

    let scale = 10u64.checked_pow(decimals as u32).ok_or_else(invalid)?;
    let whole: u64 = if whole.is_empty() { 0 } else { whole.parse().map_err(|_| invalid())? };

    let digits = decimals as usize;
    let (kept, dropped) = if frac.len() > digits {
        frac.split_at(digits)
    } else {
        (frac, "")
    };
    let mut frac_units: u64 = if kept.is_empty() {
        0
    } else {
        let padded = format!("{kept:0<digits$}");
        padded.parse().map_err(|_| invalid())?
    };
    if dropped.chars().any(|c| c != '0') {
        frac_units += 1;
    }

    whole
        .checked_mul(scale)
        .and_then(|w| w.checked_add(frac_units))
        .ok_or_else(invalid)
}

/// Parse a go-live date into a unix timestamp.
///
/// Accepts `now`, RFC 3339 (`2021-12-25T00:00:00Z`) and RFC 2822
/// (`25 Dec 2021 00:00:00 GMT`).
pub fn parse_go_live_date(input: &str) -> Result<i64, TypeError> {
    let s = input.trim();
    if s.eq_ignore_ascii_case("now") {
        return Ok(Utc::now().timestamp());
    }
    DateTime::parse_from_rfc3339(s)
        .or_else(|_| DateTime::parse_from_rfc2822(s))
        .map(|d| d.timestamp())
        .map_err(|e| TypeError::InvalidDate(format!("{s}: {e}")))
}
