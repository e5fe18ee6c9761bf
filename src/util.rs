// Numeric, rounding and reporting-period helpers.
//
// This module centralizes the "dirty" CSV/number handling plus the
// financial-year arithmetic so the rest of the code can assume clean,
// typed values and well-formed period labels.
use crate::error::PipelineError;
use chrono::NaiveDate;
use num_format::{Locale, ToFormattedString};
use rust_decimal::prelude::*;

/// Parse a string-like value into `f64` while being forgiving about
/// formatting issues that are common in CSV exports (commas, spaces, text).
///
/// - Accepts `Option<&str>` so callers can pass through optional fields.
/// - Trims whitespace.
/// - Rejects values that contain alphabetic characters.
/// - Strips thousands separators like `","` before parsing.
/// - Returns `None` for anything that cannot be safely parsed.
pub fn parse_f64_safe(s: Option<&str>) -> Option<f64> {
    let s = s?.trim();
    if s.is_empty() {
        return None;
    }
    if s.chars().any(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    let s = s.replace(',', "");
    s.parse::<f64>().ok()
}

/// Round a number to the given number of decimal places, rounding up on
/// >=5 and down on <5. Negative numbers round away from zero, so
/// `(-0.5, 0)` gives `-1`.
///
/// Uses decimal arithmetic rather than float tricks so that values like
/// 2.675 round the way a statistician expects.
pub fn round_half_up(n: f64, decimals: u32) -> f64 {
    // Non-finite values pass straight through, as there is no sensible
    // rounded representation for them.
    let Some(d) = Decimal::from_f64(n) else {
        return n;
    };
    d.round_dp_with_strategy(decimals, RoundingStrategy::MidpointAwayFromZero)
        .to_f64()
        .unwrap_or(n)
}

/// Round a count to the nearest multiple of `base`, breaking exact
/// midpoints towards the even multiple (banker's rounding). Used by the
/// disclosure-control rounding of counts above the suppression band.
pub fn round_to_base(n: f64, base: u32) -> f64 {
    let base = f64::from(base);
    let Some(q) = Decimal::from_f64(n / base) else {
        return n;
    };
    let rounded = q
        .round_dp_with_strategy(0, RoundingStrategy::MidpointNearestEven)
        .to_f64()
        .unwrap_or(n / base);
    rounded * base
}

/// Percentage or rate from a numerator and denominator. A zero
/// denominator has no defined rate, so the result is `None` rather than
/// zero or an error.
pub fn percent_or_rate(numerator: f64, denominator: f64, multiplier: f64) -> Option<f64> {
    if denominator == 0.0 {
        None
    } else {
        Some(numerator / denominator * multiplier)
    }
}

/// From a financial year start date (DDMMMYYYY, e.g. "01APR2022") create
/// the financial year label (YYYY-YY, e.g. "2022-23").
pub fn fyear_from_start(year_start: &str) -> Result<String, PipelineError> {
    let start_year = year_start
        .get(5..9)
        .and_then(|y| y.parse::<i32>().ok())
        .ok_or_else(|| PipelineError::InvalidArgument {
            name: "financial year start".to_string(),
            value: year_start.to_string(),
            valid: vec!["DDMMMYYYY e.g. 01APR2022".to_string()],
        })?;
    Ok(format!("{}-{:02}", start_year, (start_year + 1) % 100))
}

/// Create the list of financial year labels for a trailing window, given
/// the end year and the number of years to include. The end year is
/// included and the list is ordered oldest first.
///
/// `fyear_range("2022-23", 3)` -> `["2020-21", "2021-22", "2022-23"]`
pub fn fyear_range(end_year: &str, year_span: usize) -> Result<Vec<String>, PipelineError> {
    let start = end_year
        .get(0..4)
        .and_then(|y| y.parse::<i32>().ok())
        .ok_or_else(|| PipelineError::InvalidArgument {
            name: "financial year".to_string(),
            value: end_year.to_string(),
            valid: vec!["YYYY-YY e.g. 2022-23".to_string()],
        })?;

    let mut years: Vec<String> = (0..year_span)
        .map(|n| {
            let y = start - n as i32;
            format!("{}-{:02}", y, (y + 1) % 100)
        })
        .collect();
    years.reverse();
    Ok(years)
}

/// Year start and end dates for a standard financial year label
/// (1 April to 31 March).
pub fn fyear_start_end(fyear: &str) -> Result<(NaiveDate, NaiveDate), PipelineError> {
    let invalid = || PipelineError::InvalidArgument {
        name: "financial year".to_string(),
        value: fyear.to_string(),
        valid: vec!["YYYY-YY e.g. 2022-23".to_string()],
    };
    let start_year = fyear
        .get(0..4)
        .and_then(|y| y.parse::<i32>().ok())
        .ok_or_else(invalid)?;
    let start = NaiveDate::from_ymd_opt(start_year, 4, 1).ok_or_else(invalid)?;
    let end = NaiveDate::from_ymd_opt(start_year + 1, 3, 31).ok_or_else(invalid)?;
    Ok((start, end))
}

pub fn format_int<T>(n: T) -> String
where
    T: ToFormattedString,
{
    // Thin wrapper around `num-format` for counts in console messages
    // (e.g. `9,855 rows loaded`).
    n.to_formatted_string(&Locale::en)
}
