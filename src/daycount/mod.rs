//! Year-fraction conventions and frequency-token arithmetic.
//!
//! Every other component that measures time between two dates goes through
//! `yearfrac`, and every component that steps a date forward by a repricing
//! or payment period goes through `parse_frequency_token` + `add_frequency`.
//! Neither function consults a position's other fields — they are pure
//! date/string arithmetic, which is what makes the cashflow generator able
//! to treat daycount as an interchangeable strategy per contract.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// Closed set of day-count conventions a contract can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DaycountBase {
    #[serde(rename = "ACT/360")]
    Act360,
    #[serde(rename = "ACT/365")]
    Act365,
    #[serde(rename = "30/360")]
    Thirty360,
}

impl DaycountBase {
    /// Parse a canonical daycount token, e.g. `"ACT/360"`. Unknown tokens
    /// are an `InvalidInput`, not a silent default — a mis-typed daycount
    /// would otherwise misprice every flow on the contract.
    pub fn parse(token: &str, contract_id: Option<&str>) -> EngineResult<Self> {
        match token.trim() {
            "ACT/360" => Ok(DaycountBase::Act360),
            "ACT/365" => Ok(DaycountBase::Act365),
            "30/360" => Ok(DaycountBase::Thirty360),
            other => Err(EngineError::invalid_input(
                contract_id.map(str::to_string),
                format!("unrecognised daycount base: {other:?}"),
            )),
        }
    }
}

/// Year fraction between `start` and `end` under `base`. Negative when
/// `end < start` — callers that require a forward-only interval check that
/// themselves (see `InconsistentSchedule`).
pub fn yearfrac(start: NaiveDate, end: NaiveDate, base: DaycountBase) -> f64 {
    match base {
        DaycountBase::Act360 => (end - start).num_days() as f64 / 360.0,
        // The "actual" convention in this system divides by 365.25, not 365.
        DaycountBase::Act365 => (end - start).num_days() as f64 / 365.25,
        DaycountBase::Thirty360 => thirty_360_days(start, end) as f64 / 360.0,
    }
}

/// Bond-basis 30/360 day count (ISDA 30/360, unadjusted): each month is
/// treated as 30 days, with the day-31 roll-back rule applied to both ends.
fn thirty_360_days(start: NaiveDate, end: NaiveDate) -> i64 {
    let mut d1 = start.day() as i64;
    let d2_raw = end.day() as i64;
    if d1 == 31 {
        d1 = 30;
    }
    let d2 = if d2_raw == 31 && d1 >= 30 { 30 } else { d2_raw };

    360 * (end.year() as i64 - start.year() as i64)
        + 30 * (end.month() as i64 - start.month() as i64)
        + (d2 - d1)
}

/// A parsed frequency token: a count of calendar units plus the unit itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frequency {
    pub count: u32,
    pub unit: FrequencyUnit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrequencyUnit {
    Days,
    Weeks,
    Months,
    Years,
}

/// Parse a frequency token such as `"3M"`, `"6M"`, `"ON"`. Returns `None`
/// for blank input, `"0D"/"0W"/"0M"/"0Y"`, or (in non-strict mode) any
/// token that doesn't match the grammar. In strict mode an unmatched token
/// is an `InvalidInput` error instead, matching the repricing-frequency
/// column's stricter validation at ingestion.
pub fn parse_frequency_token(
    value: Option<&str>,
    strict: bool,
    contract_id: Option<&str>,
    field_name: &str,
) -> EngineResult<Option<Frequency>> {
    let raw = match value {
        None => return Ok(None),
        Some(v) if v.trim().is_empty() => return Ok(None),
        Some(v) => v,
    };

    let token: String = raw.trim().to_uppercase().chars().filter(|c| !c.is_whitespace()).collect();

    if matches!(token.as_str(), "0D" | "0W" | "0M" | "0Y") {
        return Ok(None);
    }
    if matches!(token.as_str(), "ON" | "O/N") {
        return Ok(Some(Frequency { count: 1, unit: FrequencyUnit::Days }));
    }

    match parse_count_unit(&token) {
        Some((0, _)) => Ok(None),
        Some((count, unit)) => Ok(Some(Frequency { count, unit })),
        None => {
            if strict {
                Err(EngineError::invalid_input(
                    contract_id.map(str::to_string),
                    format!("invalid frequency in {field_name:?}: {raw:?}"),
                ))
            } else {
                Ok(None)
            }
        }
    }
}

fn parse_count_unit(token: &str) -> Option<(u32, FrequencyUnit)> {
    let (digits, unit_char) = token.split_at(token.len().checked_sub(1)?);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let unit = match unit_char {
        "D" => FrequencyUnit::Days,
        "W" => FrequencyUnit::Weeks,
        "M" => FrequencyUnit::Months,
        "Y" => FrequencyUnit::Years,
        _ => return None,
    };
    digits.parse::<u32>().ok().map(|count| (count, unit))
}

/// Step `d` forward by a parsed frequency. Months and years roll into exact
/// calendar months (clamping a short month's day-of-month the way
/// `chrono`'s checked arithmetic does); days and weeks add actual days.
pub fn add_frequency(d: NaiveDate, freq: Frequency) -> NaiveDate {
    match freq.unit {
        FrequencyUnit::Days => d + chrono::Duration::days(freq.count as i64),
        FrequencyUnit::Weeks => d + chrono::Duration::weeks(freq.count as i64),
        FrequencyUnit::Months => add_months(d, freq.count as i32),
        FrequencyUnit::Years => add_months(d, freq.count as i32 * 12),
    }
}

/// Add `months` calendar months to `d`, clamping the day-of-month down to
/// the target month's last day when it would otherwise overflow (e.g. Jan
/// 31 + 1M -> Feb 28/29, matching `dateutil.relativedelta` semantics).
fn add_months(d: NaiveDate, months: i32) -> NaiveDate {
    let total = d.year() * 12 + d.month() as i32 - 1 + months;
    let year = total.div_euclid(12);
    let month = total.rem_euclid(12) as u32 + 1;
    let last_day = days_in_month(year, month);
    let day = d.day().min(last_day);
    NaiveDate::from_ymd_opt(year, month, day).expect("normalised year/month/day is always valid")
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    let first_of_next = NaiveDate::from_ymd_opt(next_year, next_month, 1).expect("valid month");
    let first_of_this = NaiveDate::from_ymd_opt(year, month, 1).expect("valid month");
    (first_of_next - first_of_this).num_days() as u32
}
