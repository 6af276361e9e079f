//! Brazilian locale parsing and formatting
//!
//! Source files use '.' as the thousands separator and ',' as the
//! decimal separator, with an optional '%' suffix on percentage cells.
//! Every ingestor funnels numeric and YYYYMM date strings through here.

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use std::str::FromStr;

use crate::error::PipelineError;

/// Parse a Brazilian-formatted numeric string into a `Decimal`.
///
/// Accepts currency noise ("R$", spaces) and a '%' suffix, which
/// divides the value by 100. Callers decide how to degrade on failure:
/// account balances default to zero, dates drop the row.
///
/// # Examples
/// ```
/// use balancete::locale::parse_decimal_br;
/// use rust_decimal::Decimal;
/// use std::str::FromStr;
///
/// assert_eq!(
///     parse_decimal_br("1.234.567,89").unwrap(),
///     Decimal::from_str("1234567.89").unwrap()
/// );
/// assert_eq!(
///     parse_decimal_br("6,67%").unwrap(),
///     Decimal::from_str("0.0667").unwrap()
/// );
/// ```
pub fn parse_decimal_br(text: &str) -> Result<Decimal, PipelineError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(PipelineError::Parse("empty numeric cell".to_string()));
    }

    let (body, is_percent) = match trimmed.strip_suffix('%') {
        Some(rest) => (rest, true),
        None => (trimmed, false),
    };

    let cleaned = body
        .replace("R$", "")
        .replace(' ', "")
        .replace('.', "") // Remove thousands separators
        .replace(',', "."); // Replace decimal comma with dot

    let value = Decimal::from_str(&cleaned)
        .map_err(|_| PipelineError::Parse(format!("invalid number: {:?}", text)))?;

    if is_percent {
        Ok(value / Decimal::ONE_HUNDRED)
    } else {
        Ok(value)
    }
}

/// Parse a YYYYMM stamp ("202508", possibly "202508.0" after numeric
/// round-tripping) into the first day of that month.
pub fn parse_year_month(text: &str) -> Result<NaiveDate, PipelineError> {
    let trimmed = text.trim();
    let digits = trimmed.strip_suffix(".0").unwrap_or(trimmed);

    if digits.len() != 6 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(PipelineError::Parse(format!(
            "invalid YYYYMM date: {:?}",
            text
        )));
    }

    let stamp: u32 = digits
        .parse()
        .map_err(|_| PipelineError::Parse(format!("invalid YYYYMM date: {:?}", text)))?;

    year_month_date(stamp / 100, stamp % 100)
        .ok_or_else(|| PipelineError::Parse(format!("invalid YYYYMM date: {:?}", text)))
}

pub(crate) fn year_month_date(year: u32, month: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year as i32, month, 1)
}

/// Normalize any calendar date to the first day of its month.
pub fn first_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

/// Format a number using Brazilian conventions: "1.234,56".
pub fn format_decimal_br(value: Decimal) -> String {
    let is_negative = value.is_sign_negative() && !value.is_zero();
    let formatted = format!("{:.2}", value.abs());
    let (integer_part, decimal_part) = formatted
        .split_once('.')
        .unwrap_or((formatted.as_str(), "00"));

    let mut grouped = String::with_capacity(integer_part.len() + integer_part.len() / 3);
    for (i, ch) in integer_part.chars().enumerate() {
        if i > 0 && (integer_part.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(ch);
    }

    let sign = if is_negative { "-" } else { "" };
    format!("{}{},{}", sign, grouped, decimal_part)
}

/// Format as Brazilian Real: "R$ 1.234,56".
pub fn format_brl(value: Decimal) -> String {
    format!("R$ {}", format_decimal_br(value))
}

/// Format a ratio as a percentage: 0.1234 -> "12,34%".
pub fn format_percent(ratio: Decimal) -> String {
    let scaled = ratio * Decimal::ONE_HUNDRED;
    format!("{}%", format!("{:.2}", scaled).replace('.', ","))
}
