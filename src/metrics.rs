//! Trailing-window indicator engine
//!
//! Recomputes the derived fields of a ticker's series wholesale after
//! any extension. Windows count periods present in the series, not
//! calendar months: a gap simply makes the window reach further back.
//! A windowed indicator is `Undefined` until the series holds at least
//! window-size periods and, because the series only grows, it never
//! reverts to `Undefined` afterwards.

use rust_decimal::Decimal;

use crate::table::{CanonicalTable, FinancialRecord, Indicator};

/// Last-twelve-months window
const LTM_WINDOW: usize = 12;
/// Trailing quarter window
const QUARTER_WINDOW: usize = 3;

/// Recompute derived indicators for every ticker in the table.
pub fn recompute(table: &mut CanonicalTable) {
    for records in table.series_mut() {
        recompute_series(records);
    }
}

/// Recompute derived indicators for one chronologically sorted series.
///
/// ROE follows the asymmetric reference conventions: `Zero` whenever
/// equity is zero, `Undefined` while the 12-period window is
/// incomplete (a defaulted sum would fabricate a misleading 0% ROE).
/// ProjectedROE3m annualizes the trailing quarter (x4) and is
/// `Undefined` for zero equity or an incomplete 3-window.
pub fn recompute_series(records: &mut [FinancialRecord]) {
    for i in 0..records.len() {
        let acc_12m = trailing_sum(records, i, LTM_WINDOW);
        let acc_3m = trailing_sum(records, i, QUARTER_WINDOW);
        let equity = records[i].equity;

        let record = &mut records[i];

        record.accumulated_12m_profit = window_indicator(acc_12m);
        record.monthly_profit_sma12 = match acc_12m {
            Some(sum) => Indicator::Value(sum / Decimal::from(LTM_WINDOW as u32)),
            None => Indicator::Undefined,
        };
        record.accumulated_3m_profit = window_indicator(acc_3m);

        record.roe = if equity.is_zero() {
            Indicator::Zero
        } else {
            match acc_12m {
                Some(sum) => Indicator::Value(sum / equity),
                None => Indicator::Undefined,
            }
        };

        record.projected_roe_3m = match acc_3m {
            Some(sum) if !equity.is_zero() => {
                Indicator::Value(sum * Decimal::from(4u32) / equity)
            }
            _ => Indicator::Undefined,
        };
    }
}

/// Sum of `monthly_profit` over the `window` most recent periods
/// ending at `end`, or `None` when fewer periods exist.
fn trailing_sum(records: &[FinancialRecord], end: usize, window: usize) -> Option<Decimal> {
    if end + 1 < window {
        return None;
    }
    Some(
        records[end + 1 - window..=end]
            .iter()
            .map(|r| r.monthly_profit)
            .sum(),
    )
}

fn window_indicator(sum: Option<Decimal>) -> Indicator {
    match sum {
        Some(sum) => Indicator::Value(sum),
        None => Indicator::Undefined,
    }
}
