//! Canonical consolidated table
//!
//! The unified per-ticker monthly time series both ingestors write
//! into. The table is append-only and structurally enforces the two
//! core invariants: (ticker, date) uniqueness and strictly increasing
//! dates within a ticker's series. The semester-reversal recurrence
//! reads prior months back through `profit_sum`, so accepting an
//! out-of-order append would silently corrupt later deltas.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;

use crate::error::PipelineError;

/// Tri-state value for derived indicators.
///
/// `Undefined` marks a trailing window with fewer periods than its
/// size. `Zero` is reserved for the zero-equity ROE convention;
/// arithmetic zeros from a complete window are `Value(0)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Indicator {
    Undefined,
    Zero,
    Value(Decimal),
}

impl Indicator {
    pub fn is_defined(&self) -> bool {
        !matches!(self, Indicator::Undefined)
    }

    /// Numeric view: `Zero` reads as 0, `Undefined` as `None`.
    pub fn value(&self) -> Option<Decimal> {
        match self {
            Indicator::Undefined => None,
            Indicator::Zero => Some(Decimal::ZERO),
            Indicator::Value(v) => Some(*v),
        }
    }
}

impl Serialize for Indicator {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.value() {
            Some(v) => serializer.serialize_some(&v),
            None => serializer.serialize_none(),
        }
    }
}

/// One consolidated row: a single institution-month.
#[derive(Debug, Clone, Serialize)]
pub struct FinancialRecord {
    #[serde(rename = "Ticker")]
    pub ticker: String,
    #[serde(rename = "Date")]
    pub date: NaiveDate,
    #[serde(rename = "MonthlyProfit")]
    pub monthly_profit: Decimal,
    #[serde(rename = "Equity")]
    pub equity: Decimal,
    #[serde(rename = "Accumulated12mProfit")]
    pub accumulated_12m_profit: Indicator,
    #[serde(rename = "MonthlyProfit_SMA12")]
    pub monthly_profit_sma12: Indicator,
    #[serde(rename = "Accumulated3mProfit")]
    pub accumulated_3m_profit: Indicator,
    #[serde(rename = "ProjectedROE3m")]
    pub projected_roe_3m: Indicator,
    #[serde(rename = "ROE")]
    pub roe: Indicator,
}

impl FinancialRecord {
    /// A freshly ingested row. Derived indicators stay `Undefined`
    /// until the metrics engine recomputes the ticker's series.
    pub fn new(ticker: &str, date: NaiveDate, monthly_profit: Decimal, equity: Decimal) -> Self {
        Self {
            ticker: ticker.to_string(),
            date,
            monthly_profit,
            equity,
            accumulated_12m_profit: Indicator::Undefined,
            monthly_profit_sma12: Indicator::Undefined,
            accumulated_3m_profit: Indicator::Undefined,
            projected_roe_3m: Indicator::Undefined,
            roe: Indicator::Undefined,
        }
    }
}

/// Append-only ordered table keyed by (ticker, date).
#[derive(Debug, Default)]
pub struct CanonicalTable {
    series: BTreeMap<String, Vec<FinancialRecord>>,
}

impl CanonicalTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, ticker: &str, date: NaiveDate) -> bool {
        self.series
            .get(ticker)
            .map(|records| records.binary_search_by_key(&date, |r| r.date).is_ok())
            .unwrap_or(false)
    }

    /// Append one row. Rejects a duplicate (ticker, date) and any date
    /// that is not strictly after the ticker's current maximum.
    pub fn append(&mut self, record: FinancialRecord) -> Result<(), PipelineError> {
        let records = self.series.entry(record.ticker.clone()).or_default();

        if let Some(last) = records.last() {
            if record.date == last.date {
                return Err(PipelineError::Duplicate {
                    ticker: record.ticker.clone(),
                    date: record.date,
                });
            }
            if record.date < last.date {
                // An equal earlier date would also land here; either
                // way the append violates the series ordering.
                return Err(PipelineError::OutOfOrder {
                    ticker: record.ticker.clone(),
                    date: record.date,
                    last: last.date,
                });
            }
        }

        records.push(record);
        Ok(())
    }

    /// Sum of `monthly_profit` for a ticker over the half-open date
    /// interval `[from, until)`. The semester-reversal recurrence uses
    /// this against rows from both ingestors, including rows appended
    /// earlier in the same run.
    pub fn profit_sum(&self, ticker: &str, from: NaiveDate, until: NaiveDate) -> Decimal {
        self.series(ticker)
            .iter()
            .filter(|r| r.date >= from && r.date < until)
            .map(|r| r.monthly_profit)
            .sum()
    }

    /// Chronologically sorted series for one ticker (empty if unknown).
    pub fn series(&self, ticker: &str) -> &[FinancialRecord] {
        self.series.get(ticker).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn last(&self, ticker: &str) -> Option<&FinancialRecord> {
        self.series.get(ticker).and_then(|records| records.last())
    }

    pub fn tickers(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(String::as_str)
    }

    /// All rows in (ticker, date) order.
    pub fn rows(&self) -> impl Iterator<Item = &FinancialRecord> {
        self.series.values().flatten()
    }

    pub fn len(&self) -> usize {
        self.series.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    pub(crate) fn series_mut(&mut self) -> impl Iterator<Item = &mut Vec<FinancialRecord>> {
        self.series.values_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn day(year: i32, month: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, 1).unwrap()
    }

    fn row(ticker: &str, date: NaiveDate, profit: Decimal) -> FinancialRecord {
        FinancialRecord::new(ticker, date, profit, dec!(1000))
    }

    #[test]
    fn append_keeps_per_ticker_series_sorted_and_unique() {
        let mut table = CanonicalTable::new();
        table.append(row("BBAS", day(2025, 1), dec!(10))).unwrap();
        table.append(row("BBAS", day(2025, 2), dec!(20))).unwrap();
        table.append(row("ITUB", day(2025, 1), dec!(5))).unwrap();

        assert_eq!(table.len(), 3);
        assert!(table.contains("BBAS", day(2025, 1)));
        assert!(!table.contains("BBAS", day(2025, 3)));
        assert_eq!(table.series("BBAS").len(), 2);
    }

    #[test]
    fn append_rejects_duplicate_date() {
        let mut table = CanonicalTable::new();
        table.append(row("BBAS", day(2025, 1), dec!(10))).unwrap();

        let err = table
            .append(row("BBAS", day(2025, 1), dec!(99)))
            .unwrap_err();
        assert!(matches!(err, PipelineError::Duplicate { .. }));
        assert_eq!(table.series("BBAS")[0].monthly_profit, dec!(10));
    }

    #[test]
    fn append_rejects_out_of_order_date() {
        let mut table = CanonicalTable::new();
        table.append(row("BBAS", day(2025, 2), dec!(10))).unwrap();

        let err = table
            .append(row("BBAS", day(2025, 1), dec!(5)))
            .unwrap_err();
        assert!(matches!(err, PipelineError::OutOfOrder { .. }));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn profit_sum_is_half_open() {
        let mut table = CanonicalTable::new();
        table.append(row("BBAS", day(2025, 1), dec!(10))).unwrap();
        table.append(row("BBAS", day(2025, 2), dec!(20))).unwrap();
        table.append(row("BBAS", day(2025, 3), dec!(40))).unwrap();

        // [Jan, Mar) excludes the March row itself
        assert_eq!(table.profit_sum("BBAS", day(2025, 1), day(2025, 3)), dec!(30));
        assert_eq!(table.profit_sum("BBAS", day(2025, 1), day(2025, 1)), dec!(0));
        assert_eq!(table.profit_sum("XXXX", day(2025, 1), day(2025, 3)), dec!(0));
    }

    #[test]
    fn indicator_value_views() {
        assert_eq!(Indicator::Undefined.value(), None);
        assert_eq!(Indicator::Zero.value(), Some(Decimal::ZERO));
        assert_eq!(Indicator::Value(dec!(1.5)).value(), Some(dec!(1.5)));
        assert!(!Indicator::Undefined.is_defined());
        assert!(Indicator::Zero.is_defined());
    }

    #[test]
    fn record_serializes_with_canonical_column_names() {
        let mut record = row("BBAS", day(2025, 1), dec!(10));
        record.roe = Indicator::Value(dec!(0.15));

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["Ticker"], "BBAS");
        assert_eq!(json["MonthlyProfit"], "10");
        assert!(json["Accumulated12mProfit"].is_null());
        assert_eq!(json["ROE"], "0.15");
    }
}
