//! Reports and exports over the canonical table
//!
//! CSV and JSON serialization of the consolidated series, plus the
//! terminal tables the CLI prints: a per-ticker preview of recent rows
//! and a latest-period indicator snapshot, optionally merged with the
//! auxiliary valuation feed by ticker.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::io::Write;
use tabled::{settings::Style, Table, Tabled};

use crate::locale::{format_decimal_br, format_percent};
use crate::table::{CanonicalTable, FinancialRecord, Indicator};
use crate::valuation::ValuationRow;

/// Canonical export column order
const CSV_HEADER: [&str; 9] = [
    "Ticker",
    "Date",
    "MonthlyProfit",
    "Equity",
    "Accumulated12mProfit",
    "MonthlyProfit_SMA12",
    "Accumulated3mProfit",
    "ProjectedROE3m",
    "ROE",
];

/// Write the full table as CSV. Undefined indicators become empty
/// cells.
pub fn write_csv<W: Write>(table: &CanonicalTable, writer: W) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer
        .write_record(CSV_HEADER)
        .context("failed to write CSV header")?;

    for record in table.rows() {
        csv_writer
            .write_record(&[
                record.ticker.clone(),
                record.date.format("%Y-%m-%d").to_string(),
                record.monthly_profit.to_string(),
                record.equity.to_string(),
                indicator_cell(record.accumulated_12m_profit),
                indicator_cell(record.monthly_profit_sma12),
                indicator_cell(record.accumulated_3m_profit),
                indicator_cell(record.projected_roe_3m),
                indicator_cell(record.roe),
            ])
            .context("failed to write CSV row")?;
    }

    csv_writer.flush().context("failed to flush CSV output")?;
    Ok(())
}

/// Write the full table as JSON, one object per row with the canonical
/// column names.
pub fn write_json<W: Write>(table: &CanonicalTable, writer: W) -> Result<()> {
    let rows: Vec<&FinancialRecord> = table.rows().collect();
    serde_json::to_writer_pretty(writer, &rows).context("failed to write JSON output")?;
    Ok(())
}

fn indicator_cell(value: Indicator) -> String {
    value.value().map(|v| v.to_string()).unwrap_or_default()
}

fn money(value: Indicator) -> String {
    value
        .value()
        .map(format_decimal_br)
        .unwrap_or_else(|| "-".to_string())
}

fn ratio(value: Indicator) -> String {
    value
        .value()
        .map(format_percent)
        .unwrap_or_else(|| "-".to_string())
}

#[derive(Tabled)]
struct PreviewRow {
    #[tabled(rename = "Date")]
    date: String,
    #[tabled(rename = "Monthly Profit")]
    monthly_profit: String,
    #[tabled(rename = "Equity")]
    equity: String,
    #[tabled(rename = "12m Profit")]
    accumulated_12m: String,
    #[tabled(rename = "SMA 12")]
    sma12: String,
    #[tabled(rename = "ROE")]
    roe: String,
    #[tabled(rename = "Proj. ROE 3m")]
    projected_roe: String,
}

/// Render the most recent `limit` rows of one ticker's series.
pub fn render_preview(table: &CanonicalTable, ticker: &str, limit: usize) -> String {
    let series = table.series(ticker);
    let start = series.len().saturating_sub(limit);
    let rows: Vec<PreviewRow> = series[start..]
        .iter()
        .map(|record| PreviewRow {
            date: record.date.format("%Y-%m").to_string(),
            monthly_profit: format_decimal_br(record.monthly_profit),
            equity: format_decimal_br(record.equity),
            accumulated_12m: money(record.accumulated_12m_profit),
            sma12: money(record.monthly_profit_sma12),
            roe: ratio(record.roe),
            projected_roe: ratio(record.projected_roe_3m),
        })
        .collect();

    Table::new(rows).with(Style::rounded()).to_string()
}

#[derive(Tabled)]
struct SnapshotRow {
    #[tabled(rename = "Ticker")]
    ticker: String,
    #[tabled(rename = "Date")]
    date: String,
    #[tabled(rename = "12m Profit")]
    accumulated_12m: String,
    #[tabled(rename = "ROE")]
    roe: String,
    #[tabled(rename = "Proj. ROE 3m")]
    projected_roe: String,
    #[tabled(rename = "Price")]
    price: String,
    #[tabled(rename = "P/L")]
    price_earnings: String,
    #[tabled(rename = "DY")]
    dividend_yield: String,
}

/// Render the latest row of every ticker, merged with valuation data
/// by ticker. Tickers absent from the feed get blank valuation cells.
pub fn render_snapshot(table: &CanonicalTable, valuation: &[ValuationRow]) -> String {
    let by_ticker: HashMap<&str, &ValuationRow> = valuation
        .iter()
        .map(|row| (row.ticker.as_str(), row))
        .collect();

    let rows: Vec<SnapshotRow> = table
        .tickers()
        .filter_map(|ticker| table.last(ticker))
        .map(|record| {
            let quote = by_ticker.get(record.ticker.as_str());
            SnapshotRow {
                ticker: record.ticker.clone(),
                date: record.date.format("%Y-%m").to_string(),
                accumulated_12m: money(record.accumulated_12m_profit),
                roe: ratio(record.roe),
                projected_roe: ratio(record.projected_roe_3m),
                price: quote
                    .and_then(|q| q.price)
                    .map(format_decimal_br)
                    .unwrap_or_default(),
                price_earnings: quote
                    .and_then(|q| q.price_earnings)
                    .map(format_decimal_br)
                    .unwrap_or_default(),
                dividend_yield: quote
                    .and_then(|q| q.dividend_yield)
                    .map(format_percent)
                    .unwrap_or_default(),
            }
        })
        .collect();

    Table::new(rows).with(Style::rounded()).to_string()
}
