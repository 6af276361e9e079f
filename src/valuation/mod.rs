//! Auxiliary valuation feed
//!
//! External collaborator to the core pipeline: a per-ticker valuation
//! table (price, P/L, dividend yield) merged into terminal snapshots.
//! Sourced either from a local spreadsheet with fixed column positions
//! or from the public Fundamentus screener page. Both paths are
//! best-effort: any failure degrades to an empty table and never
//! blocks or aborts ingestion.

use anyhow::{anyhow, Context, Result};
use calamine::{open_workbook, Data, Reader, Xlsx};
use itertools::Itertools;
use rust_decimal::Decimal;
use scraper::{Html, Selector};
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

use crate::error::PipelineError;
use crate::locale;

const FUNDAMENTUS_URL: &str = "https://www.fundamentus.com.br/resultado.php";
const FETCH_TIMEOUT: Duration = Duration::from_secs(10);
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Fixed column positions of the local valuation spreadsheet
const SHEET_TICKER_COL: usize = 0;
const SHEET_PRICE_COL: usize = 1;
const SHEET_PE_COL: usize = 2;
const SHEET_DY_COL: usize = 5;

/// One valuation row, ticker normalized to its 4-letter base.
#[derive(Debug, Clone)]
pub struct ValuationRow {
    pub ticker: String,
    pub price: Option<Decimal>,
    pub price_earnings: Option<Decimal>,
    pub dividend_yield: Option<Decimal>,
}

/// Read the local valuation spreadsheet. A missing file degrades to an
/// empty table.
pub fn load_valuation_sheet(path: &Path) -> Result<Vec<ValuationRow>> {
    if !path.exists() {
        warn!(
            "{}, returning empty valuation table",
            PipelineError::MissingFile(path.display().to_string())
        );
        return Ok(Vec::new());
    }

    let mut workbook: Xlsx<_> =
        open_workbook(path).context("Failed to open valuation spreadsheet")?;
    let sheet = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| anyhow!("valuation spreadsheet has no sheets"))?;
    let range = workbook
        .worksheet_range(&sheet)
        .context("Failed to read valuation sheet")?;

    let mut rows = Vec::new();
    for row in range.rows().skip(1) {
        let ticker = row
            .get(SHEET_TICKER_COL)
            .map(|cell| cell.to_string())
            .unwrap_or_default();
        if ticker.trim().is_empty() {
            continue;
        }
        rows.push(ValuationRow {
            ticker,
            price: numeric_at(row, SHEET_PRICE_COL),
            price_earnings: numeric_at(row, SHEET_PE_COL),
            dividend_yield: numeric_at(row, SHEET_DY_COL),
        });
    }

    Ok(normalize_rows(rows))
}

fn numeric_at(row: &[Data], idx: usize) -> Option<Decimal> {
    match row.get(idx)? {
        Data::Int(i) => Some(Decimal::from(*i)),
        Data::Float(f) => Decimal::from_f64_retain(*f),
        Data::String(s) => locale::parse_decimal_br(s).ok(),
        _ => None,
    }
}

/// Scrape the public screener table. Network failure or schema drift
/// degrades to an empty result with a diagnostic.
pub fn fetch_fundamentus() -> Vec<ValuationRow> {
    match try_fetch_fundamentus() {
        Ok(rows) => {
            info!("Loaded {} valuation rows from screener", rows.len());
            rows
        }
        Err(e) => {
            warn!("valuation fetch failed: {:#}", e);
            Vec::new()
        }
    }
}

fn try_fetch_fundamentus() -> Result<Vec<ValuationRow>> {
    info!("Fetching valuation table from {}", FUNDAMENTUS_URL);
    let client = reqwest::blocking::Client::builder()
        .timeout(FETCH_TIMEOUT)
        .user_agent(USER_AGENT)
        .build()
        .context("failed to build HTTP client")?;

    let html = client
        .get(FUNDAMENTUS_URL)
        .send()
        .map_err(|e| PipelineError::Network(e.to_string()))?
        .error_for_status()
        .map_err(|e| PipelineError::Network(e.to_string()))?
        .text()
        .map_err(|e| PipelineError::Network(e.to_string()))?;

    parse_screener_table(&html)
}

struct ScreenerColumns {
    ticker: usize,
    price: usize,
    price_earnings: usize,
    dividend_yield: usize,
}

impl ScreenerColumns {
    fn resolve(headers: &[String]) -> Option<Self> {
        let position = |name: &str| headers.iter().position(|h| h == name);
        Some(Self {
            ticker: position("Papel")?,
            price: position("Cotação")?,
            price_earnings: position("P/L")?,
            dividend_yield: position("Div.Yield")?,
        })
    }

    fn max_index(&self) -> usize {
        self.ticker
            .max(self.price)
            .max(self.price_earnings)
            .max(self.dividend_yield)
    }
}

/// Extract valuation rows from the first HTML table whose headers
/// carry the expected screener columns.
fn parse_screener_table(html: &str) -> Result<Vec<ValuationRow>> {
    let document = Html::parse_document(html);
    let table_sel = Selector::parse("table").map_err(|_| anyhow!("invalid table selector"))?;
    let header_sel = Selector::parse("th").map_err(|_| anyhow!("invalid header selector"))?;
    let row_sel = Selector::parse("tr").map_err(|_| anyhow!("invalid row selector"))?;
    let cell_sel = Selector::parse("td").map_err(|_| anyhow!("invalid cell selector"))?;

    for table in document.select(&table_sel) {
        let headers: Vec<String> = table
            .select(&header_sel)
            .map(|th| th.text().collect::<String>().trim().to_string())
            .collect();
        let Some(columns) = ScreenerColumns::resolve(&headers) else {
            continue;
        };

        let mut rows = Vec::new();
        for tr in table.select(&row_sel) {
            let cells: Vec<String> = tr
                .select(&cell_sel)
                .map(|td| td.text().collect::<String>().trim().to_string())
                .collect();
            if cells.len() <= columns.max_index() {
                continue;
            }
            let ticker = cells[columns.ticker].clone();
            if ticker.is_empty() {
                continue;
            }
            rows.push(ValuationRow {
                ticker,
                price: locale::parse_decimal_br(&cells[columns.price]).ok(),
                price_earnings: locale::parse_decimal_br(&cells[columns.price_earnings]).ok(),
                dividend_yield: locale::parse_decimal_br(&cells[columns.dividend_yield]).ok(),
            });
        }
        return Ok(normalize_rows(rows));
    }

    Err(anyhow!("screener table not found in page"))
}

/// Normalize tickers to their 4-character base (ITUB4 -> ITUB) and
/// keep the first occurrence of each.
fn normalize_rows(rows: Vec<ValuationRow>) -> Vec<ValuationRow> {
    rows.into_iter()
        .map(|mut row| {
            row.ticker = row
                .ticker
                .trim()
                .chars()
                .take(4)
                .collect::<String>()
                .to_uppercase();
            row
        })
        .filter(|row| !row.ticker.is_empty())
        .unique_by(|row| row.ticker.clone())
        .collect()
}
