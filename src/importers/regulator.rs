//! Regulator filing ingestor
//!
//! Filings are semicolon-delimited Latin-1 text files, three metadata
//! lines ahead of a tabular body, one file per reference month. Each
//! reports balances cumulative since the semester start, so the
//! discrete monthly profit is recovered by subtracting the profits of
//! the earlier months of the same semester already in the table - a
//! recurrence that requires filings to be applied in date order.
//! Ordering is enforced from parsed content, never from directory
//! listing order, and the table itself rejects regressions.

use anyhow::{anyhow, Context, Result};
use chrono::{Datelike, NaiveDate};
use encoding_rs::WINDOWS_1252;
use regex::Regex;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use unicode_normalization::{char::is_combining_mark, UnicodeNormalization};

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::locale;
use crate::table::{CanonicalTable, FinancialRecord};

/// Metadata lines preceding the tabular body of a filing
const METADATA_LINES: usize = 3;

/// One parsed filing: a reference month plus cumulative balances for
/// every mapped institution present in the file, keyed by ticker.
#[derive(Debug)]
pub struct RegulatorFiling {
    pub reference_date: NaiveDate,
    pub balances: BTreeMap<String, InstitutionBalances>,
}

/// Raw semester-cumulative balances for one institution.
#[derive(Debug, Default, Clone)]
pub struct InstitutionBalances {
    pub cumulative_income: Decimal,
    /// Reported as a negative magnitude
    pub cumulative_expense: Decimal,
    pub cumulative_equity: Decimal,
}

struct FilingColumns {
    institution: usize,
    account: usize,
    balance: usize,
    date: usize,
}

impl FilingColumns {
    fn resolve(unit: &str, headers: &csv::StringRecord) -> Result<Self, PipelineError> {
        let names: Vec<String> = headers.iter().map(|h| h.trim().to_uppercase()).collect();
        let find = |field: &'static str, matches: fn(&str) -> bool| {
            names
                .iter()
                .position(|name| matches(name))
                .ok_or(PipelineError::SchemaMismatch {
                    unit: unit.to_string(),
                    field,
                })
        };

        Ok(Self {
            institution: find("institution", |n| n.contains("INSTITUI"))?,
            account: find("account", |n| n == "CONTA")?,
            balance: find("balance", |n| n == "SALDO")?,
            // header prints as "#DATA_BASE"
            date: find("date", |n| n.contains("DATA"))?,
        })
    }
}

/// List filing files in `dir` (YYYYMM-stamped `*BANCOS.CSV` names).
/// A missing directory degrades to an empty listing.
pub fn discover_filings(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        warn!(
            "{}, no filings to ingest",
            PipelineError::MissingFile(dir.display().to_string())
        );
        return Ok(Vec::new());
    }

    let pattern = Regex::new(r"^\d{6}.*BANCOS\.CSV$")?;
    let mut paths = Vec::new();
    for entry in fs::read_dir(dir).context("Failed to list filings directory")? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_uppercase();
        if pattern.is_match(&name) {
            paths.push(entry.path());
        }
    }
    paths.sort();
    Ok(paths)
}

/// Parse one filing file into its reference date and per-institution
/// balances. Any structural failure (unreadable file, unresolvable
/// columns, unparsable reference date) is an error: the caller skips
/// the file in full. An unparsable balance cell only defaults to zero.
pub fn parse_filing(path: &Path, config: &PipelineConfig) -> Result<RegulatorFiling> {
    let unit = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    let bytes = fs::read(path).with_context(|| format!("failed to read filing {:?}", path))?;
    // Filings are Latin-1; the Encoding Standard maps that label to windows-1252
    let (decoded, _, _) = WINDOWS_1252.decode(&bytes);
    let body = decoded
        .lines()
        .skip(METADATA_LINES)
        .collect::<Vec<_>>()
        .join("\n");

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b';')
        .flexible(true)
        .from_reader(body.as_bytes());
    let headers = reader
        .headers()
        .with_context(|| format!("failed to read headers of {}", unit))?
        .clone();
    let columns = FilingColumns::resolve(&unit, &headers)?;

    let name_to_ticker: HashMap<String, &str> = config
        .institutions
        .iter()
        .map(|(name, ticker)| (normalize_name(name), ticker.as_str()))
        .collect();
    let income_code = config.account_codes.income.to_string();
    let expense_code = config.account_codes.expense.to_string();
    let equity_code = config.account_codes.equity.to_string();

    let mut reference_date = None;
    let mut balances: BTreeMap<String, InstitutionBalances> = BTreeMap::new();

    for (idx, result) in reader.records().enumerate() {
        let record =
            result.with_context(|| format!("failed to read record {} of {}", idx + 1, unit))?;

        if reference_date.is_none() {
            let stamp = record.get(columns.date).unwrap_or("");
            let date = locale::parse_year_month(stamp)
                .with_context(|| format!("{}: bad reference date", unit))?;
            reference_date = Some(date);
        }

        let Some(ticker) = record
            .get(columns.institution)
            .map(normalize_name)
            .and_then(|name| name_to_ticker.get(&name).copied())
        else {
            continue;
        };

        let entry = balances.entry(ticker.to_string()).or_default();
        let code = record.get(columns.account).unwrap_or("").trim();
        if code == income_code {
            entry.cumulative_income = parse_balance(&unit, ticker, code, &record, &columns);
        } else if code == expense_code {
            entry.cumulative_expense = parse_balance(&unit, ticker, code, &record, &columns);
        } else if code == equity_code {
            entry.cumulative_equity = parse_balance(&unit, ticker, code, &record, &columns);
        }
    }

    let reference_date = reference_date.ok_or_else(|| anyhow!("{}: no data rows", unit))?;
    debug!(
        "{}: reference date {}, {} mapped institutions",
        unit,
        reference_date.format("%Y-%m"),
        balances.len()
    );

    Ok(RegulatorFiling {
        reference_date,
        balances,
    })
}

fn parse_balance(
    unit: &str,
    ticker: &str,
    code: &str,
    record: &csv::StringRecord,
    columns: &FilingColumns,
) -> Decimal {
    match record.get(columns.balance) {
        Some(text) => match locale::parse_decimal_br(text) {
            Ok(value) => value,
            Err(e) => {
                warn!("{}: {} account {}: {}, using 0", unit, ticker, code, e);
                Decimal::ZERO
            }
        },
        None => Decimal::ZERO,
    }
}

/// Parse every filing in `dir` and apply them in reference-date order.
/// A filing that fails to parse is skipped in full; already-ingested
/// (ticker, date) pairs are untouched. Returns rows appended.
pub fn ingest_filings(
    dir: &Path,
    config: &PipelineConfig,
    table: &mut CanonicalTable,
) -> Result<usize> {
    let paths = discover_filings(dir)?;
    info!("Found {} filing files", paths.len());

    let mut filings = Vec::new();
    for path in &paths {
        match parse_filing(path, config) {
            Ok(filing) => filings.push(filing),
            Err(e) => warn!("skipping filing {:?}: {:#}", path, e),
        }
    }
    filings.sort_by_key(|filing| filing.reference_date);

    let mut appended = 0;
    for filing in &filings {
        appended += apply_filing(filing, table);
    }
    Ok(appended)
}

/// Apply one filing: derive each institution's discrete monthly profit
/// from its semester-cumulative result and append the new rows.
/// Re-applying an already-seen filing is a no-op.
pub fn apply_filing(filing: &RegulatorFiling, table: &mut CanonicalTable) -> usize {
    let mut appended = 0;
    for (ticker, balances) in &filing.balances {
        if table.contains(ticker, filing.reference_date) {
            debug!(
                "{} {} already present, skipping",
                ticker,
                filing.reference_date.format("%Y-%m")
            );
            continue;
        }

        // Expense carries its sign, so this is the net result
        let cumulative_result = balances.cumulative_income + balances.cumulative_expense;
        let start = semester_start(filing.reference_date);
        let prior_profit = table.profit_sum(ticker, start, filing.reference_date);
        let monthly_profit = cumulative_result - prior_profit;

        let record = FinancialRecord::new(
            ticker,
            filing.reference_date,
            monthly_profit,
            balances.cumulative_equity,
        );
        match table.append(record) {
            Ok(()) => appended += 1,
            Err(e) => warn!("rejected filing row: {}", e),
        }
    }
    appended
}

/// First day of the semester containing `date`: January 1 for months
/// 1-6, July 1 for months 7-12.
pub fn semester_start(date: NaiveDate) -> NaiveDate {
    let month = if date.month() <= 6 { 1 } else { 7 };
    NaiveDate::from_ymd_opt(date.year(), month, 1).unwrap_or(date)
}

/// Uppercase, strip accents and punctuation, collapse whitespace.
/// Filing encodings wobble, so the institution mapping matches on the
/// normalized form of both sides.
pub(crate) fn normalize_name(input: &str) -> String {
    let upper = input.to_uppercase();
    let mut out = String::with_capacity(upper.len());
    for ch in upper.nfkd() {
        if is_combining_mark(ch) {
            continue;
        }
        if ch.is_ascii_alphanumeric() || ch == ' ' {
            out.push(ch);
        } else if ch == '-' || ch == '.' || ch == '(' || ch == ')' {
            out.push(' ');
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}
