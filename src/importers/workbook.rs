//! Historical workbook ingestor
//!
//! The workbook carries the long history: one sheet per ticker, each
//! with a YYYYMM date column, a monthly profit column, and an equity
//! column under varying header spellings. Columns are resolved through
//! a declarative alias table; a sheet missing any required column is
//! skipped whole with the missing field named in the diagnostic.

use anyhow::{anyhow, Context, Result};
use calamine::{open_workbook, Data, DataType, Range, Reader, Xlsx};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::path::Path;
use tracing::{info, warn};

use crate::error::PipelineError;
use crate::locale;
use crate::table::{CanonicalTable, FinancialRecord};

/// A logical sheet field and the header spellings that resolve it.
/// `exact` aliases win over `contains` aliases so "LUCRO" is never
/// shadowed by a wider column such as "LUCRO ACUMULADO".
struct FieldSpec {
    field: &'static str,
    exact: &'static [&'static str],
    contains: &'static [&'static str],
}

const DATE_COLUMN: FieldSpec = FieldSpec {
    field: "date",
    exact: &[],
    contains: &["DATA_BASE", "DATABASE"],
};

const PROFIT_COLUMN: FieldSpec = FieldSpec {
    field: "profit",
    exact: &["LUCRO"],
    contains: &["LUCRO"],
};

const EQUITY_COLUMN: FieldSpec = FieldSpec {
    field: "equity",
    exact: &[],
    contains: &["PATRIM", "PATRIMONIO"],
};

#[derive(Debug, PartialEq, Eq)]
struct SheetColumns {
    date: usize,
    profit: usize,
    equity: usize,
}

/// Ingest the historical workbook into the table.
///
/// Returns the number of rows appended. A missing workbook degrades to
/// an empty result; unresolvable sheets are skipped; rows with
/// unparsable dates are dropped; unparsable numeric cells become zero.
pub fn ingest_workbook(path: &Path, table: &mut CanonicalTable) -> Result<usize> {
    if !path.exists() {
        warn!(
            "{}, starting from an empty table",
            PipelineError::MissingFile(path.display().to_string())
        );
        return Ok(0);
    }

    info!("Reading historical workbook: {:?}", path);
    let mut workbook: Xlsx<_> = open_workbook(path).context("Failed to open workbook")?;
    let sheet_names = workbook.sheet_names().to_owned();
    info!("Found {} sheets", sheet_names.len());

    let mut appended = 0;
    for sheet in sheet_names {
        let range = match workbook.worksheet_range(&sheet) {
            Ok(range) => range,
            Err(e) => {
                warn!("skipping sheet {}: {}", sheet, e);
                continue;
            }
        };
        match ingest_sheet(&sheet, &range, table) {
            Ok(count) => {
                info!("Loaded {}: {} records", sheet, count);
                appended += count;
            }
            Err(e) => warn!("skipping sheet {}: {:#}", sheet, e),
        }
    }

    Ok(appended)
}

fn ingest_sheet(sheet: &str, range: &Range<Data>, table: &mut CanonicalTable) -> Result<usize> {
    let mut rows = range.rows();
    let header = rows
        .next()
        .ok_or_else(|| anyhow!("sheet {} is empty", sheet))?;
    let columns = resolve_columns(sheet, header)?;
    let ticker = sheet.trim().to_uppercase();

    let mut parsed: Vec<(NaiveDate, Decimal, Decimal)> = Vec::new();
    for (idx, row) in rows.enumerate() {
        if row.iter().all(|cell| cell.is_empty()) {
            continue;
        }

        let date_cell = row.get(columns.date).unwrap_or(&Data::Empty);
        let date = match parse_date_cell(date_cell) {
            Ok(date) => date,
            Err(e) => {
                warn!("{}: dropping row {}: {}", sheet, idx + 2, e);
                continue;
            }
        };

        let profit = numeric_or_zero(sheet, idx + 2, row.get(columns.profit));
        let equity = numeric_or_zero(sheet, idx + 2, row.get(columns.equity));
        parsed.push((date, profit, equity));
    }

    parsed.sort_by_key(|&(date, _, _)| date);

    let mut appended = 0;
    for (date, profit, equity) in parsed {
        match table.append(FinancialRecord::new(&ticker, date, profit, equity)) {
            Ok(()) => appended += 1,
            Err(e) => warn!("{}: {}", sheet, e),
        }
    }
    Ok(appended)
}

fn resolve_columns(sheet: &str, header: &[Data]) -> Result<SheetColumns, PipelineError> {
    let names: Vec<String> = header
        .iter()
        .map(|cell| cell.to_string().trim().to_uppercase())
        .collect();

    Ok(SheetColumns {
        date: resolve_field(sheet, &names, &DATE_COLUMN)?,
        profit: resolve_field(sheet, &names, &PROFIT_COLUMN)?,
        equity: resolve_field(sheet, &names, &EQUITY_COLUMN)?,
    })
}

fn resolve_field(
    sheet: &str,
    names: &[String],
    spec: &FieldSpec,
) -> Result<usize, PipelineError> {
    for alias in spec.exact {
        if let Some(idx) = names.iter().position(|name| name == alias) {
            return Ok(idx);
        }
    }
    for alias in spec.contains {
        if let Some(idx) = names.iter().position(|name| name.contains(alias)) {
            return Ok(idx);
        }
    }
    Err(PipelineError::SchemaMismatch {
        unit: sheet.to_string(),
        field: spec.field,
    })
}

/// Dates arrive as YYYYMM stamps (text or numeric cells) or, rarely,
/// as native spreadsheet datetimes. Everything normalizes to the first
/// day of the month.
fn parse_date_cell(cell: &Data) -> Result<NaiveDate, PipelineError> {
    match cell {
        Data::DateTime(dt) => {
            let days = dt.as_f64().floor() as i64;
            let excel_epoch = NaiveDate::from_ymd_opt(1899, 12, 30)
                .ok_or_else(|| PipelineError::Parse("invalid spreadsheet epoch".to_string()))?;
            excel_epoch
                .checked_add_signed(chrono::Duration::days(days))
                .map(locale::first_of_month)
                .ok_or_else(|| PipelineError::Parse(format!("date overflow: {}", dt)))
        }
        Data::Empty => Err(PipelineError::Parse("empty date cell".to_string())),
        other => locale::parse_year_month(&other.to_string()),
    }
}

fn parse_numeric_cell(cell: &Data) -> Result<Decimal, PipelineError> {
    match cell {
        Data::Empty => Ok(Decimal::ZERO),
        Data::Int(i) => Ok(Decimal::from(*i)),
        Data::Float(f) => Decimal::from_f64_retain(*f)
            .ok_or_else(|| PipelineError::Parse(format!("invalid numeric cell: {}", f))),
        Data::String(s) => locale::parse_decimal_br(s),
        other => Err(PipelineError::Parse(format!(
            "invalid numeric cell: {}",
            other
        ))),
    }
}

fn numeric_or_zero(sheet: &str, row: usize, cell: Option<&Data>) -> Decimal {
    match cell.map(parse_numeric_cell).unwrap_or(Ok(Decimal::ZERO)) {
        Ok(value) => value,
        Err(e) => {
            warn!("{}: row {}: {}, using 0", sheet, row, e);
            Decimal::ZERO
        }
    }
}
