//! End-to-end pipeline tests
//!
//! These tests synthesize both source formats on disk - a multi-sheet
//! workbook and Latin-1 regulator filings - run the full pipeline, and
//! verify the consolidation invariants:
//! - (ticker, date) uniqueness and per-ticker chronological order
//! - semester-reversal derivation of monthly profits
//! - idempotent re-ingestion of already-seen filings
//! - content-based (not filename-based) filing ordering
//! - trailing-window definedness and the ROE conventions

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use balancete::config::PipelineConfig;
use balancete::pipeline;
use balancete::table::{CanonicalTable, Indicator};
use chrono::NaiveDate;
use encoding_rs::WINDOWS_1252;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use rust_xlsxwriter::Workbook;
use tempfile::TempDir;

fn day(year: i32, month: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, 1).unwrap()
}

/// Write a workbook with one sheet per ticker. Each row is
/// (YYYYMM stamp, monthly profit, equity). A decoy "LUCRO ACUMULADO"
/// column is included to check it never shadows "LUCRO".
fn write_workbook(path: &Path, sheets: &[(&str, Vec<(u32, f64, f64)>)]) {
    let mut workbook = Workbook::new();
    for (ticker, rows) in sheets {
        let sheet = workbook.add_worksheet();
        sheet.set_name(*ticker).unwrap();

        let headers = ["DATA_BASE", "LUCRO ACUMULADO", "LUCRO", "PATRIMONIO LIQUIDO"];
        for (col, header) in headers.iter().enumerate() {
            sheet.write_string(0, col as u16, *header).unwrap();
        }
        for (i, (stamp, profit, equity)) in rows.iter().enumerate() {
            let row = (i + 1) as u32;
            sheet.write_number(row, 0, *stamp as f64).unwrap();
            sheet.write_number(row, 1, 999_999.0).unwrap();
            sheet.write_number(row, 2, *profit).unwrap();
            sheet.write_number(row, 3, *equity).unwrap();
        }
    }
    workbook.save(path).unwrap();
}

/// Write one Latin-1 regulator filing with the standard three metadata
/// lines. Rows are (institution name, account code, balance).
fn write_filing(dir: &Path, name: &str, stamp: &str, rows: &[(&str, u64, &str)]) -> PathBuf {
    let mut content = String::from(
        "BALANCETES MENSAIS\nDOCUMENTO 4010\nGERADO PELO REGULADOR\n\
         #DATA_BASE;NOME_INSTITUICAO;CONTA;SALDO\n",
    );
    for (institution, code, balance) in rows {
        content.push_str(&format!("{};{};{};{}\n", stamp, institution, code, balance));
    }
    let (bytes, _, _) = WINDOWS_1252.encode(&content);
    let path = dir.join(name);
    fs::write(&path, bytes).unwrap();
    path
}

fn test_config(dir: &TempDir) -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.workbook_path = dir.path().join("historico.xlsx");
    config.filings_dir = dir.path().to_path_buf();
    config.institutions = [
        ("BCO TESTE S.A.", "TEST"),
        ("BCO OUTRO S.A.", "OUTR"),
    ]
    .into_iter()
    .map(|(name, ticker)| (name.to_string(), ticker.to_string()))
    .collect();
    config
}

fn monthly_history(count: u32) -> Vec<(u32, f64, f64)> {
    (0..count)
        .map(|i| {
            let stamp = 202_401 + (i / 12) * 100 + i % 12;
            (stamp, (i + 1) as f64, 1000.0)
        })
        .collect()
}

fn assert_unique_keys(table: &CanonicalTable) {
    let keys: HashSet<(String, NaiveDate)> = table
        .rows()
        .map(|record| (record.ticker.clone(), record.date))
        .collect();
    assert_eq!(keys.len(), table.len(), "(ticker, date) keys must be unique");
}

#[test]
fn workbook_history_feeds_trailing_metrics() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    write_workbook(&config.workbook_path, &[("TEST", monthly_history(14))]);

    let table = pipeline::run(&config).unwrap();
    let series = table.series("TEST");
    assert_eq!(series.len(), 14);
    assert_unique_keys(&table);

    // Decoy accumulated column was not used as the profit source
    assert_eq!(series[0].monthly_profit, dec!(1));
    assert_eq!(series[0].date, day(2024, 1));

    // Windows undefined until 12 periods exist, defined from then on
    assert_eq!(series[10].accumulated_12m_profit, Indicator::Undefined);
    assert_eq!(series[10].roe, Indicator::Undefined);
    assert_eq!(series[11].accumulated_12m_profit, Indicator::Value(dec!(78)));
    assert_eq!(series[11].monthly_profit_sma12, Indicator::Value(dec!(6.5)));
    assert_eq!(series[11].roe, Indicator::Value(dec!(0.078)));
    assert_eq!(series[13].accumulated_12m_profit, Indicator::Value(dec!(102)));

    // Trailing quarter annualized: (12 + 13 + 14) * 4 / 1000
    assert_eq!(series[13].projected_roe_3m, Indicator::Value(dec!(0.156)));
}

#[test]
fn filings_extend_workbook_with_semester_reversal() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    write_workbook(
        &config.workbook_path,
        &[(
            "TEST",
            vec![
                (202_501, 10.0, 900.0),
                (202_502, 20.0, 920.0),
                (202_503, 30.0, 940.0),
                (202_504, 40.0, 960.0),
            ],
        )],
    );

    // May: cumulative result 150 minus the 100 already in the semester
    write_filing(
        dir.path(),
        "202505BANCOS.CSV",
        "202505",
        &[
            ("BCO TESTE S.A.", 7_000_000_003, "160,00"),
            ("BCO TESTE S.A.", 8_000_000_002, "-10,00"),
            ("BCO TESTE S.A.", 6_100_000_007, "1.000,00"),
        ],
    );
    // June: cumulative result 210 minus (100 + 50)
    write_filing(
        dir.path(),
        "202506BANCOS.CSV",
        "202506",
        &[
            ("BCO TESTE S.A.", 7_000_000_003, "250,00"),
            ("BCO TESTE S.A.", 8_000_000_002, "-40,00"),
            ("BCO TESTE S.A.", 6_100_000_007, "1.050,00"),
        ],
    );

    let table = pipeline::run(&config).unwrap();
    let series = table.series("TEST");
    assert_eq!(series.len(), 6);
    assert_unique_keys(&table);

    assert_eq!(series[4].date, day(2025, 5));
    assert_eq!(series[4].monthly_profit, dec!(50));
    assert_eq!(series[4].equity, dec!(1000));
    assert_eq!(series[5].date, day(2025, 6));
    assert_eq!(series[5].monthly_profit, dec!(60));
    assert_eq!(series[5].equity, dec!(1050));
}

#[test]
fn filing_order_comes_from_content_not_filenames() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);

    // The May filing carries a filename that sorts after June's; the
    // parsed reference dates must still drive application order.
    write_filing(
        dir.path(),
        "202506BANCOS.CSV",
        "202506",
        &[("BCO TESTE S.A.", 7_000_000_003, "180,00")],
    );
    write_filing(
        dir.path(),
        "209999BANCOS.CSV",
        "202505",
        &[("BCO TESTE S.A.", 7_000_000_003, "100,00")],
    );

    let table = pipeline::run(&config).unwrap();
    let series = table.series("TEST");
    assert_eq!(series.len(), 2);
    assert_eq!(series[0].date, day(2025, 5));
    assert_eq!(series[0].monthly_profit, dec!(100));
    assert_eq!(series[1].date, day(2025, 6));
    assert_eq!(series[1].monthly_profit, dec!(80));
}

#[test]
fn reingesting_seen_filings_changes_nothing() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);

    write_filing(
        dir.path(),
        "202501BANCOS.CSV",
        "202501",
        &[("BCO TESTE S.A.", 7_000_000_003, "100,00")],
    );
    // Same filing content under a second name within the same run
    write_filing(
        dir.path(),
        "202501_2BANCOS.CSV",
        "202501",
        &[("BCO TESTE S.A.", 7_000_000_003, "100,00")],
    );

    let first = pipeline::run(&config).unwrap();
    assert_eq!(first.len(), 1);
    assert_eq!(first.series("TEST")[0].monthly_profit, dec!(100));

    // A full re-run over the same inputs reproduces the same table
    let second = pipeline::run(&config).unwrap();
    assert_eq!(second.len(), 1);
    assert_eq!(second.series("TEST")[0].monthly_profit, dec!(100));
}

#[test]
fn filing_overlapping_workbook_month_never_overwrites() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    write_workbook(
        &config.workbook_path,
        &[("TEST", vec![(202_501, 77.0, 500.0)])],
    );
    write_filing(
        dir.path(),
        "202501BANCOS.CSV",
        "202501",
        &[("BCO TESTE S.A.", 7_000_000_003, "999,00")],
    );

    let table = pipeline::run(&config).unwrap();
    let series = table.series("TEST");
    assert_eq!(series.len(), 1);
    assert_eq!(series[0].monthly_profit, dec!(77));
    assert_eq!(series[0].equity, dec!(500));
}

#[test]
fn zero_equity_roe_is_zero_but_projection_stays_undefined() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let rows: Vec<(u32, f64, f64)> = monthly_history(13)
        .into_iter()
        .map(|(stamp, profit, _)| (stamp, profit, 0.0))
        .collect();
    write_workbook(&config.workbook_path, &[("TEST", rows)]);

    let table = pipeline::run(&config).unwrap();
    for record in table.series("TEST") {
        assert_eq!(record.roe, Indicator::Zero);
        assert_eq!(record.roe.value(), Some(Decimal::ZERO));
        assert_eq!(record.projected_roe_3m, Indicator::Undefined);
    }
}

#[test]
fn corrupt_filing_is_skipped_without_aborting_the_run() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);

    fs::write(dir.path().join("202501BANCOS.CSV"), b"\xff\x00 not a filing").unwrap();
    write_filing(
        dir.path(),
        "202502BANCOS.CSV",
        "202502",
        &[("BCO TESTE S.A.", 7_000_000_003, "42,00")],
    );

    let table = pipeline::run(&config).unwrap();
    assert_eq!(table.len(), 1);
    assert_eq!(table.series("TEST")[0].date, day(2025, 2));
    assert_eq!(table.series("TEST")[0].monthly_profit, dec!(42));
}

#[test]
fn sheet_with_unresolvable_columns_is_skipped_others_survive() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);

    let mut workbook = Workbook::new();
    let bad = workbook.add_worksheet();
    bad.set_name("RUIM").unwrap();
    bad.write_string(0, 0, "DATA_BASE").unwrap();
    bad.write_string(0, 1, "LUCRO").unwrap();
    // No equity column at all
    bad.write_number(1, 0, 202_501.0).unwrap();
    bad.write_number(1, 1, 10.0).unwrap();

    let good = workbook.add_worksheet();
    good.set_name("TEST").unwrap();
    for (col, header) in ["DATA_BASE", "LUCRO", "PATRIMONIO"].iter().enumerate() {
        good.write_string(0, col as u16, *header).unwrap();
    }
    good.write_number(1, 0, 202_501.0).unwrap();
    good.write_number(1, 1, 10.0).unwrap();
    good.write_number(1, 2, 1000.0).unwrap();
    workbook.save(&config.workbook_path).unwrap();

    let table = pipeline::run(&config).unwrap();
    assert!(table.series("RUIM").is_empty());
    assert_eq!(table.series("TEST").len(), 1);
}

#[test]
fn unparsable_dates_drop_rows_and_unparsable_numbers_become_zero() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);

    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name("TEST").unwrap();
    for (col, header) in ["DATA_BASE", "LUCRO", "PATRIMONIO"].iter().enumerate() {
        sheet.write_string(0, col as u16, *header).unwrap();
    }
    sheet.write_string(1, 0, "breve").unwrap(); // dropped row
    sheet.write_number(1, 1, 10.0).unwrap();
    sheet.write_number(1, 2, 1000.0).unwrap();
    sheet.write_number(2, 0, 202_501.0).unwrap();
    sheet.write_string(2, 1, "n/d").unwrap(); // profit defaults to zero
    sheet.write_number(2, 2, 1000.0).unwrap();
    workbook.save(&config.workbook_path).unwrap();

    let table = pipeline::run(&config).unwrap();
    let series = table.series("TEST");
    assert_eq!(series.len(), 1);
    assert_eq!(series[0].date, day(2025, 1));
    assert_eq!(series[0].monthly_profit, dec!(0));
    assert_eq!(series[0].equity, dec!(1000));
}

#[test]
fn metrics_recompute_after_filings_extend_a_long_series() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);

    // 11 workbook months (Feb-Dec 2024): one short of the LTM window
    let rows: Vec<(u32, f64, f64)> = (2..=12).map(|m| (202_400 + m, 10.0, 1000.0)).collect();
    write_workbook(&config.workbook_path, &[("TEST", rows)]);

    // January filing completes the window
    write_filing(
        dir.path(),
        "202501BANCOS.CSV",
        "202501",
        &[
            ("BCO TESTE S.A.", 7_000_000_003, "10,00"),
            ("BCO TESTE S.A.", 6_100_000_007, "1.000,00"),
        ],
    );

    let table = pipeline::run(&config).unwrap();
    let series = table.series("TEST");
    assert_eq!(series.len(), 12);
    assert_eq!(series[10].accumulated_12m_profit, Indicator::Undefined);
    assert_eq!(
        series[11].accumulated_12m_profit,
        Indicator::Value(dec!(120))
    );
    assert_eq!(series[11].roe, Indicator::Value(dec!(0.12)));
}
