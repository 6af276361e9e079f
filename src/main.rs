use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

use balancete::config::PipelineConfig;
use balancete::valuation::ValuationRow;
use balancete::{pipeline, reports, valuation};

#[derive(Parser)]
#[command(name = "balancete")]
#[command(
    version,
    about = "Consolidates Brazilian bank balance-sheet filings into a monthly series with profitability indicators"
)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Historical workbook (one sheet per ticker)
    #[arg(long, global = true)]
    workbook: Option<PathBuf>,

    /// Directory containing regulator CSV filings
    #[arg(long, global = true)]
    filings: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest both sources, compute indicators, optionally export
    Run {
        /// Write the canonical table as CSV
        #[arg(long)]
        export: Option<PathBuf>,

        /// Write the canonical table as JSON
        #[arg(long)]
        json_export: Option<PathBuf>,

        /// Preview the most recent rows of one ticker
        #[arg(long)]
        ticker: Option<String>,
    },

    /// Latest indicators per bank, optionally merged with valuation data
    Snapshot {
        /// Local valuation spreadsheet (fixed column layout)
        #[arg(long)]
        valuation: Option<PathBuf>,

        /// Scrape the public screener instead of a local file
        #[arg(long)]
        fundamentus: bool,
    },

    /// Inspect the auxiliary valuation feed on its own
    Valuation {
        /// Local valuation spreadsheet
        #[arg(long)]
        file: Option<PathBuf>,

        /// Scrape the public screener
        #[arg(long)]
        fundamentus: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let mut config = PipelineConfig::load_or_default(cli.config.as_deref())?;
    if let Some(workbook) = cli.workbook {
        config.workbook_path = workbook;
    }
    if let Some(filings) = cli.filings {
        config.filings_dir = filings;
    }

    match cli.command {
        Commands::Run {
            export,
            json_export,
            ticker,
        } => run_pipeline(&config, export, json_export, ticker),
        Commands::Snapshot {
            valuation,
            fundamentus,
        } => show_snapshot(&config, valuation, fundamentus),
        Commands::Valuation { file, fundamentus } => show_valuation(file, fundamentus),
    }
}

fn run_pipeline(
    config: &PipelineConfig,
    export: Option<PathBuf>,
    json_export: Option<PathBuf>,
    ticker: Option<String>,
) -> Result<()> {
    let table = pipeline::run(config)?;

    println!(
        "\n{} Consolidated {} rows across {} tickers\n",
        "✓".green().bold(),
        table.len(),
        table.tickers().count()
    );

    if let Some(ticker) = ticker {
        let ticker = ticker.trim().to_uppercase();
        if table.series(&ticker).is_empty() {
            println!("{} No rows for {}", "!".yellow().bold(), ticker);
        } else {
            println!("{}", reports::render_preview(&table, &ticker, 12));
        }
    }

    if let Some(path) = export {
        let file = std::fs::File::create(&path)?;
        reports::write_csv(&table, file)?;
        println!("{} Wrote CSV export to {:?}", "✓".green().bold(), path);
    }

    if let Some(path) = json_export {
        let file = std::fs::File::create(&path)?;
        reports::write_json(&table, file)?;
        println!("{} Wrote JSON export to {:?}", "✓".green().bold(), path);
    }

    Ok(())
}

fn show_snapshot(
    config: &PipelineConfig,
    valuation_file: Option<PathBuf>,
    fundamentus: bool,
) -> Result<()> {
    let table = pipeline::run(config)?;
    let quotes = load_quotes(valuation_file, fundamentus)?;
    println!("{}", reports::render_snapshot(&table, &quotes));
    Ok(())
}

fn show_valuation(file: Option<PathBuf>, fundamentus: bool) -> Result<()> {
    use tabled::{settings::Style, Table, Tabled};

    let quotes = load_quotes(file, fundamentus)?;
    if quotes.is_empty() {
        println!("{} No valuation data available", "!".yellow().bold());
        return Ok(());
    }

    #[derive(Tabled)]
    struct QuotePreview {
        #[tabled(rename = "Ticker")]
        ticker: String,
        #[tabled(rename = "Price")]
        price: String,
        #[tabled(rename = "P/L")]
        price_earnings: String,
        #[tabled(rename = "DY")]
        dividend_yield: String,
    }

    let preview: Vec<QuotePreview> = quotes
        .iter()
        .map(|quote| QuotePreview {
            ticker: quote.ticker.clone(),
            price: quote
                .price
                .map(balancete::locale::format_decimal_br)
                .unwrap_or_default(),
            price_earnings: quote
                .price_earnings
                .map(balancete::locale::format_decimal_br)
                .unwrap_or_default(),
            dividend_yield: quote
                .dividend_yield
                .map(balancete::locale::format_percent)
                .unwrap_or_default(),
        })
        .collect();

    println!("{}", Table::new(preview).with(Style::rounded()));
    println!("\n{} quotes", quotes.len());
    Ok(())
}

fn load_quotes(file: Option<PathBuf>, fundamentus: bool) -> Result<Vec<ValuationRow>> {
    if fundamentus {
        Ok(valuation::fetch_fundamentus())
    } else if let Some(path) = file {
        valuation::load_valuation_sheet(&path)
    } else {
        Ok(Vec::new())
    }
}
