//! `trade-ledger`: a thin CLI harness over the lot-pairing engine library.
//!
//! Not a user-facing reporting tool — the minimal surface needed to run the
//! engine as a program: `init`, `import`, `pair`, `report`.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use trade_ledger::config::Config;
use trade_ledger::db::{RateMode, Store};
use trade_ledger::models::PairingMethod;
use trade_ledger::services::{country_resolver::CountryResolver, importer, income_aggregator, lot_pairing, tax_rates::TaxRateCatalog};

#[derive(Parser)]
#[command(author, version, about = "Lot-pairing engine for capital-gains tax reports", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new, empty store file
    Init {
        db_path: PathBuf,
        /// Exchange-rate mode, fixed for the life of the store
        #[arg(long, default_value = "daily")]
        mode: String,
    },
    /// Import a broker CSV export into an existing store
    Import {
        db_path: PathBuf,
        csv_path: PathBuf,
        /// Optional JSON config override
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Apply a selection-policy pairing method to a single sale
    Pair {
        db_path: PathBuf,
        sale_id: i64,
        method: String,
        /// Restrict candidate lots to ones that pass the holding-period test
        #[arg(long)]
        time_test_only: bool,
    },
    /// Print a per-year income summary
    Report {
        db_path: PathBuf,
        year: i32,
        #[arg(long)]
        country_overrides: Option<PathBuf>,
        #[arg(long)]
        tax_rates: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Init { db_path, mode } => cmd_init(db_path, &mode),
        Commands::Import { db_path, csv_path, config } => cmd_import(db_path, csv_path, config).await,
        Commands::Pair { db_path, sale_id, method, time_test_only } => {
            cmd_pair(db_path, sale_id, &method, time_test_only)
        }
        Commands::Report { db_path, year, country_overrides, tax_rates } => {
            cmd_report(db_path, year, country_overrides, tax_rates)
        }
    }
}

fn open_store(db_path: PathBuf) -> Result<Store> {
    let store = Store::new();
    store
        .open(db_path.clone())
        .with_context(|| format!("opening store at {:?}", db_path))?;
    Ok(store)
}

fn cmd_init(db_path: PathBuf, mode: &str) -> Result<()> {
    let rate_mode = RateMode::parse(mode).with_context(|| format!("unrecognized rate mode {mode:?}"))?;
    let store = Store::new();
    store.create(db_path.clone(), rate_mode)?;
    println!("created store {:?} in {} rate mode", db_path, rate_mode.as_str());
    Ok(())
}

async fn cmd_import(db_path: PathBuf, csv_path: PathBuf, config_path: Option<PathBuf>) -> Result<()> {
    let store = open_store(db_path)?;
    let config = Config::load_with_override(config_path.as_deref());
    let report = importer::import_csv(&store, &config, &csv_path).await?;

    println!("trades:    {} read, {} added", report.trades_read, report.trades_added);
    println!("interests: {} read, {} added", report.interests_read, report.interests_added);
    println!("dividends: {} read, {} added", report.dividends_read, report.dividends_added);
    println!("insignificant rows skipped: {}", report.insignificant);
    println!("unrecognized actions:       {}", report.unknown);
    println!("failed rows:                {}", report.failed);
    Ok(())
}

fn cmd_pair(db_path: PathBuf, sale_id: i64, method: &str, time_test_only: bool) -> Result<()> {
    let store = open_store(db_path)?;
    let config = Config::embedded();
    let method = PairingMethod::parse(method).with_context(|| format!("unrecognized pairing method {method:?}"))?;
    if method == PairingMethod::Manual {
        bail!("Manual pairing needs an explicit purchase id; use the library's manual_pair directly");
    }

    let outcome = lot_pairing::apply_method(&store, &config, sale_id, method, time_test_only)?;
    println!(
        "success={} pairings_created={} total_quantity_paired={}",
        outcome.success, outcome.pairings_created, outcome.total_quantity_paired
    );
    if let Some(error) = outcome.error {
        println!("note: {error}");
    }
    Ok(())
}

fn cmd_report(db_path: PathBuf, year: i32, country_overrides: Option<PathBuf>, tax_rates_path: Option<PathBuf>) -> Result<()> {
    let store = open_store(db_path)?;
    let country_resolver = CountryResolver::load(country_overrides.as_deref());
    let tax_rates = tax_rates_path
        .map(|p| TaxRateCatalog::load(&p))
        .unwrap_or_else(|| TaxRateCatalog::load(&PathBuf::from("data/tax_rates.json")));

    let report = income_aggregator::aggregate_year(&store, &country_resolver, &tax_rates, year)?;

    println!("--- income report for {year} ---");
    println!(
        "dividends: gross={:.2} withholding={:.2} net={:.2}",
        report.dividends_gross_czk, report.dividends_withholding_czk, report.dividends_net_czk
    );
    for (country, totals) in &report.dividends_by_country {
        println!(
            "  {country}: gross={:.2} withholding={:.2} net={:.2}",
            totals.gross_czk, totals.withholding_czk, totals.net_czk
        );
    }
    println!("interest (cash):    {:.2}", report.interest_cash_czk);
    println!("interest (lending): {:.2}", report.interest_lending_czk);
    println!("realized gains:     {:.2}", report.realized_gains_czk);
    Ok(())
}
