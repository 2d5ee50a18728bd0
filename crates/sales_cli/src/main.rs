//! Command-line front end for sales core.
//!
//! # Responsibility
//! - Wire config, logging and the storage gateway for one command.
//! - Keep output deterministic: ids and names on stdout, errors on stderr.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use sales_core::{
    init_logging_from_config, InvoiceId, SaleRecorder, SaleRepository, SqliteSaleRepository,
    StorageGateway, StoreConfig,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "sales")]
#[command(about = "Record sales against a local store", version)]
struct Cli {
    /// Database file. Overrides SALES_DB_PATH.
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// Overrides SALES_LOG_LEVEL.
    #[arg(long, global = true)]
    log_level: Option<String>,
    /// Absolute log directory. Overrides SALES_LOG_DIR.
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,
    /// Refuse sales with no items.
    #[arg(long, global = true)]
    reject_empty: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Register a customer and print its id.
    AddCustomer { name: String },
    /// Record one sale and print the invoice id.
    Record {
        customer: String,
        items: Vec<String>,
    },
    /// Print an invoice and its items.
    Show { invoice_id: InvoiceId },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = resolve_config(&cli)?;
    init_logging_from_config(&config).context("failed to initialize logging")?;
    info!(
        "event=cli_start module=cli status=ok version={}",
        sales_core::core_version()
    );

    let gateway = StorageGateway::open(&config.db_path, config.busy_timeout())
        .with_context(|| format!("failed to open `{}`", config.db_path.display()))?;

    match cli.command {
        Command::AddCustomer { name } => {
            let id = SqliteSaleRepository::new(gateway.connection()).create_customer(&name)?;
            println!("{id}");
        }
        Command::Record { customer, items } => {
            let mut recorder = SaleRecorder::new(gateway, config.sale_policy());
            let invoice_id = recorder.record_sale(&customer, &items)?;
            println!("{invoice_id}");
            recorder.into_gateway().close()?;
            return Ok(());
        }
        Command::Show { invoice_id } => {
            let receipt = SqliteSaleRepository::new(gateway.connection())
                .get_receipt(invoice_id)?
                .with_context(|| format!("invoice {invoice_id} not found"))?;
            println!(
                "invoice {} customer {} created_at {}",
                receipt.invoice.id, receipt.invoice.customer_id, receipt.invoice.created_at
            );
            for item in &receipt.items {
                println!("  {} {}", item.id, item.name);
            }
        }
    }

    gateway.close()?;
    Ok(())
}

fn resolve_config(cli: &Cli) -> Result<StoreConfig> {
    let mut config = StoreConfig::from_env()?;
    if let Some(db) = &cli.db {
        config.db_path = db.clone();
    }
    if let Some(level) = &cli.log_level {
        config.log_level = level.clone();
    }
    if let Some(dir) = &cli.log_dir {
        config.log_dir = Some(dir.clone());
    }
    if cli.reject_empty {
        config.allow_empty_sales = false;
    }
    Ok(config)
}
