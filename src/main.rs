mod api;
mod batch;
mod config;
mod error;
mod logging;
mod notify;
mod report;
mod retail;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{Local, Utc};
use clap::{Parser, Subcommand};
use tabled::{settings::Style, Table, Tabled};

use crate::api::SaturnClient;
use crate::batch::{plan_invoices, BatchLimits, DocNumberSequence};
use crate::config::Config;
use crate::error::Result;
use crate::notify::notify_deliveries;
use crate::report::save_run_artifacts;
use crate::retail::submit_invoices;

#[derive(Parser)]
#[command(name = "saturn-stock")]
#[command(version, about = "Warehouse delivery and retail write-off automation", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Batch warehouse stock into invoices and send them to retail write-off
    WriteOff {
        /// Send for real (default is a dry run)
        #[arg(long)]
        execute: bool,

        /// Maximum line items per invoice
        #[arg(long, default_value_t = 2)]
        items: usize,

        /// Maximum number of invoices
        #[arg(long, default_value_t = 2)]
        limit: usize,

        /// No invoice count limit (overrides --limit)
        #[arg(long)]
        no_limit: bool,
    },

    /// Mark invoices on the way to our contractor as delivered
    Delivered,

    /// Show the resolved configuration
    Config,
}

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load()?;
    logging::init(&config.log_file)?;

    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&interrupted);
    ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);
    })?;

    match cli.command {
        Commands::WriteOff {
            execute,
            items,
            limit,
            no_limit,
        } => cmd_write_off(&config, execute, items, limit, no_limit, &interrupted),
        Commands::Delivered => cmd_delivered(&config, &interrupted),
        Commands::Config => cmd_config(&config),
    }
}

// Table row structs for tabled
#[derive(Tabled)]
struct PlannedInvoiceRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "NUMBER")]
    number: String,
    #[tabled(rename = "LINES")]
    lines: usize,
    #[tabled(rename = "WAREHOUSE")]
    warehouse: i64,
    #[tabled(rename = "CONTRACTOR")]
    contractor: i64,
}

#[derive(Tabled)]
struct ConfigRow {
    #[tabled(rename = "SETTING")]
    setting: &'static str,
    #[tabled(rename = "VALUE")]
    value: String,
}

/// Batch stock into invoices and push them to retail write-off
fn cmd_write_off(
    config: &Config,
    execute: bool,
    items: usize,
    limit: usize,
    no_limit: bool,
    interrupted: &AtomicBool,
) -> Result<()> {
    tracing::info!("Starting retail write-off service");
    let client = SaturnClient::new(config);

    println!("Fetching warehouse stock totals...");
    let stock = client.fetch_stock_totals(Utc::now())?;
    if stock.is_empty() {
        println!("No stock rows to process.");
        return Ok(());
    }
    println!("Fetched {} stock rows", stock.len());

    let max_invoices = if no_limit { None } else { Some(limit) };
    match max_invoices {
        Some(max) => println!("Invoice limit: {max}"),
        None => println!("Invoice limit: none"),
    }
    println!("Lines per invoice: {items}");
    println!("Mode: {}", if execute { "execute" } else { "dry run" });

    let limits = BatchLimits {
        lines_per_invoice: items,
        max_invoices,
    };
    let mut sequence = DocNumberSequence::new();
    let specs = plan_invoices(&stock, limits, &mut sequence, Utc::now());

    if specs.is_empty() {
        println!("Nothing to write off.");
        return Ok(());
    }

    let rows: Vec<PlannedInvoiceRow> = specs
        .iter()
        .enumerate()
        .map(|(i, spec)| PlannedInvoiceRow {
            index: i + 1,
            number: spec.doc_num.clone(),
            lines: spec.lines.len(),
            warehouse: spec.source_warehouse_id,
            contractor: spec.receiver_contractor_id,
        })
        .collect();
    let table = Table::new(rows).with(Style::rounded()).to_string();
    println!("Planned {} invoices:", specs.len());
    println!("{table}");

    let results = if execute {
        submit_invoices(&client, &specs, interrupted)
    } else {
        println!("Dry run complete. Pass --execute to send them.");
        Vec::new()
    };

    if execute {
        let sent = results.iter().filter(|r| r.is_sent()).count();
        println!("Sent {} of {} invoices", sent, results.len());
        for result in results.iter().filter(|r| !r.is_sent()) {
            println!(
                "  failed {}: {}",
                result.doc_num,
                result.error.as_deref().unwrap_or("unknown error")
            );
        }
    }

    match save_run_artifacts(&specs, &results, Local::now()) {
        Ok(paths) => {
            for path in paths {
                println!("Saved {}", path.display());
            }
        }
        Err(err) => tracing::warn!("Failed to save run artifacts: {err}"),
    }

    Ok(())
}

/// Mark every on-the-way invoice for our contractor as delivered
fn cmd_delivered(config: &Config, interrupted: &AtomicBool) -> Result<()> {
    tracing::info!("Starting delivery notification service");
    let client = SaturnClient::new(config);

    let summary = notify_deliveries(&client, config, interrupted)?;
    println!(
        "Processed {} invoices: {} delivered, {} errors, {} skipped",
        summary.total, summary.success, summary.errors, summary.skipped
    );

    Ok(())
}

/// Show the resolved configuration with the credential masked
fn cmd_config(config: &Config) -> Result<()> {
    let rows = vec![
        ConfigRow {
            setting: "URL",
            value: config.url.clone(),
        },
        ConfigRow {
            setting: "CONTENT_TYPE",
            value: config.content_type.clone(),
        },
        ConfigRow {
            setting: "AUTHORIZATION",
            value: config.masked_authorization(),
        },
        ConfigRow {
            setting: "CONTRACTOR_ID",
            value: config.contractor_id.to_string(),
        },
        ConfigRow {
            setting: "PAGE_SIZE",
            value: config.page_size.to_string(),
        },
        ConfigRow {
            setting: "LOG_FILE",
            value: config.log_file.display().to_string(),
        },
        ConfigRow {
            setting: "FALLBACK_WAREHOUSE_ID",
            value: config.fallback_warehouse_id.to_string(),
        },
    ];
    let table = Table::new(rows).with(Style::rounded()).to_string();
    println!("{table}");

    Ok(())
}
