use std::io;
use std::net::SocketAddr;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tokio::net::TcpListener;

use crate::api;
use crate::application::{parse_wallet_id, LedgerService};
use crate::config::LedgerConfig;
use crate::domain::{format_money, Amount, WalletId};
use crate::logging;

/// Fiscus - wallet ledger with an immutable transaction log
#[derive(Parser)]
#[command(name = "fiscus")]
#[command(about = "Wallet balances backed by an append-only transaction log")]
#[command(version)]
pub struct Cli {
    /// Database file path (overrides FISCUS_DATABASE)
    #[arg(short, long, global = true)]
    pub database: Option<String>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Clone, Copy, Debug, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
    Csv,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new database
    Init,

    /// Wallet management commands
    #[command(subcommand)]
    Wallet(WalletCommands),

    /// Add money to a wallet
    Deposit {
        /// Wallet ID
        wallet: String,

        /// Amount to add (e.g., "50.00" or "50")
        amount: String,
    },

    /// Take money out of a wallet
    Withdraw {
        /// Wallet ID
        wallet: String,

        /// Amount to spend (e.g., "50.00" or "50")
        amount: String,
    },

    /// Move money between two wallets
    Transfer {
        /// Amount to transfer
        amount: String,

        /// Source wallet ID
        #[arg(long)]
        from: String,

        /// Destination wallet ID
        #[arg(long)]
        to: String,
    },

    /// List a wallet's transactions in creation order
    Transactions {
        /// Wallet ID
        wallet: String,

        /// Output format
        #[arg(short, long, value_enum, default_value_t)]
        format: OutputFormat,
    },

    /// Show current balance and all-time totals
    Summary {
        /// Wallet ID
        wallet: String,

        /// Output format
        #[arg(short, long, value_enum, default_value_t)]
        format: OutputFormat,
    },

    /// Monthly report for one calendar year
    Report {
        /// Wallet ID
        wallet: String,

        /// Calendar year (e.g., 2024)
        year: i32,

        /// Output format
        #[arg(short, long, value_enum, default_value_t)]
        format: OutputFormat,
    },

    /// Verify every stored balance against the transaction log
    Check,

    /// Run the HTTP API
    Serve {
        /// Listen address (overrides FISCUS_BIND)
        #[arg(long)]
        bind: Option<SocketAddr>,
    },
}

#[derive(Subcommand)]
pub enum WalletCommands {
    /// Create a new wallet
    Create {
        /// Wallet name (display label, need not be unique)
        name: String,
    },

    /// List all wallets
    List {
        /// Output format
        #[arg(short, long, value_enum, default_value_t)]
        format: OutputFormat,
    },

    /// Show detailed wallet information
    Show {
        /// Wallet ID
        wallet: String,
    },
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        let mut config = LedgerConfig::from_env()?;
        if let Some(database) = self.database {
            config.database = database;
        }

        let default_filter = match (&self.command, self.verbose) {
            (_, true) => "fiscus=debug,tower_http=debug",
            (Commands::Serve { .. }, false) => "fiscus=info,tower_http=info",
            _ => "warn",
        };
        logging::init(default_filter, config.log_format);

        match self.command {
            Commands::Init => {
                LedgerService::init_with(&config.store_options()).await?;
                println!("Database initialized: {}", config.database);
            }

            Commands::Wallet(wallet_cmd) => {
                let service = connect(&config).await?;
                run_wallet_command(&service, wallet_cmd).await?;
            }

            Commands::Deposit { wallet, amount } => {
                let service = connect(&config).await?;
                let wallet_id = parse_wallet_id(&wallet)?;
                let balance = service.deposit(wallet_id, parse_amount(&amount)?).await?;
                println!("Deposited {} into {}", amount.trim(), wallet_id);
                println!("New balance: {}", format_money(balance));
            }

            Commands::Withdraw { wallet, amount } => {
                let service = connect(&config).await?;
                let wallet_id = parse_wallet_id(&wallet)?;
                let balance = service.withdraw(wallet_id, parse_amount(&amount)?).await?;
                println!("Withdrew {} from {}", amount.trim(), wallet_id);
                println!("Remaining balance: {}", format_money(balance));
            }

            Commands::Transfer { amount, from, to } => {
                let service = connect(&config).await?;
                let from = parse_wallet_id(&from)?;
                let to = parse_wallet_id(&to)?;
                let result = service.transfer(from, to, parse_amount(&amount)?).await?;
                println!("Transferred {}: {} -> {}", result.amount, from, to);
                println!("  {}  {}", from, format_money(result.from_balance));
                println!("  {}  {}", to, format_money(result.to_balance));
            }

            Commands::Transactions { wallet, format } => {
                let service = connect(&config).await?;
                print_transactions(&service, parse_wallet_id(&wallet)?, format).await?;
            }

            Commands::Summary { wallet, format } => {
                let service = connect(&config).await?;
                print_summary(&service, parse_wallet_id(&wallet)?, format).await?;
            }

            Commands::Report {
                wallet,
                year,
                format,
            } => {
                let service = connect(&config).await?;
                print_monthly_report(&service, parse_wallet_id(&wallet)?, year, format).await?;
            }

            Commands::Check => {
                let service = connect(&config).await?;
                run_check_command(&service).await?;
            }

            Commands::Serve { bind } => {
                // Migrations are idempotent, so a server can start on a fresh path.
                let service = LedgerService::init_with(&config.store_options()).await?;
                let addr = bind.unwrap_or(config.bind);
                let listener = TcpListener::bind(addr)
                    .await
                    .with_context(|| format!("Failed to bind {}", addr))?;
                api::serve(listener, service).await?;
            }
        }

        Ok(())
    }
}

async fn connect(config: &LedgerConfig) -> Result<LedgerService> {
    LedgerService::connect_with(&config.store_options())
        .await
        .with_context(|| format!("Failed to open database {}", config.database))
}

fn parse_amount(raw: &str) -> Result<Amount> {
    Amount::parse(raw).context("Invalid amount format. Use '50.00' or '50'")
}

async fn run_wallet_command(service: &LedgerService, cmd: WalletCommands) -> Result<()> {
    match cmd {
        WalletCommands::Create { name } => {
            let wallet = service.create_wallet(name).await?;
            println!("Created wallet: {} ({})", wallet.name, wallet.id);
        }

        WalletCommands::List { format } => {
            let wallets = service.list_wallets().await?;
            match format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&wallets)?);
                }
                OutputFormat::Csv => {
                    let mut writer = csv::Writer::from_writer(io::stdout());
                    writer.write_record(["id", "name", "balance", "created_at"])?;
                    for wallet in &wallets {
                        writer.write_record([
                            wallet.id.to_string(),
                            wallet.name.clone(),
                            format_money(wallet.balance),
                            wallet.created_at.to_rfc3339(),
                        ])?;
                    }
                    writer.flush()?;
                }
                OutputFormat::Table if wallets.is_empty() => println!("No wallets found."),
                OutputFormat::Table => {
                    println!("{:<36}  {:<20} {:>14}", "ID", "NAME", "BALANCE");
                    println!("{}", "-".repeat(72));
                    for wallet in wallets {
                        println!(
                            "{:<36}  {:<20} {:>14}",
                            wallet.id,
                            truncate(&wallet.name, 20),
                            format_money(wallet.balance)
                        );
                    }
                }
            }
        }

        WalletCommands::Show { wallet } => {
            let wallet_id = parse_wallet_id(&wallet)?;
            // One snapshot for both balances
            let wallet = service.reports().derived_balance(wallet_id).await?;

            println!("Wallet: {}", wallet.name);
            println!("  ID:             {}", wallet.wallet_id);
            println!(
                "  Created:        {}",
                wallet.created_at.format("%Y-%m-%d %H:%M:%S")
            );
            println!();
            println!("  Balance:        {}", format_money(wallet.stored_balance));
            println!(
                "  Derived:        {}",
                format_money(wallet.derived_balance)
            );
        }
    }

    Ok(())
}

async fn print_transactions(
    service: &LedgerService,
    wallet_id: WalletId,
    format: OutputFormat,
) -> Result<()> {
    let listing = service.reports().wallet_transactions(wallet_id).await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&listing)?),
        OutputFormat::Csv => {
            let mut writer = csv::Writer::from_writer(io::stdout());
            writer.write_record(["id", "sequence", "type", "value", "created_at"])?;
            for tx in &listing.transactions {
                writer.write_record([
                    tx.id.to_string(),
                    tx.sequence.to_string(),
                    tx.kind.to_string(),
                    format_money(tx.value),
                    tx.created_at.to_rfc3339(),
                ])?;
            }
            writer.flush()?;
        }
        OutputFormat::Table => {
            println!(
                "{:>6}  {:<19}  {:<8} {:>14}",
                "SEQ", "DATE", "TYPE", "VALUE"
            );
            println!("{}", "-".repeat(52));
            for tx in &listing.transactions {
                println!(
                    "{:>6}  {:<19}  {:<8} {:>14}",
                    tx.sequence,
                    tx.created_at.format("%Y-%m-%d %H:%M:%S"),
                    tx.kind.to_string(),
                    format_money(tx.signed_value())
                );
            }
            println!("{}", "-".repeat(52));
            println!("Stored balance:  {}", format_money(listing.stored_balance));
            println!("Derived balance: {}", format_money(listing.derived_balance));
        }
    }

    Ok(())
}

async fn print_summary(
    service: &LedgerService,
    wallet_id: WalletId,
    format: OutputFormat,
) -> Result<()> {
    let summary = service.reports().summary(wallet_id).await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
        OutputFormat::Csv => {
            let mut writer = csv::Writer::from_writer(io::stdout());
            writer.write_record(["wallet_id", "current_balance", "total_added", "total_spent"])?;
            writer.write_record([
                summary.wallet_id.to_string(),
                format_money(summary.current_balance),
                format_money(summary.total_added),
                format_money(summary.total_spent),
            ])?;
            writer.flush()?;
        }
        OutputFormat::Table => {
            println!("Wallet {}", summary.wallet_id);
            println!("  Current balance: {:>14}", format_money(summary.current_balance));
            println!("  Total added:     {:>14}", format_money(summary.total_added));
            println!("  Total spent:     {:>14}", format_money(summary.total_spent));
        }
    }

    Ok(())
}

async fn print_monthly_report(
    service: &LedgerService,
    wallet_id: WalletId,
    year: i32,
    format: OutputFormat,
) -> Result<()> {
    let report = service.reports().monthly_report(wallet_id, year).await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Csv => {
            let mut writer = csv::Writer::from_writer(io::stdout());
            writer.write_record([
                "month",
                "name",
                "opening_balance",
                "total_added",
                "total_spent",
                "closing_balance",
            ])?;
            for bucket in &report.monthly_report {
                writer.write_record([
                    bucket.month.to_string(),
                    bucket.name.clone(),
                    format_money(bucket.opening_balance),
                    format_money(bucket.total_added),
                    format_money(bucket.total_spent),
                    format_money(bucket.closing_balance),
                ])?;
            }
            writer.flush()?;
        }
        OutputFormat::Table => {
            println!("Monthly Report {} for {}", report.year, report.wallet_id);
            println!();
            println!(
                "{:<10} {:>14} {:>14} {:>14} {:>14}",
                "MONTH", "OPENING", "ADDED", "SPENT", "CLOSING"
            );
            println!("{}", "-".repeat(70));
            for bucket in &report.monthly_report {
                println!(
                    "{:<10} {:>14} {:>14} {:>14} {:>14}",
                    bucket.name,
                    format_money(bucket.opening_balance),
                    format_money(bucket.total_added),
                    format_money(bucket.total_spent),
                    format_money(bucket.closing_balance)
                );
            }
        }
    }

    Ok(())
}

async fn run_check_command(service: &LedgerService) -> Result<()> {
    let reconciliations = service.reports().reconcile_all().await?;
    let broken: Vec<_> = reconciliations
        .iter()
        .filter(|r| !r.is_consistent())
        .collect();

    println!("Checked {} wallets", reconciliations.len());

    if broken.is_empty() {
        println!("Ledger is consistent.");
        return Ok(());
    }

    for r in &broken {
        println!(
            "  {} ({}): stored {}, derived {}",
            r.wallet_id,
            r.name,
            format_money(r.stored_balance),
            format_money(r.derived_balance)
        );
    }
    bail!("{} wallet(s) failed reconciliation", broken.len())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}
