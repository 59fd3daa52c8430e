use clap::{Parser, Subcommand};
use uuid::Uuid;

use crate::config::Config;
use crate::ports::TransactionStore;

#[derive(Parser)]
#[command(name = "postfinance-gateway")]
#[command(about = "PostFinance Checkout gateway and payment reconciler", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server (default)
    Serve,

    /// Transaction inspection commands
    #[command(subcommand)]
    Tx(TxCommands),

    /// Database management commands
    #[command(subcommand)]
    Db(DbCommands),

    /// Configuration validation
    Config,
}

#[derive(Subcommand)]
pub enum TxCommands {
    /// Show a transaction and its audit trail
    Show {
        /// Transaction UUID
        #[arg(value_name = "TX_ID")]
        tx_id: Uuid,
    },
}

#[derive(Subcommand)]
pub enum DbCommands {
    /// Run database migrations
    Migrate,
}

pub async fn handle_tx_show(store: &dyn TransactionStore, tx_id: Uuid) -> anyhow::Result<()> {
    let tx = store.get(tx_id).await?;
    let children = store.children(tx_id).await?;

    println!(
        "{}  {}  order={}  {} {}  reference={}  status={}",
        tx.id,
        tx.kind.as_str(),
        tx.order_id,
        tx.amount,
        tx.currency,
        tx.reference.as_deref().unwrap_or("-"),
        display_status(&tx),
    );
    for child in &children {
        println!(
            "  └ {}  {}  {}  status={}  {}",
            child.created_at.to_rfc3339(),
            child.kind.as_str(),
            child.reference.as_deref().unwrap_or("-"),
            display_status(child),
            child.message.as_deref().unwrap_or(""),
        );
    }
    match tx.effective_status(&children) {
        Some(status) => println!("Effective status: {}", status),
        None => println!("Effective status: unset"),
    }
    Ok(())
}

fn display_status(tx: &crate::domain::LocalTransaction) -> &'static str {
    tx.status.map(|s| s.as_str()).unwrap_or("unset")
}

pub async fn handle_db_migrate(config: &Config) -> anyhow::Result<()> {
    let pool = crate::db::create_pool(config).await?;
    crate::db::run_migrations(&pool).await?;
    println!("✓ Database migrations completed");
    Ok(())
}

pub async fn handle_config_validate(config: &Config) -> anyhow::Result<()> {
    let pool = crate::db::create_pool(config).await?;
    let report = crate::startup::validate_environment(config, &pool).await?;
    report.print();
    if !report.is_valid() {
        anyhow::bail!("Configuration validation failed");
    }
    Ok(())
}
