use crate::config::Config;
use crate::postfinance::PostFinanceClient;
use anyhow::{Context, Result};
use sqlx::PgPool;
use std::time::Duration;

pub struct ValidationReport {
    pub environment: bool,
    pub database: bool,
    pub processor: bool,
    pub errors: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.environment && self.database && self.processor
    }

    pub fn print(&self) {
        println!("\n=== Startup Validation Report ===");
        println!("Environment Variables: {}", status(self.environment));
        println!("Database Connectivity: {}", status(self.database));
        println!("PostFinance API:       {}", status(self.processor));

        if !self.errors.is_empty() {
            println!("\nErrors:");
            for error in &self.errors {
                println!("  ❌ {}", error);
            }
        }

        println!("\nOverall Status: {}", if self.is_valid() { "✅ PASS" } else { "❌ FAIL" });
        println!("=================================\n");
    }
}

fn status(ok: bool) -> &'static str {
    if ok { "✅ OK" } else { "❌ FAIL" }
}

pub async fn validate_environment(config: &Config, pool: &PgPool) -> Result<ValidationReport> {
    let mut report = ValidationReport {
        environment: true,
        database: true,
        processor: true,
        errors: Vec::new(),
    };

    if let Err(e) = validate_env_vars(config) {
        report.environment = false;
        report.errors.push(format!("Environment: {}", e));
    }

    let (database, processor) = futures::future::join(
        validate_database(pool),
        validate_processor(&config.postfinance_api_url),
    )
    .await;

    if let Err(e) = database {
        report.database = false;
        report.errors.push(format!("Database: {}", e));
    }

    if let Err(e) = processor {
        report.processor = false;
        report.errors.push(format!("PostFinance: {}", e));
    }

    Ok(report)
}

fn validate_env_vars(config: &Config) -> Result<()> {
    if config.database_url.is_empty() {
        anyhow::bail!("DATABASE_URL is empty");
    }
    if config.server_port == 0 {
        anyhow::bail!("SERVER_PORT must be greater than 0");
    }
    if config.completion_poll_interval_ms == 0 {
        anyhow::bail!("COMPLETION_POLL_INTERVAL_MS must be greater than 0");
    }

    url::Url::parse(&config.postfinance_api_url).context("POSTFINANCE_API_URL is not a valid URL")?;
    config.return_urls()?;
    PostFinanceClient::new(&config.postfinance_api_url, config.credentials())
        .context("PostFinance credentials are unusable")?;

    Ok(())
}

async fn validate_database(pool: &PgPool) -> Result<()> {
    sqlx::query("SELECT 1")
        .fetch_one(pool)
        .await
        .context("Failed to connect to database")?;

    let applied: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations")
        .fetch_one(pool)
        .await
        .context("Failed to check migrations table")?;

    if applied == 0 {
        anyhow::bail!("No migrations applied");
    }

    Ok(())
}

/// Reachability only; authentication is exercised by the first real call.
async fn validate_processor(api_url: &str) -> Result<()> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()?;

    let response = client
        .get(api_url)
        .send()
        .await
        .context("Failed to connect to PostFinance API")?;

    if response.status().is_server_error() {
        anyhow::bail!("PostFinance API returned status: {}", response.status());
    }

    Ok(())
}
