use anyhow::Context;
use dotenvy::dotenv;
use serde::Deserialize;
use std::env;
use std::time::Duration;
use url::Url;

use crate::postfinance::Credentials;
use crate::services::{PollSettings, ReturnUrls};

const DEFAULT_API_URL: &str = "https://checkout.postfinance.ch/api";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server_port: u16,
    pub database_url: String,
    pub postfinance_api_url: String,
    pub postfinance_space_id: u64,
    pub postfinance_user_id: u64,
    pub postfinance_secret_key: String,
    pub public_base_url: String,
    pub payment_failed_url: String,
    pub completion_poll_interval_ms: u64,
    pub completion_poll_ceiling_secs: u64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok(); // Load .env file if present

        let public_base_url = env::var("PUBLIC_BASE_URL").context("PUBLIC_BASE_URL must be set")?;
        let payment_failed_url = env::var("PAYMENT_FAILED_URL")
            .unwrap_or_else(|_| format!("{}/payments/failed", public_base_url.trim_end_matches('/')));

        Ok(Config {
            server_port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()?,
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            postfinance_api_url: env::var("POSTFINANCE_API_URL")
                .unwrap_or_else(|_| DEFAULT_API_URL.to_string()),
            postfinance_space_id: env::var("POSTFINANCE_SPACE_ID")
                .context("POSTFINANCE_SPACE_ID must be set")?
                .parse()
                .context("POSTFINANCE_SPACE_ID must be numeric")?,
            postfinance_user_id: env::var("POSTFINANCE_USER_ID")
                .context("POSTFINANCE_USER_ID must be set")?
                .parse()
                .context("POSTFINANCE_USER_ID must be numeric")?,
            postfinance_secret_key: env::var("POSTFINANCE_SECRET_KEY")
                .context("POSTFINANCE_SECRET_KEY must be set")?,
            public_base_url,
            payment_failed_url,
            completion_poll_interval_ms: env::var("COMPLETION_POLL_INTERVAL_MS")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()?,
            completion_poll_ceiling_secs: env::var("COMPLETION_POLL_CEILING_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()?,
        })
    }

    pub fn credentials(&self) -> Credentials {
        Credentials {
            space_id: self.postfinance_space_id,
            user_id: self.postfinance_user_id,
            secret_key: self.postfinance_secret_key.clone(),
        }
    }

    pub fn poll_settings(&self) -> PollSettings {
        PollSettings {
            interval: Duration::from_millis(self.completion_poll_interval_ms),
            ceiling: Duration::from_secs(self.completion_poll_ceiling_secs),
        }
    }

    pub fn return_urls(&self) -> anyhow::Result<ReturnUrls> {
        // The base must end in '/' or Url::join replaces its last segment.
        let base = format!("{}/", self.public_base_url.trim_end_matches('/'));
        Ok(ReturnUrls {
            public_base_url: Url::parse(&base).context("PUBLIC_BASE_URL is not a valid URL")?,
            default_failed_url: Url::parse(&self.payment_failed_url)
                .context("PAYMENT_FAILED_URL is not a valid URL")?,
        })
    }
}
