pub mod client;
pub mod models;

use thiserror::Error;

pub use client::{Credentials, PostFinanceClient};

#[derive(Error, Debug)]
pub enum ProcessorError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),
    #[error("Remote entity not found: {0}")]
    NotFound(String),
    #[error("PostFinance API returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("Invalid response from PostFinance: {0}")]
    InvalidResponse(String),
    #[error("Circuit breaker open: {0}")]
    CircuitBreakerOpen(String),
    #[error("Invalid client configuration: {0}")]
    Configuration(String),
}
