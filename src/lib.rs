pub mod adapters;
pub mod cli;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod ports;
pub mod postfinance;
pub mod services;
pub mod startup;

use std::sync::Arc;

use axum::{
    middleware::from_fn,
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::ports::{PaymentProcessor, TransactionStore};
use crate::services::{PollSettings, ReturnUrls};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn TransactionStore>,
    pub processor: Arc<dyn PaymentProcessor>,
    pub return_urls: ReturnUrls,
    pub poll: PollSettings,
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/payments", post(handlers::payments::create_payment))
        .route("/payments/complete", get(handlers::payments::complete_payment))
        .route("/payments/:id/refunds", post(handlers::payments::refund_payment))
        .route("/webhooks/postfinance", post(handlers::webhook::postfinance_webhook))
        .route("/transactions/:id", get(handlers::transactions::get_transaction))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(from_fn(middleware::request_logger_middleware)),
        )
        .with_state(state)
}
