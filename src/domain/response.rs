//! Outcome of a gateway operation as seen by the order flow.

use serde::Serialize;

use crate::postfinance::models::{RefundState, TransactionState};

/// Last remote state a response observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "entity", content = "state", rename_all = "lowercase")]
pub enum ResponseState {
    Transaction(TransactionState),
    Refund(RefundState),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GatewayResponse {
    pub reference: Option<String>,
    pub state: Option<ResponseState>,
    pub redirect_url: Option<String>,
    pub processing: bool,
    pub message: Option<String>,
    pub code: Option<String>,
}

impl GatewayResponse {
    /// A just-created remote transaction waiting for the buyer on the payment page.
    pub fn redirect(reference: String, state: TransactionState, redirect_url: String) -> Self {
        Self {
            reference: Some(reference),
            state: Some(ResponseState::Transaction(state)),
            redirect_url: Some(redirect_url),
            processing: false,
            ..Self::default()
        }
    }

    /// An observation whose terminal outcome is left to the webhook.
    pub fn processing(reference: String, state: ResponseState) -> Self {
        Self {
            reference: Some(reference),
            state: Some(state),
            processing: true,
            ..Self::default()
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::default()
        }
    }

    /// True only once the processor reports the money as settled.
    pub fn is_successful(&self) -> bool {
        matches!(
            self.state,
            Some(ResponseState::Transaction(TransactionState::Fulfill))
                | Some(ResponseState::Refund(RefundState::Successful))
        )
    }

    pub fn is_processing(&self) -> bool {
        self.processing
    }

    pub fn is_redirect(&self) -> bool {
        self.redirect_url.as_deref().map_or(false, |url| !url.is_empty())
    }

    pub fn transaction_reference(&self) -> &str {
        self.reference.as_deref().unwrap_or_default()
    }

    pub fn message(&self) -> &str {
        self.message.as_deref().unwrap_or_default()
    }
}
