use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep, Instant};

use crate::domain::{GatewayResponse, LocalTransaction, ResponseState};
use crate::postfinance::ProcessorError;
use crate::ports::PaymentProcessor;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_POLL_CEILING: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy)]
pub struct PollSettings {
    pub interval: Duration,
    pub ceiling: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            ceiling: DEFAULT_POLL_CEILING,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    #[error("Transaction {0} has no remote reference")]
    MissingReference(uuid::Uuid),
    #[error(transparent)]
    Processor(#[from] ProcessorError),
}

/// Handles the buyer's return from the payment page.
#[derive(Clone)]
pub struct CompletionReconciler {
    processor: Arc<dyn PaymentProcessor>,
    poll: PollSettings,
}

impl CompletionReconciler {
    pub fn new(processor: Arc<dyn PaymentProcessor>, poll: PollSettings) -> Self {
        Self { processor, poll }
    }

    /// Reads the remote transaction and, while it is Authorized or Fulfill,
    /// keeps re-reading until it moves on or the ceiling passes.
    ///
    /// The response is always `processing`: only the webhook records a terminal
    /// status. Dropping the returned future abandons the wait.
    pub async fn complete(&self, tx: &LocalTransaction) -> Result<GatewayResponse, CompletionError> {
        let reference = tx
            .reference
            .as_deref()
            .ok_or(CompletionError::MissingReference(tx.id))?;

        let started = Instant::now();
        let mut remote = self.processor.read_transaction(reference).await?;
        let mut polls = 0u32;

        while remote.state.may_still_decline() && started.elapsed() <= self.poll.ceiling {
            sleep(self.poll.interval).await;
            remote = self.processor.read_transaction(reference).await?;
            polls += 1;
        }

        if remote.state.may_still_decline() {
            tracing::info!(
                transaction_id = %tx.id,
                reference = %remote.id,
                state = %remote.state,
                polls,
                "Remote transaction unchanged after poll ceiling"
            );
        } else {
            tracing::debug!(
                transaction_id = %tx.id,
                reference = %remote.id,
                state = %remote.state,
                polls,
                "Remote transaction observed"
            );
        }

        Ok(GatewayResponse::processing(
            remote.id,
            ResponseState::Transaction(remote.state),
        ))
    }
}

