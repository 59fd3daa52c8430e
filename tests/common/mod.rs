#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use url::Url;

use postfinance_gateway::adapters::InMemoryTransactionStore;
use postfinance_gateway::domain::{LocalTransaction, TransactionKind, TransactionStatus};
use postfinance_gateway::postfinance::models::{
    RefundCreate, RefundState, RemoteRefund, RemoteTransaction, TransactionCreate, TransactionState,
};
use postfinance_gateway::postfinance::ProcessorError;
use postfinance_gateway::ports::{
    PaymentProcessor, RefundReservation, StoreError, StoreResult, TransactionStore, TransitionOutcome,
};
use postfinance_gateway::services::{PollSettings, ReturnUrls};
use postfinance_gateway::AppState;

/// Processor double that replays scripted states. Each read consumes one state
/// until only the last remains, which then repeats.
pub struct ScriptedProcessor {
    transactions: Mutex<HashMap<String, VecDeque<TransactionState>>>,
    refunds: Mutex<HashMap<String, VecDeque<RefundState>>>,
    next_id: AtomicU64,
    refund_state_on_create: Mutex<RefundState>,
    fail_create: AtomicBool,
    fail_refund: AtomicBool,
    refund_latency: Mutex<Option<Duration>>,
    pub created: Mutex<Vec<TransactionCreate>>,
    pub refund_requests: Mutex<Vec<RefundCreate>>,
    pub transaction_reads: AtomicUsize,
    pub refund_reads: AtomicUsize,
}

impl Default for ScriptedProcessor {
    fn default() -> Self {
        Self {
            transactions: Mutex::new(HashMap::new()),
            refunds: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(5000),
            refund_state_on_create: Mutex::new(RefundState::Pending),
            fail_create: AtomicBool::new(false),
            fail_refund: AtomicBool::new(false),
            refund_latency: Mutex::new(None),
            created: Mutex::new(Vec::new()),
            refund_requests: Mutex::new(Vec::new()),
            transaction_reads: AtomicUsize::new(0),
            refund_reads: AtomicUsize::new(0),
        }
    }
}

impl ScriptedProcessor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script_transaction(&self, id: &str, states: &[TransactionState]) {
        self.transactions
            .lock()
            .unwrap()
            .insert(id.to_string(), states.iter().copied().collect());
    }

    pub fn script_refund(&self, id: &str, states: &[RefundState]) {
        self.refunds
            .lock()
            .unwrap()
            .insert(id.to_string(), states.iter().copied().collect());
    }

    pub fn refunds_settle_immediately_as(&self, state: RefundState) {
        *self.refund_state_on_create.lock().unwrap() = state;
    }

    pub fn fail_creates(&self) {
        self.fail_create.store(true, Ordering::SeqCst);
    }

    pub fn fail_refunds(&self) {
        self.fail_refund.store(true, Ordering::SeqCst);
    }

    /// Makes `create_refund` yield for `latency` before answering.
    pub fn slow_refunds(&self, latency: Duration) {
        *self.refund_latency.lock().unwrap() = Some(latency);
    }

    pub fn reads(&self) -> usize {
        self.transaction_reads.load(Ordering::SeqCst)
    }

    fn next_id(&self) -> String {
        self.next_id.fetch_add(1, Ordering::SeqCst).to_string()
    }
}

fn advance<T: Copy>(queue: &mut VecDeque<T>) -> Option<T> {
    if queue.len() > 1 {
        queue.pop_front()
    } else {
        queue.front().copied()
    }
}

#[async_trait]
impl PaymentProcessor for ScriptedProcessor {
    async fn create_transaction(
        &self,
        request: &TransactionCreate,
    ) -> Result<RemoteTransaction, ProcessorError> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(ProcessorError::Api {
                status: 503,
                message: "maintenance".to_string(),
            });
        }
        self.created.lock().unwrap().push(request.clone());
        let id = self.next_id();
        self.script_transaction(&id, &[TransactionState::Pending]);
        Ok(RemoteTransaction {
            id,
            state: TransactionState::Pending,
        })
    }

    async fn payment_page_url(&self, transaction_id: &str) -> Result<String, ProcessorError> {
        Ok(format!(
            "https://checkout.postfinance.ch/s/405/payment/transaction/pay/{}",
            transaction_id
        ))
    }

    async fn read_transaction(
        &self,
        transaction_id: &str,
    ) -> Result<RemoteTransaction, ProcessorError> {
        self.transaction_reads.fetch_add(1, Ordering::SeqCst);
        let mut scripts = self.transactions.lock().unwrap();
        let state = scripts
            .get_mut(transaction_id)
            .and_then(advance)
            .ok_or_else(|| ProcessorError::NotFound(transaction_id.to_string()))?;
        Ok(RemoteTransaction {
            id: transaction_id.to_string(),
            state,
        })
    }

    async fn create_refund(&self, request: &RefundCreate) -> Result<RemoteRefund, ProcessorError> {
        let latency = *self.refund_latency.lock().unwrap();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if self.fail_refund.load(Ordering::SeqCst) {
            return Err(ProcessorError::Api {
                status: 442,
                message: "refund rejected".to_string(),
            });
        }
        self.refund_requests.lock().unwrap().push(request.clone());
        let id = self.next_id();
        let state = *self.refund_state_on_create.lock().unwrap();
        self.script_refund(&id, &[state]);
        Ok(RemoteRefund { id, state })
    }

    async fn read_refund(&self, refund_id: &str) -> Result<RemoteRefund, ProcessorError> {
        self.refund_reads.fetch_add(1, Ordering::SeqCst);
        let mut scripts = self.refunds.lock().unwrap();
        let state = scripts
            .get_mut(refund_id)
            .and_then(advance)
            .ok_or_else(|| ProcessorError::NotFound(refund_id.to_string()))?;
        Ok(RemoteRefund {
            id: refund_id.to_string(),
            state,
        })
    }
}

/// In-memory store whose `update_reference` always fails.
#[derive(Default)]
pub struct ReferenceWriteFails {
    pub inner: InMemoryTransactionStore,
}

#[async_trait]
impl TransactionStore for ReferenceWriteFails {
    async fn insert(&self, tx: &LocalTransaction) -> StoreResult<LocalTransaction> {
        self.inner.insert(tx).await
    }

    async fn get(&self, id: uuid::Uuid) -> StoreResult<LocalTransaction> {
        self.inner.get(id).await
    }

    async fn update_reference(&self, _id: uuid::Uuid, _reference: &str) -> StoreResult<()> {
        Err(StoreError::Database(sqlx::Error::PoolTimedOut))
    }

    async fn find_processing_by_reference(
        &self,
        kind: TransactionKind,
        reference: &str,
    ) -> StoreResult<Option<LocalTransaction>> {
        self.inner.find_processing_by_reference(kind, reference).await
    }

    async fn children(&self, parent_id: uuid::Uuid) -> StoreResult<Vec<LocalTransaction>> {
        self.inner.children(parent_id).await
    }

    async fn record_transition(
        &self,
        parent: &LocalTransaction,
        child: &LocalTransaction,
    ) -> StoreResult<TransitionOutcome> {
        self.inner.record_transition(parent, child).await
    }

    async fn reserve_refund(
        &self,
        purchase: &LocalTransaction,
        refund: &LocalTransaction,
    ) -> StoreResult<RefundReservation> {
        self.inner.reserve_refund(purchase, refund).await
    }
}

pub fn return_urls() -> ReturnUrls {
    ReturnUrls {
        public_base_url: Url::parse("https://shop.test/gateway/").unwrap(),
        default_failed_url: Url::parse("https://shop.test/cancel").unwrap(),
    }
}

pub fn app_state(store: Arc<dyn TransactionStore>, processor: Arc<ScriptedProcessor>) -> AppState {
    AppState {
        store,
        processor,
        return_urls: return_urls(),
        poll: PollSettings {
            interval: Duration::from_millis(10),
            ceiling: Duration::from_millis(50),
        },
    }
}

/// A root purchase already submitted to the processor under `reference`.
pub async fn processing_purchase(
    store: &InMemoryTransactionStore,
    reference: &str,
    amount: &str,
) -> LocalTransaction {
    let mut tx = LocalTransaction::new_purchase(
        "order-1001".to_string(),
        amount.parse::<BigDecimal>().unwrap(),
        "CHF".to_string(),
    );
    tx.reference = Some(reference.to_string());
    store.insert(&tx).await.unwrap()
}

/// A purchase whose webhook already recorded a successful settlement.
pub async fn settled_purchase(
    store: &InMemoryTransactionStore,
    reference: &str,
    amount: &str,
) -> LocalTransaction {
    let purchase = processing_purchase(store, reference, amount).await;
    let mut child = purchase.create_child();
    child.status = Some(TransactionStatus::Success);
    child.message = Some("FULFILL".to_string());
    store.record_transition(&purchase, &child).await.unwrap();
    purchase
}
