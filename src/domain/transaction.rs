//! Local transaction domain entity.
//! Framework-agnostic record of one payment attempt or one status transition.

use std::fmt;
use std::str::FromStr;

use bigdecimal::{BigDecimal, Zero};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Purchase,
    Refund,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Purchase => "purchase",
            TransactionKind::Refund => "refund",
        }
    }
}

impl FromStr for TransactionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "purchase" => Ok(TransactionKind::Purchase),
            "refund" => Ok(TransactionKind::Refund),
            other => Err(format!("unknown transaction kind '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Processing,
    Success,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Processing => "processing",
            TransactionStatus::Success => "success",
            TransactionStatus::Failed => "failed",
        }
    }

    /// Success and Failed end reconciliation.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Processing)
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "processing" => Ok(TransactionStatus::Processing),
            "success" => Ok(TransactionStatus::Success),
            "failed" => Ok(TransactionStatus::Failed),
            other => Err(format!("unknown transaction status '{}'", other)),
        }
    }
}

/// Domain entity representing a local transaction.
///
/// Records are append-only: a status change is recorded as a child whose
/// `parent_id` points at the record it resolves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalTransaction {
    pub id: Uuid,
    pub parent_id: Option<Uuid>,
    pub order_id: String,
    pub kind: TransactionKind,
    pub amount: BigDecimal,
    pub currency: String,
    pub hash: String,
    /// Remote processor id, set once the processor has accepted the request.
    pub reference: Option<String>,
    /// `None` on a child whose remote state had no local mapping.
    pub status: Option<TransactionStatus>,
    pub message: Option<String>,
    pub response: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl LocalTransaction {
    /// A new root purchase in status Processing with a fresh correlation hash.
    pub fn new_purchase(order_id: String, amount: BigDecimal, currency: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            parent_id: None,
            order_id,
            kind: TransactionKind::Purchase,
            amount,
            currency,
            hash: new_hash(),
            reference: None,
            status: Some(TransactionStatus::Processing),
            message: None,
            response: None,
            created_at: Utc::now(),
        }
    }

    /// Derives a child of the same order, kind and amount. Status is left unset.
    pub fn create_child(&self) -> Self {
        Self {
            id: Uuid::new_v4(),
            parent_id: Some(self.id),
            order_id: self.order_id.clone(),
            kind: self.kind,
            amount: self.amount.clone(),
            currency: self.currency.clone(),
            hash: self.hash.clone(),
            reference: self.reference.clone(),
            status: None,
            message: None,
            response: None,
            created_at: Utc::now(),
        }
    }

    /// A refund against this purchase, correlated by its own hash.
    pub fn create_refund(&self, amount: BigDecimal) -> Self {
        Self {
            id: Uuid::new_v4(),
            parent_id: Some(self.id),
            order_id: self.order_id.clone(),
            kind: TransactionKind::Refund,
            amount,
            currency: self.currency.clone(),
            hash: new_hash(),
            reference: None,
            status: Some(TransactionStatus::Processing),
            message: None,
            response: None,
            created_at: Utc::now(),
        }
    }

    pub fn is_processing(&self) -> bool {
        self.status == Some(TransactionStatus::Processing)
    }

    /// Status of the terminal child among `children`, falling back to our own.
    pub fn effective_status(&self, children: &[LocalTransaction]) -> Option<TransactionStatus> {
        children
            .iter()
            .filter(|c| c.parent_id == Some(self.id) && c.kind == self.kind)
            .filter_map(|c| c.status)
            .find(TransactionStatus::is_terminal)
            .or(self.status)
    }

    /// Part of this purchase not refunded or awaiting a refund. `rows` must hold
    /// the refunds under this purchase together with their own children.
    pub fn refundable_amount(&self, rows: &[LocalTransaction]) -> BigDecimal {
        let reserved = rows
            .iter()
            .filter(|r| r.parent_id == Some(self.id) && r.kind == TransactionKind::Refund)
            .filter(|r| r.effective_status(rows) != Some(TransactionStatus::Failed))
            .fold(BigDecimal::zero(), |sum, r| sum + &r.amount);
        &self.amount - reserved
    }
}

fn new_hash() -> String {
    Uuid::new_v4().simple().to_string()
}
