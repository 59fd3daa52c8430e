//! Wire models for the PostFinance Checkout REST API.

use std::fmt;

use bigdecimal::BigDecimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

const AMOUNT_SCALE: i64 = 2;

/// Transaction states as reported by the processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionState {
    Create,
    Pending,
    Confirmed,
    Processing,
    Failed,
    Authorized,
    Voided,
    Completed,
    Fulfill,
    Decline,
    #[serde(other)]
    Unknown,
}

impl TransactionState {
    /// States the processor's asynchronous risk checks can still turn into a
    /// decline. The buyer's return waits on these for a bounded time.
    pub fn may_still_decline(&self) -> bool {
        matches!(self, TransactionState::Authorized | TransactionState::Fulfill)
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransactionState::Create => "CREATE",
            TransactionState::Pending => "PENDING",
            TransactionState::Confirmed => "CONFIRMED",
            TransactionState::Processing => "PROCESSING",
            TransactionState::Failed => "FAILED",
            TransactionState::Authorized => "AUTHORIZED",
            TransactionState::Voided => "VOIDED",
            TransactionState::Completed => "COMPLETED",
            TransactionState::Fulfill => "FULFILL",
            TransactionState::Decline => "DECLINE",
            TransactionState::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RefundState {
    Scheduled,
    Pending,
    ManualCheck,
    Failed,
    Successful,
    #[serde(other)]
    Unknown,
}

impl fmt::Display for RefundState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RefundState::Scheduled => "SCHEDULED",
            RefundState::Pending => "PENDING",
            RefundState::ManualCheck => "MANUAL_CHECK",
            RefundState::Failed => "FAILED",
            RefundState::Successful => "SUCCESSFUL",
            RefundState::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LineItemType {
    Product,
    Shipping,
    Discount,
    Fee,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RefundType {
    MerchantInitiatedOnline,
    MerchantInitiatedOffline,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItemCreate {
    pub name: String,
    pub unique_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,
    pub quantity: u32,
    #[serde(serialize_with = "amount_as_number")]
    pub amount_including_tax: BigDecimal,
    #[serde(rename = "type")]
    pub item_type: LineItemType,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionCreate {
    pub currency: String,
    pub line_items: Vec<LineItemCreate>,
    pub auto_confirmation_enabled: bool,
    pub success_url: String,
    pub failed_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merchant_reference: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundCreate {
    #[serde(serialize_with = "amount_as_number")]
    pub amount: BigDecimal,
    pub transaction: i64,
    pub external_id: String,
    pub merchant_reference: String,
    #[serde(rename = "type")]
    pub refund_type: RefundType,
}

/// Processor-side transaction, trimmed to what reconciliation reads.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RemoteTransaction {
    #[serde(deserialize_with = "id_as_string")]
    pub id: String,
    pub state: TransactionState,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RemoteRefund {
    #[serde(deserialize_with = "id_as_string")]
    pub id: String,
    pub state: RefundState,
}

/// Amounts go out as JSON numbers rounded to two decimals. Parsing the decimal
/// string yields the nearest double, so `19.99` is sent as `19.99`.
fn amount_as_number<S: Serializer>(amount: &BigDecimal, serializer: S) -> Result<S::Ok, S::Error> {
    let value = amount
        .round(AMOUNT_SCALE)
        .to_string()
        .parse::<f64>()
        .map_err(|e| serde::ser::Error::custom(format!("amount {} is not a number: {}", amount, e)))?;
    serializer.serialize_f64(value)
}

/// The processor sends numeric ids; webhooks relayed by proxies sometimes
/// stringify them. Both end up as the local reference string.
pub fn id_as_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Number(i64),
        Text(String),
    }

    match Id::deserialize(deserializer)? {
        Id::Number(n) => Ok(n.to_string()),
        Id::Text(s) => Ok(s),
    }
}
