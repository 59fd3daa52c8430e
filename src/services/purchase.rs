use std::sync::Arc;

use bigdecimal::{BigDecimal, Zero};
use serde::Deserialize;
use url::Url;

use crate::domain::{GatewayResponse, LocalTransaction};
use crate::postfinance::models::{LineItemCreate, LineItemType, TransactionCreate};
use crate::postfinance::ProcessorError;
use crate::ports::PaymentProcessor;

/// One line of the order being paid.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderLine {
    pub description: String,
    pub sku: Option<String>,
    pub quantity: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PurchaseOrder {
    pub order_id: String,
    pub amount: BigDecimal,
    pub currency: String,
    pub lines: Vec<OrderLine>,
    /// Where the processor sends the buyer after a failed payment.
    pub cancel_url: Option<String>,
}

/// Where the buyer returns to after the payment page.
#[derive(Debug, Clone)]
pub struct ReturnUrls {
    pub public_base_url: Url,
    pub default_failed_url: Url,
}

impl ReturnUrls {
    /// `/payments/complete` carrying the local id and hash for the lookup on return.
    pub fn success_url(&self, tx: &LocalTransaction) -> Result<Url, url::ParseError> {
        let mut url = self.public_base_url.join("payments/complete")?;
        url.query_pairs_mut()
            .append_pair("transaction_id", &tx.id.to_string())
            .append_pair("hash", &tx.hash);
        Ok(url)
    }
}

/// Creates the remote transaction and hands back the payment page to redirect to.
#[derive(Clone)]
pub struct PurchaseInitiator {
    processor: Arc<dyn PaymentProcessor>,
    urls: ReturnUrls,
}

impl PurchaseInitiator {
    pub fn new(processor: Arc<dyn PaymentProcessor>, urls: ReturnUrls) -> Self {
        Self { processor, urls }
    }

    /// Validation problems come back as an unsuccessful response so the order
    /// flow can render them; only remote failures are errors.
    pub async fn initiate(
        &self,
        tx: &LocalTransaction,
        order: &PurchaseOrder,
    ) -> Result<GatewayResponse, ProcessorError> {
        let line_item = match summary_line_item(tx, order) {
            Ok(item) => item,
            Err(message) => {
                tracing::info!(transaction_id = %tx.id, "Purchase rejected: {}", message);
                return Ok(GatewayResponse::failed(message));
            }
        };

        let success_url = match self.urls.success_url(tx) {
            Ok(url) => url,
            Err(e) => return Ok(GatewayResponse::failed(format!("Cannot build return URL: {}", e))),
        };
        let failed_url = order
            .cancel_url
            .clone()
            .unwrap_or_else(|| self.urls.default_failed_url.to_string());

        let request = TransactionCreate {
            currency: tx.currency.clone(),
            line_items: vec![line_item],
            auto_confirmation_enabled: true,
            success_url: success_url.to_string(),
            failed_url,
            merchant_reference: Some(order.order_id.clone()),
        };

        let created = self.processor.create_transaction(&request).await?;
        let redirect_url = self.processor.payment_page_url(&created.id).await?;

        tracing::info!(
            transaction_id = %tx.id,
            reference = %created.id,
            "Remote transaction created"
        );

        Ok(GatewayResponse::redirect(created.id, created.state, redirect_url))
    }
}

/// The processor receives one summary line carrying the full amount.
fn summary_line_item(tx: &LocalTransaction, order: &PurchaseOrder) -> Result<LineItemCreate, String> {
    let first = order
        .lines
        .first()
        .ok_or_else(|| "Order has no line items".to_string())?;

    if first.description.trim().is_empty() {
        return Err("Line item description must not be empty".to_string());
    }
    if first.quantity == 0 {
        return Err(format!("Line item '{}' has a quantity of zero", first.description));
    }
    if !is_currency_code(&tx.currency) {
        return Err(format!("Currency '{}' is not a three-letter ISO 4217 code", tx.currency));
    }
    if tx.amount <= BigDecimal::zero() {
        return Err(format!("Payment amount must be positive, got {}", tx.amount));
    }

    Ok(LineItemCreate {
        name: first.description.clone(),
        unique_id: tx.hash.clone(),
        sku: first.sku.clone(),
        quantity: first.quantity,
        amount_including_tax: tx.amount.clone(),
        item_type: LineItemType::Product,
    })
}

fn is_currency_code(currency: &str) -> bool {
    currency.len() == 3 && currency.bytes().all(|b| b.is_ascii_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(lines: Vec<OrderLine>) -> PurchaseOrder {
        PurchaseOrder {
            order_id: "order-7".to_string(),
            amount: "19.90".parse().unwrap(),
            currency: "CHF".to_string(),
            lines,
            cancel_url: None,
        }
    }

    fn line(description: &str, quantity: u32) -> OrderLine {
        OrderLine {
            description: description.to_string(),
            sku: Some("SKU-1".to_string()),
            quantity,
        }
    }

    #[test]
    fn test_summary_line_uses_first_line_and_full_amount() {
        let order = order(vec![line("Tea", 3), line("Mug", 1)]);
        let tx = LocalTransaction::new_purchase(order.order_id.clone(), order.amount.clone(), "CHF".into());

        let item = summary_line_item(&tx, &order).unwrap();

        assert_eq!(item.name, "Tea");
        assert_eq!(item.quantity, 3);
        assert_eq!(item.unique_id, tx.hash);
        assert_eq!(item.amount_including_tax, tx.amount);
    }

    #[test]
    fn test_summary_line_rejects_bad_lines() {
        let tx = LocalTransaction::new_purchase("o".into(), BigDecimal::from(5), "CHF".into());

        assert!(summary_line_item(&tx, &order(vec![])).is_err());
        assert!(summary_line_item(&tx, &order(vec![line("  ", 1)])).is_err());
        assert!(summary_line_item(&tx, &order(vec![line("Tea", 0)])).is_err());

        let free = LocalTransaction::new_purchase("o".into(), BigDecimal::zero(), "CHF".into());
        assert!(summary_line_item(&free, &order(vec![line("Tea", 1)])).is_err());
    }

    #[test]
    fn test_summary_line_rejects_malformed_currency() {
        let order = order(vec![line("Tea", 1)]);
        for currency in ["EURO", "chf", "", "C1F"] {
            let tx = LocalTransaction::new_purchase("o".into(), BigDecimal::from(5), currency.into());
            let err = summary_line_item(&tx, &order).unwrap_err();
            assert!(err.contains("Currency"), "{}", currency);
        }
    }

    #[test]
    fn test_success_url_carries_id_and_hash() {
        let urls = ReturnUrls {
            public_base_url: Url::parse("https://shop.test/gateway/").unwrap(),
            default_failed_url: Url::parse("https://shop.test/cancel").unwrap(),
        };
        let tx = LocalTransaction::new_purchase("o".into(), BigDecimal::from(5), "CHF".into());

        let url = urls.success_url(&tx).unwrap();
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();

        assert_eq!(url.path(), "/gateway/payments/complete");
        assert!(pairs.contains(&("transaction_id".to_string(), tx.id.to_string())));
        assert!(pairs.contains(&("hash".to_string(), tx.hash.clone())));
    }
}
