mod common;

use bigdecimal::BigDecimal;
use common::{return_urls, ScriptedProcessor};
use postfinance_gateway::domain::LocalTransaction;
use postfinance_gateway::postfinance::ProcessorError;
use postfinance_gateway::services::{OrderLine, PurchaseInitiator, PurchaseOrder};

fn order(lines: Vec<OrderLine>) -> PurchaseOrder {
    PurchaseOrder {
        order_id: "order-1001".to_string(),
        amount: "49.90".parse().unwrap(),
        currency: "CHF".to_string(),
        lines,
        cancel_url: Some("https://shop.test/orders/1001/cancel".to_string()),
    }
}

fn tea() -> OrderLine {
    OrderLine {
        description: "Sencha tea 250g".to_string(),
        sku: Some("TEA-250".to_string()),
        quantity: 2,
    }
}

fn transaction_for(order: &PurchaseOrder) -> LocalTransaction {
    LocalTransaction::new_purchase(order.order_id.clone(), order.amount.clone(), order.currency.clone())
}

#[tokio::test]
async fn test_valid_purchase_redirects_to_payment_page() {
    let processor = ScriptedProcessor::new();
    let initiator = PurchaseInitiator::new(processor.clone(), return_urls());
    let order = order(vec![tea()]);
    let tx = transaction_for(&order);

    let response = initiator.initiate(&tx, &order).await.unwrap();

    assert!(response.is_redirect());
    assert!(!response.is_processing());
    assert!(!response.is_successful());
    assert_eq!(response.transaction_reference(), "5000");
    assert!(response.redirect_url.as_deref().unwrap().ends_with("/pay/5000"));

    let created = processor.created.lock().unwrap();
    assert_eq!(created.len(), 1);
    let request = &created[0];
    assert_eq!(request.currency, "CHF");
    assert!(request.auto_confirmation_enabled);
    assert_eq!(request.failed_url, "https://shop.test/orders/1001/cancel");
    assert_eq!(request.merchant_reference.as_deref(), Some("order-1001"));
    assert!(request.success_url.contains(&format!("transaction_id={}", tx.id)));
    assert!(request.success_url.contains(&format!("hash={}", tx.hash)));
    assert_eq!(request.line_items.len(), 1);
    assert_eq!(request.line_items[0].unique_id, tx.hash);
    assert_eq!(request.line_items[0].amount_including_tax, tx.amount);
}

#[tokio::test]
async fn test_missing_cancel_url_falls_back_to_default() {
    let processor = ScriptedProcessor::new();
    let initiator = PurchaseInitiator::new(processor.clone(), return_urls());
    let mut order = order(vec![tea()]);
    order.cancel_url = None;
    let tx = transaction_for(&order);

    initiator.initiate(&tx, &order).await.unwrap();

    assert_eq!(processor.created.lock().unwrap()[0].failed_url, "https://shop.test/cancel");
}

#[tokio::test]
async fn test_invalid_line_items_are_reported_not_raised() {
    let processor = ScriptedProcessor::new();
    let initiator = PurchaseInitiator::new(processor.clone(), return_urls());

    let empty_name = OrderLine {
        description: String::new(),
        ..tea()
    };
    let zero_quantity = OrderLine { quantity: 0, ..tea() };

    for lines in [vec![], vec![empty_name], vec![zero_quantity]] {
        let order = order(lines);
        let tx = transaction_for(&order);

        let response = initiator.initiate(&tx, &order).await.unwrap();

        assert!(!response.is_redirect());
        assert!(!response.is_successful());
        assert!(!response.message().is_empty());
    }

    assert!(processor.created.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_non_positive_amount_is_reported() {
    let processor = ScriptedProcessor::new();
    let initiator = PurchaseInitiator::new(processor.clone(), return_urls());
    let order = order(vec![tea()]);
    let tx = LocalTransaction::new_purchase(order.order_id.clone(), BigDecimal::from(0), "CHF".into());

    let response = initiator.initiate(&tx, &order).await.unwrap();

    assert!(!response.is_redirect());
    assert!(response.message().contains("positive"));
}

#[tokio::test]
async fn test_remote_failure_propagates() {
    let processor = ScriptedProcessor::new();
    processor.fail_creates();
    let initiator = PurchaseInitiator::new(processor.clone(), return_urls());
    let order = order(vec![tea()]);
    let tx = transaction_for(&order);

    let result = initiator.initiate(&tx, &order).await;

    assert!(matches!(result, Err(ProcessorError::Api { status: 503, .. })));
}

#[tokio::test]
async fn test_malformed_currency_is_reported() {
    let processor = ScriptedProcessor::new();
    let initiator = PurchaseInitiator::new(processor.clone(), return_urls());
    let mut order = order(vec![tea()]);
    order.currency = "EURO".to_string();
    let tx = transaction_for(&order);

    let response = initiator.initiate(&tx, &order).await.unwrap();

    assert!(!response.is_redirect());
    assert!(response.message().contains("EURO"));
    assert!(processor.created.lock().unwrap().is_empty());
}
