mod common;

use common::pending_payment;
use kpay_backend::database::memory::InMemoryStore;
use kpay_backend::database::repository::PaymentStore;
use kpay_backend::payments::factory::AggregatorFactory;
use kpay_backend::payments::provider::PaymentAggregator;
use kpay_backend::payments::providers::espay::types::signature;
use kpay_backend::payments::providers::{
    EspayClient, EspayConfig, MidtransClient, MidtransConfig, SenangpayClient, SenangpayConfig,
};
use kpay_backend::payments::types::{AggregatorName, PaymentStatus};
use kpay_backend::payments::utils::{hmac_sha256_hex, sha512_hex};
use kpay_backend::services::notification::NotificationService;
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;

const ESPAY_KEY: &str = "espay-secret";
const MIDTRANS_KEY: &str = "SB-Mid-server-test";
const SENANGPAY_SECRET: &str = "senang-secret";

fn setup() -> (Arc<InMemoryStore>, NotificationService) {
    let espay = EspayClient::new(EspayConfig {
        comm_code: "SGWKPAY".to_string(),
        signature_key: ESPAY_KEY.to_string(),
        ..EspayConfig::default()
    })
    .expect("espay client");
    let midtrans = MidtransClient::new(MidtransConfig {
        server_key: MIDTRANS_KEY.to_string(),
        ..MidtransConfig::default()
    })
    .expect("midtrans client");
    let senangpay = SenangpayClient::new(SenangpayConfig {
        merchant_id: "512345678".to_string(),
        secret_key: SENANGPAY_SECRET.to_string(),
        ..SenangpayConfig::default()
    })
    .expect("senangpay client");

    let aggregators: Vec<Arc<dyn PaymentAggregator>> =
        vec![Arc::new(espay), Arc::new(midtrans), Arc::new(senangpay)];
    let store = Arc::new(InMemoryStore::new());
    let service = NotificationService::new(AggregatorFactory::with_aggregators(aggregators), store.clone());
    (store, service)
}

fn espay_report(order_id: &str, tx_status: &str) -> Vec<u8> {
    let rq_datetime = "2026-10-16 11:00:00";
    let body = json!({
        "rq_uuid": "7d5e3a61-0000-4000-8000-000000000009",
        "rq_datetime": rq_datetime,
        "order_id": order_id,
        "signature": signature(ESPAY_KEY, &[rq_datetime, order_id, "PAYMENTREPORT"]),
        "comm_code": "SGWKPAY",
        "amount": "10000.00",
        "ccy": "IDR",
        "payment_ref": "ESP-REF-1",
        "tx_status": tx_status
    });
    serde_json::to_vec(&body).expect("serialize")
}

fn midtrans_notification(order_id: &str, transaction_status: &str) -> Vec<u8> {
    let signature = sha512_hex(&format!("{}{}{}{}", order_id, "200", "10000.00", MIDTRANS_KEY));
    let body = json!({
        "order_id": order_id,
        "status_code": "200",
        "gross_amount": "10000.00",
        "signature_key": signature,
        "transaction_status": transaction_status,
        "transaction_id": "9aed5972-5b6a-401e-894b-a32c91ed1a3a",
        "payment_type": "bank_transfer"
    });
    serde_json::to_vec(&body).expect("serialize")
}

#[tokio::test]
async fn test_espay_success_is_applied_once() {
    let (store, service) = setup();
    store
        .insert_payment(&pending_payment("ORD-2001", AggregatorName::Espay))
        .await
        .expect("save");

    let ack = service
        .handle_notification(AggregatorName::Espay, &espay_report("ORD-2001", "S"))
        .await
        .expect("ack");
    assert_eq!(ack.content_type, "application/json");
    let parsed: JsonValue = serde_json::from_str(&ack.body).expect("ack is json");
    assert_eq!(parsed["error_code"], "0000");
    assert_eq!(parsed["rq_uuid"], "7d5e3a61-0000-4000-8000-000000000009");

    let stored = store.load_payment("ORD-2001").await.expect("stored");
    assert_eq!(stored.status, PaymentStatus::Success);
    assert_eq!(stored.gateway_transaction_id.as_deref(), Some("ESP-REF-1"));
    assert!(stored.paid_at.is_some());

    // A late failure report must not undo the settlement.
    service
        .handle_notification(AggregatorName::Espay, &espay_report("ORD-2001", "F"))
        .await
        .expect("ack");
    let stored = store.load_payment("ORD-2001").await.expect("stored");
    assert_eq!(stored.status, PaymentStatus::Success);
}

#[tokio::test]
async fn test_espay_bad_signature_is_acknowledged_without_change() {
    let (store, service) = setup();
    store
        .insert_payment(&pending_payment("ORD-2002", AggregatorName::Espay))
        .await
        .expect("save");

    let mut body: JsonValue =
        serde_json::from_slice(&espay_report("ORD-2002", "S")).expect("json");
    body["signature"] = json!("deadbeef");
    let ack = service
        .handle_notification(
            AggregatorName::Espay,
            &serde_json::to_vec(&body).expect("serialize"),
        )
        .await
        .expect("rejected payloads are still acknowledged");
    assert_eq!(ack.content_type, "application/json");

    let stored = store.load_payment("ORD-2002").await.expect("stored");
    assert_eq!(stored.status, PaymentStatus::Pending);
}

#[tokio::test]
async fn test_midtrans_settlement_marks_success() {
    let (store, service) = setup();
    store
        .insert_payment(&pending_payment("ORD-2003", AggregatorName::Midtrans))
        .await
        .expect("save");

    let ack = service
        .handle_notification(
            AggregatorName::Midtrans,
            &midtrans_notification("ORD-2003", "settlement"),
        )
        .await
        .expect("ack");
    let parsed: JsonValue = serde_json::from_str(&ack.body).expect("ack is json");
    assert_eq!(parsed["status"], "ok");

    let stored = store.load_payment("ORD-2003").await.expect("stored");
    assert_eq!(stored.status, PaymentStatus::Success);
}

#[tokio::test]
async fn test_midtrans_authorize_does_not_mutate() {
    let (store, service) = setup();
    store
        .insert_payment(&pending_payment("ORD-2004", AggregatorName::Midtrans))
        .await
        .expect("save");

    service
        .handle_notification(
            AggregatorName::Midtrans,
            &midtrans_notification("ORD-2004", "authorize"),
        )
        .await
        .expect("ack");

    let stored = store.load_payment("ORD-2004").await.expect("stored");
    assert_eq!(stored.status, PaymentStatus::Pending);
}

#[tokio::test]
async fn test_midtrans_expire_is_applied() {
    let (store, service) = setup();
    store
        .insert_payment(&pending_payment("ORD-2005", AggregatorName::Midtrans))
        .await
        .expect("save");

    service
        .handle_notification(
            AggregatorName::Midtrans,
            &midtrans_notification("ORD-2005", "expire"),
        )
        .await
        .expect("ack");

    let stored = store.load_payment("ORD-2005").await.expect("stored");
    assert_eq!(stored.status, PaymentStatus::Expired);
    assert!(stored.paid_at.is_none());
}

#[tokio::test]
async fn test_senangpay_callback_is_acknowledged_with_ok() {
    let (store, service) = setup();
    store
        .insert_payment(&pending_payment("ORD-2006", AggregatorName::Senangpay))
        .await
        .expect("save");

    let hash = hmac_sha256_hex(
        SENANGPAY_SECRET,
        &format!("{}{}{}{}{}", SENANGPAY_SECRET, "1", "ORD-2006", "SP-77", "Payment_was_successful"),
    )
    .expect("hash");
    let body = serde_urlencoded::to_string([
        ("status_id", "1"),
        ("order_id", "ORD-2006"),
        ("transaction_id", "SP-77"),
        ("msg", "Payment_was_successful"),
        ("hash", hash.as_str()),
    ])
    .expect("form body");

    let ack = service
        .handle_notification(AggregatorName::Senangpay, body.as_bytes())
        .await
        .expect("ack");
    assert_eq!(ack.body, "OK");
    assert!(ack.content_type.starts_with("text/plain"));

    let stored = store.load_payment("ORD-2006").await.expect("stored");
    assert_eq!(stored.status, PaymentStatus::Success);
    assert_eq!(stored.gateway_transaction_id.as_deref(), Some("SP-77"));
}

#[tokio::test]
async fn test_notification_for_unknown_order_is_still_acknowledged() {
    let (_store, service) = setup();
    let ack = service
        .handle_notification(AggregatorName::Espay, &espay_report("ORD-MISSING", "S"))
        .await
        .expect("ack");
    let parsed: JsonValue = serde_json::from_str(&ack.body).expect("ack is json");
    assert_eq!(parsed["order_id"], "ORD-MISSING");
}
