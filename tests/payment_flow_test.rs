mod common;

use async_trait::async_trait;
use common::{
    active_wallet, bca_channel, harness, request, wallet_channel, ChargeReply, FakeAggregator,
};
use kpay_backend::database::memory::InMemoryStore;
use kpay_backend::database::repository::{ChannelStore, PaymentStore, TransactionStore};
use kpay_backend::payments::error::{PaymentError, PaymentResult};
use kpay_backend::payments::factory::AggregatorFactory;
use kpay_backend::payments::provider::PaymentAggregator;
use kpay_backend::payments::types::{AggregatorName, PaymentStatus, TransactionRecord};
use kpay_backend::services::kwallet::InMemoryLedger;
use kpay_backend::services::payment_service::{PaymentService, PaymentServiceConfig, PaymentStores};
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

struct BrokenTransactions;

#[async_trait]
impl TransactionStore for BrokenTransactions {
    async fn save_transaction(&self, _record: &TransactionRecord) -> PaymentResult<()> {
        Err(PaymentError::internal("transactions table unavailable"))
    }
}

#[tokio::test]
async fn test_leg_sum_mismatch_is_rejected_before_any_charge() {
    let h = harness(ChargeReply::StatusCode("201"));
    let channel = bca_channel();
    h.store.insert_channel(channel.clone()).await;

    let mut req = request("ORD-1001", Uuid::new_v4(), &[(channel.id, 15000)]);
    req.amount = Decimal::from(20000);

    let err = h.service.create_payment(req).await.expect_err("should reject");
    match err {
        PaymentError::ValidationError { field, .. } => assert_eq!(field.as_deref(), Some("amount")),
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(h.aggregator.charges().is_empty());
    assert!(h.store.payments().await.is_empty());
}

#[tokio::test]
async fn test_single_leg_keeps_order_id_and_adds_fee() {
    let h = harness(ChargeReply::StatusCode("201"));
    let channel = bca_channel();
    h.store.insert_channel(channel.clone()).await;

    let responses = h
        .service
        .create_payment(request("ORD-1002", Uuid::new_v4(), &[(channel.id, 50000)]))
        .await
        .expect("payment should be created");

    assert_eq!(responses.len(), 1);
    let charges = h.aggregator.charges();
    assert_eq!(charges.len(), 1);
    assert_eq!(charges[0].order_id, "ORD-1002");
    assert_eq!(charges[0].amount, Decimal::from(54000));

    let stored = h.store.load_payment("ORD-1002").await.expect("stored");
    assert_eq!(stored.status, PaymentStatus::Pending);
    assert_eq!(stored.fee_amount, Decimal::from(4000));
    assert_eq!(stored.total_amount, Decimal::from(54000));
    assert_eq!(stored.aggregator, Some(AggregatorName::Midtrans));
    assert!(stored.gateway_response.is_some());
}

#[tokio::test]
async fn test_wallet_leg_is_charged_first() {
    let h = harness(ChargeReply::StatusCode("201"));
    let bca = bca_channel();
    let wallet = wallet_channel();
    let customer_id = Uuid::new_v4();
    h.store.insert_channel(bca.clone()).await;
    h.store.insert_channel(wallet.clone()).await;
    h.store.insert_wallet(active_wallet(customer_id)).await;

    let responses = h
        .service
        .create_payment(request(
            "ORD-1003",
            customer_id,
            &[(bca.id, 30000), (wallet.id, 20000)],
        ))
        .await
        .expect("split payment should be created");
    assert_eq!(responses.len(), 2);

    let debits = h.ledger.debits().await;
    assert_eq!(debits.len(), 1);
    assert_eq!(debits[0].reference, "ORD-1003-1");
    assert_eq!(debits[0].amount, Decimal::from(20000));

    let charges = h.aggregator.charges();
    assert_eq!(charges.len(), 1);
    assert_eq!(charges[0].order_id, "ORD-1003-2");

    let first = h.store.load_payment("ORD-1003-1").await.expect("wallet leg");
    assert_eq!(first.status, PaymentStatus::Success);
    assert_eq!(first.aggregator, None);
    assert!(first.paid_at.is_some());

    let second = h.store.load_payment("ORD-1003-2").await.expect("bca leg");
    assert_eq!(second.status, PaymentStatus::Pending);
    assert_eq!(first.transaction_id, second.transaction_id);
}

#[tokio::test]
async fn test_every_leg_gets_a_transaction_record() {
    let h = harness(ChargeReply::StatusCode("201"));
    let bca = bca_channel();
    let wallet = wallet_channel();
    let customer_id = Uuid::new_v4();
    h.store.insert_channel(bca.clone()).await;
    h.store.insert_channel(wallet.clone()).await;
    h.store.insert_wallet(active_wallet(customer_id)).await;

    h.service
        .create_payment(request(
            "ORD-1004",
            customer_id,
            &[(wallet.id, 10000), (bca.id, 10000)],
        ))
        .await
        .expect("split payment should be created");

    let mut records = h.store.transactions().await;
    records.sort_by_key(|r| r.leg_index);
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].leg_index, 1);
    assert_eq!(records[0].order_id, "ORD-1004-1");
    assert_eq!(records[0].status, PaymentStatus::Success);
    assert_eq!(records[1].leg_index, 2);
    assert_eq!(records[1].amount, Decimal::from(14000));
}

#[tokio::test]
async fn test_rejected_charge_fails_payment_and_deactivates_channel() {
    let h = harness(ChargeReply::StatusCode("402"));
    let channel = bca_channel();
    h.store.insert_channel(channel.clone()).await;

    let err = h
        .service
        .create_payment(request("ORD-1005", Uuid::new_v4(), &[(channel.id, 25000)]))
        .await
        .expect_err("non-created charge should fail");
    assert!(matches!(
        err,
        PaymentError::PaymentRequired {
            deactivate_channel: true,
            ..
        }
    ));

    let stored = h.store.load_payment("ORD-1005").await.expect("stored");
    assert_eq!(stored.status, PaymentStatus::Failed);
    let channel = h.store.load_channel(channel.id).await.expect("channel");
    assert!(!channel.is_active);
}

#[tokio::test]
async fn test_unknown_outcome_leaves_payment_pending() {
    let h = harness(ChargeReply::Error(PaymentError::NetworkError {
        message: "read timed out".to_string(),
        outcome_unknown: true,
    }));
    let channel = bca_channel();
    h.store.insert_channel(channel.clone()).await;

    let err = h
        .service
        .create_payment(request("ORD-1006", Uuid::new_v4(), &[(channel.id, 25000)]))
        .await
        .expect_err("timeout should surface");
    assert!(err.is_outcome_unknown());

    let stored = h.store.load_payment("ORD-1006").await.expect("stored");
    assert_eq!(stored.status, PaymentStatus::Pending);
    assert!(h.store.load_channel(channel.id).await.expect("channel").is_active);
}

#[tokio::test]
async fn test_definite_provider_error_fails_payment() {
    let h = harness(ChargeReply::Error(PaymentError::ProviderError {
        provider: "midtrans".to_string(),
        message: "Merchant cannot be identified".to_string(),
        provider_code: Some("401".to_string()),
        retryable: false,
    }));
    let channel = bca_channel();
    h.store.insert_channel(channel.clone()).await;

    let err = h
        .service
        .create_payment(request("ORD-1007", Uuid::new_v4(), &[(channel.id, 25000)]))
        .await
        .expect_err("provider error should surface");
    assert!(matches!(err, PaymentError::ProviderError { .. }));

    let stored = h.store.load_payment("ORD-1007").await.expect("stored");
    assert_eq!(stored.status, PaymentStatus::Failed);
    // Only an explicit deactivation request turns a channel off.
    assert!(h.store.load_channel(channel.id).await.expect("channel").is_active);
}

#[tokio::test]
async fn test_inactive_channel_is_rejected() {
    let h = harness(ChargeReply::StatusCode("201"));
    let mut channel = bca_channel();
    channel.is_active = false;
    h.store.insert_channel(channel.clone()).await;

    let err = h
        .service
        .create_payment(request("ORD-1008", Uuid::new_v4(), &[(channel.id, 25000)]))
        .await
        .expect_err("inactive channel");
    assert!(matches!(err, PaymentError::ValidationError { .. }));
    assert!(h.aggregator.charges().is_empty());
}

#[tokio::test]
async fn test_wallet_leg_without_wallet_is_rejected() {
    let h = harness(ChargeReply::StatusCode("201"));
    let wallet = wallet_channel();
    h.store.insert_channel(wallet.clone()).await;

    let err = h
        .service
        .create_payment(request("ORD-1009", Uuid::new_v4(), &[(wallet.id, 25000)]))
        .await
        .expect_err("no wallet");
    match err {
        PaymentError::ValidationError { field, .. } => assert_eq!(field.as_deref(), Some("wallet")),
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(h.ledger.debits().await.is_empty());
}

#[tokio::test]
async fn test_unknown_channel_is_not_found() {
    let h = harness(ChargeReply::StatusCode("201"));
    let err = h
        .service
        .create_payment(request("ORD-1010", Uuid::new_v4(), &[(Uuid::new_v4(), 25000)]))
        .await
        .expect_err("missing channel");
    assert!(matches!(err, PaymentError::NotFound { .. }));
}

#[tokio::test]
async fn test_status_poll_settles_pending_payment() {
    let h = harness(ChargeReply::StatusCode("201"));
    let channel = bca_channel();
    h.store.insert_channel(channel.clone()).await;
    h.service
        .create_payment(request("ORD-1011", Uuid::new_v4(), &[(channel.id, 25000)]))
        .await
        .expect("created");

    h.aggregator.set_raw_status("settlement");
    let response = h
        .service
        .check_status_payment("ORD-1011")
        .await
        .expect("status");
    assert_eq!(response.status, PaymentStatus::Success);
    assert!(response.paid_at.is_some());

    let stored = h.store.load_payment("ORD-1011").await.expect("stored");
    assert_eq!(stored.status, PaymentStatus::Success);
    assert_eq!(stored.gateway_transaction_id.as_deref(), Some("gw-ORD-1011"));
}

#[tokio::test]
async fn test_terminal_payment_is_answered_from_storage() {
    let h = harness(ChargeReply::StatusCode("201"));
    let mut payment = common::pending_payment("ORD-1012", AggregatorName::Midtrans);
    payment.status = PaymentStatus::Expired;
    h.store.insert_payment(&payment).await.expect("save");

    h.aggregator.set_raw_status("settlement");
    let response = h
        .service
        .check_status_payment("ORD-1012")
        .await
        .expect("status");
    assert_eq!(response.status, PaymentStatus::Expired);
    assert_eq!(
        h.store.load_payment("ORD-1012").await.expect("stored").status,
        PaymentStatus::Expired
    );
}

#[tokio::test]
async fn test_authorize_status_is_an_error_without_mutation() {
    let h = harness(ChargeReply::StatusCode("201"));
    let payment = common::pending_payment("ORD-1013", AggregatorName::Midtrans);
    h.store.insert_payment(&payment).await.expect("save");

    h.aggregator.set_raw_status("authorize");
    let err = h
        .service
        .check_status_payment("ORD-1013")
        .await
        .expect_err("authorize needs manual capture");
    assert!(matches!(err, PaymentError::PaymentRequired { .. }));
    assert_eq!(
        h.store.load_payment("ORD-1013").await.expect("stored").status,
        PaymentStatus::Pending
    );
}

#[tokio::test]
async fn test_payment_response_is_rebuilt_from_storage() {
    let h = harness(ChargeReply::StatusCode("201"));
    let channel = bca_channel();
    h.store.insert_channel(channel.clone()).await;
    h.service
        .create_payment(request("ORD-1014", Uuid::new_v4(), &[(channel.id, 25000)]))
        .await
        .expect("created");

    let response = h
        .service
        .payment_response("ORD-1014")
        .await
        .expect("stored response");
    assert_eq!(response.order_id, "ORD-1014");
    assert_eq!(response.payment_detail.va_number.as_deref(), Some("12345678901"));
}

#[tokio::test]
async fn test_resubmitted_order_is_rejected_before_charging() {
    let h = harness(ChargeReply::StatusCode("201"));
    let channel = bca_channel();
    h.store.insert_channel(channel.clone()).await;
    let req = request("ORD-1015", Uuid::new_v4(), &[(channel.id, 25000)]);

    h.service.create_payment(req.clone()).await.expect("created");
    h.aggregator.set_raw_status("settlement");
    h.service
        .check_status_payment("ORD-1015")
        .await
        .expect("settled");

    let err = h
        .service
        .create_payment(req)
        .await
        .expect_err("same order id twice");
    match err {
        PaymentError::ValidationError { field, .. } => assert_eq!(field.as_deref(), Some("orderId")),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(h.aggregator.charges().len(), 1);

    let stored = h.store.load_payment("ORD-1015").await.expect("stored");
    assert_eq!(stored.status, PaymentStatus::Success);
    assert_eq!(stored.gateway_transaction_id.as_deref(), Some("gw-ORD-1015"));
}

#[tokio::test]
async fn test_resubmitted_split_order_does_not_debit_wallet_again() {
    let h = harness(ChargeReply::StatusCode("201"));
    let bca = bca_channel();
    let wallet = wallet_channel();
    let customer_id = Uuid::new_v4();
    h.store.insert_channel(bca.clone()).await;
    h.store.insert_channel(wallet.clone()).await;
    h.store.insert_wallet(active_wallet(customer_id)).await;
    let req = request("ORD-1016", customer_id, &[(wallet.id, 10000), (bca.id, 10000)]);

    h.service.create_payment(req.clone()).await.expect("created");
    let err = h
        .service
        .create_payment(req)
        .await
        .expect_err("same order id twice");
    assert!(matches!(err, PaymentError::ValidationError { .. }));
    assert_eq!(h.ledger.debits().await.len(), 1);
    assert_eq!(h.aggregator.charges().len(), 1);
}

#[tokio::test]
async fn test_settlement_during_charge_is_not_rolled_back() {
    let h = harness(ChargeReply::StatusCode("402"));
    let channel = bca_channel();
    h.store.insert_channel(channel.clone()).await;
    h.aggregator.settle_during_pay(h.store.clone());

    h.service
        .create_payment(request("ORD-1017", Uuid::new_v4(), &[(channel.id, 25000)]))
        .await
        .expect_err("non-created charge body");

    let stored = h.store.load_payment("ORD-1017").await.expect("stored");
    assert_eq!(stored.status, PaymentStatus::Success);
    assert_eq!(stored.gateway_transaction_id.as_deref(), Some("wh-ORD-1017"));
    assert!(stored.paid_at.is_some());
    assert!(stored.gateway_response.is_some());
}

#[tokio::test]
async fn test_amount_the_aggregator_cannot_encode_is_rejected_before_wallet_debit() {
    let h = harness(ChargeReply::StatusCode("201"));
    let bca = bca_channel();
    let wallet = wallet_channel();
    let customer_id = Uuid::new_v4();
    h.store.insert_channel(bca.clone()).await;
    h.store.insert_channel(wallet.clone()).await;
    h.store.insert_wallet(active_wallet(customer_id)).await;

    let mut req = request("ORD-1018", customer_id, &[(bca.id, 30000), (wallet.id, 20000)]);
    req.legs[0].amount = Decimal::from_str("30000.50").expect("decimal");
    req.legs[1].amount = Decimal::from_str("19999.50").expect("decimal");

    let err = h
        .service
        .create_payment(req)
        .await
        .expect_err("fractional rupiah");
    match err {
        PaymentError::ValidationError { field, .. } => assert_eq!(field.as_deref(), Some("amount")),
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(h.ledger.debits().await.is_empty());
    assert!(h.aggregator.charges().is_empty());
    assert!(h.store.payments().await.is_empty());
}

#[tokio::test]
async fn test_charge_outcome_survives_transaction_record_failure() {
    let store = Arc::new(InMemoryStore::new());
    let aggregator = FakeAggregator::new(ChargeReply::StatusCode("201"));
    let service = PaymentService::new(
        PaymentServiceConfig::default(),
        AggregatorFactory::with_aggregators(vec![aggregator.clone() as Arc<dyn PaymentAggregator>]),
        PaymentStores {
            transactions: Arc::new(BrokenTransactions),
            ..PaymentStores::in_memory(store.clone())
        },
        Arc::new(InMemoryLedger::new()),
    );
    let channel = bca_channel();
    store.insert_channel(channel.clone()).await;

    let responses = service
        .create_payment(request("ORD-1019", Uuid::new_v4(), &[(channel.id, 25000)]))
        .await
        .expect("charged leg is still reported");
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].payment_detail.va_number.as_deref(), Some("12345678901"));
    assert_eq!(aggregator.charges().len(), 1);
    assert_eq!(
        store.load_payment("ORD-1019").await.expect("stored").status,
        PaymentStatus::Pending
    );
}
