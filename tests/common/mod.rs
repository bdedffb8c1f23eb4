#![allow(dead_code)]

use async_trait::async_trait;
use kpay_backend::database::memory::InMemoryStore;
use kpay_backend::database::repository::{PaymentStore, StatusUpdate};
use kpay_backend::payments::error::{PaymentError, PaymentResult};
use kpay_backend::payments::factory::AggregatorFactory;
use kpay_backend::payments::provider::PaymentAggregator;
use kpay_backend::payments::providers::midtrans::strategies::MidtransBankTransfer;
use kpay_backend::payments::providers::midtrans::types::gross_amount;
use kpay_backend::payments::strategy::ChannelStrategy;
use kpay_backend::payments::types::{
    AggregatorName, Channel, ChannelCode, CheckStatusPaymentResponse, Customer, FeeType,
    Notification, Payment, PaymentMethod, PaymentRequest, PaymentResponse, PaymentStatus,
    ProviderStatus, Wallet, WalletStatus, WebhookAck,
};
use kpay_backend::services::kwallet::InMemoryLedger;
use kpay_backend::services::payment_service::{
    CreatePaymentRequest, PaymentLeg, PaymentService, PaymentServiceConfig, PaymentStores,
};
use rust_decimal::Decimal;
use serde_json::{json, Value as JsonValue};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// What the fake aggregator answers to a charge.
#[derive(Clone)]
pub enum ChargeReply {
    /// Midtrans-shaped charge body with this `status_code`.
    StatusCode(&'static str),
    Error(PaymentError),
}

/// Stands in for a real aggregator: records every charge and maps stored
/// gateway responses with the Midtrans BCA strategy.
pub struct FakeAggregator {
    pub reply: Mutex<ChargeReply>,
    pub charges: Mutex<Vec<PaymentRequest>>,
    pub raw_status: Mutex<String>,
    /// When set, the order is settled in this store while the charge is in
    /// flight, the way an early webhook would.
    pub settle_during_pay: Mutex<Option<Arc<InMemoryStore>>>,
}

impl FakeAggregator {
    pub fn new(reply: ChargeReply) -> Arc<Self> {
        Arc::new(Self {
            reply: Mutex::new(reply),
            charges: Mutex::new(Vec::new()),
            raw_status: Mutex::new("pending".to_string()),
            settle_during_pay: Mutex::new(None),
        })
    }

    pub fn charges(&self) -> Vec<PaymentRequest> {
        self.charges.lock().expect("lock").clone()
    }

    pub fn set_raw_status(&self, raw: &str) {
        *self.raw_status.lock().expect("lock") = raw.to_string();
    }

    pub fn settle_during_pay(&self, store: Arc<InMemoryStore>) {
        *self.settle_during_pay.lock().expect("lock") = Some(store);
    }
}

#[async_trait]
impl PaymentAggregator for FakeAggregator {
    fn name(&self) -> AggregatorName {
        AggregatorName::Midtrans
    }

    fn supports(&self, method: PaymentMethod, channel: ChannelCode) -> bool {
        method == PaymentMethod::VirtualAccount && channel == ChannelCode::Bca
    }

    fn validate_request(&self, request: &PaymentRequest) -> PaymentResult<()> {
        gross_amount(request.amount).map(|_| ())
    }

    async fn pay(&self, request: &PaymentRequest) -> PaymentResult<JsonValue> {
        self.charges.lock().expect("lock").push(request.clone());
        let settle_store = self.settle_during_pay.lock().expect("lock").clone();
        if let Some(store) = settle_store {
            store
                .transition_status(
                    &request.order_id,
                    PaymentStatus::Success,
                    StatusUpdate {
                        gateway_transaction_id: Some(format!("wh-{}", request.order_id)),
                        paid_at: Some(chrono::Utc::now()),
                    },
                )
                .await?;
        }
        let reply = self.reply.lock().expect("lock").clone();
        match reply {
            ChargeReply::StatusCode(code) => {
                let message = if code == "201" {
                    "Success, Bank Transfer transaction is created"
                } else {
                    "Merchant cannot be identified"
                };
                Ok(json!({
                "status_code": code,
                "status_message": message,
                "transaction_id": format!("gw-{}", request.order_id),
                "order_id": request.order_id,
                "gross_amount": request.amount.to_string(),
                "payment_type": "bank_transfer",
                "transaction_status": "pending",
                "va_numbers": [{ "bank": "bca", "va_number": "12345678901" }]
                }))
            }
            ChargeReply::Error(err) => Err(err),
        }
    }

    async fn check_status(&self, order_id: &str) -> PaymentResult<ProviderStatus> {
        Ok(ProviderStatus {
            order_id: order_id.to_string(),
            transaction_id: Some(format!("gw-{}", order_id)),
            raw_status: self.raw_status.lock().expect("lock").clone(),
            status_code: Some("200".to_string()),
            status_message: None,
            transaction_time: Some("2026-03-01 10:00:00".to_string()),
            settlement_time: None,
            raw: json!({}),
        })
    }

    fn map_response_payment(
        &self,
        channel: &Channel,
        payment: &Payment,
    ) -> PaymentResult<PaymentResponse> {
        MidtransBankTransfer::new(ChannelCode::Bca).client_response(channel, payment)
    }

    fn map_check_status_payment(
        &self,
        payment: &Payment,
        status: &ProviderStatus,
    ) -> PaymentResult<CheckStatusPaymentResponse> {
        let canonical =
            kpay_backend::payments::providers::midtrans::map_transaction_status(&status.raw_status)?;
        let mut response = CheckStatusPaymentResponse::from_payment(payment);
        response.status = canonical;
        response.gateway_transaction_id = status.transaction_id.clone();
        Ok(response)
    }

    fn parse_notification(&self, _payload: &[u8]) -> PaymentResult<Notification> {
        Err(PaymentError::validation("fake aggregator has no webhooks", "body"))
    }

    fn acknowledge(&self, _notification: Option<&Notification>) -> WebhookAck {
        WebhookAck::json(json!({ "status": "ok" }))
    }
}

pub fn bca_channel() -> Channel {
    Channel {
        id: Uuid::new_v4(),
        payment_method: PaymentMethod::VirtualAccount,
        bank_name: ChannelCode::Bca,
        aggregator: Some(AggregatorName::Midtrans),
        currency: "IDR".to_string(),
        fee_type: FeeType::Fixed,
        fee_fixed: Some(Decimal::from(4000)),
        fee_percentage_basis_points: None,
        product_name: "BCA Virtual Account".to_string(),
        product_code: None,
        bank_code: Some("014".to_string()),
        instruction: Some("Transfer to the virtual account number".to_string()),
        is_active: true,
    }
}

pub fn wallet_channel() -> Channel {
    Channel {
        id: Uuid::new_v4(),
        payment_method: PaymentMethod::KWallet,
        bank_name: ChannelCode::KWallet,
        aggregator: None,
        currency: "IDR".to_string(),
        fee_type: FeeType::None,
        fee_fixed: None,
        fee_percentage_basis_points: None,
        product_name: "K-Wallet".to_string(),
        product_code: None,
        bank_code: None,
        instruction: None,
        is_active: true,
    }
}

pub fn active_wallet(customer_id: Uuid) -> Wallet {
    Wallet {
        id: Uuid::new_v4(),
        customer_id,
        account_number: "KW-000123".to_string(),
        status: WalletStatus::Active,
        balance: Decimal::ZERO,
    }
}

pub fn request(order_id: &str, customer_id: Uuid, legs: &[(Uuid, i64)]) -> CreatePaymentRequest {
    CreatePaymentRequest {
        order_id: order_id.to_string(),
        customer_id,
        customer: Customer {
            name: "Budi Santoso Wijaya".to_string(),
            email: Some("budi@example.co.id".to_string()),
            phone: Some("081234567890".to_string()),
        },
        amount: Decimal::from(legs.iter().map(|(_, amount)| amount).sum::<i64>()),
        currency: "IDR".to_string(),
        legs: legs
            .iter()
            .map(|(channel_id, amount)| PaymentLeg {
                channel_id: *channel_id,
                amount: Decimal::from(*amount),
            })
            .collect(),
        callback_url: None,
    }
}

pub struct Harness {
    pub store: Arc<InMemoryStore>,
    pub ledger: Arc<InMemoryLedger>,
    pub aggregator: Arc<FakeAggregator>,
    pub service: PaymentService,
}

pub fn harness(reply: ChargeReply) -> Harness {
    let store = Arc::new(InMemoryStore::new());
    let ledger = Arc::new(InMemoryLedger::new());
    let aggregator = FakeAggregator::new(reply);
    let factory = AggregatorFactory::with_aggregators(vec![aggregator.clone() as Arc<dyn PaymentAggregator>]);
    let service = PaymentService::new(
        PaymentServiceConfig::default(),
        factory,
        PaymentStores::in_memory(store.clone()),
        ledger.clone(),
    );
    Harness {
        store,
        ledger,
        aggregator,
        service,
    }
}

pub fn pending_payment(order_id: &str, aggregator: AggregatorName) -> Payment {
    Payment {
        id: Uuid::new_v4(),
        transaction_id: Uuid::new_v4(),
        order_id: order_id.to_string(),
        customer_id: Uuid::new_v4(),
        customer: Customer::default(),
        channel_id: Uuid::new_v4(),
        payment_method: PaymentMethod::VirtualAccount,
        aggregator: Some(aggregator),
        amount: Decimal::from(10000),
        fee_amount: Decimal::ZERO,
        total_amount: Decimal::from(10000),
        currency: "IDR".to_string(),
        status: PaymentStatus::Pending,
        gateway_transaction_id: None,
        gateway_response: None,
        created_at: chrono::Utc::now(),
        paid_at: None,
        expired_at: None,
    }
}
