//! Persistence contract of the payment core.
//!
//! The orchestration and notification services only see these traits; the
//! in-memory store backs tests and `SKIP_EXTERNALS` runs, the Postgres
//! repositories back production.

use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::types::{Channel, Payment, PaymentStatus, TransactionRecord, Wallet};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use uuid::Uuid;

#[async_trait]
pub trait ChannelStore: Send + Sync {
    async fn load_channel(&self, id: Uuid) -> PaymentResult<Channel>;

    async fn save_channel(&self, channel: &Channel) -> PaymentResult<()>;
}

/// Fields written together with a status change.
#[derive(Debug, Clone, Default)]
pub struct StatusUpdate {
    pub gateway_transaction_id: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn load_payment(&self, order_id: &str) -> PaymentResult<Payment>;

    /// Insert-only. An existing `order_id` is rejected with
    /// [`duplicate_order`]; stored records are never overwritten.
    async fn insert_payment(&self, payment: &Payment) -> PaymentResult<()>;

    /// Attach the raw aggregator reply. The status is left untouched.
    async fn record_gateway_response(
        &self,
        order_id: &str,
        response: &JsonValue,
    ) -> PaymentResult<()>;

    /// Compare-and-set on `status = PENDING`. Returns false when the stored
    /// status was already terminal and nothing was written.
    async fn transition_status(
        &self,
        order_id: &str,
        status: PaymentStatus,
        update: StatusUpdate,
    ) -> PaymentResult<bool>;
}

pub fn duplicate_order(order_id: &str) -> PaymentError {
    PaymentError::validation(format!("order id {} already exists", order_id), "orderId")
}

#[async_trait]
pub trait TransactionStore: Send + Sync {
    async fn save_transaction(&self, record: &TransactionRecord) -> PaymentResult<()>;
}

#[async_trait]
pub trait WalletStore: Send + Sync {
    async fn find_wallet(&self, customer_id: Uuid) -> PaymentResult<Option<Wallet>>;
}
