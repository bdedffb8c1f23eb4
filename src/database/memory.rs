use crate::database::repository::{
    duplicate_order, ChannelStore, PaymentStore, StatusUpdate, TransactionStore, WalletStore,
};
use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::types::{Channel, Payment, PaymentStatus, TransactionRecord, Wallet};
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Process-local store used by tests and by the server when started with
/// `SKIP_EXTERNALS`.
#[derive(Default)]
pub struct InMemoryStore {
    channels: RwLock<HashMap<Uuid, Channel>>,
    payments: RwLock<HashMap<String, Payment>>,
    transactions: RwLock<Vec<TransactionRecord>>,
    wallets: RwLock<HashMap<Uuid, Wallet>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_channel(&self, channel: Channel) {
        self.channels.write().await.insert(channel.id, channel);
    }

    pub async fn insert_wallet(&self, wallet: Wallet) {
        self.wallets.write().await.insert(wallet.customer_id, wallet);
    }

    pub async fn payments(&self) -> Vec<Payment> {
        let mut payments: Vec<Payment> = self.payments.read().await.values().cloned().collect();
        payments.sort_by(|a, b| a.order_id.cmp(&b.order_id));
        payments
    }

    pub async fn transactions(&self) -> Vec<TransactionRecord> {
        self.transactions.read().await.clone()
    }
}

#[async_trait]
impl ChannelStore for InMemoryStore {
    async fn load_channel(&self, id: Uuid) -> PaymentResult<Channel> {
        self.channels
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| PaymentError::NotFound {
                entity: "channel".to_string(),
                id: id.to_string(),
            })
    }

    async fn save_channel(&self, channel: &Channel) -> PaymentResult<()> {
        self.channels
            .write()
            .await
            .insert(channel.id, channel.clone());
        Ok(())
    }
}

#[async_trait]
impl PaymentStore for InMemoryStore {
    async fn load_payment(&self, order_id: &str) -> PaymentResult<Payment> {
        self.payments
            .read()
            .await
            .get(order_id)
            .cloned()
            .ok_or_else(|| PaymentError::NotFound {
                entity: "payment".to_string(),
                id: order_id.to_string(),
            })
    }

    async fn insert_payment(&self, payment: &Payment) -> PaymentResult<()> {
        match self.payments.write().await.entry(payment.order_id.clone()) {
            Entry::Occupied(_) => Err(duplicate_order(&payment.order_id)),
            Entry::Vacant(slot) => {
                slot.insert(payment.clone());
                Ok(())
            }
        }
    }

    async fn record_gateway_response(
        &self,
        order_id: &str,
        response: &JsonValue,
    ) -> PaymentResult<()> {
        let mut payments = self.payments.write().await;
        let payment = payments
            .get_mut(order_id)
            .ok_or_else(|| PaymentError::NotFound {
                entity: "payment".to_string(),
                id: order_id.to_string(),
            })?;
        payment.gateway_response = Some(response.clone());
        Ok(())
    }

    async fn transition_status(
        &self,
        order_id: &str,
        status: PaymentStatus,
        update: StatusUpdate,
    ) -> PaymentResult<bool> {
        let mut payments = self.payments.write().await;
        let payment = payments
            .get_mut(order_id)
            .ok_or_else(|| PaymentError::NotFound {
                entity: "payment".to_string(),
                id: order_id.to_string(),
            })?;

        if !payment.status.can_transition_to(status) {
            return Ok(false);
        }
        payment.status = status;
        if update.gateway_transaction_id.is_some() {
            payment.gateway_transaction_id = update.gateway_transaction_id;
        }
        if update.paid_at.is_some() {
            payment.paid_at = update.paid_at;
        }
        Ok(true)
    }
}

#[async_trait]
impl TransactionStore for InMemoryStore {
    async fn save_transaction(&self, record: &TransactionRecord) -> PaymentResult<()> {
        self.transactions.write().await.push(record.clone());
        Ok(())
    }
}

#[async_trait]
impl WalletStore for InMemoryStore {
    async fn find_wallet(&self, customer_id: Uuid) -> PaymentResult<Option<Wallet>> {
        Ok(self.wallets.read().await.get(&customer_id).cloned())
    }
}
