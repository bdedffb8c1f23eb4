//! Payment orchestration.
//!
//! Turns a client payment request into one payment record per leg, routes
//! each leg to the K-Wallet ledger or to the channel's aggregator, and
//! answers status checks from storage or by polling the aggregator.

use crate::database::memory::InMemoryStore;
use crate::database::repository::{
    duplicate_order, ChannelStore, PaymentStore, StatusUpdate, TransactionStore, WalletStore,
};
use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::factory::AggregatorFactory;
use crate::payments::provider::PaymentAggregator;
use crate::payments::types::{
    Channel, CheckStatusPaymentResponse, Customer, Payment, PaymentDetail, PaymentRequest,
    PaymentResponse, PaymentStatus, TransactionRecord, Wallet,
};
use crate::services::kwallet::{ensure_usable, KWalletLedger};
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

// ============================================================================
// Configuration Types
// ============================================================================

#[derive(Debug, Clone)]
pub struct PaymentServiceConfig {
    /// Used when the request carries no callback URL of its own.
    pub default_callback_url: Option<String>,
    pub expiry_minutes: i64,
}

impl Default for PaymentServiceConfig {
    fn default() -> Self {
        Self {
            default_callback_url: None,
            expiry_minutes: 1440,
        }
    }
}

impl PaymentServiceConfig {
    pub fn from_env() -> Self {
        Self {
            default_callback_url: std::env::var("PAYMENT_CALLBACK_URL")
                .ok()
                .filter(|v| !v.trim().is_empty()),
            expiry_minutes: std::env::var("PAYMENT_EXPIRY_MINUTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(1440),
        }
    }
}

// ============================================================================
// Request Types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentLeg {
    pub channel_id: Uuid,
    pub amount: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentRequest {
    pub order_id: String,
    pub customer_id: Uuid,
    pub customer: Customer,
    pub amount: Decimal,
    pub currency: String,
    pub legs: Vec<PaymentLeg>,
    #[serde(default)]
    pub callback_url: Option<String>,
}

/// Persistence handles the service works against.
#[derive(Clone)]
pub struct PaymentStores {
    pub channels: Arc<dyn ChannelStore>,
    pub payments: Arc<dyn PaymentStore>,
    pub transactions: Arc<dyn TransactionStore>,
    pub wallets: Arc<dyn WalletStore>,
}

impl PaymentStores {
    pub fn in_memory(store: Arc<InMemoryStore>) -> Self {
        Self {
            channels: store.clone(),
            payments: store.clone(),
            transactions: store.clone(),
            wallets: store,
        }
    }
}

/// A leg after validation: the channel is loaded and usable and the leg
/// order id is free.
struct ResolvedLeg {
    channel: Channel,
    amount: Decimal,
    order_id: String,
}

impl ResolvedLeg {
    fn is_wallet(&self) -> bool {
        self.channel.is_wallet()
    }

    fn total(&self) -> Decimal {
        self.amount + self.channel.fee_for(self.amount)
    }
}

// ============================================================================
// Payment Service
// ============================================================================

pub struct PaymentService {
    config: PaymentServiceConfig,
    aggregators: AggregatorFactory,
    stores: PaymentStores,
    ledger: Arc<dyn KWalletLedger>,
}

impl PaymentService {
    pub fn new(
        config: PaymentServiceConfig,
        aggregators: AggregatorFactory,
        stores: PaymentStores,
        ledger: Arc<dyn KWalletLedger>,
    ) -> Self {
        Self {
            config,
            aggregators,
            stores,
            ledger,
        }
    }

    pub fn aggregators(&self) -> &AggregatorFactory {
        &self.aggregators
    }

    /// Create every leg of a payment. Validation covers all legs before any
    /// ledger or aggregator call; legs then run one after another and the
    /// first failing leg aborts the rest.
    pub async fn create_payment(
        &self,
        request: CreatePaymentRequest,
    ) -> PaymentResult<Vec<PaymentResponse>> {
        let (legs, wallet) = self.validate(&request).await?;

        let transaction_id = Uuid::new_v4();
        info!(
            order_id = %request.order_id,
            %transaction_id,
            legs = legs.len(),
            "creating payment"
        );

        let mut responses = Vec::with_capacity(legs.len());
        for (index, leg) in legs.iter().enumerate() {
            let mut payment = self.new_payment(&request, leg, transaction_id);
            self.stores.payments.insert_payment(&payment).await?;

            let outcome = if leg.is_wallet() {
                match wallet.as_ref() {
                    Some(wallet) => self.charge_wallet(&leg.channel, &mut payment, wallet).await,
                    None => Err(PaymentError::internal("wallet leg without a resolved wallet")),
                }
            } else {
                self.charge_aggregator(&leg.channel, &mut payment, &request)
                    .await
            };

            if let Err(e) = self.record_transaction(&payment, index as u32 + 1).await {
                error!(
                    order_id = %payment.order_id,
                    error = %e,
                    "failed to record transaction"
                );
            }
            match outcome {
                Ok(response) => responses.push(response),
                Err(err) => {
                    if index > 0 {
                        warn!(
                            order_id = %payment.order_id,
                            completed_legs = index,
                            "payment leg failed after earlier legs were charged"
                        );
                    }
                    return Err(err.context("create_payment"));
                }
            }
        }

        Ok(responses)
    }

    /// Terminal payments are answered from storage. Pending ones are polled
    /// and a terminal answer is written with compare-and-set.
    pub async fn check_status_payment(
        &self,
        order_id: &str,
    ) -> PaymentResult<CheckStatusPaymentResponse> {
        let payment = self.stores.payments.load_payment(order_id).await?;
        let name = match payment.aggregator {
            Some(name) if !payment.status.is_terminal() => name,
            _ => return Ok(CheckStatusPaymentResponse::from_payment(&payment)),
        };

        let aggregator = self.aggregators.get(name)?;
        let provider_status = aggregator
            .check_status(order_id)
            .await
            .map_err(|e| e.context("check_status_payment"))?;
        let mut response = aggregator.map_check_status_payment(&payment, &provider_status)?;

        if response.status.is_terminal() {
            let paid_at = (response.status == PaymentStatus::Success).then(Utc::now);
            let applied = self
                .stores
                .payments
                .transition_status(
                    order_id,
                    response.status,
                    StatusUpdate {
                        gateway_transaction_id: provider_status.transaction_id.clone(),
                        paid_at,
                    },
                )
                .await?;
            if !applied {
                // Another writer (usually the webhook) got there first.
                let stored = self.stores.payments.load_payment(order_id).await?;
                return Ok(CheckStatusPaymentResponse::from_payment(&stored));
            }
            info!(order_id, status = %response.status, "payment status updated by polling");
            response.paid_at = paid_at;
        }

        Ok(response)
    }

    /// Rebuild the client response of a stored payment leg.
    pub async fn payment_response(&self, order_id: &str) -> PaymentResult<PaymentResponse> {
        let payment = self.stores.payments.load_payment(order_id).await?;
        let channel = self.stores.channels.load_channel(payment.channel_id).await?;
        let name = match payment.aggregator {
            Some(name) => name,
            None => return Ok(wallet_response(&channel, &payment)),
        };
        let aggregator = self.aggregators.get(name)?;
        match aggregator.map_response_payment(&channel, &payment) {
            Ok(response) => Ok(response),
            Err(err) => Err(self
                .signal_deactivation(&channel, err)
                .await
                .context("payment_response")),
        }
    }

    async fn validate(
        &self,
        request: &CreatePaymentRequest,
    ) -> PaymentResult<(Vec<ResolvedLeg>, Option<Wallet>)> {
        if request.order_id.trim().is_empty() {
            return Err(PaymentError::validation("order id is required", "orderId"));
        }
        if request.legs.is_empty() {
            return Err(PaymentError::validation(
                "at least one payment channel is required",
                "legs",
            ));
        }
        if request.legs.iter().any(|leg| leg.amount <= Decimal::ZERO) {
            return Err(PaymentError::validation(
                "every leg amount must be greater than zero",
                "legs.amount",
            ));
        }
        let sum: Decimal = request.legs.iter().map(|leg| leg.amount).sum();
        if sum != request.amount {
            return Err(PaymentError::validation(
                format!(
                    "leg amounts add up to {} but the payment amount is {}",
                    sum, request.amount
                ),
                "amount",
            ));
        }

        let mut legs = Vec::with_capacity(request.legs.len());
        for leg in &request.legs {
            let channel = self.stores.channels.load_channel(leg.channel_id).await?;
            if !channel.is_active {
                return Err(PaymentError::validation(
                    format!("channel {} is not active", channel.id),
                    "channelId",
                ));
            }
            channel.validate_fee_config()?;
            if !channel.is_wallet() {
                let name = channel.aggregator.ok_or_else(|| {
                    PaymentError::validation(
                        format!("channel {} has no aggregator", channel.id),
                        "channelId",
                    )
                })?;
                let aggregator = self.aggregators.get(name)?;
                if !aggregator.supports(channel.payment_method, channel.bank_name) {
                    return Err(PaymentError::StrategyNotFound {
                        aggregator: name.to_string(),
                        method: channel.payment_method.to_string(),
                        channel: channel.bank_name.to_string(),
                    });
                }
            }
            legs.push(ResolvedLeg {
                channel,
                amount: leg.amount,
                order_id: String::new(),
            });
        }

        let mut legs = wallet_first(legs);
        let split = legs.len() > 1;
        for (index, leg) in legs.iter_mut().enumerate() {
            leg.order_id = if split {
                format!("{}-{}", request.order_id, index + 1)
            } else {
                request.order_id.clone()
            };
        }

        if split {
            self.ensure_order_is_new(&request.order_id).await?;
        }
        for leg in &legs {
            self.ensure_order_is_new(&leg.order_id).await?;
            if let Some(name) = leg.channel.aggregator.filter(|_| !leg.is_wallet()) {
                let preview = self.charge_request(&leg.channel, &leg.order_id, leg.total(), request);
                self.aggregators.get(name)?.validate_request(&preview)?;
            }
        }

        let wallet = if legs.iter().any(ResolvedLeg::is_wallet) {
            let wallet = self
                .stores
                .wallets
                .find_wallet(request.customer_id)
                .await?
                .ok_or_else(|| {
                    PaymentError::validation("customer has no k-wallet", "wallet")
                })?;
            ensure_usable(&wallet)?;
            Some(wallet)
        } else {
            None
        };

        Ok((legs, wallet))
    }

    /// An order id that already has a stored payment is never charged again.
    async fn ensure_order_is_new(&self, order_id: &str) -> PaymentResult<()> {
        match self.stores.payments.load_payment(order_id).await {
            Ok(_) => Err(duplicate_order(order_id)),
            Err(PaymentError::NotFound { .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn new_payment(
        &self,
        request: &CreatePaymentRequest,
        leg: &ResolvedLeg,
        transaction_id: Uuid,
    ) -> Payment {
        let fee_amount = leg.channel.fee_for(leg.amount);
        let created_at = Utc::now();
        Payment {
            id: Uuid::new_v4(),
            transaction_id,
            order_id: leg.order_id.clone(),
            customer_id: request.customer_id,
            customer: request.customer.clone(),
            channel_id: leg.channel.id,
            payment_method: leg.channel.payment_method,
            aggregator: leg.channel.aggregator.filter(|_| !leg.is_wallet()),
            amount: leg.amount,
            fee_amount,
            total_amount: leg.amount + fee_amount,
            currency: request.currency.clone(),
            status: PaymentStatus::Pending,
            gateway_transaction_id: None,
            gateway_response: None,
            created_at,
            paid_at: None,
            expired_at: Some(created_at + Duration::minutes(self.config.expiry_minutes)),
        }
    }

    async fn charge_wallet(
        &self,
        channel: &Channel,
        payment: &mut Payment,
        wallet: &Wallet,
    ) -> PaymentResult<PaymentResponse> {
        let debit = match self
            .ledger
            .debit(wallet, payment.total_amount, &payment.order_id)
            .await
        {
            Ok(debit) => debit,
            Err(err) => {
                self.settle(payment, PaymentStatus::Failed, StatusUpdate::default())
                    .await?;
                return Err(err);
            }
        };

        let raw = serde_json::to_value(&debit)?;
        self.stores
            .payments
            .record_gateway_response(&payment.order_id, &raw)
            .await?;
        payment.gateway_response = Some(raw);
        self.settle(
            payment,
            PaymentStatus::Success,
            StatusUpdate {
                gateway_transaction_id: Some(debit.id.to_string()),
                paid_at: Some(debit.debited_at),
            },
        )
        .await?;

        Ok(wallet_response(channel, payment))
    }

    async fn charge_aggregator(
        &self,
        channel: &Channel,
        payment: &mut Payment,
        request: &CreatePaymentRequest,
    ) -> PaymentResult<PaymentResponse> {
        let name = payment
            .aggregator
            .ok_or_else(|| PaymentError::internal("aggregator leg without an aggregator"))?;
        let aggregator = self.aggregators.get(name)?;
        let charge = self.charge_request(channel, &payment.order_id, payment.total_amount, request);

        let raw = match aggregator.pay(&charge).await {
            Ok(raw) => raw,
            Err(err) if err.is_outcome_unknown() => {
                warn!(
                    order_id = %payment.order_id,
                    aggregator = %name,
                    error = %err,
                    "charge outcome unknown, leaving payment pending"
                );
                return Err(err);
            }
            Err(err) => {
                error!(
                    order_id = %payment.order_id,
                    aggregator = %name,
                    error = %err,
                    "charge rejected"
                );
                return Err(self.fail_payment(channel, payment, err).await);
            }
        };

        self.stores
            .payments
            .record_gateway_response(&payment.order_id, &raw)
            .await?;
        payment.gateway_response = Some(raw);

        match aggregator.map_response_payment(channel, payment) {
            Ok(response) => Ok(response),
            Err(err) => Err(self.fail_payment(channel, payment, err).await),
        }
    }

    fn charge_request(
        &self,
        channel: &Channel,
        order_id: &str,
        amount: Decimal,
        request: &CreatePaymentRequest,
    ) -> PaymentRequest {
        PaymentRequest {
            order_id: order_id.to_string(),
            amount,
            currency: request.currency.clone(),
            method: channel.payment_method,
            channel: channel.bank_name,
            customer_name: request.customer.name.clone(),
            customer_email: request.customer.email.clone(),
            customer_phone: request.customer.phone.clone(),
            callback_url: request
                .callback_url
                .clone()
                .or_else(|| self.config.default_callback_url.clone()),
        }
    }

    /// Move a pending leg to a terminal status. When another writer already
    /// settled it, the stored record wins and is copied back into `payment`.
    async fn settle(
        &self,
        payment: &mut Payment,
        status: PaymentStatus,
        update: StatusUpdate,
    ) -> PaymentResult<()> {
        let applied = self
            .stores
            .payments
            .transition_status(&payment.order_id, status, update.clone())
            .await?;
        if applied {
            payment.status = status;
            if let Some(id) = update.gateway_transaction_id {
                payment.gateway_transaction_id = Some(id);
            }
            if update.paid_at.is_some() {
                payment.paid_at = update.paid_at;
            }
        } else {
            let stored = self.stores.payments.load_payment(&payment.order_id).await?;
            warn!(
                order_id = %payment.order_id,
                wanted = %status,
                stored = %stored.status,
                "payment already settled, keeping stored status"
            );
            *payment = stored;
        }
        Ok(())
    }

    /// Mark the leg FAILED and act on a deactivation request. Returns the
    /// original error for the caller to propagate.
    async fn fail_payment(
        &self,
        channel: &Channel,
        payment: &mut Payment,
        err: PaymentError,
    ) -> PaymentError {
        if let Err(e) = self
            .settle(payment, PaymentStatus::Failed, StatusUpdate::default())
            .await
        {
            error!(order_id = %payment.order_id, error = %e, "failed to mark payment failed");
        }
        self.signal_deactivation(channel, err).await
    }

    /// Best effort: a failed channel update is logged, the payment error is
    /// what the caller sees either way.
    async fn signal_deactivation(&self, channel: &Channel, err: PaymentError) -> PaymentError {
        if err.deactivates_channel() && channel.is_active {
            let mut deactivated = channel.clone();
            deactivated.is_active = false;
            match self.stores.channels.save_channel(&deactivated).await {
                Ok(()) => warn!(channel_id = %deactivated.id, error = %err, "channel deactivated"),
                Err(e) => {
                    error!(channel_id = %deactivated.id, error = %e, "failed to deactivate channel")
                }
            }
        }
        err
    }

    async fn record_transaction(&self, payment: &Payment, leg_index: u32) -> PaymentResult<()> {
        let record = TransactionRecord {
            id: Uuid::new_v4(),
            payment_id: payment.id,
            transaction_id: payment.transaction_id,
            order_id: payment.order_id.clone(),
            leg_index,
            channel_id: payment.channel_id,
            amount: payment.total_amount,
            status: payment.status,
            created_at: Utc::now(),
        };
        self.stores.transactions.save_transaction(&record).await
    }
}

/// With exactly two legs the wallet leg is charged first.
fn wallet_first(mut legs: Vec<ResolvedLeg>) -> Vec<ResolvedLeg> {
    if legs.len() == 2 && legs[1].is_wallet() && !legs[0].is_wallet() {
        legs.swap(0, 1);
    }
    legs
}

fn wallet_response(channel: &Channel, payment: &Payment) -> PaymentResponse {
    let detail = PaymentDetail {
        bank: channel.bank_name.wire_name(),
        transaction_time: payment.paid_at.map(|at| at.to_rfc3339()),
        ..Default::default()
    };
    PaymentResponse::from_payment(channel, payment, "k_wallet", detail)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payments::types::{AggregatorName, ChannelCode, FeeType, PaymentMethod};

    fn leg(method: PaymentMethod, bank: ChannelCode) -> ResolvedLeg {
        ResolvedLeg {
            channel: Channel {
                id: Uuid::new_v4(),
                payment_method: method,
                bank_name: bank,
                aggregator: (method != PaymentMethod::KWallet).then_some(AggregatorName::Midtrans),
                currency: "IDR".to_string(),
                fee_type: FeeType::None,
                fee_fixed: None,
                fee_percentage_basis_points: None,
                product_name: bank.to_string(),
                product_code: None,
                bank_code: None,
                instruction: None,
                is_active: true,
            },
            amount: Decimal::from(5000),
            order_id: String::new(),
        }
    }

    #[test]
    fn wallet_leg_moves_to_the_front_of_a_pair() {
        let legs = wallet_first(vec![
            leg(PaymentMethod::VirtualAccount, ChannelCode::Bca),
            leg(PaymentMethod::KWallet, ChannelCode::KWallet),
        ]);
        assert!(legs[0].is_wallet());
        assert_eq!(legs[1].channel.bank_name, ChannelCode::Bca);
    }

    #[test]
    fn order_is_kept_for_other_shapes() {
        let legs = wallet_first(vec![
            leg(PaymentMethod::KWallet, ChannelCode::KWallet),
            leg(PaymentMethod::VirtualAccount, ChannelCode::Bca),
        ]);
        assert!(legs[0].is_wallet());

        let legs = wallet_first(vec![
            leg(PaymentMethod::VirtualAccount, ChannelCode::Bca),
            leg(PaymentMethod::Qris, ChannelCode::Qris),
            leg(PaymentMethod::KWallet, ChannelCode::KWallet),
        ]);
        assert!(legs[2].is_wallet());
    }
}
