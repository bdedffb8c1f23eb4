pub mod strategies;
pub mod types;

use crate::payments::credentials::{AggregatorConfiguration, ConfigValue, SecretDecryptor};
use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::provider::{check_status_response, PaymentAggregator};
use crate::payments::strategy::{StrategyKey, StrategyRegistry};
use crate::payments::types::{
    AggregatorName, Channel, ChannelCode, CheckStatusPaymentResponse, Notification, Payment,
    PaymentMethod, PaymentRequest, PaymentResponse, PaymentStatus, ProviderStatus, WebhookAck,
};
use crate::payments::utils::{basic_auth_header, secure_eq, sha512_hex, PaymentHttpClient};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Method, StatusCode};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::Duration;
use strategies::{
    MidtransBankTransfer, MidtransCstore, MidtransEchannel, MidtransGopay, MidtransPermata,
    MidtransQris, MidtransShopeepay, MidtransSnap,
};
use tracing::{info, warn};
use types::{ChargeRequest, MidtransNotification, SnapRequest, TransactionStatusResponse};

const SANDBOX_BASE_URL: &str = "https://api.sandbox.midtrans.com";
const SANDBOX_SNAP_URL: &str = "https://app.sandbox.midtrans.com";
const PRODUCTION_BASE_URL: &str = "https://api.midtrans.com";
const PRODUCTION_SNAP_URL: &str = "https://app.midtrans.com";

/// Channels the client refuses to start without.
pub const REQUIRED_CHANNELS: [StrategyKey; 12] = [
    StrategyKey::new(PaymentMethod::VirtualAccount, ChannelCode::Bca),
    StrategyKey::new(PaymentMethod::VirtualAccount, ChannelCode::Bni),
    StrategyKey::new(PaymentMethod::VirtualAccount, ChannelCode::Bri),
    StrategyKey::new(PaymentMethod::VirtualAccount, ChannelCode::Cimb),
    StrategyKey::new(PaymentMethod::VirtualAccount, ChannelCode::Permata),
    StrategyKey::new(PaymentMethod::VirtualAccount, ChannelCode::Mandiri),
    StrategyKey::new(PaymentMethod::EWallet, ChannelCode::Gopay),
    StrategyKey::new(PaymentMethod::EWallet, ChannelCode::Shopeepay),
    StrategyKey::new(PaymentMethod::EWallet, ChannelCode::Dana),
    StrategyKey::new(PaymentMethod::Qris, ChannelCode::Qris),
    StrategyKey::new(PaymentMethod::Retail, ChannelCode::Indomaret),
    StrategyKey::new(PaymentMethod::Retail, ChannelCode::Alfamart),
];

#[derive(Debug, Clone)]
pub struct MidtransConfig {
    pub environment: ConfigValue,
    pub base_url: String,
    pub snap_url: String,
    pub server_key: String,
    pub client_key: Option<String>,
    pub merchant_id: Option<String>,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl Default for MidtransConfig {
    fn default() -> Self {
        Self {
            environment: ConfigValue::Sandbox,
            base_url: SANDBOX_BASE_URL.to_string(),
            snap_url: SANDBOX_SNAP_URL.to_string(),
            server_key: String::new(),
            client_key: None,
            merchant_id: None,
            timeout_secs: 30,
            max_retries: 3,
        }
    }
}

impl MidtransConfig {
    pub fn from_env() -> PaymentResult<Self> {
        let server_key =
            std::env::var("MIDTRANS_SERVER_KEY").map_err(|_| PaymentError::ValidationError {
                message: "MIDTRANS_SERVER_KEY environment variable is required".to_string(),
                field: Some("MIDTRANS_SERVER_KEY".to_string()),
            })?;
        let environment: ConfigValue = std::env::var("MIDTRANS_ENVIRONMENT")
            .unwrap_or_default()
            .parse()?;
        let (base_default, snap_default) = default_urls(environment);

        Ok(Self {
            environment,
            base_url: std::env::var("MIDTRANS_BASE_URL")
                .unwrap_or_else(|_| base_default.to_string()),
            snap_url: std::env::var("MIDTRANS_SNAP_URL")
                .unwrap_or_else(|_| snap_default.to_string()),
            client_key: std::env::var("MIDTRANS_CLIENT_KEY").ok(),
            merchant_id: std::env::var("MIDTRANS_MERCHANT_ID").ok(),
            timeout_secs: std::env::var("MIDTRANS_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(30),
            max_retries: std::env::var("MIDTRANS_MAX_RETRIES")
                .ok()
                .and_then(|v| v.parse::<u32>().ok())
                .unwrap_or(3),
            server_key,
        })
    }

    /// Build from a stored aggregator configuration, decrypting the keys.
    pub fn from_configuration(
        configuration: &AggregatorConfiguration,
        decryptor: &dyn SecretDecryptor,
    ) -> PaymentResult<Self> {
        let resolved = configuration.resolve(decryptor)?;
        let (base_default, snap_default) = default_urls(resolved.environment);
        Ok(Self {
            environment: resolved.environment,
            base_url: if resolved.base_url.is_empty() {
                base_default.to_string()
            } else {
                resolved.base_url
            },
            snap_url: resolved
                .checkout_url
                .unwrap_or_else(|| snap_default.to_string()),
            server_key: resolved.server_key,
            client_key: resolved.client_key,
            merchant_id: resolved.merchant_id,
            ..Self::default()
        })
    }
}

fn default_urls(environment: ConfigValue) -> (&'static str, &'static str) {
    if environment.is_production() {
        (PRODUCTION_BASE_URL, PRODUCTION_SNAP_URL)
    } else {
        (SANDBOX_BASE_URL, SANDBOX_SNAP_URL)
    }
}

/// Midtrans transaction status vocabulary to the canonical status.
/// `authorize` needs a manual capture and is surfaced as an error.
pub fn map_transaction_status(raw: &str) -> PaymentResult<PaymentStatus> {
    match raw.trim().to_lowercase().as_str() {
        "capture" | "settlement" => Ok(PaymentStatus::Success),
        "pending" => Ok(PaymentStatus::Pending),
        "cancel" => Ok(PaymentStatus::Cancelled),
        "expire" => Ok(PaymentStatus::Expired),
        "deny" | "failure" => Ok(PaymentStatus::Failed),
        "authorize" => Err(PaymentError::PaymentRequired {
            message: "midtrans transaction is authorized and awaits capture".to_string(),
            deactivate_channel: false,
        }),
        other => {
            warn!(raw_status = %other, "unrecognized midtrans status, treating as pending");
            Ok(PaymentStatus::Pending)
        }
    }
}

/// HTTP transport for the Core API and Snap.
pub struct MidtransApi {
    config: MidtransConfig,
    http: PaymentHttpClient,
    authorization: String,
}

impl MidtransApi {
    pub fn new(config: MidtransConfig) -> PaymentResult<Self> {
        if config.server_key.trim().is_empty() {
            return Err(PaymentError::configuration("midtrans server key is empty"));
        }
        let http = PaymentHttpClient::new(
            AggregatorName::Midtrans,
            Duration::from_secs(config.timeout_secs),
            config.max_retries,
        )?;
        let authorization = basic_auth_header(&config.server_key);
        Ok(Self {
            config,
            http,
            authorization,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn snap_endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.snap_url.trim_end_matches('/'), path)
    }

    pub async fn create_payment(&self, charge: &ChargeRequest) -> PaymentResult<JsonValue> {
        let payload = serde_json::to_value(charge)?;
        let reply = self
            .http
            .send(
                Method::POST,
                &self.endpoint("/v2/charge"),
                Some(&self.authorization),
                Some(&payload),
                &[("Accept", "application/json")],
            )
            .await?;
        if !reply.status.is_success() {
            return Err(reply.into_error(AggregatorName::Midtrans));
        }

        let body: JsonValue = reply.decode(AggregatorName::Midtrans)?;
        let status_code = body
            .get("status_code")
            .and_then(JsonValue::as_str)
            .unwrap_or_default();
        if status_code != types::STATUS_CREATED {
            let message = body
                .get("status_message")
                .and_then(JsonValue::as_str)
                .unwrap_or("charge was not created")
                .to_string();
            return Err(PaymentError::ProviderError {
                provider: AggregatorName::Midtrans.to_string(),
                message,
                provider_code: Some(status_code.to_string()),
                retryable: false,
            });
        }

        info!(
            order_id = %charge.transaction_details.order_id,
            payment_type = %charge.payment_type,
            "midtrans charge created"
        );
        Ok(body)
    }

    pub async fn create_snap_payment(&self, snap: &SnapRequest) -> PaymentResult<JsonValue> {
        let payload = serde_json::to_value(snap)?;
        let reply = self
            .http
            .send(
                Method::POST,
                &self.snap_endpoint("/snap/v1/transactions"),
                Some(&self.authorization),
                Some(&payload),
                &[("Accept", "application/json")],
            )
            .await?;
        if reply.status != StatusCode::CREATED {
            return Err(reply.into_error(AggregatorName::Midtrans));
        }

        info!(
            order_id = %snap.transaction_details.order_id,
            "midtrans snap transaction created"
        );
        reply.decode(AggregatorName::Midtrans)
    }

    pub async fn check_status(&self, order_id: &str) -> PaymentResult<ProviderStatus> {
        let raw: JsonValue = self
            .http
            .request_json(
                Method::GET,
                &self.endpoint(&format!("/v2/{}/status", order_id)),
                Some(&self.authorization),
                None,
                &[("Accept", "application/json")],
            )
            .await?;
        provider_status(order_id, raw)
    }

    /// `sha512(order_id + status_code + gross_amount + server_key)`.
    pub fn verify_signature(&self, notification: &MidtransNotification) -> bool {
        let expected = sha512_hex(&format!(
            "{}{}{}{}",
            notification.order_id,
            notification.status_code,
            notification.gross_amount,
            self.config.server_key
        ));
        secure_eq(
            expected.as_bytes(),
            notification.signature_key.to_lowercase().as_bytes(),
        )
    }
}

fn provider_status(order_id: &str, raw: JsonValue) -> PaymentResult<ProviderStatus> {
    let status: TransactionStatusResponse = serde_json::from_value(raw.clone())?;
    if status.status_code == "404" {
        return Err(PaymentError::NotFound {
            entity: "midtrans transaction".to_string(),
            id: order_id.to_string(),
        });
    }
    let raw_status = status
        .transaction_status
        .clone()
        .ok_or_else(|| PaymentError::ProviderError {
            provider: AggregatorName::Midtrans.to_string(),
            message: status
                .status_message
                .clone()
                .unwrap_or_else(|| "status response has no transaction_status".to_string()),
            provider_code: Some(status.status_code.clone()),
            retryable: false,
        })?;

    Ok(ProviderStatus {
        order_id: status.order_id.unwrap_or_else(|| order_id.to_string()),
        transaction_id: status.transaction_id,
        raw_status,
        status_code: Some(status.status_code),
        status_message: status.status_message,
        transaction_time: status.transaction_time,
        settlement_time: status.settlement_time,
        raw,
    })
}

pub struct MidtransClient {
    api: MidtransApi,
    strategies: StrategyRegistry<MidtransApi>,
}

impl MidtransClient {
    pub fn new(config: MidtransConfig) -> PaymentResult<Self> {
        let api = MidtransApi::new(config)?;
        let strategies = StrategyRegistry::builder(AggregatorName::Midtrans)
            .register(
                PaymentMethod::VirtualAccount,
                ChannelCode::Bca,
                Arc::new(MidtransBankTransfer::new(ChannelCode::Bca)),
            )
            .register(
                PaymentMethod::VirtualAccount,
                ChannelCode::Bni,
                Arc::new(MidtransBankTransfer::new(ChannelCode::Bni)),
            )
            .register(
                PaymentMethod::VirtualAccount,
                ChannelCode::Bri,
                Arc::new(MidtransBankTransfer::new(ChannelCode::Bri)),
            )
            .register(
                PaymentMethod::VirtualAccount,
                ChannelCode::Cimb,
                Arc::new(MidtransBankTransfer::new(ChannelCode::Cimb)),
            )
            .register(
                PaymentMethod::VirtualAccount,
                ChannelCode::Permata,
                Arc::new(MidtransPermata),
            )
            .register(
                PaymentMethod::VirtualAccount,
                ChannelCode::Mandiri,
                Arc::new(MidtransEchannel),
            )
            .register(PaymentMethod::EWallet, ChannelCode::Gopay, Arc::new(MidtransGopay))
            .register(
                PaymentMethod::EWallet,
                ChannelCode::Shopeepay,
                Arc::new(MidtransShopeepay),
            )
            .register(
                PaymentMethod::EWallet,
                ChannelCode::Dana,
                Arc::new(MidtransSnap::new(ChannelCode::Dana, "dana")),
            )
            .register(
                PaymentMethod::Qris,
                ChannelCode::Qris,
                Arc::new(MidtransQris::new("gopay")),
            )
            .register(
                PaymentMethod::Retail,
                ChannelCode::Indomaret,
                Arc::new(MidtransCstore::new(ChannelCode::Indomaret)),
            )
            .register(
                PaymentMethod::Retail,
                ChannelCode::Alfamart,
                Arc::new(MidtransCstore::new(ChannelCode::Alfamart)),
            )
            .build(&REQUIRED_CHANNELS)?;

        Ok(Self { api, strategies })
    }

    pub fn from_env() -> PaymentResult<Self> {
        Self::new(MidtransConfig::from_env()?)
    }

    pub fn from_configuration(
        configuration: &AggregatorConfiguration,
        decryptor: &dyn SecretDecryptor,
    ) -> PaymentResult<Self> {
        Self::new(MidtransConfig::from_configuration(configuration, decryptor)?)
    }

    pub fn api(&self) -> &MidtransApi {
        &self.api
    }
}

#[async_trait]
impl PaymentAggregator for MidtransClient {
    fn name(&self) -> AggregatorName {
        AggregatorName::Midtrans
    }

    fn supports(&self, method: PaymentMethod, channel: ChannelCode) -> bool {
        self.strategies.supports(method, channel)
    }

    fn validate_request(&self, request: &PaymentRequest) -> PaymentResult<()> {
        types::gross_amount(request.amount).map(|_| ())
    }

    async fn pay(&self, request: &PaymentRequest) -> PaymentResult<JsonValue> {
        let strategy = self.strategies.get(request.method, request.channel)?;
        strategy
            .pay(&self.api, request)
            .await
            .map_err(|e| e.context("midtrans.pay"))
    }

    async fn check_status(&self, order_id: &str) -> PaymentResult<ProviderStatus> {
        self.api
            .check_status(order_id)
            .await
            .map_err(|e| e.context("midtrans.check_status"))
    }

    fn map_response_payment(
        &self,
        channel: &Channel,
        payment: &Payment,
    ) -> PaymentResult<PaymentResponse> {
        self.strategies
            .get(channel.payment_method, channel.bank_name)?
            .client_response(channel, payment)
    }

    fn map_check_status_payment(
        &self,
        payment: &Payment,
        status: &ProviderStatus,
    ) -> PaymentResult<CheckStatusPaymentResponse> {
        let canonical = map_transaction_status(&status.raw_status)?;
        Ok(check_status_response(payment, canonical, status))
    }

    fn parse_notification(&self, payload: &[u8]) -> PaymentResult<Notification> {
        let raw: JsonValue = serde_json::from_slice(payload).map_err(|e| {
            PaymentError::validation(format!("invalid midtrans notification: {}", e), "body")
        })?;
        let notification: MidtransNotification = serde_json::from_value(raw.clone())
            .map_err(|e| {
                PaymentError::validation(format!("invalid midtrans notification: {}", e), "body")
            })?;

        if !self.api.verify_signature(&notification) {
            return Err(PaymentError::validation(
                format!("invalid signature for order {}", notification.order_id),
                "signature_key",
            ));
        }

        let status = map_transaction_status(&notification.transaction_status)?;
        Ok(Notification {
            aggregator: AggregatorName::Midtrans,
            order_id: notification.order_id,
            gateway_transaction_id: notification.transaction_id,
            raw_status: notification.transaction_status,
            status,
            request_id: None,
            payload: raw,
            received_at: Utc::now(),
        })
    }

    fn acknowledge(&self, _notification: Option<&Notification>) -> WebhookAck {
        WebhookAck::json(serde_json::json!({ "status": "ok" }))
    }
}
