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
use crate::payments::utils::{hmac_sha256_hex, secure_eq, PaymentHttpClient};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Method;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::Duration;
use strategies::SenangpayHosted;
use tracing::debug;
use types::{
    HostedPaymentQuery, HostedPaymentResponse, OrderStatusQuery, OrderStatusResponse,
    SenangpayCallback,
};

const SANDBOX_BASE_URL: &str = "https://sandbox.senangpay.my";
const PRODUCTION_BASE_URL: &str = "https://app.senangpay.my";

pub const REQUIRED_CHANNELS: [StrategyKey; 2] = [
    StrategyKey::new(PaymentMethod::OnlineBanking, ChannelCode::Fpx),
    StrategyKey::new(PaymentMethod::EWallet, ChannelCode::TouchNGo),
];

#[derive(Debug, Clone)]
pub struct SenangpayConfig {
    pub environment: ConfigValue,
    pub base_url: String,
    pub merchant_id: String,
    pub secret_key: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl Default for SenangpayConfig {
    fn default() -> Self {
        Self {
            environment: ConfigValue::Sandbox,
            base_url: SANDBOX_BASE_URL.to_string(),
            merchant_id: String::new(),
            secret_key: String::new(),
            timeout_secs: 30,
            max_retries: 3,
        }
    }
}

impl SenangpayConfig {
    pub fn from_env() -> PaymentResult<Self> {
        let merchant_id =
            std::env::var("SENANGPAY_MERCHANT_ID").map_err(|_| PaymentError::ValidationError {
                message: "SENANGPAY_MERCHANT_ID environment variable is required".to_string(),
                field: Some("SENANGPAY_MERCHANT_ID".to_string()),
            })?;
        let secret_key =
            std::env::var("SENANGPAY_SECRET_KEY").map_err(|_| PaymentError::ValidationError {
                message: "SENANGPAY_SECRET_KEY environment variable is required".to_string(),
                field: Some("SENANGPAY_SECRET_KEY".to_string()),
            })?;
        let environment: ConfigValue = std::env::var("SENANGPAY_ENVIRONMENT")
            .unwrap_or_default()
            .parse()?;

        Ok(Self {
            environment,
            base_url: std::env::var("SENANGPAY_BASE_URL")
                .unwrap_or_else(|_| default_base_url(environment).to_string()),
            timeout_secs: std::env::var("SENANGPAY_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(30),
            max_retries: std::env::var("SENANGPAY_MAX_RETRIES")
                .ok()
                .and_then(|v| v.parse::<u32>().ok())
                .unwrap_or(3),
            merchant_id,
            secret_key,
        })
    }

    pub fn from_configuration(
        configuration: &AggregatorConfiguration,
        decryptor: &dyn SecretDecryptor,
    ) -> PaymentResult<Self> {
        let resolved = configuration.resolve(decryptor)?;
        let merchant_id = resolved.merchant_id.clone().ok_or_else(|| {
            PaymentError::configuration("senangpay configuration has no merchant id")
        })?;
        // The hosted page lives on the checkout URL when one is configured.
        let base_url = resolved
            .checkout_url
            .clone()
            .filter(|url| !url.is_empty())
            .unwrap_or(resolved.base_url);
        Ok(Self {
            environment: resolved.environment,
            base_url: if base_url.is_empty() {
                default_base_url(resolved.environment).to_string()
            } else {
                base_url
            },
            merchant_id,
            secret_key: resolved.server_key,
            ..Self::default()
        })
    }
}

fn default_base_url(environment: ConfigValue) -> &'static str {
    if environment.is_production() {
        PRODUCTION_BASE_URL
    } else {
        SANDBOX_BASE_URL
    }
}

/// Callback `status_id`.
pub fn map_status_id(status_id: &str) -> PaymentStatus {
    match status_id.trim() {
        "1" => PaymentStatus::Success,
        "0" => PaymentStatus::Failed,
        _ => PaymentStatus::Pending,
    }
}

/// Order status query `payment_info.status`.
pub fn map_order_status(status: &str) -> PaymentStatus {
    match status.trim().to_lowercase().as_str() {
        "paid" => PaymentStatus::Success,
        "failed" => PaymentStatus::Failed,
        _ => PaymentStatus::Pending,
    }
}

pub struct SenangpayApi {
    config: SenangpayConfig,
    http: PaymentHttpClient,
}

impl SenangpayApi {
    pub fn new(config: SenangpayConfig) -> PaymentResult<Self> {
        if config.merchant_id.trim().is_empty() || config.secret_key.trim().is_empty() {
            return Err(PaymentError::configuration(
                "senangpay merchant id and secret key are required",
            ));
        }
        let http = PaymentHttpClient::new(
            AggregatorName::Senangpay,
            Duration::from_secs(config.timeout_secs),
            config.max_retries,
        )?;
        Ok(Self { config, http })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn hash(&self, payload: &str) -> PaymentResult<String> {
        hmac_sha256_hex(&self.config.secret_key, payload)
            .ok_or_else(|| PaymentError::configuration("senangpay secret key is not usable"))
    }

    /// Sign the hosted page query locally. Nothing is sent to senangPay
    /// until the customer opens the URL.
    pub fn create_payment(&self, mut query: HostedPaymentQuery) -> PaymentResult<JsonValue> {
        query.hash = self.hash(&format!(
            "{}{}{}{}",
            self.config.secret_key, query.detail, query.amount, query.order_id
        ))?;
        let encoded = serde_urlencoded::to_string(&query).map_err(|e| {
            PaymentError::internal(format!("failed to encode senangpay query: {}", e))
        })?;
        let response = HostedPaymentResponse {
            payment_url: format!(
                "{}?{}",
                self.endpoint(&format!("/payment/{}", self.config.merchant_id)),
                encoded
            ),
            order_id: query.order_id,
            hash: query.hash,
        };
        debug!(order_id = %response.order_id, "senangpay payment page signed");
        Ok(serde_json::to_value(response)?)
    }

    pub async fn check_status(&self, order_id: &str) -> PaymentResult<ProviderStatus> {
        let query = OrderStatusQuery {
            merchant_id: &self.config.merchant_id,
            order_id,
            hash: self.hash(&format!(
                "{}{}{}",
                self.config.merchant_id, self.config.secret_key, order_id
            ))?,
        };
        let encoded = serde_urlencoded::to_string(&query).map_err(|e| {
            PaymentError::internal(format!("failed to encode senangpay query: {}", e))
        })?;
        let raw: JsonValue = self
            .http
            .request_json(
                Method::GET,
                &format!("{}?{}", self.endpoint("/apiv1/query_order_status"), encoded),
                None,
                None,
                &[("Accept", "application/json")],
            )
            .await?;
        provider_status(order_id, raw)
    }

    /// `hmac_sha256(secret, secret + status_id + order_id + transaction_id + msg)`.
    pub fn verify_callback(&self, callback: &SenangpayCallback) -> bool {
        let expected = match self.hash(&format!(
            "{}{}{}{}{}",
            self.config.secret_key,
            callback.status_id,
            callback.order_id,
            callback.transaction_id,
            callback.msg
        )) {
            Ok(hash) => hash,
            Err(_) => return false,
        };
        secure_eq(
            expected.as_bytes(),
            callback.hash.to_lowercase().as_bytes(),
        )
    }
}

fn provider_status(order_id: &str, raw: JsonValue) -> PaymentResult<ProviderStatus> {
    let response: OrderStatusResponse = serde_json::from_value(raw.clone())?;
    if !response.status {
        return Err(PaymentError::ProviderError {
            provider: AggregatorName::Senangpay.to_string(),
            message: response
                .msg
                .unwrap_or_else(|| "order status query failed".to_string()),
            provider_code: None,
            retryable: false,
        });
    }
    let info = response
        .data
        .into_iter()
        .next()
        .map(|entry| entry.payment_info)
        .ok_or_else(|| PaymentError::NotFound {
            entity: "senangpay order".to_string(),
            id: order_id.to_string(),
        })?;

    Ok(ProviderStatus {
        order_id: order_id.to_string(),
        transaction_id: info.transaction_reference,
        raw_status: info.status,
        status_code: None,
        status_message: response.msg,
        transaction_time: info.transaction_date,
        settlement_time: None,
        raw,
    })
}

pub struct SenangpayClient {
    api: SenangpayApi,
    strategies: StrategyRegistry<SenangpayApi>,
}

impl SenangpayClient {
    pub fn new(config: SenangpayConfig) -> PaymentResult<Self> {
        let api = SenangpayApi::new(config)?;
        let strategies = StrategyRegistry::builder(AggregatorName::Senangpay)
            .register(
                PaymentMethod::OnlineBanking,
                ChannelCode::Fpx,
                Arc::new(SenangpayHosted::new(ChannelCode::Fpx)),
            )
            .register(
                PaymentMethod::EWallet,
                ChannelCode::TouchNGo,
                Arc::new(SenangpayHosted::new(ChannelCode::TouchNGo)),
            )
            .build(&REQUIRED_CHANNELS)?;
        Ok(Self { api, strategies })
    }

    pub fn from_env() -> PaymentResult<Self> {
        Self::new(SenangpayConfig::from_env()?)
    }

    pub fn from_configuration(
        configuration: &AggregatorConfiguration,
        decryptor: &dyn SecretDecryptor,
    ) -> PaymentResult<Self> {
        Self::new(SenangpayConfig::from_configuration(configuration, decryptor)?)
    }
}

#[async_trait]
impl PaymentAggregator for SenangpayClient {
    fn name(&self) -> AggregatorName {
        AggregatorName::Senangpay
    }

    fn supports(&self, method: PaymentMethod, channel: ChannelCode) -> bool {
        self.strategies.supports(method, channel)
    }

    fn validate_request(&self, request: &PaymentRequest) -> PaymentResult<()> {
        types::format_amount(request.amount).map(|_| ())
    }

    async fn pay(&self, request: &PaymentRequest) -> PaymentResult<JsonValue> {
        let strategy = self.strategies.get(request.method, request.channel)?;
        strategy
            .pay(&self.api, request)
            .await
            .map_err(|e| e.context("senangpay.pay"))
    }

    async fn check_status(&self, order_id: &str) -> PaymentResult<ProviderStatus> {
        self.api
            .check_status(order_id)
            .await
            .map_err(|e| e.context("senangpay.check_status"))
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
        Ok(check_status_response(
            payment,
            map_order_status(&status.raw_status),
            status,
        ))
    }

    fn parse_notification(&self, payload: &[u8]) -> PaymentResult<Notification> {
        let callback: SenangpayCallback = serde_urlencoded::from_bytes(payload).map_err(|e| {
            PaymentError::validation(format!("invalid senangpay callback: {}", e), "body")
        })?;
        if !self.api.verify_callback(&callback) {
            return Err(PaymentError::validation(
                format!("invalid hash for order {}", callback.order_id),
                "hash",
            ));
        }

        let payload = serde_json::to_value(&callback)?;
        Ok(Notification {
            aggregator: AggregatorName::Senangpay,
            status: map_status_id(&callback.status_id),
            order_id: callback.order_id,
            gateway_transaction_id: Some(callback.transaction_id).filter(|id| !id.is_empty()),
            raw_status: callback.status_id,
            request_id: None,
            payload,
            received_at: Utc::now(),
        })
    }

    fn acknowledge(&self, _notification: Option<&Notification>) -> WebhookAck {
        WebhookAck::text("OK")
    }
}
