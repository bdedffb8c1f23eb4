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
use crate::payments::utils::{secure_eq, PaymentHttpClient};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Method;
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::Duration;
use strategies::{EspayQris, EspayVirtualAccount};
use tracing::{info, warn};
use types::{
    signature, EspayNotification, InvoiceRequest, NotificationAck, QrisRequest, RequestEnvelope,
    StatusRequest, StatusResponse, SUCCESS_CODE,
};
use uuid::Uuid;

const SANDBOX_BASE_URL: &str = "https://sandbox-api.espay.id";
const PRODUCTION_BASE_URL: &str = "https://api.espay.id";
const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub const REQUIRED_CHANNELS: [StrategyKey; 6] = [
    StrategyKey::new(PaymentMethod::VirtualAccount, ChannelCode::Bca),
    StrategyKey::new(PaymentMethod::VirtualAccount, ChannelCode::Bni),
    StrategyKey::new(PaymentMethod::VirtualAccount, ChannelCode::Bri),
    StrategyKey::new(PaymentMethod::VirtualAccount, ChannelCode::Mandiri),
    StrategyKey::new(PaymentMethod::VirtualAccount, ChannelCode::Permata),
    StrategyKey::new(PaymentMethod::Qris, ChannelCode::Qris),
];

#[derive(Debug, Clone)]
pub struct EspayConfig {
    pub environment: ConfigValue,
    pub base_url: String,
    pub comm_code: String,
    pub signature_key: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl Default for EspayConfig {
    fn default() -> Self {
        Self {
            environment: ConfigValue::Sandbox,
            base_url: SANDBOX_BASE_URL.to_string(),
            comm_code: String::new(),
            signature_key: String::new(),
            api_key: None,
            timeout_secs: 30,
            max_retries: 3,
        }
    }
}

impl EspayConfig {
    pub fn from_env() -> PaymentResult<Self> {
        let signature_key =
            std::env::var("ESPAY_SIGNATURE_KEY").map_err(|_| PaymentError::ValidationError {
                message: "ESPAY_SIGNATURE_KEY environment variable is required".to_string(),
                field: Some("ESPAY_SIGNATURE_KEY".to_string()),
            })?;
        let comm_code =
            std::env::var("ESPAY_COMM_CODE").map_err(|_| PaymentError::ValidationError {
                message: "ESPAY_COMM_CODE environment variable is required".to_string(),
                field: Some("ESPAY_COMM_CODE".to_string()),
            })?;
        let environment: ConfigValue = std::env::var("ESPAY_ENVIRONMENT")
            .unwrap_or_default()
            .parse()?;

        Ok(Self {
            environment,
            base_url: std::env::var("ESPAY_BASE_URL")
                .unwrap_or_else(|_| default_base_url(environment).to_string()),
            api_key: std::env::var("ESPAY_API_KEY").ok(),
            timeout_secs: std::env::var("ESPAY_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(30),
            max_retries: std::env::var("ESPAY_MAX_RETRIES")
                .ok()
                .and_then(|v| v.parse::<u32>().ok())
                .unwrap_or(3),
            comm_code,
            signature_key,
        })
    }

    /// The merchant id is the Espay community code; the server key is the
    /// signature key.
    pub fn from_configuration(
        configuration: &AggregatorConfiguration,
        decryptor: &dyn SecretDecryptor,
    ) -> PaymentResult<Self> {
        let resolved = configuration.resolve(decryptor)?;
        let comm_code = resolved.merchant_id.clone().ok_or_else(|| {
            PaymentError::configuration("espay configuration has no merchant id (comm code)")
        })?;
        Ok(Self {
            environment: resolved.environment,
            base_url: if resolved.base_url.is_empty() {
                default_base_url(resolved.environment).to_string()
            } else {
                resolved.base_url
            },
            comm_code,
            signature_key: resolved.server_key,
            api_key: resolved.client_key,
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

/// `tx_status` vocabulary to the canonical status.
pub fn map_tx_status(raw: &str) -> PaymentStatus {
    match raw.trim().to_uppercase().as_str() {
        "S" => PaymentStatus::Success,
        "F" => PaymentStatus::Failed,
        "EX" => PaymentStatus::Expired,
        "C" => PaymentStatus::Cancelled,
        "IP" | "SP" => PaymentStatus::Pending,
        other => {
            warn!(raw_status = %other, "unrecognized espay status, treating as pending");
            PaymentStatus::Pending
        }
    }
}

fn now() -> String {
    Utc::now().format(DATETIME_FORMAT).to_string()
}

pub struct EspayApi {
    config: EspayConfig,
    http: PaymentHttpClient,
}

impl EspayApi {
    pub fn new(config: EspayConfig) -> PaymentResult<Self> {
        if config.signature_key.trim().is_empty() || config.comm_code.trim().is_empty() {
            return Err(PaymentError::configuration(
                "espay signature key and comm code are required",
            ));
        }
        let http = PaymentHttpClient::new(
            AggregatorName::Espay,
            Duration::from_secs(config.timeout_secs),
            config.max_retries,
        )?;
        Ok(Self { config, http })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn envelope(&self, order_id: &str, amount: &str, ccy: &str, action: &str) -> RequestEnvelope {
        let rq_uuid = Uuid::new_v4().to_string();
        let rq_datetime = now();
        let signature = signature(
            &self.config.signature_key,
            &[
                rq_uuid.as_str(),
                rq_datetime.as_str(),
                order_id,
                amount,
                ccy,
                self.config.comm_code.as_str(),
                action,
            ],
        );
        RequestEnvelope {
            rq_uuid,
            rq_datetime,
            comm_code: self.config.comm_code.clone(),
            signature,
        }
    }

    /// POST a signed body and hand back whatever Espay answered with on
    /// 2xx. The `error_code` check belongs to the channel strategy.
    async fn post<T: Serialize>(&self, path: &str, body: &T) -> PaymentResult<JsonValue> {
        let payload = serde_json::to_value(body)?;
        let mut headers = vec![("Accept", "application/json")];
        if let Some(api_key) = self.config.api_key.as_deref() {
            headers.push(("X-Api-Key", api_key));
        }
        let reply = self
            .http
            .send(Method::POST, &self.endpoint(path), None, Some(&payload), &headers)
            .await?;
        if !reply.status.is_success() {
            return Err(reply.into_error(AggregatorName::Espay));
        }
        reply.decode(AggregatorName::Espay)
    }

    pub async fn send_invoice(&self, mut invoice: InvoiceRequest) -> PaymentResult<JsonValue> {
        invoice.envelope =
            self.envelope(&invoice.order_id, &invoice.amount, &invoice.ccy, "SENDINVOICE");
        let body = self.post("/rest/merchantpg/sendinvoice", &invoice).await?;
        info!(
            order_id = %invoice.order_id,
            bank_code = %invoice.bank_code,
            "espay invoice submitted"
        );
        Ok(body)
    }

    pub async fn push_qris(&self, mut qris: QrisRequest) -> PaymentResult<JsonValue> {
        qris.envelope = self.envelope(&qris.order_id, &qris.amount, &qris.ccy, "PUSHTOPAY");
        let body = self.post("/rest/digitalpay/pushtopay", &qris).await?;
        info!(order_id = %qris.order_id, "espay qris submitted");
        Ok(body)
    }

    pub async fn check_status(&self, order_id: &str) -> PaymentResult<ProviderStatus> {
        let rq_datetime = now();
        let request = StatusRequest {
            uuid: Uuid::new_v4().to_string(),
            signature: signature(
                &self.config.signature_key,
                &[rq_datetime.as_str(), order_id, "CHECKSTATUS"],
            ),
            rq_datetime,
            comm_code: self.config.comm_code.clone(),
            order_id: order_id.to_string(),
        };
        let raw = self.post("/rest/merchant/status", &request).await?;
        provider_status(order_id, raw)
    }

    /// Payment report signature: `##key##rq_datetime##order_id##PAYMENTREPORT##`.
    pub fn verify_signature(&self, notification: &EspayNotification) -> bool {
        let expected = signature(
            &self.config.signature_key,
            &[
                notification.rq_datetime.as_str(),
                notification.order_id.as_str(),
                "PAYMENTREPORT",
            ],
        );
        secure_eq(
            expected.as_bytes(),
            notification.signature.to_lowercase().as_bytes(),
        )
    }
}

fn provider_status(order_id: &str, raw: JsonValue) -> PaymentResult<ProviderStatus> {
    let status: StatusResponse = serde_json::from_value(raw.clone())?;
    if status.error_code != SUCCESS_CODE {
        return Err(PaymentError::ProviderError {
            provider: AggregatorName::Espay.to_string(),
            message: status
                .error_message
                .unwrap_or_else(|| "status inquiry failed".to_string()),
            provider_code: Some(status.error_code),
            retryable: false,
        });
    }
    let raw_status = status
        .tx_status
        .clone()
        .ok_or_else(|| PaymentError::ProviderError {
            provider: AggregatorName::Espay.to_string(),
            message: "status response has no tx_status".to_string(),
            provider_code: Some(status.error_code.clone()),
            retryable: false,
        })?;

    Ok(ProviderStatus {
        order_id: status.order_id.unwrap_or_else(|| order_id.to_string()),
        transaction_id: status.tx_id,
        raw_status,
        status_code: Some(status.error_code),
        status_message: status.tx_reason.or(status.error_message),
        transaction_time: status.tx_date,
        settlement_time: status.payment_datetime,
        raw,
    })
}

pub struct EspayClient {
    api: EspayApi,
    strategies: StrategyRegistry<EspayApi>,
}

impl EspayClient {
    pub fn new(config: EspayConfig) -> PaymentResult<Self> {
        let api = EspayApi::new(config)?;
        let mut builder = StrategyRegistry::builder(AggregatorName::Espay);
        for bank in [
            ChannelCode::Bca,
            ChannelCode::Bni,
            ChannelCode::Bri,
            ChannelCode::Mandiri,
            ChannelCode::Permata,
        ] {
            builder = builder.register(
                PaymentMethod::VirtualAccount,
                bank,
                Arc::new(EspayVirtualAccount::new(bank)?),
            );
        }
        let strategies = builder
            .register(PaymentMethod::Qris, ChannelCode::Qris, Arc::new(EspayQris))
            .build(&REQUIRED_CHANNELS)?;

        Ok(Self { api, strategies })
    }

    pub fn from_env() -> PaymentResult<Self> {
        Self::new(EspayConfig::from_env()?)
    }

    pub fn from_configuration(
        configuration: &AggregatorConfiguration,
        decryptor: &dyn SecretDecryptor,
    ) -> PaymentResult<Self> {
        Self::new(EspayConfig::from_configuration(configuration, decryptor)?)
    }
}

#[async_trait]
impl PaymentAggregator for EspayClient {
    fn name(&self) -> AggregatorName {
        AggregatorName::Espay
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
            .map_err(|e| e.context("espay.pay"))
    }

    async fn check_status(&self, order_id: &str) -> PaymentResult<ProviderStatus> {
        self.api
            .check_status(order_id)
            .await
            .map_err(|e| e.context("espay.check_status"))
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
            map_tx_status(&status.raw_status),
            status,
        ))
    }

    fn parse_notification(&self, payload: &[u8]) -> PaymentResult<Notification> {
        let raw: JsonValue = serde_json::from_slice(payload).map_err(|e| {
            PaymentError::validation(format!("invalid espay notification: {}", e), "body")
        })?;
        let notification: EspayNotification =
            serde_json::from_value(raw.clone()).map_err(|e| {
                PaymentError::validation(format!("invalid espay notification: {}", e), "body")
            })?;

        if !self.api.verify_signature(&notification) {
            return Err(PaymentError::validation(
                format!("invalid signature for order {}", notification.order_id),
                "signature",
            ));
        }

        // A payment report without tx_status is only sent for a settled payment.
        let raw_status = notification
            .tx_status
            .clone()
            .unwrap_or_else(|| "S".to_string());
        Ok(Notification {
            aggregator: AggregatorName::Espay,
            order_id: notification.order_id,
            gateway_transaction_id: notification.payment_ref,
            status: map_tx_status(&raw_status),
            raw_status,
            request_id: Some(notification.rq_uuid),
            payload: raw,
            received_at: Utc::now(),
        })
    }

    fn acknowledge(&self, notification: Option<&Notification>) -> WebhookAck {
        let timestamp = now();
        let ack = NotificationAck {
            rq_uuid: notification
                .and_then(|n| n.request_id.clone())
                .unwrap_or_default(),
            rs_datetime: timestamp.clone(),
            error_code: SUCCESS_CODE.to_string(),
            error_message: "Success".to_string(),
            order_id: notification.map(|n| n.order_id.clone()).unwrap_or_default(),
            reconcile_id: Uuid::new_v4().to_string(),
            reconcile_datetime: timestamp,
        };
        match serde_json::to_value(&ack) {
            Ok(body) => WebhookAck::json(body),
            Err(e) => {
                warn!(error = %e, "failed to encode espay acknowledgement");
                WebhookAck::json(serde_json::json!({
                    "error_code": SUCCESS_CODE,
                    "error_message": "Success"
                }))
            }
        }
    }
}
