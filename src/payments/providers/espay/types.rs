use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::types::PaymentRequest;
use crate::payments::utils::sha256_hex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub const SUCCESS_CODE: &str = "0000";

/// `hex(sha256(UPPER("##key##part1##part2##...##")))`.
pub fn signature(key: &str, parts: &[&str]) -> String {
    let mut plain = format!("##{}##", key);
    for part in parts {
        plain.push_str(part);
        plain.push_str("##");
    }
    sha256_hex(&plain.to_uppercase())
}

/// Espay expects amounts with exactly two decimals.
pub fn format_amount(amount: Decimal) -> PaymentResult<String> {
    if amount <= Decimal::ZERO {
        return Err(PaymentError::validation(
            format!("invalid amount {}", amount),
            "amount",
        ));
    }
    if amount.normalize().scale() > 2 {
        return Err(PaymentError::validation(
            format!("amount {} has more than two decimals", amount),
            "amount",
        ));
    }
    Ok(format!("{:.2}", amount))
}

/// Fields every signed Espay request carries. Filled in by the transport.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct RequestEnvelope {
    pub rq_uuid: String,
    pub rq_datetime: String,
    pub comm_code: String,
    pub signature: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct InvoiceRequest {
    #[serde(flatten)]
    pub envelope: RequestEnvelope,
    pub order_id: String,
    pub amount: String,
    pub ccy: String,
    pub bank_code: String,
    pub remark1: String,
    pub remark2: String,
    pub remark3: String,
    pub update: String,
    pub va_expired: u32,
}

impl InvoiceRequest {
    pub fn new(request: &PaymentRequest, bank_code: &str) -> PaymentResult<Self> {
        Ok(Self {
            envelope: RequestEnvelope::default(),
            order_id: request.order_id.clone(),
            amount: format_amount(request.amount)?,
            ccy: request.currency.clone(),
            bank_code: bank_code.to_string(),
            remark1: request.customer_phone.clone().unwrap_or_default(),
            remark2: request.customer_name.trim().to_string(),
            remark3: request.customer_email.clone().unwrap_or_default(),
            update: "N".to_string(),
            va_expired: 24 * 60,
        })
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct QrisRequest {
    #[serde(flatten)]
    pub envelope: RequestEnvelope,
    pub order_id: String,
    pub amount: String,
    pub ccy: String,
    pub product_code: String,
    pub customer_id: String,
    pub description: String,
}

impl QrisRequest {
    pub fn new(request: &PaymentRequest) -> PaymentResult<Self> {
        let customer_id = request
            .customer_phone
            .clone()
            .or_else(|| request.customer_email.clone())
            .unwrap_or_else(|| request.customer_name.trim().to_string());
        Ok(Self {
            envelope: RequestEnvelope::default(),
            order_id: request.order_id.clone(),
            amount: format_amount(request.amount)?,
            ccy: request.currency.clone(),
            product_code: "QRIS".to_string(),
            customer_id,
            description: format!("Order {}", request.order_id),
        })
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StatusRequest {
    pub uuid: String,
    pub rq_datetime: String,
    pub comm_code: String,
    pub order_id: String,
    pub signature: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct InvoiceResponse {
    pub rq_uuid: String,
    pub rs_datetime: Option<String>,
    pub error_code: String,
    pub error_message: Option<String>,
    pub va_number: Option<String>,
    pub expired: Option<String>,
    pub description: Option<String>,
    pub total_amount: Option<String>,
    pub bank_code: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct QrisResponse {
    pub rq_uuid: String,
    pub error_code: String,
    pub error_message: Option<String>,
    pub qr_link: Option<String>,
    pub qr_code: Option<String>,
    pub trx_id: Option<String>,
    pub expired: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StatusResponse {
    pub rq_uuid: String,
    pub error_code: String,
    pub error_message: Option<String>,
    pub order_id: Option<String>,
    pub tx_id: Option<String>,
    pub tx_status: Option<String>,
    pub tx_reason: Option<String>,
    pub tx_date: Option<String>,
    pub payment_datetime: Option<String>,
}

/// Payment report pushed by Espay.
#[derive(Debug, Clone, Deserialize)]
pub struct EspayNotification {
    pub rq_uuid: String,
    pub rq_datetime: String,
    pub order_id: String,
    pub signature: String,
    #[serde(default)]
    pub comm_code: Option<String>,
    #[serde(default)]
    pub amount: Option<String>,
    #[serde(default)]
    pub ccy: Option<String>,
    #[serde(default)]
    pub payment_ref: Option<String>,
    #[serde(default)]
    pub payment_datetime: Option<String>,
    #[serde(default)]
    pub tx_status: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NotificationAck {
    pub rq_uuid: String,
    pub rs_datetime: String,
    pub error_code: String,
    pub error_message: String,
    pub order_id: String,
    pub reconcile_id: String,
    pub reconcile_datetime: String,
}
