use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::types::PaymentRequest;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// senangPay takes ringgit amounts with two decimals.
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

/// Query string of the hosted payment page. Field order is the order
/// senangPay documents.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct HostedPaymentQuery {
    pub detail: String,
    pub amount: String,
    pub order_id: String,
    pub hash: String,
    pub name: String,
    pub email: String,
    pub phone: String,
}

impl HostedPaymentQuery {
    pub fn new(request: &PaymentRequest) -> PaymentResult<Self> {
        Ok(Self {
            detail: format!("Payment_for_order_{}", request.order_id),
            amount: format_amount(request.amount)?,
            order_id: request.order_id.clone(),
            hash: String::new(),
            name: request.customer_name.trim().to_string(),
            email: request.customer_email.clone().unwrap_or_default(),
            phone: request.customer_phone.clone().unwrap_or_default(),
        })
    }
}

/// What we store as the gateway response: no HTTP call is made, the page
/// URL is signed locally.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HostedPaymentResponse {
    pub payment_url: String,
    pub order_id: String,
    pub hash: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderStatusQuery<'a> {
    pub merchant_id: &'a str,
    pub order_id: &'a str,
    pub hash: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PaymentInfo {
    pub transaction_reference: Option<String>,
    pub payment_mode: Option<String>,
    pub transaction_date: Option<String>,
    pub status: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OrderStatusEntry {
    pub payment_info: PaymentInfo,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OrderStatusResponse {
    pub status: bool,
    pub msg: Option<String>,
    pub data: Vec<OrderStatusEntry>,
}

/// Form-encoded callback posted to the return/callback URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SenangpayCallback {
    pub status_id: String,
    pub order_id: String,
    pub transaction_id: String,
    pub msg: String,
    pub hash: String,
}
