use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::strategy::split_customer_name;
use crate::payments::types::{PaymentAction, PaymentRequest};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub const STATUS_CREATED: &str = "201";

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TransactionDetails {
    pub order_id: String,
    pub gross_amount: i64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CustomerDetails {
    pub first_name: String,
    pub last_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

impl CustomerDetails {
    pub fn from_request(request: &PaymentRequest) -> Self {
        let (first_name, last_name) = split_customer_name(&request.customer_name);
        Self {
            first_name,
            last_name,
            email: request.customer_email.clone(),
            phone: request.customer_phone.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct BankTransferDetails {
    pub bank: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct EchannelDetails {
    pub bill_info1: String,
    pub bill_info2: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct GopayDetails {
    pub enable_callback: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ShopeepayDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct QrisDetails {
    pub acquirer: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CstoreDetails {
    pub store: String,
    pub message: String,
}

/// Core API `/v2/charge` body. Exactly one of the channel sections is set.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ChargeRequest {
    pub payment_type: String,
    pub transaction_details: TransactionDetails,
    pub customer_details: CustomerDetails,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bank_transfer: Option<BankTransferDetails>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub echannel: Option<EchannelDetails>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gopay: Option<GopayDetails>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shopeepay: Option<ShopeepayDetails>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qris: Option<QrisDetails>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cstore: Option<CstoreDetails>,
}

impl ChargeRequest {
    pub fn new(payment_type: &str, request: &PaymentRequest) -> PaymentResult<Self> {
        Ok(Self {
            payment_type: payment_type.to_string(),
            transaction_details: TransactionDetails {
                order_id: request.order_id.clone(),
                gross_amount: gross_amount(request.amount)?,
            },
            customer_details: CustomerDetails::from_request(request),
            bank_transfer: None,
            echannel: None,
            gopay: None,
            shopeepay: None,
            qris: None,
            cstore: None,
        })
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SnapCallbacks {
    pub finish: String,
}

/// Snap `/snap/v1/transactions` body for hosted checkout.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SnapRequest {
    pub transaction_details: TransactionDetails,
    pub customer_details: CustomerDetails,
    pub enabled_payments: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callbacks: Option<SnapCallbacks>,
}

/// Midtrans only settles IDR in whole rupiah.
pub fn gross_amount(amount: Decimal) -> PaymentResult<i64> {
    if !amount.fract().is_zero() {
        return Err(PaymentError::validation(
            format!("midtrans requires a whole amount, got {}", amount),
            "amount",
        ));
    }
    amount
        .to_i64()
        .filter(|value| *value > 0)
        .ok_or_else(|| PaymentError::validation(format!("invalid amount {}", amount), "amount"))
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct VaNumber {
    pub bank: String,
    pub va_number: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Action {
    pub name: String,
    pub method: String,
    pub url: String,
}

impl From<&Action> for PaymentAction {
    fn from(action: &Action) -> Self {
        PaymentAction {
            name: action.name.clone(),
            method: action.method.clone(),
            url: action.url.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ChargeResponse {
    pub status_code: String,
    pub status_message: Option<String>,
    pub validation_messages: Vec<String>,
    pub transaction_id: Option<String>,
    pub order_id: Option<String>,
    pub gross_amount: Option<String>,
    pub payment_type: Option<String>,
    pub transaction_time: Option<String>,
    pub transaction_status: Option<String>,
    pub expiry_time: Option<String>,
    pub va_numbers: Vec<VaNumber>,
    pub permata_va_number: Option<String>,
    pub bill_key: Option<String>,
    pub biller_code: Option<String>,
    pub actions: Vec<Action>,
    pub payment_code: Option<String>,
    pub store: Option<String>,
}

impl ChargeResponse {
    pub fn is_created(&self) -> bool {
        self.status_code == STATUS_CREATED
    }

    pub fn failure_message(&self) -> String {
        if !self.validation_messages.is_empty() {
            return self.validation_messages.join("; ");
        }
        self.status_message
            .clone()
            .unwrap_or_else(|| format!("midtrans returned status code {}", self.status_code))
    }

    pub fn payment_actions(&self) -> Vec<PaymentAction> {
        self.actions.iter().map(PaymentAction::from).collect()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SnapResponse {
    pub token: String,
    pub redirect_url: String,
    pub error_messages: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TransactionStatusResponse {
    pub status_code: String,
    pub status_message: Option<String>,
    pub transaction_id: Option<String>,
    pub order_id: Option<String>,
    pub transaction_status: Option<String>,
    pub transaction_time: Option<String>,
    pub settlement_time: Option<String>,
    pub fraud_status: Option<String>,
    pub gross_amount: Option<String>,
}

/// HTTP notification pushed by Midtrans.
#[derive(Debug, Clone, Deserialize)]
pub struct MidtransNotification {
    pub order_id: String,
    pub status_code: String,
    pub gross_amount: String,
    pub signature_key: String,
    pub transaction_status: String,
    #[serde(default)]
    pub transaction_id: Option<String>,
    #[serde(default)]
    pub transaction_time: Option<String>,
    #[serde(default)]
    pub settlement_time: Option<String>,
    #[serde(default)]
    pub payment_type: Option<String>,
    #[serde(default)]
    pub fraud_status: Option<String>,
    #[serde(default)]
    pub status_message: Option<String>,
}
