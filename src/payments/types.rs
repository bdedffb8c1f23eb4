use crate::payments::error::PaymentError;
use crate::payments::fee::FeeCalculator;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AggregatorName {
    Midtrans,
    Espay,
    Senangpay,
}

impl AggregatorName {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregatorName::Midtrans => "midtrans",
            AggregatorName::Espay => "espay",
            AggregatorName::Senangpay => "senangpay",
        }
    }
}

impl std::fmt::Display for AggregatorName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AggregatorName {
    type Err = PaymentError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "midtrans" => Ok(AggregatorName::Midtrans),
            "espay" => Ok(AggregatorName::Espay),
            "senangpay" | "senang_pay" => Ok(AggregatorName::Senangpay),
            _ => Err(PaymentError::validation(
                format!("unsupported aggregator: {}", value),
                "aggregator",
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    VirtualAccount,
    EWallet,
    Qris,
    Retail,
    OnlineBanking,
    KWallet,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::VirtualAccount => "VIRTUAL_ACCOUNT",
            PaymentMethod::EWallet => "E_WALLET",
            PaymentMethod::Qris => "QRIS",
            PaymentMethod::Retail => "RETAIL",
            PaymentMethod::OnlineBanking => "ONLINE_BANKING",
            PaymentMethod::KWallet => "K_WALLET",
        }
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = PaymentError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_uppercase().as_str() {
            "VIRTUAL_ACCOUNT" => Ok(PaymentMethod::VirtualAccount),
            "E_WALLET" | "EWALLET" => Ok(PaymentMethod::EWallet),
            "QRIS" => Ok(PaymentMethod::Qris),
            "RETAIL" => Ok(PaymentMethod::Retail),
            "ONLINE_BANKING" => Ok(PaymentMethod::OnlineBanking),
            "K_WALLET" | "KWALLET" => Ok(PaymentMethod::KWallet),
            _ => Err(PaymentError::validation(
                format!("unsupported payment method: {}", value),
                "payment_method",
            )),
        }
    }
}

/// Bank, wallet or outlet a channel settles through.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChannelCode {
    Bca,
    Bni,
    Bri,
    Mandiri,
    Permata,
    Cimb,
    Gopay,
    Shopeepay,
    Dana,
    Qris,
    Indomaret,
    Alfamart,
    Fpx,
    TouchNGo,
    KWallet,
}

impl ChannelCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelCode::Bca => "BCA",
            ChannelCode::Bni => "BNI",
            ChannelCode::Bri => "BRI",
            ChannelCode::Mandiri => "MANDIRI",
            ChannelCode::Permata => "PERMATA",
            ChannelCode::Cimb => "CIMB",
            ChannelCode::Gopay => "GOPAY",
            ChannelCode::Shopeepay => "SHOPEEPAY",
            ChannelCode::Dana => "DANA",
            ChannelCode::Qris => "QRIS",
            ChannelCode::Indomaret => "INDOMARET",
            ChannelCode::Alfamart => "ALFAMART",
            ChannelCode::Fpx => "FPX",
            ChannelCode::TouchNGo => "TOUCH_N_GO",
            ChannelCode::KWallet => "K_WALLET",
        }
    }

    /// Lowercase identifier most aggregators use on the wire.
    pub fn wire_name(&self) -> String {
        self.as_str().to_lowercase()
    }
}

impl std::fmt::Display for ChannelCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ChannelCode {
    type Err = PaymentError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_uppercase().as_str() {
            "BCA" => Ok(ChannelCode::Bca),
            "BNI" => Ok(ChannelCode::Bni),
            "BRI" => Ok(ChannelCode::Bri),
            "MANDIRI" => Ok(ChannelCode::Mandiri),
            "PERMATA" => Ok(ChannelCode::Permata),
            "CIMB" => Ok(ChannelCode::Cimb),
            "GOPAY" => Ok(ChannelCode::Gopay),
            "SHOPEEPAY" => Ok(ChannelCode::Shopeepay),
            "DANA" => Ok(ChannelCode::Dana),
            "QRIS" => Ok(ChannelCode::Qris),
            "INDOMARET" => Ok(ChannelCode::Indomaret),
            "ALFAMART" => Ok(ChannelCode::Alfamart),
            "FPX" => Ok(ChannelCode::Fpx),
            "TOUCH_N_GO" | "TNG" => Ok(ChannelCode::TouchNGo),
            "K_WALLET" | "KWALLET" => Ok(ChannelCode::KWallet),
            _ => Err(PaymentError::validation(
                format!("unsupported channel: {}", value),
                "bank_name",
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Success,
    Failed,
    Cancelled,
    Expired,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Success => "SUCCESS",
            PaymentStatus::Failed => "FAILED",
            PaymentStatus::Cancelled => "CANCELLED",
            PaymentStatus::Expired => "EXPIRED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }

    /// Only `PENDING` may move, and only to a terminal state.
    pub fn can_transition_to(&self, target: PaymentStatus) -> bool {
        *self == PaymentStatus::Pending && target.is_terminal()
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = PaymentError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_uppercase().as_str() {
            "PENDING" => Ok(PaymentStatus::Pending),
            "SUCCESS" => Ok(PaymentStatus::Success),
            "FAILED" => Ok(PaymentStatus::Failed),
            "CANCELLED" => Ok(PaymentStatus::Cancelled),
            "EXPIRED" => Ok(PaymentStatus::Expired),
            _ => Err(PaymentError::internal(format!(
                "unknown stored payment status: {}",
                value
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum FeeType {
    #[serde(rename = "none")]
    None,
    #[serde(rename = "fixed")]
    Fixed,
    #[serde(rename = "percentage")]
    Percentage,
    #[serde(rename = "fixed+percentage")]
    FixedPercentage,
}

impl FeeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeeType::None => "none",
            FeeType::Fixed => "fixed",
            FeeType::Percentage => "percentage",
            FeeType::FixedPercentage => "fixed+percentage",
        }
    }
}

impl FromStr for FeeType {
    type Err = PaymentError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "none" | "" => Ok(FeeType::None),
            "fixed" => Ok(FeeType::Fixed),
            "percentage" => Ok(FeeType::Percentage),
            "fixed+percentage" | "fixed_percentage" => Ok(FeeType::FixedPercentage),
            _ => Err(PaymentError::validation(
                format!("unsupported fee type: {}", value),
                "fee_type",
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    pub id: Uuid,
    pub payment_method: PaymentMethod,
    pub bank_name: ChannelCode,
    pub aggregator: Option<AggregatorName>,
    pub currency: String,
    pub fee_type: FeeType,
    pub fee_fixed: Option<Decimal>,
    pub fee_percentage_basis_points: Option<u32>,
    pub product_name: String,
    pub product_code: Option<String>,
    pub bank_code: Option<String>,
    pub instruction: Option<String>,
    pub is_active: bool,
}

impl Channel {
    pub fn validate_fee_config(&self) -> Result<(), PaymentError> {
        let needs_fixed = matches!(self.fee_type, FeeType::Fixed | FeeType::FixedPercentage);
        let needs_percentage =
            matches!(self.fee_type, FeeType::Percentage | FeeType::FixedPercentage);

        if needs_fixed && self.fee_fixed.is_none() {
            return Err(PaymentError::validation(
                format!("channel {} requires fee_fixed", self.id),
                "fee_fixed",
            ));
        }
        if needs_percentage && self.fee_percentage_basis_points.is_none() {
            return Err(PaymentError::validation(
                format!("channel {} requires fee_percentage", self.id),
                "fee_percentage",
            ));
        }
        if let Some(fixed) = self.fee_fixed {
            if fixed.is_sign_negative() {
                return Err(PaymentError::validation(
                    "fee_fixed cannot be negative",
                    "fee_fixed",
                ));
            }
        }
        Ok(())
    }

    /// Admin fee charged on top of `amount` for this channel.
    pub fn fee_for(&self, amount: Decimal) -> Decimal {
        let fixed = self.fee_fixed.unwrap_or(Decimal::ZERO);
        let percentage = || {
            let (_, fee) = FeeCalculator::calculate(
                amount,
                self.fee_percentage_basis_points.unwrap_or_default(),
            );
            fee
        };
        match self.fee_type {
            FeeType::None => Decimal::ZERO,
            FeeType::Fixed => fixed,
            FeeType::Percentage => percentage(),
            FeeType::FixedPercentage => fixed + percentage(),
        }
    }

    pub fn is_wallet(&self) -> bool {
        self.payment_method == PaymentMethod::KWallet
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: Uuid,
    pub transaction_id: Uuid,
    pub order_id: String,
    pub customer_id: Uuid,
    pub customer: Customer,
    pub channel_id: Uuid,
    pub payment_method: PaymentMethod,
    pub aggregator: Option<AggregatorName>,
    pub amount: Decimal,
    pub fee_amount: Decimal,
    pub total_amount: Decimal,
    pub currency: String,
    pub status: PaymentStatus,
    pub gateway_transaction_id: Option<String>,
    pub gateway_response: Option<JsonValue>,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub expired_at: Option<DateTime<Utc>>,
}

impl Payment {
    pub fn gateway_response(&self) -> Result<&JsonValue, PaymentError> {
        self.gateway_response.as_ref().ok_or_else(|| {
            PaymentError::internal(format!(
                "payment {} has no stored gateway response",
                self.order_id
            ))
        })
    }
}

/// Per-leg charge instruction handed to a strategy. `amount` is what the
/// customer pays for the leg, admin fee included.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    pub order_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub method: PaymentMethod,
    pub channel: ChannelCode,
    pub customer_name: String,
    pub customer_email: Option<String>,
    pub customer_phone: Option<String>,
    pub callback_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PaymentAction {
    pub name: String,
    pub method: String,
    pub url: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PaymentDetail {
    pub bank: String,
    pub actions: Vec<PaymentAction>,
    pub va_number: Option<String>,
    pub bill_key: Option<String>,
    pub bill_code: Option<String>,
    pub transaction_time: Option<String>,
    pub expire_time: Option<String>,
    pub instruction: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentResponse {
    pub id: Uuid,
    pub transaction_id: Uuid,
    pub order_id: String,
    pub status: PaymentStatus,
    pub amount: Decimal,
    pub fee_admin: Decimal,
    pub total_amount: Decimal,
    pub currency: String,
    pub payment_method: PaymentMethod,
    pub payment_type: String,
    pub payment_detail: PaymentDetail,
    pub customer: Customer,
}

impl PaymentResponse {
    pub fn from_payment(
        channel: &Channel,
        payment: &Payment,
        payment_type: impl Into<String>,
        mut detail: PaymentDetail,
    ) -> Self {
        if detail.instruction.is_none() {
            detail.instruction = channel.instruction.clone();
        }
        Self {
            id: payment.id,
            transaction_id: payment.transaction_id,
            order_id: payment.order_id.clone(),
            status: payment.status,
            amount: payment.amount,
            fee_admin: payment.fee_amount,
            total_amount: payment.total_amount,
            currency: payment.currency.clone(),
            payment_method: payment.payment_method,
            payment_type: payment_type.into(),
            payment_detail: detail,
            customer: payment.customer.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckStatusPaymentResponse {
    pub id: Uuid,
    pub transaction_id: Uuid,
    pub order_id: String,
    pub status: PaymentStatus,
    pub amount: Decimal,
    pub fee_admin: Decimal,
    pub total_amount: Decimal,
    pub currency: String,
    pub payment_method: PaymentMethod,
    pub gateway_transaction_id: Option<String>,
    pub transaction_time: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
}

impl CheckStatusPaymentResponse {
    pub fn from_payment(payment: &Payment) -> Self {
        Self {
            id: payment.id,
            transaction_id: payment.transaction_id,
            order_id: payment.order_id.clone(),
            status: payment.status,
            amount: payment.amount,
            fee_admin: payment.fee_amount,
            total_amount: payment.total_amount,
            currency: payment.currency.clone(),
            payment_method: payment.payment_method,
            gateway_transaction_id: payment.gateway_transaction_id.clone(),
            transaction_time: None,
            paid_at: payment.paid_at,
        }
    }
}

/// Provider status lookup result, before the vocabulary is mapped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderStatus {
    pub order_id: String,
    pub transaction_id: Option<String>,
    pub raw_status: String,
    pub status_code: Option<String>,
    pub status_message: Option<String>,
    pub transaction_time: Option<String>,
    pub settlement_time: Option<String>,
    pub raw: JsonValue,
}

/// Provider push notification after signature checks and status mapping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub aggregator: AggregatorName,
    pub order_id: String,
    pub gateway_transaction_id: Option<String>,
    pub raw_status: String,
    pub status: PaymentStatus,
    pub request_id: Option<String>,
    pub payload: JsonValue,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookAck {
    pub content_type: &'static str,
    pub body: String,
}

impl WebhookAck {
    pub fn json(body: JsonValue) -> Self {
        Self {
            content_type: "application/json",
            body: body.to_string(),
        }
    }

    pub fn text(body: impl Into<String>) -> Self {
        Self {
            content_type: "text/plain",
            body: body.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WalletStatus {
    Active,
    Inactive,
    Blocked,
}

impl WalletStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WalletStatus::Active => "active",
            WalletStatus::Inactive => "inactive",
            WalletStatus::Blocked => "blocked",
        }
    }
}

impl FromStr for WalletStatus {
    type Err = PaymentError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "active" => Ok(WalletStatus::Active),
            "inactive" => Ok(WalletStatus::Inactive),
            "blocked" => Ok(WalletStatus::Blocked),
            _ => Err(PaymentError::internal(format!(
                "unknown wallet status: {}",
                value
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Wallet {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub account_number: String,
    pub status: WalletStatus,
    pub balance: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    pub id: Uuid,
    pub payment_id: Uuid,
    pub transaction_id: Uuid,
    pub order_id: String,
    pub leg_index: u32,
    pub channel_id: Uuid,
    pub amount: Decimal,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(fee_type: FeeType) -> Channel {
        Channel {
            id: Uuid::new_v4(),
            payment_method: PaymentMethod::VirtualAccount,
            bank_name: ChannelCode::Bca,
            aggregator: Some(AggregatorName::Midtrans),
            currency: "IDR".to_string(),
            fee_type,
            fee_fixed: None,
            fee_percentage_basis_points: None,
            product_name: "BCA Virtual Account".to_string(),
            product_code: None,
            bank_code: Some("014".to_string()),
            instruction: None,
            is_active: true,
        }
    }

    #[test]
    fn fee_type_requires_matching_fields() {
        assert!(channel(FeeType::None).validate_fee_config().is_ok());
        assert!(channel(FeeType::Fixed).validate_fee_config().is_err());
        assert!(channel(FeeType::Percentage).validate_fee_config().is_err());

        let mut combined = channel(FeeType::FixedPercentage);
        combined.fee_fixed = Some(Decimal::from(4000));
        assert!(combined.validate_fee_config().is_err());
        combined.fee_percentage_basis_points = Some(70);
        assert!(combined.validate_fee_config().is_ok());
    }

    #[test]
    fn combined_fee_adds_fixed_and_percentage() {
        let mut combined = channel(FeeType::FixedPercentage);
        combined.fee_fixed = Some(Decimal::from(1000));
        combined.fee_percentage_basis_points = Some(250);
        assert_eq!(combined.fee_for(Decimal::from(10001)), Decimal::from(1251));
    }

    #[test]
    fn only_pending_transitions_to_terminal() {
        assert!(PaymentStatus::Pending.can_transition_to(PaymentStatus::Success));
        assert!(!PaymentStatus::Pending.can_transition_to(PaymentStatus::Pending));
        assert!(!PaymentStatus::Success.can_transition_to(PaymentStatus::Failed));
        assert!(!PaymentStatus::Expired.can_transition_to(PaymentStatus::Success));
    }

    #[test]
    fn enums_use_wire_names() {
        assert_eq!(
            serde_json::to_value(PaymentMethod::EWallet).expect("serialize"),
            "E_WALLET"
        );
        assert_eq!(
            serde_json::to_value(ChannelCode::TouchNGo).expect("serialize"),
            "TOUCH_N_GO"
        );
        assert_eq!(
            serde_json::to_value(FeeType::FixedPercentage).expect("serialize"),
            "fixed+percentage"
        );
        assert_eq!(
            "senangpay".parse::<AggregatorName>().ok(),
            Some(AggregatorName::Senangpay)
        );
    }

    #[test]
    fn payment_detail_serializes_camel_case() {
        let detail = PaymentDetail {
            bank: "bca".to_string(),
            va_number: Some("12345".to_string()),
            ..Default::default()
        };
        let json = serde_json::to_value(&detail).expect("serialize");
        assert_eq!(json["vaNumber"], "12345");
        assert!(json["actions"].as_array().is_some());
        assert!(json.get("billKey").is_some());
    }
}
