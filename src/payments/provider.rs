use crate::payments::error::PaymentResult;
use crate::payments::types::{
    AggregatorName, Channel, ChannelCode, CheckStatusPaymentResponse, Notification, Payment,
    PaymentMethod, PaymentRequest, PaymentResponse, PaymentStatus, ProviderStatus, WebhookAck,
};
use async_trait::async_trait;
use serde_json::Value as JsonValue;

/// One external payment aggregator: its transport, its strategy table and
/// its status vocabulary.
#[async_trait]
pub trait PaymentAggregator: Send + Sync {
    fn name(&self) -> AggregatorName;

    fn supports(&self, method: PaymentMethod, channel: ChannelCode) -> bool;

    /// Reject a charge the aggregator would refuse to encode, without any
    /// network call.
    fn validate_request(&self, _request: &PaymentRequest) -> PaymentResult<()> {
        Ok(())
    }

    /// Resolve the channel strategy and submit the charge.
    async fn pay(&self, request: &PaymentRequest) -> PaymentResult<JsonValue>;

    async fn check_status(&self, order_id: &str) -> PaymentResult<ProviderStatus>;

    fn map_response_payment(
        &self,
        channel: &Channel,
        payment: &Payment,
    ) -> PaymentResult<PaymentResponse>;

    fn map_check_status_payment(
        &self,
        payment: &Payment,
        status: &ProviderStatus,
    ) -> PaymentResult<CheckStatusPaymentResponse>;

    /// Verify and decode a push notification body.
    fn parse_notification(&self, payload: &[u8]) -> PaymentResult<Notification>;

    /// Body returned to the provider; `None` when the notification could not
    /// be parsed.
    fn acknowledge(&self, notification: Option<&Notification>) -> WebhookAck;
}

pub(crate) fn check_status_response(
    payment: &Payment,
    status: PaymentStatus,
    provider_status: &ProviderStatus,
) -> CheckStatusPaymentResponse {
    let mut response = CheckStatusPaymentResponse::from_payment(payment);
    response.status = status;
    response.gateway_transaction_id = provider_status
        .transaction_id
        .clone()
        .or(response.gateway_transaction_id);
    response.transaction_time = provider_status
        .settlement_time
        .clone()
        .or_else(|| provider_status.transaction_time.clone());
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payments::error::PaymentError;
    use crate::payments::types::{Customer, PaymentDetail};
    use chrono::Utc;
    use rust_decimal::Decimal;
    use uuid::Uuid;

    struct MockAggregator;

    #[async_trait]
    impl PaymentAggregator for MockAggregator {
        fn name(&self) -> AggregatorName {
            AggregatorName::Midtrans
        }

        fn supports(&self, method: PaymentMethod, channel: ChannelCode) -> bool {
            method == PaymentMethod::VirtualAccount && channel == ChannelCode::Bca
        }

        async fn pay(&self, request: &PaymentRequest) -> PaymentResult<JsonValue> {
            Ok(serde_json::json!({ "order_id": request.order_id, "status_code": "201" }))
        }

        async fn check_status(&self, order_id: &str) -> PaymentResult<ProviderStatus> {
            Ok(ProviderStatus {
                order_id: order_id.to_string(),
                transaction_id: Some("gw-1".to_string()),
                raw_status: "settlement".to_string(),
                status_code: Some("200".to_string()),
                status_message: None,
                transaction_time: Some("2026-01-01 10:00:00".to_string()),
                settlement_time: None,
                raw: serde_json::json!({}),
            })
        }

        fn map_response_payment(
            &self,
            channel: &Channel,
            payment: &Payment,
        ) -> PaymentResult<PaymentResponse> {
            Ok(PaymentResponse::from_payment(
                channel,
                payment,
                "bank_transfer",
                PaymentDetail::default(),
            ))
        }

        fn map_check_status_payment(
            &self,
            payment: &Payment,
            status: &ProviderStatus,
        ) -> PaymentResult<CheckStatusPaymentResponse> {
            Ok(check_status_response(payment, PaymentStatus::Success, status))
        }

        fn parse_notification(&self, _payload: &[u8]) -> PaymentResult<Notification> {
            Err(PaymentError::internal("not used"))
        }

        fn acknowledge(&self, _notification: Option<&Notification>) -> WebhookAck {
            WebhookAck::text("OK")
        }
    }

    fn payment() -> Payment {
        Payment {
            id: Uuid::new_v4(),
            transaction_id: Uuid::new_v4(),
            order_id: "ORD-1".to_string(),
            customer_id: Uuid::new_v4(),
            customer: Customer::default(),
            channel_id: Uuid::new_v4(),
            payment_method: PaymentMethod::VirtualAccount,
            aggregator: Some(AggregatorName::Midtrans),
            amount: Decimal::from(10000),
            fee_amount: Decimal::ZERO,
            total_amount: Decimal::from(10000),
            currency: "IDR".to_string(),
            status: PaymentStatus::Pending,
            gateway_transaction_id: None,
            gateway_response: None,
            created_at: Utc::now(),
            paid_at: None,
            expired_at: None,
        }
    }

    #[tokio::test]
    async fn trait_can_be_implemented_by_mock_aggregator() {
        let aggregator: Box<dyn PaymentAggregator> = Box::new(MockAggregator);
        let status = aggregator
            .check_status("ORD-1")
            .await
            .expect("status lookup should succeed");
        let response = aggregator
            .map_check_status_payment(&payment(), &status)
            .expect("mapping should succeed");
        assert_eq!(response.status, PaymentStatus::Success);
        assert_eq!(response.gateway_transaction_id.as_deref(), Some("gw-1"));
        assert_eq!(
            response.transaction_time.as_deref(),
            Some("2026-01-01 10:00:00")
        );
    }
}
