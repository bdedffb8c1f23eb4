use super::types::{HostedPaymentQuery, HostedPaymentResponse};
use super::SenangpayApi;
use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::strategy::{decode_gateway_response, ChannelStrategy};
use crate::payments::types::{
    Channel, ChannelCode, Payment, PaymentAction, PaymentDetail, PaymentRequest, PaymentResponse,
};
use async_trait::async_trait;
use serde_json::Value as JsonValue;

/// Redirect to the senangPay hosted page; the customer picks FPX bank or
/// wallet there.
pub struct SenangpayHosted {
    channel: ChannelCode,
}

impl SenangpayHosted {
    pub fn new(channel: ChannelCode) -> Self {
        Self { channel }
    }

    pub(crate) fn hosted_query(&self, request: &PaymentRequest) -> PaymentResult<HostedPaymentQuery> {
        HostedPaymentQuery::new(request)
    }
}

#[async_trait]
impl ChannelStrategy for SenangpayHosted {
    type Api = SenangpayApi;

    async fn pay(&self, api: &SenangpayApi, request: &PaymentRequest) -> PaymentResult<JsonValue> {
        api.create_payment(self.hosted_query(request)?)
    }

    fn client_response(
        &self,
        channel: &Channel,
        payment: &Payment,
    ) -> PaymentResult<PaymentResponse> {
        let response: HostedPaymentResponse = decode_gateway_response(payment)?;
        if response.payment_url.trim().is_empty() {
            return Err(PaymentError::PaymentRequired {
                message: "senangpay payment page could not be prepared".to_string(),
                deactivate_channel: true,
            });
        }

        let detail = PaymentDetail {
            bank: self.channel.wire_name(),
            actions: vec![PaymentAction {
                name: "redirect".to_string(),
                method: "GET".to_string(),
                url: response.payment_url,
            }],
            ..Default::default()
        };
        Ok(PaymentResponse::from_payment(channel, payment, "hosted", detail))
    }
}
