use super::types::{InvoiceRequest, InvoiceResponse, QrisRequest, QrisResponse, SUCCESS_CODE};
use super::EspayApi;
use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::strategy::{decode_gateway_response, ChannelStrategy};
use crate::payments::types::{
    Channel, ChannelCode, Payment, PaymentAction, PaymentDetail, PaymentRequest, PaymentResponse,
};
use async_trait::async_trait;
use serde_json::Value as JsonValue;

fn rejected(error_code: &str, error_message: Option<&String>) -> PaymentError {
    PaymentError::PaymentRequired {
        message: error_message
            .cloned()
            .unwrap_or_else(|| format!("espay returned error code {}", error_code)),
        deactivate_channel: true,
    }
}

/// Espay bank codes for the virtual accounts we route.
pub fn default_bank_code(bank: ChannelCode) -> Option<&'static str> {
    match bank {
        ChannelCode::Bca => Some("014"),
        ChannelCode::Bni => Some("009"),
        ChannelCode::Bri => Some("002"),
        ChannelCode::Mandiri => Some("008"),
        ChannelCode::Permata => Some("013"),
        _ => None,
    }
}

pub struct EspayVirtualAccount {
    bank: ChannelCode,
    bank_code: &'static str,
}

impl EspayVirtualAccount {
    pub fn new(bank: ChannelCode) -> PaymentResult<Self> {
        let bank_code = default_bank_code(bank).ok_or_else(|| {
            PaymentError::configuration(format!("espay has no virtual account for {}", bank))
        })?;
        Ok(Self { bank, bank_code })
    }

    pub(crate) fn invoice_request(&self, request: &PaymentRequest) -> PaymentResult<InvoiceRequest> {
        InvoiceRequest::new(request, self.bank_code)
    }
}

#[async_trait]
impl ChannelStrategy for EspayVirtualAccount {
    type Api = EspayApi;

    async fn pay(&self, api: &EspayApi, request: &PaymentRequest) -> PaymentResult<JsonValue> {
        api.send_invoice(self.invoice_request(request)?).await
    }

    fn client_response(
        &self,
        channel: &Channel,
        payment: &Payment,
    ) -> PaymentResult<PaymentResponse> {
        let response: InvoiceResponse = decode_gateway_response(payment)?;
        if response.error_code != SUCCESS_CODE {
            return Err(rejected(&response.error_code, response.error_message.as_ref()));
        }

        let detail = PaymentDetail {
            bank: self.bank.wire_name(),
            va_number: response.va_number,
            transaction_time: response.rs_datetime,
            expire_time: response.expired,
            ..Default::default()
        };
        Ok(PaymentResponse::from_payment(
            channel,
            payment,
            "bank_transfer",
            detail,
        ))
    }
}

pub struct EspayQris;

impl EspayQris {
    pub(crate) fn qris_request(&self, request: &PaymentRequest) -> PaymentResult<QrisRequest> {
        QrisRequest::new(request)
    }
}

#[async_trait]
impl ChannelStrategy for EspayQris {
    type Api = EspayApi;

    async fn pay(&self, api: &EspayApi, request: &PaymentRequest) -> PaymentResult<JsonValue> {
        api.push_qris(self.qris_request(request)?).await
    }

    fn client_response(
        &self,
        channel: &Channel,
        payment: &Payment,
    ) -> PaymentResult<PaymentResponse> {
        let response: QrisResponse = decode_gateway_response(payment)?;
        if response.error_code != SUCCESS_CODE {
            return Err(rejected(&response.error_code, response.error_message.as_ref()));
        }
        let qr_link = response
            .qr_link
            .filter(|link| !link.trim().is_empty())
            .ok_or_else(|| PaymentError::PaymentRequired {
                message: "espay did not return a QR link".to_string(),
                deactivate_channel: true,
            })?;

        let detail = PaymentDetail {
            bank: ChannelCode::Qris.wire_name(),
            actions: vec![PaymentAction {
                name: "generate-qr-code".to_string(),
                method: "GET".to_string(),
                url: qr_link,
            }],
            expire_time: response.expired,
            ..Default::default()
        };
        Ok(PaymentResponse::from_payment(channel, payment, "qris", detail))
    }
}
