use super::types::{
    gross_amount, BankTransferDetails, ChargeRequest, ChargeResponse, CstoreDetails,
    CustomerDetails, EchannelDetails, GopayDetails, QrisDetails, ShopeepayDetails, SnapCallbacks,
    SnapRequest, SnapResponse, TransactionDetails,
};
use super::MidtransApi;
use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::strategy::{decode_gateway_response, ChannelStrategy};
use crate::payments::types::{
    Channel, ChannelCode, Payment, PaymentAction, PaymentDetail, PaymentRequest, PaymentResponse,
};
use async_trait::async_trait;
use serde_json::Value as JsonValue;

/// Decode the stored charge reply and insist on the "created" marker.
fn created_charge(payment: &Payment) -> PaymentResult<ChargeResponse> {
    let response: ChargeResponse = decode_gateway_response(payment)?;
    if !response.is_created() {
        return Err(PaymentError::PaymentRequired {
            message: response.failure_message(),
            deactivate_channel: true,
        });
    }
    Ok(response)
}

fn detail(bank: &str, response: &ChargeResponse) -> PaymentDetail {
    PaymentDetail {
        bank: bank.to_string(),
        actions: response.payment_actions(),
        transaction_time: response.transaction_time.clone(),
        expire_time: response.expiry_time.clone(),
        ..Default::default()
    }
}

fn payment_type(response: &ChargeResponse, fallback: &str) -> String {
    response
        .payment_type
        .clone()
        .unwrap_or_else(|| fallback.to_string())
}

/// BCA, BNI, BRI and CIMB virtual accounts.
pub struct MidtransBankTransfer {
    bank: ChannelCode,
}

impl MidtransBankTransfer {
    pub fn new(bank: ChannelCode) -> Self {
        Self { bank }
    }

    pub(crate) fn charge_request(&self, request: &PaymentRequest) -> PaymentResult<ChargeRequest> {
        let mut charge = ChargeRequest::new("bank_transfer", request)?;
        charge.bank_transfer = Some(BankTransferDetails {
            bank: self.bank.wire_name(),
        });
        Ok(charge)
    }
}

#[async_trait]
impl ChannelStrategy for MidtransBankTransfer {
    type Api = MidtransApi;

    async fn pay(&self, api: &MidtransApi, request: &PaymentRequest) -> PaymentResult<JsonValue> {
        api.create_payment(&self.charge_request(request)?).await
    }

    fn client_response(
        &self,
        channel: &Channel,
        payment: &Payment,
    ) -> PaymentResult<PaymentResponse> {
        let response = created_charge(payment)?;
        let bank = self.bank.wire_name();
        let va_number = response
            .va_numbers
            .iter()
            .find(|va| va.bank.eq_ignore_ascii_case(&bank))
            .or_else(|| response.va_numbers.first())
            .map(|va| va.va_number.clone());

        let mut detail = detail(&bank, &response);
        detail.va_number = va_number;
        Ok(PaymentResponse::from_payment(
            channel,
            payment,
            payment_type(&response, "bank_transfer"),
            detail,
        ))
    }
}

pub struct MidtransPermata;

impl MidtransPermata {
    pub(crate) fn charge_request(&self, request: &PaymentRequest) -> PaymentResult<ChargeRequest> {
        let mut charge = ChargeRequest::new("bank_transfer", request)?;
        charge.bank_transfer = Some(BankTransferDetails {
            bank: ChannelCode::Permata.wire_name(),
        });
        Ok(charge)
    }
}

#[async_trait]
impl ChannelStrategy for MidtransPermata {
    type Api = MidtransApi;

    async fn pay(&self, api: &MidtransApi, request: &PaymentRequest) -> PaymentResult<JsonValue> {
        api.create_payment(&self.charge_request(request)?).await
    }

    fn client_response(
        &self,
        channel: &Channel,
        payment: &Payment,
    ) -> PaymentResult<PaymentResponse> {
        let response = created_charge(payment)?;
        let mut detail = detail(&ChannelCode::Permata.wire_name(), &response);
        detail.va_number = response.permata_va_number.clone();
        Ok(PaymentResponse::from_payment(
            channel,
            payment,
            payment_type(&response, "bank_transfer"),
            detail,
        ))
    }
}

/// Mandiri bill payment: the customer pays with a biller code and bill key.
pub struct MidtransEchannel;

impl MidtransEchannel {
    pub(crate) fn charge_request(&self, request: &PaymentRequest) -> PaymentResult<ChargeRequest> {
        let mut charge = ChargeRequest::new("echannel", request)?;
        charge.echannel = Some(EchannelDetails {
            bill_info1: "Payment:".to_string(),
            bill_info2: format!("Order {}", request.order_id),
        });
        Ok(charge)
    }
}

#[async_trait]
impl ChannelStrategy for MidtransEchannel {
    type Api = MidtransApi;

    async fn pay(&self, api: &MidtransApi, request: &PaymentRequest) -> PaymentResult<JsonValue> {
        api.create_payment(&self.charge_request(request)?).await
    }

    fn client_response(
        &self,
        channel: &Channel,
        payment: &Payment,
    ) -> PaymentResult<PaymentResponse> {
        let response = created_charge(payment)?;
        let mut detail = detail(&ChannelCode::Mandiri.wire_name(), &response);
        detail.bill_key = response.bill_key.clone();
        detail.bill_code = response.biller_code.clone();
        Ok(PaymentResponse::from_payment(
            channel,
            payment,
            payment_type(&response, "echannel"),
            detail,
        ))
    }
}

pub struct MidtransGopay;

impl MidtransGopay {
    pub(crate) fn charge_request(&self, request: &PaymentRequest) -> PaymentResult<ChargeRequest> {
        let mut charge = ChargeRequest::new("gopay", request)?;
        charge.gopay = Some(GopayDetails {
            enable_callback: request.callback_url.is_some(),
            callback_url: request.callback_url.clone(),
        });
        Ok(charge)
    }
}

#[async_trait]
impl ChannelStrategy for MidtransGopay {
    type Api = MidtransApi;

    async fn pay(&self, api: &MidtransApi, request: &PaymentRequest) -> PaymentResult<JsonValue> {
        api.create_payment(&self.charge_request(request)?).await
    }

    fn client_response(
        &self,
        channel: &Channel,
        payment: &Payment,
    ) -> PaymentResult<PaymentResponse> {
        let response = created_charge(payment)?;
        Ok(PaymentResponse::from_payment(
            channel,
            payment,
            payment_type(&response, "gopay"),
            detail(&ChannelCode::Gopay.wire_name(), &response),
        ))
    }
}

pub struct MidtransShopeepay;

impl MidtransShopeepay {
    pub(crate) fn charge_request(&self, request: &PaymentRequest) -> PaymentResult<ChargeRequest> {
        let mut charge = ChargeRequest::new("shopeepay", request)?;
        charge.shopeepay = Some(ShopeepayDetails {
            callback_url: request.callback_url.clone(),
        });
        Ok(charge)
    }
}

#[async_trait]
impl ChannelStrategy for MidtransShopeepay {
    type Api = MidtransApi;

    async fn pay(&self, api: &MidtransApi, request: &PaymentRequest) -> PaymentResult<JsonValue> {
        api.create_payment(&self.charge_request(request)?).await
    }

    fn client_response(
        &self,
        channel: &Channel,
        payment: &Payment,
    ) -> PaymentResult<PaymentResponse> {
        let response = created_charge(payment)?;
        Ok(PaymentResponse::from_payment(
            channel,
            payment,
            payment_type(&response, "shopeepay"),
            detail(&ChannelCode::Shopeepay.wire_name(), &response),
        ))
    }
}

pub struct MidtransQris {
    acquirer: String,
}

impl MidtransQris {
    pub fn new(acquirer: impl Into<String>) -> Self {
        Self {
            acquirer: acquirer.into(),
        }
    }

    pub(crate) fn charge_request(&self, request: &PaymentRequest) -> PaymentResult<ChargeRequest> {
        let mut charge = ChargeRequest::new("qris", request)?;
        charge.qris = Some(QrisDetails {
            acquirer: self.acquirer.clone(),
        });
        Ok(charge)
    }
}

#[async_trait]
impl ChannelStrategy for MidtransQris {
    type Api = MidtransApi;

    async fn pay(&self, api: &MidtransApi, request: &PaymentRequest) -> PaymentResult<JsonValue> {
        api.create_payment(&self.charge_request(request)?).await
    }

    fn client_response(
        &self,
        channel: &Channel,
        payment: &Payment,
    ) -> PaymentResult<PaymentResponse> {
        let response = created_charge(payment)?;
        Ok(PaymentResponse::from_payment(
            channel,
            payment,
            payment_type(&response, "qris"),
            detail(&ChannelCode::Qris.wire_name(), &response),
        ))
    }
}

/// Over-the-counter payment at Indomaret or Alfamart.
pub struct MidtransCstore {
    store: ChannelCode,
}

impl MidtransCstore {
    pub fn new(store: ChannelCode) -> Self {
        Self { store }
    }

    pub(crate) fn charge_request(&self, request: &PaymentRequest) -> PaymentResult<ChargeRequest> {
        let mut charge = ChargeRequest::new("cstore", request)?;
        charge.cstore = Some(CstoreDetails {
            store: self.store.wire_name(),
            message: format!("Order {}", request.order_id),
        });
        Ok(charge)
    }
}

#[async_trait]
impl ChannelStrategy for MidtransCstore {
    type Api = MidtransApi;

    async fn pay(&self, api: &MidtransApi, request: &PaymentRequest) -> PaymentResult<JsonValue> {
        api.create_payment(&self.charge_request(request)?).await
    }

    fn client_response(
        &self,
        channel: &Channel,
        payment: &Payment,
    ) -> PaymentResult<PaymentResponse> {
        let response = created_charge(payment)?;
        let store = response
            .store
            .clone()
            .unwrap_or_else(|| self.store.wire_name());
        let mut detail = detail(&store, &response);
        detail.bill_code = response.payment_code.clone();
        Ok(PaymentResponse::from_payment(
            channel,
            payment,
            payment_type(&response, "cstore"),
            detail,
        ))
    }
}

/// Hosted Snap checkout restricted to one payment option.
pub struct MidtransSnap {
    channel: ChannelCode,
    enabled_payment: String,
}

impl MidtransSnap {
    pub fn new(channel: ChannelCode, enabled_payment: impl Into<String>) -> Self {
        Self {
            channel,
            enabled_payment: enabled_payment.into(),
        }
    }

    pub(crate) fn snap_request(&self, request: &PaymentRequest) -> PaymentResult<SnapRequest> {
        Ok(SnapRequest {
            transaction_details: TransactionDetails {
                order_id: request.order_id.clone(),
                gross_amount: gross_amount(request.amount)?,
            },
            customer_details: CustomerDetails::from_request(request),
            enabled_payments: vec![self.enabled_payment.clone()],
            callbacks: request
                .callback_url
                .clone()
                .map(|finish| SnapCallbacks { finish }),
        })
    }
}

#[async_trait]
impl ChannelStrategy for MidtransSnap {
    type Api = MidtransApi;

    async fn pay(&self, api: &MidtransApi, request: &PaymentRequest) -> PaymentResult<JsonValue> {
        api.create_snap_payment(&self.snap_request(request)?).await
    }

    fn client_response(
        &self,
        channel: &Channel,
        payment: &Payment,
    ) -> PaymentResult<PaymentResponse> {
        let response: SnapResponse = decode_gateway_response(payment)?;
        if response.token.is_empty() || response.redirect_url.is_empty() {
            let message = if response.error_messages.is_empty() {
                "midtrans snap did not return a checkout token".to_string()
            } else {
                response.error_messages.join("; ")
            };
            return Err(PaymentError::PaymentRequired {
                message,
                deactivate_channel: true,
            });
        }

        let detail = PaymentDetail {
            bank: self.channel.wire_name(),
            actions: vec![PaymentAction {
                name: "redirect".to_string(),
                method: "GET".to_string(),
                url: response.redirect_url,
            }],
            ..Default::default()
        };
        Ok(PaymentResponse::from_payment(channel, payment, "snap", detail))
    }
}
