use super::AppState;
use crate::error::AppError;
use crate::payments::types::{CheckStatusPaymentResponse, PaymentResponse};
use crate::services::payment_service::CreatePaymentRequest;
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use tracing::info;

/// POST /payments
pub async fn create_payment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreatePaymentRequest>,
) -> Result<(StatusCode, Json<Vec<PaymentResponse>>), AppError> {
    info!(order_id = %request.order_id, legs = request.legs.len(), "payment requested");
    let responses = state
        .payments
        .create_payment(request)
        .await
        .map_err(|e| AppError::new(e).with_headers(&headers))?;
    Ok((StatusCode::CREATED, Json(responses)))
}

/// GET /payments/{order_id}
pub async fn get_payment(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<PaymentResponse>, AppError> {
    state
        .payments
        .payment_response(&order_id)
        .await
        .map(Json)
        .map_err(|e| AppError::new(e).with_headers(&headers))
}

/// GET /payments/{order_id}/status
pub async fn check_payment_status(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<CheckStatusPaymentResponse>, AppError> {
    state
        .payments
        .check_status_payment(&order_id)
        .await
        .map(Json)
        .map_err(|e| AppError::new(e).with_headers(&headers))
}
