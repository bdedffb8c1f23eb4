use super::AppState;
use crate::error::AppError;
use crate::payments::error::PaymentError;
use crate::payments::types::AggregatorName;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use std::str::FromStr;
use tracing::info;

/// POST /webhooks/{aggregator}
///
/// Always 200 with the aggregator's own acknowledgement body once the
/// aggregator is known; rejected payloads are logged by the service.
pub async fn handle_webhook(
    State(state): State<AppState>,
    Path(aggregator): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    let name = AggregatorName::from_str(&aggregator).map_err(|_| {
        AppError::new(PaymentError::NotFound {
            entity: "aggregator".to_string(),
            id: aggregator.clone(),
        })
        .with_headers(&headers)
    })?;
    info!(aggregator = %name, bytes = body.len(), "received webhook");

    let ack = state
        .notifications
        .handle_notification(name, &body)
        .await
        .map_err(|e| AppError::new(e).with_headers(&headers))?;

    Ok((StatusCode::OK, [(header::CONTENT_TYPE, ack.content_type)], ack.body).into_response())
}
