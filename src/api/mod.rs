pub mod health;
pub mod payments;
pub mod webhooks;

use crate::health::HealthChecker;
use crate::services::notification::NotificationService;
use crate::services::payment_service::PaymentService;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub payments: Arc<PaymentService>,
    pub notifications: Arc<NotificationService>,
    pub health: HealthChecker,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/payments", post(payments::create_payment))
        .route("/payments/{order_id}", get(payments::get_payment))
        .route(
            "/payments/{order_id}/status",
            get(payments::check_payment_status),
        )
        .route("/webhooks/{aggregator}", post(webhooks::handle_webhook))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id()),
        )
}
