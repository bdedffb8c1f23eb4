//! Aggregator push notifications.
//!
//! Every notification is acknowledged with the body its aggregator expects.
//! Bodies that fail to parse or verify, and updates that cannot be applied,
//! are logged and dropped so the aggregator stops retrying.

use crate::database::repository::{PaymentStore, StatusUpdate};
use crate::payments::error::PaymentResult;
use crate::payments::factory::AggregatorFactory;
use crate::payments::types::{AggregatorName, Notification, PaymentStatus, WebhookAck};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// The payment moved from PENDING to this status.
    Applied(PaymentStatus),
    /// The payment was already terminal; nothing was written.
    Ignored,
    /// The notification carried a non-terminal status.
    StillPending,
}

pub struct NotificationService {
    aggregators: AggregatorFactory,
    payments: Arc<dyn PaymentStore>,
}

impl NotificationService {
    pub fn new(aggregators: AggregatorFactory, payments: Arc<dyn PaymentStore>) -> Self {
        Self {
            aggregators,
            payments,
        }
    }

    /// Fails only when the aggregator is not enabled; there is nobody to
    /// acknowledge to in that case.
    pub async fn handle_notification(
        &self,
        name: AggregatorName,
        body: &[u8],
    ) -> PaymentResult<WebhookAck> {
        let aggregator = self.aggregators.get(name)?;

        let notification = match aggregator.parse_notification(body) {
            Ok(notification) => notification,
            Err(err) => {
                warn!(aggregator = %name, error = %err, "rejected notification");
                return Ok(aggregator.acknowledge(None));
            }
        };

        match self.apply_status(&notification).await {
            Ok(outcome) => info!(
                aggregator = %name,
                order_id = %notification.order_id,
                raw_status = %notification.raw_status,
                ?outcome,
                "notification processed"
            ),
            Err(err) => warn!(
                aggregator = %name,
                order_id = %notification.order_id,
                error = %err,
                "notification not applied"
            ),
        }

        Ok(aggregator.acknowledge(Some(&notification)))
    }

    pub async fn apply_status(
        &self,
        notification: &Notification,
    ) -> PaymentResult<TransitionOutcome> {
        if !notification.status.is_terminal() {
            return Ok(TransitionOutcome::StillPending);
        }

        let update = StatusUpdate {
            gateway_transaction_id: notification.gateway_transaction_id.clone(),
            paid_at: (notification.status == PaymentStatus::Success)
                .then_some(notification.received_at),
        };
        let applied = self
            .payments
            .transition_status(&notification.order_id, notification.status, update)
            .await?;

        Ok(if applied {
            TransitionOutcome::Applied(notification.status)
        } else {
            TransitionOutcome::Ignored
        })
    }
}
