use crate::database::error::{DatabaseError, DatabaseErrorKind};
use crate::database::repository::{
    duplicate_order, PaymentStore, StatusUpdate, TransactionStore,
};
use crate::payments::error::PaymentResult;
use crate::payments::types::{
    AggregatorName, Customer, Payment, PaymentMethod, PaymentStatus, TransactionRecord,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool};
use std::str::FromStr;
use uuid::Uuid;

const PAYMENT_COLUMNS: &str = "id, transaction_id, order_id, customer_id, customer_name, \
     customer_email, customer_phone, channel_id, payment_method, aggregator, amount, \
     fee_amount, total_amount, currency, status, gateway_transaction_id, gateway_response, \
     created_at, paid_at, expired_at";

/// Row of the `payments` table, one per leg.
#[derive(Debug, Clone, FromRow)]
pub struct PaymentRow {
    pub id: Uuid,
    pub transaction_id: Uuid,
    pub order_id: String,
    pub customer_id: Uuid,
    pub customer_name: String,
    pub customer_email: Option<String>,
    pub customer_phone: Option<String>,
    pub channel_id: Uuid,
    pub payment_method: String,
    pub aggregator: Option<String>,
    pub amount: Decimal,
    pub fee_amount: Decimal,
    pub total_amount: Decimal,
    pub currency: String,
    pub status: String,
    pub gateway_transaction_id: Option<String>,
    pub gateway_response: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub expired_at: Option<DateTime<Utc>>,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = DatabaseError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        let invalid = |e: crate::payments::error::PaymentError| {
            DatabaseError::invalid_row(format!("payment {}: {}", row.order_id, e))
        };
        let payment_method = PaymentMethod::from_str(&row.payment_method).map_err(invalid)?;
        let status = PaymentStatus::from_str(&row.status).map_err(invalid)?;
        let aggregator = row
            .aggregator
            .as_deref()
            .map(AggregatorName::from_str)
            .transpose()
            .map_err(invalid)?;

        Ok(Payment {
            id: row.id,
            transaction_id: row.transaction_id,
            order_id: row.order_id,
            customer_id: row.customer_id,
            customer: Customer {
                name: row.customer_name,
                email: row.customer_email,
                phone: row.customer_phone,
            },
            channel_id: row.channel_id,
            payment_method,
            aggregator,
            amount: row.amount,
            fee_amount: row.fee_amount,
            total_amount: row.total_amount,
            currency: row.currency,
            status,
            gateway_transaction_id: row.gateway_transaction_id,
            gateway_response: row.gateway_response,
            created_at: row.created_at,
            paid_at: row.paid_at,
            expired_at: row.expired_at,
        })
    }
}

/// Postgres-backed payments and per-leg transaction records.
pub struct PaymentRepository {
    pool: PgPool,
}

impl PaymentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_order_id(&self, order_id: &str) -> Result<Payment, DatabaseError> {
        let row = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {} FROM payments WHERE order_id = $1",
            PAYMENT_COLUMNS
        ))
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?
        .ok_or_else(|| {
            DatabaseError::new(DatabaseErrorKind::NotFound {
                entity: "payment".to_string(),
                id: order_id.to_string(),
            })
        })?;
        Payment::try_from(row)
    }

    /// Plain insert; the unique index on `order_id` rejects resubmissions.
    pub async fn insert(&self, payment: &Payment) -> Result<(), DatabaseError> {
        sqlx::query(
            "INSERT INTO payments
             (id, transaction_id, order_id, customer_id, customer_name, customer_email,
              customer_phone, channel_id, payment_method, aggregator, amount, fee_amount,
              total_amount, currency, status, gateway_transaction_id, gateway_response,
              created_at, paid_at, expired_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16,
                     $17, $18, $19, $20)",
        )
        .bind(payment.id)
        .bind(payment.transaction_id)
        .bind(&payment.order_id)
        .bind(payment.customer_id)
        .bind(&payment.customer.name)
        .bind(&payment.customer.email)
        .bind(&payment.customer.phone)
        .bind(payment.channel_id)
        .bind(payment.payment_method.as_str())
        .bind(payment.aggregator.map(|a| a.as_str()))
        .bind(payment.amount)
        .bind(payment.fee_amount)
        .bind(payment.total_amount)
        .bind(&payment.currency)
        .bind(payment.status.as_str())
        .bind(&payment.gateway_transaction_id)
        .bind(&payment.gateway_response)
        .bind(payment.created_at)
        .bind(payment.paid_at)
        .bind(payment.expired_at)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        Ok(())
    }

    pub async fn update_gateway_response(
        &self,
        order_id: &str,
        response: &serde_json::Value,
    ) -> Result<(), DatabaseError> {
        let result = sqlx::query("UPDATE payments SET gateway_response = $2 WHERE order_id = $1")
            .bind(order_id)
            .bind(response)
            .execute(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?;
        if result.rows_affected() == 0 {
            return Err(DatabaseError::new(DatabaseErrorKind::NotFound {
                entity: "payment".to_string(),
                id: order_id.to_string(),
            }));
        }
        Ok(())
    }

    /// Conditional update; zero affected rows means the payment had already
    /// left PENDING.
    pub async fn update_status_if_pending(
        &self,
        order_id: &str,
        status: PaymentStatus,
        update: &StatusUpdate,
    ) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            "UPDATE payments
             SET status = $2,
                 gateway_transaction_id = COALESCE($3, gateway_transaction_id),
                 paid_at = COALESCE($4, paid_at)
             WHERE order_id = $1 AND status = 'PENDING'",
        )
        .bind(order_id)
        .bind(status.as_str())
        .bind(&update.gateway_transaction_id)
        .bind(update.paid_at)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        if result.rows_affected() == 0 {
            // Distinguish "already terminal" from "no such order".
            self.find_by_order_id(order_id).await?;
            return Ok(false);
        }
        Ok(true)
    }

    pub async fn insert_transaction(&self, record: &TransactionRecord) -> Result<(), DatabaseError> {
        sqlx::query(
            "INSERT INTO payment_transactions
             (id, payment_id, transaction_id, order_id, leg_index, channel_id, amount, status,
              created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(record.id)
        .bind(record.payment_id)
        .bind(record.transaction_id)
        .bind(&record.order_id)
        .bind(record.leg_index as i32)
        .bind(record.channel_id)
        .bind(record.amount)
        .bind(record.status.as_str())
        .bind(record.created_at)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        Ok(())
    }
}

#[async_trait]
impl PaymentStore for PaymentRepository {
    async fn load_payment(&self, order_id: &str) -> PaymentResult<Payment> {
        Ok(self.find_by_order_id(order_id).await?)
    }

    async fn insert_payment(&self, payment: &Payment) -> PaymentResult<()> {
        match self.insert(payment).await {
            Ok(()) => Ok(()),
            Err(DatabaseError {
                kind: DatabaseErrorKind::UniqueViolation { .. },
            }) => Err(duplicate_order(&payment.order_id)),
            Err(err) => Err(err.into()),
        }
    }

    async fn record_gateway_response(
        &self,
        order_id: &str,
        response: &serde_json::Value,
    ) -> PaymentResult<()> {
        Ok(self.update_gateway_response(order_id, response).await?)
    }

    async fn transition_status(
        &self,
        order_id: &str,
        status: PaymentStatus,
        update: StatusUpdate,
    ) -> PaymentResult<bool> {
        Ok(self
            .update_status_if_pending(order_id, status, &update)
            .await?)
    }
}

#[async_trait]
impl TransactionStore for PaymentRepository {
    async fn save_transaction(&self, record: &TransactionRecord) -> PaymentResult<()> {
        Ok(self.insert_transaction(record).await?)
    }
}
