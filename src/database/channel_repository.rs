use crate::database::error::{DatabaseError, DatabaseErrorKind};
use crate::database::repository::{ChannelStore, WalletStore};
use crate::payments::error::PaymentResult;
use crate::payments::types::{
    AggregatorName, Channel, ChannelCode, FeeType, PaymentMethod, Wallet, WalletStatus,
};
use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool};
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow)]
pub struct ChannelRow {
    pub id: Uuid,
    pub payment_method: String,
    pub bank_name: String,
    pub aggregator: Option<String>,
    pub currency: String,
    pub fee_type: String,
    pub fee_fixed: Option<Decimal>,
    pub fee_percentage_basis_points: Option<i32>,
    pub product_name: String,
    pub product_code: Option<String>,
    pub bank_code: Option<String>,
    pub instruction: Option<String>,
    pub is_active: bool,
}

impl TryFrom<ChannelRow> for Channel {
    type Error = DatabaseError;

    fn try_from(row: ChannelRow) -> Result<Self, Self::Error> {
        let id = row.id;
        let invalid = |e: crate::payments::error::PaymentError| {
            DatabaseError::invalid_row(format!("channel {}: {}", id, e))
        };
        let fee_percentage_basis_points = row
            .fee_percentage_basis_points
            .map(u32::try_from)
            .transpose()
            .map_err(|_| DatabaseError::invalid_row(format!("channel {}: negative fee", id)))?;

        Ok(Channel {
            id,
            payment_method: PaymentMethod::from_str(&row.payment_method).map_err(invalid)?,
            bank_name: ChannelCode::from_str(&row.bank_name).map_err(invalid)?,
            aggregator: row
                .aggregator
                .as_deref()
                .map(AggregatorName::from_str)
                .transpose()
                .map_err(invalid)?,
            currency: row.currency,
            fee_type: FeeType::from_str(&row.fee_type).map_err(invalid)?,
            fee_fixed: row.fee_fixed,
            fee_percentage_basis_points,
            product_name: row.product_name,
            product_code: row.product_code,
            bank_code: row.bank_code,
            instruction: row.instruction,
            is_active: row.is_active,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct WalletRow {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub account_number: String,
    pub status: String,
    pub balance: Decimal,
}

/// Channel catalogue and K-Wallet accounts. Both are maintained by the
/// admin side; the payment core reads them and only ever writes
/// `channels.is_active`.
pub struct ChannelRepository {
    pool: PgPool,
}

impl ChannelRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Channel, DatabaseError> {
        let row = sqlx::query_as::<_, ChannelRow>(
            "SELECT id, payment_method, bank_name, aggregator, currency, fee_type, fee_fixed,
                    fee_percentage_basis_points, product_name, product_code, bank_code,
                    instruction, is_active
             FROM channels WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?
        .ok_or_else(|| {
            DatabaseError::new(DatabaseErrorKind::NotFound {
                entity: "channel".to_string(),
                id: id.to_string(),
            })
        })?;
        Channel::try_from(row)
    }

    pub async fn set_active(&self, id: Uuid, is_active: bool) -> Result<(), DatabaseError> {
        let result = sqlx::query(
            "UPDATE channels SET is_active = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(is_active)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        if result.rows_affected() == 0 {
            return Err(DatabaseError::new(DatabaseErrorKind::NotFound {
                entity: "channel".to_string(),
                id: id.to_string(),
            }));
        }
        Ok(())
    }

    pub async fn find_wallet_by_customer(
        &self,
        customer_id: Uuid,
    ) -> Result<Option<Wallet>, DatabaseError> {
        let row = sqlx::query_as::<_, WalletRow>(
            "SELECT id, customer_id, account_number, status, balance
             FROM wallets WHERE customer_id = $1",
        )
        .bind(customer_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        row.map(|row| {
            let status = WalletStatus::from_str(&row.status).map_err(|e| {
                DatabaseError::invalid_row(format!("wallet {}: {}", row.id, e))
            })?;
            Ok(Wallet {
                id: row.id,
                customer_id: row.customer_id,
                account_number: row.account_number,
                status,
                balance: row.balance,
            })
        })
        .transpose()
    }
}

#[async_trait]
impl ChannelStore for ChannelRepository {
    async fn load_channel(&self, id: Uuid) -> PaymentResult<Channel> {
        Ok(self.find_by_id(id).await?)
    }

    /// Only the activation flag is owned by the payment core.
    async fn save_channel(&self, channel: &Channel) -> PaymentResult<()> {
        Ok(self.set_active(channel.id, channel.is_active).await?)
    }
}

#[async_trait]
impl WalletStore for ChannelRepository {
    async fn find_wallet(&self, customer_id: Uuid) -> PaymentResult<Option<Wallet>> {
        Ok(self.find_wallet_by_customer(customer_id).await?)
    }
}
