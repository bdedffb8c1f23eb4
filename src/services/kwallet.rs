//! K-Wallet ledger.
//!
//! Wallet legs never leave the platform: the charge is a local debit against
//! the customer's wallet and the leg settles immediately. Balance checks are
//! not enforced here; the wallet service that tops accounts up owns them.

use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::types::{Wallet, WalletStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WalletDebit {
    pub id: Uuid,
    pub wallet_id: Uuid,
    pub account_number: String,
    pub amount: Decimal,
    pub reference: String,
    pub debited_at: DateTime<Utc>,
}

#[async_trait]
pub trait KWalletLedger: Send + Sync {
    /// Debit `amount` from the wallet. `reference` is the leg order id.
    async fn debit(
        &self,
        wallet: &Wallet,
        amount: Decimal,
        reference: &str,
    ) -> PaymentResult<WalletDebit>;
}

/// Wallet must be usable before any debit is attempted.
pub fn ensure_usable(wallet: &Wallet) -> PaymentResult<()> {
    if wallet.status != WalletStatus::Active {
        return Err(PaymentError::validation(
            format!("k-wallet is {}", wallet.status.as_str()),
            "wallet",
        ));
    }
    if wallet.account_number.trim().is_empty() {
        return Err(PaymentError::validation(
            "k-wallet has no account number",
            "wallet",
        ));
    }
    Ok(())
}

fn new_debit(wallet: &Wallet, amount: Decimal, reference: &str) -> PaymentResult<WalletDebit> {
    ensure_usable(wallet)?;
    if amount <= Decimal::ZERO {
        return Err(PaymentError::validation(
            format!("invalid wallet debit {}", amount),
            "amount",
        ));
    }
    Ok(WalletDebit {
        id: Uuid::new_v4(),
        wallet_id: wallet.id,
        account_number: wallet.account_number.clone(),
        amount,
        reference: reference.to_string(),
        debited_at: Utc::now(),
    })
}

#[derive(Default)]
pub struct InMemoryLedger {
    debits: Mutex<Vec<WalletDebit>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn debits(&self) -> Vec<WalletDebit> {
        self.debits.lock().await.clone()
    }
}

#[async_trait]
impl KWalletLedger for InMemoryLedger {
    async fn debit(
        &self,
        wallet: &Wallet,
        amount: Decimal,
        reference: &str,
    ) -> PaymentResult<WalletDebit> {
        let debit = new_debit(wallet, amount, reference)?;
        self.debits.lock().await.push(debit.clone());
        info!(wallet_id = %wallet.id, %amount, reference, "k-wallet debited");
        Ok(debit)
    }
}

#[cfg(feature = "database")]
pub use postgres::PgWalletLedger;

#[cfg(feature = "database")]
mod postgres {
    use super::*;
    use crate::database::error::DatabaseError;
    use sqlx::PgPool;

    /// Writes the debit row and the balance change in one transaction.
    pub struct PgWalletLedger {
        pool: PgPool,
    }

    impl PgWalletLedger {
        pub fn new(pool: PgPool) -> Self {
            Self { pool }
        }
    }

    #[async_trait]
    impl KWalletLedger for PgWalletLedger {
        async fn debit(
            &self,
            wallet: &Wallet,
            amount: Decimal,
            reference: &str,
        ) -> PaymentResult<WalletDebit> {
            let debit = new_debit(wallet, amount, reference)?;
            let mut tx = self.pool.begin().await.map_err(DatabaseError::from_sqlx)?;

            sqlx::query(
                "INSERT INTO wallet_debits (id, wallet_id, account_number, amount, reference, debited_at)
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(debit.id)
            .bind(debit.wallet_id)
            .bind(&debit.account_number)
            .bind(debit.amount)
            .bind(&debit.reference)
            .bind(debit.debited_at)
            .execute(&mut *tx)
            .await
            .map_err(DatabaseError::from_sqlx)?;

            sqlx::query("UPDATE wallets SET balance = balance - $2 WHERE id = $1")
                .bind(debit.wallet_id)
                .bind(debit.amount)
                .execute(&mut *tx)
                .await
                .map_err(DatabaseError::from_sqlx)?;

            tx.commit().await.map_err(DatabaseError::from_sqlx)?;
            info!(wallet_id = %wallet.id, %amount, reference, "k-wallet debited");
            Ok(debit)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wallet(status: WalletStatus, account_number: &str) -> Wallet {
        Wallet {
            id: Uuid::new_v4(),
            customer_id: Uuid::new_v4(),
            account_number: account_number.to_string(),
            status,
            balance: Decimal::ZERO,
        }
    }

    #[tokio::test]
    async fn debit_is_recorded_without_balance_check() {
        let ledger = InMemoryLedger::new();
        let debit = ledger
            .debit(
                &wallet(WalletStatus::Active, "KW-0001"),
                Decimal::from(5000),
                "ORD-1-1",
            )
            .await
            .expect("active wallet");
        assert_eq!(debit.reference, "ORD-1-1");
        assert_eq!(ledger.debits().await.len(), 1);
    }

    #[tokio::test]
    async fn blocked_or_unnumbered_wallets_are_rejected() {
        let ledger = InMemoryLedger::new();
        assert!(ledger
            .debit(&wallet(WalletStatus::Blocked, "KW-0001"), Decimal::ONE, "r")
            .await
            .is_err());
        assert!(ledger
            .debit(&wallet(WalletStatus::Active, "  "), Decimal::ONE, "r")
            .await
            .is_err());
        assert!(ledger.debits().await.is_empty());
    }
}
