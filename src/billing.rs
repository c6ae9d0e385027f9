use std::path::PathBuf;

use anyhow::Context as _;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::fs_json::{read_json, write_json_atomic};

#[derive(Debug, thiserror::Error)]
pub enum BillingError {
    #[error("insufficient funds: balance {balance}, required {required}")]
    InsufficientFunds { balance: u64, required: u64 },
    #[error("invalid ledger account: {0:?}")]
    InvalidAccount(String),
    #[error("ledger failure: {0:#}")]
    Ledger(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Debit,
    Credit,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transaction {
    pub id: uuid::Uuid,
    pub kind: TransactionKind,
    pub amount: u64,
    pub memo: String,
    pub balance_after: u64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Account {
    pub user_id: String,
    pub balance: u64,
    #[serde(default)]
    pub transactions: Vec<Transaction>,
}

#[async_trait]
pub trait BillingLedger: Send + Sync {
    async fn debit(
        &self,
        user_id: &str,
        amount: u64,
        memo: &str,
    ) -> Result<Transaction, BillingError>;
    async fn credit(
        &self,
        user_id: &str,
        amount: u64,
        memo: &str,
    ) -> Result<Transaction, BillingError>;
    async fn balance(&self, user_id: &str) -> Result<u64, BillingError>;
}

/// One JSON file per user under `ledger/`.
#[derive(Debug)]
pub struct LocalFsLedger {
    base_dir: PathBuf,
    write_lock: Mutex<()>,
}

impl LocalFsLedger {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    fn account_path(&self, user_id: &str) -> Result<PathBuf, BillingError> {
        let valid = !user_id.is_empty()
            && user_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(BillingError::InvalidAccount(user_id.to_owned()));
        }
        Ok(self.base_dir.join("ledger").join(format!("{user_id}.json")))
    }

    async fn load(&self, user_id: &str) -> Result<Account, BillingError> {
        let path = self.account_path(user_id)?;
        let account = read_json::<Account>(&path)
            .await
            .with_context(|| format!("read: {}", path.display()))?;
        Ok(account.unwrap_or_else(|| Account {
            user_id: user_id.to_owned(),
            ..Account::default()
        }))
    }

    async fn apply(
        &self,
        user_id: &str,
        kind: TransactionKind,
        amount: u64,
        memo: &str,
    ) -> Result<Transaction, BillingError> {
        let _guard = self.write_lock.lock().await;

        let mut account = self.load(user_id).await?;
        let balance_after = match kind {
            TransactionKind::Debit => account.balance.checked_sub(amount).ok_or(
                BillingError::InsufficientFunds {
                    balance: account.balance,
                    required: amount,
                },
            )?,
            TransactionKind::Credit => account.balance.saturating_add(amount),
        };

        let transaction = Transaction {
            id: uuid::Uuid::new_v4(),
            kind,
            amount,
            memo: memo.to_owned(),
            balance_after,
            created_at: Utc::now(),
        };
        account.balance = balance_after;
        account.transactions.push(transaction.clone());

        let path = self.account_path(user_id)?;
        write_json_atomic(&path, &account)
            .await
            .context("write ledger account")?;

        tracing::info!(
            user_id,
            kind = ?kind,
            amount,
            balance = balance_after,
            memo,
            "ledger updated"
        );
        Ok(transaction)
    }
}

#[async_trait]
impl BillingLedger for LocalFsLedger {
    async fn debit(
        &self,
        user_id: &str,
        amount: u64,
        memo: &str,
    ) -> Result<Transaction, BillingError> {
        self.apply(user_id, TransactionKind::Debit, amount, memo).await
    }

    async fn credit(
        &self,
        user_id: &str,
        amount: u64,
        memo: &str,
    ) -> Result<Transaction, BillingError> {
        self.apply(user_id, TransactionKind::Credit, amount, memo).await
    }

    async fn balance(&self, user_id: &str) -> Result<u64, BillingError> {
        Ok(self.load(user_id).await?.balance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn debit_refuses_to_overdraw() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let ledger = LocalFsLedger::new(temp.path());

        ledger.credit("user-1", 150, "top up").await?;
        let tx = ledger.debit("user-1", 100, "full generation").await?;
        assert_eq!(tx.balance_after, 50);

        let err = ledger.debit("user-1", 100, "full generation").await.unwrap_err();
        assert_eq!(err.to_string(), "insufficient funds: balance 50, required 100");
        assert_eq!(ledger.balance("user-1").await?, 50);
        Ok(())
    }

    #[tokio::test]
    async fn unknown_account_has_zero_balance() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let ledger = LocalFsLedger::new(temp.path());
        assert_eq!(ledger.balance("nobody").await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn account_names_cannot_escape_the_ledger_dir() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let ledger = LocalFsLedger::new(temp.path());
        let err = ledger.credit("../etc", 1, "x").await.unwrap_err();
        assert!(matches!(err, BillingError::InvalidAccount(_)));
        Ok(())
    }
}
