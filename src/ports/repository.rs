//! Storage port for transaction records.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::{Transaction, TransactionStatus};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("transaction not found: {0}")]
    NotFound(String),

    #[error("transaction {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: String,
        from: TransactionStatus,
        to: TransactionStatus,
    },
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// A requested status change, applied atomically by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusChange {
    pub to: TransactionStatus,
    pub mpesa_receipt: Option<String>,
    pub confirmed_at: Option<DateTime<Utc>>,
}

impl StatusChange {
    pub fn confirm(mpesa_receipt: Option<String>, at: DateTime<Utc>) -> Self {
        Self {
            to: TransactionStatus::Success,
            mpesa_receipt,
            confirmed_at: Some(at),
        }
    }

    pub fn expire() -> Self {
        Self {
            to: TransactionStatus::Expired,
            mpesa_receipt: None,
            confirmed_at: None,
        }
    }
}

#[async_trait]
pub trait TransactionRepository: Send + Sync {
    /// Inserts or overwrites the record keyed by its transaction id.
    async fn put(&self, tx: Transaction) -> RepositoryResult<Transaction>;

    async fn get(&self, transaction_id: &str) -> RepositoryResult<Transaction>;

    async fn find_by_checkout_request_id(
        &self,
        checkout_request_id: &str,
    ) -> RepositoryResult<Option<Transaction>>;

    async fn all(&self) -> RepositoryResult<Vec<Transaction>>;

    /// Applies `change` only if the record's current status allows it.
    /// Mutations of a single record are serialized by the implementation.
    async fn transition(
        &self,
        transaction_id: &str,
        change: StatusChange,
    ) -> RepositoryResult<Transaction>;

    /// Moves every pending record whose window closed before `now` to expired.
    async fn expire_overdue(&self, now: DateTime<Utc>) -> RepositoryResult<Vec<String>>;

    async fn count(&self) -> RepositoryResult<usize>;
}
