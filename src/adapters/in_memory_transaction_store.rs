//! Process-local implementation of TransactionRepository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::Transaction;
use crate::ports::{RepositoryError, RepositoryResult, StatusChange, TransactionRepository};

/// Volatile transaction table. Records live until the process exits.
///
/// A single store-wide lock serializes every mutation, so a callback and a
/// status read racing on the same record cannot lose an update.
#[derive(Clone, Default)]
pub struct InMemoryTransactionStore {
    records: Arc<RwLock<HashMap<String, Transaction>>>,
}

impl InMemoryTransactionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TransactionRepository for InMemoryTransactionStore {
    async fn put(&self, tx: Transaction) -> RepositoryResult<Transaction> {
        let mut records = self.records.write().await;
        records.insert(tx.transaction_id.clone(), tx.clone());
        Ok(tx)
    }

    async fn get(&self, transaction_id: &str) -> RepositoryResult<Transaction> {
        self.records
            .read()
            .await
            .get(transaction_id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(transaction_id.to_string()))
    }

    async fn find_by_checkout_request_id(
        &self,
        checkout_request_id: &str,
    ) -> RepositoryResult<Option<Transaction>> {
        let records = self.records.read().await;
        Ok(records
            .values()
            .find(|tx| tx.checkout_request_id.as_deref() == Some(checkout_request_id))
            .cloned())
    }

    async fn all(&self) -> RepositoryResult<Vec<Transaction>> {
        Ok(self.records.read().await.values().cloned().collect())
    }

    async fn transition(
        &self,
        transaction_id: &str,
        change: StatusChange,
    ) -> RepositoryResult<Transaction> {
        let mut records = self.records.write().await;
        let tx = records
            .get_mut(transaction_id)
            .ok_or_else(|| RepositoryError::NotFound(transaction_id.to_string()))?;

        if !tx.status.can_transition_to(change.to) {
            return Err(RepositoryError::InvalidTransition {
                id: transaction_id.to_string(),
                from: tx.status,
                to: change.to,
            });
        }

        tx.status = change.to;
        if change.mpesa_receipt.is_some() {
            tx.mpesa_receipt = change.mpesa_receipt;
        }
        if change.confirmed_at.is_some() {
            tx.confirmed_at = change.confirmed_at;
        }

        Ok(tx.clone())
    }

    async fn expire_overdue(&self, now: DateTime<Utc>) -> RepositoryResult<Vec<String>> {
        let mut records = self.records.write().await;
        let mut expired = Vec::new();
        for tx in records.values_mut().filter(|tx| tx.is_overdue(now)) {
            tx.status = crate::domain::TransactionStatus::Expired;
            expired.push(tx.transaction_id.clone());
        }
        Ok(expired)
    }

    async fn count(&self) -> RepositoryResult<usize> {
        Ok(self.records.read().await.len())
    }
}
