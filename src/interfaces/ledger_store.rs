//! Balance and transaction log interface.

use async_trait::async_trait;

use super::member_store::Result;
use crate::model::{Balance, HistoryQuery, OrderKey, Posting, Transaction};

/// Interface for the point ledger: balances plus the append-only log.
///
/// Balances change only through [`LedgerStore::post`], which writes the
/// balance deltas and the transaction records of one operation as a single
/// atomic unit.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Current balance; zero for a member without postings.
    async fn balance(&self, member_id: &str) -> Result<Balance>;

    /// Record holding the given idempotency key, if any.
    async fn find_order(&self, key: &OrderKey) -> Result<Option<Transaction>>;

    /// Apply a posting atomically.
    ///
    /// Re-checks the order key (`DuplicateOrder`) and the balance floor
    /// (`InsufficientBalance`) inside the unit. Returns the written records
    /// in posting order with their assigned ids.
    async fn post(&self, posting: Posting) -> Result<Vec<Transaction>>;

    /// Transactions matching the query, newest first, ties by id descending.
    async fn history(&self, query: &HistoryQuery) -> Result<Vec<Transaction>>;
}
