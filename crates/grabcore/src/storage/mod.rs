//! Storage layer: SQLite pool, migrations and the account / invoice stores
//!
//! Services only see the [`UserStore`] and [`InvoiceStore`] traits. The
//! SQLite implementations are used in production, the in-memory ones in
//! tests and local experiments.

pub mod accounts;
pub mod db;
pub mod invoices;
pub mod memory;
pub mod migrations;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::core::{AppResult, StoreResult};
use crate::payment::PendingInvoice;
use crate::quota::{Account, AccountId};

// Re-exports for convenience
pub use accounts::SqliteUserStore;
pub use db::{create_pool, get_connection, DbConnection, DbPool};
pub use invoices::SqliteInvoiceStore;
pub use memory::{MemoryInvoiceStore, MemoryUserStore};

/// Mutation applied to an account inside [`UserStore::update`].
///
/// Returning an error rejects the mutation: the account is left exactly as
/// it was after normalization and the error is handed back to the caller.
pub type AccountMutator = Box<dyn FnOnce(&mut Account) -> AppResult<()> + Send>;

/// Persistent account records keyed by Telegram id.
///
/// Every read applies lazy premium expiry and the daily reset, and writes the
/// result back, so callers never observe a stale plan or yesterday's counter.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Load an account, creating a default free record on first sight
    async fn get_or_create(&self, id: AccountId) -> StoreResult<Account>;

    /// Load an account without creating it
    async fn get(&self, id: AccountId) -> StoreResult<Option<Account>>;

    /// Case-insensitive lookup by the last known username (without '@')
    async fn find_by_username(&self, username: &str) -> StoreResult<Option<Account>>;

    /// Atomic read-modify-write of one account.
    ///
    /// Concurrent updates of the same id are serialized; updates of different
    /// ids do not wait on each other. Missing accounts are created first.
    async fn update(&self, id: AccountId, mutator: AccountMutator) -> AppResult<Account>;

    /// Every account, normalized
    async fn list_all(&self) -> StoreResult<Vec<Account>>;
}

/// Pending crypto invoices awaiting an IPN
#[async_trait]
pub trait InvoiceStore: Send + Sync {
    async fn insert(&self, invoice: PendingInvoice) -> StoreResult<()>;

    async fn find(&self, invoice_id: &str) -> StoreResult<Option<PendingInvoice>>;

    async fn find_by_order(&self, order_id: &str) -> StoreResult<Option<PendingInvoice>>;

    /// Remove and return the invoice.
    ///
    /// Exactly one of several concurrent callers gets `Some`.
    async fn take(&self, invoice_id: &str) -> StoreResult<Option<PendingInvoice>>;

    /// Remove and return every invoice created strictly before `cutoff`
    async fn remove_created_before(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<PendingInvoice>>;
}

/// Normalize usernames for storage and lookup
pub fn normalize_username(username: &str) -> Option<String> {
    let trimmed = username.trim().trim_start_matches('@');
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
