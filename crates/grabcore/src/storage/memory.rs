//! In-memory stores with the same semantics as the SQLite ones

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;

use crate::core::{AppResult, SharedClock, StoreResult};
use crate::payment::PendingInvoice;
use crate::quota::{Account, AccountId};
use crate::storage::{normalize_username, AccountMutator, InvoiceStore, UserStore};

pub struct MemoryUserStore {
    accounts: Mutex<HashMap<AccountId, Account>>,
    clock: SharedClock,
}

impl MemoryUserStore {
    pub fn new(clock: SharedClock) -> Self {
        Self {
            accounts: Mutex::new(HashMap::new()),
            clock,
        }
    }

    fn normalized_entry(accounts: &mut HashMap<AccountId, Account>, id: AccountId, now: DateTime<Utc>) -> &mut Account {
        let account = accounts.entry(id).or_insert_with(|| Account::new(id, now));
        account.normalize(now);
        account
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn get_or_create(&self, id: AccountId) -> StoreResult<Account> {
        let now = self.clock.now();
        let mut accounts = self.accounts.lock().await;
        Ok(Self::normalized_entry(&mut accounts, id, now).clone())
    }

    async fn get(&self, id: AccountId) -> StoreResult<Option<Account>> {
        let now = self.clock.now();
        let mut accounts = self.accounts.lock().await;
        Ok(accounts.get_mut(&id).map(|account| {
            account.normalize(now);
            account.clone()
        }))
    }

    async fn find_by_username(&self, username: &str) -> StoreResult<Option<Account>> {
        let Some(name) = normalize_username(username) else {
            return Ok(None);
        };
        let now = self.clock.now();
        let mut accounts = self.accounts.lock().await;
        let id = accounts
            .values()
            .filter(|a| a.username.as_deref().is_some_and(|u| u.eq_ignore_ascii_case(&name)))
            .map(|a| a.id)
            .min();
        Ok(id.map(|id| Self::normalized_entry(&mut accounts, id, now).clone()))
    }

    async fn update(&self, id: AccountId, mutator: AccountMutator) -> AppResult<Account> {
        let now = self.clock.now();
        let mut accounts = self.accounts.lock().await;
        let current = Self::normalized_entry(&mut accounts, id, now);
        let mut candidate = current.clone();
        mutator(&mut candidate)?;
        *current = candidate.clone();
        Ok(candidate)
    }

    async fn list_all(&self) -> StoreResult<Vec<Account>> {
        let now = self.clock.now();
        let mut accounts = self.accounts.lock().await;
        let mut all: Vec<Account> = accounts
            .values_mut()
            .map(|account| {
                account.normalize(now);
                account.clone()
            })
            .collect();
        all.sort_by_key(|a| a.id);
        Ok(all)
    }
}

#[derive(Default)]
pub struct MemoryInvoiceStore {
    invoices: Mutex<HashMap<String, PendingInvoice>>,
}

impl MemoryInvoiceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl InvoiceStore for MemoryInvoiceStore {
    async fn insert(&self, invoice: PendingInvoice) -> StoreResult<()> {
        self.invoices.lock().await.insert(invoice.invoice_id.clone(), invoice);
        Ok(())
    }

    async fn find(&self, invoice_id: &str) -> StoreResult<Option<PendingInvoice>> {
        Ok(self.invoices.lock().await.get(invoice_id).cloned())
    }

    async fn find_by_order(&self, order_id: &str) -> StoreResult<Option<PendingInvoice>> {
        Ok(self
            .invoices
            .lock()
            .await
            .values()
            .find(|inv| inv.order_id == order_id)
            .cloned())
    }

    async fn take(&self, invoice_id: &str) -> StoreResult<Option<PendingInvoice>> {
        Ok(self.invoices.lock().await.remove(invoice_id))
    }

    async fn remove_created_before(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<PendingInvoice>> {
        let mut invoices = self.invoices.lock().await;
        let expired: Vec<String> = invoices
            .values()
            .filter(|inv| inv.created_at < cutoff)
            .map(|inv| inv.invoice_id.clone())
            .collect();
        Ok(expired.iter().filter_map(|id| invoices.remove(id)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{AppError, ManualClock};
    use crate::quota::ActionKind;
    use chrono::{Duration, TimeZone};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_rejected_update_is_not_applied() {
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 2, 2, 8, 0, 0).unwrap()));
        let store = MemoryUserStore::new(clock.clone());
        for _ in 0..3 {
            store
                .update(1, Box::new(|acc: &mut Account| acc.try_consume(ActionKind::Download, 3)))
                .await
                .unwrap();
        }
        let err = store
            .update(1, Box::new(|acc: &mut Account| acc.try_consume(ActionKind::Download, 3)))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::QuotaExceeded(ActionKind::Download)));
        assert_eq!(store.get(1).await.unwrap().unwrap().downloads_used, 3);

        clock.advance(Duration::days(1));
        assert_eq!(store.get(1).await.unwrap().unwrap().downloads_used, 0);
    }
}
