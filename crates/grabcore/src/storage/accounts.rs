//! SQLite-backed [`UserStore`]
//!
//! Queries run on the blocking pool. Each update is a `BEGIN IMMEDIATE`
//! transaction, and updates of the same account additionally queue on an
//! in-process async lock so they never compete for the SQLite write lock.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use dashmap::DashMap;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::core::{AppResult, SharedClock, StorageError, StoreResult};
use crate::quota::{Account, AccountId, Plan, TrialFlags};
use crate::storage::db::{get_connection, DbConnection, DbPool};
use crate::storage::{normalize_username, AccountMutator, UserStore};

const ACCOUNT_COLUMNS: &str = "id, username, chat_id, plan, expires_at, downloads_used, usage_day, \
     downloads_total, pdf_trial_used, gif_trial_used, text_pdf_trial_used, banned, created_at";

/// Per-account async locks
///
/// An entry lives only while someone holds or waits for it.
#[derive(Default)]
pub(crate) struct KeyedLocks {
    inner: DashMap<AccountId, Arc<Mutex<()>>>,
}

impl KeyedLocks {
    pub(crate) async fn lock(&self, id: AccountId) -> KeyedGuard<'_> {
        // Clone the Arc out so the map shard is not held across the await
        let mutex = self.inner.entry(id).or_default().clone();
        let guard = mutex.lock_owned().await;
        KeyedGuard {
            locks: self,
            id,
            guard: Some(guard),
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner.len()
    }
}

pub(crate) struct KeyedGuard<'a> {
    locks: &'a KeyedLocks,
    id: AccountId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for KeyedGuard<'_> {
    fn drop(&mut self) {
        // Release first so our own Arc no longer counts
        drop(self.guard.take());
        self.locks
            .inner
            .remove_if(&self.id, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

pub struct SqliteUserStore {
    pool: Arc<DbPool>,
    clock: SharedClock,
    locks: KeyedLocks,
}

impl SqliteUserStore {
    pub fn new(pool: Arc<DbPool>, clock: SharedClock) -> Self {
        Self {
            pool,
            clock,
            locks: KeyedLocks::default(),
        }
    }

    async fn blocking<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut DbConnection) -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: From<StorageError> + Send + 'static,
    {
        let pool = Arc::clone(&self.pool);
        let joined = tokio::task::spawn_blocking(move || {
            let mut conn = get_connection(&pool).map_err(StorageError::from)?;
            f(&mut conn)
        })
        .await;
        match joined {
            Ok(result) => result,
            Err(e) => Err(E::from(StorageError::from(e))),
        }
    }
}

/// Raw column values, decoded outside the rusqlite row closure
struct AccountRow {
    id: i64,
    username: Option<String>,
    chat_id: Option<i64>,
    plan: String,
    expires_at: Option<String>,
    downloads_used: i64,
    usage_day: Option<String>,
    downloads_total: i64,
    pdf_trial_used: bool,
    gif_trial_used: bool,
    text_pdf_trial_used: bool,
    banned: bool,
    created_at: String,
}

impl AccountRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            username: row.get(1)?,
            chat_id: row.get(2)?,
            plan: row.get(3)?,
            expires_at: row.get(4)?,
            downloads_used: row.get(5)?,
            usage_day: row.get(6)?,
            downloads_total: row.get(7)?,
            pdf_trial_used: row.get(8)?,
            gif_trial_used: row.get(9)?,
            text_pdf_trial_used: row.get(10)?,
            banned: row.get(11)?,
            created_at: row.get(12)?,
        })
    }

    fn into_account(self) -> StoreResult<Account> {
        let plan = Plan::parse(&self.plan)
            .ok_or_else(|| StorageError::Corrupt(format!("account {}: unknown plan '{}'", self.id, self.plan)))?;
        let expires_at = self.expires_at.as_deref().map(parse_timestamp).transpose()?;
        let usage_day = self
            .usage_day
            .as_deref()
            .map(|day| {
                NaiveDate::parse_from_str(day, "%Y-%m-%d")
                    .map_err(|e| StorageError::Corrupt(format!("account {}: bad usage_day '{}': {}", self.id, day, e)))
            })
            .transpose()?;

        Ok(Account {
            id: self.id,
            username: self.username,
            chat_id: self.chat_id,
            plan,
            expires_at,
            downloads_used: u32::try_from(self.downloads_used).unwrap_or(0),
            usage_day,
            downloads_total: u64::try_from(self.downloads_total).unwrap_or(0),
            trials: TrialFlags {
                pdf_used: self.pdf_trial_used,
                gif_used: self.gif_trial_used,
                text_pdf_used: self.text_pdf_trial_used,
            },
            banned: self.banned,
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

pub(crate) fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(value: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| StorageError::Corrupt(format!("bad timestamp '{}': {}", value, e)))
}

fn load_account(conn: &Connection, id: AccountId) -> StoreResult<Option<Account>> {
    let sql = format!("SELECT {} FROM accounts WHERE id = ?1", ACCOUNT_COLUMNS);
    let row = conn
        .query_row(&sql, params![id], AccountRow::from_row)
        .optional()?;
    row.map(AccountRow::into_account).transpose()
}

fn save_account(conn: &Connection, account: &Account) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO accounts (id, username, chat_id, plan, expires_at, downloads_used, usage_day,
                               downloads_total, pdf_trial_used, gif_trial_used, text_pdf_trial_used,
                               banned, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
         ON CONFLICT(id) DO UPDATE SET
            username = excluded.username,
            chat_id = excluded.chat_id,
            plan = excluded.plan,
            expires_at = excluded.expires_at,
            downloads_used = excluded.downloads_used,
            usage_day = excluded.usage_day,
            downloads_total = excluded.downloads_total,
            pdf_trial_used = excluded.pdf_trial_used,
            gif_trial_used = excluded.gif_trial_used,
            text_pdf_trial_used = excluded.text_pdf_trial_used,
            banned = excluded.banned",
        params![
            account.id,
            account.username,
            account.chat_id,
            account.plan.as_str(),
            account.expires_at.as_ref().map(format_timestamp),
            account.downloads_used,
            account.usage_day.map(|d| d.format("%Y-%m-%d").to_string()),
            i64::try_from(account.downloads_total).unwrap_or(i64::MAX),
            account.trials.pdf_used,
            account.trials.gif_used,
            account.trials.text_pdf_used,
            account.banned,
            format_timestamp(&account.created_at),
        ],
    )?;
    Ok(())
}

/// Load (or create), normalize and persist inside the given connection.
fn load_normalized(conn: &Connection, id: AccountId, now: DateTime<Utc>, create: bool) -> StoreResult<Option<Account>> {
    let mut account = match load_account(conn, id)? {
        Some(account) => account,
        None if create => {
            let account = Account::new(id, now);
            save_account(conn, &account)?;
            log::info!("Created account {}", id);
            return Ok(Some(account));
        }
        None => return Ok(None),
    };
    if account.normalize(now) {
        save_account(conn, &account)?;
    }
    Ok(Some(account))
}

fn get_in_tx(conn: &mut Connection, id: AccountId, now: DateTime<Utc>, create: bool) -> StoreResult<Option<Account>> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let account = load_normalized(&tx, id, now, create)?;
    tx.commit()?;
    Ok(account)
}

fn update_in_tx(conn: &mut Connection, id: AccountId, now: DateTime<Utc>, mutator: AccountMutator) -> AppResult<Account> {
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(StorageError::from)?;
    let current = load_normalized(&tx, id, now, true)?
        .ok_or_else(|| StorageError::Corrupt(format!("account {} vanished inside its transaction", id)))?;

    let mut candidate = current.clone();
    match mutator(&mut candidate) {
        Ok(()) => {
            if candidate != current {
                save_account(&tx, &candidate)?;
            }
            tx.commit().map_err(StorageError::from)?;
            Ok(candidate)
        }
        Err(rejection) => {
            // Keep the normalization, drop the mutation
            tx.commit().map_err(StorageError::from)?;
            Err(rejection)
        }
    }
}

#[async_trait]
impl UserStore for SqliteUserStore {
    async fn get_or_create(&self, id: AccountId) -> StoreResult<Account> {
        let _guard = self.locks.lock(id).await;
        let now = self.clock.now();
        let account = self.blocking(move |conn| get_in_tx(conn, id, now, true)).await?;
        account.ok_or_else(|| StorageError::Corrupt(format!("account {} was not created", id)))
    }

    async fn get(&self, id: AccountId) -> StoreResult<Option<Account>> {
        let _guard = self.locks.lock(id).await;
        let now = self.clock.now();
        self.blocking(move |conn| get_in_tx(conn, id, now, false)).await
    }

    async fn find_by_username(&self, username: &str) -> StoreResult<Option<Account>> {
        let Some(name) = normalize_username(username) else {
            return Ok(None);
        };
        let id: Option<AccountId> = self
            .blocking(move |conn| {
                conn.query_row(
                    "SELECT id FROM accounts WHERE username = ?1 COLLATE NOCASE ORDER BY id LIMIT 1",
                    params![name],
                    |row| row.get(0),
                )
                .optional()
                .map_err(StorageError::from)
            })
            .await?;
        match id {
            Some(id) => self.get(id).await,
            None => Ok(None),
        }
    }

    async fn update(&self, id: AccountId, mutator: AccountMutator) -> AppResult<Account> {
        let _guard = self.locks.lock(id).await;
        let now = self.clock.now();
        self.blocking(move |conn| update_in_tx(conn, id, now, mutator)).await
    }

    async fn list_all(&self) -> StoreResult<Vec<Account>> {
        let now = self.clock.now();
        self.blocking(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let rows = {
                let sql = format!("SELECT {} FROM accounts ORDER BY id", ACCOUNT_COLUMNS);
                let mut stmt = tx.prepare(&sql)?;
                let rows = stmt
                    .query_map([], AccountRow::from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            };
            let mut accounts = Vec::with_capacity(rows.len());
            for row in rows {
                let mut account = row.into_account()?;
                if account.normalize(now) {
                    save_account(&tx, &account)?;
                }
                accounts.push(account);
            }
            tx.commit()?;
            Ok(accounts)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{AppError, Clock, ManualClock};
    use crate::quota::ActionKind;
    use chrono::{Duration, TimeZone};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Arc<ManualClock>, SqliteUserStore) {
        let dir = tempfile::tempdir().unwrap();
        let pool = crate::storage::create_pool(dir.path().join("test.sqlite").to_str().unwrap()).unwrap();
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap()));
        let store = SqliteUserStore::new(Arc::new(pool), clock.clone());
        (dir, clock, store)
    }

    #[tokio::test]
    async fn test_lock_entries_are_dropped_after_use() {
        let locks = KeyedLocks::default();
        {
            let _first = locks.lock(1).await;
            let _second = locks.lock(2).await;
            assert_eq!(locks.len(), 2);
        }
        assert_eq!(locks.len(), 0);
    }

    #[tokio::test]
    async fn test_lock_entry_survives_while_contended() {
        let locks = Arc::new(KeyedLocks::default());
        let held = locks.lock(7).await;

        let waiter = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _guard = locks.lock(7).await;
            })
        };
        tokio::task::yield_now().await;
        drop(held);
        waiter.await.unwrap();
        assert_eq!(locks.len(), 0);
    }

    #[tokio::test]
    async fn test_get_or_create_persists_default() {
        let (_dir, _clock, store) = setup();
        assert!(store.get(7).await.unwrap().is_none());
        let created = store.get_or_create(7).await.unwrap();
        assert_eq!(created.plan, Plan::Free);
        assert_eq!(store.get(7).await.unwrap(), Some(created));
    }

    #[tokio::test]
    async fn test_update_roundtrips_all_fields() {
        let (_dir, clock, store) = setup();
        let expires = clock.now() + Duration::days(30);
        let updated = store
            .update(
                9,
                Box::new(move |acc: &mut Account| {
                    acc.username = Some("Alice".to_string());
                    acc.chat_id = Some(900);
                    acc.apply_upgrade(expires);
                    acc.trials.gif_used = true;
                    acc.banned = true;
                    Ok(())
                }),
            )
            .await
            .unwrap();
        let loaded = store.get(9).await.unwrap().unwrap();
        assert_eq!(loaded, updated);
        assert_eq!(loaded.expires_at, Some(expires));
    }

    #[tokio::test]
    async fn test_rejected_mutation_keeps_normalization_only() {
        let (_dir, clock, store) = setup();
        store
            .update(1, Box::new(|acc: &mut Account| acc.try_consume(ActionKind::Download, 3)))
            .await
            .unwrap();
        clock.advance(Duration::days(1));

        let err = store
            .update(
                1,
                Box::new(|acc: &mut Account| {
                    acc.downloads_used = 99;
                    Err(AppError::Validation("nope".to_string()))
                }),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let loaded = store.get(1).await.unwrap().unwrap();
        assert_eq!(loaded.downloads_used, 0);
        assert_eq!(loaded.usage_day, Some(clock.now().date_naive()));
    }

    #[tokio::test]
    async fn test_find_by_username_is_case_insensitive() {
        let (_dir, _clock, store) = setup();
        store
            .update(
                5,
                Box::new(|acc: &mut Account| {
                    acc.username = Some("BobTheBuilder".to_string());
                    Ok(())
                }),
            )
            .await
            .unwrap();
        let found = store.find_by_username("@bobthebuilder").await.unwrap().unwrap();
        assert_eq!(found.id, 5);
        assert!(store.find_by_username("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_all_persists_lazy_downgrade() {
        let (_dir, clock, store) = setup();
        let expires = clock.now() + Duration::hours(1);
        store
            .update(3, Box::new(move |acc: &mut Account| {
                acc.apply_upgrade(expires);
                Ok(())
            }))
            .await
            .unwrap();
        clock.advance(Duration::hours(2));

        let all = store.list_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].plan, Plan::Free);

        let conn = get_connection(&store.pool).unwrap();
        let plan: String = conn
            .query_row("SELECT plan FROM accounts WHERE id = 3", [], |row| row.get(0))
            .unwrap();
        assert_eq!(plan, "free");
    }

    #[tokio::test]
    async fn test_corrupt_plan_is_reported() {
        let (_dir, _clock, store) = setup();
        store.get_or_create(11).await.unwrap();
        {
            let conn = get_connection(&store.pool).unwrap();
            conn.execute("UPDATE accounts SET plan = 'gold' WHERE id = 11", []).unwrap();
        }
        let err = store.get(11).await.unwrap_err();
        assert!(matches!(err, StorageError::Corrupt(_)));
    }
}
