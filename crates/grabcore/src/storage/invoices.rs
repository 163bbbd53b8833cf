//! SQLite-backed [`InvoiceStore`]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use std::sync::Arc;

use crate::core::{StorageError, StoreResult};
use crate::payment::PendingInvoice;
use crate::storage::accounts::{format_timestamp, parse_timestamp};
use crate::storage::db::{get_connection, DbConnection, DbPool};
use crate::storage::InvoiceStore;

const INVOICE_COLUMNS: &str = "invoice_id, order_id, account_id, amount, invoice_url, created_at";

pub struct SqliteInvoiceStore {
    pool: Arc<DbPool>,
}

impl SqliteInvoiceStore {
    pub fn new(pool: Arc<DbPool>) -> Self {
        Self { pool }
    }

    async fn blocking<T, F>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut DbConnection) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = Arc::clone(&self.pool);
        tokio::task::spawn_blocking(move || {
            let mut conn = get_connection(&pool)?;
            f(&mut conn)
        })
        .await?
    }
}

type InvoiceRow = (String, String, i64, f64, Option<String>, String);

fn read_row(row: &Row<'_>) -> rusqlite::Result<InvoiceRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?, row.get(5)?))
}

fn into_invoice(row: InvoiceRow) -> StoreResult<PendingInvoice> {
    let (invoice_id, order_id, account_id, amount, invoice_url, created_at) = row;
    Ok(PendingInvoice {
        invoice_id,
        order_id,
        account_id,
        amount,
        invoice_url,
        created_at: parse_timestamp(&created_at)?,
    })
}

fn select_one(conn: &Connection, column: &str, value: &str) -> StoreResult<Option<PendingInvoice>> {
    let sql = format!("SELECT {} FROM pending_invoices WHERE {} = ?1 LIMIT 1", INVOICE_COLUMNS, column);
    conn.query_row(&sql, params![value], read_row)
        .optional()?
        .map(into_invoice)
        .transpose()
}

#[async_trait]
impl InvoiceStore for SqliteInvoiceStore {
    async fn insert(&self, invoice: PendingInvoice) -> StoreResult<()> {
        self.blocking(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO pending_invoices (invoice_id, order_id, account_id, amount, invoice_url, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    invoice.invoice_id,
                    invoice.order_id,
                    invoice.account_id,
                    invoice.amount,
                    invoice.invoice_url,
                    format_timestamp(&invoice.created_at),
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn find(&self, invoice_id: &str) -> StoreResult<Option<PendingInvoice>> {
        let invoice_id = invoice_id.to_string();
        self.blocking(move |conn| select_one(conn, "invoice_id", &invoice_id)).await
    }

    async fn find_by_order(&self, order_id: &str) -> StoreResult<Option<PendingInvoice>> {
        let order_id = order_id.to_string();
        self.blocking(move |conn| select_one(conn, "order_id", &order_id)).await
    }

    async fn take(&self, invoice_id: &str) -> StoreResult<Option<PendingInvoice>> {
        let invoice_id = invoice_id.to_string();
        self.blocking(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let invoice = select_one(&tx, "invoice_id", &invoice_id)?;
            if invoice.is_some() {
                tx.execute("DELETE FROM pending_invoices WHERE invoice_id = ?1", params![invoice_id])?;
            }
            tx.commit()?;
            Ok(invoice)
        })
        .await
    }

    async fn remove_created_before(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<PendingInvoice>> {
        self.blocking(move |conn| {
            let cutoff = format_timestamp(&cutoff);
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let rows = {
                let sql = format!("SELECT {} FROM pending_invoices WHERE created_at < ?1", INVOICE_COLUMNS);
                let mut stmt = tx.prepare(&sql)?;
                let rows = stmt.query_map(params![cutoff], read_row)?.collect::<Result<Vec<_>, _>>()?;
                rows
            };
            tx.execute("DELETE FROM pending_invoices WHERE created_at < ?1", params![cutoff])?;
            tx.commit()?;
            rows.into_iter().map(into_invoice).collect::<Result<Vec<_>, StorageError>>()
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use pretty_assertions::assert_eq;

    fn invoice(id: &str, created_at: DateTime<Utc>) -> PendingInvoice {
        PendingInvoice {
            invoice_id: id.to_string(),
            order_id: format!("42:2:{}", id),
            account_id: 42,
            amount: 2.0,
            invoice_url: Some(format!("https://nowpayments.io/payment/?iid={}", id)),
            created_at,
        }
    }

    fn store() -> (tempfile::TempDir, SqliteInvoiceStore) {
        let dir = tempfile::tempdir().unwrap();
        let pool = crate::storage::create_pool(dir.path().join("inv.sqlite").to_str().unwrap()).unwrap();
        (dir, SqliteInvoiceStore::new(Arc::new(pool)))
    }

    #[tokio::test]
    async fn test_take_removes_exactly_once() {
        let (_dir, store) = store();
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        store.insert(invoice("inv-1", now)).await.unwrap();

        assert_eq!(store.find("inv-1").await.unwrap(), Some(invoice("inv-1", now)));
        assert_eq!(store.find_by_order("42:2:inv-1").await.unwrap().unwrap().invoice_id, "inv-1");
        assert!(store.take("inv-1").await.unwrap().is_some());
        assert!(store.take("inv-1").await.unwrap().is_none());
        assert!(store.find("inv-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_remove_created_before() {
        let (_dir, store) = store();
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        store.insert(invoice("old", now - Duration::minutes(30))).await.unwrap();
        store.insert(invoice("fresh", now - Duration::minutes(5))).await.unwrap();

        let removed = store.remove_created_before(now - Duration::minutes(20)).await.unwrap();
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].invoice_id, "old");
        assert!(store.find("fresh").await.unwrap().is_some());
    }
}
