//! Common test utilities
//!
//! Shared across the grabcore integration tests. Every scenario can run
//! against both store backends through [`TestEnvironment::new`].

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use grabcore::core::{AppResult, ManualClock, MessageSink};
use grabcore::payment::signature;
use grabcore::payment::{CreatedInvoice, InvoiceRequest, PaymentGateway, PaymentSettings, PricingTier};
use grabcore::quota::{AdminService, EntitlementService, QuotaLimits};
use grabcore::storage::{
    create_pool, InvoiceStore, MemoryInvoiceStore, MemoryUserStore, SqliteInvoiceStore, SqliteUserStore, UserStore,
};
use grabcore::PaymentService;

pub const ADMIN_ID: i64 = 777;
pub const IPN_SECRET: &str = "test-ipn-secret";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Memory,
    Sqlite,
}

pub const BACKENDS: [Backend; 2] = [Backend::Memory, Backend::Sqlite];

/// Gateway that hands out sequential invoice ids
#[derive(Default)]
pub struct FakeGateway {
    next: Mutex<u64>,
    pub cancelled: Mutex<Vec<String>>,
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_invoice(&self, _request: &InvoiceRequest) -> AppResult<CreatedInvoice> {
        let mut next = self.next.lock().unwrap();
        *next += 1;
        Ok(CreatedInvoice {
            id: format!("{}", 5_000 + *next),
            invoice_url: Some(format!("https://pay.example/invoice/{}", *next)),
        })
    }

    async fn cancel_invoice(&self, invoice_id: &str) -> AppResult<()> {
        self.cancelled.lock().unwrap().push(invoice_id.to_string());
        Ok(())
    }
}

/// Sink that records deliveries and fails for chosen chats
#[derive(Default)]
pub struct RecordingSink {
    pub delivered: Mutex<Vec<(i64, String)>>,
    pub failing_chats: Vec<i64>,
}

impl RecordingSink {
    pub fn failing(chats: Vec<i64>) -> Self {
        Self {
            delivered: Mutex::new(Vec::new()),
            failing_chats: chats,
        }
    }
}

#[async_trait]
impl MessageSink for RecordingSink {
    async fn deliver(&self, chat_id: i64, text: &str) -> Result<(), String> {
        if self.failing_chats.contains(&chat_id) {
            return Err(format!("chat {} blocked the bot", chat_id));
        }
        self.delivered.lock().unwrap().push((chat_id, text.to_string()));
        Ok(())
    }
}

pub fn payment_settings() -> PaymentSettings {
    PaymentSettings {
        ipn_secret: IPN_SECRET.to_string(),
        invoice_window: chrono::Duration::minutes(20),
        amount_epsilon: 0.01,
        tiers: vec![PricingTier { amount: 2.0, days: 30 }, PricingTier { amount: 4.0, days: 60 }],
        callback_base_url: Some("https://grab.example".to_string()),
        success_url: None,
    }
}

/// Complete service graph over one backend
///
/// Clones share the database directory, which is removed when the last
/// clone is dropped.
#[derive(Clone)]
pub struct TestEnvironment {
    pub backend: Backend,
    pub clock: Arc<ManualClock>,
    pub store: Arc<dyn UserStore>,
    pub invoices: Arc<dyn InvoiceStore>,
    pub gateway: Arc<FakeGateway>,
    pub entitlements: Arc<EntitlementService>,
    pub admin: Arc<AdminService>,
    pub payments: Arc<PaymentService>,
    pub db_path: Option<PathBuf>,
    _dir: Option<Arc<TempDir>>,
}

impl TestEnvironment {
    pub fn new(backend: Backend) -> Self {
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 9, 15, 10, 0, 0).unwrap()));
        let (store, invoices, db_path, dir): (Arc<dyn UserStore>, Arc<dyn InvoiceStore>, _, _) = match backend {
            Backend::Memory => (
                Arc::new(MemoryUserStore::new(clock.clone())),
                Arc::new(MemoryInvoiceStore::new()),
                None,
                None,
            ),
            Backend::Sqlite => {
                let dir = tempfile::tempdir().unwrap();
                let db_path = dir.path().join("grab.sqlite");
                let pool = Arc::new(create_pool(db_path.to_str().unwrap()).unwrap());
                (
                    Arc::new(SqliteUserStore::new(pool.clone(), clock.clone())),
                    Arc::new(SqliteInvoiceStore::new(pool)),
                    Some(db_path),
                    Some(Arc::new(dir)),
                )
            }
        };

        let gateway = Arc::new(FakeGateway::default());
        let entitlements = Arc::new(EntitlementService::new(
            store.clone(),
            QuotaLimits { free_daily_downloads: 3 },
        ));
        let admin = Arc::new(
            AdminService::new(store.clone(), clock.clone(), ADMIN_ID).with_broadcast_delay(std::time::Duration::ZERO),
        );
        let payments = Arc::new(PaymentService::new(
            store.clone(),
            invoices.clone(),
            Some(gateway.clone()),
            clock.clone(),
            payment_settings(),
        ));

        Self {
            backend,
            clock,
            store,
            invoices,
            gateway,
            entitlements,
            admin,
            payments,
            db_path,
            _dir: dir,
        }
    }
}

/// Body bytes plus the matching `x-nowpayments-sig` value
pub fn signed_ipn(body: &Value) -> (Vec<u8>, String) {
    (serde_json::to_vec(body).unwrap(), signature::sign(IPN_SECRET, body))
}
