//! Admin operations: plan changes, bans, statistics, CSV export, broadcast
//!
//! Every operation takes the caller id first and refuses anyone but the
//! configured admin with `Forbidden`.

use chrono::Duration;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::core::config;
use crate::core::metrics::BROADCAST_DELIVERIES_TOTAL;
use crate::core::{AppError, AppResult, MessageSink, SharedClock};
use crate::quota::{Account, AccountId, Plan};
use crate::storage::UserStore;

/// Target of an admin command: numeric id or `@username`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountRef {
    Id(AccountId),
    Username(String),
}

impl FromStr for AccountRef {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Ok(id) = trimmed.parse::<AccountId>() {
            return Ok(AccountRef::Id(id));
        }
        let name = trimmed.trim_start_matches('@');
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(AppError::Validation(format!("'{}' is not a user id or @username", s)));
        }
        Ok(AccountRef::Username(name.to_string()))
    }
}

impl fmt::Display for AccountRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccountRef::Id(id) => write!(f, "{}", id),
            AccountRef::Username(name) => write!(f, "@{}", name),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountStats {
    pub total: usize,
    pub premium: usize,
    pub free: usize,
    pub banned: usize,
    /// Free-plan downloads counted today
    pub downloads_today: u64,
    /// Lifetime downloads, all plans
    pub downloads_total: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Result of ban / unban
#[derive(Debug, Clone, PartialEq)]
pub struct ToggleOutcome {
    pub account: Account,
    /// False when the account was already in the requested state
    pub changed: bool,
}

pub struct AdminService {
    store: Arc<dyn UserStore>,
    clock: SharedClock,
    admin_id: AccountId,
    broadcast_delay: std::time::Duration,
}

impl AdminService {
    pub fn new(store: Arc<dyn UserStore>, clock: SharedClock, admin_id: AccountId) -> Self {
        Self {
            store,
            clock,
            admin_id,
            broadcast_delay: config::admin::broadcast_delay(),
        }
    }

    /// Override the pause between broadcast deliveries
    pub fn with_broadcast_delay(mut self, delay: std::time::Duration) -> Self {
        self.broadcast_delay = delay;
        self
    }

    pub fn admin_id(&self) -> AccountId {
        self.admin_id
    }

    pub fn is_admin(&self, caller: AccountId) -> bool {
        self.admin_id != 0 && caller == self.admin_id
    }

    fn authorize(&self, caller: AccountId) -> AppResult<()> {
        if self.is_admin(caller) {
            Ok(())
        } else {
            log::warn!("Admin operation refused for {}", caller);
            Err(AppError::Forbidden(format!("{} is not an admin", caller)))
        }
    }

    /// Resolve a target to an existing account
    pub async fn resolve(&self, target: &AccountRef) -> AppResult<Account> {
        let found = match target {
            AccountRef::Id(id) => self.store.get(*id).await?,
            AccountRef::Username(name) => self.store.find_by_username(name).await?,
        };
        found.ok_or_else(|| AppError::NotFound(format!("user {}", target)))
    }

    /// Premium for `duration` from now, daily counter reset
    pub async fn upgrade(&self, caller: AccountId, target: &AccountRef, duration: Duration) -> AppResult<Account> {
        self.authorize(caller)?;
        if duration <= Duration::zero() {
            return Err(AppError::Validation("duration must be positive".to_string()));
        }
        let account = self.resolve(target).await?;
        let expires_at = self.clock.now() + duration;
        let updated = self
            .store
            .update(
                account.id,
                Box::new(move |acc: &mut Account| {
                    acc.apply_upgrade(expires_at);
                    Ok(())
                }),
            )
            .await?;
        log::info!("Admin upgraded {} to premium until {}", target, expires_at);
        Ok(updated)
    }

    /// Back to free immediately, trials kept
    pub async fn downgrade(&self, caller: AccountId, target: &AccountRef) -> AppResult<Account> {
        self.authorize(caller)?;
        let account = self.resolve(target).await?;
        let updated = self
            .store
            .update(
                account.id,
                Box::new(|acc: &mut Account| {
                    acc.apply_downgrade();
                    Ok(())
                }),
            )
            .await?;
        log::info!("Admin downgraded {} to free", target);
        Ok(updated)
    }

    pub async fn ban(&self, caller: AccountId, target: &AccountRef) -> AppResult<ToggleOutcome> {
        self.set_banned(caller, target, true).await
    }

    pub async fn unban(&self, caller: AccountId, target: &AccountRef) -> AppResult<ToggleOutcome> {
        self.set_banned(caller, target, false).await
    }

    async fn set_banned(&self, caller: AccountId, target: &AccountRef, banned: bool) -> AppResult<ToggleOutcome> {
        self.authorize(caller)?;
        let account = self.resolve(target).await?;
        if account.banned == banned {
            return Ok(ToggleOutcome { account, changed: false });
        }
        let updated = self
            .store
            .update(
                account.id,
                Box::new(move |acc: &mut Account| {
                    acc.banned = banned;
                    Ok(())
                }),
            )
            .await?;
        log::info!("Admin set banned={} for {}", banned, target);
        Ok(ToggleOutcome {
            account: updated,
            changed: true,
        })
    }

    pub async fn stats(&self, caller: AccountId) -> AppResult<AccountStats> {
        self.authorize(caller)?;
        let accounts = self.store.list_all().await?;
        Ok(compute_stats(&accounts))
    }

    /// All accounts as CSV text
    pub async fn export_csv(&self, caller: AccountId) -> AppResult<String> {
        self.authorize(caller)?;
        let accounts = self.store.list_all().await?;
        accounts_to_csv(&accounts)
    }

    /// Send `message` to every non-banned account, pacing deliveries.
    ///
    /// Individual delivery failures are counted, never fatal.
    pub async fn broadcast(&self, caller: AccountId, message: &str, sink: &dyn MessageSink) -> AppResult<BroadcastReport> {
        self.authorize(caller)?;
        if message.trim().is_empty() {
            return Err(AppError::Validation("broadcast message is empty".to_string()));
        }

        let recipients: Vec<Account> = self
            .store
            .list_all()
            .await?
            .into_iter()
            .filter(|a| !a.banned)
            .collect();
        log::info!("Broadcasting to {} accounts", recipients.len());

        let mut report = BroadcastReport::default();
        for (i, account) in recipients.iter().enumerate() {
            if i > 0 && !self.broadcast_delay.is_zero() {
                tokio::time::sleep(self.broadcast_delay).await;
            }
            match sink.deliver(account.delivery_chat(), message).await {
                Ok(()) => {
                    report.delivered += 1;
                    BROADCAST_DELIVERIES_TOTAL.with_label_values(&["delivered"]).inc();
                }
                Err(e) => {
                    report.failed += 1;
                    BROADCAST_DELIVERIES_TOTAL.with_label_values(&["failed"]).inc();
                    log::warn!("Broadcast to {} failed: {}", account.id, e);
                }
            }
        }

        log::info!("Broadcast finished: {} delivered, {} failed", report.delivered, report.failed);
        Ok(report)
    }
}

pub fn compute_stats(accounts: &[Account]) -> AccountStats {
    let mut stats = AccountStats {
        total: accounts.len(),
        ..AccountStats::default()
    };
    for account in accounts {
        match account.plan {
            Plan::Premium => stats.premium += 1,
            Plan::Free => stats.free += 1,
        }
        if account.banned {
            stats.banned += 1;
        }
        stats.downloads_today += u64::from(account.downloads_used);
        stats.downloads_total += account.downloads_total;
    }
    stats
}

pub const CSV_HEADER: &str =
    "id,username,plan,expires_at,banned,pdf_trial_used,gif_trial_used,text_pdf_trial_used,downloads_used,downloads_total";

/// One exported account; field order is the column order
#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    id: AccountId,
    username: &'a str,
    plan: &'static str,
    expires_at: String,
    banned: bool,
    pdf_trial_used: bool,
    gif_trial_used: bool,
    text_pdf_trial_used: bool,
    downloads_used: u32,
    downloads_total: u64,
}

impl<'a> From<&'a Account> for CsvRow<'a> {
    fn from(a: &'a Account) -> Self {
        Self {
            id: a.id,
            username: a.username.as_deref().unwrap_or(""),
            plan: a.plan.as_str(),
            expires_at: a.expires_at.map(|e| e.to_rfc3339()).unwrap_or_default(),
            banned: a.banned,
            pdf_trial_used: a.trials.pdf_used,
            gif_trial_used: a.trials.gif_used,
            text_pdf_trial_used: a.trials.text_pdf_used,
            downloads_used: a.downloads_used,
            downloads_total: a.downloads_total,
        }
    }
}

pub fn accounts_to_csv(accounts: &[Account]) -> AppResult<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    if accounts.is_empty() {
        // serde headers are only written with the first row
        writer.write_record(CSV_HEADER.split(','))?;
    }
    for account in accounts {
        writer.serialize(CsvRow::from(account))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| AppError::Export(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| AppError::Export(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ManualClock;
    use crate::storage::MemoryUserStore;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    const ADMIN: AccountId = 1000;

    fn service() -> (Arc<ManualClock>, Arc<MemoryUserStore>, AdminService) {
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 7, 1, 9, 0, 0).unwrap()));
        let store = Arc::new(MemoryUserStore::new(clock.clone()));
        let admin = AdminService::new(store.clone(), clock.clone(), ADMIN).with_broadcast_delay(std::time::Duration::ZERO);
        (clock, store, admin)
    }

    #[test]
    fn test_account_ref_parsing() {
        assert_eq!("12345".parse::<AccountRef>().unwrap(), AccountRef::Id(12345));
        assert_eq!("@some_user".parse::<AccountRef>().unwrap(), AccountRef::Username("some_user".to_string()));
        assert!("@".parse::<AccountRef>().is_err());
        assert!("bad name".parse::<AccountRef>().is_err());
    }

    #[tokio::test]
    async fn test_unknown_target_is_not_found() {
        let (_clock, _store, admin) = service();
        let err = admin.ban(ADMIN, &AccountRef::Username("ghost".into())).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_no_admin_configured_refuses_everyone() {
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 7, 1, 9, 0, 0).unwrap()));
        let store = Arc::new(MemoryUserStore::new(clock.clone()));
        let admin = AdminService::new(store, clock, 0);
        assert!(matches!(admin.stats(0).await, Err(AppError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_ban_twice_reports_unchanged() {
        let (_clock, store, admin) = service();
        store.get_or_create(5).await.unwrap();
        assert!(admin.ban(ADMIN, &AccountRef::Id(5)).await.unwrap().changed);
        assert!(!admin.ban(ADMIN, &AccountRef::Id(5)).await.unwrap().changed);
        assert!(admin.unban(ADMIN, &AccountRef::Id(5)).await.unwrap().changed);
    }

    #[tokio::test]
    async fn test_upgrade_rejects_non_positive_duration() {
        let (_clock, store, admin) = service();
        store.get_or_create(5).await.unwrap();
        let err = admin.upgrade(ADMIN, &AccountRef::Id(5), Duration::zero()).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn test_csv_escapes_and_columns() {
        let now = Utc.with_ymd_and_hms(2024, 7, 1, 9, 0, 0).unwrap();
        let mut a = Account::new(1, now);
        a.username = Some("we,ird".to_string());
        a.trials.gif_used = true;
        let csv = accounts_to_csv(&[a]).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], CSV_HEADER);
        assert_eq!(lines[1], "1,\"we,ird\",free,,false,false,true,false,0,0");
    }

    #[test]
    fn test_csv_keeps_newlines_in_fields() {
        let now = Utc.with_ymd_and_hms(2024, 7, 1, 9, 0, 0).unwrap();
        let mut a = Account::new(1, now);
        a.username = Some("two\nlines \"quoted\"".to_string());
        let csv = accounts_to_csv(&[a]).unwrap();

        let mut reader = csv::Reader::from_reader(csv.as_bytes());
        let records: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(records.len(), 1);
        assert_eq!(&records[0][1], "two\nlines \"quoted\"");
        assert_eq!(&records[0][9], "0");
    }

    #[test]
    fn test_csv_without_accounts_has_header() {
        let csv = accounts_to_csv(&[]).unwrap();
        assert_eq!(csv.trim_end(), CSV_HEADER);
    }

    #[test]
    fn test_compute_stats() {
        let now = Utc.with_ymd_and_hms(2024, 7, 1, 9, 0, 0).unwrap();
        let mut a = Account::new(1, now);
        a.downloads_used = 2;
        a.downloads_total = 10;
        let mut b = Account::new(2, now);
        b.apply_upgrade(now + Duration::days(1));
        b.downloads_total = 5;
        b.banned = true;
        let stats = compute_stats(&[a, b]);
        assert_eq!(
            stats,
            AccountStats {
                total: 2,
                premium: 1,
                free: 1,
                banned: 1,
                downloads_today: 2,
                downloads_total: 15,
            }
        );
    }
}
