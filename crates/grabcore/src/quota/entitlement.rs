//! Entitlement evaluator
//!
//! Decides whether an account may perform an action and records the
//! consumption in the same atomic store update, so two concurrent requests
//! can never both take the last free slot.

use chrono::NaiveDate;
use std::future::Future;
use std::sync::Arc;

use crate::core::config;
use crate::core::metrics::ENTITLEMENT_DECISIONS_TOTAL;
use crate::core::{AppError, AppResult};
use crate::quota::{Account, AccountId, ActionKind, Plan};
use crate::storage::{normalize_username, UserStore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaLimits {
    pub free_daily_downloads: u32,
}

impl Default for QuotaLimits {
    fn default() -> Self {
        Self::from_config()
    }
}

impl QuotaLimits {
    pub fn from_config() -> Self {
        Self {
            free_daily_downloads: config::quota::FREE_DAILY_DOWNLOADS,
        }
    }
}

/// Proof that an action was allowed.
///
/// Hand it back through [`EntitlementService::release`] when producing the
/// result failed so the user is not charged for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grant {
    pub account_id: AccountId,
    pub kind: ActionKind,
    /// False for premium accounts
    pub consumed_quota: bool,
    day: Option<NaiveDate>,
}

pub struct EntitlementService {
    store: Arc<dyn UserStore>,
    limits: QuotaLimits,
}

impl EntitlementService {
    pub fn new(store: Arc<dyn UserStore>, limits: QuotaLimits) -> Self {
        Self { store, limits }
    }

    pub fn limits(&self) -> &QuotaLimits {
        &self.limits
    }

    /// Record the latest username and chat for an account, creating it if needed.
    ///
    /// Banned accounts are returned unchanged; callers check `banned` on the result.
    pub async fn touch(&self, id: AccountId, username: Option<&str>, chat_id: Option<i64>) -> AppResult<Account> {
        let username = username.and_then(normalize_username);
        self.store
            .update(
                id,
                Box::new(move |acc: &mut Account| {
                    if acc.banned {
                        return Ok(());
                    }
                    if username.is_some() {
                        acc.username = username;
                    }
                    if chat_id.is_some() {
                        acc.chat_id = chat_id;
                    }
                    Ok(())
                }),
            )
            .await
    }

    /// Account view for /profile. Banned accounts get `Forbidden`.
    pub async fn profile(&self, id: AccountId) -> AppResult<Account> {
        let account = self.store.get_or_create(id).await?;
        if account.banned {
            return Err(AppError::Forbidden(format!("account {} is banned", id)));
        }
        Ok(account)
    }

    /// Non-consuming preview of [`acquire`](Self::acquire), used to fail early
    /// before asking the user for input.
    pub async fn check(&self, id: AccountId, kind: ActionKind) -> AppResult<()> {
        let mut account = self.store.get_or_create(id).await?;
        account.try_consume(kind, self.limits.free_daily_downloads)
    }

    /// Check and consume atomically.
    pub async fn acquire(&self, id: AccountId, kind: ActionKind) -> AppResult<Grant> {
        let limit = self.limits.free_daily_downloads;
        let result = self
            .store
            .update(id, Box::new(move |acc: &mut Account| acc.try_consume(kind, limit)))
            .await;

        match result {
            Ok(account) => {
                ENTITLEMENT_DECISIONS_TOTAL
                    .with_label_values(&[kind.as_str(), "allowed"])
                    .inc();
                // The mutator ran against the normalized record, so the stored
                // plan tells whether anything was consumed.
                let consumed_quota = account.plan == Plan::Free;
                log::info!(
                    "Entitlement granted: account={} action={} plan={} used_today={}",
                    id,
                    kind.as_str(),
                    account.plan,
                    account.downloads_used
                );
                Ok(Grant {
                    account_id: id,
                    kind,
                    consumed_quota,
                    day: account.usage_day,
                })
            }
            Err(err) => {
                let outcome = match &err {
                    AppError::QuotaExceeded(_) => "quota",
                    AppError::Forbidden(_) => "banned",
                    _ => "error",
                };
                ENTITLEMENT_DECISIONS_TOTAL
                    .with_label_values(&[kind.as_str(), outcome])
                    .inc();
                log::info!("Entitlement denied: account={} action={} reason={}", id, kind.as_str(), err);
                Err(err)
            }
        }
    }

    /// Give back what a grant consumed
    pub async fn release(&self, grant: Grant) -> AppResult<()> {
        let Grant {
            account_id,
            kind,
            consumed_quota,
            day,
        } = grant;
        self.store
            .update(
                account_id,
                Box::new(move |acc: &mut Account| {
                    acc.refund(kind, consumed_quota, day);
                    Ok(())
                }),
            )
            .await?;
        ENTITLEMENT_DECISIONS_TOTAL
            .with_label_values(&[kind.as_str(), "released"])
            .inc();
        log::info!("Entitlement released: account={} action={}", account_id, kind.as_str());
        Ok(())
    }

    /// Acquire, run `produce`, and release the grant if `produce` fails
    pub async fn run_gated<T, F, Fut>(&self, id: AccountId, kind: ActionKind, produce: F) -> AppResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        let grant = self.acquire(id, kind).await?;
        match produce().await {
            Ok(value) => Ok(value),
            Err(err) => {
                log::warn!("{} for account {} failed, releasing grant: {}", kind.as_str(), id, err);
                if let Err(release_err) = self.release(grant).await {
                    log::error!("Failed to release grant for account {}: {}", id, release_err);
                }
                Err(err)
            }
        }
    }
}
