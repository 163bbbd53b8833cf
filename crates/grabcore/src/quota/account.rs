//! Account record and the pure rules applied to it
//!
//! Nothing here touches storage or the clock: callers pass `now` in and the
//! stores persist whatever these functions changed.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::{AppError, AppResult};

/// Immutable Telegram user id
pub type AccountId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    Free,
    Premium,
}

impl Plan {
    pub fn as_str(&self) -> &'static str {
        match self {
            Plan::Free => "free",
            Plan::Premium => "premium",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "free" => Some(Plan::Free),
            "premium" => Some(Plan::Premium),
            _ => None,
        }
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Gated user actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Download,
    ImageToPdf,
    TextToPdf,
    VideoToGif,
}

impl ActionKind {
    pub const ALL: [ActionKind; 4] = [
        ActionKind::Download,
        ActionKind::ImageToPdf,
        ActionKind::TextToPdf,
        ActionKind::VideoToGif,
    ];

    /// Metric label
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Download => "download",
            ActionKind::ImageToPdf => "image_pdf",
            ActionKind::TextToPdf => "text_pdf",
            ActionKind::VideoToGif => "video_gif",
        }
    }

    /// Human readable name used in replies
    pub fn label(&self) -> &'static str {
        match self {
            ActionKind::Download => "download",
            ActionKind::ImageToPdf => "image to PDF",
            ActionKind::TextToPdf => "text to PDF",
            ActionKind::VideoToGif => "video to GIF",
        }
    }

    /// Everything except downloads is a one-time trial on the free plan
    pub fn is_trial(&self) -> bool {
        !matches!(self, ActionKind::Download)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One-time free trials. Once set a flag never goes back to false on its own.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialFlags {
    pub pdf_used: bool,
    pub gif_used: bool,
    pub text_pdf_used: bool,
}

impl TrialFlags {
    pub fn is_used(&self, kind: ActionKind) -> bool {
        match kind {
            ActionKind::Download => false,
            ActionKind::ImageToPdf => self.pdf_used,
            ActionKind::TextToPdf => self.text_pdf_used,
            ActionKind::VideoToGif => self.gif_used,
        }
    }

    fn set(&mut self, kind: ActionKind, used: bool) {
        match kind {
            ActionKind::Download => {}
            ActionKind::ImageToPdf => self.pdf_used = used,
            ActionKind::TextToPdf => self.text_pdf_used = used,
            ActionKind::VideoToGif => self.gif_used = used,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Account {
    pub id: AccountId,
    pub username: Option<String>,
    pub chat_id: Option<i64>,
    pub plan: Plan,
    pub expires_at: Option<DateTime<Utc>>,
    /// Downloads counted against the free allowance on `usage_day`
    pub downloads_used: u32,
    pub usage_day: Option<NaiveDate>,
    /// Lifetime successful downloads, any plan
    pub downloads_total: u64,
    pub trials: TrialFlags,
    pub banned: bool,
    pub created_at: DateTime<Utc>,
}

impl Account {
    pub fn new(id: AccountId, now: DateTime<Utc>) -> Self {
        Self {
            id,
            username: None,
            chat_id: None,
            plan: Plan::Free,
            expires_at: None,
            downloads_used: 0,
            usage_day: Some(now.date_naive()),
            downloads_total: 0,
            trials: TrialFlags::default(),
            banned: false,
            created_at: now,
        }
    }

    /// Premium with an expiry strictly in the future
    pub fn is_premium_at(&self, now: DateTime<Utc>) -> bool {
        self.plan == Plan::Premium && self.expires_at.is_some_and(|exp| exp > now)
    }

    /// Where to send messages for this account
    pub fn delivery_chat(&self) -> i64 {
        self.chat_id.unwrap_or(self.id)
    }

    /// Downloads left today on the free plan
    pub fn downloads_left(&self, daily_limit: u32) -> u32 {
        daily_limit.saturating_sub(self.downloads_used)
    }

    /// Apply lazy premium expiry and the UTC daily reset.
    ///
    /// Returns `true` when anything changed and the record must be written back.
    pub fn normalize(&mut self, now: DateTime<Utc>) -> bool {
        let mut changed = false;

        if self.plan == Plan::Premium && !self.is_premium_at(now) {
            log::info!("Premium of account {} expired at {:?}, downgrading", self.id, self.expires_at);
            self.plan = Plan::Free;
            self.expires_at = None;
            self.downloads_used = 0;
            changed = true;
        }
        if self.plan == Plan::Free && self.expires_at.is_some() {
            self.expires_at = None;
            changed = true;
        }

        let today = now.date_naive();
        if self.usage_day != Some(today) {
            self.usage_day = Some(today);
            self.downloads_used = 0;
            changed = true;
        }

        changed
    }

    /// Check and consume in one step. The record must already be normalized.
    ///
    /// Banned accounts are refused before any quota check. Premium accounts
    /// consume nothing besides the lifetime download counter.
    pub fn try_consume(&mut self, kind: ActionKind, daily_limit: u32) -> AppResult<()> {
        if self.banned {
            return Err(AppError::Forbidden(format!("account {} is banned", self.id)));
        }

        if self.plan == Plan::Premium {
            if kind == ActionKind::Download {
                self.downloads_total += 1;
            }
            return Ok(());
        }

        match kind {
            ActionKind::Download => {
                if self.downloads_used >= daily_limit {
                    return Err(AppError::QuotaExceeded(kind));
                }
                self.downloads_used += 1;
                self.downloads_total += 1;
            }
            _ => {
                if self.trials.is_used(kind) {
                    return Err(AppError::QuotaExceeded(kind));
                }
                self.trials.set(kind, true);
            }
        }
        Ok(())
    }

    /// Undo a consumption whose produce step failed.
    ///
    /// A daily counter is only refunded when the grant was taken on the
    /// current usage day; after a reset there is nothing left to give back.
    pub fn refund(&mut self, kind: ActionKind, consumed_quota: bool, day: Option<NaiveDate>) {
        if kind == ActionKind::Download {
            self.downloads_total = self.downloads_total.saturating_sub(1);
        }
        if !consumed_quota {
            return;
        }
        match kind {
            ActionKind::Download => {
                if self.usage_day == day {
                    self.downloads_used = self.downloads_used.saturating_sub(1);
                }
            }
            _ => self.trials.set(kind, false),
        }
    }

    pub fn apply_upgrade(&mut self, expires_at: DateTime<Utc>) {
        self.plan = Plan::Premium;
        self.expires_at = Some(expires_at);
        self.downloads_used = 0;
    }

    /// Back to free. Trial flags are kept.
    pub fn apply_downgrade(&mut self) {
        self.plan = Plan::Free;
        self.expires_at = None;
        self.downloads_used = 0;
    }
}
