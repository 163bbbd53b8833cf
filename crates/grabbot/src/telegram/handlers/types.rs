//! Handler types and dependencies

use std::sync::Arc;

use teloxide::types::User;

use grabcore::{AccountId, AdminService, EntitlementService, FileRegistry, PaymentService};

use crate::mtproto::ChannelSearch;
use crate::telegram::SessionStore;

/// Error type for handlers
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub type HandlerResult = Result<(), HandlerError>;

/// Dependencies required by handlers
#[derive(Clone)]
pub struct HandlerDeps {
    pub entitlements: Arc<EntitlementService>,
    pub admin: Arc<AdminService>,
    pub payments: Arc<PaymentService>,
    pub files: FileRegistry,
    pub sessions: Arc<SessionStore>,
    /// Channel keyword search; None when no user session is configured
    pub search: Option<Arc<dyn ChannelSearch>>,
}

impl HandlerDeps {
    /// Create new handler dependencies
    pub fn new(
        entitlements: Arc<EntitlementService>,
        admin: Arc<AdminService>,
        payments: Arc<PaymentService>,
        files: FileRegistry,
    ) -> Self {
        Self {
            entitlements,
            admin,
            payments,
            files,
            sessions: Arc::new(SessionStore::new()),
            search: None,
        }
    }

    pub fn with_search(mut self, search: Arc<dyn ChannelSearch>) -> Self {
        self.search = Some(search);
        self
    }
}

/// Account id for a Telegram user
pub fn account_id_of(user: &User) -> AccountId {
    i64::try_from(user.id.0).unwrap_or(0)
}
