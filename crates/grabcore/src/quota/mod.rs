//! Plans, quotas and the services that enforce them

pub mod account;
pub mod admin;
pub mod entitlement;

pub use account::{Account, AccountId, ActionKind, Plan, TrialFlags};
pub use admin::{AccountRef, AccountStats, AdminService, BroadcastReport, ToggleOutcome};
pub use entitlement::{EntitlementService, Grant, QuotaLimits};
