//! Grabcore - quota, entitlement and payment engine for the Grab media bot
//!
//! This library holds everything that does not talk to Telegram directly:
//! account storage, the per-action entitlement rules, the ephemeral file
//! registry, admin operations, crypto-invoice payments and the external
//! media tool adapters.
//!
//! # Module Structure
//!
//! - `core`: Configuration, errors, logging, clock, metrics and the HTTP server
//! - `storage`: SQLite pool, migrations and the account/invoice stores
//! - `quota`: Account model, entitlement evaluator and admin service
//! - `files`: Short-lived registry of produced media files
//! - `payment`: NOWPayments client, IPN verification and plan upgrades
//! - `conversion` / `download`: yt-dlp, ffmpeg, ImageMagick and LibreOffice adapters

pub mod conversion;
pub mod core;
pub mod download;
pub mod files;
pub mod payment;
pub mod quota;
pub mod storage;

// Re-export commonly used types for convenience
pub use core::{config, AppError, AppResult, Clock, SharedClock, StorageError, SystemClock};
pub use files::{FileRegistry, RegistryId};
pub use payment::{IpnOutcome, PaymentService, PendingInvoice};
pub use quota::{Account, AccountId, ActionKind, AdminService, EntitlementService, Grant, Plan};
pub use storage::{create_pool, get_connection, DbConnection, DbPool, InvoiceStore, UserStore};
