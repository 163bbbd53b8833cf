//! Core utilities, configuration, and common functionality

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod notify;
pub mod web_server;

// Re-exports for convenience
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use error::{AppError, AppResult, StorageError, StoreResult};
pub use logging::{init_logger, log_startup_configuration};
pub use notify::MessageSink;
