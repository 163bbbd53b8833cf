use thiserror::Error;

use crate::quota::ActionKind;

/// Errors raised by the persistence layer
///
/// Kept separate from [`AppError`] so the stores can be written against a
/// narrow error type while callers still get `?` conversion for free.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Database connection pool errors
    #[error("Database pool error: {0}")]
    DatabasePool(#[from] r2d2::Error),

    /// Schema migration failed
    #[error("Migration error: {0}")]
    Migration(String),

    /// A stored value could not be decoded (bad plan name, bad timestamp, ...)
    #[error("Corrupt record: {0}")]
    Corrupt(String),

    /// The blocking task running the query panicked or was cancelled
    #[error("Storage task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Centralized error types for the application
///
/// Every fallible core operation returns this enum. Domain rejections
/// (quota, bans, unknown targets, payment checks) are ordinary variants so
/// the Telegram layer and the IPN endpoint can map them to user-facing
/// replies without string matching.
///
/// # Example
///
/// ```no_run
/// use grabcore::AppError;
///
/// fn handle_error(err: AppError) {
///     eprintln!("Error: {}", err);
/// }
/// ```
#[derive(Error, Debug)]
pub enum AppError {
    /// The caller is banned or is not allowed to run an admin operation
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The free daily allowance or a one-time trial is spent
    #[error("Quota exceeded for {0}")]
    QuotaExceeded(ActionKind),

    /// Unknown account, registry id or file
    #[error("Not found: {0}")]
    NotFound(String),

    /// IPN signature did not match the shared secret
    #[error("Invalid IPN signature")]
    InvalidSignature,

    /// The pending invoice outlived its payment window
    #[error("Invoice {0} expired")]
    InvoiceExpired(String),

    /// No pending invoice for the notification (already applied or never created)
    #[error("Invoice {0} not found")]
    InvoiceNotFound(String),

    /// Paid amount differs from the invoiced amount
    #[error("Amount mismatch: expected {expected}, got {paid}")]
    AmountMismatch { expected: f64, paid: f64 },

    /// Persistence failures
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// yt-dlp / ffmpeg / ImageMagick / LibreOffice failures
    #[error("Tool error: {0}")]
    Tool(String),

    /// The result was produced but could not be sent to the user
    #[error("Delivery failed: {0}")]
    Delivery(String),

    /// CSV export could not be written
    #[error("Export error: {0}")]
    Export(String),

    /// Payment provider errors
    #[error("Payment error: {0}")]
    Payment(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Type alias for Result with AppError
pub type AppResult<T> = Result<T, AppError>;

/// Type alias for Result with StorageError
pub type StoreResult<T> = Result<T, StorageError>;

impl From<rusqlite::Error> for AppError {
    fn from(err: rusqlite::Error) -> Self {
        AppError::Storage(StorageError::Database(err))
    }
}

impl From<r2d2::Error> for AppError {
    fn from(err: r2d2::Error) -> Self {
        AppError::Storage(StorageError::DatabasePool(err))
    }
}

impl From<csv::Error> for AppError {
    fn from(err: csv::Error) -> Self {
        AppError::Export(err.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::Payment(err.to_string())
    }
}

impl AppError {
    /// Short text safe to show to a Telegram user
    pub fn user_message(&self) -> String {
        match self {
            AppError::Forbidden(_) => "🚫 You are not allowed to do that.".to_string(),
            AppError::QuotaExceeded(ActionKind::Download) => {
                "❌ You have reached your daily limit of free downloads. Upgrade to premium for unlimited access."
                    .to_string()
            }
            AppError::QuotaExceeded(kind) => format!(
                "❌ Your free {} trial is used up. Upgrade to premium to keep using it.",
                kind.label()
            ),
            AppError::NotFound(_) => "⚠️ That file has expired or no longer exists.".to_string(),
            AppError::Tool(_) => "❌ Processing failed. Please try again later.".to_string(),
            AppError::Delivery(_) => {
                "❌ Could not send the file. It may be too large for Telegram.".to_string()
            }
            AppError::Export(_) => "❌ Export failed. Please try again later.".to_string(),
            AppError::Validation(msg) => format!("⚠️ {}", msg),
            AppError::Payment(_) => "❌ Could not reach the payment provider. Please try again later.".to_string(),
            AppError::InvalidSignature
            | AppError::InvoiceExpired(_)
            | AppError::InvoiceNotFound(_)
            | AppError::AmountMismatch { .. } => "❌ Payment could not be verified.".to_string(),
            AppError::Storage(_) => "❌ Something went wrong. Please try again later.".to_string(),
        }
    }

    /// True for rejections that are part of normal operation (not failures worth an error log)
    pub fn is_domain_rejection(&self) -> bool {
        !matches!(
            self,
            AppError::Storage(_)
                | AppError::Tool(_)
                | AppError::Delivery(_)
                | AppError::Export(_)
                | AppError::Payment(_)
        )
    }
}
