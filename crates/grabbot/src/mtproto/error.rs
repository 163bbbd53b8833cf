//! MTProto-specific error types

use thiserror::Error;

/// Errors that can occur during MTProto operations
#[derive(Error, Debug)]
pub enum MtProtoError {
    /// Grammers client invocation error
    #[error("MTProto client error: {0}")]
    Invocation(#[from] grammers_mtsender::InvocationError),

    /// Session-related errors
    #[error("Session error: {0}")]
    Session(String),

    /// The saved session is missing or was logged out
    #[error("Client not authorized; run `grabbot login` first")]
    NotAuthorized,

    /// Sign-in failed
    #[error("Sign-in failed: {0}")]
    SignIn(String),

    /// TELEGRAM_API_ID / TELEGRAM_API_HASH missing
    #[error("Keyword search is not configured: {0}")]
    NotConfigured(&'static str),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
