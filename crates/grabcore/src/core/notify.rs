//! Outbound message delivery seam
//!
//! The core never talks to Telegram. Broadcasts and payment confirmations go
//! through a [`MessageSink`] that the bot crate implements.

use async_trait::async_trait;

#[async_trait]
pub trait MessageSink: Send + Sync {
    /// Deliver a plain text message to a chat.
    ///
    /// The error string is only logged and counted, never shown to users.
    async fn deliver(&self, chat_id: i64, text: &str) -> Result<(), String>;
}
