//! Telegram-backed [`MessageSink`] for broadcasts and payment notices

use async_trait::async_trait;
use teloxide::prelude::*;

use grabcore::core::MessageSink;

use crate::telegram::Bot;

pub struct TelegramSink {
    bot: Bot,
}

impl TelegramSink {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl MessageSink for TelegramSink {
    async fn deliver(&self, chat_id: i64, text: &str) -> Result<(), String> {
        self.bot
            .send_message(ChatId(chat_id), text)
            .await
            .map(|_| ())
            .map_err(|e| e.to_string())
    }
}
