//! Telegram bot integration and handlers

pub mod actions;
pub mod bot;
pub mod callback;
pub mod handlers;
pub mod keyboards;
pub mod session;
pub mod sink;
pub mod texts;

pub type Bot = teloxide::Bot;

pub use bot::{create_bot, setup_bot_commands, Command};
pub use callback::CallbackAction;
pub use handlers::{schema, HandlerDeps, HandlerError};
pub use session::{Awaiting, SessionStore};
pub use sink::TelegramSink;
