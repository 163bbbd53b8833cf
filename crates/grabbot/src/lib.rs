//! grabbot - Telegram front end for the grab media bot
//!
//! All quota, payment and file-lifetime rules live in `grabcore`; this crate
//! only turns Telegram updates into calls on those services.
//!
//! # Module Structure
//!
//! - `cli`: command-line arguments
//! - `mtproto`: user-account client for keyword search in public channels
//! - `telegram`: bot setup, dispatcher schema, handlers and reply texts

pub mod cli;
pub mod mtproto;
pub mod telegram;

pub use telegram::{create_bot, schema, HandlerDeps};
