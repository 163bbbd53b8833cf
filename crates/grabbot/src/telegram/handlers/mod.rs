//! Telegram update handlers
//!
//! `schema` builds the dispatcher tree; the submodules hold the endpoints
//! for commands, inline buttons and plain messages.

pub mod callbacks;
pub mod commands;
pub mod messages;
pub mod schema;
pub mod types;

pub use schema::schema;
pub use types::{account_id_of, HandlerDeps, HandlerError, HandlerResult};
