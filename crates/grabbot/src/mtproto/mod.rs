//! MTProto client for keyword search over public channels
//!
//! The Bot API cannot search channel history, so this runs as a regular
//! user account signed in once with `grabbot login`.

pub mod client;
pub mod error;
pub mod search;

pub use client::MtProtoClient;
pub use error::MtProtoError;
pub use search::{channel_username, ChannelSearch, MtProtoSearch, SearchHit};
