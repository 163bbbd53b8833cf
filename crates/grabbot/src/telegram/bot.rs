//! Bot initialization and command definitions
//!
//! This module contains:
//! - Command enum definition
//! - Bot instance creation
//! - Argument parsing for the admin commands

use chrono::Duration;
use reqwest::ClientBuilder;
use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;

use grabcore::config;
use grabcore::quota::AccountRef;

use crate::telegram::Bot;

/// Bot commands enum with descriptions
///
/// Admin commands take their arguments as one string so a malformed call
/// still reaches the handler and gets a usage reply.
#[derive(BotCommands, Clone, Debug, PartialEq)]
#[command(rename_rule = "lowercase", description = "Available commands:")]
pub enum Command {
    #[command(description = "show the main menu")]
    Start,
    #[command(description = "show your plan and today's usage")]
    Profile,
    #[command(description = "turn the photos you sent into one PDF")]
    Convertpdf,
    #[command(description = "admin: /upgrade <id|@user> <hours>")]
    Upgrade(String),
    #[command(description = "admin: /downgrade <id|@user>")]
    Downgrade(String),
    #[command(description = "admin: /ban <id|@user>")]
    Ban(String),
    #[command(description = "admin: /unban <id|@user>")]
    Unban(String),
    #[command(description = "admin: account statistics")]
    Stats,
    #[command(description = "admin: export accounts as CSV")]
    Export,
    #[command(description = "admin: /broadcast <text>")]
    Broadcast(String),
}

impl Command {
    pub fn is_admin_command(&self) -> bool {
        !matches!(self, Command::Start | Command::Profile | Command::Convertpdf)
    }
}

/// Creates a Bot instance with custom or default API URL
///
/// # Returns
/// * `Ok(Bot)` - Successfully created bot instance
/// * `Err(anyhow::Error)` - Missing token or invalid BOT_API_URL
pub fn create_bot() -> anyhow::Result<Bot> {
    let token = config::BOT_TOKEN.clone();
    if token.is_empty() {
        return Err(anyhow::anyhow!("BOT_TOKEN (or TELOXIDE_TOKEN) is not set"));
    }
    let client = ClientBuilder::new().timeout(config::network::timeout()).build()?;

    let bot = if let Ok(bot_api_url) = std::env::var("BOT_API_URL") {
        log::info!("Using custom Bot API URL: {}", bot_api_url);
        let url = url::Url::parse(&bot_api_url).map_err(|e| anyhow::anyhow!("Invalid BOT_API_URL: {}", e))?;
        Bot::with_client(token, client).set_api_url(url)
    } else {
        Bot::with_client(token, client)
    };

    Ok(bot)
}

/// Publishes the user-facing commands in the Telegram UI.
///
/// Admin commands stay out of the menu.
pub async fn setup_bot_commands(bot: &Bot) -> Result<(), teloxide::RequestError> {
    use teloxide::types::BotCommand;

    bot.set_my_commands(vec![
        BotCommand::new("start", "show the main menu"),
        BotCommand::new("profile", "show your plan and today's usage"),
        BotCommand::new("convertpdf", "turn the photos you sent into one PDF"),
    ])
    .await?;
    Ok(())
}

/// Parses `/upgrade` arguments: a target and a positive number of hours
pub fn parse_upgrade_args(args: &str) -> Result<(AccountRef, Duration), String> {
    let mut parts = args.split_whitespace();
    let (Some(target), Some(hours), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err("Usage: /upgrade <id|@username> <hours>".to_string());
    };
    let target = target
        .parse::<AccountRef>()
        .map_err(|_| "❌ Target must be a user id or @username.".to_string())?;
    match hours.parse::<i64>() {
        Ok(h) if h > 0 => Ok((target, Duration::hours(h))),
        _ => Err("❌ Invalid hours".to_string()),
    }
}

/// Parses the single target argument of /downgrade, /ban and /unban
pub fn parse_target_arg(command: &str, args: &str) -> Result<AccountRef, String> {
    let mut parts = args.split_whitespace();
    let (Some(target), None) = (parts.next(), parts.next()) else {
        return Err(format!("Usage: /{} <id|@username>", command));
    };
    target
        .parse::<AccountRef>()
        .map_err(|_| "❌ Target must be a user id or @username.".to_string())
}
