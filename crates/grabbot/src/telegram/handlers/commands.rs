//! Command endpoints

use teloxide::prelude::*;
use teloxide::types::{InputFile, Message};

use grabcore::config;
use grabcore::AppError;

use super::types::{account_id_of, HandlerDeps, HandlerResult};
use crate::telegram::actions::{self, reply_error};
use crate::telegram::bot::{parse_target_arg, parse_upgrade_args};
use crate::telegram::{keyboards, texts, Bot, Command};

pub async fn handle_command(bot: Bot, msg: Message, cmd: Command, deps: HandlerDeps) -> HandlerResult {
    let Some(user) = msg.from.as_ref() else {
        return Ok(());
    };
    let user_id = account_id_of(user);
    let chat_id = msg.chat.id;
    log::info!("Received command {:?} from {}", cmd, user_id);

    let private_chat = msg.chat.is_private().then_some(chat_id.0);
    let account = match deps
        .entitlements
        .touch(user_id, user.username.as_deref(), private_chat)
        .await
    {
        Ok(account) => account,
        Err(err) => return reply_error(&bot, chat_id, &err).await,
    };

    if cmd.is_admin_command() && !deps.admin.is_admin(user_id) {
        return reply_error(&bot, chat_id, &AppError::Forbidden(format!("{} used {:?}", user_id, cmd))).await;
    }
    if account.banned && !cmd.is_admin_command() {
        bot.send_message(chat_id, texts::BANNED).await?;
        return Ok(());
    }

    match cmd {
        Command::Start => {
            let text = texts::welcome(&account, deps.entitlements.limits().free_daily_downloads);
            let menu = keyboards::main_menu(deps.admin.is_admin(user_id), config::CHANNEL_URL.as_deref());
            bot.send_message(chat_id, text).reply_markup(menu).await?;
        }
        Command::Profile => actions::send_profile(&bot, chat_id, &deps, user_id).await?,
        Command::Convertpdf => actions::convert_photos(&bot, chat_id, &deps, user_id).await?,
        Command::Upgrade(args) => match parse_upgrade_args(&args) {
            Ok((target, duration)) => match deps.admin.upgrade(user_id, &target, duration).await {
                Ok(updated) => {
                    bot.send_message(chat_id, texts::upgraded(&updated)).await?;
                }
                Err(err) => reply_error(&bot, chat_id, &err).await?,
            },
            Err(usage) => {
                bot.send_message(chat_id, usage).await?;
            }
        },
        Command::Downgrade(args) => match parse_target_arg("downgrade", &args) {
            Ok(target) => match deps.admin.downgrade(user_id, &target).await {
                Ok(updated) => {
                    bot.send_message(chat_id, texts::downgraded(&updated)).await?;
                }
                Err(err) => reply_error(&bot, chat_id, &err).await?,
            },
            Err(usage) => {
                bot.send_message(chat_id, usage).await?;
            }
        },
        Command::Ban(args) => match parse_target_arg("ban", &args) {
            Ok(target) => match deps.admin.ban(user_id, &target).await {
                Ok(outcome) => {
                    bot.send_message(chat_id, texts::ban_toggled(&outcome.account, true, outcome.changed))
                        .await?;
                }
                Err(err) => reply_error(&bot, chat_id, &err).await?,
            },
            Err(usage) => {
                bot.send_message(chat_id, usage).await?;
            }
        },
        Command::Unban(args) => match parse_target_arg("unban", &args) {
            Ok(target) => match deps.admin.unban(user_id, &target).await {
                Ok(outcome) => {
                    bot.send_message(chat_id, texts::ban_toggled(&outcome.account, false, outcome.changed))
                        .await?;
                }
                Err(err) => reply_error(&bot, chat_id, &err).await?,
            },
            Err(usage) => {
                bot.send_message(chat_id, usage).await?;
            }
        },
        Command::Stats => match deps.admin.stats(user_id).await {
            Ok(stats) => {
                bot.send_message(chat_id, texts::stats(&stats)).await?;
            }
            Err(err) => reply_error(&bot, chat_id, &err).await?,
        },
        Command::Export => match deps.admin.export_csv(user_id).await {
            Ok(csv) => {
                bot.send_document(chat_id, InputFile::memory(csv.into_bytes()).file_name("users.csv"))
                    .await?;
            }
            Err(err) => reply_error(&bot, chat_id, &err).await?,
        },
        Command::Broadcast(text) => {
            if text.trim().is_empty() {
                actions::prompt_broadcast(&bot, chat_id, &deps, user_id).await?;
            } else {
                actions::run_broadcast(&bot, chat_id, &deps, user_id, text.trim()).await?;
            }
        }
    }

    Ok(())
}
