//! Photo and free-text endpoints

use teloxide::prelude::*;
use teloxide::types::Message;

use grabcore::download::validate_download_url;

use super::types::{account_id_of, HandlerDeps, HandlerResult};
use crate::telegram::actions::{self, reply_error};
use crate::telegram::session::Awaiting;
use crate::telegram::{texts, Bot};

fn looks_like_link(text: &str) -> bool {
    let text = text.trim_start();
    text.starts_with("http://") || text.starts_with("https://")
}

/// Photos are collected for a later /convertpdf
pub async fn handle_photo(bot: Bot, msg: Message, deps: HandlerDeps) -> HandlerResult {
    let (Some(user), Some(photos)) = (msg.from.as_ref(), msg.photo()) else {
        return Ok(());
    };
    let user_id = account_id_of(user);
    let chat_id = msg.chat.id;

    let account = match deps
        .entitlements
        .touch(user_id, user.username.as_deref(), msg.chat.is_private().then_some(chat_id.0))
        .await
    {
        Ok(account) => account,
        Err(err) => return reply_error(&bot, chat_id, &err).await,
    };
    if account.banned {
        bot.send_message(chat_id, texts::BANNED).await?;
        return Ok(());
    }

    let Some(largest) = photos.iter().max_by_key(|p| p.width * p.height) else {
        return Ok(());
    };
    actions::collect_photo(&bot, chat_id, &deps, user_id, largest).await
}

/// Routes free text: support replies, pending broadcast, text-to-PDF or
/// keyword search, links, and finally support messages to the admin.
pub async fn handle_text(bot: Bot, msg: Message, deps: HandlerDeps) -> HandlerResult {
    let (Some(user), Some(text)) = (msg.from.as_ref(), msg.text()) else {
        return Ok(());
    };
    let user_id = account_id_of(user);
    let chat_id = msg.chat.id;

    let account = match deps
        .entitlements
        .touch(user_id, user.username.as_deref(), msg.chat.is_private().then_some(chat_id.0))
        .await
    {
        Ok(account) => account,
        Err(err) => return reply_error(&bot, chat_id, &err).await,
    };
    if account.banned {
        bot.send_message(chat_id, texts::BANNED).await?;
        return Ok(());
    }

    let is_admin = deps.admin.is_admin(user_id);
    if is_admin {
        if let Some(replied) = msg.reply_to_message() {
            if actions::relay_support_reply(&bot, &deps, replied.id.0, text).await? {
                bot.send_message(chat_id, texts::REPLY_SENT).await?;
                return Ok(());
            }
        }
    }

    match deps.sessions.take_awaiting(user_id) {
        Awaiting::Broadcast if is_admin => return actions::run_broadcast(&bot, chat_id, &deps, user_id, text).await,
        Awaiting::TextPdf => return actions::convert_text(&bot, chat_id, &deps, user_id, text).await,
        Awaiting::Keyword => return actions::run_search(&bot, chat_id, &deps, text).await,
        _ => {}
    }

    if looks_like_link(text) {
        return match validate_download_url(text) {
            Ok(url) => actions::download_link(&bot, chat_id, &deps, user_id, url).await,
            Err(err) => reply_error(&bot, chat_id, &err).await,
        };
    }

    if !is_admin {
        actions::forward_to_support(&bot, chat_id, &deps, &account, text).await?;
    }
    Ok(())
}
