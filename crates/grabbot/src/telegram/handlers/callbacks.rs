//! Inline button endpoint

use teloxide::prelude::*;

use super::types::{account_id_of, HandlerDeps, HandlerResult};
use crate::telegram::actions::{self, reply_error, MediaTarget};
use crate::telegram::{texts, Bot, CallbackAction};

pub async fn handle_callback(bot: Bot, q: CallbackQuery, deps: HandlerDeps) -> HandlerResult {
    let user_id = account_id_of(&q.from);
    let chat_id = q.message.as_ref().map(|m| m.chat().id).unwrap_or(ChatId(user_id));

    let Some(action) = q.data.as_deref().and_then(CallbackAction::parse) else {
        log::warn!("Unknown callback data from {}: {:?}", user_id, q.data);
        bot.answer_callback_query(q.id.clone()).await?;
        return Ok(());
    };
    log::debug!("Callback {} from {}", action, user_id);

    let account = match deps.entitlements.touch(user_id, q.from.username.as_deref(), None).await {
        Ok(account) => account,
        Err(err) => {
            bot.answer_callback_query(q.id.clone()).await?;
            return reply_error(&bot, chat_id, &err).await;
        }
    };
    if account.banned {
        bot.answer_callback_query(q.id.clone())
            .text(texts::BANNED)
            .show_alert(true)
            .await?;
        return Ok(());
    }
    if matches!(action, CallbackAction::AdminBroadcast) && !deps.admin.is_admin(user_id) {
        bot.answer_callback_query(q.id.clone())
            .text(texts::NOT_AUTHORIZED)
            .show_alert(true)
            .await?;
        return Ok(());
    }

    bot.answer_callback_query(q.id.clone()).await?;

    match action {
        CallbackAction::Profile => actions::send_profile(&bot, chat_id, &deps, user_id).await,
        CallbackAction::ConvertPdf => actions::convert_photos(&bot, chat_id, &deps, user_id).await,
        CallbackAction::TextPdf => actions::prompt_text_pdf(&bot, chat_id, &deps, user_id).await,
        CallbackAction::UpgradePlan => actions::show_plans(&bot, chat_id, &deps).await,
        CallbackAction::KeywordSearch => actions::prompt_search(&bot, chat_id, &deps, user_id).await,
        CallbackAction::Invoice(amount) => actions::send_invoice(&bot, chat_id, &deps, user_id, amount).await,
        CallbackAction::Audio(id) => actions::convert_media(&bot, chat_id, &deps, user_id, id, MediaTarget::Audio).await,
        CallbackAction::Gif(id) => actions::convert_media(&bot, chat_id, &deps, user_id, id, MediaTarget::Gif).await,
        CallbackAction::AdminBroadcast => actions::prompt_broadcast(&bot, chat_id, &deps, user_id).await,
    }
}
