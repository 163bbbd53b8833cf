//! User actions shared by the command path and the button path
//!
//! `/convertpdf` and the "Convert to PDF" button, `/profile` and the profile
//! button, and so on all end up in the same function here.

use teloxide::net::Download;
use teloxide::prelude::*;
use teloxide::types::{InputFile, ParseMode, PhotoSize};
use url::Url;

use grabcore::conversion::{document, temp_output_path, video};
use grabcore::download::download_video;
use grabcore::quota::ActionKind;
use grabcore::{config, AccountId, AppError, RegistryId};

use crate::telegram::handlers::{HandlerDeps, HandlerResult};
use crate::telegram::session::{remove_photos, Awaiting};
use crate::telegram::{keyboards, texts, Bot, TelegramSink};

const AUDIO_BITRATE: &str = "192k";

/// Conversions offered for a downloaded video
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaTarget {
    Audio,
    Gif,
}

/// Reply with the user-facing text for `err`
pub async fn reply_error(bot: &Bot, chat_id: ChatId, err: &AppError) -> HandlerResult {
    if err.is_domain_rejection() {
        log::info!("Request from chat {} rejected: {}", chat_id, err);
    } else {
        log::error!("Request from chat {} failed: {}", chat_id, err);
    }
    bot.send_message(chat_id, err.user_message()).await?;
    Ok(())
}

/// A send that failed after the work was done
fn undelivered(err: teloxide::RequestError) -> AppError {
    AppError::Delivery(err.to_string())
}

pub async fn send_profile(bot: &Bot, chat_id: ChatId, deps: &HandlerDeps, user_id: AccountId) -> HandlerResult {
    match deps.entitlements.profile(user_id).await {
        Ok(account) => {
            let text = texts::profile(&account, deps.entitlements.limits().free_daily_downloads);
            bot.send_message(chat_id, text).await?;
            Ok(())
        }
        Err(err) => reply_error(bot, chat_id, &err).await,
    }
}

/// Download a link through yt-dlp and offer conversions for the result.
///
/// The slot is charged only once the video reached the user.
pub async fn download_link(bot: &Bot, chat_id: ChatId, deps: &HandlerDeps, user_id: AccountId, url: Url) -> HandlerResult {
    log::info!("Download requested by {}: {}", user_id, url);
    let status = bot.send_message(chat_id, texts::DOWNLOADING).await?;

    let result = deps
        .entitlements
        .run_gated(user_id, ActionKind::Download, || async {
            let path = download_video(&url).await?;
            let id = deps.files.register(user_id, path.clone());
            bot.send_video(chat_id, InputFile::file(path))
                .reply_markup(keyboards::media_actions(id))
                .await
                .map_err(undelivered)?;
            Ok::<(), AppError>(())
        })
        .await;

    if let Err(e) = bot.delete_message(chat_id, status.id).await {
        log::debug!("Could not delete status message: {}", e);
    }

    match result {
        Ok(()) => Ok(()),
        Err(err) => reply_error(bot, chat_id, &err).await,
    }
}

/// Convert a previously downloaded video to audio or a short GIF
pub async fn convert_media(
    bot: &Bot,
    chat_id: ChatId,
    deps: &HandlerDeps,
    user_id: AccountId,
    id: RegistryId,
    target: MediaTarget,
) -> HandlerResult {
    let source = match deps.files.resolve_for(user_id, id) {
        Ok(path) => path,
        Err(_) => {
            bot.send_message(chat_id, texts::FILE_EXPIRED).await?;
            return Ok(());
        }
    };

    match target {
        MediaTarget::Audio => match video::extract_audio(&source, AUDIO_BITRATE).await {
            Ok(mp3) => {
                deps.files.register(user_id, mp3.clone());
                bot.send_audio(chat_id, InputFile::file(mp3)).await?;
                Ok(())
            }
            Err(e) => reply_error(bot, chat_id, &AppError::from(e)).await,
        },
        MediaTarget::Gif => {
            let result = deps
                .entitlements
                .run_gated(user_id, ActionKind::VideoToGif, || async {
                    let gif = video::to_gif(&source, video::GifOptions::default()).await?;
                    deps.files.register(user_id, gif.clone());
                    bot.send_animation(chat_id, InputFile::file(gif))
                        .await
                        .map_err(undelivered)?;
                    Ok::<(), AppError>(())
                })
                .await;
            match result {
                Ok(()) => Ok(()),
                Err(err) => reply_error(bot, chat_id, &err).await,
            }
        }
    }
}

/// Store the largest size of a photo for the next /convertpdf
pub async fn collect_photo(
    bot: &Bot,
    chat_id: ChatId,
    deps: &HandlerDeps,
    user_id: AccountId,
    photo: &PhotoSize,
) -> HandlerResult {
    let file = bot.get_file(photo.file.id.clone()).await?;
    let path = temp_output_path("photo", "jpg");
    let mut dst = tokio::fs::File::create(&path).await?;
    if let Err(e) = bot.download_file(&file.path, &mut dst).await {
        remove_photos(std::slice::from_ref(&path)).await;
        return Err(e.into());
    }

    let count = deps.sessions.add_photo(user_id, path);
    bot.send_message(chat_id, texts::photo_received(count)).await?;
    Ok(())
}

/// Turn the collected photos into one PDF
pub async fn convert_photos(bot: &Bot, chat_id: ChatId, deps: &HandlerDeps, user_id: AccountId) -> HandlerResult {
    if let Err(err) = deps.entitlements.check(user_id, ActionKind::ImageToPdf).await {
        return reply_error(bot, chat_id, &err).await;
    }

    let photos = deps.sessions.take_photos(user_id);
    if photos.is_empty() {
        bot.send_message(chat_id, texts::NO_IMAGES).await?;
        return Ok(());
    }

    let result = deps
        .entitlements
        .run_gated(user_id, ActionKind::ImageToPdf, || async {
            let pdf = document::images_to_pdf(&photos).await?;
            deps.files.register(user_id, pdf.clone());
            bot.send_document(chat_id, InputFile::file(pdf).file_name("converted.pdf"))
                .await
                .map_err(undelivered)?;
            Ok::<(), AppError>(())
        })
        .await;

    match result {
        Ok(()) => {
            remove_photos(&photos).await;
            Ok(())
        }
        Err(err) => {
            // keep the photos so the user can retry
            for photo in photos {
                deps.sessions.add_photo(user_id, photo);
            }
            reply_error(bot, chat_id, &err).await
        }
    }
}

/// Ask for the text of a text-to-PDF conversion
pub async fn prompt_text_pdf(bot: &Bot, chat_id: ChatId, deps: &HandlerDeps, user_id: AccountId) -> HandlerResult {
    if let Err(err) = deps.entitlements.check(user_id, ActionKind::TextToPdf).await {
        return reply_error(bot, chat_id, &err).await;
    }
    deps.sessions.set_awaiting(user_id, Awaiting::TextPdf);
    bot.send_message(chat_id, texts::TEXT_PDF_PROMPT).await?;
    Ok(())
}

pub async fn convert_text(
    bot: &Bot,
    chat_id: ChatId,
    deps: &HandlerDeps,
    user_id: AccountId,
    text: &str,
) -> HandlerResult {
    let result = deps
        .entitlements
        .run_gated(user_id, ActionKind::TextToPdf, || async {
            let pdf = document::text_to_pdf(text).await?;
            deps.files.register(user_id, pdf.clone());
            bot.send_document(chat_id, InputFile::file(pdf).file_name("converted_text.pdf"))
                .await
                .map_err(undelivered)?;
            Ok::<(), AppError>(())
        })
        .await;

    match result {
        Ok(()) => Ok(()),
        Err(err) => reply_error(bot, chat_id, &err).await,
    }
}

pub async fn prompt_search(bot: &Bot, chat_id: ChatId, deps: &HandlerDeps, user_id: AccountId) -> HandlerResult {
    if deps.search.is_none() {
        bot.send_message(chat_id, texts::SEARCH_DISABLED).await?;
        return Ok(());
    }
    deps.sessions.set_awaiting(user_id, Awaiting::Keyword);
    bot.send_message(chat_id, texts::SEARCH_PROMPT).await?;
    Ok(())
}

/// Search the configured public channels for `keyword` and list the posts found
pub async fn run_search(bot: &Bot, chat_id: ChatId, deps: &HandlerDeps, keyword: &str) -> HandlerResult {
    let Some(search) = deps.search.as_ref() else {
        bot.send_message(chat_id, texts::SEARCH_DISABLED).await?;
        return Ok(());
    };
    let keyword = keyword.trim();
    bot.send_message(chat_id, texts::SEARCHING).await?;

    let hits = match search.search(keyword).await {
        Ok(hits) => hits,
        Err(e) => {
            log::error!("Keyword search for {:?} failed: {}", keyword, e);
            Vec::new()
        }
    };
    if hits.is_empty() {
        bot.send_message(chat_id, texts::NO_SEARCH_RESULTS).await?;
        return Ok(());
    }

    bot.send_message(chat_id, texts::search_results(&hits, config::search::SNIPPET_CHARS))
        .parse_mode(ParseMode::Html)
        .await?;
    Ok(())
}

pub async fn show_plans(bot: &Bot, chat_id: ChatId, deps: &HandlerDeps) -> HandlerResult {
    let tiers = &deps.payments.settings().tiers;
    if tiers.is_empty() {
        bot.send_message(chat_id, texts::PAYMENTS_DISABLED).await?;
        return Ok(());
    }
    bot.send_message(chat_id, texts::CHOOSE_PLAN)
        .reply_markup(keyboards::plans(tiers))
        .await?;
    Ok(())
}

pub async fn send_invoice(
    bot: &Bot,
    chat_id: ChatId,
    deps: &HandlerDeps,
    user_id: AccountId,
    amount: f64,
) -> HandlerResult {
    match deps.payments.create_invoice(user_id, amount).await {
        Ok(invoice) => {
            bot.send_message(chat_id, texts::invoice(invoice.amount, invoice.invoice_url.as_deref()))
                .await?;
            Ok(())
        }
        Err(err) => reply_error(bot, chat_id, &err).await,
    }
}

/// Put the admin into "next text is a broadcast" mode
pub async fn prompt_broadcast(bot: &Bot, chat_id: ChatId, deps: &HandlerDeps, user_id: AccountId) -> HandlerResult {
    deps.sessions.set_awaiting(user_id, Awaiting::Broadcast);
    bot.send_message(chat_id, texts::BROADCAST_PROMPT).await?;
    Ok(())
}

pub async fn run_broadcast(
    bot: &Bot,
    chat_id: ChatId,
    deps: &HandlerDeps,
    caller: AccountId,
    message: &str,
) -> HandlerResult {
    let sink = TelegramSink::new(bot.clone());
    match deps.admin.broadcast(caller, message, &sink).await {
        Ok(report) => {
            bot.send_message(chat_id, texts::broadcast_report(&report)).await?;
            Ok(())
        }
        Err(err) => reply_error(bot, chat_id, &err).await,
    }
}

/// Pass a user's message to the admin and remember who wrote it
pub async fn forward_to_support(
    bot: &Bot,
    chat_id: ChatId,
    deps: &HandlerDeps,
    account: &grabcore::Account,
    text: &str,
) -> HandlerResult {
    let admin_id = deps.admin.admin_id();
    if admin_id == 0 {
        log::warn!("Support message from {} dropped: ADMIN_USER_ID is not set", account.id);
    } else {
        let forwarded = bot
            .send_message(ChatId(admin_id), texts::support_forward(account, text))
            .await?;
        deps.sessions.remember_support(forwarded.id.0, account.id);
    }
    bot.send_message(chat_id, texts::SUPPORT_SENT).await?;
    Ok(())
}

/// Relay an admin reply to the author of the forwarded message.
///
/// Returns false when the replied-to message is not a forwarded support message.
pub async fn relay_support_reply(bot: &Bot, deps: &HandlerDeps, replied_to: i32, text: &str) -> Result<bool, teloxide::RequestError> {
    let Some(author) = deps.sessions.support_author(replied_to) else {
        return Ok(false);
    };
    bot.send_message(ChatId(author), texts::support_reply(text)).await?;
    log::info!("Relayed admin reply to {}", author);
    Ok(true)
}
