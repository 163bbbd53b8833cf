//! Inline keyboards

use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};

use grabcore::payment::PricingTier;
use grabcore::RegistryId;

use crate::telegram::CallbackAction;

fn button(text: &str, action: CallbackAction) -> InlineKeyboardButton {
    InlineKeyboardButton::callback(text.to_string(), action.to_string())
}

/// Main menu shown by /start
pub fn main_menu(is_admin: bool, channel_url: Option<&str>) -> InlineKeyboardMarkup {
    let mut rows = vec![
        vec![
            button("👤 View Profile", CallbackAction::Profile),
            button("🖼️ Convert to PDF", CallbackAction::ConvertPdf),
        ],
        vec![button("💳 Upgrade Your Plan", CallbackAction::UpgradePlan)],
        vec![button("✉️ Text to PDF", CallbackAction::TextPdf)],
        vec![button("🔍 Keyword Search", CallbackAction::KeywordSearch)],
    ];

    if let Some(url) = channel_url.and_then(|u| url::Url::parse(u).ok()) {
        rows.push(vec![InlineKeyboardButton::url("📣 Join Our Channel".to_string(), url)]);
    }
    if is_admin {
        rows.push(vec![button("📢 Broadcast", CallbackAction::AdminBroadcast)]);
    }

    InlineKeyboardMarkup::new(rows)
}

/// One button per pricing tier
pub fn plans(tiers: &[PricingTier]) -> InlineKeyboardMarkup {
    let rows = tiers
        .iter()
        .map(|tier| {
            vec![button(
                &format!("${} - {} days", tier.amount, tier.days),
                CallbackAction::Invoice(tier.amount),
            )]
        })
        .collect::<Vec<_>>();
    InlineKeyboardMarkup::new(rows)
}

/// Conversions offered under a downloaded video
pub fn media_actions(id: RegistryId) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![
        button("🎧 Convert to Audio", CallbackAction::Audio(id)),
        button("🎞️ Convert to GIF", CallbackAction::Gif(id)),
    ]])
}
