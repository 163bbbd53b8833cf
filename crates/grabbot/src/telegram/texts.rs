//! Reply texts

use chrono::{DateTime, Utc};

use teloxide::utils::html;

use grabcore::quota::{AccountStats, ActionKind, BroadcastReport, Plan};
use grabcore::Account;

use crate::mtproto::SearchHit;

pub const BANNED: &str = "⛔ You are banned from using this bot.";
pub const DOWNLOADING: &str = "📥 Downloading...";
pub const FILE_EXPIRED: &str = "❌ File deleted. Please resend the link.";
pub const NO_IMAGES: &str = "❌ No images received.";
pub const SUPPORT_SENT: &str = "✅ Message sent. You’ll get a reply soon.";
pub const REPLY_SENT: &str = "✅ Reply sent.";
pub const TEXT_PDF_PROMPT: &str =
    "📄 Send me the text you want converted to PDF.\n(You have 1 free trial; premium users have no limit.)";
pub const BROADCAST_PROMPT: &str = "📣 Please type the broadcast message to send to all users.";
pub const NOT_AUTHORIZED: &str = "⛔ You are not authorized.";
pub const CHOOSE_PLAN: &str = "Choose your plan:";
pub const PAYMENTS_DISABLED: &str = "💳 Payments are not available right now.";
pub const SEARCH_PROMPT: &str = "🔤 Please send the keyword to search Telegram public channels.";
pub const SEARCHING: &str = "🔍 Searching across public channels...";
pub const NO_SEARCH_RESULTS: &str = "❌ No matching posts found.";
pub const SEARCH_DISABLED: &str = "🔍 Keyword search is not available right now.";

fn display_name(account: &Account) -> String {
    account
        .username
        .as_ref()
        .map(|u| format!("@{}", u))
        .unwrap_or_else(|| format!("user_{}", account.id))
}

fn format_expiry(expires_at: Option<DateTime<Utc>>) -> String {
    expires_at
        .map(|e| e.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "N/A".to_string())
}

pub fn welcome(account: &Account, daily_downloads: u32) -> String {
    format!(
        "👋 Hello {}!\n🆔 User ID: {}\n\n\
         This bot supports downloading videos from:\n\
         ✅ Facebook, TikTok, Twitter, Instagram\n\
         ❌ YouTube is not supported.\n\n\
         Free Users:\n• {} video downloads per day\n• 1 PDF conversion trial\n• 1 Text-to-PDF trial\n• 1 Video-to-GIF trial\n\n\
         Send a supported video link to begin or use the menu below.",
        display_name(account),
        account.id,
        daily_downloads
    )
}

pub fn profile(account: &Account, daily_downloads: u32) -> String {
    let mut text = format!("👤 Username: {}\n", display_name(account));
    match account.plan {
        Plan::Premium => {
            text.push_str("💼 Plan: Premium\n");
            text.push_str(&format!("⏰ Expires: {} UTC\n", format_expiry(account.expires_at)));
        }
        Plan::Free => {
            text.push_str("💼 Plan: Free\n");
            text.push_str(&format!(
                "📥 Downloads left today: {}/{}\n",
                account.downloads_left(daily_downloads),
                daily_downloads
            ));
            for kind in ActionKind::ALL.iter().filter(|k| k.is_trial()) {
                let state = if account.trials.is_used(*kind) { "used" } else { "available" };
                text.push_str(&format!("🎁 {} trial: {}\n", kind.label(), state));
            }
        }
    }
    text.push_str(&format!("📊 Total downloads: {}", account.downloads_total));
    text
}

pub fn photo_received(count: usize) -> String {
    format!(
        "✅ Image received ({} so far). Send more or click /convertpdf to generate PDF.",
        count
    )
}

pub fn invoice(amount: f64, url: Option<&str>) -> String {
    match url {
        Some(url) => format!("Please pay ${} here:\n{}", amount, url),
        None => format!("Invoice for ${} created, but the provider returned no payment link.", amount),
    }
}

pub fn upgraded(account: &Account) -> String {
    format!(
        "✅ {} upgraded to Premium until {} UTC.",
        display_name(account),
        format_expiry(account.expires_at)
    )
}

pub fn downgraded(account: &Account) -> String {
    format!("✅ {} downgraded to Free.", display_name(account))
}

pub fn ban_toggled(account: &Account, banned: bool, changed: bool) -> String {
    match (banned, changed) {
        (true, true) => format!("🚫 {} banned.", display_name(account)),
        (true, false) => format!("ℹ️ {} was already banned.", display_name(account)),
        (false, true) => format!("✅ {} unbanned.", display_name(account)),
        (false, false) => format!("ℹ️ {} is not banned.", display_name(account)),
    }
}

pub fn stats(stats: &AccountStats) -> String {
    format!(
        "📊 Users: {}\n💎 Premium: {}\n🆓 Free: {}\n⛔ Banned: {}\n📥 Downloads today: {}\n📦 Downloads total: {}",
        stats.total, stats.premium, stats.free, stats.banned, stats.downloads_today, stats.downloads_total
    )
}

pub fn broadcast_report(report: &BroadcastReport) -> String {
    if report.failed == 0 {
        format!("✅ Broadcast sent to {} users.", report.delivered)
    } else {
        format!(
            "✅ Broadcast sent to {} users ({} failed).",
            report.delivered, report.failed
        )
    }
}

pub fn support_forward(account: &Account, text: &str) -> String {
    format!("📩 Message from {} ({}):\n\n{}", display_name(account), account.id, text)
}

pub fn support_reply(text: &str) -> String {
    format!("📬 Admin reply:\n{}", text)
}

/// HTML reply listing search hits, each post cut to `snippet_chars`
pub fn search_results(hits: &[SearchHit], snippet_chars: usize) -> String {
    hits.iter()
        .map(|hit| {
            let snippet: String = hit.text.chars().take(snippet_chars).collect();
            format!("📌 <b>{}</b>\n🔗 {}", html::escape(&snippet), html::escape(&hit.channel))
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn account() -> Account {
        let now = Utc.with_ymd_and_hms(2024, 9, 15, 10, 0, 0).unwrap();
        let mut account = Account::new(42, now);
        account.username = Some("dana".to_string());
        account
    }

    #[test]
    fn test_search_results_are_escaped_and_cut() {
        let hits = vec![
            SearchHit {
                channel: "https://t.me/pythonhub".to_string(),
                text: "<script> & friends".to_string(),
            },
            SearchHit {
                channel: "https://t.me/codinghub".to_string(),
                text: "é".repeat(200),
            },
        ];
        let text = search_results(&hits, 150);
        let blocks: Vec<&str> = text.split("\n\n").collect();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0], "📌 <b>&lt;script&gt; &amp; friends</b>\n🔗 https://t.me/pythonhub");
        assert!(blocks[1].contains(&"é".repeat(150)));
        assert!(!blocks[1].contains(&"é".repeat(151)));
    }

    #[test]
    fn test_free_profile_lists_usage_and_trials() {
        let mut acc = account();
        acc.downloads_used = 1;
        acc.trials.gif_used = true;

        let text = profile(&acc, 3);
        assert!(text.contains("@dana"));
        assert!(text.contains("Plan: Free"));
        assert!(text.contains("Downloads left today: 2/3"));
        assert!(text.contains("video to GIF trial: used"));
        assert!(text.contains("image to PDF trial: available"));
    }

    #[test]
    fn test_premium_profile_shows_expiry() {
        let mut acc = account();
        acc.plan = Plan::Premium;
        acc.expires_at = Some(Utc.with_ymd_and_hms(2024, 10, 15, 10, 0, 0).unwrap());

        let text = profile(&acc, 3);
        assert!(text.contains("Plan: Premium"));
        assert!(text.contains("2024-10-15 10:00 UTC"));
        assert!(!text.contains("Downloads left"));
    }

    #[test]
    fn test_nameless_account_falls_back_to_id() {
        let mut acc = account();
        acc.username = None;
        assert!(welcome(&acc, 3).contains("Hello user_42!"));
    }

    #[test]
    fn test_broadcast_report_mentions_failures() {
        assert_eq!(
            broadcast_report(&BroadcastReport { delivered: 3, failed: 0 }),
            "✅ Broadcast sent to 3 users."
        );
        assert!(broadcast_report(&BroadcastReport { delivered: 3, failed: 2 }).contains("2 failed"));
    }
}
