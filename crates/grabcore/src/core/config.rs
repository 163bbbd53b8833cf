use once_cell::sync::Lazy;
use std::env;
use std::time::Duration;

/// Configuration constants for the bot
/// Bot token
/// Read from BOT_TOKEN or TELOXIDE_TOKEN environment variable
pub static BOT_TOKEN: Lazy<String> = Lazy::new(|| {
    env::var("BOT_TOKEN")
        .or_else(|_| env::var("TELOXIDE_TOKEN"))
        .unwrap_or_else(|_| String::new())
});

/// Database file path
/// Read from DATABASE_PATH environment variable
/// Default: grab.sqlite
pub static DATABASE_PATH: Lazy<String> =
    Lazy::new(|| env::var("DATABASE_PATH").unwrap_or_else(|_| "grab.sqlite".to_string()));

/// Log file path
/// Read from LOG_FILE_PATH environment variable
/// Default: grab.log
pub static LOG_FILE_PATH: Lazy<String> =
    Lazy::new(|| env::var("LOG_FILE_PATH").unwrap_or_else(|_| "grab.log".to_string()));

/// Temporary files directory for downloads and conversions
/// Read from TEMP_FILES_DIR environment variable
/// Defaults to /tmp, supports tilde (~) expansion
pub static TEMP_FILES_DIR: Lazy<String> =
    Lazy::new(|| env::var("TEMP_FILES_DIR").unwrap_or_else(|_| "/tmp".to_string()));

/// Cached yt-dlp binary path
/// Read once at startup from YTDL_BIN environment variable or defaults to "yt-dlp"
pub static YTDL_BIN: Lazy<String> = Lazy::new(|| env::var("YTDL_BIN").unwrap_or_else(|_| "yt-dlp".to_string()));

/// ffmpeg binary path (FFMPEG_BIN, default "ffmpeg")
pub static FFMPEG_BIN: Lazy<String> =
    Lazy::new(|| env::var("FFMPEG_BIN").unwrap_or_else(|_| "ffmpeg".to_string()));

/// ImageMagick binary used to assemble photos into a PDF (IMAGEMAGICK_BIN, default "convert")
pub static IMAGEMAGICK_BIN: Lazy<String> =
    Lazy::new(|| env::var("IMAGEMAGICK_BIN").unwrap_or_else(|_| "convert".to_string()));

/// LibreOffice binary used for text to PDF (LIBREOFFICE_BIN, default "libreoffice")
pub static LIBREOFFICE_BIN: Lazy<String> =
    Lazy::new(|| env::var("LIBREOFFICE_BIN").unwrap_or_else(|_| "libreoffice".to_string()));

/// Webhook URL for Telegram updates
/// Read from WEBHOOK_URL environment variable
/// When unset the bot falls back to long polling
pub static WEBHOOK_URL: Lazy<Option<String>> = Lazy::new(|| env::var("WEBHOOK_URL").ok().filter(|s| !s.is_empty()));

/// Public base URL of this service, used to build the IPN callback URL
/// Read from APP_URL environment variable
pub static APP_URL: Lazy<Option<String>> = Lazy::new(|| {
    env::var("APP_URL")
        .ok()
        .map(|s| s.trim_end_matches('/').to_string())
        .filter(|s| !s.is_empty())
});

/// HTTP port for the IPN / health / metrics server
/// Read from WEB_PORT (or PORT) environment variable
/// Default: 10000
pub static WEB_PORT: Lazy<u16> = Lazy::new(|| {
    env::var("WEB_PORT")
        .or_else(|_| env::var("PORT"))
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(10000)
});

/// Channel link shown in /start and used as the invoice success URL
pub static CHANNEL_URL: Lazy<Option<String>> = Lazy::new(|| env::var("CHANNEL_URL").ok().filter(|s| !s.is_empty()));

/// Admin configuration
pub mod admin {
    use super::*;

    /// Telegram id of the single admin
    /// Read from ADMIN_USER_ID environment variable
    /// 0 means no admin is configured and every admin operation is rejected
    pub static ADMIN_USER_ID: Lazy<i64> = Lazy::new(|| {
        env::var("ADMIN_USER_ID")
            .ok()
            .and_then(|v| v.trim().parse::<i64>().ok())
            .unwrap_or(0)
    });

    /// Pause between two broadcast deliveries (milliseconds)
    pub const BROADCAST_DELAY_MS: u64 = 50;

    /// Broadcast pacing duration
    pub fn broadcast_delay() -> Duration {
        Duration::from_millis(BROADCAST_DELAY_MS)
    }
}

/// Free plan quota configuration
pub mod quota {
    /// Downloads a free account may perform per UTC day
    pub const FREE_DAILY_DOWNLOADS: u32 = 3;
}

/// Ephemeral file configuration
pub mod files {
    use super::Duration;

    /// How long a produced file stays addressable before it is deleted (in seconds)
    pub const FILE_TTL_SECS: u64 = 60;

    /// File TTL duration
    pub fn ttl() -> Duration {
        Duration::from_secs(FILE_TTL_SECS)
    }

    /// Photos collected for a PDF are dropped after this long without a new one (in seconds)
    pub const PHOTO_COLLECTION_TTL_SECS: u64 = 30 * 60;

    /// Forwarded support messages can be answered for this long (in seconds)
    pub const SUPPORT_RELAY_TTL_SECS: u64 = 7 * 24 * 3600;

    /// How often idle sessions are swept (in seconds)
    pub const SESSION_SWEEP_INTERVAL_SECS: u64 = 60;

    pub fn photo_collection_ttl() -> Duration {
        Duration::from_secs(PHOTO_COLLECTION_TTL_SECS)
    }

    pub fn support_relay_ttl() -> Duration {
        Duration::from_secs(SUPPORT_RELAY_TTL_SECS)
    }

    pub fn session_sweep_interval() -> Duration {
        Duration::from_secs(SESSION_SWEEP_INTERVAL_SECS)
    }
}

/// Download configuration
pub mod download {
    use super::Duration;

    /// Largest file yt-dlp is allowed to fetch (bytes)
    pub const MAX_FILE_SIZE_BYTES: u64 = 70 * 1024 * 1024;

    /// Timeout for yt-dlp commands (in seconds)
    pub const YTDLP_TIMEOUT_SECS: u64 = 240;

    /// Timeout for ffmpeg / ImageMagick / LibreOffice runs (in seconds)
    pub const CONVERSION_TIMEOUT_SECS: u64 = 120;

    /// yt-dlp command timeout duration
    pub fn ytdlp_timeout() -> Duration {
        Duration::from_secs(YTDLP_TIMEOUT_SECS)
    }

    /// Conversion command timeout duration
    pub fn conversion_timeout() -> Duration {
        Duration::from_secs(CONVERSION_TIMEOUT_SECS)
    }
}

/// Crypto payment configuration (NOWPayments)
pub mod payment {
    use super::*;

    /// NOWPayments API key (NOWPAYMENTS_API_KEY)
    pub static NOWPAYMENTS_API_KEY: Lazy<String> =
        Lazy::new(|| env::var("NOWPAYMENTS_API_KEY").unwrap_or_else(|_| String::new()));

    /// Shared secret for IPN signatures (NOWPAYMENTS_IPN_SECRET)
    pub static NOWPAYMENTS_IPN_SECRET: Lazy<String> =
        Lazy::new(|| env::var("NOWPAYMENTS_IPN_SECRET").unwrap_or_else(|_| String::new()));

    /// NOWPayments API base URL (NOWPAYMENTS_API_URL)
    pub static NOWPAYMENTS_API_URL: Lazy<String> = Lazy::new(|| {
        env::var("NOWPAYMENTS_API_URL").unwrap_or_else(|_| "https://api.nowpayments.io/v1/".to_string())
    });

    /// Minutes an invoice stays payable before it is discarded
    pub const INVOICE_WINDOW_MINUTES: i64 = 20;

    /// Allowed difference between paid and invoiced amount (USD)
    pub const AMOUNT_EPSILON: f64 = 0.01;

    /// Interval between expired-invoice sweeps (in seconds)
    pub const SWEEP_INTERVAL_SECS: u64 = 60;

    /// Price tiers: (USD amount, premium days)
    pub const TIERS: &[(f64, i64)] = &[(2.0, 30), (4.0, 60)];

    /// Sweep interval duration
    pub fn sweep_interval() -> Duration {
        Duration::from_secs(SWEEP_INTERVAL_SECS)
    }
}

/// Keyword search over public channels (MTProto user session)
pub mod search {
    use super::*;

    /// API id from my.telegram.org (TELEGRAM_API_ID); search is off without it
    pub static TELEGRAM_API_ID: Lazy<Option<i32>> =
        Lazy::new(|| env::var("TELEGRAM_API_ID").ok().and_then(|v| v.trim().parse().ok()));

    /// API hash from my.telegram.org (TELEGRAM_API_HASH)
    pub static TELEGRAM_API_HASH: Lazy<Option<String>> =
        Lazy::new(|| env::var("TELEGRAM_API_HASH").ok().filter(|s| !s.is_empty()));

    /// Session file written by `grabbot login`
    /// Read from MTPROTO_SESSION_PATH, default grab_search.session
    pub static SESSION_PATH: Lazy<String> =
        Lazy::new(|| env::var("MTPROTO_SESSION_PATH").unwrap_or_else(|_| "grab_search.session".to_string()));

    /// Channels searched when SEARCH_CHANNELS is unset
    pub const DEFAULT_CHANNELS: &[&str] = &[
        "https://t.me/s/ai_news_feed",
        "https://t.me/s/deeplearning_ai",
        "https://t.me/s/pythontelegrambotchannel",
        "https://t.me/s/cryptonews",
        "https://t.me/s/marketing_chat",
        "https://t.me/s/youtubers",
        "https://t.me/s/ml_jobs",
        "https://t.me/s/chatgptprompts",
        "https://t.me/s/openaiupdates",
        "https://t.me/s/techguidehub",
        "https://t.me/s/designresource",
        "https://t.me/s/worldnewsdaily",
        "https://t.me/s/dataengineering",
        "https://t.me/s/freecodecamp",
        "https://t.me/s/linuxtricks",
        "https://t.me/s/startupnetwork",
        "https://t.me/s/devopsdaily",
        "https://t.me/s/coding_interview",
        "https://t.me/s/frontendmastery",
        "https://t.me/s/backendtalks",
    ];

    /// Channel links, comma separated (SEARCH_CHANNELS)
    pub static CHANNELS: Lazy<Vec<String>> = Lazy::new(|| match env::var("SEARCH_CHANNELS") {
        Ok(raw) if !raw.trim().is_empty() => raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect(),
        _ => DEFAULT_CHANNELS.iter().map(|s| s.to_string()).collect(),
    });

    /// Matching posts taken from each channel
    pub const PER_CHANNEL_LIMIT: usize = 2;

    /// Posts shown in one reply
    pub const MAX_RESULTS: usize = 10;

    /// Characters of each post shown in the reply
    pub const SNIPPET_CHARS: usize = 150;
}

/// Network configuration
pub mod network {
    use super::Duration;

    /// Timeout for outbound HTTP requests (in seconds)
    pub const REQUEST_TIMEOUT_SECS: u64 = 30;

    /// Request timeout duration
    pub fn timeout() -> Duration {
        Duration::from_secs(REQUEST_TIMEOUT_SECS)
    }
}
