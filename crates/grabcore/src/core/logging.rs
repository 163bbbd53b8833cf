//! Logging initialization and startup diagnostics
//!
//! This module provides:
//! - Logger initialization (console + file)
//! - A startup summary of the external tools and payment settings

use anyhow::Result;
use simplelog::*;
use std::fs::OpenOptions;

use crate::core::config;

/// Initialize logger for both console and file output
///
/// The log file is opened in append mode so restarts keep history.
///
/// # Arguments
/// * `log_file_path` - Path to the log file
///
/// # Returns
/// * `Ok(())` - Logger initialized successfully
/// * `Err(anyhow::Error)` - Failed to open the file or a logger was already installed
pub fn init_logger(log_file_path: &str) -> Result<()> {
    let path = shellexpand::tilde(log_file_path).to_string();
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|e| anyhow::anyhow!("Failed to open log file {}: {}", path, e))?;

    CombinedLogger::init(vec![
        TermLogger::new(
            LevelFilter::Info,
            Config::default(),
            TerminalMode::Mixed,
            ColorChoice::Auto,
        ),
        WriteLogger::new(LevelFilter::Info, Config::default(), log_file),
    ])
    .map_err(|e| anyhow::anyhow!("Failed to initialize logger: {}", e))?;

    Ok(())
}

/// Logs the resolved configuration at application startup
///
/// Secrets are reported as set / not set only.
pub fn log_startup_configuration() {
    log::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    log::info!("⚙️  Grab configuration");
    log::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    log::info!("Database: {}", *config::DATABASE_PATH);
    log::info!("Temp dir: {}", *config::TEMP_FILES_DIR);
    log::info!(
        "Tools: yt-dlp={} ffmpeg={} imagemagick={} libreoffice={}",
        *config::YTDL_BIN,
        *config::FFMPEG_BIN,
        *config::IMAGEMAGICK_BIN,
        *config::LIBREOFFICE_BIN
    );

    if *config::admin::ADMIN_USER_ID == 0 {
        log::warn!("⚠️  ADMIN_USER_ID not set - admin commands are disabled");
    } else {
        log::info!("✅ Admin id: {}", *config::admin::ADMIN_USER_ID);
    }

    if config::payment::NOWPAYMENTS_API_KEY.is_empty() {
        log::warn!("⚠️  NOWPAYMENTS_API_KEY not set - invoices cannot be created");
    } else {
        log::info!("✅ NOWPAYMENTS_API_KEY: set");
    }
    if config::payment::NOWPAYMENTS_IPN_SECRET.is_empty() {
        log::warn!("⚠️  NOWPAYMENTS_IPN_SECRET not set - every IPN will be rejected");
    }
    if config::search::TELEGRAM_API_ID.is_none() || config::search::TELEGRAM_API_HASH.is_none() {
        log::warn!("⚠️  TELEGRAM_API_ID / TELEGRAM_API_HASH not set - keyword search is disabled");
    } else {
        log::info!(
            "✅ Keyword search over {} channels (session {})",
            config::search::CHANNELS.len(),
            *config::search::SESSION_PATH
        );
    }
    match config::APP_URL.as_deref() {
        Some(url) => log::info!("✅ IPN callback: {}/ipn", url),
        None => log::warn!("⚠️  APP_URL not set - invoices are created without a callback URL"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::NamedTempFile;

    #[test]
    fn test_init_logger_rejects_unwritable_path() {
        let result = init_logger("/nonexistent-dir/grab/test.log");
        assert!(result.is_err());
    }

    #[test]
    fn test_init_logger_creates_log_file() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path().to_str().unwrap();

        // Another test in the same process may already have installed a logger
        let result = init_logger(path);
        assert!(result.is_ok() || result.unwrap_err().to_string().contains("initialize logger"));
        assert!(temp_file.path().exists());
    }
}
