use anyhow::Result;
use dotenvy::dotenv;
use std::net::SocketAddr;
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::update_listeners::webhooks;

use grabbot::cli::{Cli, Commands};
use grabbot::mtproto::{ChannelSearch, MtProtoClient, MtProtoSearch};
use grabbot::telegram::session::remove_photos;
use grabbot::telegram::{create_bot, schema, setup_bot_commands, HandlerDeps, TelegramSink};
use grabcore::core::web_server::{router, start_web_server};
use grabcore::core::{init_logger, log_startup_configuration, MessageSink};
use grabcore::payment::{NowPaymentsClient, PaymentGateway, PaymentSettings};
use grabcore::quota::{admin, QuotaLimits};
use grabcore::storage::{SqliteInvoiceStore, SqliteUserStore};
use grabcore::{
    config, create_pool, AdminService, EntitlementService, FileRegistry, InvoiceStore, PaymentService, SharedClock,
    SystemClock, UserStore,
};

/// Main entry point for the Telegram bot
///
/// Parses CLI arguments and dispatches to the matching subcommand.
///
/// # Errors
/// Returns an error if initialization fails (logging, database, bot creation).
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();

    // Load environment variables from .env if present
    let _ = dotenv();

    init_logger(&config::LOG_FILE_PATH)?;

    let result = match cli.command {
        Some(Commands::Run { webhook }) => {
            log::info!("Running bot (webhook: {})", webhook);
            run_bot(webhook).await
        }
        Some(Commands::Stats) => run_stats().await,
        Some(Commands::Export { path }) => run_export(&path).await,
        Some(Commands::Login) => run_login().await,
        None => {
            log::info!("No command specified, running bot with long polling");
            run_bot(false).await
        }
    };

    if let Err(e) = &result {
        log::error!("{:#}", e);
    }
    result
}

fn open_user_store() -> Result<Arc<dyn UserStore>> {
    let pool = Arc::new(
        create_pool(&config::DATABASE_PATH).map_err(|e| anyhow::anyhow!("Failed to create database pool: {}", e))?,
    );
    let clock: SharedClock = Arc::new(SystemClock);
    Ok(Arc::new(SqliteUserStore::new(pool, clock)))
}

/// Print account statistics without starting the bot
async fn run_stats() -> Result<()> {
    let store = open_user_store()?;
    let accounts = store.list_all().await?;
    let stats = admin::compute_stats(&accounts);

    println!("📊 Accounts");
    println!("==========");
    println!("Total:           {}", stats.total);
    println!("Premium:         {}", stats.premium);
    println!("Free:            {}", stats.free);
    println!("Banned:          {}", stats.banned);
    println!("Downloads today: {}", stats.downloads_today);
    println!("Downloads total: {}", stats.downloads_total);
    Ok(())
}

/// Write the account table as CSV
async fn run_export(path: &str) -> Result<()> {
    let store = open_user_store()?;
    let accounts = store.list_all().await?;
    let csv = admin::accounts_to_csv(&accounts)?;
    tokio::fs::write(path, csv)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to write {}: {}", path, e))?;
    println!("✅ Exported {} accounts to {}", accounts.len(), path);
    Ok(())
}

/// Sign in the search account and store its session file
async fn run_login() -> Result<()> {
    let user_id = MtProtoClient::login_interactive().await?;
    println!(
        "✅ Signed in as user {}; session saved to {}",
        user_id,
        *config::search::SESSION_PATH
    );
    Ok(())
}

/// Public webhook URL: WEBHOOK_URL, or APP_URL + /webhook
fn webhook_url() -> Option<url::Url> {
    let raw = config::WEBHOOK_URL
        .clone()
        .or_else(|| config::APP_URL.as_ref().map(|base| format!("{}/webhook", base)))?;
    match url::Url::parse(&raw) {
        Ok(url) => Some(url),
        Err(e) => {
            log::error!("Invalid webhook URL {}: {}", raw, e);
            None
        }
    }
}

async fn run_bot(use_webhook: bool) -> Result<()> {
    let bot_init_start = std::time::Instant::now();
    log::info!("Starting bot...");

    grabcore::core::metrics::init_metrics();
    log_startup_configuration();

    if !grabcore::conversion::check_ffmpeg().await {
        log::warn!("ffmpeg not found at {}; audio and GIF conversions will fail", *config::FFMPEG_BIN);
    }
    if !grabcore::conversion::check_libreoffice().await {
        log::warn!("LibreOffice not found at {}; text to PDF will fail", *config::LIBREOFFICE_BIN);
    }

    let bot = create_bot()?;
    let me = bot.get_me().await?;
    log::info!("Bot username: {:?}, Bot ID: {}", me.username, me.id);

    if let Err(e) = setup_bot_commands(&bot).await {
        log::warn!("Failed to set bot commands: {}", e);
    }

    // Storage and services
    let pool = Arc::new(
        create_pool(&config::DATABASE_PATH).map_err(|e| anyhow::anyhow!("Failed to create database pool: {}", e))?,
    );
    let clock: SharedClock = Arc::new(SystemClock);
    let store: Arc<dyn UserStore> = Arc::new(SqliteUserStore::new(Arc::clone(&pool), Arc::clone(&clock)));
    let invoices: Arc<dyn InvoiceStore> = Arc::new(SqliteInvoiceStore::new(pool));

    let gateway: Option<Arc<dyn PaymentGateway>> = match NowPaymentsClient::from_config()? {
        Some(client) => Some(Arc::new(client)),
        None => {
            log::warn!("NOWPAYMENTS_API_KEY is not set; invoices cannot be created");
            None
        }
    };

    let entitlements = Arc::new(EntitlementService::new(Arc::clone(&store), QuotaLimits::from_config()));
    let admin = Arc::new(AdminService::new(
        Arc::clone(&store),
        Arc::clone(&clock),
        *config::admin::ADMIN_USER_ID,
    ));
    let payments = Arc::new(PaymentService::new(
        store,
        invoices,
        gateway,
        clock,
        PaymentSettings::from_config(),
    ));
    let files = FileRegistry::from_config();

    // Stale invoices are purged and cancelled upstream
    let _sweeper = Arc::clone(&payments).spawn_sweeper(config::payment::sweep_interval());

    let sink: Arc<dyn MessageSink> = Arc::new(TelegramSink::new(bot.clone()));
    let web = router(Arc::clone(&payments), Some(sink));

    let mut deps = HandlerDeps::new(entitlements, admin, payments, files.clone());
    match MtProtoSearch::from_config().await {
        Ok(Some(search)) => {
            let search: Arc<dyn ChannelSearch> = Arc::new(search);
            deps = deps.with_search(search);
        }
        Ok(None) => log::info!("Keyword search disabled: TELEGRAM_API_ID/TELEGRAM_API_HASH not set"),
        Err(e) => log::warn!("Keyword search disabled: {} (run `grabbot login` first)", e),
    }
    let sessions = Arc::clone(&deps.sessions);
    let _session_sweeper = Arc::clone(&sessions).spawn_sweeper(config::files::session_sweep_interval());
    let handler = schema(deps);
    let port = *config::WEB_PORT;

    let webhook = if use_webhook { webhook_url() } else { None };
    if use_webhook && webhook.is_none() {
        log::warn!("--webhook requested but neither WEBHOOK_URL nor APP_URL is usable; falling back to polling");
    }

    if let Some(url) = webhook {
        log::info!("Starting bot in webhook mode at {}", url);
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        let (listener, stop_flag, telegram_routes) =
            webhooks::axum_to_router(bot.clone(), webhooks::Options::new(addr, url)).await?;
        let app = web.merge(telegram_routes);

        let tcp = tokio::net::TcpListener::bind(addr).await?;
        tokio::spawn(async move {
            if let Err(e) = axum::serve(tcp, app).with_graceful_shutdown(stop_flag).await {
                log::error!("Web server error: {}", e);
            }
        });

        log::info!("🎉 Bot initialization complete in {:.2}s", bot_init_start.elapsed().as_secs_f64());
        Dispatcher::builder(bot, handler)
            .dependencies(DependencyMap::new())
            .enable_ctrlc_handler()
            .build()
            .dispatch_with_listener(
                listener,
                LoggingErrorHandler::with_custom_text("An error from the update listener"),
            )
            .await;
    } else {
        tokio::spawn(async move {
            if let Err(e) = start_web_server(port, web).await {
                log::error!("Web server error: {}", e);
            }
        });

        log::info!("Starting bot in long polling mode");
        log::info!("🎉 Bot initialization complete in {:.2}s", bot_init_start.elapsed().as_secs_f64());

        let listener = teloxide::update_listeners::Polling::builder(bot.clone())
            .drop_pending_updates()
            .build();
        Dispatcher::builder(bot, handler)
            .dependencies(DependencyMap::new())
            .enable_ctrlc_handler()
            .build()
            .dispatch_with_listener(
                listener,
                LoggingErrorHandler::with_custom_text("An error from the update listener"),
            )
            .await;
    }

    let purged = files.purge_all().await;
    let photos = remove_photos(&sessions.drain_photos()).await;
    log::info!(
        "Dispatcher shutdown gracefully; removed {} pending files and {} collected photos",
        purged,
        photos
    );
    Ok(())
}
