mod bootstrap;

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use monitor_bot::commands::Authorizer;
use monitor_bot::{CommandBot, TelegramClient, TelegramNotifier};
use monitor_core::notifications::{LogNotifier, NotificationSink};
use monitor_core::settings::Settings;
use monitor_data::registry::{AccountRegistry, FileRegistry};
use monitor_runtime::orchestrator::{MonitorConfig, MonitoringOrchestrator, RunOutcome};
use monitor_runtime::session::{BrowserConfig, BrowserSession, SessionResource};
use tokio::sync::watch;

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let settings = Settings::load();

    let data_dir = settings.data_dir();
    bootstrap::ensure_directories(&data_dir)?;
    bootstrap::setup_logging(&settings.log_level, settings.log_file.as_deref())?;

    tracing::info!("Follow Monitor v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        mode = %settings.mode,
        data_dir = %data_dir.display(),
        interval_secs = settings.check_interval,
        webdriver = %settings.webdriver_url,
        "configuration loaded"
    );

    settings.validate()?;

    let registry = Arc::new(
        FileRegistry::open(settings.registry_path()).context("failed to open the account registry")?,
    );
    let config = MonitorConfig::from_settings(&settings);
    let browser = BrowserConfig::from_settings(&settings)?;

    match settings.mode.as_str() {
        "headless" => run_headless(registry, config, browser).await,
        _ => run_bot(&settings, registry, config, browser).await,
    }
}

/// Monitor the registered accounts until Ctrl+C, logging alerts.
async fn run_headless(
    registry: Arc<FileRegistry>,
    config: MonitorConfig,
    browser: BrowserConfig,
) -> Result<()> {
    if registry.list_accounts()?.is_empty() {
        tracing::warn!("no accounts registered; the monitor will idle until some are added");
    }

    let session = Arc::new(BrowserSession::new(browser)?);
    let orchestrator =
        MonitoringOrchestrator::new(session, registry, Arc::new(LogNotifier), config);

    let (stop_tx, stop_rx) = watch::channel(false);
    let run = orchestrator.run(stop_rx);
    tokio::pin!(run);

    let outcome = tokio::select! {
        outcome = &mut run => outcome,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Ctrl+C received; stopping monitoring");
            stop_tx.send_replace(true);
            run.await
        }
    };

    match outcome {
        RunOutcome::Stopped => Ok(()),
        RunOutcome::Fatal(reason) => bail!("monitoring stopped: {reason}"),
    }
}

/// Serve chat commands until Ctrl+C.
async fn run_bot(
    settings: &Settings,
    registry: Arc<FileRegistry>,
    config: MonitorConfig,
    browser: BrowserConfig,
) -> Result<()> {
    let token = settings
        .telegram_token
        .as_ref()
        .context("TELEGRAM_BOT_TOKEN is required in bot mode")?;
    let client = TelegramClient::new(token);

    let sink_client = client.clone();
    let bot = CommandBot::new(
        registry,
        Authorizer::new(settings.authorized_users.iter().cloned()),
        config,
        Box::new(move || -> monitor_core::Result<Arc<dyn SessionResource>> {
            Ok(Arc::new(BrowserSession::new(browser.clone())?))
        }),
        Box::new(move |chat_id| -> monitor_core::Result<Arc<dyn NotificationSink>> {
            Ok(Arc::new(TelegramNotifier::new(sink_client.clone(), chat_id)?))
        }),
    );

    tracing::info!(
        authorized_users = settings.authorized_users.len(),
        "starting Telegram command bot"
    );
    bot.run(client, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
        tracing::info!("Ctrl+C received; shutting down");
    })
    .await;

    Ok(())
}
