use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use vk_wall_relay::config::Config;
use vk_wall_relay::relay::Relay;
use vk_wall_relay::storage::Storage;
use vk_wall_relay::telegram::TelegramClient;
use vk_wall_relay::vk::VkClient;

/// Pause before restarting a loop that panicked.
const RESTART_DELAY: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    init_tracing()?;

    info!("Starting vk-wall-relay");

    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    info!(
        groups = config.group_ids.len(),
        include_words = config.include_words.len(),
        exclude_words = config.exclude_words.len(),
        check_interval_secs = config.check_interval.as_secs(),
        days_shift = config.days_shift,
        "Configuration loaded"
    );

    let storage = Storage::load(&config.storage_file).await;
    let storage = Arc::new(Mutex::new(storage));

    let relay = Arc::new(Relay::new(
        config.clone(),
        Arc::new(VkClient::from_config(&config)),
        Arc::new(TelegramClient::from_config(&config)),
        storage,
    ));

    let sweep_relay = Arc::clone(&relay);
    let sweep_handle = tokio::spawn(supervise("sweep", move || {
        Arc::clone(&sweep_relay).run_sweep_loop()
    }));

    let refresh_relay = Arc::clone(&relay);
    let refresh_handle = tokio::spawn(supervise("refresh", move || {
        Arc::clone(&refresh_relay).run_refresh_loop()
    }));

    shutdown_signal().await;

    info!("Shutting down...");

    sweep_handle.abort();
    refresh_handle.abort();

    info!("Shutdown complete");

    Ok(())
}

/// Keep a background loop alive: a panic is logged and the loop restarted.
async fn supervise<F, Fut>(name: &'static str, make_loop: F)
where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    loop {
        match tokio::spawn(make_loop()).await {
            Ok(()) => {
                warn!(task = name, "Loop exited");
                return;
            }
            Err(e) if e.is_panic() => {
                error!(task = name, "Loop panicked, restarting: {e}");
                tokio::time::sleep(RESTART_DELAY).await;
            }
            Err(_) => return,
        }
    }
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,vk_wall_relay=debug"));

    // Check if JSON logging is requested
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| matches!(v.to_lowercase().as_str(), "json" | "structured"))
        .unwrap_or(false);

    if use_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
