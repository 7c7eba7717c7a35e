use anyhow::Context;
use clap::Parser;
use marginbot::api::{BinanceFuturesClient, PaperVenue, TradingVenue};
use marginbot::config::AppConfig;
use marginbot::engine::Engine;
use marginbot::health;
use marginbot::notify::{self, Notification, Notifier};
use marginbot::scheduler::Scheduler;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "marginbot")]
#[command(about = "Margin futures signal and position engine", long_about = None)]
struct Cli {
    /// Configuration file (TOML); missing file falls back to environment
    #[arg(short, long, default_value = "config/marginbot.toml")]
    config: PathBuf,

    /// Simulate orders locally against live market data
    #[arg(long)]
    paper: bool,

    /// Starting USDT balance in paper mode
    #[arg(long, default_value_t = 1000.0)]
    paper_balance: f64,

    /// Do not start the /health endpoint
    #[arg(long)]
    no_health: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = AppConfig::load(&cli.config)
        .with_context(|| format!("failed to load configuration from {}", cli.config.display()))?;
    setup_logging(&config.settings.log_file)?;

    tracing::info!("🚀 marginbot starting ({} symbols)", config.store.len());
    for (symbol, c) in config.store.iter() {
        tracing::info!(
            "    - {} {} {}x risk {:.1}% direction {:?}",
            symbol,
            c.strategy,
            c.leverage,
            c.risk_percent * 100.0,
            c.direction
        );
    }

    let http_timeout = Duration::from_secs(config.settings.http_timeout_secs);
    let market = BinanceFuturesClient::new(&config.settings.rest_url, http_timeout)?;
    let venue: Arc<dyn TradingVenue> = if cli.paper {
        Arc::new(PaperVenue::new(Arc::new(market), cli.paper_balance))
    } else {
        let (key, secret) = config.credentials.trading_keys()?;
        Arc::new(market.with_credentials(key, secret))
    };
    let notifier = notify::from_credentials(&config.credentials, http_timeout);

    let engine = Arc::new(Engine::new(venue, notifier.clone(), config.store.clone()));

    // Startup summary and initial resync before any scheduled tick
    if let Err(e) = engine.startup_summary().await {
        tracing::warn!("⚠️  Startup summary unavailable: {}", e);
    }
    let adopted = engine.resync_all().await;
    tracing::info!("🔍 Initial resync complete: {} position(s) adopted", adopted);

    tracing::info!("\n🔄 Spawning scheduled tasks...");
    let mut tasks = Scheduler::new(engine.clone(), config.settings.schedule.clone()).spawn();

    let health_task = if cli.no_health {
        None
    } else {
        let addr: SocketAddr = config
            .settings
            .health_addr
            .parse()
            .with_context(|| format!("invalid health address {}", config.settings.health_addr))?;
        Some(tokio::spawn(async move {
            if let Err(e) = health::serve(addr).await {
                tracing::error!("Health endpoint stopped: {}", e);
            }
        }))
    };

    tracing::info!("✅ All tasks spawned");
    tracing::info!("\nPress Ctrl+C to stop...\n");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("\n⚠️  Received Ctrl+C, shutting down...");
        }
        Some(exited) = tasks.join_next() => {
            let message = match exited {
                Ok(kind) => format!("{} loop exited, bot is shutting down", kind),
                Err(e) => format!("scheduled loop failed ({}), bot is shutting down", e),
            };
            tracing::error!("{}", message);
            notifier
                .notify(&Notification::Alert {
                    symbol: None,
                    message,
                })
                .await;
        }
    }

    tasks.shutdown().await;
    if let Some(handle) = health_task {
        handle.abort();
    }

    let open = engine.store().open_positions().await;
    if !open.is_empty() {
        tracing::info!("{} position(s) remain open on the exchange with their stops", open.len());
    }
    tracing::info!("👋 marginbot stopped");
    Ok(())
}

fn setup_logging(log_file: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("marginbot=info"));

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)
        .with_context(|| format!("failed to open log file {}", log_file))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file)),
        )
        .init();
    Ok(())
}
