use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use intake_bot::admin::{AdminState, admin_routes, cors_layer};
use intake_bot::bot::IntakeBot;
use intake_bot::channels::{Blocklist, ChannelManager, CliChannel, TelegramChannel};
use intake_bot::config::IntakeConfig;
use intake_bot::intake::{IntakeController, SessionStore};
use intake_bot::llm::create_oracle;
use intake_bot::store::{Database, LibSqlBackend};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is fine
    let _ = dotenvy::dotenv();

    let config = IntakeConfig::from_env().context("invalid configuration")?;

    // Keep the guard alive so the file writer flushes on exit
    let (file_layer, _log_guard) = match config.log_dir.as_deref() {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "intake-bot.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(file_layer)
        .init();

    eprintln!("🏢 Intake bot v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Database: {}", config.db_path.display());
    eprintln!("   Admin API: http://0.0.0.0:{}/v1", config.port);

    // ── Database ─────────────────────────────────────────────────────────
    let store: Arc<dyn Database> = Arc::new(
        LibSqlBackend::new_local(&config.db_path)
            .await
            .with_context(|| format!("failed to open database at {}", config.db_path.display()))?,
    );

    // ── Oracle ───────────────────────────────────────────────────────────
    let oracle = match config.gemini.as_ref() {
        Some(gemini) => match create_oracle(gemini) {
            Ok(o) => Some(o),
            Err(e) => {
                tracing::warn!(error = %e, "Oracle disabled");
                None
            }
        },
        None => None,
    };
    eprintln!(
        "   Oracle: {}",
        oracle.as_ref().map(|o| o.model_name()).unwrap_or("disabled")
    );

    // ── Channels ─────────────────────────────────────────────────────────
    let mut channels = ChannelManager::new();
    channels.add(Box::new(CliChannel::new()));
    if let Some(ref telegram) = config.telegram {
        channels.add(Box::new(TelegramChannel::new(telegram)));
    }
    eprintln!("   Channels: {}\n", channels.names().join(", "));
    let channels = Arc::new(channels);

    // ── Intake ───────────────────────────────────────────────────────────
    let sessions = Arc::new(SessionStore::new());
    let controller = Arc::new(
        IntakeController::new(Arc::clone(&store), sessions, config.max_candidates)
            .with_oracle(oracle.clone())
            .with_oracle_timeout(config.oracle_timeout),
    );
    let blocklist = Arc::new(Blocklist::new(config.blocklist.iter().cloned()));

    // ── Admin API ────────────────────────────────────────────────────────
    let app = admin_routes(AdminState {
        controller: Arc::clone(&controller),
        channels: Arc::clone(&channels),
        blocklist: Arc::clone(&blocklist),
        store,
        oracle,
        default_channel: config
            .default_channel
            .clone()
            .unwrap_or_else(|| "cli".to_string()),
    })
    .layer(cors_layer(&config.admin_origins));
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port))
        .await
        .with_context(|| format!("failed to bind admin port {}", config.port))?;
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "Admin server stopped");
        }
    });
    tracing::info!(port = config.port, "Admin server started");

    IntakeBot::new(channels, controller, blocklist, config.session_idle_timeout)
        .run()
        .await?;

    Ok(())
}
