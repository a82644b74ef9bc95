use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use jobboard_relay::cli::{self, Cli};
use jobboard_relay::config::Config;
use jobboard_relay::listener::{ChangeListener, WatchedTable};
use jobboard_relay::notifications::NotificationService;
use jobboard_relay::realtime::{RealtimeClient, RealtimeConfig};
use jobboard_relay::startup::run_startup_checks;
use jobboard_relay::supabase::{RecordSource, SupabaseClient};
use jobboard_relay::AppState;

/// Buffered change events between the websocket and the listener
const CHANGE_CHANNEL_CAPACITY: usize = 256;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(&cli.config)?;

    // Initialize logging
    let log_level = cli
        .log_level
        .as_ref()
        .unwrap_or(&config.logging.level)
        .clone();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if cli.command.is_some() {
        return cli::run_command(&cli, &config).await;
    }

    tracing::info!(
        environment = %config.environment,
        "Starting jobboard-relay v{}",
        env!("CARGO_PKG_VERSION")
    );

    let notifications = Arc::new(NotificationService::from_config(&config)?);
    let supabase = SupabaseClient::from_config(&config.supabase)?.map(Arc::new);

    if cli.skip_checks {
        tracing::warn!("Startup checks skipped");
    } else {
        let report = run_startup_checks(
            &config,
            &**notifications.mailer(),
            supabase.as_deref(),
        )
        .await;
        if !report.all_critical_passed {
            anyhow::bail!("Startup checks failed: {}", report.summary);
        }
    }

    if config.auth.api_key.is_none() {
        tracing::warn!("RELAY_API_KEY not set, /send-email and /test-email accept any caller");
    }

    let realtime_task = spawn_realtime(&config, notifications.clone(), supabase);
    let state = Arc::new(AppState::new(
        config.clone(),
        notifications,
        realtime_task.is_some(),
    ));

    let app = jobboard_relay::api::create_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("API server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(task) = realtime_task {
        task.abort();
    }

    tracing::info!("Server stopped");
    Ok(())
}

/// Start the websocket subscriber and the change listener when Supabase is
/// configured and realtime is enabled.
fn spawn_realtime(
    config: &Config,
    notifications: Arc<NotificationService>,
    supabase: Option<Arc<SupabaseClient>>,
) -> Option<JoinHandle<()>> {
    if !config.supabase.realtime_enabled {
        tracing::info!("Realtime notifications disabled by configuration");
        return None;
    }

    let (Some(client), Some(realtime_config)) = (
        supabase,
        RealtimeConfig::from_supabase_config(&config.supabase, &WatchedTable::names()),
    ) else {
        tracing::warn!("Supabase not configured, realtime notifications disabled");
        return None;
    };

    let (tx, rx) = mpsc::channel(CHANGE_CHANNEL_CAPACITY);

    let records: Arc<dyn RecordSource> = client;
    let listener = Arc::new(ChangeListener::new(notifications, records));
    tokio::spawn(listener.run(rx));

    Some(tokio::spawn(RealtimeClient::new(realtime_config).run(tx)))
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
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
