//! Arena Sync server
//!
//! Serves the highscore leaderboard and, when `SIM_PEERS` is set, runs a
//! bot-driven arena over an in-process room so the sync core can be
//! watched end to end.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use arena_sync::app::AppState;
use arena_sync::config::Config;
use arena_sync::game::{KillPersistence, SimPersistence, Simulation};
use arena_sync::http::build_router;
use arena_sync::util::time::{init_server_time, unix_millis};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    init_tracing(&config.log_level);

    // Initialize server time tracking
    init_server_time();

    info!("Starting Arena Sync server");
    info!("Server address: {}", config.server_addr);
    if !config.persistence_enabled() {
        info!("SUPABASE_URL/SUPABASE_ANON_KEY not set, highscores disabled");
    }

    let mut state = AppState::new(&config);

    if config.sim_peers > 0 {
        let persistence = match (state.highscores.clone(), config.sim_wallet_prefix.clone()) {
            (Some(store), Some(wallet_prefix)) => Some(SimPersistence {
                store: Arc::new(store) as Arc<dyn KillPersistence>,
                wallet_prefix,
            }),
            _ => None,
        };
        let simulation = Simulation::start(
            config.sim_peers,
            &config.sync,
            config.sim_tick,
            persistence,
            unix_millis(),
        );
        state = state.with_simulation(Arc::new(simulation));
    }
    let simulation = state.simulation.clone();

    // Build router
    let router = build_router(state);

    // Start server
    let addr: SocketAddr = config.server_addr;
    let listener = TcpListener::bind(addr).await?;

    info!("Server listening on {}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(simulation) = simulation {
        simulation.shutdown();
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        }
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        }
    }
}
