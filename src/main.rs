use clap::Parser;
use rate_guard::{AppState, config::Args};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{Level, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    // parse cli arguments; bad profiles fail here, never per request
    let args = Args::parse();
    let settings = args.load()?;

    for profile in settings.policies.profiles() {
        info!(
            profile = %profile.name,
            window_secs = profile.window.as_secs(),
            max_requests = profile.max_requests,
            block_secs = profile.block_duration.as_secs(),
            "Loaded endpoint profile"
        );
    }

    let state = Arc::new(AppState::from_settings(settings)?);
    let sweeper_config = state.engine.sweeper_config();
    info!(
        interval_secs = sweeper_config.interval.as_secs(),
        stale_windows = sweeper_config.stale_windows,
        "Starting eviction sweeper"
    );
    let sweeper = state.engine.spawn_sweeper();

    let app = rate_guard::router(state.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "rate-guard listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    sweeper.stop().await;
    info!("rate-guard stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        // keep serving rather than shutting down right away
        std::future::pending::<()>().await;
    }
}
