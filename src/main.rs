//! Leaderboard relay entrypoint: joins a live quiz session and republishes
//! rankings over REST and SSE.

use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use quiz_leaderboard::{
    config::AppConfig,
    routes,
    services::{session_channel::ConnectionStatus, sse_events, transport::WebSocketConnector},
    state::{AppState, SharedState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    if config.session_code.is_empty() {
        anyhow::bail!("no session code configured; set SESSION_CODE or sessionCode in the config file");
    }

    let connector = WebSocketConnector::new(config.server_url.clone()).with_heartbeat(config.heartbeat());
    let port = config.port;
    let app_state = AppState::new(config, Arc::new(connector));

    sse_events::install(&app_state);
    app_state.channel().connect();
    tokio::spawn(run_auto_join(app_state.clone()));

    // Build the HTTP router once the shared state is ready.
    let app = build_router(app_state.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, session = %app_state.config().session_code, "starting relay");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    app_state.channel().disconnect().await;
    Ok(())
}

/// Join the session every time the link comes up, including after reconnects.
async fn run_auto_join(state: SharedState) {
    let mut status = state.channel().status_watcher();
    loop {
        if *status.borrow_and_update() == ConnectionStatus::Connected {
            let config = state.config();
            match state.channel().join_session(
                &config.display_name,
                config.user_id.as_deref(),
                config.display_avatar.as_deref(),
            ) {
                Ok(()) => info!(name = %config.display_name, "joined session"),
                Err(err) => warn!(error = %err, "failed to join session"),
            }
        }

        if status.changed().await.is_err() {
            break;
        }
    }
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
