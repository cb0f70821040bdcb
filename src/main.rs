// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::net::SocketAddr;
use std::time::Duration;

use axum_server::Handle;
use kotomi_rust_server::{
    api::{cors_layer, router_with_cors},
    config::{LogFormat, ServerConfig, DEFAULT_LOG_FILTER},
    state::AppState,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// How long in-flight requests get to finish after a shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() {
    let config = ServerConfig::from_env();
    init_tracing(config.log_format);

    let state = match AppState::new(&config) {
        Ok(state) => state,
        Err(e) => {
            error!(error = %e, "Failed to initialize server state");
            std::process::exit(1);
        }
    };

    if !state.admin.is_enabled() {
        warn!("ADMIN_API_TOKEN not set; admin config API is disabled");
    }

    let shutdown = CancellationToken::new();
    let jwks_task = tokio::spawn(state.jwks().clone().run(shutdown.clone()));
    let sweeper_task = tokio::spawn(state.rate_limiter.clone().run_sweeper(shutdown.clone()));

    let app = router_with_cors(
        state,
        cors_layer(config.cors_allowed_origins.as_deref()),
    );

    let addr: SocketAddr = match config.bind_address().parse() {
        Ok(addr) => addr,
        Err(e) => {
            error!(address = %config.bind_address(), error = %e, "Invalid bind address");
            std::process::exit(1);
        }
    };

    let handle = Handle::new();
    tokio::spawn(shutdown_signal(handle.clone(), shutdown.clone()));

    info!(%addr, "Kotomi server listening on http://{addr} (docs at /docs)");

    if let Err(e) = axum_server::bind(addr)
        .handle(handle)
        .serve(app.into_make_service_with_connect_info::<SocketAddr>())
        .await
    {
        error!(error = %e, "HTTP server failed");
    }

    shutdown.cancel();
    let _ = tokio::join!(jwks_task, sweeper_task);
    info!("Server stopped");
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn shutdown_signal(handle: Handle<SocketAddr>, shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
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
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
    shutdown.cancel();
    handle.graceful_shutdown(Some(SHUTDOWN_GRACE));
}
