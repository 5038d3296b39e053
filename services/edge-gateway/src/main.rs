// SPDX-FileCopyrightText: 2026 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Storefront edge gateway service.
//!
//! ## Configuration
//!
//! Configuration is read from environment variables; every setting has a
//! default. The most common ones:
//!
//! - `BIND_ADDR`: Server bind address (default: 0.0.0.0:8080)
//! - `ORIGIN_URL`: Origin API base URL (default: http://127.0.0.1:3000)
//! - `COUNTER_STORE_URL`: Redis URL for rate-limit counters (default: in-process)
//! - `RATE_LIMIT_API` / `RATE_LIMIT_WEBHOOK` / `RATE_LIMIT_INFO`: requests per window
//! - `WEBHOOK_SOURCES`: comma-separated source names, each with a
//!   `WEBHOOK_SECRET_<SOURCE>`
//!
//! Log verbosity follows `RUST_LOG`.

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use edge_gateway::{build_router, AppState, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let config = Config::from_env()?;
    info!(
        bind_addr = %config.bind_addr,
        origin = %config.proxy.origin_url,
        api_limit = config.rate_limit.api.limit,
        webhook_limit = config.rate_limit.webhook.limit,
        window_secs = config.rate_limit.api.window_secs,
        webhook_sources = config.webhooks.sources.len(),
        "Starting edge gateway"
    );

    let addr: SocketAddr = config.bind_addr.parse()?;
    let state = Arc::new(AppState::from_config(config)?);
    let app = build_router(state);

    let listener = TcpListener::bind(addr).await?;
    info!(addr = %addr, "Server listening");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

/// Resolve on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
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
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
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
}
