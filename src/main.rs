// SPDX-License-Identifier: MIT

//! Ingress Admission Filter Service
//!
//! Runs the admission middleware in front of a minimal application router:
//!
//! - Per-client quota (60 requests/minute default) with conservative decay
//! - Path and user-agent regex blocklists, reloaded every 2 hours
//! - Stale counter eviction every 30 minutes
//!
//! ## Configuration
//!
//! Configuration is read from a TOML file named by `ADMISSION_CONFIG`
//! (default: `config.toml`); built-in defaults apply when the file is
//! absent. The blocklist files must load successfully at startup — there is
//! no safe initial state without them.

use anyhow::Context;
use axum::{middleware, routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use ingress_admission::{
    admission::{admission_middleware, AdmissionControl},
    blocklist::{RuleSet, RuleStore},
    config::Config,
    handlers::{admitted, health, AppState},
    limiter::ClientTable,
};

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

    // Load configuration
    let config = Config::from_env_or_default()?;
    info!(
        bind_addr = %config.bind_addr,
        limit = config.rate_limit.limit,
        interval_secs = config.rate_limit.interval_secs,
        paths_file = %config.blocklist.paths_file.display(),
        user_agents_file = %config.blocklist.user_agents_file.display(),
        "Starting ingress admission filter"
    );

    // Initial blocklist load is fatal on failure: without it there is no
    // valid rule snapshot to serve traffic against.
    let rules = RuleSet::load(
        &config.blocklist.paths_file,
        &config.blocklist.user_agents_file,
    )
    .context("loading initial blocklists")?;
    info!(
        path_rules = rules.path_rule_count(),
        user_agent_rules = rules.user_agent_rule_count(),
        "Blocklists loaded"
    );

    let table = Arc::new(ClientTable::new(&config.rate_limit));
    let store = Arc::new(RuleStore::new(rules));

    // Background tasks: eviction sweep and blocklist refresh. The shutdown
    // channel stops them cleanly when the process exits.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweep_task = table
        .clone()
        .spawn_sweep(config.rate_limit.sweep_interval(), shutdown_rx.clone());
    let refresh_task = store
        .clone()
        .spawn_refresh(config.blocklist.clone(), shutdown_rx);

    let state = Arc::new(AppState {
        admission: AdmissionControl::new(table, store),
        config: config.clone(),
    });

    // Build router; the admission layer runs before every route.
    let app = Router::new()
        .route("/health", get(health))
        .fallback(admitted)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            admission_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start server
    let addr: SocketAddr = config.bind_addr.parse()?;
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %addr, "Server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    let _ = shutdown_tx.send(true);
    sweep_task.abort();
    refresh_task.abort();

    Ok(())
}
