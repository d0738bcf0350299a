//! # cascades-server: HTTP front end for the Cascades optimizer
//!
//! Runs one optimization per request against a shared rule registry and catalog
//! snapshot. Plans travel as JSON (see `cascades_core::plan`).
//!
//! ```text
//! client (SQL planner)
//!   |
//!   | POST /optimize  { plan, required, session }
//!   v
//! cascades-server
//!   +-> session vars layered over the base configuration
//!   +-> Cascades search on a blocking thread
//!   |
//!   | { plan, status, stats, explain }
//!   v
//! client
//! ```
//!
//! ## Endpoints
//!
//! - `GET  /health`           - Health check
//! - `GET  /rules`            - Rules active under the current configuration
//! - `POST /optimize`         - Optimize a JSON logical plan
//! - `POST /rules/configure`  - Enable/disable rules, select a connector rule set
//! - `POST /catalog/tables`   - Register table metadata and statistics
//!
//! ## Configuration
//!
//! - `CASCADES_LISTEN_ADDR`: bind address, default `0.0.0.0:3000`.
//! - `CASCADES_CONFIG`: path to a JSON `OptimizerConfig`; defaults apply when unset.
//! - `RUST_LOG`: log filter, default `cascades=debug`.

mod routes;
mod state;

use axum::routing::{get, post};
use axum::Router;
use cascades_core::config::OptimizerConfig;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:3000";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("cascades=debug"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = match std::env::var("CASCADES_CONFIG") {
        Ok(path) => OptimizerConfig::from_json(&std::fs::read_to_string(&path)?)?,
        Err(_) => OptimizerConfig::default(),
    };
    let state = Arc::new(state::AppState::new(config));

    let app = Router::new()
        .route("/health", get(routes::health))
        .route("/rules", get(routes::list_rules))
        .route("/optimize", post(routes::optimize))
        .route("/rules/configure", post(routes::configure_rules))
        .route("/catalog/tables", post(routes::register_tables))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = std::env::var("CASCADES_LISTEN_ADDR").unwrap_or_else(|_| DEFAULT_LISTEN_ADDR.to_string());
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("cascades-server listening on http://{addr}");
    axum::serve(listener, app).await?;
    Ok(())
}
