//! # Periscope — Position Time-Series Dashboard Backend
//!
//! ```text
//!  ┌─────────────┐   data-YYYY-MM-DD.db(.gz)   ┌─────────────────────────────┐
//!  │  Sentinel   │ ──────────────────────────▶ │ DataStore                   │
//!  │  (capture)  │        (data folder)        │ ├─ day discovery            │
//!  └─────────────┘                             │ ├─ gz decompression         │
//!                                              │ └─ ordered snapshot load    │
//!  ┌─────────────┐  GET /api/trading-days      └──────────────┬──────────────┘
//!  │  Dashboard  │  GET /api/data/{date}                      ▼
//!  └─────────────┘  GET /api/data/{date}/summary   Diff Engine → trade markers
//!                   GET /api/data/{date}/filters
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod engine;
mod error;
mod models;
mod routes;
mod state;
mod store;

use routes::dashboard::{
    get_day_filters, get_day_summary, get_trading_day_data, get_trading_days, health_check,
    refresh_cache,
};
use state::build_state;
use store::DataStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Load .env ──────────────────────────────────────────────────────────
    dotenvy::dotenv().ok();

    // ── 2. Structured logging ─────────────────────────────────────────────────
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::from_default_env()
                .add_directive("periscope=debug".parse()?)
                .add_directive("tower_http=info".parse()?)
                .add_directive("sqlx=warn".parse()?),
        )
        .init();

    info!(r#"

  ╔═══════════════════════════════════════════════════════╗
  ║           PERISCOPE — Dashboard Backend               ║
  ║  Day Stores · Diff Engine · Trade Markers             ║
  ╚═══════════════════════════════════════════════════════╝"#);

    // ── 3. Shared state ───────────────────────────────────────────────────────
    let data_dir = PathBuf::from(std::env::var("DATA_DIR").unwrap_or_else(|_| "data".to_string()));
    let state = build_state(DataStore::new(data_dir));

    // ── 4. CORS ───────────────────────────────────────────────────────────────
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // ── 5. Router ─────────────────────────────────────────────────────────────
    let app = Router::new()
        .route("/api/trading-days",      get(get_trading_days))
        .route("/api/data/:date",         get(get_trading_day_data))
        .route("/api/data/:date/summary", get(get_day_summary))
        .route("/api/data/:date/filters", get(get_day_filters))
        .route("/api/refresh-cache",      post(refresh_cache))
        .route("/api/health",             get(health_check))
        // ── Middleware ────────────────────────────────────────────────────────
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state);

    // ── 6. Bind & Serve ───────────────────────────────────────────────────────
    let addr: SocketAddr = std::env::var("BIND_ADDR")
        .unwrap_or_else(|_| "0.0.0.0:8000".to_string())
        .parse()?;

    info!(?addr, "🚀 Periscope server starting");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
