//! # Sentinel — Autonomous Market-Hours Capture Agent
//!
//! ```text
//! loop (every day):
//!   1. Detect new calendar day → block until safe hour
//!   2. Market calendar lookup → session window | holiday
//!   3. Catch-up into the right phase (restart-safe)
//!   4. CAPTURING: fetch position snapshot ทุก 15s → append ลง day store
//!   5. POST_SESSION: gzip store ของวันเทรดก่อนหน้า
//!   6. SLEEPING จนข้ามวัน
//! ```

use anyhow::Context;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod archive;
mod calendar;
mod config;
mod quotes;
mod session;
mod sim;
mod store;

use config::Config;
use session::SessionController;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env()
            .add_directive("sentinel=debug".parse()?)
            .add_directive("reqwest=warn".parse()?)
            .add_directive("sqlx=warn".parse()?))
        .init();

    info!(r#"

  ╔═══════════════════════════════════════════╗
  ║   SENTINEL — Capture Agent                ║
  ║   Periscope Position Tracking             ║
  ╚═══════════════════════════════════════════╝"#);

    let config = Config::from_env().context("Failed to load config")?;
    let client = reqwest::Client::new();

    std::fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("Failed to create data dir {}", config.data_dir.display()))?;

    info!(
        feed     = %config.feed_url,
        data_dir = %config.data_dir.display(),
        interval = ?config.fetch_interval,
        "Sentinel started"
    );

    // ── Shutdown signal — ทุก wait ใน controller เช็คค่านี้ ───────────────────
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown requested (Ctrl-C)");
            let _ = shutdown_tx.send(true);
        }
    });

    match config.simulation {
        Some(sim_config) => {
            sim::run_simulation(&config, sim_config, &client, shutdown_rx).await?;
        }
        None => {
            SessionController::new(config, client, shutdown_rx).run().await?;
        }
    }

    info!("--- Shutting down ---");
    Ok(())
}
