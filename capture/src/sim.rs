//! # sim — Simulation Mode
//!
//! รันหนึ่ง session สังเคราะห์แบบย่นเวลา (เปิด-ปิด-บีบอัด ภายในไม่กี่วินาที)
//! ใช้ path เดียวกับของจริงทั้ง fetch tick และ store — ต่างแค่ window มาจาก
//! นาฬิกาจำลอง และบีบอัด store ของตัวเองทันทีแทนการ lag หนึ่งวัน

use anyhow::Context;
use chrono::Local;
use tokio::sync::watch;
use tracing::info;

use crate::archive;
use crate::config::{Config, SimConfig};
use crate::session::capture_tick;
use crate::store::{DayStore, InstrumentCache};

const SIM_DB_FILE: &str = "simulation_data.db";

pub async fn run_simulation(
    config:       &Config,
    sim:          SimConfig,
    client:       &reqwest::Client,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    info!("=== RUNNING IN SIMULATION MODE ===");

    let sim_db = config.data_dir.join(SIM_DB_FILE);
    if sim_db.exists() {
        std::fs::remove_file(&sim_db).context("Failed to remove stale simulation store")?;
    }

    let open_at    = Local::now() + chrono::Duration::from_std(sim.open_in)?;
    let close_at   = open_at + chrono::Duration::from_std(sim.duration)?;
    let archive_at = close_at + chrono::Duration::from_std(sim.archive_after)?;

    info!(
        open    = %open_at.format("%H:%M:%S"),
        close   = %close_at.format("%H:%M:%S"),
        archive = %archive_at.format("%H:%M:%S"),
        "Simulation schedule"
    );

    let store = DayStore::open(&sim_db).await?;
    let mut cache = InstrumentCache::new();

    // ── Waiting for simulated open ────────────────────────────────────────────
    while Local::now() < open_at {
        if interrupted(&mut shutdown).await {
            return Ok(());
        }
    }
    info!("SIM: Market is OPEN");

    // ── Capture until simulated close ─────────────────────────────────────────
    while Local::now() < close_at {
        capture_tick(client, config, &store, &mut cache).await;
        tokio::select! {
            _ = shutdown.changed() => return Ok(()),
            _ = tokio::time::sleep(config.fetch_interval) => {}
        }
    }
    info!("SIM: Market is CLOSED");
    store.close().await;

    // ── Post-session ──────────────────────────────────────────────────────────
    while Local::now() < archive_at {
        if interrupted(&mut shutdown).await {
            return Ok(());
        }
    }

    let outcome = tokio::task::spawn_blocking(move || archive::archive_day(&sim_db))
        .await
        .context("Archive task panicked")??;
    info!(?outcome, "SIM: Simulation cycle complete");

    Ok(())
}

/// หลับหนึ่งวินาที — `true` ถ้า shutdown มาระหว่างนั้น
async fn interrupted(shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = shutdown.changed() => true,
        _ = tokio::time::sleep(std::time::Duration::from_secs(1)) => false,
    }
}
