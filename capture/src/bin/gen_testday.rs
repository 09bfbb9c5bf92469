//! # gen_testday — สร้างวันเทรดสังเคราะห์หนึ่งวัน
//!
//! เขียน `data-<today>.db.gz` ลง data folder: NIFTY option instruments +
//! snapshot ทุก 15 วินาทีตลอด session 09:15–15:30 พร้อมการเทรดสุ่ม
//! (เปิด/ปรับ/ปิด position) และ P&L ที่แยก realized/unrealized จริง
//!
//! Standalone script — ไม่แตะ module อื่นของ agent เลย (เหมือน dev tool)

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::PathBuf;

use anyhow::Context;
use chrono::{Duration, Local, NaiveDateTime};
use flate2::write::GzEncoder;
use flate2::Compression;
use rand::seq::SliceRandom;
use rand::Rng;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

const SNAPSHOT_STEP_SECS: i64 = 15;
const SESSION_HOURS: f64 = 6.25;

struct Instrument {
    id:     i64,
    symbol: String,
    kind:   &'static str, // "CE" | "PE"
    strike: f64,
    expiry: String,
}

struct SimPosition {
    instrument: usize, // index ลง instruments
    quantity:   i64,
    avg_price:  f64,
    last_price: f64,
    pnl:        f64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let data_dir = PathBuf::from(std::env::var("DATA_DIR").unwrap_or_else(|_| "data".into()));
    std::fs::create_dir_all(&data_dir)?;

    let today = Local::now().date_naive();
    let db_path = data_dir.join(format!("data-{}.db", today.format("%Y-%m-%d")));
    if db_path.exists() {
        std::fs::remove_file(&db_path)?;
    }

    println!("Creating test data for {}", today.format("%Y-%m-%d"));

    let pool = open_store(&db_path).await?;
    let instruments = build_instruments(&today.format("%Y-%m-%d").to_string());
    insert_instruments(&pool, &instruments).await?;
    println!("Created {} instruments", instruments.len());

    // ── Session loop: 09:15 → 15:30 ทุก 15 วินาที ─────────────────────────────
    let start = today.and_hms_opt(9, 15, 0).context("invalid session start")?;
    let end   = today.and_hms_opt(15, 30, 0).context("invalid session end")?;

    let mut rng = rand::thread_rng();
    let mut positions: HashMap<i64, SimPosition> = HashMap::new();
    let mut realized_pnl = 0.0f64;
    let mut underlying = 21_500.0f64;
    let base_price = underlying;
    let mut current = start;
    let mut snapshots = 0u32;

    while current <= end {
        // ตลาดขยับ ± แล้ว clamp ±3%
        underlying = (underlying + rng.gen_range(-0.5..0.5))
            .clamp(base_price * 0.97, base_price * 1.03);

        // 8% ต่อ snapshot ที่มีการเทรด
        if rng.gen_range(0.0..1.0) < 0.08 {
            apply_random_trade(&mut rng, &instruments, &mut positions, &mut realized_pnl);
        }

        // Reprice ทุก position แล้วรวม unrealized P&L
        let elapsed = (current - start).num_seconds() as f64;
        let time_decay = (1.0 - elapsed / (SESSION_HOURS * 3600.0)).max(0.1);
        let mut unrealized = 0.0;

        for position in positions.values_mut() {
            let inst = &instruments[position.instrument];
            let intrinsic = match inst.kind {
                "CE" => (underlying - inst.strike).max(0.0),
                _    => (inst.strike - underlying).max(0.0),
            };
            let time_value = rng.gen_range(8.0..35.0) * time_decay;
            position.last_price = (intrinsic + time_value + rng.gen_range(-3.0..3.0)).max(0.5);
            position.pnl = (position.last_price - position.avg_price) * position.quantity as f64;
            unrealized += position.pnl;
        }

        insert_snapshot(&pool, current, realized_pnl + unrealized,
                        &positions, realized_pnl, underlying).await?;

        snapshots += 1;
        current = current + Duration::seconds(SNAPSHOT_STEP_SECS);
    }

    pool.close().await;
    println!("Created {snapshots} snapshots");

    // ── บีบอัดเหมือน Archiver ของจริง ─────────────────────────────────────────
    let gz_path = data_dir.join(format!("data-{}.db.gz", today.format("%Y-%m-%d")));
    let mut input = File::open(&db_path)?;
    let mut raw = Vec::new();
    input.read_to_end(&mut raw)?;
    let mut encoder = GzEncoder::new(File::create(&gz_path)?, Compression::default());
    std::io::Write::write_all(&mut encoder, &raw)?;
    encoder.finish()?;
    std::fs::remove_file(&db_path)?;

    println!("Test data ready: {}", gz_path.display());
    Ok(())
}

async fn open_store(path: &std::path::Path) -> anyhow::Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(SqliteConnectOptions::new().filename(path).create_if_missing(true))
        .await?;

    for statement in [
        "CREATE TABLE IF NOT EXISTS instruments (
            id INTEGER PRIMARY KEY, symbol TEXT UNIQUE NOT NULL,
            underlying_symbol TEXT, type TEXT, strike REAL, expiry TEXT)",
        "CREATE TABLE IF NOT EXISTS snapshots (
            id INTEGER PRIMARY KEY, timestamp TEXT NOT NULL, total_pnl REAL)",
        "CREATE TABLE IF NOT EXISTS position_details (
            snapshot_id INTEGER, instrument_id INTEGER, quantity INTEGER,
            avg_price REAL, last_price REAL, unbooked_pnl REAL, booked_pnl REAL,
            underlying_price REAL,
            FOREIGN KEY (snapshot_id) REFERENCES snapshots (id),
            FOREIGN KEY (instrument_id) REFERENCES instruments (id))",
    ] {
        sqlx::query(statement).execute(&pool).await?;
    }
    Ok(pool)
}

/// Strikes รอบ ATM ห่างกัน 100 จุด อย่างละ CE/PE
fn build_instruments(expiry: &str) -> Vec<Instrument> {
    let mut out = Vec::new();
    let mut id = 1i64;
    for strike in [21_300.0, 21_400.0, 21_500.0, 21_600.0, 21_700.0] {
        for kind in ["CE", "PE"] {
            out.push(Instrument {
                id,
                symbol: format!("NIFTY{}{:05}{}", &expiry[expiry.len() - 2..], strike as i64, kind),
                kind,
                strike,
                expiry: expiry.to_string(),
            });
            id += 1;
        }
    }
    out
}

async fn insert_instruments(pool: &SqlitePool, instruments: &[Instrument]) -> anyhow::Result<()> {
    for inst in instruments {
        sqlx::query(
            "INSERT INTO instruments (id, symbol, underlying_symbol, type, strike, expiry)
             VALUES (?, ?, 'NIFTY', ?, ?, ?)",
        )
        .bind(inst.id)
        .bind(&inst.symbol)
        .bind(inst.kind)
        .bind(inst.strike)
        .bind(&inst.expiry)
        .execute(pool)
        .await?;
    }
    Ok(())
}

fn apply_random_trade(
    rng:          &mut impl Rng,
    instruments:  &[Instrument],
    positions:    &mut HashMap<i64, SimPosition>,
    realized_pnl: &mut f64,
) {
    match ["new", "modify", "close"].choose(rng) {
        Some(&"new") if positions.len() < 6 => {
            let idx = rng.gen_range(0..instruments.len());
            let id = instruments[idx].id;
            if !positions.contains_key(&id) {
                let quantity = *[25i64, 50, 75, 100].choose(rng).unwrap_or(&50)
                    * *[1i64, -1].choose(rng).unwrap_or(&1);
                positions.insert(id, SimPosition {
                    instrument: idx,
                    quantity,
                    avg_price:  rng.gen_range(15.0..150.0f64).max(5.0),
                    last_price: 0.0,
                    pnl:        0.0,
                });
            }
        }
        Some(&"modify") if !positions.is_empty() => {
            let keys: Vec<i64> = positions.keys().copied().collect();
            if let Some(&id) = keys.choose(rng) {
                let delta = *[25i64, 50, -25, -50].choose(rng).unwrap_or(&25);
                let mut fully_closed = false;
                if let Some(position) = positions.get_mut(&id) {
                    let old_quantity = position.quantity;
                    position.quantity += delta;
                    if position.quantity == 0 {
                        *realized_pnl +=
                            (position.last_price - position.avg_price) * old_quantity as f64;
                        fully_closed = true;
                    }
                }
                if fully_closed {
                    positions.remove(&id);
                }
            }
        }
        Some(&"close") if !positions.is_empty() => {
            let keys: Vec<i64> = positions.keys().copied().collect();
            if let Some(&id) = keys.choose(rng) {
                if let Some(position) = positions.remove(&id) {
                    *realized_pnl +=
                        (position.last_price - position.avg_price) * position.quantity as f64;
                }
            }
        }
        _ => {}
    }
}

async fn insert_snapshot(
    pool:         &SqlitePool,
    timestamp:    NaiveDateTime,
    total_pnl:    f64,
    positions:    &HashMap<i64, SimPosition>,
    realized_pnl: f64,
    underlying:   f64,
) -> anyhow::Result<()> {
    let snapshot_id = sqlx::query("INSERT INTO snapshots (timestamp, total_pnl) VALUES (?, ?)")
        .bind(timestamp.format("%Y-%m-%dT%H:%M:%S").to_string())
        .bind(total_pnl)
        .execute(pool)
        .await?
        .last_insert_rowid();

    for (id, position) in positions {
        sqlx::query(
            "INSERT INTO position_details
               (snapshot_id, instrument_id, quantity, avg_price, last_price,
                unbooked_pnl, booked_pnl, underlying_price)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(snapshot_id)
        .bind(*id)
        .bind(position.quantity)
        .bind(position.avg_price)
        .bind(position.last_price)
        .bind(position.pnl)
        .bind(realized_pnl)
        .bind(underlying)
        .execute(pool)
        .await?;
    }
    Ok(())
}
