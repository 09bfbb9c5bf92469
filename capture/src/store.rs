//! # store — Write-Side Day Store
//!
//! SQLite หนึ่งไฟล์ต่อวันเทรด (`data-YYYY-MM-DD.db`) — append-only:
//! snapshot row หนึ่งแถวต่อ tick + position rows ของมัน
//!
//! ## Instrument identity
//! Instrument ถูก insert ครั้งแรกที่เจอ symbol (first-seen-wins) และ
//! lookup ผ่าน [`InstrumentCache`] ที่มีอายุแค่หนึ่งวันเทรด — ห้าม share
//! cache ข้ามวันเด็ดขาด เพราะ id เป็น rowid ของ store คนละไฟล์

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::NaiveDate;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::{debug, warn};

use crate::quotes::SnapshotPayload;

// ─── Schema ───────────────────────────────────────────────────────────────────

const SCHEMA: [&str; 3] = [
    "CREATE TABLE IF NOT EXISTS instruments (
        id INTEGER PRIMARY KEY,
        symbol TEXT UNIQUE NOT NULL,
        underlying_symbol TEXT,
        type TEXT,
        strike REAL,
        expiry TEXT
    )",
    "CREATE TABLE IF NOT EXISTS snapshots (
        id INTEGER PRIMARY KEY,
        timestamp TEXT NOT NULL,
        total_pnl REAL
    )",
    "CREATE TABLE IF NOT EXISTS position_details (
        snapshot_id INTEGER,
        instrument_id INTEGER,
        quantity INTEGER,
        avg_price REAL,
        last_price REAL,
        unbooked_pnl REAL,
        booked_pnl REAL,
        underlying_price REAL,
        FOREIGN KEY (snapshot_id) REFERENCES snapshots (id),
        FOREIGN KEY (instrument_id) REFERENCES instruments (id)
    )",
];

/// Path ของ day store: `{dir}/data-YYYY-MM-DD.db`
pub fn day_store_path(dir: &Path, date: NaiveDate) -> PathBuf {
    dir.join(format!("data-{}.db", date.format("%Y-%m-%d")))
}

// ─── Instrument Cache ─────────────────────────────────────────────────────────

/// Cache symbol→id ต่อหนึ่งวันเทรด — สร้างตอนเข้า Capturing, ทิ้งตอนจบวัน
#[derive(Debug, Default)]
pub struct InstrumentCache {
    map: HashMap<String, i64>,
}

impl InstrumentCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }
}

// ─── Day Store ────────────────────────────────────────────────────────────────

/// Handle ของ store หนึ่งวัน — เปิดแล้ว schema พร้อมเสมอ
pub struct DayStore {
    pool: SqlitePool,
    path: PathBuf,
}

impl DayStore {
    /// เปิด (หรือสร้าง) store ที่ `path` แล้ว ensure schema
    ///
    /// Idempotent — restart กลางวันเปิดไฟล์เดิมแล้ว append ต่อได้เลย
    pub async fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create data dir {}", parent.display()))?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open day store {}", path.display()))?;

        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&pool)
                .await
                .context("Failed to ensure day store schema")?;
        }

        debug!(path = %path.display(), "Day store ready");
        Ok(Self { pool, path: path.to_path_buf() })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append snapshot หนึ่งอัน + position rows ทั้งหมดของมัน (atomic)
    ///
    /// Position ที่ resolve instrument ไม่ได้จะถูกข้าม — แถวอื่นของ tick
    /// เดียวกันยังถูกเขียนตามปกติ คืนค่าจำนวน position rows ที่เขียนจริง
    pub async fn append(
        &self,
        snapshot: &SnapshotPayload,
        cache:    &mut InstrumentCache,
    ) -> anyhow::Result<u64> {
        let mut tx = self.pool.begin().await.context("Failed to begin snapshot insert")?;

        let snapshot_id = sqlx::query("INSERT INTO snapshots (timestamp, total_pnl) VALUES (?, ?)")
            .bind(&snapshot.created_at)
            .bind(snapshot.total_profit)
            .execute(&mut *tx)
            .await
            .context("Failed to insert snapshot row")?
            .last_insert_rowid();

        let mut rows_inserted = 0u64;

        for group in &snapshot.data {
            for trade in &group.trades {
                // ── Resolve instrument (insert ก่อน position row เสมอ) ─────────
                let instrument_id = match cache.map.get(&trade.trading_symbol) {
                    Some(&id) => id,
                    None => {
                        let meta = trade.instrument_info.as_ref();
                        sqlx::query(
                            "INSERT OR IGNORE INTO instruments
                               (symbol, underlying_symbol, type, strike, expiry)
                             VALUES (?, ?, ?, ?, ?)",
                        )
                        .bind(&trade.trading_symbol)
                        .bind(&group.trading_symbol)
                        .bind(meta.and_then(|m| m.normalized_type()))
                        .bind(meta.and_then(|m| m.strike))
                        .bind(meta.and_then(|m| m.expiry.clone()))
                        .execute(&mut *tx)
                        .await
                        .context("Failed to insert instrument row")?;

                        let found: Option<(i64,)> =
                            sqlx::query_as("SELECT id FROM instruments WHERE symbol = ?")
                                .bind(&trade.trading_symbol)
                                .fetch_optional(&mut *tx)
                                .await
                                .context("Failed to look up instrument id")?;

                        match found {
                            Some((id,)) => {
                                cache.map.insert(trade.trading_symbol.clone(), id);
                                id
                            }
                            None => {
                                // Data error — ข้ามแถวนี้ แถวอื่นไปต่อ
                                warn!(
                                    symbol = %trade.trading_symbol,
                                    "Could not resolve instrument id — skipping position row"
                                );
                                continue;
                            }
                        }
                    }
                };

                sqlx::query(
                    "INSERT INTO position_details
                       (snapshot_id, instrument_id, quantity, avg_price,
                        last_price, unbooked_pnl, booked_pnl, underlying_price)
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
                )
                .bind(snapshot_id)
                .bind(instrument_id)
                .bind(trade.quantity)
                .bind(trade.average_price)
                .bind(trade.last_price)
                .bind(trade.unbooked_pnl)
                .bind(trade.booked_profit_loss)
                .bind(group.underlying_price)
                .execute(&mut *tx)
                .await
                .context("Failed to insert position row")?;

                rows_inserted += 1;
            }
        }

        tx.commit().await.context("Failed to commit snapshot insert")?;
        Ok(rows_inserted)
    }

    /// ปิด pool — เรียกก่อนปล่อยไฟล์ให้ Archiver
    pub async fn close(self) {
        self.pool.close().await;
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quotes::{InstrumentMeta, PositionGroup, TradeEntry};

    fn make_trade(symbol: &str, quantity: i64, avg_price: f64) -> TradeEntry {
        TradeEntry {
            trading_symbol:     symbol.to_string(),
            instrument_info:    Some(InstrumentMeta {
                instrument_type: Some("CALL".into()),
                strike:          Some(21500.0),
                expiry:          Some("2024-06-20".into()),
            }),
            quantity,
            average_price:      avg_price,
            last_price:         avg_price,
            unbooked_pnl:       0.0,
            booked_profit_loss: 0.0,
        }
    }

    fn make_snapshot(timestamp: &str, trades: Vec<TradeEntry>) -> SnapshotPayload {
        SnapshotPayload {
            created_at:   timestamp.to_string(),
            total_profit: Some(-100.0),
            data:         vec![PositionGroup {
                trading_symbol:   "NIFTY".into(),
                underlying_price: Some(21500.0),
                trades,
            }],
        }
    }

    async fn count(pool: &SqlitePool, table: &str) -> i64 {
        let (n,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(pool)
            .await
            .unwrap();
        n
    }

    #[tokio::test]
    async fn test_schema_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data-2024-06-14.db");

        let first = DayStore::open(&path).await.unwrap();
        first.close().await;
        // เปิดซ้ำไฟล์เดิม = restart กลางวัน
        let second = DayStore::open(&path).await.unwrap();
        second.close().await;
    }

    #[tokio::test]
    async fn test_append_writes_snapshot_and_positions() {
        let dir = tempfile::tempdir().unwrap();
        let store = DayStore::open(&dir.path().join("d.db")).await.unwrap();
        let mut cache = InstrumentCache::new();

        let snapshot = make_snapshot(
            "2024-06-14T10:15:30",
            vec![make_trade("NIFTY_A", 50, 100.0), make_trade("NIFTY_B", -25, 40.0)],
        );
        let rows = store.append(&snapshot, &mut cache).await.unwrap();

        assert_eq!(rows, 2);
        assert_eq!(count(&store.pool, "snapshots").await, 1);
        assert_eq!(count(&store.pool, "position_details").await, 2);
        assert_eq!(count(&store.pool, "instruments").await, 2);
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn test_instrument_identity_is_first_seen_wins() {
        let dir = tempfile::tempdir().unwrap();
        let store = DayStore::open(&dir.path().join("d.db")).await.unwrap();
        let mut cache = InstrumentCache::new();

        store
            .append(&make_snapshot("t1", vec![make_trade("NIFTY_A", 50, 100.0)]), &mut cache)
            .await
            .unwrap();
        let first_id = *cache.map.get("NIFTY_A").unwrap();

        // Symbol เดิมใน snapshot ถัดไปต้อง map ไป id เดิม ไม่สร้างแถวใหม่
        store
            .append(&make_snapshot("t2", vec![make_trade("NIFTY_A", 75, 101.0)]), &mut cache)
            .await
            .unwrap();

        assert_eq!(*cache.map.get("NIFTY_A").unwrap(), first_id);
        assert_eq!(count(&store.pool, "instruments").await, 1);
        assert_eq!(count(&store.pool, "position_details").await, 2);
    }
}
