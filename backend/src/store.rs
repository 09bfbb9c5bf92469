//! # store — Read-Side Day Store Access
//!
//! หา day store จาก data folder (`data-YYYY-MM-DD.db` หรือ `.db.gz`),
//! แตก archive ลง temp file ถ้าจำเป็น แล้วโหลด snapshot sequence ทั้งวัน
//! เรียงตาม (timestamp, rowid) — ลำดับเดิมของ timestamp ที่เท่ากันคงอยู่เสมอ
//! ซึ่ง diff engine พึ่งลำดับนี้ตรงๆ

use std::collections::{BTreeSet, HashMap};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{NaiveDate, NaiveDateTime};
use flate2::read::GzDecoder;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::models::{InstrumentInfo, PositionDetail, SnapshotData};

const DB_PREFIX: &str = "data-";
const DB_EXTENSION: &str = ".db";
const COMPRESSED_EXTENSION: &str = ".db.gz";

// ─── Data Store ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct DataStore {
    data_dir: PathBuf,
}

/// Store หนึ่งวันที่เปิดแล้ว — ถ้ามาจาก archive, temp file ต้องอยู่ครบอายุ pool
pub struct DayDb {
    pool: SqlitePool,
    _decompressed: Option<NamedTempFile>,
}

impl DataStore {
    pub fn new(data_dir: PathBuf) -> Self {
        Self { data_dir }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// วันเทรดทั้งหมดที่มี store (live หรือ archived) — ใหม่สุดก่อน
    pub fn list_days(&self) -> Vec<String> {
        let entries = match std::fs::read_dir(&self.data_dir) {
            Ok(e) => e,
            Err(e) => {
                warn!(error = %e, dir = %self.data_dir.display(), "Cannot read data dir");
                return Vec::new();
            }
        };

        // BTreeSet: กันซ้ำกรณีมีทั้ง .db และ .db.gz ของวันเดียวกัน + sort ฟรี
        let mut days = BTreeSet::new();
        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some(date) = day_from_filename(name) {
                days.insert(date);
            }
        }

        days.into_iter().rev().collect()
    }

    /// เปิด store ของ `date` — `None` ถ้าไม่มีทั้ง live และ archived
    pub async fn open_day(&self, date: &str) -> anyhow::Result<Option<DayDb>> {
        let live = self.data_dir.join(format!("{DB_PREFIX}{date}{DB_EXTENSION}"));
        let archived = self.data_dir.join(format!("{DB_PREFIX}{date}{COMPRESSED_EXTENSION}"));

        // Archive มาก่อน — ตรงกับฝั่ง capture ที่ลบ live copy หลังบีบอัดแล้ว
        let (db_path, decompressed) = if archived.exists() {
            let tmp = tokio::task::spawn_blocking(move || decompress_to_temp(&archived))
                .await
                .context("Decompression task panicked")??;
            (tmp.path().to_path_buf(), Some(tmp))
        } else if live.exists() {
            (live, None)
        } else {
            return Ok(None);
        };

        let options = SqliteConnectOptions::new().filename(&db_path).read_only(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open day store {}", db_path.display()))?;

        Ok(Some(DayDb { pool, _decompressed: decompressed }))
    }
}

fn day_from_filename(name: &str) -> Option<String> {
    let stem = name.strip_prefix(DB_PREFIX)?;
    let date = stem
        .strip_suffix(COMPRESSED_EXTENSION)
        .or_else(|| stem.strip_suffix(DB_EXTENSION))?;
    NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()?;
    Some(date.to_string())
}

fn decompress_to_temp(gz_path: &Path) -> anyhow::Result<NamedTempFile> {
    let input = File::open(gz_path)
        .with_context(|| format!("Failed to open archive {}", gz_path.display()))?;
    let mut decoder = GzDecoder::new(input);

    let mut tmp = NamedTempFile::new().context("Failed to create temp file")?;
    std::io::copy(&mut decoder, tmp.as_file_mut()).context("Failed to decompress archive")?;
    tmp.as_file_mut().flush().context("Failed to flush temp file")?;

    debug!(archive = %gz_path.display(), "Archive decompressed for reading");
    Ok(tmp)
}

// ─── Loading ──────────────────────────────────────────────────────────────────

impl DayDb {
    /// Instrument ทั้งหมดของวัน keyed ด้วย id
    pub async fn load_instruments(&self) -> anyhow::Result<HashMap<i64, InstrumentInfo>> {
        let rows = sqlx::query(
            "SELECT id, symbol, underlying_symbol, type, strike, expiry
             FROM instruments ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to load instruments")?;

        let mut instruments = HashMap::with_capacity(rows.len());
        for row in rows {
            let id: i64 = row.get("id");
            instruments.insert(id, InstrumentInfo {
                id,
                symbol:            row.get("symbol"),
                underlying_symbol: row.get::<Option<String>, _>("underlying_symbol").unwrap_or_default(),
                option_type:       row.get::<Option<String>, _>("type").unwrap_or_default(),
                strike:            row.get("strike"),
                expiry:            row.get("expiry"),
            });
        }
        Ok(instruments)
    }

    /// Snapshot ทั้งวันพร้อม positions — เรียง (timestamp, rowid) จาก SQL
    /// ยังไม่มี trade marker (diff engine ติดทีหลัง)
    pub async fn load_snapshots(
        &self,
        instruments: &HashMap<i64, InstrumentInfo>,
    ) -> anyhow::Result<Vec<SnapshotData>> {
        let rows = sqlx::query(
            "SELECT
                s.id AS snapshot_id, s.timestamp, s.total_pnl,
                pd.instrument_id, pd.quantity, pd.avg_price, pd.last_price,
                pd.unbooked_pnl, pd.booked_pnl, pd.underlying_price
             FROM snapshots s
             LEFT JOIN position_details pd ON s.id = pd.snapshot_id
             ORDER BY s.timestamp, s.id, pd.instrument_id",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to load snapshots")?;

        let mut snapshots: Vec<SnapshotData> = Vec::new();
        let mut current_id: Option<i64> = None;
        // snapshot ที่ timestamp เสียถูกข้ามทั้งก้อน รวม position rows ของมัน
        let mut current_skipped = false;

        for row in rows {
            let snapshot_id: i64 = row.get("snapshot_id");

            if current_id != Some(snapshot_id) {
                current_id = Some(snapshot_id);
                let raw_timestamp: String = row.get("timestamp");
                let Some(timestamp) = parse_timestamp(&raw_timestamp) else {
                    warn!(raw = %raw_timestamp, "Unparseable snapshot timestamp — skipped");
                    current_skipped = true;
                    continue;
                };
                current_skipped = false;
                snapshots.push(SnapshotData {
                    timestamp,
                    total_pnl:        row.get::<Option<f64>, _>("total_pnl").unwrap_or(0.0),
                    underlying_price: None,
                    position_count:   0,
                    positions:        Vec::new(),
                    trade_marker:     None,
                });
            }

            if current_skipped {
                continue;
            }

            // LEFT JOIN: snapshot ที่ไม่มี position เลยให้แถว instrument_id NULL
            let Some(instrument_id) = row.get::<Option<i64>, _>("instrument_id") else {
                continue;
            };
            let Some(instrument) = instruments.get(&instrument_id) else {
                warn!(instrument_id, "Position references unknown instrument — skipped");
                continue;
            };
            let Some(snapshot) = snapshots.last_mut() else { continue };

            let underlying_price: f64 =
                row.get::<Option<f64>, _>("underlying_price").unwrap_or(0.0);
            snapshot.positions.push(PositionDetail {
                instrument_id,
                instrument:   instrument.clone(),
                quantity:     row.get::<Option<i64>, _>("quantity").unwrap_or(0),
                avg_price:    row.get::<Option<f64>, _>("avg_price").unwrap_or(0.0),
                last_price:   row.get::<Option<f64>, _>("last_price").unwrap_or(0.0),
                unbooked_pnl: row.get::<Option<f64>, _>("unbooked_pnl").unwrap_or(0.0),
                booked_pnl:   row.get::<Option<f64>, _>("booked_pnl").unwrap_or(0.0),
                underlying_price,
            });
            snapshot.position_count += 1;
            if snapshot.underlying_price.is_none() {
                snapshot.underlying_price = Some(underlying_price);
            }
        }

        Ok(snapshots)
    }

    /// Fast path สำหรับ summary — อ่านเฉพาะตาราง snapshots
    pub async fn load_pnl_series(&self) -> anyhow::Result<Vec<(NaiveDateTime, f64)>> {
        let rows = sqlx::query(
            "SELECT timestamp, total_pnl FROM snapshots ORDER BY timestamp, id",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to load snapshot series")?;

        let mut series = Vec::with_capacity(rows.len());
        for row in rows {
            let raw: String = row.get("timestamp");
            if let Some(timestamp) = parse_timestamp(&raw) {
                series.push((timestamp, row.get::<Option<f64>, _>("total_pnl").unwrap_or(0.0)));
            }
        }
        Ok(series)
    }
}

/// Feed ส่ง RFC3339 มา ส่วน fixture/generator เขียน naive ISO — รับทั้งคู่
fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_local());
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;

    async fn seed_day_store(path: &Path) {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(SqliteConnectOptions::new().filename(path).create_if_missing(true))
            .await
            .unwrap();

        for statement in [
            "CREATE TABLE instruments (id INTEGER PRIMARY KEY, symbol TEXT UNIQUE NOT NULL,
                underlying_symbol TEXT, type TEXT, strike REAL, expiry TEXT)",
            "CREATE TABLE snapshots (id INTEGER PRIMARY KEY, timestamp TEXT NOT NULL, total_pnl REAL)",
            "CREATE TABLE position_details (snapshot_id INTEGER, instrument_id INTEGER,
                quantity INTEGER, avg_price REAL, last_price REAL, unbooked_pnl REAL,
                booked_pnl REAL, underlying_price REAL)",
            "INSERT INTO instruments VALUES (1, 'NIFTY_CE', 'NIFTY', 'CE', 21500.0, '2024-06-20')",
            // ใส่ snapshot สลับลำดับเวลา — การอ่านต้องออกมาเรียงเสมอ
            "INSERT INTO snapshots VALUES (1, '2024-06-14T10:15:30', -100.0)",
            "INSERT INTO snapshots VALUES (2, '2024-06-14T09:15:00', 0.0)",
            "INSERT INTO position_details VALUES (1, 1, 50, 100.0, 102.0, 100.0, 0.0, 21500.0)",
        ] {
            sqlx::query(statement).execute(&pool).await.unwrap();
        }
        pool.close().await;
    }

    #[test]
    fn test_list_days_handles_live_and_archived() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("data-2024-06-14.db"), b"x").unwrap();
        std::fs::write(dir.path().join("data-2024-06-13.db.gz"), b"x").unwrap();
        std::fs::write(dir.path().join("data-2024-06-13.db"), b"x").unwrap(); // ซ้ำ — นับครั้งเดียว
        std::fs::write(dir.path().join("notes.txt"), b"x").unwrap();
        std::fs::write(dir.path().join("data-garbage.db"), b"x").unwrap();

        let store = DataStore::new(dir.path().to_path_buf());
        assert_eq!(store.list_days(), vec!["2024-06-14", "2024-06-13"]);
    }

    #[tokio::test]
    async fn test_open_day_missing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = DataStore::new(dir.path().to_path_buf());
        assert!(store.open_day("2024-06-14").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_load_snapshots_ordered_with_positions() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("data-2024-06-14.db");
        seed_day_store(&db).await;

        let store = DataStore::new(dir.path().to_path_buf());
        let day = store.open_day("2024-06-14").await.unwrap().unwrap();
        let instruments = day.load_instruments().await.unwrap();
        let snapshots = day.load_snapshots(&instruments).await.unwrap();

        assert_eq!(snapshots.len(), 2);
        // เรียงตามเวลา ไม่ใช่ rowid
        assert!(snapshots[0].timestamp < snapshots[1].timestamp);
        assert_eq!(snapshots[0].position_count, 0);
        assert_eq!(snapshots[1].position_count, 1);
        assert_eq!(snapshots[1].positions[0].instrument.symbol, "NIFTY_CE");
        assert_eq!(snapshots[1].underlying_price, Some(21500.0));
    }

    #[tokio::test]
    async fn test_open_day_reads_archived_store() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("data-2024-06-14.db");
        seed_day_store(&db).await;

        // บีบอัดแล้วลบ live copy เหมือน Archiver จริง
        let raw = std::fs::read(&db).unwrap();
        let gz = File::create(dir.path().join("data-2024-06-14.db.gz")).unwrap();
        let mut encoder = GzEncoder::new(gz, Compression::default());
        encoder.write_all(&raw).unwrap();
        encoder.finish().unwrap();
        std::fs::remove_file(&db).unwrap();

        let store = DataStore::new(dir.path().to_path_buf());
        let day = store.open_day("2024-06-14").await.unwrap().unwrap();
        let instruments = day.load_instruments().await.unwrap();
        assert_eq!(instruments.len(), 1);

        let snapshots = day.load_snapshots(&instruments).await.unwrap();
        assert_eq!(snapshots.len(), 2);
    }

    #[test]
    fn test_parse_timestamp_accepts_rfc3339_and_naive() {
        assert!(parse_timestamp("2024-06-14T10:15:30+05:30").is_some());
        assert!(parse_timestamp("2024-06-14T10:15:30Z").is_some());
        assert!(parse_timestamp("2024-06-14T10:15:30").is_some());
        assert!(parse_timestamp("2024-06-14 10:15:30.500").is_some());
        assert!(parse_timestamp("yesterday-ish").is_none());
    }
}
