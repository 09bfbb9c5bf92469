//! # state
//!
//! AppState ของ read API — data store handle + instrument cache รายวัน
//!
//! Cache แยกตามวันเสมอ (id เป็น rowid ของ store คนละไฟล์ ใช้ข้ามวันไม่ได้)
//! และล้างได้ทาง `POST /api/refresh-cache`

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::models::InstrumentInfo;
use crate::store::{DataStore, DayDb};

pub type InstrumentMap = Arc<HashMap<i64, InstrumentInfo>>;

// ─── AppState ─────────────────────────────────────────────────────────────────

/// Top-level shared state injected into every Axum handler.
pub struct AppState {
    pub store: DataStore,

    /// Instrument ของแต่ละวันที่เคยโหลดแล้ว — key คือ date string
    /// (instrument ใน store หนึ่งวัน immutable จึง cache ได้ยาวๆ)
    instruments_cache: RwLock<HashMap<String, InstrumentMap>>,
}

impl AppState {
    pub fn new(store: DataStore) -> Self {
        Self {
            store,
            instruments_cache: RwLock::new(HashMap::new()),
        }
    }

    // ── Helper Methods ────────────────────────────────────────────────────────

    /// Instrument map ของ `date` — โหลดจาก store แค่ครั้งแรก
    pub async fn instruments_for(
        &self,
        date: &str,
        day:  &DayDb,
    ) -> anyhow::Result<InstrumentMap> {
        if let Some(cached) = self.instruments_cache.read().await.get(date) {
            return Ok(cached.clone());
        }

        let loaded: InstrumentMap = Arc::new(day.load_instruments().await?);
        self.instruments_cache
            .write()
            .await
            .insert(date.to_string(), loaded.clone());
        Ok(loaded)
    }

    /// ล้าง cache ทั้งหมด — คืนจำนวน entry ที่ทิ้งไป
    pub async fn clear_cache(&self) -> usize {
        let mut cache = self.instruments_cache.write().await;
        let dropped = cache.len();
        cache.clear();
        dropped
    }
}

/// Convenience type alias
pub type SharedState = Arc<AppState>;

pub fn build_state(store: DataStore) -> SharedState {
    Arc::new(AppState::new(store))
}
