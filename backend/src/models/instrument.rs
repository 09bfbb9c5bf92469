//! # models::instrument
//!
//! Identity record ของ option หนึ่งตัว — สร้างครั้งเดียวต่อ symbol ต่อ day
//! store แล้วไม่เปลี่ยนอีกเลย (id คือ rowid ของ store วันนั้น ใช้ข้ามวันไม่ได้)

use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct InstrumentInfo {
    pub id: i64,
    /// Symbol เต็ม เช่น `NIFTY2462021500CE` — unique ใน store
    pub symbol: String,
    pub underlying_symbol: String,
    /// "CE" / "PE" (หรือค่าดิบจาก feed ถ้าไม่ใช่ option)
    #[serde(rename = "type")]
    pub option_type: String,
    pub strike: Option<f64>,
    pub expiry: Option<String>,
}

impl InstrumentInfo {
    /// Key สำหรับ instrument-subset filter: `UNDERLYING|EXPIRY`
    pub fn filter_key(&self) -> String {
        format!(
            "{}|{}",
            self.underlying_symbol,
            self.expiry.as_deref().unwrap_or("")
        )
    }
}

/// ตัวเลือก filter หนึ่งรายการที่ dashboard เอาไปแสดง
#[derive(Debug, Clone, Serialize)]
pub struct FilterOption {
    pub underlying_symbol: String,
    pub expiry: String,
    pub key: String,
}
