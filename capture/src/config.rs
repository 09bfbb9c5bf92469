//! # config — อ่าน Config จาก Environment Variables

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;

/// Config ทั้งหมดที่ Sentinel ต้องการ
#[derive(Debug, Clone)]
pub struct Config {
    /// URL ของ position feed (snapshot ของ option positions)
    pub feed_url:        String,
    /// Base URL ของ market calendar API (`{url}/{YYYY-MM-DD}`)
    pub calendar_url:    String,
    /// Exchange ที่สนใจใน calendar response เช่น "NSE"
    pub exchange:        String,
    /// Folder เก็บ day stores (`data-YYYY-MM-DD.db`)
    pub data_dir:        PathBuf,
    /// รอบเวลาการ Fetch ระหว่าง session
    pub fetch_interval:  Duration,
    /// ชั่วโมงที่ calendar API เชื่อถือได้แล้ว (ก่อนหน้านี้ตารางวันอาจยังไม่ออก)
    pub safe_check_hour: u32,
    /// ชั่วโมงที่เริ่มบีบอัด store ของวันเทรดก่อนหน้า
    pub archive_hour:    u32,
    /// Simulation mode — รัน session สังเคราะห์สั้นๆ แล้วจบ (สำหรับ dev)
    pub simulation:      Option<SimConfig>,
}

/// Timing ของ simulation mode (หน่วยวินาที ไม่ใช่ชั่วโมงจริง)
#[derive(Debug, Clone, Copy)]
pub struct SimConfig {
    /// Market "เปิด" หลังจากเริ่มโปรแกรมกี่วินาที
    pub open_in:       Duration,
    /// Session ยาวกี่วินาที
    pub duration:      Duration,
    /// บีบอัดหลังปิดกี่วินาที
    pub archive_after: Duration,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let feed_url = std::env::var("FEED_URL")
            .context("FEED_URL environment variable is required")?;

        let interval_secs: u64 = std::env::var("FETCH_INTERVAL_SECS")
            .unwrap_or_else(|_| "15".to_string())
            .parse()
            .context("FETCH_INTERVAL_SECS must be a number")?;

        let simulation = match std::env::var("SIMULATION_MODE").as_deref() {
            Ok("1") | Ok("true") => Some(SimConfig::from_env()),
            _ => None,
        };

        Ok(Self {
            feed_url,
            calendar_url:    std::env::var("CALENDAR_URL")
                .unwrap_or_else(|_| "https://api.upstox.com/v2/market/timings".to_string()),
            exchange:        std::env::var("EXCHANGE").unwrap_or_else(|_| "NSE".to_string()),
            data_dir:        std::env::var("DATA_DIR").unwrap_or_else(|_| "data".to_string()).into(),
            fetch_interval:  Duration::from_secs(interval_secs),
            safe_check_hour: std::env::var("SAFE_CHECK_HOUR")
                .ok().and_then(|v| v.parse().ok()).unwrap_or(9),
            archive_hour:    std::env::var("ARCHIVE_HOUR")
                .ok().and_then(|v| v.parse().ok()).unwrap_or(16),
            simulation,
        })
    }
}

impl SimConfig {
    fn from_env() -> Self {
        Self {
            open_in:       Duration::from_secs(std::env::var("SIM_OPEN_SECS")
                .ok().and_then(|v| v.parse().ok()).unwrap_or(10)),
            duration:      Duration::from_secs(std::env::var("SIM_DURATION_SECS")
                .ok().and_then(|v| v.parse().ok()).unwrap_or(35)),
            archive_after: Duration::from_secs(std::env::var("SIM_ARCHIVE_SECS")
                .ok().and_then(|v| v.parse().ok()).unwrap_or(5)),
        }
    }
}
