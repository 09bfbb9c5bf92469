//! # quotes — Position Feed Client
//!
//! ดึง snapshot ของ option positions หนึ่งครั้งต่อ tick
//!
//! Payload จาก feed ซ้อนกันสองชั้น: กลุ่มตาม underlying (`data`) และ
//! รายการ option แต่ละขา (`trades`) ข้างใน

use anyhow::{bail, Context};
use serde::Deserialize;

use crate::config::Config;

// ─── Feed Payload ─────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct FeedEnvelope {
    #[serde(default)]
    success: bool,
    payload: Option<FeedPayload>,
}

#[derive(Debug, Deserialize)]
struct FeedPayload {
    position_snapshot_data: Option<SnapshotPayload>,
}

/// หนึ่ง snapshot เต็มจาก feed — timestamp, P&L รวม และ position groups
#[derive(Debug, Clone, Deserialize)]
pub struct SnapshotPayload {
    pub created_at:   String,
    pub total_profit: Option<f64>,
    #[serde(default)]
    pub data:         Vec<PositionGroup>,
}

/// กลุ่ม positions ใต้ underlying เดียวกัน (เช่น NIFTY ทั้งหมด)
#[derive(Debug, Clone, Deserialize)]
pub struct PositionGroup {
    /// Symbol ของ underlying เช่น "NIFTY"
    pub trading_symbol:   String,
    pub underlying_price: Option<f64>,
    #[serde(default)]
    pub trades:           Vec<TradeEntry>,
}

/// Option หนึ่งขาใน snapshot — quantity ติดเครื่องหมาย (ลบ = short)
#[derive(Debug, Clone, Deserialize)]
pub struct TradeEntry {
    pub trading_symbol:     String,
    pub instrument_info:    Option<InstrumentMeta>,
    pub quantity:           i64,
    pub average_price:      f64,
    pub last_price:         f64,
    pub unbooked_pnl:       f64,
    pub booked_profit_loss: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InstrumentMeta {
    pub instrument_type: Option<String>,
    pub strike:          Option<f64>,
    pub expiry:          Option<String>,
}

impl InstrumentMeta {
    /// Feed ส่ง CALL/PUT มา แต่ store เก็บแบบ CE/PE (ตาม convention ของ NSE)
    pub fn normalized_type(&self) -> Option<String> {
        self.instrument_type.as_deref().map(|t| match t {
            "CALL" => "CE".to_string(),
            "PUT"  => "PE".to_string(),
            other  => other.to_string(),
        })
    }
}

// ─── Fetch ────────────────────────────────────────────────────────────────────

/// ยิง GET หนึ่งครั้ง → snapshot payload
///
/// ทุกความล้มเหลว (network, HTTP status, envelope ไม่ success, payload หาย)
/// เป็น `Err` — caller log แล้วข้าม tick นั้นไป ไม่ retry ใน tick เดียวกัน
pub async fn fetch_snapshot(
    client: &reqwest::Client,
    config: &Config,
) -> anyhow::Result<SnapshotPayload> {
    let envelope: FeedEnvelope = client
        .get(&config.feed_url)
        .header("accept", "application/json, text/plain, */*")
        .timeout(std::time::Duration::from_secs(10))
        .send()
        .await
        .context("Position feed unreachable")?
        .error_for_status()
        .context("Position feed returned error status")?
        .json()
        .await
        .context("Failed to parse feed response")?;

    if !envelope.success {
        bail!("Feed envelope not successful");
    }

    envelope
        .payload
        .and_then(|p| p.position_snapshot_data)
        .context("Feed payload missing position_snapshot_data")
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = r#"{
        "success": true,
        "payload": {
            "position_snapshot_data": {
                "created_at": "2024-06-14T10:15:30",
                "total_profit": -1250.5,
                "data": [{
                    "trading_symbol": "NIFTY",
                    "underlying_price": 21500.25,
                    "trades": [{
                        "trading_symbol": "NIFTY2462021500CE",
                        "instrument_info": {"instrument_type": "CALL", "strike": 21500.0, "expiry": "2024-06-20"},
                        "quantity": -50,
                        "average_price": 102.35,
                        "last_price": 98.1,
                        "unbooked_pnl": 212.5,
                        "booked_profit_loss": 0.0
                    }]
                }]
            }
        }
    }"#;

    #[test]
    fn test_parse_feed_fixture() {
        let envelope: FeedEnvelope = serde_json::from_str(FIXTURE).unwrap();
        assert!(envelope.success);

        let snapshot = envelope.payload.unwrap().position_snapshot_data.unwrap();
        assert_eq!(snapshot.created_at, "2024-06-14T10:15:30");
        assert_eq!(snapshot.data.len(), 1);

        let group = &snapshot.data[0];
        assert_eq!(group.trading_symbol, "NIFTY");
        assert_eq!(group.trades[0].quantity, -50);
    }

    #[test]
    fn test_type_normalization() {
        let call = InstrumentMeta {
            instrument_type: Some("CALL".into()), strike: None, expiry: None,
        };
        let put = InstrumentMeta {
            instrument_type: Some("PUT".into()), strike: None, expiry: None,
        };
        let fut = InstrumentMeta {
            instrument_type: Some("FUT".into()), strike: None, expiry: None,
        };
        assert_eq!(call.normalized_type().as_deref(), Some("CE"));
        assert_eq!(put.normalized_type().as_deref(), Some("PE"));
        assert_eq!(fut.normalized_type().as_deref(), Some("FUT"));
    }

    #[test]
    fn test_missing_trades_defaults_empty() {
        let group: PositionGroup = serde_json::from_str(
            r#"{"trading_symbol": "NIFTY", "underlying_price": null}"#,
        )
        .unwrap();
        assert!(group.trades.is_empty());
    }
}
