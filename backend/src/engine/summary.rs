//! # engine::summary
//!
//! สถิติรายวัน + instrument-subset filter สำหรับ read API
//!
//! Filter ทำก่อน diff engine เสมอ — marker ของ view ที่ถูก filter ต้องสะท้อน
//! เฉพาะ instruments ที่เหลืออยู่ ไม่ใช่ของทั้งพอร์ต

use std::collections::{BTreeSet, HashMap, HashSet};

use chrono::NaiveDateTime;

use crate::models::{DaySummary, FilterOption, InstrumentInfo, SnapshotData, UnderlyingRange};

// ─── Day Summary ──────────────────────────────────────────────────────────────

pub fn day_summary(date: &str, snapshots: &[SnapshotData]) -> DaySummary {
    if snapshots.is_empty() {
        return empty_summary(date);
    }

    let pnl: Vec<f64> = snapshots.iter().map(|s| s.total_pnl).collect();
    let min_pnl = pnl.iter().copied().fold(f64::INFINITY, f64::min);
    let max_pnl = pnl.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    let underlying: Vec<f64> =
        snapshots.iter().filter_map(|s| s.underlying_price).collect();
    let underlying_range = match (underlying.first(), underlying.last()) {
        (Some(&open), Some(&close)) => Some(UnderlyingRange {
            min: underlying.iter().copied().fold(f64::INFINITY, f64::min),
            max: underlying.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            open,
            close,
        }),
        _ => None,
    };

    DaySummary {
        date:            date.to_string(),
        total_snapshots: snapshots.len(),
        total_trades:    snapshots
            .iter()
            .filter(|s| s.trade_marker.as_ref().is_some_and(|m| m.is_trade()))
            .count(),
        final_pnl:       pnl.last().copied().unwrap_or(0.0),
        market_open:     snapshots.first().map(|s| s.timestamp.format("%H:%M:%S").to_string()),
        market_close:    snapshots.last().map(|s| s.timestamp.format("%H:%M:%S").to_string()),
        min_pnl,
        max_pnl,
        underlying_range,
    }
}

/// Fast path จากตาราง snapshots อย่างเดียว — ไม่มี position data ก็นับ
/// trade ไม่ได้ (`total_trades` ติด 0 เสมอใน path นี้)
pub fn summary_from_series(date: &str, series: &[(NaiveDateTime, f64)]) -> DaySummary {
    if series.is_empty() {
        return empty_summary(date);
    }

    let pnl: Vec<f64> = series.iter().map(|(_, p)| *p).collect();

    DaySummary {
        date:            date.to_string(),
        total_snapshots: series.len(),
        total_trades:    0,
        final_pnl:       pnl.last().copied().unwrap_or(0.0),
        market_open:     series.first().map(|(t, _)| t.format("%H:%M:%S").to_string()),
        market_close:    series.last().map(|(t, _)| t.format("%H:%M:%S").to_string()),
        min_pnl:         pnl.iter().copied().fold(f64::INFINITY, f64::min),
        max_pnl:         pnl.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        underlying_range: None,
    }
}

fn empty_summary(date: &str) -> DaySummary {
    DaySummary {
        date:             date.to_string(),
        total_snapshots:  0,
        total_trades:     0,
        final_pnl:        0.0,
        market_open:      None,
        market_close:     None,
        min_pnl:          0.0,
        max_pnl:          0.0,
        underlying_range: None,
    }
}

// ─── Instrument-Subset Filter ─────────────────────────────────────────────────

/// จำกัดทุก snapshot ให้เหลือเฉพาะ instruments ที่ key อยู่ใน `keys`
/// แล้วคำนวณ aggregate ใหม่: `total_pnl` = Σ(unbooked + booked) ของที่เหลือ
///
/// Snapshot ที่ว่างหลัง filter ยังอยู่ใน sequence (position set ว่าง) —
/// diff engine ต้องเห็นมันเพื่อ detect square-up ของ subset นั้น
pub fn apply_instrument_filter(
    snapshots: Vec<SnapshotData>,
    keys:      &HashSet<String>,
) -> Vec<SnapshotData> {
    snapshots
        .into_iter()
        .map(|mut snapshot| {
            snapshot.positions.retain(|p| keys.contains(&p.instrument.filter_key()));
            snapshot.position_count = snapshot.positions.len();
            snapshot.total_pnl = snapshot
                .positions
                .iter()
                .map(|p| p.unbooked_pnl + p.booked_pnl)
                .sum();
            snapshot.underlying_price = snapshot.positions.first().map(|p| p.underlying_price);
            snapshot.trade_marker = None;
            snapshot
        })
        .collect()
}

/// ตัวเลือก filter ของวัน: (underlying, expiry) ที่มีจริง ไม่ซ้ำ เรียงแล้ว
pub fn available_filters(instruments: &HashMap<i64, InstrumentInfo>) -> Vec<FilterOption> {
    let pairs: BTreeSet<(String, String)> = instruments
        .values()
        .map(|i| {
            (i.underlying_symbol.clone(), i.expiry.clone().unwrap_or_default())
        })
        .collect();

    pairs
        .into_iter()
        .map(|(underlying_symbol, expiry)| FilterOption {
            key: format!("{underlying_symbol}|{expiry}"),
            underlying_symbol,
            expiry,
        })
        .collect()
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PositionDetail, TradeMarker};
    use chrono::NaiveDate;

    fn make_instrument(id: i64, underlying: &str, expiry: &str) -> InstrumentInfo {
        InstrumentInfo {
            id,
            symbol:            format!("{underlying}_{id}"),
            underlying_symbol: underlying.to_string(),
            option_type:       "CE".into(),
            strike:            Some(21500.0),
            expiry:            Some(expiry.to_string()),
        }
    }

    fn make_position(instrument: InstrumentInfo, unbooked: f64, booked: f64) -> PositionDetail {
        PositionDetail {
            instrument_id:    instrument.id,
            instrument,
            quantity:         50,
            avg_price:        100.0,
            last_price:       102.0,
            unbooked_pnl:     unbooked,
            booked_pnl:       booked,
            underlying_price: 21500.0,
        }
    }

    fn make_snapshot(minute: u32, total_pnl: f64, positions: Vec<PositionDetail>) -> SnapshotData {
        SnapshotData {
            timestamp: NaiveDate::from_ymd_opt(2024, 6, 14)
                .unwrap()
                .and_hms_opt(9, minute, 0)
                .unwrap(),
            total_pnl,
            underlying_price: Some(21500.0),
            position_count:   positions.len(),
            positions,
            trade_marker:     None,
        }
    }

    #[test]
    fn test_day_summary_stats() {
        let mut snapshots = vec![
            make_snapshot(15, -50.0, vec![]),
            make_snapshot(16, 120.0, vec![]),
            make_snapshot(17, 80.0, vec![]),
        ];
        snapshots[1].trade_marker = Some(TradeMarker::None);
        snapshots[2].trade_marker = Some(TradeMarker::Adjustment {
            changes: vec![],
            summary: "Adjustment: 1 new".into(),
        });

        let summary = day_summary("2024-06-14", &snapshots);
        assert_eq!(summary.total_snapshots, 3);
        assert_eq!(summary.total_trades, 1); // None ไม่นับ
        assert_eq!(summary.final_pnl, 80.0);
        assert_eq!(summary.min_pnl, -50.0);
        assert_eq!(summary.max_pnl, 120.0);
        assert_eq!(summary.market_open.as_deref(), Some("09:15:00"));
        assert_eq!(summary.market_close.as_deref(), Some("09:17:00"));

        let range = summary.underlying_range.expect("range expected");
        assert_eq!(range.open, 21500.0);
        assert_eq!(range.close, 21500.0);
    }

    #[test]
    fn test_empty_day_summary_is_zeroed() {
        let summary = day_summary("2024-06-14", &[]);
        assert_eq!(summary.total_snapshots, 0);
        assert!(summary.market_open.is_none());
        assert!(summary.underlying_range.is_none());
    }

    #[test]
    fn test_filter_restricts_positions_and_recomputes_pnl() {
        let nifty = make_instrument(1, "NIFTY", "2024-06-20");
        let banknifty = make_instrument(2, "BANKNIFTY", "2024-06-19");
        let snapshot = make_snapshot(15, 999.0, vec![
            make_position(nifty, 100.0, 25.0),
            make_position(banknifty, -40.0, 0.0),
        ]);

        let keys: HashSet<String> = ["NIFTY|2024-06-20".to_string()].into();
        let filtered = apply_instrument_filter(vec![snapshot], &keys);

        assert_eq!(filtered[0].position_count, 1);
        assert_eq!(filtered[0].positions[0].instrument.underlying_symbol, "NIFTY");
        // Aggregate คิดใหม่จาก subset ไม่ใช่ค่าจาก feed
        assert_eq!(filtered[0].total_pnl, 125.0);
    }

    #[test]
    fn test_filter_keeps_emptied_snapshots_in_sequence() {
        let banknifty = make_instrument(2, "BANKNIFTY", "2024-06-19");
        let snapshot = make_snapshot(15, 10.0, vec![make_position(banknifty, 10.0, 0.0)]);

        let keys: HashSet<String> = ["NIFTY|2024-06-20".to_string()].into();
        let filtered = apply_instrument_filter(vec![snapshot], &keys);

        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].position_count, 0);
        assert_eq!(filtered[0].total_pnl, 0.0);
        assert!(filtered[0].underlying_price.is_none());
    }

    #[test]
    fn test_available_filters_dedupes_and_sorts() {
        let mut instruments = HashMap::new();
        instruments.insert(1, make_instrument(1, "NIFTY", "2024-06-20"));
        instruments.insert(2, make_instrument(2, "NIFTY", "2024-06-20"));
        instruments.insert(3, make_instrument(3, "BANKNIFTY", "2024-06-19"));

        let filters = available_filters(&instruments);
        let keys: Vec<&str> = filters.iter().map(|f| f.key.as_str()).collect();
        assert_eq!(keys, vec!["BANKNIFTY|2024-06-19", "NIFTY|2024-06-20"]);
    }
}
