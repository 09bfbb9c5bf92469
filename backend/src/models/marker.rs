//! # models::marker
//!
//! Defines [`TradeMarker`] — the derived annotation the diff engine attaches
//! to a snapshot, describing what changed since the previous one.
//!
//! Markers are never persisted: they are recomputed per read request and must
//! come out identical for the same stored sequence every time.  The marker is
//! a proper sum type — the `None` kind carries no payload, so there is no
//! half-filled struct floating around for the "nothing happened" case.

use serde::Serialize;

// ─── ChangeType ───────────────────────────────────────────────────────────────

/// How a single instrument's position moved between two adjacent snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    /// Absent before, present now.
    New,
    /// Present before, absent now.
    Closed,
    /// Present in both with a different quantity (wins over `PriceChange`).
    QuantityChange,
    /// Present in both, same quantity, average price moved beyond tolerance.
    PriceChange,
}

// ─── PositionChange ───────────────────────────────────────────────────────────

/// One instrument-level change inside a marker.  The absent side reads as
/// zero quantity / zero price.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionChange {
    pub instrument_id:     i64,
    pub instrument_symbol: String,
    pub change_type:       ChangeType,
    pub old_quantity:      i64,
    pub new_quantity:      i64,
    pub old_price:         f64,
    pub new_price:         f64,
}

// ─── TradeMarker ──────────────────────────────────────────────────────────────

/// Marker ที่ติดบน snapshot ทุกอันยกเว้นอันแรกของวัน (อันแรกไม่มี "ก่อนหน้า"
/// ให้เทียบ เลยไม่มี marker — ไม่ใช่ marker ชนิด `None`)
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TradeMarker {
    /// Nothing moved between the two snapshots.
    None,
    /// Positions were opened / closed / resized, but the book is not flat.
    Adjustment {
        changes: Vec<PositionChange>,
        summary: String,
    },
    /// Everything was closed: previous snapshot had ≥1 position, current has 0.
    SquareUp {
        changes: Vec<PositionChange>,
        summary: String,
    },
}

impl TradeMarker {
    /// `true` เมื่อ marker แทนการเทรดจริง (นับเป็น trade ใน day summary)
    #[inline]
    pub fn is_trade(&self) -> bool {
        !matches!(self, TradeMarker::None)
    }

    #[allow(dead_code)]
    pub fn changes(&self) -> &[PositionChange] {
        match self {
            TradeMarker::None => &[],
            TradeMarker::Adjustment { changes, .. } | TradeMarker::SquareUp { changes, .. } => {
                changes
            }
        }
    }
}
