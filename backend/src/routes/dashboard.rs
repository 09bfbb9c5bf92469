//! # routes::dashboard
//!
//! Endpoints สำหรับ dashboard ทั้งหมด
//!
//! | Method | Path                       | Description                                 |
//! |--------|----------------------------|---------------------------------------------|
//! | GET    | `/api/trading-days`        | วันเทรดทั้งหมดที่มี store                     |
//! | GET    | `/api/data/{date}`         | Timeseries เต็มวัน + trade markers           |
//! | GET    | `/api/data/{date}/summary` | สถิติรวมของวัน (fast path)                   |
//! | GET    | `/api/data/{date}/filters` | ตัวเลือก filter (underlying + expiry)        |
//! | POST   | `/api/refresh-cache`       | ล้าง instrument cache                        |
//! | GET    | `/api/health`              | Liveness + จำนวนวันที่มีข้อมูล               |
//!
//! `?filters=` รับ comma-separated keys รูปแบบ `UNDERLYING|EXPIRY` — จำกัด
//! ทั้ง positions ที่เห็นและ aggregate P&L ของ view นั้น

use std::collections::HashSet;

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::engine::{diff, summary};
use crate::error::AppError;
use crate::state::SharedState;
use crate::store::DayDb;

// ─── Query Params ─────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct FiltersQuery {
    filters: Option<String>,
}

impl FiltersQuery {
    /// `"NIFTY|2024-06-20,BANKNIFTY|2024-06-19"` → set ของ key
    fn keys(&self) -> Option<HashSet<String>> {
        let raw = self.filters.as_deref()?;
        let keys: HashSet<String> = raw
            .split(',')
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string)
            .collect();
        if keys.is_empty() { None } else { Some(keys) }
    }
}

/// Day identifier ต้องเป็น `YYYY-MM-DD` เป๊ะๆ — อย่างอื่นคือ contract error
fn validate_date(date: &str) -> Result<(), AppError> {
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map(|_| ())
        .map_err(|_| AppError::BadRequest("Invalid date format. Use YYYY-MM-DD".to_string()))
}

/// เปิด day store หรือ 404 ชัดๆ — ไม่มี default เงียบๆ
async fn open_day_or_404(state: &SharedState, date: &str) -> Result<DayDb, AppError> {
    state
        .store
        .open_day(date)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("No data found for date: {date}")))
}

// ─── GET /api/trading-days ────────────────────────────────────────────────────

pub async fn get_trading_days(State(state): State<SharedState>) -> impl IntoResponse {
    let available_dates = state.store.list_days();
    Json(json!({
        "ok":              true,
        "available_dates": available_dates,
        "total_days":      available_dates.len(),
    }))
}

// ─── GET /api/data/{date} ─────────────────────────────────────────────────────

/// Timeseries เต็มวันพร้อม trade markers — งานหลักของ read API
pub async fn get_trading_day_data(
    State(state): State<SharedState>,
    Path(date): Path<String>,
    Query(query): Query<FiltersQuery>,
) -> Result<impl IntoResponse, AppError> {
    validate_date(&date)?;
    let day = open_day_or_404(&state, &date).await?;

    let instruments = state.instruments_for(&date, &day).await?;
    let mut snapshots = day.load_snapshots(&instruments).await?;
    if snapshots.is_empty() {
        return Err(AppError::NotFound(format!("No data found for date: {date}")));
    }

    // Filter ก่อน diff — markers ต้องเป็นของ subset view
    if let Some(keys) = query.keys() {
        snapshots = summary::apply_instrument_filter(snapshots, &keys);
    }

    let snapshots = diff::attach_trade_markers(snapshots);
    let day_summary = summary::day_summary(&date, &snapshots);

    Ok(Json(json!({
        "ok":         true,
        "date":       date,
        "summary":    day_summary,
        "timeseries": snapshots,
    })))
}

// ─── GET /api/data/{date}/summary ─────────────────────────────────────────────

pub async fn get_day_summary(
    State(state): State<SharedState>,
    Path(date): Path<String>,
    Query(query): Query<FiltersQuery>,
) -> Result<impl IntoResponse, AppError> {
    validate_date(&date)?;
    let day = open_day_or_404(&state, &date).await?;

    let day_summary = match query.keys() {
        // Filtered view ต้องการ position data เต็มๆ
        Some(keys) => {
            let instruments = state.instruments_for(&date, &day).await?;
            let snapshots = day.load_snapshots(&instruments).await?;
            if snapshots.is_empty() {
                return Err(AppError::NotFound(format!("No data found for date: {date}")));
            }
            summary::day_summary(&date, &summary::apply_instrument_filter(snapshots, &keys))
        }
        // Fast path: ตาราง snapshots อย่างเดียว
        None => {
            let series = day.load_pnl_series().await?;
            if series.is_empty() {
                return Err(AppError::NotFound(format!("No data found for date: {date}")));
            }
            summary::summary_from_series(&date, &series)
        }
    };

    Ok(Json(json!({
        "ok":      true,
        "summary": day_summary,
    })))
}

// ─── GET /api/data/{date}/filters ─────────────────────────────────────────────

pub async fn get_day_filters(
    State(state): State<SharedState>,
    Path(date): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    validate_date(&date)?;
    let day = open_day_or_404(&state, &date).await?;

    let instruments = state.instruments_for(&date, &day).await?;
    let filters = summary::available_filters(&instruments);

    Ok(Json(json!({
        "ok":      true,
        "count":   filters.len(),
        "filters": filters,
    })))
}

// ─── POST /api/refresh-cache ──────────────────────────────────────────────────

pub async fn refresh_cache(State(state): State<SharedState>) -> impl IntoResponse {
    let dropped = state.clear_cache().await;
    info!(dropped, "Instrument cache cleared");
    Json(json!({
        "ok":            true,
        "cache_cleared": true,
        "dropped_days":  dropped,
    }))
}

// ─── GET /api/health ──────────────────────────────────────────────────────────

pub async fn health_check(State(state): State<SharedState>) -> impl IntoResponse {
    Json(json!({
        "ok":             true,
        "status":         "healthy",
        "data_folder":    state.store.data_dir().display().to_string(),
        "available_days": state.store.list_days().len(),
    }))
}
