//! # calendar — Market Calendar Provider
//!
//! ถาม calendar API ว่าวันนี้ตลาดเปิดไหม เปิด-ปิดกี่โมง
//!
//! Failure ทุกชนิด (network, parse, ไม่มี exchange ที่ต้องการ) ยุบเป็น `None`
//! = "ไม่ใช่วันเทรด" — caller แยก holiday กับ provider error ไม่ได้ (ตั้งใจ
//! ให้ส่วนขยายในอนาคตไปอยู่ที่ interface นี้ ไม่ใช่ที่ call site)

use chrono::{Local, NaiveDate, NaiveTime, TimeZone};
use serde::Deserialize;
use tracing::warn;

use crate::config::Config;

// ─── Session Window ───────────────────────────────────────────────────────────

/// ช่วงเวลา `[open, close)` ที่ capture ticks ต้องวิ่ง
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionWindow {
    pub open:  NaiveTime,
    pub close: NaiveTime,
}

// ─── Calendar API Response ────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct CalendarResponse {
    #[serde(default)]
    data: Vec<ExchangeTiming>,
}

#[derive(Debug, Deserialize)]
struct ExchangeTiming {
    exchange:   Option<String>,
    /// Epoch milliseconds ของเวลาเปิด
    start_time: Option<i64>,
    /// Epoch milliseconds ของเวลาปิด
    end_time:   Option<i64>,
}

// ─── Lookup ───────────────────────────────────────────────────────────────────

/// ถาม session window ของ `date` — `None` = ไม่ใช่วันเทรด (หรือ lookup ล้มเหลว)
pub async fn lookup(
    client: &reqwest::Client,
    config: &Config,
    date:   NaiveDate,
) -> Option<SessionWindow> {
    let url = format!("{}/{}", config.calendar_url, date.format("%Y-%m-%d"));

    let resp = match client
        .get(&url)
        .timeout(std::time::Duration::from_secs(10))
        .send()
        .await
        .and_then(|r| r.error_for_status())
    {
        Ok(r) => r,
        Err(e) => {
            warn!(error = %e, %url, "Calendar lookup failed — treating as non-trading day");
            return None;
        }
    };

    let body: CalendarResponse = match resp.json().await {
        Ok(b) => b,
        Err(e) => {
            warn!(error = %e, "Calendar response parse failed — treating as non-trading day");
            return None;
        }
    };

    window_from_response(&body, &config.exchange)
}

/// หา entry ของ exchange ที่ config ไว้ แล้วแปลง epoch ms → เวลาท้องถิ่น
fn window_from_response(body: &CalendarResponse, exchange: &str) -> Option<SessionWindow> {
    let timing = body
        .data
        .iter()
        .find(|t| t.exchange.as_deref() == Some(exchange))?;

    let open  = local_time_of_day(timing.start_time?)?;
    let close = local_time_of_day(timing.end_time?)?;
    Some(SessionWindow { open, close })
}

fn local_time_of_day(epoch_ms: i64) -> Option<NaiveTime> {
    Local
        .timestamp_millis_opt(epoch_ms)
        .single()
        .map(|dt| dt.time())
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn make_response(json: &str) -> CalendarResponse {
        serde_json::from_str(json).expect("fixture must parse")
    }

    #[test]
    fn test_window_for_matching_exchange() {
        let open_ms  = 1_700_000_000_000_i64;
        let close_ms = open_ms + 6 * 3600 * 1000;
        let body = make_response(&format!(
            r#"{{"data":[
                {{"exchange":"BSE","start_time":1,"end_time":2}},
                {{"exchange":"NSE","start_time":{open_ms},"end_time":{close_ms}}}
            ]}}"#
        ));

        let window = window_from_response(&body, "NSE").expect("window expected");
        assert_eq!(window.open,  local_time_of_day(open_ms).unwrap());
        assert_eq!(window.close, local_time_of_day(close_ms).unwrap());
    }

    #[test]
    fn test_no_matching_exchange_is_none() {
        let body = make_response(
            r#"{"data":[{"exchange":"BSE","start_time":1,"end_time":2}]}"#,
        );
        assert!(window_from_response(&body, "NSE").is_none());
    }

    #[test]
    fn test_missing_timings_is_none() {
        let body = make_response(r#"{"data":[{"exchange":"NSE","start_time":null}]}"#);
        assert!(window_from_response(&body, "NSE").is_none());
    }

    #[test]
    fn test_empty_body_is_none() {
        let body = make_response(r#"{}"#);
        assert!(window_from_response(&body, "NSE").is_none());
    }
}
