//! # session — Session Controller
//!
//! State machine ที่คุมทั้งวันเทรด ขับด้วยนาฬิกาจริงเทียบกับ session window
//!
//! ```text
//! New day ──▶ INITIALIZING ──(safe hour + calendar lookup)──┐
//!                                                           │ catch-up:
//!                  ┌────────────────────────────────────────┤ archive hour → SLEEPING
//!                  ▼                                        │ past close   → POST_SESSION
//!            WAITING_FOR_OPEN ──(now ≥ open)──▶ CAPTURING   │ mid-session  → CAPTURING
//!                                                  │        │ pre-open     → WAITING
//!                                         (now ≥ close)     │ no window    → SLEEPING
//!                                                  ▼        │
//!                              POST_SESSION ──▶ SLEEPING ◀──┘
//! ```
//!
//! ## Catch-up
//! ตอน restart กลางวัน controller เทียบเวลาปัจจุบันกับ archive hour → close →
//! open ตามลำดับ แล้วกระโดดเข้า state ที่ถูกต้องเลย ไม่ replay ประวัติ —
//! ไม่มีทาง double-start capture ของ session ที่จบไปแล้ว
//!
//! ## Archival lag
//! POST_SESSION บีบอัด store ของ *วันเทรดก่อนหน้า* ไม่ใช่วันที่เพิ่งปิด —
//! ทิ้งช่วงหนึ่งวันเสมอ ไม่แตะไฟล์ที่เพิ่งเขียนเสร็จ ผลพวงคือวันเทรดที่ตามด้วย
//! วันหยุดจะคง store แบบ live ไว้ (เป้า archive ถูก reset ตอนข้ามวันถัดไป)

use std::time::Duration;

use chrono::{Local, NaiveDate, NaiveTime, Timelike};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::archive::{self, ArchiveOutcome};
use crate::calendar::{self, SessionWindow};
use crate::config::Config;
use crate::quotes;
use crate::store::{self, DayStore, InstrumentCache};

/// รอบการเช็คก่อน safe hour (pre-market block)
const PRE_MARKET_POLL: Duration = Duration::from_secs(30);
/// รอบการเช็คระหว่างรอ market open
const WAITING_POLL: Duration = Duration::from_secs(1);
/// รอบการเช็คตอนหลับทั้งวัน
const SLEEPING_POLL: Duration = Duration::from_secs(60);
/// หน่วงก่อน retry ถ้าเปิด day store ไม่สำเร็จ
const STORE_RETRY: Duration = Duration::from_secs(60);

// ─── Phase ────────────────────────────────────────────────────────────────────

/// State ของวันปัจจุบัน — หนึ่งค่าต่อหนึ่ง [`TradingDay`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// เพิ่งเจอวันใหม่ ยังไม่รู้ schedule
    Initializing,
    /// วันนี้มี session แต่ยังไม่เปิด
    WaitingForOpen,
    /// Session เปิดอยู่ — fetch tick ทุก interval
    Capturing,
    /// Session เพิ่งปิด — archive วันเทรดก่อนหน้า
    PostSession,
    /// วันหยุด หรือวันนี้จบงานหมดแล้ว
    Sleeping,
}

// ─── Trading Day ──────────────────────────────────────────────────────────────

/// State ของวันเดียว — สร้างใหม่ทุกครั้งที่ข้ามวัน ไม่ mutate ข้ามวัน
#[derive(Debug)]
pub struct TradingDay {
    pub date:   NaiveDate,
    pub window: Option<SessionWindow>,
    pub phase:  Phase,
}

impl TradingDay {
    pub fn new(date: NaiveDate) -> Self {
        Self { date, window: None, phase: Phase::Initializing }
    }
}

// ─── Transition Functions (pure) ──────────────────────────────────────────────

/// Catch-up หลัง calendar lookup: เทียบ archive hour → close → open ตามลำดับ
pub(crate) fn catch_up(now: NaiveTime, window: &SessionWindow, archive_hour: u32) -> Phase {
    if now.hour() >= archive_hour {
        Phase::Sleeping
    } else if now >= window.close {
        Phase::PostSession
    } else if now >= window.open {
        Phase::Capturing
    } else {
        Phase::WaitingForOpen
    }
}

/// Phase เริ่มต้นของวัน หลังรู้ผล calendar lookup แล้ว
pub(crate) fn initial_phase(
    window:       Option<&SessionWindow>,
    now:          NaiveTime,
    archive_hour: u32,
) -> Phase {
    match window {
        Some(w) => catch_up(now, w, archive_hour),
        None    => Phase::Sleeping,
    }
}

// ─── Session Controller ───────────────────────────────────────────────────────

pub struct SessionController {
    config:   Config,
    client:   reqwest::Client,
    shutdown: watch::Receiver<bool>,
}

impl SessionController {
    pub fn new(config: Config, client: reqwest::Client, shutdown: watch::Receiver<bool>) -> Self {
        Self { config, client, shutdown }
    }

    /// Loop หลัก — ออกเมื่อ shutdown signal มาเท่านั้น
    pub async fn run(mut self) -> anyhow::Result<()> {
        let mut last_checked: Option<NaiveDate> = None;
        let mut day: Option<TradingDay> = None;
        // วันเทรดล่าสุดที่จบไปแล้ว = เป้าของการ archive แบบ lag หนึ่งวัน
        let mut prev_trading_day: Option<NaiveDate> = None;

        loop {
            if *self.shutdown.borrow() {
                break;
            }

            let today = Local::now().date_naive();

            // ── Day rollover ──────────────────────────────────────────────────
            if last_checked != Some(today) {
                info!(date = %today, "--- New day detected ---");

                prev_trading_day = day
                    .as_ref()
                    .and_then(|d| d.window.map(|_| d.date));
                let mut new_day = TradingDay::new(today);
                last_checked = Some(today);

                // Block จนถึง safe hour — calendar API ยังไม่นิ่งก่อนหน้านั้น
                if !self.wait_for_safe_hour().await {
                    break;
                }

                new_day.window = calendar::lookup(&self.client, &self.config, today).await;
                let now = Local::now().time();
                new_day.phase =
                    initial_phase(new_day.window.as_ref(), now, self.config.archive_hour);

                match &new_day.window {
                    Some(w) => info!(
                        open  = %w.open.format("%H:%M"),
                        close = %w.close.format("%H:%M"),
                        phase = ?new_day.phase,
                        "Trading day — session window resolved"
                    ),
                    None => info!("Market holiday or weekend — sleeping all day"),
                }

                // Catch-up ข้าม archive hour ไปแล้ว → เก็บกวาดของวันก่อนเลย
                if new_day.window.is_some() && new_day.phase == Phase::Sleeping {
                    self.archive_previous(prev_trading_day).await;
                }

                day = Some(new_day);
                continue;
            }

            let Some(current) = day.as_mut() else {
                continue;
            };

            // ── Phase step ────────────────────────────────────────────────────
            match current.phase {
                // มีได้แค่ก่อน calendar lookup — rollover branch จัดการไปแล้ว
                Phase::Initializing => {
                    current.phase = Phase::Sleeping;
                }

                Phase::WaitingForOpen => match current.window {
                    Some(w) if Local::now().time() >= w.open => {
                        info!("Market is OPEN — starting capture");
                        current.phase = Phase::Capturing;
                    }
                    Some(_) => {
                        if !self.idle(WAITING_POLL).await {
                            break;
                        }
                    }
                    None => current.phase = Phase::Sleeping,
                },

                Phase::Capturing => match current.window {
                    Some(w) => match self.run_capture(current.date, w).await {
                        Some(next) => current.phase = next,
                        None => break, // shutdown ระหว่าง capture
                    },
                    None => current.phase = Phase::Sleeping,
                },

                Phase::PostSession => {
                    info!("Performing post-session tasks");
                    self.archive_previous(prev_trading_day).await;
                    current.phase = Phase::Sleeping;
                }

                Phase::Sleeping => {
                    if !self.idle(SLEEPING_POLL).await {
                        break;
                    }
                }
            }
        }

        info!("Session controller stopped");
        Ok(())
    }

    // ── Capture Loop ──────────────────────────────────────────────────────────

    /// วิ่ง fetch ticks จนกว่าจะถึง close — คืน phase ถัดไป หรือ `None` ถ้า shutdown
    async fn run_capture(&mut self, date: NaiveDate, window: SessionWindow) -> Option<Phase> {
        // JIT setup: store + instrument cache มีอายุแค่วันนี้
        let path = store::day_store_path(&self.config.data_dir, date);
        let day_store = match DayStore::open(&path).await {
            Ok(s) => s,
            Err(e) => {
                error!(error = %e, "Failed to open day store — will retry");
                return if self.idle(STORE_RETRY).await {
                    Some(Phase::Capturing)
                } else {
                    None
                };
            }
        };
        let mut cache = InstrumentCache::new();

        // Skip = tick ที่ค้างเกิน interval ถูกข้าม ไม่เข้าคิว — ต่อกับการ await
        // tick inline ใน loop เดียว ทำให้มี tick in-flight ได้มากสุดหนึ่งอันเสมอ
        let mut ticks = tokio::time::interval(self.config.fetch_interval);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = self.shutdown.changed() => {
                    day_store.close().await;
                    return None;
                }
                _ = ticks.tick() => {}
            }

            if Local::now().time() >= window.close {
                info!(instruments = cache.len(), "Market is CLOSED — capture finished");
                day_store.close().await;
                return Some(Phase::PostSession);
            }

            capture_tick(&self.client, &self.config, &day_store, &mut cache).await;
        }
    }

    // ── Waits ─────────────────────────────────────────────────────────────────

    /// `true` = ถึง safe hour แล้ว, `false` = shutdown มาก่อน
    async fn wait_for_safe_hour(&mut self) -> bool {
        while Local::now().hour() < self.config.safe_check_hour {
            debug!(
                safe_hour = self.config.safe_check_hour,
                "Pre-market sleep — waiting for safe hour"
            );
            if !self.idle(PRE_MARKET_POLL).await {
                return false;
            }
        }
        true
    }

    /// หลับ `dur` แบบขัดจังหวะได้ — `false` = shutdown signal มาระหว่างหลับ
    async fn idle(&mut self, dur: Duration) -> bool {
        tokio::select! {
            _ = self.shutdown.changed() => false,
            _ = tokio::time::sleep(dur) => true,
        }
    }

    // ── Archival ──────────────────────────────────────────────────────────────

    /// Archive store ของวันเทรดก่อนหน้า (lag หนึ่งวันเสมอ — ดู module docs)
    async fn archive_previous(&self, prev: Option<NaiveDate>) {
        let Some(date) = prev else {
            debug!("No previous trading day to archive");
            return;
        };

        let path = store::day_store_path(&self.config.data_dir, date);
        match tokio::task::spawn_blocking(move || archive::archive_day(&path)).await {
            Ok(Ok(ArchiveOutcome::Archived(gz))) => {
                info!(archive = %gz.display(), "✅ Previous day store archived");
            }
            Ok(Ok(ArchiveOutcome::AlreadyGone)) => {
                debug!(date = %date, "No live copy to archive");
            }
            Ok(Err(e)) => error!(error = %e, date = %date, "Archive failed"),
            Err(e) => error!(error = %e, "Archive task panicked"),
        }
    }
}

// ─── Fetch Tick ───────────────────────────────────────────────────────────────

/// หนึ่ง tick = fetch หนึ่งครั้ง + append หนึ่ง snapshot
///
/// ทุก failure จบที่ log — tick ถัดไปถูก schedule ตาม interval เสมอ
pub(crate) async fn capture_tick(
    client: &reqwest::Client,
    config: &Config,
    store:  &DayStore,
    cache:  &mut InstrumentCache,
) {
    match quotes::fetch_snapshot(client, config).await {
        Ok(snapshot) => match store.append(&snapshot, cache).await {
            Ok(rows) => info!(rows, timestamp = %snapshot.created_at, "Snapshot captured"),
            Err(e) => warn!(error = %e, "Storage write failed — tick skipped"),
        },
        Err(e) => warn!(error = %e, "Fetch failed — tick skipped"),
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn make_window() -> SessionWindow {
        SessionWindow {
            open:  NaiveTime::from_hms_opt(9, 15, 0).unwrap(),
            close: NaiveTime::from_hms_opt(15, 30, 0).unwrap(),
        }
    }

    fn at(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_catch_up_before_open_waits() {
        assert_eq!(catch_up(at(9, 0), &make_window(), 16), Phase::WaitingForOpen);
    }

    #[test]
    fn test_catch_up_mid_session_captures() {
        assert_eq!(catch_up(at(11, 30), &make_window(), 16), Phase::Capturing);
    }

    #[test]
    fn test_catch_up_at_open_boundary_captures() {
        assert_eq!(catch_up(at(9, 15), &make_window(), 16), Phase::Capturing);
    }

    #[test]
    fn test_catch_up_just_after_close_goes_post_session() {
        // Restart ตอน close + 1 นาที: ต้องไป POST_SESSION ตรงๆ ห้ามเข้า CAPTURING
        assert_eq!(catch_up(at(15, 31), &make_window(), 16), Phase::PostSession);
    }

    #[test]
    fn test_catch_up_past_archive_hour_sleeps() {
        // Archive hour มาก่อนเงื่อนไข close เสมอ
        assert_eq!(catch_up(at(16, 0), &make_window(), 16), Phase::Sleeping);
        assert_eq!(catch_up(at(23, 59), &make_window(), 16), Phase::Sleeping);
    }

    #[test]
    fn test_no_session_window_sleeps_all_day() {
        // วันหยุด: INITIALIZING → SLEEPING โดยไม่มี fetch tick
        assert_eq!(initial_phase(None, at(10, 0), 16), Phase::Sleeping);
    }

    #[test]
    fn test_initial_phase_delegates_to_catch_up() {
        let window = make_window();
        assert_eq!(initial_phase(Some(&window), at(12, 0), 16), Phase::Capturing);
    }

    #[test]
    fn test_new_trading_day_starts_initializing() {
        let day = TradingDay::new(NaiveDate::from_ymd_opt(2024, 6, 14).unwrap());
        assert_eq!(day.phase, Phase::Initializing);
        assert!(day.window.is_none());
    }
}
