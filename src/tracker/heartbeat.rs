//! Per-session heartbeat accounting.
//!
//! Pure state machine, no I/O: decides how many seconds a tick may
//! report. Each report is capped at `max_report_secs` and by what is left
//! of the `max_session_secs` budget. Hidden or idle time is never
//! credited because skipping a tick moves the baseline forward.

use std::time::Duration;
use tokio::time::Instant;

use crate::config::TrackerConfig;

/// Why a tick sent nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Hidden,
    Idle,
    /// Less than a whole second since the last report.
    TooSoon,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Send a heartbeat for this many seconds.
    Report(u32),
    Skip(SkipReason),
    /// The session budget is spent; the heartbeat is stopped.
    Capped,
}

#[derive(Debug, Clone)]
pub struct HeartbeatGate {
    max_report: u32,
    max_session: u32,
    inactivity: Duration,
    baseline: Instant,
    last_activity: Instant,
    reported: u32,
    visible: bool,
    capped: bool,
}

impl HeartbeatGate {
    pub fn new(config: &TrackerConfig, now: Instant) -> Self {
        Self {
            max_report: config.max_report_secs,
            max_session: config.max_session_secs,
            inactivity: Duration::from_secs(config.inactivity_timeout_secs),
            baseline: now,
            last_activity: now,
            reported: 0,
            visible: true,
            capped: false,
        }
    }

    /// Seconds credited so far, never above the session cap.
    pub fn reported(&self) -> u32 {
        self.reported
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn is_capped(&self) -> bool {
        self.capped
    }

    /// True while ticks can still produce reports.
    pub fn is_running(&self) -> bool {
        self.visible && !self.capped
    }

    pub fn tick(&mut self, now: Instant) -> TickOutcome {
        if self.capped {
            return TickOutcome::Capped;
        }
        if !self.visible {
            self.baseline = now;
            return TickOutcome::Skip(SkipReason::Hidden);
        }
        if now.saturating_duration_since(self.last_activity) > self.inactivity {
            self.baseline = now;
            return TickOutcome::Skip(SkipReason::Idle);
        }

        let elapsed = now.saturating_duration_since(self.baseline).as_secs();
        if elapsed < 1 {
            return TickOutcome::Skip(SkipReason::TooSoon);
        }

        let remaining = self.max_session.saturating_sub(self.reported);
        let report = (elapsed.min(u64::from(self.max_report)) as u32).min(remaining);
        self.baseline = now;
        if report == 0 {
            self.capped = true;
            return TickOutcome::Capped;
        }
        TickOutcome::Report(report)
    }

    /// Credit a report the backend accepted.
    pub fn credit(&mut self, seconds: u32) {
        self.reported = self.reported.saturating_add(seconds).min(self.max_session);
        if self.reported >= self.max_session {
            self.capped = true;
        }
    }

    /// Adopt the backend's running total; the local total never decreases.
    pub fn sync_server_total(&mut self, total: u32) {
        self.reported = self.reported.max(total).min(self.max_session);
        if self.reported >= self.max_session {
            self.capped = true;
        }
    }

    /// Backend said `should_end`.
    pub fn stop(&mut self) {
        self.capped = true;
    }

    /// Showing the page again starts from a fresh baseline.
    pub fn set_visible(&mut self, visible: bool, now: Instant) {
        if visible && !self.visible {
            self.baseline = now;
            self.last_activity = now;
        }
        self.visible = visible;
    }

    pub fn record_activity(&mut self, now: Instant) {
        if now > self.last_activity {
            self.last_activity = now;
        }
    }
}
