//! Interest tracking for the Telegram Mini App.
//!
//! One view session per opened apartment. While the page is visible and
//! the user is active, a heartbeat reports viewing time to the backend,
//! which turns it into an interest score. Starting a new session ends the
//! previous one; there are never two at once.

pub mod heartbeat;

use std::future::Future;
use tokio::sync::watch;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::api::{
    HeartbeatAck, HeartbeatRequest, InterestEventAck, InterestEventKind, InterestEventRequest,
    MiniAppApi, ViewSessionEnd, ViewSessionStart, ViewSessionStarted, ViewSessionSummary,
};
use crate::config::TrackerConfig;
use crate::types::{Apartment, CrmResult};

use heartbeat::{HeartbeatGate, TickOutcome};

/// Page state pushed into a running tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageSignal {
    pub visible: bool,
    /// Bumped on every user interaction.
    pub activity: u64,
}

impl Default for PageSignal {
    fn default() -> Self {
        Self {
            visible: true,
            activity: 0,
        }
    }
}

/// Snapshot of the current session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionInfo {
    pub session_id: i64,
    pub score_id: i64,
    pub apartment: Apartment,
    pub total_active_seconds: u32,
    pub heartbeat_running: bool,
}

struct ActiveSession {
    session_id: i64,
    score_id: i64,
    apartment: Apartment,
    gate: HeartbeatGate,
}

pub struct InterestTracker<A: MiniAppApi> {
    api: A,
    telegram_id: i64,
    config: TrackerConfig,
    session: Option<ActiveSession>,
    last_signal: PageSignal,
}

impl<A: MiniAppApi> InterestTracker<A> {
    pub fn new(api: A, telegram_id: i64, config: TrackerConfig) -> Self {
        Self {
            api,
            telegram_id,
            config,
            session: None,
            last_signal: PageSignal::default(),
        }
    }

    pub fn session_info(&self) -> Option<SessionInfo> {
        self.session.as_ref().map(|s| SessionInfo {
            session_id: s.session_id,
            score_id: s.score_id,
            apartment: s.apartment.clone(),
            total_active_seconds: s.gate.reported(),
            heartbeat_running: s.gate.is_running(),
        })
    }

    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    /// Open a view session for `apartment`, ending any current one first.
    pub async fn start_session(&mut self, apartment: Apartment) -> CrmResult<ViewSessionStarted> {
        if self.session.is_some() {
            self.end_session().await;
        }

        let started = self
            .api
            .start_view_session(&ViewSessionStart::new(self.telegram_id, &apartment))
            .await?;

        info!(
            session_id = started.session_id,
            score_id = started.score_id,
            views = started.view_count,
            apartment = %apartment,
            "View session started"
        );

        let mut gate = HeartbeatGate::new(&self.config, Instant::now());
        gate.set_visible(self.last_signal.visible, Instant::now());
        self.session = Some(ActiveSession {
            session_id: started.session_id,
            score_id: started.score_id,
            apartment,
            gate,
        });
        Ok(started)
    }

    /// One heartbeat tick. `Ok(None)` when nothing was sent.
    pub async fn tick(&mut self, now: Instant) -> CrmResult<Option<HeartbeatAck>> {
        let telegram_id = self.telegram_id;
        let Some(session) = self.session.as_mut() else {
            return Ok(None);
        };

        let seconds = match session.gate.tick(now) {
            TickOutcome::Report(seconds) => seconds,
            TickOutcome::Skip(reason) => {
                debug!(session_id = session.session_id, ?reason, "Heartbeat skipped");
                return Ok(None);
            }
            TickOutcome::Capped => return Ok(None),
        };

        let ack = self
            .api
            .heartbeat(&HeartbeatRequest {
                session_id: session.session_id,
                telegram_id,
                seconds_elapsed: seconds,
                is_visible: session.gate.is_visible(),
            })
            .await?;

        session.gate.credit(seconds);
        session.gate.sync_server_total(ack.total_active_seconds);
        if ack.should_end {
            session.gate.stop();
        }
        if session.gate.is_capped() {
            info!(
                session_id = session.session_id,
                total = session.gate.reported(),
                "Session time cap reached, heartbeat stopped"
            );
        } else {
            debug!(
                session_id = session.session_id,
                sent = seconds,
                total = ack.total_active_seconds,
                "Heartbeat sent"
            );
        }
        Ok(Some(ack))
    }

    pub fn set_visible(&mut self, visible: bool, now: Instant) {
        self.last_signal.visible = visible;
        if let Some(session) = self.session.as_mut() {
            session.gate.set_visible(visible, now);
        }
    }

    pub fn record_activity(&mut self, now: Instant) {
        if let Some(session) = self.session.as_mut() {
            session.gate.record_activity(now);
        }
    }

    /// End the current session. State is cleared even when the call fails.
    pub async fn end_session(&mut self) -> Option<ViewSessionSummary> {
        let session = self.session.take()?;
        let req = ViewSessionEnd {
            session_id: session.session_id,
            telegram_id: self.telegram_id,
        };
        match self.api.end_view_session(&req).await {
            Ok(summary) => {
                info!(
                    session_id = summary.session_id,
                    score = summary.total_score,
                    seconds = summary.total_time_seconds,
                    "View session ended"
                );
                Some(summary)
            }
            Err(e) => {
                warn!(session_id = session.session_id, error = %e, "Failed to end view session");
                None
            }
        }
    }

    /// Post an interest event for the apartment being viewed.
    pub async fn record_event(&self, kind: InterestEventKind) -> CrmResult<Option<InterestEventAck>> {
        let Some(session) = self.session.as_ref() else {
            warn!(event = %kind, "No apartment is open, interest event dropped");
            return Ok(None);
        };
        let apt = &session.apartment;
        let ack = self
            .api
            .record_interest_event(&InterestEventRequest {
                telegram_id: self.telegram_id,
                complex_name: apt.complex_name.clone(),
                block_name: apt.block_name.clone(),
                floor: apt.floor,
                unit_number: apt.unit_number.clone(),
                event_type: kind,
            })
            .await?;
        info!(event = %kind, bonus = ack.bonus_added, score = ack.total_score, "Interest event recorded");
        Ok(Some(ack))
    }

    fn apply_signal(&mut self, signal: PageSignal, now: Instant) -> bool {
        let became_visible = signal.visible && !self.last_signal.visible;
        if signal.visible != self.last_signal.visible {
            self.set_visible(signal.visible, now);
        }
        if signal.activity != self.last_signal.activity {
            self.record_activity(now);
        }
        self.last_signal = signal;
        became_visible
    }

    /// Drive the heartbeat until `shutdown` resolves or the signal sender
    /// is dropped, then end the session on a best-effort basis.
    pub async fn run<F>(
        &mut self,
        mut signals: watch::Receiver<PageSignal>,
        shutdown: F,
    ) -> Option<ViewSessionSummary>
    where
        F: Future<Output = ()>,
    {
        let mut interval = time::interval(self.config.heartbeat_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately.
        interval.tick().await;
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.tick(Instant::now()).await {
                        warn!(error = %e, "Heartbeat failed");
                    }
                }
                changed = signals.changed() => {
                    if changed.is_err() {
                        debug!("Page signal channel closed");
                        break;
                    }
                    let signal = *signals.borrow_and_update();
                    if self.apply_signal(signal, Instant::now()) {
                        interval.reset();
                    }
                }
                _ = &mut shutdown => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        self.end_session().await
    }
}
