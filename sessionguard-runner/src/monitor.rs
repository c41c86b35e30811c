//! Risk monitor: owns the risk core for a running process.
//!
//! Adds what the pure core leaves to its caller:
//! - Cycle rollover keyed on the trigger session's civil calendar
//! - Feed resolution under the configured fallback policy
//! - Structured logging of outcomes, fallbacks and flatten events

use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use thiserror::Error;
use tracing::{error, info, warn};

use sessionguard_core::{
    Direction, RiskError, RiskGate, SessionDefinition, SessionSequencer, SessionStatus,
    SizingDecision, VolatilityRegimeClassifier,
};

use crate::config::{ConfigError, ConfigFingerprint, RiskConfig};
use crate::feed::{
    AppliedFallback, FeedError, FeedPolicy, FeedSnapshot, ResolvedReading, VolatilityFeed,
    VolatilityHistory,
};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MonitorError {
    #[error(transparent)]
    Feed(#[from] FeedError),
    #[error(transparent)]
    Risk(#[from] RiskError),
}

/// Maps instants to sequencing cycles.
///
/// The cycle of an instant is the civil date, in the trigger's time zone, of
/// the most recent trigger open at or before that instant. A downstream
/// session that closes after local midnight therefore still belongs to the
/// cycle its trigger opened.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycleCalendar {
    time_zone: Tz,
    open_time: NaiveTime,
}

impl CycleCalendar {
    pub fn new(time_zone: Tz, open_time: NaiveTime) -> Self {
        Self {
            time_zone,
            open_time,
        }
    }

    pub fn for_trigger(trigger: &SessionDefinition) -> Self {
        Self::new(trigger.time_zone, trigger.open_time)
    }

    pub fn cycle_date(&self, now: DateTime<Utc>) -> NaiveDate {
        let local = now.with_timezone(&self.time_zone);
        let date = local.date_naive();
        if local.time() >= self.open_time {
            date
        } else {
            date.pred_opt().unwrap_or(date)
        }
    }
}

/// Full evaluation as seen by the monitor.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorDecision {
    pub session_status: SessionStatus,
    pub flatten_required: bool,
    pub sizing: Result<SizingDecision, MonitorError>,
    pub fallbacks: Vec<AppliedFallback>,
}

#[derive(Debug)]
pub struct RiskMonitor {
    sequencer: SessionSequencer,
    classifier: VolatilityRegimeClassifier,
    feed_policy: FeedPolicy,
    calendar: CycleCalendar,
    history: Mutex<VolatilityHistory>,
    fingerprint: Option<ConfigFingerprint>,
}

impl RiskMonitor {
    pub fn new(
        sequencer: SessionSequencer,
        classifier: VolatilityRegimeClassifier,
        feed_policy: FeedPolicy,
    ) -> Result<Self, RiskError> {
        let calendar = CycleCalendar::for_trigger(sequencer.definition(sequencer.trigger_session())?);
        Ok(Self {
            sequencer,
            classifier,
            feed_policy,
            calendar,
            history: Mutex::new(VolatilityHistory::default()),
            fingerprint: None,
        })
    }

    pub fn from_config(config: &RiskConfig) -> Result<Self, ConfigError> {
        let components = config.build()?;
        let fingerprint = config.fingerprint()?;
        let mut monitor = Self::new(
            components.sequencer,
            components.classifier,
            components.feed_policy,
        )?;
        info!(
            fingerprint = %fingerprint,
            sessions = monitor.sequencer.definitions().len(),
            trigger = monitor.sequencer.trigger_session(),
            "risk configuration loaded"
        );
        monitor.fingerprint = Some(fingerprint);
        Ok(monitor)
    }

    pub fn sequencer(&self) -> &SessionSequencer {
        &self.sequencer
    }

    pub fn classifier(&self) -> &VolatilityRegimeClassifier {
        &self.classifier
    }

    pub fn fingerprint(&self) -> Option<&str> {
        self.fingerprint.as_deref()
    }

    pub fn gate(&self) -> RiskGate<'_> {
        RiskGate::new(&self.sequencer, &self.classifier)
    }

    /// Start the cycle `now` belongs to if it is newer than the current one.
    /// Returns the new cycle date when a reset happened; an instant from an
    /// earlier cycle changes nothing.
    pub fn roll_cycle(&self, now: DateTime<Utc>) -> Option<NaiveDate> {
        let cycle = self.calendar.cycle_date(now);
        if !self.sequencer.advance_cycle(cycle) {
            return None;
        }
        info!(%cycle, trigger = self.sequencer.trigger_session(), "started new sequencing cycle");
        Some(cycle)
    }

    /// Record a session's realized P&L in the cycle `closed_at` belongs to.
    /// Returns whether expansion is active afterwards.
    ///
    /// A close from a cycle older than the current one fails with
    /// [`RiskError::StaleOutcome`] and leaves the current cycle untouched.
    pub fn close_session(
        &self,
        session: &str,
        pnl_percent: f64,
        closed_at: DateTime<Utc>,
    ) -> Result<bool, RiskError> {
        let cycle = self.calendar.cycle_date(closed_at);
        match self.sequencer.record_outcome_in_cycle(session, pnl_percent, cycle) {
            Ok(true) => {
                info!(%cycle, trigger = self.sequencer.trigger_session(), "started new sequencing cycle");
            }
            Ok(false) => {}
            Err(e) => {
                warn!(session, %cycle, error = %e, "session outcome not recorded");
                return Err(e);
            }
        }
        let expansion_active = self.sequencer.expansion_active();
        info!(
            session,
            pnl_percent,
            trigger = self.sequencer.is_trigger(session),
            expansion_active,
            "session outcome recorded"
        );
        Ok(expansion_active)
    }

    pub fn resolve(
        &self,
        snapshot: &FeedSnapshot,
        now: DateTime<Utc>,
    ) -> Result<ResolvedReading, FeedError> {
        self.feed_policy.resolve(snapshot, now)
    }

    /// Pull one snapshot from `feed`, resolve it, and add the level to the
    /// moving-average window. Degraded readings stay out of the window.
    pub fn poll(
        &self,
        feed: &dyn VolatilityFeed,
        now: DateTime<Utc>,
    ) -> Result<ResolvedReading, FeedError> {
        let resolved = self.resolve(&feed.snapshot()?, now)?;
        if !resolved.is_degraded() {
            self.history_mut().push(resolved.reading.level);
        }
        Ok(resolved)
    }

    /// Add a level observed elsewhere (e.g. a previous day's close) to the
    /// moving-average window.
    pub fn record_level(&self, level: f64) {
        self.history_mut().push(level);
    }

    pub fn moving_average(&self) -> Option<f64> {
        self.history_mut().mean()
    }

    /// Samples held and the window size, read together.
    pub fn history_fill(&self) -> (usize, usize) {
        let history = self.history_mut();
        (history.len(), history.window())
    }

    pub fn evaluate(
        &self,
        market: &str,
        direction: Direction,
        now: DateTime<Utc>,
        snapshot: &FeedSnapshot,
        has_open_positions: bool,
    ) -> MonitorDecision {
        self.roll_cycle(now);
        let gate = self.gate();
        let session_status = self.sequencer.active_session(now);
        let flatten_required = gate.flatten_required(now, has_open_positions);
        if flatten_required {
            error!(%now, market, "no active session with open positions: flatten required");
        }

        let (sizing, fallbacks) = match self.resolve(snapshot, now) {
            Ok(resolved) => {
                let decision = gate.evaluate(market, direction, now, &resolved.reading, has_open_positions);
                (decision.sizing.map_err(MonitorError::from), resolved.fallbacks)
            }
            Err(e) => (Err(MonitorError::from(e)), Vec::new()),
        };

        MonitorDecision {
            session_status,
            flatten_required,
            sizing,
            fallbacks,
        }
    }

    fn history_mut(&self) -> std::sync::MutexGuard<'_, VolatilityHistory> {
        self.history.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
