//! Session sequencer: position limits with conditional long-side expansion.
//!
//! The sequencer owns the immutable session table and the per-cycle
//! [`OutcomeTable`]. One session is the trigger: when its most recent outcome
//! in the current cycle is non-negative, every *other* session that declares
//! an expanded long limit may use it. Shorts never expand, and the trigger
//! never unlocks its own bonus.
//!
//! # Concurrency
//! The outcome table sits behind an `RwLock`. Every query takes a single read
//! acquisition and decides against that snapshot; writers take one write
//! acquisition per operation.

pub mod outcome_table;

pub use outcome_table::OutcomeTable;

use std::collections::HashSet;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use crate::clock::{SessionClock, SessionStatus};
use crate::domain::{Direction, SessionDefinition, SessionOutcome};
use crate::error::RiskError;

/// A resolved limit together with how it was reached.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionLimit {
    pub market: String,
    pub direction: Direction,
    /// Percent of portfolio.
    pub value: f64,
    /// True when the expanded long limit was applied.
    pub expanded: bool,
}

/// Pure limit rule, kept free of locking so the decision table can be
/// exercised directly.
pub fn resolve_limit(
    definition: &SessionDefinition,
    direction: Direction,
    is_trigger: bool,
    expansion_proven: bool,
) -> (f64, bool) {
    match direction {
        Direction::Short => (definition.short_limit_base, false),
        Direction::Long => match definition.long_limit_expanded {
            Some(expanded) if !is_trigger && expansion_proven => (expanded, true),
            _ => (definition.long_limit_base, false),
        },
    }
}

#[derive(Debug)]
pub struct SessionSequencer {
    definitions: Vec<SessionDefinition>,
    trigger: String,
    outcomes: RwLock<OutcomeTable>,
}

impl SessionSequencer {
    /// Build a sequencer over `definitions` in sequence order.
    ///
    /// `trigger` defaults to the first definition.
    pub fn new(
        definitions: Vec<SessionDefinition>,
        trigger: Option<&str>,
    ) -> Result<Self, RiskError> {
        let first = definitions
            .first()
            .ok_or_else(|| RiskError::InvalidConfig("at least one session is required".into()))?;

        let mut seen = HashSet::new();
        for def in &definitions {
            def.validate()?;
            if !seen.insert(def.name.as_str()) {
                return Err(RiskError::InvalidConfig(format!(
                    "duplicate session name '{}'",
                    def.name
                )));
            }
        }

        let trigger = match trigger {
            Some(name) if seen.contains(name) => name.to_string(),
            Some(name) => {
                return Err(RiskError::InvalidConfig(format!(
                    "trigger session '{name}' is not defined"
                )))
            }
            None => first.name.clone(),
        };

        Ok(Self {
            definitions,
            trigger,
            outcomes: RwLock::new(OutcomeTable::new()),
        })
    }

    pub fn definitions(&self) -> &[SessionDefinition] {
        &self.definitions
    }

    pub fn definition(&self, name: &str) -> Result<&SessionDefinition, RiskError> {
        self.definitions
            .iter()
            .find(|def| def.name == name)
            .ok_or_else(|| RiskError::UnknownSession(name.to_string()))
    }

    pub fn trigger_session(&self) -> &str {
        &self.trigger
    }

    pub fn is_trigger(&self, name: &str) -> bool {
        self.trigger == name
    }

    /// Store (or overwrite) the realized P&L of a session in the current cycle.
    ///
    /// Callers record this once the window has elapsed. A value recorded while
    /// the session is still open is treated exactly like a final one.
    pub fn record_outcome(&self, session_name: &str, pnl_percent: f64) -> Result<(), RiskError> {
        let outcome = self.checked_outcome(session_name, pnl_percent)?;
        self.write_outcomes().record(outcome);
        Ok(())
    }

    /// Store an outcome that belongs to `cycle`.
    ///
    /// A cycle newer than the table's is started first. An outcome from an
    /// older cycle is rejected with [`RiskError::StaleOutcome`] and the table
    /// is left as it was. Returns whether a new cycle was started.
    pub fn record_outcome_in_cycle(
        &self,
        session_name: &str,
        pnl_percent: f64,
        cycle: NaiveDate,
    ) -> Result<bool, RiskError> {
        let outcome = self.checked_outcome(session_name, pnl_percent)?;
        let mut table = self.write_outcomes();
        let started = match table.cycle() {
            Some(current) if cycle < current => {
                return Err(RiskError::StaleOutcome {
                    session: session_name.to_string(),
                    cycle,
                    current,
                })
            }
            Some(current) if cycle == current => false,
            _ => {
                table.reset(cycle);
                true
            }
        };
        table.record(outcome);
        Ok(started)
    }

    /// Explicit cycle boundary: forget every outcome of the previous cycle.
    pub fn start_cycle(&self, cycle: NaiveDate) {
        self.write_outcomes().reset(cycle);
    }

    /// Start `cycle` if it is newer than the table's. Equal or older cycles
    /// leave the table untouched, so the cycle only moves forward. Check and
    /// reset happen under one write lock.
    pub fn advance_cycle(&self, cycle: NaiveDate) -> bool {
        let mut table = self.write_outcomes();
        if table.cycle().is_some_and(|current| cycle <= current) {
            return false;
        }
        table.reset(cycle);
        true
    }

    pub fn current_cycle(&self) -> Option<NaiveDate> {
        self.read_outcomes().cycle()
    }

    pub fn outcome(&self, session_name: &str) -> Option<SessionOutcome> {
        self.read_outcomes().get(session_name).cloned()
    }

    /// Consistent copy of the whole outcome table.
    pub fn snapshot(&self) -> OutcomeTable {
        self.read_outcomes().clone()
    }

    /// Derived expansion flag for the current cycle.
    pub fn expansion_active(&self) -> bool {
        self.read_outcomes().proves_expansion(&self.trigger)
    }

    /// Maximum exposure (percent of portfolio) for `market` in `direction`.
    pub fn limit(&self, market: &str, direction: Direction) -> Result<f64, RiskError> {
        self.limit_detail(market, direction).map(|limit| limit.value)
    }

    pub fn limit_detail(&self, market: &str, direction: Direction) -> Result<SessionLimit, RiskError> {
        let definition = self.definition(market)?;
        let proven = self.read_outcomes().proves_expansion(&self.trigger);
        let (value, expanded) =
            resolve_limit(definition, direction, self.is_trigger(market), proven);
        Ok(SessionLimit {
            market: market.to_string(),
            direction,
            value,
            expanded,
        })
    }

    /// Limits for every session and direction, decided against one snapshot.
    pub fn all_limits(&self) -> Vec<SessionLimit> {
        let proven = self.read_outcomes().proves_expansion(&self.trigger);
        self.definitions
            .iter()
            .flat_map(|def| {
                Direction::ALL.into_iter().map(move |direction| {
                    let (value, expanded) =
                        resolve_limit(def, direction, self.is_trigger(&def.name), proven);
                    SessionLimit {
                        market: def.name.clone(),
                        direction,
                        value,
                        expanded,
                    }
                })
            })
            .collect()
    }

    pub fn active_session(&self, now: DateTime<Utc>) -> SessionStatus {
        SessionClock::active_session(now, &self.definitions)
    }

    /// Mandatory flatten signal: no session open while positions are held.
    pub fn flatten_required(&self, now: DateTime<Utc>, has_open_positions: bool) -> bool {
        has_open_positions && !self.active_session(now).is_active()
    }

    fn checked_outcome(&self, session_name: &str, pnl_percent: f64) -> Result<SessionOutcome, RiskError> {
        self.definition(session_name)?;
        if !pnl_percent.is_finite() {
            return Err(RiskError::InvalidOutcome {
                session: session_name.to_string(),
                pnl_percent,
            });
        }
        Ok(SessionOutcome::new(session_name, pnl_percent))
    }

    fn read_outcomes(&self) -> RwLockReadGuard<'_, OutcomeTable> {
        self.outcomes.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_outcomes(&self) -> RwLockWriteGuard<'_, OutcomeTable> {
        self.outcomes.write().unwrap_or_else(PoisonError::into_inner)
    }
}
