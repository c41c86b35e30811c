//! Per-cycle outcome table: the only mutable state in the sequencer.

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::domain::SessionOutcome;

/// Most recent outcome per session for the current sequencing cycle.
///
/// The expansion flag is never stored here; it is derived from the trigger's
/// entry on every query.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OutcomeTable {
    cycle: Option<NaiveDate>,
    outcomes: BTreeMap<String, SessionOutcome>,
}

impl OutcomeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cycle the table currently belongs to, if one has been started.
    pub fn cycle(&self) -> Option<NaiveDate> {
        self.cycle
    }

    pub fn get(&self, session: &str) -> Option<&SessionOutcome> {
        self.outcomes.get(session)
    }

    /// Overwrites any earlier outcome for the same session.
    pub fn record(&mut self, outcome: SessionOutcome) {
        self.outcomes.insert(outcome.session_name.clone(), outcome);
    }

    /// Drops every outcome and moves the table to `cycle`.
    pub fn reset(&mut self, cycle: NaiveDate) {
        self.outcomes.clear();
        self.cycle = Some(cycle);
    }

    /// True only when `trigger` has a recorded outcome and it is >= 0.
    /// Absence is not proof.
    pub fn proves_expansion(&self, trigger: &str) -> bool {
        self.get(trigger).is_some_and(SessionOutcome::is_non_negative)
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}
