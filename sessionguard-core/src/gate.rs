//! Risk gate: stateless composition of the sequencer and the classifier.
//!
//! `effective_limit = sequencer.limit(market, direction) * classifier.multiplier(reading)`.
//!
//! The gate keeps no state and caches nothing: the active session and the
//! regime may both change between calls.

use chrono::{DateTime, Utc};

use crate::clock::SessionStatus;
use crate::domain::{Direction, RegimeClassification, VolatilityReading};
use crate::error::RiskError;
use crate::regime::VolatilityRegimeClassifier;
use crate::sequencer::SessionSequencer;

/// Sizing half of a gate evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct SizingDecision {
    pub market: String,
    pub direction: Direction,
    pub base_limit: f64,
    pub expanded: bool,
    pub classification: RegimeClassification,
    pub effective_limit: f64,
    /// False when the reading is at or above the extreme level.
    pub trading_allowed: bool,
}

/// Full evaluation for one market/direction at one instant.
///
/// The flatten flag sits outside the sizing result so that a sizing error
/// (unknown market, bad reading) can never hide it.
#[derive(Debug, Clone, PartialEq)]
pub struct GateDecision {
    pub session_status: SessionStatus,
    pub flatten_required: bool,
    pub sizing: Result<SizingDecision, RiskError>,
}

#[derive(Debug, Clone, Copy)]
pub struct RiskGate<'a> {
    sequencer: &'a SessionSequencer,
    classifier: &'a VolatilityRegimeClassifier,
}

impl<'a> RiskGate<'a> {
    pub fn new(sequencer: &'a SessionSequencer, classifier: &'a VolatilityRegimeClassifier) -> Self {
        Self {
            sequencer,
            classifier,
        }
    }

    /// Session limit scaled by the regime multiplier.
    pub fn effective_limit(
        &self,
        market: &str,
        direction: Direction,
        reading: &VolatilityReading,
    ) -> Result<f64, RiskError> {
        reading.validate()?;
        let base = self.sequencer.limit(market, direction)?;
        Ok(base * self.classifier.multiplier(reading.level, reading.term_structure_reference))
    }

    /// Forwarded unchanged from the sequencer.
    pub fn flatten_required(&self, now: DateTime<Utc>, has_open_positions: bool) -> bool {
        self.sequencer.flatten_required(now, has_open_positions)
    }

    pub fn evaluate(
        &self,
        market: &str,
        direction: Direction,
        now: DateTime<Utc>,
        reading: &VolatilityReading,
        has_open_positions: bool,
    ) -> GateDecision {
        let session_status = self.sequencer.active_session(now);
        let flatten_required = has_open_positions && !session_status.is_active();
        GateDecision {
            session_status,
            flatten_required,
            sizing: self.size(market, direction, reading),
        }
    }

    fn size(
        &self,
        market: &str,
        direction: Direction,
        reading: &VolatilityReading,
    ) -> Result<SizingDecision, RiskError> {
        reading.validate()?;
        let limit = self.sequencer.limit_detail(market, direction)?;
        let classification = self.classifier.assess(reading);
        Ok(SizingDecision {
            market: limit.market,
            direction,
            base_limit: limit.value,
            expanded: limit.expanded,
            effective_limit: limit.value * classification.final_multiplier,
            classification,
            trading_allowed: self.classifier.allows_trading(reading.level),
        })
    }
}
