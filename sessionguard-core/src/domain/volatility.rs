use serde::{Deserialize, Serialize};

use crate::error::RiskError;

/// One volatility observation, supplied per query and never persisted.
///
/// `term_structure_reference` is the longer-dated counterpart of `level`
/// (e.g. VIX3M against VIX). A level above its reference is treated as a
/// backwardation stress signal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VolatilityReading {
    pub level: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub term_structure_reference: Option<f64>,
}

impl VolatilityReading {
    pub fn new(level: f64) -> Self {
        Self {
            level,
            term_structure_reference: None,
        }
    }

    pub fn with_term_structure(mut self, reference: f64) -> Self {
        self.term_structure_reference = Some(reference);
        self
    }

    /// Rejects non-finite or negative values instead of letting them
    /// fall through the threshold comparisons.
    pub fn validate(&self) -> Result<(), RiskError> {
        if !self.level.is_finite() || self.level < 0.0 {
            return Err(RiskError::InvalidReading(format!(
                "level must be finite and non-negative, got {}",
                self.level
            )));
        }
        if let Some(reference) = self.term_structure_reference {
            if !reference.is_finite() || reference < 0.0 {
                return Err(RiskError::InvalidReading(format!(
                    "term structure reference must be finite and non-negative, got {reference}"
                )));
            }
        }
        Ok(())
    }

    pub fn is_backwardated(&self) -> bool {
        match self.term_structure_reference {
            Some(reference) => self.level > reference,
            None => false,
        }
    }
}

/// One row of the regime threshold table.
///
/// `upper_bound` is exclusive. The terminal (most severe) band has no upper
/// bound and must be last.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeBand {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upper_bound: Option<f64>,
    pub multiplier: f64,
}

impl RegimeBand {
    pub fn bounded(name: impl Into<String>, upper_bound: f64, multiplier: f64) -> Self {
        Self {
            name: name.into(),
            upper_bound: Some(upper_bound),
            multiplier,
        }
    }

    pub fn terminal(name: impl Into<String>, multiplier: f64) -> Self {
        Self {
            name: name.into(),
            upper_bound: None,
            multiplier,
        }
    }
}

/// Derived sizing verdict for a reading. Never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeClassification {
    pub regime_name: String,
    /// Index into the band table; higher is more severe.
    pub severity: usize,
    pub base_multiplier: f64,
    pub stress_multiplier: f64,
    pub final_multiplier: f64,
}

impl RegimeClassification {
    pub fn is_stressed(&self) -> bool {
        self.stress_multiplier < 1.0
    }
}
