//! Volatility regime classifier: thresholds a scalar reading into a discrete
//! regime and a position-size multiplier.
//!
//! Bands are ordered by severity with exclusive upper bounds, so a reading
//! exactly on a threshold lands in the *higher* band. The stress adjustment is
//! a single multiplier applied when the level sits above its term-structure
//! reference (backwardation). Base and stress factors compose by plain
//! multiplication and are each validated into `(0, 1]`, so the product can
//! shrink a position but never zero it; halting is a separate decision
//! ([`VolatilityRegimeClassifier::should_trade`]).

use std::collections::HashSet;

use crate::domain::{RegimeBand, RegimeClassification, VolatilityReading};
use crate::error::RiskError;

/// Backwardation penalty used by the reference configuration.
pub const DEFAULT_STRESS_MULTIPLIER: f64 = 0.75;

/// Reading at or above which trading should pause entirely.
pub const DEFAULT_EXTREME_LEVEL: f64 = 40.0;

/// A classified band, borrowed from the classifier's table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Regime<'a> {
    pub name: &'a str,
    pub severity: usize,
    pub base_multiplier: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VolatilityRegimeClassifier {
    bands: Vec<RegimeBand>,
    stress_multiplier: f64,
    extreme_level: f64,
}

impl VolatilityRegimeClassifier {
    pub fn new(
        bands: Vec<RegimeBand>,
        stress_multiplier: f64,
        extreme_level: f64,
    ) -> Result<Self, RiskError> {
        validate_bands(&bands)?;
        check_factor("stress_multiplier", stress_multiplier)?;
        if !extreme_level.is_finite() || extreme_level <= 0.0 {
            return Err(RiskError::InvalidConfig(format!(
                "extreme_level must be finite and positive, got {extreme_level}"
            )));
        }
        Ok(Self {
            bands,
            stress_multiplier,
            extreme_level,
        })
    }

    /// The reference VIX table: low < 15 <= normal < 20 <= elevated < 30 <= crisis.
    pub fn reference() -> Self {
        Self {
            bands: reference_bands(),
            stress_multiplier: DEFAULT_STRESS_MULTIPLIER,
            extreme_level: DEFAULT_EXTREME_LEVEL,
        }
    }

    pub fn bands(&self) -> &[RegimeBand] {
        &self.bands
    }

    pub fn stress_multiplier(&self) -> f64 {
        self.stress_multiplier
    }

    pub fn extreme_level(&self) -> f64 {
        self.extreme_level
    }

    /// Lowest band whose upper bound is strictly above `level`; the terminal
    /// band otherwise. NaN compares false everywhere and so lands in the
    /// terminal band.
    pub fn classify(&self, level: f64) -> Regime<'_> {
        let severity = self
            .bands
            .iter()
            .position(|band| matches!(band.upper_bound, Some(bound) if bound > level))
            .unwrap_or(self.bands.len() - 1);
        let band = &self.bands[severity];
        Regime {
            name: &band.name,
            severity,
            base_multiplier: band.multiplier,
        }
    }

    /// Stress factor for a level/reference pair: the configured multiplier
    /// under backwardation, 1 otherwise (including when no reference is given).
    pub fn stress_factor(&self, level: f64, term_structure_reference: Option<f64>) -> f64 {
        match term_structure_reference {
            Some(reference) if level > reference => self.stress_multiplier,
            _ => 1.0,
        }
    }

    /// Position-size multiplier in `(0, 1]`.
    pub fn multiplier(&self, level: f64, term_structure_reference: Option<f64>) -> f64 {
        self.classify(level).base_multiplier * self.stress_factor(level, term_structure_reference)
    }

    pub fn assess(&self, reading: &VolatilityReading) -> RegimeClassification {
        let regime = self.classify(reading.level);
        let stress = self.stress_factor(reading.level, reading.term_structure_reference);
        RegimeClassification {
            regime_name: regime.name.to_string(),
            severity: regime.severity,
            base_multiplier: regime.base_multiplier,
            stress_multiplier: stress,
            final_multiplier: regime.base_multiplier * stress,
        }
    }

    /// Hard cutoff, independent of the multiplier: false iff
    /// `level >= extreme_threshold`. NaN never permits trading.
    pub fn should_trade(level: f64, extreme_threshold: f64) -> bool {
        level < extreme_threshold
    }

    /// [`Self::should_trade`] against the configured extreme level.
    pub fn allows_trading(&self, level: f64) -> bool {
        Self::should_trade(level, self.extreme_level)
    }
}

impl Default for VolatilityRegimeClassifier {
    fn default() -> Self {
        Self::reference()
    }
}

pub fn reference_bands() -> Vec<RegimeBand> {
    vec![
        RegimeBand::bounded("low", 15.0, 1.00),
        RegimeBand::bounded("normal", 20.0, 0.85),
        RegimeBand::bounded("elevated", 30.0, 0.65),
        RegimeBand::terminal("crisis", 0.40),
    ]
}

fn validate_bands(bands: &[RegimeBand]) -> Result<(), RiskError> {
    let (terminal, bounded) = bands
        .split_last()
        .ok_or_else(|| RiskError::InvalidConfig("at least one regime band is required".into()))?;

    if terminal.upper_bound.is_some() {
        return Err(RiskError::InvalidConfig(format!(
            "last regime band '{}' must have no upper bound",
            terminal.name
        )));
    }

    let mut previous: Option<f64> = None;
    for band in bounded {
        let bound = band.upper_bound.ok_or_else(|| {
            RiskError::InvalidConfig(format!(
                "regime band '{}' needs an upper bound (only the last band may omit it)",
                band.name
            ))
        })?;
        if !bound.is_finite() {
            return Err(RiskError::InvalidConfig(format!(
                "regime band '{}' has a non-finite upper bound",
                band.name
            )));
        }
        if let Some(prev) = previous {
            if bound <= prev {
                return Err(RiskError::InvalidConfig(format!(
                    "regime bounds must be strictly ascending: '{}' ({bound}) follows {prev}",
                    band.name
                )));
            }
        }
        previous = Some(bound);
    }

    let mut names = HashSet::new();
    for band in bands {
        if band.name.trim().is_empty() {
            return Err(RiskError::InvalidConfig("regime band name must not be empty".into()));
        }
        if !names.insert(band.name.as_str()) {
            return Err(RiskError::InvalidConfig(format!(
                "duplicate regime band '{}'",
                band.name
            )));
        }
        check_factor(&format!("multiplier of regime '{}'", band.name), band.multiplier)?;
    }
    Ok(())
}

fn check_factor(label: &str, value: f64) -> Result<(), RiskError> {
    if !(value > 0.0 && value <= 1.0) {
        return Err(RiskError::InvalidConfig(format!(
            "{label} must be in (0, 1], got {value}"
        )));
    }
    Ok(())
}
