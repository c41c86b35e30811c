//! Volatility feed abstraction and the fallback policy applied to its snapshots.
//!
//! A feed hands back a raw [`FeedSnapshot`] in which either value may be
//! missing. [`FeedPolicy::resolve`] turns it into a validated
//! [`VolatilityReading`], applying only the fallbacks the operator configured
//! and listing each one it used. Nothing is substituted silently.

use std::collections::VecDeque;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use sessionguard_core::{RiskError, VolatilityReading};

/// Reference/level ratio assumed when the term structure is missing and the
/// policy is a contango proxy.
pub const DEFAULT_CONTANGO_RATIO: f64 = 1.1;

/// Snapshots older than this are rejected (covers a long weekend).
pub const DEFAULT_MAX_STALENESS_SECS: u64 = 96 * 60 * 60;

/// Observations averaged by [`VolatilityHistory`].
pub const DEFAULT_HISTORY_WINDOW: usize = 20;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FeedError {
    #[error("volatility feed unavailable: {0}")]
    Unavailable(String),

    #[error("volatility level missing and the policy is to halt")]
    MissingLevel,

    #[error("term structure reference missing and the policy is to halt")]
    MissingTermStructure,

    #[error("volatility snapshot from {observed_at} is {age_secs}s old (max {max_secs}s)")]
    Stale {
        observed_at: DateTime<Utc>,
        age_secs: i64,
        max_secs: u64,
    },

    #[error(transparent)]
    Invalid(#[from] RiskError),
}

/// Raw values as delivered by a feed, before any policy is applied.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeedSnapshot {
    pub level: Option<f64>,
    pub term_structure: Option<f64>,
    pub observed_at: DateTime<Utc>,
}

impl FeedSnapshot {
    pub fn new(level: Option<f64>, term_structure: Option<f64>, observed_at: DateTime<Utc>) -> Self {
        Self {
            level,
            term_structure,
            observed_at,
        }
    }

    pub fn complete(level: f64, term_structure: f64, observed_at: DateTime<Utc>) -> Self {
        Self::new(Some(level), Some(term_structure), observed_at)
    }
}

/// Source of volatility snapshots.
///
/// Implementations fetch from wherever they like; policy and validation sit
/// above this trait.
pub trait VolatilityFeed: Send + Sync {
    fn name(&self) -> &str;

    fn snapshot(&self) -> Result<FeedSnapshot, FeedError>;

    fn is_available(&self) -> bool {
        true
    }
}

/// A feed that always returns the same snapshot. Used by the CLI, where the
/// operator passes the values on the command line, and by tests.
#[derive(Debug, Clone)]
pub struct StaticFeed {
    snapshot: Option<FeedSnapshot>,
}

impl StaticFeed {
    pub fn new(snapshot: FeedSnapshot) -> Self {
        Self {
            snapshot: Some(snapshot),
        }
    }

    pub fn unavailable() -> Self {
        Self { snapshot: None }
    }
}

impl VolatilityFeed for StaticFeed {
    fn name(&self) -> &str {
        "static"
    }

    fn snapshot(&self) -> Result<FeedSnapshot, FeedError> {
        self.snapshot
            .ok_or_else(|| FeedError::Unavailable("static feed has no snapshot".into()))
    }

    fn is_available(&self) -> bool {
        self.snapshot.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum MissingLevelPolicy {
    #[default]
    Halt,
    AssumeLevel { level: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum MissingTermStructurePolicy {
    /// Classify on the level alone; no stress adjustment.
    Ignore,
    /// Assume normal contango: reference = level * ratio.
    ContangoProxy { ratio: f64 },
    /// Treat the curve as inverted and apply the stress multiplier.
    AssumeBackwardation,
    Halt,
}

impl Default for MissingTermStructurePolicy {
    fn default() -> Self {
        Self::ContangoProxy {
            ratio: DEFAULT_CONTANGO_RATIO,
        }
    }
}

/// A substitution made while resolving a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AppliedFallback {
    AssumedLevel { level: f64 },
    ContangoProxy { reference: f64 },
    AssumedBackwardation,
    IgnoredTermStructure,
}

impl fmt::Display for AppliedFallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AssumedLevel { level } => write!(f, "assumed level {level:.2}"),
            Self::ContangoProxy { reference } => {
                write!(f, "term structure proxied as {reference:.2} (contango)")
            }
            Self::AssumedBackwardation => f.write_str("term structure assumed backwardated"),
            Self::IgnoredTermStructure => f.write_str("term structure ignored"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedReading {
    pub reading: VolatilityReading,
    pub fallbacks: Vec<AppliedFallback>,
    pub observed_at: DateTime<Utc>,
}

impl ResolvedReading {
    pub fn is_degraded(&self) -> bool {
        !self.fallbacks.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedPolicy {
    /// What to do when the snapshot has no level. Defaults to halting sizing.
    #[serde(default)]
    pub on_missing_level: MissingLevelPolicy,
    /// What to do when the snapshot has no term-structure reference.
    /// Defaults to a contango proxy of `level * 1.1`.
    #[serde(default)]
    pub on_missing_term_structure: MissingTermStructurePolicy,
    /// Oldest acceptable snapshot age. The default spans a weekend.
    #[serde(default = "default_max_staleness_secs")]
    pub max_staleness_secs: u64,
}

fn default_max_staleness_secs() -> u64 {
    DEFAULT_MAX_STALENESS_SECS
}

impl Default for FeedPolicy {
    fn default() -> Self {
        Self {
            on_missing_level: MissingLevelPolicy::default(),
            on_missing_term_structure: MissingTermStructurePolicy::default(),
            max_staleness_secs: DEFAULT_MAX_STALENESS_SECS,
        }
    }
}

impl FeedPolicy {
    pub fn validate(&self) -> Result<(), RiskError> {
        if let MissingLevelPolicy::AssumeLevel { level } = self.on_missing_level {
            if !level.is_finite() || level < 0.0 {
                return Err(RiskError::InvalidConfig(format!(
                    "feed.on_missing_level: assumed level must be finite and non-negative, got {level}"
                )));
            }
        }
        if let MissingTermStructurePolicy::ContangoProxy { ratio } = self.on_missing_term_structure {
            if !ratio.is_finite() || ratio <= 0.0 {
                return Err(RiskError::InvalidConfig(format!(
                    "feed.on_missing_term_structure: contango ratio must be finite and positive, got {ratio}"
                )));
            }
        }
        if self.max_staleness_secs == 0 {
            return Err(RiskError::InvalidConfig(
                "feed.max_staleness_secs must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Apply the policy to `snapshot` as seen at `now`.
    ///
    /// A snapshot stamped slightly in the future counts as fresh.
    pub fn resolve(
        &self,
        snapshot: &FeedSnapshot,
        now: DateTime<Utc>,
    ) -> Result<ResolvedReading, FeedError> {
        let age_secs = now.signed_duration_since(snapshot.observed_at).num_seconds();
        let max_secs = i64::try_from(self.max_staleness_secs).unwrap_or(i64::MAX);
        if age_secs > max_secs {
            return Err(FeedError::Stale {
                observed_at: snapshot.observed_at,
                age_secs,
                max_secs: self.max_staleness_secs,
            });
        }

        let mut fallbacks = Vec::new();

        let level = match (snapshot.level, self.on_missing_level) {
            (Some(level), _) => level,
            (None, MissingLevelPolicy::Halt) => return Err(FeedError::MissingLevel),
            (None, MissingLevelPolicy::AssumeLevel { level }) => {
                fallbacks.push(AppliedFallback::AssumedLevel { level });
                level
            }
        };

        let reference = match (snapshot.term_structure, self.on_missing_term_structure) {
            (Some(reference), _) => Some(reference),
            (None, MissingTermStructurePolicy::Halt) => {
                return Err(FeedError::MissingTermStructure)
            }
            (None, MissingTermStructurePolicy::Ignore) => {
                fallbacks.push(AppliedFallback::IgnoredTermStructure);
                None
            }
            (None, MissingTermStructurePolicy::ContangoProxy { ratio }) => {
                let reference = level * ratio;
                fallbacks.push(AppliedFallback::ContangoProxy { reference });
                Some(reference)
            }
            (None, MissingTermStructurePolicy::AssumeBackwardation) => {
                fallbacks.push(AppliedFallback::AssumedBackwardation);
                Some(0.0)
            }
        };

        let reading = match reference {
            Some(reference) => VolatilityReading::new(level).with_term_structure(reference),
            None => VolatilityReading::new(level),
        };
        reading.validate()?;

        for fallback in &fallbacks {
            warn!(%fallback, observed_at = %snapshot.observed_at, "volatility feed fallback applied");
        }

        Ok(ResolvedReading {
            reading,
            fallbacks,
            observed_at: snapshot.observed_at,
        })
    }
}

/// Rolling window of recent levels; the mean is shown next to the current
/// reading as context and never feeds the multiplier.
#[derive(Debug, Clone, PartialEq)]
pub struct VolatilityHistory {
    window: usize,
    levels: VecDeque<f64>,
}

impl VolatilityHistory {
    pub fn new(window: usize) -> Self {
        let window = window.max(1);
        Self {
            window,
            levels: VecDeque::with_capacity(window),
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// Non-finite levels are dropped.
    pub fn push(&mut self, level: f64) {
        if !level.is_finite() {
            return;
        }
        if self.levels.len() == self.window {
            self.levels.pop_front();
        }
        self.levels.push_back(level);
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.levels.len() == self.window
    }

    pub fn latest(&self) -> Option<f64> {
        self.levels.back().copied()
    }

    /// Mean over the window, or `None` until the window has filled.
    pub fn mean(&self) -> Option<f64> {
        if !self.is_full() {
            return None;
        }
        Some(self.levels.iter().sum::<f64>() / self.window as f64)
    }
}

impl Default for VolatilityHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_WINDOW)
    }
}
