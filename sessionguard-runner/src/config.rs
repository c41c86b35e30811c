//! Serializable risk configuration.
//!
//! A [`RiskConfig`] captures everything needed to rebuild the risk core:
//! - Session table in sequence order, plus an optional trigger name
//! - Regime bands, stress multiplier and extreme level
//! - Volatility feed fallback policy
//!
//! It is stored as TOML. Loading never yields a half-valid setup: `build`
//! either returns every component or the first validation error.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use sessionguard_core::regime::{reference_bands, DEFAULT_EXTREME_LEVEL, DEFAULT_STRESS_MULTIPLIER};
use sessionguard_core::{
    RegimeBand, RiskError, SessionClock, SessionDefinition, SessionSequencer,
    VolatilityRegimeClassifier,
};

use crate::feed::FeedPolicy;

/// File name used by `config init` and as the CLI default.
pub const DEFAULT_CONFIG_FILE: &str = "sessionguard.toml";

/// Content hash of a configuration (BLAKE3, hex).
pub type ConfigFingerprint = String;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("failed to fingerprint config: {0}")]
    Fingerprint(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(#[from] RiskError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeConfig {
    /// Extra multiplier applied when the term structure is backwardated.
    #[serde(default = "default_stress_multiplier")]
    pub stress_multiplier: f64,
    /// Level at or above which trading pauses outright.
    #[serde(default = "default_extreme_level")]
    pub extreme_level: f64,
    /// Ascending bands; the last one has no upper bound.
    pub bands: Vec<RegimeBand>,
}

fn default_stress_multiplier() -> f64 {
    DEFAULT_STRESS_MULTIPLIER
}

fn default_extreme_level() -> f64 {
    DEFAULT_EXTREME_LEVEL
}

impl Default for RegimeConfig {
    fn default() -> Self {
        Self {
            stress_multiplier: DEFAULT_STRESS_MULTIPLIER,
            extreme_level: DEFAULT_EXTREME_LEVEL,
            bands: reference_bands(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Session whose outcome gates expansion. Defaults to the first session
    /// when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger_session: Option<String>,
    /// Volatility bands, stress multiplier and extreme level.
    #[serde(default)]
    pub regime: RegimeConfig,
    /// Fallbacks and staleness limit for the volatility feed.
    #[serde(default)]
    pub feed: FeedPolicy,
    /// Session definitions in sequence order.
    pub sessions: Vec<SessionDefinition>,
}

/// Validated components built from a [`RiskConfig`].
#[derive(Debug)]
pub struct RiskComponents {
    pub sequencer: SessionSequencer,
    pub classifier: VolatilityRegimeClassifier,
    pub feed_policy: FeedPolicy,
}

/// Two sessions open at the same instants on a given day.
///
/// `first` precedes `second` in the session table and therefore wins at
/// lookup time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OverlapWarning {
    pub first: String,
    pub second: String,
    pub starts_at: DateTime<Utc>,
    pub minutes: u32,
}

impl fmt::Display for OverlapWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "'{}' and '{}' overlap for {} min from {} UTC; '{}' takes precedence",
            self.first,
            self.second,
            self.minutes,
            self.starts_at.format("%Y-%m-%d %H:%M"),
            self.first
        )
    }
}

impl Default for RiskConfig {
    /// Reference layout: nikkei → dax → nasdaq, nikkei as trigger.
    fn default() -> Self {
        let t = |h, m| NaiveTime::from_hms_opt(h, m, 0).unwrap_or(NaiveTime::MIN);
        Self {
            trigger_session: Some("nikkei".into()),
            regime: RegimeConfig::default(),
            feed: FeedPolicy::default(),
            sessions: vec![
                SessionDefinition::new("nikkei", chrono_tz::Asia::Tokyo, t(8, 0), t(14, 0), "NKD", 4.0, 1.0),
                // 15:30 Berlin is the 09:30 New York open outside DST-mismatch weeks
                SessionDefinition::new("dax", chrono_tz::Europe::Berlin, t(8, 0), t(15, 30), "FDAX", 1.5, 0.5)
                    .with_expanded_long(2.0),
                SessionDefinition::new("nasdaq", chrono_tz::America::New_York, t(9, 30), t(16, 0), "NQ", 2.0, 2.5)
                    .with_expanded_long(3.0),
            ],
        }
    }
}

impl RiskConfig {
    pub fn from_toml(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    pub fn write_file(&self, path: &Path) -> Result<(), ConfigError> {
        let text = self.to_toml()?;
        fs::write(path, text).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn build(&self) -> Result<RiskComponents, ConfigError> {
        self.feed.validate()?;
        let classifier = VolatilityRegimeClassifier::new(
            self.regime.bands.clone(),
            self.regime.stress_multiplier,
            self.regime.extreme_level,
        )?;
        let sequencer = SessionSequencer::new(self.sessions.clone(), self.trigger_session.as_deref())?;
        Ok(RiskComponents {
            sequencer,
            classifier,
            feed_policy: self.feed.clone(),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.build().map(|_| ())
    }

    /// Deterministic hash of the configuration, so two processes can tell
    /// whether they run the same limits.
    pub fn fingerprint(&self) -> Result<ConfigFingerprint, ConfigError> {
        let json = serde_json::to_string(self)?;
        Ok(blake3::hash(json.as_bytes()).to_hex().to_string())
    }

    /// Overlapping session windows during the UTC day `date`, sampled per
    /// minute. DST transitions make overlap date-dependent, so callers pass
    /// the day they care about.
    pub fn overlap_warnings(&self, date: NaiveDate) -> Vec<OverlapWarning> {
        let start = Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN));
        let mut warnings: Vec<OverlapWarning> = Vec::new();

        for minute in 0..(24 * 60) {
            let now = start + Duration::minutes(minute);
            let open = SessionClock::open_definitions(now, &self.sessions);
            for (i, first) in open.iter().enumerate() {
                for second in &open[i + 1..] {
                    match warnings
                        .iter_mut()
                        .find(|w| w.first == first.name && w.second == second.name)
                    {
                        Some(w) => w.minutes += 1,
                        None => warnings.push(OverlapWarning {
                            first: first.name.clone(),
                            second: second.name.clone(),
                            starts_at: now,
                            minutes: 1,
                        }),
                    }
                }
            }
        }
        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sessionguard_core::Direction;

    #[test]
    fn default_config_is_valid() {
        let config = RiskConfig::default();
        let components = config.build().unwrap();
        assert_eq!(components.sequencer.trigger_session(), "nikkei");
        assert_eq!(components.sequencer.definitions().len(), 3);
        assert_eq!(components.classifier.bands().len(), 4);
    }

    #[test]
    fn toml_round_trip() {
        let config = RiskConfig::default();
        let text = config.to_toml().unwrap();
        assert!(text.contains("Asia/Tokyo"));
        assert!(text.contains("contango_proxy"));
        let back = RiskConfig::from_toml(&text).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn minimal_toml_fills_regime_and_feed_defaults() {
        let text = r#"
            [[sessions]]
            name = "asia"
            time_zone = "Asia/Tokyo"
            open_time = "09:00:00"
            close_time = "15:00:00"
            instrument_id = "NKD"
            long_limit_base = 1.0
            short_limit_base = 1.0

            [[sessions]]
            name = "us"
            time_zone = "America/New_York"
            open_time = "09:30:00"
            close_time = "16:00:00"
            instrument_id = "ES"
            long_limit_base = 2.0
            long_limit_expanded = 2.5
            short_limit_base = 1.5
        "#;
        let config = RiskConfig::from_toml(text).unwrap();
        assert_eq!(config.trigger_session, None);
        assert_eq!(config.regime, RegimeConfig::default());
        assert_eq!(config.feed, FeedPolicy::default());

        let components = config.build().unwrap();
        assert_eq!(components.sequencer.trigger_session(), "asia");
        components.sequencer.record_outcome("asia", 0.0).unwrap();
        assert_eq!(components.sequencer.limit("us", Direction::Long).unwrap(), 2.5);
    }

    #[test]
    fn unknown_time_zone_is_a_parse_error() {
        let text = RiskConfig::default().to_toml().unwrap().replace("Asia/Tokyo", "Mars/Olympus");
        assert!(matches!(RiskConfig::from_toml(&text), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn invalid_components_surface_as_invalid() {
        let mut config = RiskConfig::default();
        config.trigger_session = Some("ftse".into());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid(RiskError::InvalidConfig(_)))
        ));

        let mut config = RiskConfig::default();
        config.regime.bands.swap(0, 1);
        assert!(config.validate().is_err());

        let mut config = RiskConfig::default();
        config.feed.max_staleness_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn fingerprint_is_stable_and_sensitive() {
        let a = RiskConfig::default();
        let b = RiskConfig::default();
        assert_eq!(a.fingerprint().unwrap(), b.fingerprint().unwrap());
        assert_eq!(a.fingerprint().unwrap().len(), 64);

        let mut c = RiskConfig::default();
        c.sessions[2].long_limit_expanded = Some(3.5);
        assert_ne!(a.fingerprint().unwrap(), c.fingerprint().unwrap());
    }

    #[test]
    fn reference_layout_does_not_overlap_in_winter() {
        let january = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        assert!(RiskConfig::default().overlap_warnings(january).is_empty());
    }

    #[test]
    fn reference_layout_overlaps_when_us_dst_starts_first() {
        // US on EDT since 10 March, Europe still on CET until 31 March:
        // nasdaq opens 13:30 UTC while dax runs until 14:30 UTC.
        let march = NaiveDate::from_ymd_opt(2024, 3, 11).unwrap();
        let warnings = RiskConfig::default().overlap_warnings(march);
        assert_eq!(
            warnings,
            vec![OverlapWarning {
                first: "dax".into(),
                second: "nasdaq".into(),
                starts_at: Utc.with_ymd_and_hms(2024, 3, 11, 13, 30, 0).unwrap(),
                minutes: 60,
            }]
        );
        assert!(warnings[0].to_string().contains("'dax' takes precedence"));
    }
}
