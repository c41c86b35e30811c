use chrono::{DateTime, NaiveTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::RiskError;

/// Side of the exposure being bounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    pub const ALL: [Direction; 2] = [Direction::Long, Direction::Short];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Long => "long",
            Self::Short => "short",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "long" => Ok(Self::Long),
            "short" => Ok(Self::Short),
            other => Err(format!("unknown direction '{other}' (expected long or short)")),
        }
    }
}

/// A named, time-zone-scoped trading window with its own exposure limits.
///
/// Limits are percentages of portfolio value. The window is half-open in the
/// session's own civil time: `open_time` belongs to the session, `close_time`
/// does not. A window whose open is later than its close wraps midnight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionDefinition {
    /// Unique session name, also used as the market key (e.g. "dax").
    pub name: String,
    /// IANA zone the window is defined in. DST follows the zone.
    pub time_zone: Tz,
    /// First local minute of the window (inclusive).
    pub open_time: NaiveTime,
    /// End of the window in local time (exclusive).
    pub close_time: NaiveTime,
    /// Instrument traded in this session (e.g. "FDAX").
    pub instrument_id: String,
    /// Long limit without expansion.
    pub long_limit_base: f64,
    /// Long limit once the trigger has proven the day. `None` means the
    /// session never expands.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub long_limit_expanded: Option<f64>,
    pub short_limit_base: f64,
}

impl SessionDefinition {
    pub fn new(
        name: impl Into<String>,
        time_zone: Tz,
        open_time: NaiveTime,
        close_time: NaiveTime,
        instrument_id: impl Into<String>,
        long_limit_base: f64,
        short_limit_base: f64,
    ) -> Self {
        Self {
            name: name.into(),
            time_zone,
            open_time,
            close_time,
            instrument_id: instrument_id.into(),
            long_limit_base,
            long_limit_expanded: None,
            short_limit_base,
        }
    }

    /// Declare the long limit unlocked by a non-negative trigger outcome.
    pub fn with_expanded_long(mut self, limit: f64) -> Self {
        self.long_limit_expanded = Some(limit);
        self
    }

    pub fn wraps_midnight(&self) -> bool {
        self.open_time > self.close_time
    }

    /// Civil time of `now` in this session's time zone.
    pub fn local_time(&self, now: DateTime<Utc>) -> NaiveTime {
        now.with_timezone(&self.time_zone).time()
    }

    /// Half-open membership test against a civil time in the session's zone.
    pub fn contains_local_time(&self, local: NaiveTime) -> bool {
        if self.wraps_midnight() {
            local >= self.open_time || local < self.close_time
        } else {
            self.open_time <= local && local < self.close_time
        }
    }

    pub fn is_open_at(&self, now: DateTime<Utc>) -> bool {
        self.contains_local_time(self.local_time(now))
    }

    /// Static validation of one definition. Cross-definition checks
    /// (unique names, trigger existence) belong to the sequencer.
    pub fn validate(&self) -> Result<(), RiskError> {
        if self.name.trim().is_empty() {
            return Err(RiskError::InvalidConfig("session name must not be empty".into()));
        }
        if self.open_time == self.close_time {
            return Err(RiskError::InvalidConfig(format!(
                "session '{}' has a zero-length window (open == close == {})",
                self.name, self.open_time
            )));
        }
        check_limit(&self.name, "long_limit_base", self.long_limit_base)?;
        check_limit(&self.name, "short_limit_base", self.short_limit_base)?;
        if let Some(expanded) = self.long_limit_expanded {
            check_limit(&self.name, "long_limit_expanded", expanded)?;
            if expanded < self.long_limit_base {
                return Err(RiskError::InvalidConfig(format!(
                    "session '{}': long_limit_expanded {expanded} is below long_limit_base {}",
                    self.name, self.long_limit_base
                )));
            }
        }
        Ok(())
    }
}

fn check_limit(session: &str, field: &str, value: f64) -> Result<(), RiskError> {
    if !value.is_finite() || value < 0.0 {
        return Err(RiskError::InvalidConfig(format!(
            "session '{session}': {field} must be a finite non-negative percent, got {value}"
        )));
    }
    Ok(())
}

/// Realized result of one session close.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionOutcome {
    pub session_name: String,
    pub realized_pnl_percent: f64,
}

impl SessionOutcome {
    pub fn new(session_name: impl Into<String>, realized_pnl_percent: f64) -> Self {
        Self {
            session_name: session_name.into(),
            realized_pnl_percent,
        }
    }

    /// Flat counts as green.
    pub fn is_non_negative(&self) -> bool {
        self.realized_pnl_percent >= 0.0
    }
}
