//! Session clock: resolves which configured window is open at an instant.
//!
//! The clock is stateless: it converts an absolute UTC instant into each
//! definition's civil time and applies the half-open window test. "No session
//! active" is an ordinary result (the overnight gap), not an error.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::SessionDefinition;

/// Source of the current absolute instant.
pub trait TimeSource: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl TimeSource for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Frozen instant, for replay and tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    instant: DateTime<Utc>,
}

impl FixedClock {
    pub fn new(instant: DateTime<Utc>) -> Self {
        Self { instant }
    }
}

impl TimeSource for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.instant
    }
}

/// Result of a clock lookup.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "state", content = "session", rename_all = "snake_case")]
pub enum SessionStatus {
    Active(String),
    NoActiveSession,
}

impl SessionStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active(_))
    }

    pub fn session_name(&self) -> Option<&str> {
        match self {
            Self::Active(name) => Some(name),
            Self::NoActiveSession => None,
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active(name) => write!(f, "{name}"),
            Self::NoActiveSession => write!(f, "no active session"),
        }
    }
}

pub struct SessionClock;

impl SessionClock {
    /// Which session is open at `now`.
    ///
    /// Overlapping windows are not rejected here; the first matching
    /// definition in table order wins.
    pub fn active_session(now: DateTime<Utc>, definitions: &[SessionDefinition]) -> SessionStatus {
        match Self::active_definition(now, definitions) {
            Some(def) => SessionStatus::Active(def.name.clone()),
            None => SessionStatus::NoActiveSession,
        }
    }

    pub fn active_definition(
        now: DateTime<Utc>,
        definitions: &[SessionDefinition],
    ) -> Option<&SessionDefinition> {
        definitions.iter().find(|def| def.is_open_at(now))
    }

    /// Every definition open at `now`. More than one entry means the
    /// configuration overlaps at this instant.
    pub fn open_definitions(
        now: DateTime<Utc>,
        definitions: &[SessionDefinition],
    ) -> Vec<&SessionDefinition> {
        definitions.iter().filter(|def| def.is_open_at(now)).collect()
    }
}
