//! Error taxonomy for the risk core.
//!
//! Only genuine failures live here. "No active session" and "trigger outcome not
//! yet recorded" are ordinary values, see [`crate::clock::SessionStatus`] and
//! [`crate::sequencer::SessionSequencer::expansion_active`].

use chrono::NaiveDate;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RiskError {
    /// A market/session name that is not in the configured definitions.
    #[error("unknown session '{0}'")]
    UnknownSession(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid outcome for session '{session}': {pnl_percent}")]
    InvalidOutcome { session: String, pnl_percent: f64 },

    /// An outcome whose cycle is older than the one the table already holds.
    #[error("outcome for session '{session}' belongs to cycle {cycle}, current cycle is {current}")]
    StaleOutcome {
        session: String,
        cycle: NaiveDate,
        current: NaiveDate,
    },

    #[error("invalid volatility reading: {0}")]
    InvalidReading(String),
}
