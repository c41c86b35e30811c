//! SessionGuard Core: session clock, sequencer, volatility regimes, risk gate.
//!
//! This crate bounds position size; it never decides direction or timing:
//! - Session clock: which time-zone-scoped window is open, if any
//! - Session sequencer: per-session limits with trigger-gated long expansion
//!   and the overnight flatten rule
//! - Volatility regime classifier: threshold bands, stress penalty, hard pause
//! - Risk gate: stateless composition of the two into an effective limit

pub mod clock;
pub mod domain;
pub mod error;
pub mod gate;
pub mod regime;
pub mod sequencer;

pub use clock::{FixedClock, SessionClock, SessionStatus, SystemClock, TimeSource};
pub use domain::{
    Direction, RegimeBand, RegimeClassification, SessionDefinition, SessionOutcome,
    VolatilityReading,
};
pub use error::RiskError;
pub use gate::{GateDecision, RiskGate, SizingDecision};
pub use regime::{Regime, VolatilityRegimeClassifier};
pub use sequencer::{resolve_limit, OutcomeTable, SessionLimit, SessionSequencer};
