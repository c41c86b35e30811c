//! Domain types for SessionGuard

pub mod session;
pub mod volatility;

pub use session::{Direction, SessionDefinition, SessionOutcome};
pub use volatility::{RegimeBand, RegimeClassification, VolatilityReading};
