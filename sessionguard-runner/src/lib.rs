//! SessionGuard Runner: configuration, feed policy, monitoring and reports.
//!
//! This crate builds on `sessionguard-core` to provide:
//! - TOML risk configuration with validation, fingerprinting and overlap checks
//! - Volatility feed trait with an explicit, logged fallback policy
//! - Cycle rollover on the trigger session's calendar
//! - Status reports (text/JSON) and limit grids (CSV)

pub mod config;
pub mod feed;
pub mod monitor;
pub mod report;

pub use config::{
    ConfigError, ConfigFingerprint, OverlapWarning, RegimeConfig, RiskComponents, RiskConfig,
    DEFAULT_CONFIG_FILE,
};
pub use feed::{
    AppliedFallback, FeedError, FeedPolicy, FeedSnapshot, MissingLevelPolicy,
    MissingTermStructurePolicy, ResolvedReading, StaticFeed, VolatilityFeed, VolatilityHistory,
};
pub use monitor::{CycleCalendar, MonitorDecision, MonitorError, RiskMonitor};
pub use report::{
    limit_grid, limit_grid_csv, write_limit_grid_csv, GridRow, SessionRow, StatusReport,
    VolatilityStatus,
};
