//! Status reports and limit grids: JSON, plain text and CSV.
//!
//! Reports are built from a [`RiskMonitor`] at one instant and are never fed
//! back into any decision.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use sessionguard_core::{
    resolve_limit, Direction, RegimeClassification, RiskError, SessionStatus, VolatilityReading,
};

use crate::feed::{AppliedFallback, FeedSnapshot};
use crate::monitor::RiskMonitor;

// ─── Status report ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionRow {
    pub name: String,
    pub instrument_id: String,
    /// IANA zone name.
    pub time_zone: String,
    /// Local civil time, `HH:MM`.
    pub open_time: String,
    pub close_time: String,
    /// Window contains the report instant.
    pub is_open: bool,
    pub is_trigger: bool,
    /// Outcome recorded in the current cycle, if any.
    pub outcome_pnl_percent: Option<f64>,
    /// Long limit before the regime multiplier, expansion applied.
    pub long_limit: f64,
    pub long_expanded: bool,
    /// Short limit before the regime multiplier. Shorts never expand.
    pub short_limit: f64,
    /// Limits after the regime multiplier; absent when no reading resolved.
    pub effective_long: Option<f64>,
    pub effective_short: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VolatilityStatus {
    pub reading: VolatilityReading,
    pub observed_at: DateTime<Utc>,
    pub classification: RegimeClassification,
    pub fallbacks: Vec<AppliedFallback>,
    pub trading_allowed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusReport {
    pub generated_at: DateTime<Utc>,
    pub cycle: Option<NaiveDate>,
    pub session_status: SessionStatus,
    pub trigger_session: String,
    pub expansion_active: bool,
    pub has_open_positions: bool,
    pub flatten_required: bool,
    pub volatility: Option<VolatilityStatus>,
    pub feed_error: Option<String>,
    pub moving_average: Option<f64>,
    /// Levels in the moving-average window and the window size.
    pub history_samples: usize,
    pub history_window: usize,
    pub sessions: Vec<SessionRow>,
    pub config_fingerprint: Option<String>,
}

impl StatusReport {
    pub fn build(
        monitor: &RiskMonitor,
        now: DateTime<Utc>,
        snapshot: Option<&FeedSnapshot>,
        has_open_positions: bool,
    ) -> Self {
        let sequencer = monitor.sequencer();

        let (volatility, feed_error) = match snapshot.map(|s| monitor.resolve(s, now)) {
            Some(Ok(resolved)) => {
                let classification = monitor.classifier().assess(&resolved.reading);
                let status = VolatilityStatus {
                    trading_allowed: monitor.classifier().allows_trading(resolved.reading.level),
                    reading: resolved.reading,
                    observed_at: resolved.observed_at,
                    classification,
                    fallbacks: resolved.fallbacks,
                };
                (Some(status), None)
            }
            Some(Err(e)) => (None, Some(e.to_string())),
            None => (None, Some("no volatility reading supplied".to_string())),
        };
        let multiplier = volatility.as_ref().map(|v| v.classification.final_multiplier);

        // One read of the outcome table: cycle, outcomes, the expansion flag and
        // every row come from the same state.
        let table = sequencer.snapshot();
        let expansion_active = table.proves_expansion(sequencer.trigger_session());

        let sessions = sequencer
            .definitions()
            .iter()
            .map(|def| {
                let is_trigger = sequencer.is_trigger(&def.name);
                let (long_limit, long_expanded) =
                    resolve_limit(def, Direction::Long, is_trigger, expansion_active);
                let (short_limit, _) =
                    resolve_limit(def, Direction::Short, is_trigger, expansion_active);
                SessionRow {
                    name: def.name.clone(),
                    instrument_id: def.instrument_id.clone(),
                    time_zone: def.time_zone.name().to_string(),
                    open_time: def.open_time.format("%H:%M").to_string(),
                    close_time: def.close_time.format("%H:%M").to_string(),
                    is_open: def.is_open_at(now),
                    is_trigger,
                    outcome_pnl_percent: table.get(&def.name).map(|o| o.realized_pnl_percent),
                    long_limit,
                    long_expanded,
                    short_limit,
                    effective_long: multiplier.map(|m| long_limit * m),
                    effective_short: multiplier.map(|m| short_limit * m),
                }
            })
            .collect();

        let (history_samples, history_window) = monitor.history_fill();
        Self {
            generated_at: now,
            cycle: table.cycle(),
            session_status: sequencer.active_session(now),
            trigger_session: sequencer.trigger_session().to_string(),
            expansion_active,
            has_open_positions,
            flatten_required: sequencer.flatten_required(now, has_open_positions),
            volatility,
            feed_error,
            moving_average: monitor.moving_average(),
            history_samples,
            history_window,
            sessions,
            config_fingerprint: monitor.fingerprint().map(str::to_string),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("failed to serialize status report to JSON")
    }

    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let rule = "=".repeat(70);

        let _ = writeln!(out, "{rule}");
        let _ = writeln!(out, "SESSION RISK STATUS  {}", self.generated_at.format("%Y-%m-%d %H:%M UTC"));
        let _ = writeln!(out, "{rule}");

        let cycle = self
            .cycle
            .map(|c| c.to_string())
            .unwrap_or_else(|| "not started".into());
        let _ = writeln!(out, "Active session:     {}", self.session_status);
        let _ = writeln!(out, "Cycle:              {cycle}");
        let _ = writeln!(
            out,
            "Expansion:          {} (trigger: {})",
            if self.expansion_active { "UNLOCKED" } else { "locked" },
            self.trigger_session
        );

        out.push_str("\nVOLATILITY\n");
        match (&self.volatility, &self.feed_error) {
            (Some(v), _) => {
                let _ = writeln!(out, "Level:              {:.2}", v.reading.level);
                match self.moving_average {
                    Some(ma) => {
                        let _ = writeln!(out, "Moving average:     {ma:.2}");
                    }
                    None => {
                        let _ = writeln!(
                            out,
                            "Moving average:     warming up ({}/{})",
                            self.history_samples, self.history_window
                        );
                    }
                }
                if let Some(reference) = v.reading.term_structure_reference {
                    let _ = writeln!(out, "Term reference:     {reference:.2}");
                }
                let c = &v.classification;
                let _ = writeln!(out, "Regime:             {}", c.regime_name.to_uppercase());
                let _ = writeln!(
                    out,
                    "Multiplier:         {:.2}x (base {:.2}x, stress {:.2}x)",
                    c.final_multiplier, c.base_multiplier, c.stress_multiplier
                );
                let _ = writeln!(out, "Reduction:          {:.0}%", (1.0 - c.final_multiplier) * 100.0);
                for fallback in &v.fallbacks {
                    let _ = writeln!(out, "Fallback:           {fallback}");
                }
                let _ = writeln!(
                    out,
                    "Trading status:     {}",
                    if v.trading_allowed { "ACTIVE" } else { "PAUSED (extreme volatility)" }
                );
            }
            (None, Some(e)) => {
                let _ = writeln!(out, "Unavailable:        {e}");
            }
            (None, None) => {}
        }

        out.push_str("\nLIMITS (% of portfolio)\n");
        let _ = writeln!(
            out,
            "{:<10} {:<6} {:<17} {:>11} {:>7} {:>7} {:>9} {:>9}",
            "session", "inst", "window", "outcome", "long", "short", "eff long", "eff short"
        );
        for row in &self.sessions {
            let marker = if row.is_open { "*" } else { " " };
            let window = format!("{}-{} {}", row.open_time, row.close_time, short_zone(&row.time_zone));
            let outcome = row
                .outcome_pnl_percent
                .map(|p| format!("{p:+.2}%"))
                .unwrap_or_else(|| "-".into());
            let long = format!("{:.2}{}", row.long_limit, if row.long_expanded { "+" } else { "" });
            let fmt_opt = |v: Option<f64>| v.map(|x| format!("{x:.2}")).unwrap_or_else(|| "-".into());
            let _ = writeln!(
                out,
                "{marker}{:<9} {:<6} {:<17} {:>11} {:>7} {:>7.2} {:>9} {:>9}",
                row.name,
                row.instrument_id,
                window,
                outcome,
                long,
                row.short_limit,
                fmt_opt(row.effective_long),
                fmt_opt(row.effective_short),
            );
        }

        out.push('\n');
        if self.flatten_required {
            out.push_str("FLATTEN REQUIRED: no active session and positions are open\n");
        } else if !self.session_status.is_active() {
            out.push_str("No active session: new exposure must stay flat\n");
        }
        if let Some(fp) = &self.config_fingerprint {
            let _ = writeln!(out, "Config:             {}", &fp[..fp.len().min(12)]);
        }
        let _ = writeln!(out, "{rule}");
        out
    }
}

/// Last path segment of an IANA zone name ("America/New_York" -> "New_York").
fn short_zone(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}

// ─── Limit grid ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GridRow {
    pub market: String,
    pub instrument_id: String,
    pub direction: Direction,
    /// Session limit with expansion applied, before the regime multiplier.
    pub base_limit: f64,
    pub expanded: bool,
    /// Regime band name for the reading.
    pub regime: String,
    /// Final multiplier, stress included.
    pub multiplier: f64,
    /// `base_limit * multiplier`, percent of portfolio.
    pub effective_limit: f64,
}

/// Every market and direction under `reading`, in session order, decided
/// against one snapshot of the outcome table.
pub fn limit_grid(monitor: &RiskMonitor, reading: &VolatilityReading) -> Result<Vec<GridRow>, RiskError> {
    reading.validate()?;
    let classification = monitor.classifier().assess(reading);
    let sequencer = monitor.sequencer();
    let proven = sequencer.snapshot().proves_expansion(sequencer.trigger_session());

    let mut rows = Vec::with_capacity(sequencer.definitions().len() * Direction::ALL.len());
    for def in sequencer.definitions() {
        let is_trigger = sequencer.is_trigger(&def.name);
        for direction in Direction::ALL {
            let (base_limit, expanded) = resolve_limit(def, direction, is_trigger, proven);
            rows.push(GridRow {
                market: def.name.clone(),
                instrument_id: def.instrument_id.clone(),
                direction,
                base_limit,
                expanded,
                regime: classification.regime_name.clone(),
                multiplier: classification.final_multiplier,
                effective_limit: base_limit * classification.final_multiplier,
            });
        }
    }
    Ok(rows)
}

/// Columns: market, instrument_id, direction, base_limit, expanded, regime,
/// multiplier, effective_limit
pub fn limit_grid_csv(rows: &[GridRow]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);

    wtr.write_record([
        "market",
        "instrument_id",
        "direction",
        "base_limit",
        "expanded",
        "regime",
        "multiplier",
        "effective_limit",
    ])?;

    for r in rows {
        let base = format!("{:.4}", r.base_limit);
        let multiplier = format!("{:.4}", r.multiplier);
        let effective = format!("{:.4}", r.effective_limit);
        wtr.write_record([
            r.market.as_str(),
            r.instrument_id.as_str(),
            r.direction.as_str(),
            base.as_str(),
            if r.expanded { "true" } else { "false" },
            r.regime.as_str(),
            multiplier.as_str(),
            effective.as_str(),
        ])?;
    }

    let data = wtr
        .into_inner()
        .map_err(|e| anyhow::anyhow!("failed to flush CSV writer: {e}"))?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

pub fn write_limit_grid_csv(rows: &[GridRow], path: &Path) -> Result<()> {
    let csv = limit_grid_csv(rows)?;
    fs::write(path, csv).with_context(|| format!("failed to write {}", path.display()))
}
