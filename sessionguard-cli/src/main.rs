//! SessionGuard CLI: session risk status, limits and config management.
//!
//! Commands:
//! - `status`: full status report, as text or JSON
//! - `limit`: effective limit for one market and direction
//! - `flatten`: overnight rule; exits with status 2 when a flatten is due
//! - `grid`: every market and direction as CSV
//! - `config init`: write the reference configuration
//! - `config check`: validate a config, print its fingerprint and overlaps

mod logging;

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use tracing::{error, info, warn};

use sessionguard_core::{Direction, FixedClock, SystemClock, TimeSource};
use sessionguard_runner::{
    limit_grid, limit_grid_csv, write_limit_grid_csv, FeedSnapshot, RiskConfig, RiskMonitor,
    StatusReport, DEFAULT_CONFIG_FILE,
};

use crate::logging::{init_logging, level_for, LogFormat};

/// Exit status of `flatten` when open positions must be closed.
const EXIT_FLATTEN_REQUIRED: i32 = 2;

#[derive(Parser)]
#[command(
    name = "sessionguard",
    about = "SessionGuard: session-sequenced position limits with volatility regimes"
)]
struct Cli {
    /// Risk config file. Defaults to ./sessionguard.toml, or the built-in
    /// reference layout when that file does not exist.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log output format (logs go to stderr).
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,

    /// Increase log verbosity (-v debug, -vv trace). RUST_LOG overrides.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Clone)]
struct CycleArgs {
    /// Evaluation instant (RFC 3339, e.g. 2024-01-15T15:00:00Z). Defaults to now.
    #[arg(long)]
    at: Option<DateTime<Utc>>,

    /// Realized outcome for the current cycle as name=pnl_percent. Repeatable.
    #[arg(long = "outcome", value_parser = parse_outcome)]
    outcomes: Vec<(String, f64)>,
}

#[derive(Args, Debug, Clone)]
struct FeedArgs {
    /// Current volatility level (e.g. VIX).
    #[arg(long)]
    level: Option<f64>,

    /// Longer-dated reference for the term structure (e.g. VIX3M).
    #[arg(long)]
    term: Option<f64>,

    /// When the feed values were observed (RFC 3339). Defaults to --at.
    #[arg(long)]
    observed_at: Option<DateTime<Utc>>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the status report: active session, limits, regime, flatten flag.
    Status {
        #[command(flatten)]
        cycle: CycleArgs,

        #[command(flatten)]
        feed: FeedArgs,

        /// Positions are currently open.
        #[arg(long, default_value_t = false)]
        positions: bool,

        /// Earlier volatility levels, oldest first, for the moving average
        /// (e.g. --history 17.2,18.0,19.4).
        #[arg(long, value_delimiter = ',')]
        history: Vec<f64>,

        /// Emit JSON instead of text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Effective limit for one market and direction.
    Limit {
        /// Session name (e.g. nasdaq).
        market: String,

        /// long or short.
        direction: Direction,

        #[command(flatten)]
        cycle: CycleArgs,

        #[command(flatten)]
        feed: FeedArgs,
    },
    /// Evaluate the overnight rule. Exits with status 2 when a flatten is required.
    Flatten {
        /// Evaluation instant (RFC 3339). Defaults to now.
        #[arg(long)]
        at: Option<DateTime<Utc>>,

        /// Positions are currently open.
        #[arg(long, default_value_t = false)]
        positions: bool,
    },
    /// Limit grid for every market and direction, as CSV.
    Grid {
        #[command(flatten)]
        cycle: CycleArgs,

        #[command(flatten)]
        feed: FeedArgs,

        /// Write to this file instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Config file management.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write the reference configuration.
    Init {
        /// Destination. Defaults to ./sessionguard.toml.
        #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
        path: PathBuf,

        /// Overwrite an existing file.
        #[arg(long, default_value_t = false)]
        force: bool,
    },
    /// Validate a config, print its fingerprint and any overlapping windows.
    Check {
        /// First UTC day to scan for overlaps (YYYY-MM-DD). Defaults to today.
        #[arg(long)]
        date: Option<NaiveDate>,

        /// Number of consecutive days to scan.
        #[arg(long, default_value_t = 1)]
        days: u32,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_format, level_for(cli.verbose));

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Status {
            cycle,
            feed,
            positions,
            history,
            json,
        } => run_status(config_path, &cycle, &feed, positions, &history, json),
        Commands::Limit {
            market,
            direction,
            cycle,
            feed,
        } => run_limit(config_path, &market, direction, &cycle, &feed),
        Commands::Flatten { at, positions } => run_flatten(config_path, at, positions),
        Commands::Grid {
            cycle,
            feed,
            output,
        } => run_grid(config_path, &cycle, &feed, output.as_deref()),
        Commands::Config { action } => match action {
            ConfigAction::Init { path, force } => run_config_init(&path, force),
            ConfigAction::Check { date, days } => run_config_check(config_path, date, days),
        },
    }
}

fn parse_outcome(s: &str) -> Result<(String, f64), String> {
    let (name, pnl) = s
        .split_once('=')
        .ok_or_else(|| format!("expected name=pnl_percent, got '{s}'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("missing session name in '{s}'"));
    }
    let pnl: f64 = pnl
        .trim()
        .parse()
        .map_err(|e| format!("invalid pnl in '{s}': {e}"))?;
    Ok((name.to_string(), pnl))
}

fn clock(at: Option<DateTime<Utc>>) -> Box<dyn TimeSource> {
    match at {
        Some(instant) => Box::new(FixedClock::new(instant)),
        None => Box::new(SystemClock),
    }
}

fn load_config(path: Option<&Path>) -> Result<RiskConfig> {
    if let Some(path) = path {
        return RiskConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()));
    }
    let default_path = Path::new(DEFAULT_CONFIG_FILE);
    if default_path.exists() {
        return Ok(RiskConfig::from_file(default_path)?);
    }
    info!("no {DEFAULT_CONFIG_FILE} found, using the built-in reference layout");
    Ok(RiskConfig::default())
}

/// Load the config, start the cycle `now` belongs to and apply `--outcome`s.
fn prepare(config_path: Option<&Path>, now: DateTime<Utc>, outcomes: &[(String, f64)]) -> Result<RiskMonitor> {
    let config = load_config(config_path)?;
    let monitor = RiskMonitor::from_config(&config)?;
    monitor.roll_cycle(now);
    for overlap in config.overlap_warnings(now.date_naive()) {
        warn!(%overlap, "session windows overlap");
    }
    for (name, pnl) in outcomes {
        monitor.close_session(name, *pnl, now)?;
    }
    Ok(monitor)
}

fn snapshot(feed: &FeedArgs, now: DateTime<Utc>) -> FeedSnapshot {
    FeedSnapshot::new(feed.level, feed.term, feed.observed_at.unwrap_or(now))
}

fn run_status(
    config_path: Option<&Path>,
    cycle: &CycleArgs,
    feed: &FeedArgs,
    positions: bool,
    history: &[f64],
    json: bool,
) -> Result<()> {
    let now = clock(cycle.at).now();
    let monitor = prepare(config_path, now, &cycle.outcomes)?;
    for level in history {
        monitor.record_level(*level);
    }
    let report = StatusReport::build(&monitor, now, Some(&snapshot(feed, now)), positions);
    if report.flatten_required {
        error!(%now, "no active session with open positions: flatten required");
    }

    if json {
        println!("{}", report.to_json()?);
    } else {
        print!("{}", report.render_text());
    }
    Ok(())
}

fn run_limit(
    config_path: Option<&Path>,
    market: &str,
    direction: Direction,
    cycle: &CycleArgs,
    feed: &FeedArgs,
) -> Result<()> {
    let now = clock(cycle.at).now();
    let monitor = prepare(config_path, now, &cycle.outcomes)?;
    let decision = monitor.evaluate(market, direction, now, &snapshot(feed, now), false);
    let sizing = decision
        .sizing
        .with_context(|| format!("cannot size {market} {direction}"))?;

    let c = &sizing.classification;
    println!(
        "{} {}: {:.2}%{} x {:.2} [{}{}] = {:.2}% of portfolio",
        sizing.market,
        sizing.direction,
        sizing.base_limit,
        if sizing.expanded { " (expanded)" } else { "" },
        c.final_multiplier,
        c.regime_name,
        if c.is_stressed() { ", backwardation" } else { "" },
        sizing.effective_limit
    );
    for fallback in &decision.fallbacks {
        println!("  fallback: {fallback}");
    }
    if !sizing.trading_allowed {
        println!("  trading PAUSED: volatility at or above the extreme level");
    }
    if !decision.session_status.is_active() {
        println!("  no active session: new exposure must stay flat");
    }
    Ok(())
}

fn run_flatten(config_path: Option<&Path>, at: Option<DateTime<Utc>>, positions: bool) -> Result<()> {
    let now = clock(at).now();
    let monitor = prepare(config_path, now, &[])?;
    let status = monitor.sequencer().active_session(now);
    let required = monitor.gate().flatten_required(now, positions);

    println!("{}: {status}", now.format("%Y-%m-%d %H:%M UTC"));
    if required {
        error!(%now, "no active session with open positions: flatten required");
        println!("FLATTEN REQUIRED");
        std::process::exit(EXIT_FLATTEN_REQUIRED);
    }
    if positions {
        println!("positions may be held");
    } else {
        println!("no positions, nothing to flatten");
    }
    Ok(())
}

fn run_grid(
    config_path: Option<&Path>,
    cycle: &CycleArgs,
    feed: &FeedArgs,
    output: Option<&Path>,
) -> Result<()> {
    let now = clock(cycle.at).now();
    let monitor = prepare(config_path, now, &cycle.outcomes)?;
    let resolved = monitor
        .resolve(&snapshot(feed, now), now)
        .context("cannot resolve a volatility reading for the grid")?;
    let rows = limit_grid(&monitor, &resolved.reading)?;

    match output {
        Some(path) => {
            write_limit_grid_csv(&rows, path)?;
            println!("Limit grid written to {}", path.display());
        }
        None => print!("{}", limit_grid_csv(&rows)?),
    }
    Ok(())
}

fn run_config_init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    let config = RiskConfig::default();
    config.write_file(path)?;
    println!("Wrote {}", path.display());
    println!("Fingerprint: {}", config.fingerprint()?);
    Ok(())
}

fn run_config_check(config_path: Option<&Path>, date: Option<NaiveDate>, days: u32) -> Result<()> {
    let config = load_config(config_path)?;
    let components = config.build()?;
    let sequencer = &components.sequencer;

    println!("Config OK");
    println!("Fingerprint: {}", config.fingerprint()?);
    println!("Trigger:     {}", sequencer.trigger_session());
    for def in sequencer.definitions() {
        let expanded = def
            .long_limit_expanded
            .map(|x| format!(" / expanded {x:.2}"))
            .unwrap_or_default();
        println!(
            "  {:<10} {:<6} {}-{} {:<20} long {:.2}{expanded}, short {:.2}",
            def.name,
            def.instrument_id,
            def.open_time.format("%H:%M"),
            def.close_time.format("%H:%M"),
            def.time_zone.name(),
            def.long_limit_base,
            def.short_limit_base,
        );
    }
    for band in components.classifier.bands() {
        let bound = band
            .upper_bound
            .map(|b| format!("< {b:.1}"))
            .unwrap_or_else(|| "above".into());
        println!("  regime {:<10} {:<8} x{:.2}", band.name, bound, band.multiplier);
    }

    let start = date.unwrap_or_else(|| Utc::now().date_naive());
    let mut overlaps = 0usize;
    for offset in 0..days.max(1) {
        let day = start + Duration::days(i64::from(offset));
        for overlap in config.overlap_warnings(day) {
            warn!(%overlap, "session windows overlap");
            println!("WARNING: {overlap}");
            overlaps += 1;
        }
    }
    if overlaps == 0 {
        println!("No overlapping windows in {} day(s) from {start}", days.max(1));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_outcome_accepts_name_and_pnl() {
        assert_eq!(parse_outcome("nikkei=1.5"), Ok(("nikkei".to_string(), 1.5)));
        assert_eq!(parse_outcome(" dax = -0.25 "), Ok(("dax".to_string(), -0.25)));
    }

    #[test]
    fn parse_outcome_rejects_malformed_input() {
        assert!(parse_outcome("nikkei").is_err());
        assert!(parse_outcome("=1.0").is_err());
        assert!(parse_outcome("nikkei=green").is_err());
    }

    #[test]
    fn cli_parses_limit_command() {
        let cli = Cli::try_parse_from([
            "sessionguard",
            "limit",
            "nasdaq",
            "long",
            "--level",
            "18.5",
            "--outcome",
            "nikkei=1.5",
            "--at",
            "2024-01-15T15:00:00Z",
        ])
        .unwrap();
        match cli.command {
            Commands::Limit {
                market,
                direction,
                cycle,
                feed,
            } => {
                assert_eq!(market, "nasdaq");
                assert_eq!(direction, Direction::Long);
                assert_eq!(cycle.outcomes, vec![("nikkei".to_string(), 1.5)]);
                assert_eq!(feed.level, Some(18.5));
                assert!(cycle.at.is_some());
            }
            _ => panic!("expected limit command"),
        }
    }

    #[test]
    fn cli_parses_status_history() {
        let cli = Cli::try_parse_from([
            "sessionguard",
            "status",
            "--history",
            "17.2,18.0,19.4",
            "--json",
        ])
        .unwrap();
        match cli.command {
            Commands::Status { history, json, .. } => {
                assert_eq!(history, vec![17.2, 18.0, 19.4]);
                assert!(json);
            }
            _ => panic!("expected status command"),
        }
    }

    #[test]
    fn cli_parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "sessionguard",
            "flatten",
            "--positions",
            "--log-format",
            "json",
            "-vv",
        ])
        .unwrap();
        assert_eq!(cli.log_format, LogFormat::Json);
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.command, Commands::Flatten { positions: true, .. }));
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
