//! Property tests for the risk core invariants.
//!
//! Uses proptest to verify:
//! 1. Half-open windows: membership matches `open <= t < close` (or its wrap)
//! 2. Trigger isolation: the trigger's long limit ignores its own outcome
//! 3. Expansion proof: downstream longs expand iff trigger outcome >= 0
//! 4. Short invariance: shorts ignore every outcome
//! 5. Regime monotonicity: severity never decreases as the level rises
//! 6. Stress: never raises the multiplier, product stays in (0, 1]
//! 7. Flatten: true iff no session is open and positions are held

use chrono::{Duration, NaiveTime, TimeZone, Utc};
use proptest::prelude::*;
use sessionguard_core::{
    Direction, SessionClock, SessionDefinition, SessionSequencer, SessionStatus,
    VolatilityRegimeClassifier,
};

// ── Helpers ──────────────────────────────────────────────────────────

fn minute_of_day(m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(m / 60, m % 60, 0).unwrap()
}

fn sequencer() -> SessionSequencer {
    let t = |h, m| NaiveTime::from_hms_opt(h, m, 0).unwrap();
    SessionSequencer::new(
        vec![
            SessionDefinition::new("nikkei", chrono_tz::Asia::Tokyo, t(8, 0), t(14, 0), "NKD", 4.0, 1.0),
            SessionDefinition::new("dax", chrono_tz::Europe::Berlin, t(8, 0), t(15, 30), "FDAX", 1.5, 0.5)
                .with_expanded_long(2.0),
            SessionDefinition::new("nasdaq", chrono_tz::America::New_York, t(9, 30), t(16, 0), "NQ", 2.0, 2.5)
                .with_expanded_long(3.0),
        ],
        None,
    )
    .unwrap()
}

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_pnl() -> impl Strategy<Value = f64> {
    (-10.0..10.0_f64).prop_map(|p| (p * 100.0).round() / 100.0)
}

fn arb_level() -> impl Strategy<Value = f64> {
    0.0..120.0_f64
}

// ── 1. Half-open windows ─────────────────────────────────────────────

proptest! {
    /// In a fixed-offset zone the clock agrees with plain minute arithmetic.
    #[test]
    fn clock_matches_half_open_interval(
        open in 0u32..1440,
        close in 0u32..1440,
        at in 0u32..1440,
    ) {
        prop_assume!(open != close);
        let def = SessionDefinition::new(
            "s", chrono_tz::Asia::Tokyo, minute_of_day(open), minute_of_day(close), "X", 1.0, 1.0,
        );
        // Tokyo has no DST: local = UTC + 9h.
        let midnight_local = Utc.with_ymd_and_hms(2024, 3, 10, 15, 0, 0).unwrap();
        let now = midnight_local + Duration::minutes(i64::from(at));

        let expected = if open < close {
            open <= at && at < close
        } else {
            at >= open || at < close
        };
        let status = SessionClock::active_session(now, std::slice::from_ref(&def));
        prop_assert_eq!(status.is_active(), expected);
    }
}

// ── 2–4. Sequencer limits ────────────────────────────────────────────

proptest! {
    #[test]
    fn trigger_never_self_expands(pnl in arb_pnl()) {
        let seq = sequencer();
        seq.record_outcome("nikkei", pnl).unwrap();
        prop_assert_eq!(seq.limit("nikkei", Direction::Long).unwrap(), 4.0);
    }

    #[test]
    fn downstream_expands_iff_trigger_green(pnl in arb_pnl()) {
        let seq = sequencer();
        seq.record_outcome("nikkei", pnl).unwrap();
        let expected = if pnl >= 0.0 { 3.0 } else { 2.0 };
        prop_assert_eq!(seq.limit("nasdaq", Direction::Long).unwrap(), expected);
    }

    #[test]
    fn downstream_outcomes_never_expand(pnl in arb_pnl()) {
        let seq = sequencer();
        seq.record_outcome("dax", pnl).unwrap();
        prop_assert_eq!(seq.limit("nasdaq", Direction::Long).unwrap(), 2.0);
    }

    #[test]
    fn shorts_ignore_outcomes(pnls in proptest::collection::vec(arb_pnl(), 0..3)) {
        let seq = sequencer();
        for (name, pnl) in ["nikkei", "dax", "nasdaq"].iter().zip(pnls) {
            seq.record_outcome(name, pnl).unwrap();
        }
        prop_assert_eq!(seq.limit("nikkei", Direction::Short).unwrap(), 1.0);
        prop_assert_eq!(seq.limit("dax", Direction::Short).unwrap(), 0.5);
        prop_assert_eq!(seq.limit("nasdaq", Direction::Short).unwrap(), 2.5);
    }
}

// ── 5–6. Regime classifier ───────────────────────────────────────────

proptest! {
    #[test]
    fn severity_is_monotone(a in arb_level(), b in arb_level()) {
        let c = VolatilityRegimeClassifier::reference();
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(c.classify(lo).severity <= c.classify(hi).severity);
    }

    #[test]
    fn every_level_lands_in_exactly_one_band(level in arb_level()) {
        let c = VolatilityRegimeClassifier::reference();
        let bands = c.bands();
        let containing: Vec<usize> = (0..bands.len())
            .filter(|&i| {
                let lower = if i == 0 { f64::NEG_INFINITY } else { bands[i - 1].upper_bound.unwrap() };
                let upper = bands[i].upper_bound.unwrap_or(f64::INFINITY);
                lower <= level && level < upper
            })
            .collect();
        prop_assert_eq!(containing, vec![c.classify(level).severity]);
    }

    #[test]
    fn stress_never_raises_multiplier(level in arb_level(), reference in arb_level()) {
        let c = VolatilityRegimeClassifier::reference();
        let calm = c.multiplier(level, None);
        let with_reference = c.multiplier(level, Some(reference));
        prop_assert!(with_reference <= calm);
        prop_assert!(with_reference > 0.0 && with_reference <= 1.0);
    }
}

// ── 7. Flatten ───────────────────────────────────────────────────────

proptest! {
    #[test]
    fn flatten_iff_gap_and_positions(minutes in 0i64..(7 * 24 * 60), has_positions in any::<bool>()) {
        let seq = sequencer();
        let now = Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap() + Duration::minutes(minutes);
        let in_gap = seq.active_session(now) == SessionStatus::NoActiveSession;
        prop_assert_eq!(seq.flatten_required(now, has_positions), in_gap && has_positions);
    }
}
