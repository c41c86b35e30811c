//! BDD scenarios for session sequencing, regimes and the risk gate.
//!
//! These tests walk one trading day through the three reference sessions:
//! - Session boundaries and the overnight gap
//! - Trigger-gated expansion and the cycle reset
//! - Regime scaling of the resulting limit

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use sessionguard_core::{
    Direction, RegimeBand, RiskGate, SessionDefinition, SessionSequencer, SessionStatus,
    VolatilityReading, VolatilityRegimeClassifier,
};

fn t(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

fn utc(d: u32, h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, d, h, m, 0).unwrap()
}

fn three_sessions() -> SessionSequencer {
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

#[test]
fn bdd_scenario_one_day_of_session_handoffs() {
    // GIVEN the three reference sessions in January (no DST anywhere)
    let seq = three_sessions();

    // WHEN the clock walks through a UTC day
    // THEN each window resolves in its own civil time, with gaps in between
    let expectations = [
        (utc(14, 23, 0), SessionStatus::Active("nikkei".into())), // 08:00 JST on the 15th
        (utc(15, 4, 59), SessionStatus::Active("nikkei".into())), // 13:59 JST
        (utc(15, 5, 0), SessionStatus::NoActiveSession),          // 14:00 JST close
        (utc(15, 6, 59), SessionStatus::NoActiveSession),         // 07:59 CET
        (utc(15, 7, 0), SessionStatus::Active("dax".into())),     // 08:00 CET
        (utc(15, 14, 29), SessionStatus::Active("dax".into())),   // 15:29 CET
        (utc(15, 14, 30), SessionStatus::Active("nasdaq".into())), // 15:30 CET close = 09:30 EST open
        (utc(15, 20, 59), SessionStatus::Active("nasdaq".into())), // 15:59 EST
        (utc(15, 21, 0), SessionStatus::NoActiveSession),         // 16:00 EST close
        (utc(15, 22, 59), SessionStatus::NoActiveSession),        // overnight gap
    ];
    for (instant, expected) in expectations {
        assert_eq!(seq.active_session(instant), expected, "at {instant}");
    }
}

#[test]
fn bdd_scenario_green_trigger_then_red_trigger() {
    // GIVEN a fresh cycle
    let seq = three_sessions();
    seq.start_cycle(NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());

    // WHEN the trigger closes +1.5%
    seq.record_outcome("nikkei", 1.5).unwrap();

    // THEN the downstream long limit with base 2.0 / expanded 3.0 returns 3.0
    assert_eq!(seq.limit("nasdaq", Direction::Long).unwrap(), 3.0);

    // WHEN the trigger outcome is corrected to -0.5%
    seq.record_outcome("nikkei", -0.5).unwrap();

    // THEN the same limit falls back to 2.0
    assert_eq!(seq.limit("nasdaq", Direction::Long).unwrap(), 2.0);
}

#[test]
fn bdd_scenario_missing_outcome_equals_red_outcome() {
    // GIVEN one sequencer where the trigger never closed this cycle
    let never_recorded = three_sessions();

    // AND one where it closed red
    let red = three_sessions();
    red.record_outcome("nikkei", -0.5).unwrap();

    // THEN every limit is identical
    assert_eq!(never_recorded.all_limits(), red.all_limits());
    assert_eq!(never_recorded.limit("nasdaq", Direction::Long).unwrap(), 2.0);
}

#[test]
fn bdd_scenario_stale_green_outcome_does_not_leak_into_next_day() {
    // GIVEN yesterday's trigger closed green
    let seq = three_sessions();
    seq.start_cycle(NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
    seq.record_outcome("nikkei", 2.0).unwrap();
    assert!(seq.expansion_active());

    // WHEN the next cycle starts explicitly
    seq.start_cycle(NaiveDate::from_ymd_opt(2024, 1, 16).unwrap());

    // THEN expansion needs fresh proof
    assert!(!seq.expansion_active());
    assert_eq!(seq.limit("dax", Direction::Long).unwrap(), 1.5);
}

#[test]
fn bdd_scenario_reference_regime_scales_expanded_limit() {
    // GIVEN thresholds {low:15, normal:20, elevated:30} and multipliers {1.00, 0.85, 0.65, 0.40}
    let classifier = VolatilityRegimeClassifier::new(
        vec![
            RegimeBand::bounded("low", 15.0, 1.00),
            RegimeBand::bounded("normal", 20.0, 0.85),
            RegimeBand::bounded("elevated", 30.0, 0.65),
            RegimeBand::terminal("crisis", 0.40),
        ],
        0.75,
        40.0,
    )
    .unwrap();
    let seq = three_sessions();
    seq.record_outcome("nikkei", 1.5).unwrap();
    let gate = RiskGate::new(&seq, &classifier);

    // WHEN the reading is 18.5 with no stress
    let reading = VolatilityReading::new(18.5);

    // THEN the regime is normal at 0.85 and nasdaq long is 3.0 * 0.85
    let assessed = classifier.assess(&reading);
    assert_eq!(assessed.regime_name, "normal");
    assert_eq!(assessed.final_multiplier, 0.85);
    let limit = gate.effective_limit("nasdaq", Direction::Long, &reading).unwrap();
    assert!((limit - 2.55).abs() < 1e-12);
}

#[test]
fn bdd_scenario_overnight_position_must_be_flattened() {
    // GIVEN positions are open during the overnight gap
    let seq = three_sessions();
    let classifier = VolatilityRegimeClassifier::reference();
    let gate = RiskGate::new(&seq, &classifier);
    let overnight = utc(15, 22, 0);

    // WHEN the gate evaluates, even in a calm regime
    let decision = gate.evaluate("nasdaq", Direction::Long, overnight, &VolatilityReading::new(11.0), true);

    // THEN flattening is required regardless of the healthy sizing result
    assert!(decision.flatten_required);
    assert!(decision.sizing.is_ok());

    // AND with no positions there is nothing to flatten
    assert!(!gate.flatten_required(overnight, false));
}
