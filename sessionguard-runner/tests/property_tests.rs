//! Property tests for cycle rollover and feed resolution.
//!
//! 1. Cycle dates never move backwards as time advances
//! 2. A cycle changes exactly when the trigger opens
//! 3. Complete snapshots resolve without fallbacks
//! 4. The contango proxy never manufactures a stress signal

use chrono::{Duration, NaiveTime, TimeZone, Utc};
use proptest::prelude::*;
use sessionguard_runner::{CycleCalendar, FeedPolicy, FeedSnapshot};

fn tokyo_calendar() -> CycleCalendar {
    CycleCalendar::new(chrono_tz::Asia::Tokyo, NaiveTime::from_hms_opt(8, 0, 0).unwrap())
}

proptest! {
    #[test]
    fn cycle_dates_are_monotone(a in 0i64..(60 * 24 * 60), b in 0i64..(60 * 24 * 60)) {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        let calendar = tokyo_calendar();
        prop_assert!(
            calendar.cycle_date(base + Duration::minutes(lo))
                <= calendar.cycle_date(base + Duration::minutes(hi))
        );
    }

    #[test]
    fn cycle_changes_only_at_trigger_open(minutes in 0i64..(60 * 24 * 60)) {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let now = base + Duration::minutes(minutes);
        let calendar = tokyo_calendar();
        let changed = calendar.cycle_date(now) != calendar.cycle_date(now - Duration::minutes(1));
        // 08:00 JST is 23:00 UTC
        let at_open = now.with_timezone(&chrono_tz::Asia::Tokyo).time()
            == NaiveTime::from_hms_opt(8, 0, 0).unwrap();
        prop_assert_eq!(changed, at_open);
    }

    #[test]
    fn complete_snapshots_need_no_fallbacks(level in 0.0..100.0_f64, reference in 0.0..100.0_f64) {
        let now = Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap();
        let resolved = FeedPolicy::default()
            .resolve(&FeedSnapshot::complete(level, reference, now), now)
            .unwrap();
        prop_assert!(!resolved.is_degraded());
        prop_assert_eq!(resolved.reading.level, level);
    }

    #[test]
    fn contango_proxy_is_never_backwardated(level in 0.0..100.0_f64) {
        let now = Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap();
        let resolved = FeedPolicy::default()
            .resolve(&FeedSnapshot::new(Some(level), None, now), now)
            .unwrap();
        prop_assert!(resolved.is_degraded());
        prop_assert!(!resolved.reading.is_backwardated());
    }
}
