use llm_relay::domain::{TimePoint, Timing};
use proptest::prelude::*;

/// Epoch milliseconds from 1970 to roughly year 2500
fn epoch_millis() -> impl Strategy<Value = i64> {
    0i64..16_725_225_600_000
}

proptest! {
    #[test]
    fn time_point_round_trips(millis in epoch_millis()) {
        let point = TimePoint::from_epoch_millis(millis);
        prop_assert_eq!(point.epoch_millis(), millis);
        prop_assert!((0..1000).contains(&point.milliseconds));
    }

    #[test]
    fn duration_is_end_minus_start(start in epoch_millis(), elapsed in 0i64..3_600_000) {
        let timing = Timing::from_epoch_millis(start, start + elapsed);
        prop_assert_eq!(timing.duration_millis(), elapsed);
    }

    #[test]
    fn timing_survives_wire_format(start in epoch_millis(), elapsed in 0i64..3_600_000) {
        let timing = Timing::from_epoch_millis(start, start + elapsed);
        let wire = serde_json::to_value(timing).unwrap();

        prop_assert!(wire["startTime"]["seconds"].is_i64());
        prop_assert!(wire["endTime"]["milliseconds"].is_i64());
        let decoded: Timing = serde_json::from_value(wire).unwrap();
        prop_assert_eq!(decoded, timing);
    }
}
