//! Property tests for sequence tracking and anomaly counting.
//!
//! The oracle is a plain list of every value seen per topic: an observation
//! after the second is an anomaly exactly when it differs from the successor
//! of the value seen just before it. The third observation is also an anomaly
//! when the second value did not follow the first.

use std::{collections::HashMap, sync::Arc};

use proptest::prelude::*;
use seqprobe_core::{
    ErrorPolicy, MODULUS, MessageOutcome, RunCounters, SequenceTracker, SequenceVerifier, Verdict,
    successor,
};

/// Whether appending `value` to `history` is an anomaly.
fn breaks_sequence(history: &[i64], value: i64) -> bool {
    match history {
        [] | [_] => false,
        [first, second] => *second != successor(*first) || value != successor(*second),
        [.., last] => value != successor(*last),
    }
}

/// One inbound message: topic index plus either a value or garbage.
#[derive(Debug, Clone)]
enum Input {
    Value(usize, i64),
    Garbage(usize, String),
}

fn input_strategy() -> impl Strategy<Value = Input> {
    prop_oneof![
        8 => (0usize..4, 0i64..MODULUS).prop_map(|(t, v)| Input::Value(t, v)),
        1 => (0usize..4, "[a-z]{1,4}").prop_map(|(t, s)| Input::Garbage(t, s)),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Property: the first two observations on a fresh topic always seed.
    #[test]
    fn prop_first_two_observations_seed(first in any::<i64>(), second in any::<i64>()) {
        let tracker = SequenceTracker::new();

        prop_assert_eq!(tracker.observe("t", first).verdict, Verdict::Seeding);
        prop_assert_eq!(tracker.observe("t", second).verdict, Verdict::Seeding);
    }

    /// Property: after seeding, an observation is an anomaly iff it is not the
    /// successor (mod 10) of the previously observed value, or it is the third
    /// and the seeded pair is broken.
    #[test]
    fn prop_anomaly_iff_not_successor(values in prop::collection::vec(0i64..MODULUS, 3..60)) {
        let tracker = SequenceTracker::new();

        for (i, &value) in values.iter().enumerate() {
            let verdict = tracker.observe("t", value).verdict;

            if i < 2 {
                prop_assert_eq!(verdict, Verdict::Seeding);
            } else {
                prop_assert_eq!(verdict.is_anomaly(), breaks_sequence(&values[..i], value), "index {}", i);
            }
        }
    }

    /// Property: the tracker keeps exactly the last two values, anomaly or not.
    #[test]
    fn prop_history_is_last_two_values(values in prop::collection::vec(any::<i64>(), 2..40)) {
        let tracker = SequenceTracker::new();
        for &value in &values {
            tracker.observe("t", value);
        }

        let state = tracker.snapshot("t");
        prop_assert_eq!(state.previous, Some(values[values.len() - 2]));
        prop_assert_eq!(state.actual, Some(values[values.len() - 1]));
    }

    /// Property: the error count equals anomaly verdicts plus malformed
    /// payloads, and never decreases.
    #[test]
    fn prop_error_count_is_exact(inputs in prop::collection::vec(input_strategy(), 0..120)) {
        let counters = Arc::new(RunCounters::new());
        let verifier = SequenceVerifier::new(ErrorPolicy::Count, Arc::clone(&counters));
        let mut seen: HashMap<usize, Vec<i64>> = HashMap::new();
        let mut expected_errors = 0u64;
        let mut last_count = 0u64;

        for input in inputs {
            let outcome = match input {
                Input::Value(t, v) => {
                    let history = seen.entry(t).or_default();
                    if breaks_sequence(history, v) {
                        expected_errors += 1;
                    }
                    history.push(v);
                    verifier.handle(&format!("p/{t}"), v.to_string().as_bytes())
                },
                Input::Garbage(t, s) => {
                    expected_errors += 1;
                    verifier.handle(&format!("p/{t}"), s.as_bytes())
                },
            };

            prop_assert!(!outcome.requires_abort());

            let count = counters.sequence_errors();
            prop_assert!(count >= last_count);
            prop_assert_eq!(count - last_count, u64::from(matches!(outcome, MessageOutcome::Anomaly { .. })));
            last_count = count;
        }

        prop_assert_eq!(counters.sequence_errors(), expected_errors);
    }

    /// Property: a single dropped value yields exactly one anomaly.
    #[test]
    fn prop_single_drop_single_anomaly(start in 0i64..MODULUS, len in 7usize..40, drop_at in 1usize..6) {
        let tracker = SequenceTracker::new();
        let anomalies = (0..len)
            .filter(|&i| i != drop_at)
            .map(|i| (start + i as i64) % MODULUS)
            .filter(|&v| tracker.observe("t", v).verdict.is_anomaly())
            .count();

        prop_assert_eq!(anomalies, 1);
    }

    /// Property: no integer payload panics the verifier, and values outside the
    /// cycle are anomalies that leave the history alone.
    #[test]
    fn prop_any_integer_is_safe(value in any::<i64>()) {
        let counters = Arc::new(RunCounters::new());
        let verifier = SequenceVerifier::new(ErrorPolicy::Count, Arc::clone(&counters));

        for v in [0, value, 1, value, 2] {
            verifier.handle("t", v.to_string().as_bytes());
        }

        let in_cycle = (0..MODULUS).contains(&value);
        let state = verifier.tracker().snapshot("t");
        if !in_cycle {
            prop_assert_eq!(counters.sequence_errors(), 2);
            prop_assert_eq!((state.previous, state.actual), (Some(1), Some(2)));
        }
    }
}
