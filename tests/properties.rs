use std::time::Duration;

use appupdater::monitor::Detector;
use appupdater::report::time_saved;
use chrono::Utc;
use proptest::prelude::*;

fn stall_warnings(values: &[u64], stall_samples: u32) -> usize {
    let mut detector = Detector::growth(stall_samples);
    values
        .iter()
        .filter(|v| {
            detector
                .observe("dump", Utc::now(), **v, None)
                .warning
                .is_some()
        })
        .count()
}

proptest! {
    #[test]
    fn time_saved_is_never_negative(
        stages in prop::collection::vec(0u64..10_000, 1..6),
        batch in 0u64..60_000,
    ) {
        let durations: Vec<Duration> = stages.iter().map(|ms| Duration::from_millis(*ms)).collect();
        let sum: Duration = durations.iter().sum();
        let batch = Duration::from_millis(batch);

        let saved = time_saved(durations.iter().copied(), batch);

        prop_assert!(saved <= sum);
        if batch <= sum {
            prop_assert_eq!(saved + batch, sum);
        } else {
            prop_assert_eq!(saved, Duration::ZERO);
        }
    }

    #[test]
    fn concurrent_batch_never_reports_more_than_the_longest_stage_saved(
        stages in prop::collection::vec(1u64..10_000, 2..6),
    ) {
        // A concurrent batch takes at least as long as its longest stage.
        let longest = stages.iter().copied().max().unwrap_or(0);
        let durations: Vec<Duration> = stages.iter().map(|ms| Duration::from_millis(*ms)).collect();
        let saved = time_saved(durations.iter().copied(), Duration::from_millis(longest));
        let others: u64 = stages.iter().sum::<u64>() - longest;
        prop_assert_eq!(saved, Duration::from_millis(others));
    }

    #[test]
    fn growing_signal_never_stalls(
        start in 0u64..1_000,
        steps in prop::collection::vec(1u64..1_000, 0..50),
        stall_samples in 1u32..10,
    ) {
        let values: Vec<u64> = steps
            .iter()
            .scan(start, |acc, step| {
                *acc += step;
                Some(*acc)
            })
            .collect();
        prop_assert_eq!(stall_warnings(&values, stall_samples), 0);
    }

    #[test]
    fn flat_signal_warns_exactly_once_per_episode(
        value in 0u64..1_000_000,
        len in 1usize..40,
        stall_samples in 1u32..10,
    ) {
        let values = vec![value; len];
        let expected = usize::from(len > stall_samples as usize);
        prop_assert_eq!(stall_warnings(&values, stall_samples), expected);
    }
}
