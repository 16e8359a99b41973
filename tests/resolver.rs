mod util;

use fds_query::timeslots::{BUCKET_SECS, BucketClock, TimeRange, TimeRangeResolver};
use proptest::prelude::*;
use tempfile::TempDir;
use util::{T0, TestTracing, touch_bucket};

fn sources(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

fn range(start: i64, end: i64) -> TimeRange {
    TimeRange::from_timestamps(start, end).unwrap()
}

#[test]
fn gap_at_both_ends_finds_inner_buckets() {
    let tmp = TempDir::new().unwrap();
    let first = touch_bucket(tmp.path(), "eth0", T0 + 600);
    let last = touch_bucket(tmp.path(), "eth0", T0 + 1800);
    touch_bucket(tmp.path(), "eth0", T0 + 1200);

    let files = TimeRangeResolver::new(tmp.path())
        .resolve(&range(T0, T0 + 3600), &sources(&["eth0"]));
    assert_eq!(files, vec![first, last]);
}

#[test]
fn start_bucket_repeats_per_source() {
    let tmp = TempDir::new().unwrap();
    let b = touch_bucket(tmp.path(), "eth0", T0);
    touch_bucket(tmp.path(), "eth1", T0);
    let end = touch_bucket(tmp.path(), "eth1", T0 + 900);

    let files = TimeRangeResolver::new(tmp.path())
        .resolve(&range(T0, T0 + 1200), &sources(&["eth0", "eth1", "eth2"]));
    assert_eq!(files, vec![b.clone(), b, end]);
}

#[test]
fn unaligned_bounds_are_truncated() {
    let tmp = TempDir::new().unwrap();
    let b = touch_bucket(tmp.path(), "eth0", T0 + 300);

    let files = TimeRangeResolver::new(tmp.path())
        .resolve(&range(T0 + 301, T0 + 899), &sources(&["eth0"]));
    // end truncates to T0+600, which is empty; the backward walk stops
    // before the start bucket
    assert_eq!(files, vec![b]);
}

#[test]
fn probe_cap_is_logged() {
    let tmp = TempDir::new().unwrap();
    let tracing = TestTracing::new();
    let _guard = tracing.install();

    let files = TimeRangeResolver::new(tmp.path())
        .with_max_steps(Some(3))
        .resolve(&range(T0, T0 + 86_400), &sources(&["eth0"]));
    assert!(files.is_empty());
    tracing.assert_contains("probe cap");
}

#[test]
fn local_clock_renders_local_paths() {
    let path = BucketClock::Local.bucket_path(T0).unwrap();
    assert!(path.ends_with(".fds"));
    assert!(path.contains("/flows."));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn resolved_files_exist_and_are_bounded(
        present in proptest::collection::btree_set(0i64..24, 0..6),
        start_slot in 0i64..24,
        len in 0i64..30,
        start_jitter in 0i64..BUCKET_SECS,
    ) {
        let tmp = TempDir::new().unwrap();
        for slot in &present {
            touch_bucket(tmp.path(), "eth0", T0 + slot * BUCKET_SECS);
        }
        let start = T0 + start_slot * BUCKET_SECS + start_jitter;
        let end = start + len * BUCKET_SECS;

        let files = TimeRangeResolver::new(tmp.path())
            .resolve(&range(start, end), &sources(&["eth0"]));

        prop_assert!(files.len() <= 2);
        for file in &files {
            prop_assert!(tmp.path().join("eth0").join(file).exists());
        }
        if present.is_empty() {
            prop_assert!(files.is_empty());
        }
    }

    #[test]
    fn inverted_ranges_terminate_empty(
        start_slot in 1i64..500,
        back in 1i64..500,
    ) {
        let tmp = TempDir::new().unwrap();
        touch_bucket(tmp.path(), "eth0", T0);
        let start = T0 + start_slot * BUCKET_SECS;
        let end = start - back * BUCKET_SECS;
        let files = TimeRangeResolver::new(tmp.path())
            .resolve(&range(start, end), &sources(&["eth0"]));
        prop_assert!(files.is_empty());
    }

    #[test]
    fn bucket_paths_have_fixed_shape(offset in 0i64..(10 * 365 * 86_400)) {
        let ts = fds_query::timeslots::truncate_to_grid(T0 + offset);
        let path = BucketClock::Utc.bucket_path(ts).unwrap();
        let parts: Vec<&str> = path.split('/').collect();
        prop_assert_eq!(parts.len(), 4);
        prop_assert!(parts[3].starts_with("flows."));
        prop_assert!(parts[3].ends_with("00.fds"));
        prop_assert_eq!(parts[3].len(), "flows.YYYYMMDDHHmm00.fds".len());
        let day = parts[..3].concat();
        prop_assert!(
            parts[3][6..].starts_with(&day),
            "file name {} does not carry its directory date {}",
            parts[3],
            day
        );
    }
}
