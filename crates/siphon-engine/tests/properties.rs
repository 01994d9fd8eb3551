use std::collections::HashSet;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use proptest::prelude::*;
use siphon_engine::dedup::dedup;
use siphon_engine::{MemorySource, MergeJoiner, PageLimits, Paginator};
use siphon_types::{Discriminator, Filter, Record, ScanOrder};

fn base() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("runtime")
        .block_on(future)
}

/// Records from (key, age-in-seconds) pairs; keys drawn from a small
/// alphabet so duplicates are common.
fn records(spec: &[(u8, u16)]) -> Vec<Record> {
    spec.iter()
        .map(|&(k, age)| Record::new(format!("k{k}"), Some(base() - Duration::seconds(i64::from(age)))))
        .collect()
}

fn keys(rows: &[Record]) -> Vec<String> {
    rows.iter().map(|r| r.key().to_string()).collect()
}

proptest! {
    #[test]
    fn dedup_is_idempotent(spec in prop::collection::vec((0_u8..40, any::<u16>()), 0..200)) {
        let once = dedup(records(&spec));
        let twice = dedup(once.clone());
        prop_assert_eq!(keys(&once), keys(&twice));
    }

    #[test]
    fn dedup_keeps_first_occurrence(spec in prop::collection::vec((0_u8..20, any::<u16>()), 0..200)) {
        let rows = records(&spec);
        let kept = dedup(rows.clone());
        let unique: HashSet<&str> = kept.iter().map(Record::key).collect();
        prop_assert_eq!(unique.len(), kept.len());
        for record in &kept {
            let first = rows.iter().find(|r| r.key() == record.key()).unwrap();
            prop_assert_eq!(first.inserted_at(), record.inserted_at());
        }
    }

    #[test]
    fn join_emits_keys_present_on_both_sides_once(
        primary in prop::collection::vec(0_u8..60, 0..120),
        secondary in prop::collection::vec(0_u8..60, 0..120),
        chunk in 1_usize..17,
    ) {
        let d = Discriminator::new("gender", "US");
        let secondary_rows: Vec<Record> = secondary
            .iter()
            .enumerate()
            .map(|(i, k)| Record::new(format!("k{k}"), Some(base() - Duration::seconds(i as i64))))
            .collect();
        let source = MemorySource::new().with_dataset(d.clone(), secondary_rows);
        let filter = Filter::new(d);
        let primaries: Vec<Record> = primary
            .iter()
            .map(|k| Record::new(format!("k{k}"), Some(base())))
            .collect();

        let joined = block_on(async {
            let mut joiner = MergeJoiner::new(&source, &filter, chunk);
            joiner.join(dedup(primaries)).await
        })
        .unwrap();

        let primary_keys: HashSet<String> = primary.iter().map(|k| format!("k{k}")).collect();
        let secondary_keys: HashSet<String> = secondary.iter().map(|k| format!("k{k}")).collect();
        let mut emitted = HashSet::new();
        for pair in &joined {
            prop_assert_eq!(pair.primary().key(), pair.secondary().key());
            prop_assert!(primary_keys.contains(pair.key()));
            prop_assert!(secondary_keys.contains(pair.key()));
            prop_assert!(emitted.insert(pair.key().to_string()));
        }
        prop_assert_eq!(emitted.len(), primary_keys.intersection(&secondary_keys).count());

        let distinct = primary_keys.len();
        let expected_lookups = distinct.div_ceil(chunk);
        prop_assert_eq!(source.calls().fetch_by_keys, expected_lookups as u64);
    }

    #[test]
    fn pagination_terminates_within_bound(
        total in 0_usize..400,
        batch in 1_usize..64,
        cap in 1_u32..20,
        budget in 0_u64..600,
    ) {
        let d = Discriminator::new("gender", "US");
        let rows: Vec<Record> = (0..total)
            .map(|i| Record::new(format!("r{i:04}"), Some(base() - Duration::seconds(i as i64))))
            .collect();
        let source = MemorySource::new().with_dataset(d.clone(), rows);
        let filter = Filter::new(d);
        let limits = PageLimits { batch_size: batch, max_batches: cap };

        let (emitted, pages) = block_on(async {
            let mut pager = Paginator::new(&source, &filter, ScanOrder::RecencyDesc, limits, budget);
            let all = pager.collect_all().await.unwrap();
            assert!(pager.stop_reason().is_some());
            (all.len(), pager.pages_fetched())
        });

        prop_assert!(pages as usize <= total.div_ceil(batch) + 1);
        prop_assert!(pages <= cap);
        prop_assert!(emitted as u64 <= budget);
        prop_assert!(emitted <= total);
        prop_assert_eq!(source.calls().fetch_page, u64::from(pages));
    }
}
