//! Property tests: every epoch delivers every row exactly once, split by range.

mod common;
use common::{drain_epoch, index_source, row_ids, sorted};

use chunked_batches::partition::RangePartitioner;
use chunked_batches::{BatchGenerator, GeneratorConfig, Split};
use proptest::prelude::*;
use std::collections::HashSet;

fn arb_split() -> impl Strategy<Value = f64> {
    (0u32..=100).prop_map(|p| f64::from(p) / 100.0)
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 24, .. ProptestConfig::default() })]

    #[test]
    fn prop_epoch_partitions_rows(
        rows in 0usize..300,
        range_size in 1usize..20,
        ranges_per_chunk in 1usize..5,
        batch_pick in any::<usize>(),
        validation_split in arb_split(),
        shuffle in any::<bool>(),
        seed in any::<u64>(),
    ) {
        let chunk_size = range_size * ranges_per_chunk;
        let batch_size = 1 + batch_pick % chunk_size;
        let config = GeneratorConfig::builder()
            .chunk_size(chunk_size)
            .range_size(range_size)
            .batch_size(batch_size)
            .validation_split(validation_split)
            .shuffle(shuffle)
            .seed(seed)
            .build();
        let generator = BatchGenerator::new(index_source(rows), config).unwrap();
        let expected_train_remainder = generator.train_remainder_rows();
        let expected_validation_remainder = generator.validation_remainder_rows();

        generator.activate().unwrap();
        generator.activate_epoch().unwrap();
        let (train, validation) = drain_epoch(&generator).unwrap();
        generator.deactivate().unwrap();

        let train_ids = row_ids(&train);
        let validation_ids = row_ids(&validation);
        let train_set: HashSet<_> = train_ids.iter().copied().collect();
        let validation_set: HashSet<_> = validation_ids.iter().copied().collect();
        prop_assert!(train_set.is_disjoint(&validation_set));

        let mut all = train_ids.clone();
        all.extend(&validation_ids);
        prop_assert_eq!(sorted(all), (0..rows).collect::<Vec<_>>());

        // Whole ranges go to one side
        let train_ranges: HashSet<_> = train_ids.iter().map(|id| id / range_size).collect();
        let validation_ranges: HashSet<_> = validation_ids.iter().map(|id| id / range_size).collect();
        prop_assert!(train_ranges.is_disjoint(&validation_ranges));
        let num_ranges = rows.div_ceil(range_size);
        let expected_validation = (validation_split * num_ranges as f64).round() as usize;
        prop_assert_eq!(validation_ranges.len(), expected_validation);

        for (stream, remainder) in [
            (&train, expected_train_remainder),
            (&validation, expected_validation_remainder),
        ] {
            prop_assert_eq!(row_ids(stream).len() % batch_size, remainder);
            if let Some((last, full)) = stream.split_last() {
                prop_assert!(full.iter().all(|b| b.len() == batch_size));
                let expected_last = if remainder == 0 { batch_size } else { remainder };
                prop_assert_eq!(last.len(), expected_last);
            }
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 128, .. ProptestConfig::default() })]

    #[test]
    fn prop_plan_groups_fit_in_a_chunk(
        rows in 0usize..2000,
        range_size in 1usize..50,
        ranges_per_chunk in 1usize..8,
        validation_split in arb_split(),
        shuffle in any::<bool>(),
        seed in any::<u64>(),
        epoch in 0usize..10,
    ) {
        let partitioner = RangePartitioner::new(
            rows, range_size, ranges_per_chunk, validation_split, shuffle, seed,
        ).unwrap();
        let plan = partitioner.plan(epoch);

        let mut covered = Vec::with_capacity(rows);
        for split in [Split::Train, Split::Validation] {
            for group in plan.groups(split) {
                prop_assert!(!group.is_empty());
                prop_assert!(group.len() <= ranges_per_chunk);
                prop_assert!(group.iter().map(|r| r.len).sum::<usize>() <= range_size * ranges_per_chunk);
                prop_assert!(group.windows(2).all(|w| w[0].end() <= w[1].start));
                for range in group {
                    prop_assert_eq!(plan.split_of(range.index), Some(split));
                    covered.extend(range.start..range.end());
                }
            }
        }
        prop_assert_eq!(sorted(covered), (0..rows).collect::<Vec<_>>());
    }
}
