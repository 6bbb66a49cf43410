use crate::chunk::Chunk;
use crate::partition::{EpochPlan, Split};
use rand::seq::SliceRandom;
use rand::{rngs::StdRng, SeedableRng};

/// Chunk-local row positions of one stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowSet {
    pub positions: Vec<usize>,
}

impl RowSet {
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

/// Rows of a chunk separated by stream.
#[derive(Debug, Clone, Default)]
pub struct SplitRows {
    pub train: RowSet,
    pub validation: RowSet,
}

impl SplitRows {
    pub fn get(&self, split: Split) -> &RowSet {
        match split {
            Split::Train => &self.train,
            Split::Validation => &self.validation,
        }
    }
}

/// Separates the rows of a chunk into train and validation subsets following the
/// range assignment of the epoch, then permutes each subset.
///
/// Rows never cross the train/validation boundary here: a row lands in the subset
/// its range was assigned to.
///
/// # Seed handling
/// Each chunk gets its own RNG seeded with
/// `seed + (epoch << 32) + index of the chunk's first range`. Ranges are disjoint
/// so no two chunks of an epoch share a seed.
#[derive(Debug, Clone)]
pub struct Shuffler {
    shuffle: bool,
    seed: u64,
}

impl Shuffler {
    pub fn new(shuffle: bool, seed: u64) -> Self {
        Self { shuffle, seed }
    }

    pub fn split(&self, chunk: &Chunk, plan: &EpochPlan) -> SplitRows {
        let mut rows = SplitRows::default();
        for (range, span) in chunk.range_spans() {
            let subset = match plan.split_of(range.index) {
                Some(Split::Validation) => &mut rows.validation,
                _ => &mut rows.train,
            };
            subset.positions.extend(span);
        }

        if self.shuffle {
            let first_range = chunk.ranges.first().map_or(0, |r| r.index);
            let seed = self
                .seed
                .wrapping_add((plan.epoch() as u64) << 32)
                .wrapping_add(first_range as u64);
            let mut rng = StdRng::seed_from_u64(seed);
            rows.train.positions.shuffle(&mut rng);
            rows.validation.positions.shuffle(&mut rng);
        }
        rows
    }
}
