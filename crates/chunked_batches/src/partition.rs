//! Range partitioning and per-epoch train/validation assignment.
//!
//! The row index space `[0, num_rows)` is tiled into contiguous ranges of
//! `range_size` rows (the last one may be short). Ranges are the unit of the
//! train/validation split and of the coarse shuffle: each epoch gets a fresh
//! [`EpochPlan`] that permutes the range order, picks the validation ranges and
//! groups the ranges of each stream into chunks.
//!
//! # Seed handling
//! The plan of epoch `e` is drawn from `StdRng::seed_from_u64(seed + e)`, so a
//! fixed seed reproduces every epoch while consecutive epochs still differ.

use crate::batch::{num_batches, remainder_rows};
use crate::error::ConfigError;
use rand::seq::{index, SliceRandom};
use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A contiguous slice `[start, start + len)` of dataset rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Range {
    /// Position of the range in the canonical tiling.
    pub index: usize,
    pub start: usize,
    pub len: usize,
}

impl Range {
    pub fn end(&self) -> usize {
        self.start + self.len
    }
}

/// The stream a range (and every row in it) belongs to for one epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Split {
    Train,
    Validation,
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Split::Train => f.write_str("training"),
            Split::Validation => f.write_str("validation"),
        }
    }
}

/// Splits the row index space into ranges and draws one [`EpochPlan`] per epoch.
///
/// # Arguments
/// - `num_rows`: Rows in the dataset.
/// - `range_size`: Rows per range, must be > 0.
/// - `ranges_per_chunk`: Ranges loaded together as one chunk, must be > 0.
/// - `validation_split`: Fraction of ranges assigned to validation, in `[0, 1]`.
/// - `shuffle`: Permute range order and randomise the validation selection every
///   epoch. Without it the plan is identical for every epoch and validation takes
///   the trailing ranges.
/// - `seed`: Base RNG seed.
#[derive(Debug, Clone)]
pub struct RangePartitioner {
    num_rows: usize,
    range_size: usize,
    ranges_per_chunk: usize,
    validation_split: f64,
    shuffle: bool,
    seed: u64,
}

impl RangePartitioner {
    pub fn new(
        num_rows: usize,
        range_size: usize,
        ranges_per_chunk: usize,
        validation_split: f64,
        shuffle: bool,
        seed: u64,
    ) -> Result<Self, ConfigError> {
        if range_size == 0 {
            return Err(ConfigError::Zero("range_size"));
        }
        if ranges_per_chunk == 0 {
            return Err(ConfigError::RangeLargerThanChunk {
                range_size,
                chunk_size: 0,
            });
        }
        if !(0.0..=1.0).contains(&validation_split) {
            return Err(ConfigError::ValidationSplit(validation_split));
        }
        Ok(Self {
            num_rows,
            range_size,
            ranges_per_chunk,
            validation_split,
            shuffle,
            seed,
        })
    }

    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    /// `ceil(num_rows / range_size)`.
    pub fn num_ranges(&self) -> usize {
        self.num_rows.div_ceil(self.range_size)
    }

    /// `round(validation_split * num_ranges)`.
    pub fn num_validation_ranges(&self) -> usize {
        let n = (self.validation_split * self.num_ranges() as f64).round() as usize;
        n.min(self.num_ranges())
    }

    /// The range at canonical position `index`.
    pub fn range(&self, index: usize) -> Range {
        let start = index * self.range_size;
        Range {
            index,
            start,
            len: self.range_size.min(self.num_rows - start),
        }
    }

    /// All ranges in canonical order.
    pub fn ranges(&self) -> impl Iterator<Item = Range> + '_ {
        (0..self.num_ranges()).map(|i| self.range(i))
    }

    /// Draws the plan for `epoch`.
    pub fn plan(&self, epoch: usize) -> EpochPlan {
        let num_ranges = self.num_ranges();
        let num_validation = self.num_validation_ranges();
        let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(epoch as u64));

        let mut order: Vec<usize> = (0..num_ranges).collect();
        let mut assignment = vec![Split::Train; num_ranges];

        if self.shuffle {
            order.shuffle(&mut rng);
            for i in index::sample(&mut rng, num_ranges, num_validation) {
                assignment[i] = Split::Validation;
            }
        } else {
            for split in &mut assignment[num_ranges - num_validation..] {
                *split = Split::Validation;
            }
        }

        let train_groups = self.group(&order, &assignment, Split::Train);
        let validation_groups = self.group(&order, &assignment, Split::Validation);

        EpochPlan {
            epoch,
            range_size: self.range_size,
            assignment,
            train_groups,
            validation_groups,
        }
    }

    /// Packs the ranges of one stream, taken in `order`, into chunk-sized groups.
    /// Each group is sorted back into dataset order so it is read sequentially.
    fn group(&self, order: &[usize], assignment: &[Split], split: Split) -> Vec<Vec<Range>> {
        let selected: Vec<Range> = order
            .iter()
            .filter(|&&i| assignment[i] == split)
            .map(|&i| self.range(i))
            .collect();

        selected
            .chunks(self.ranges_per_chunk)
            .map(|group| {
                let mut group = group.to_vec();
                group.sort_unstable_by_key(|r| r.start);
                group
            })
            .collect()
    }
}

/// The train/validation assignment and chunk grouping of one epoch.
#[derive(Debug, Clone)]
pub struct EpochPlan {
    epoch: usize,
    range_size: usize,
    assignment: Vec<Split>,
    train_groups: Vec<Vec<Range>>,
    validation_groups: Vec<Vec<Range>>,
}

impl EpochPlan {
    pub fn epoch(&self) -> usize {
        self.epoch
    }

    /// Stream of the range at canonical position `index`.
    pub fn split_of(&self, index: usize) -> Option<Split> {
        self.assignment.get(index).copied()
    }

    pub fn assignment(&self) -> &[Split] {
        &self.assignment
    }

    /// Chunk groups of a stream, in load order.
    pub fn groups(&self, split: Split) -> &[Vec<Range>] {
        match split {
            Split::Train => &self.train_groups,
            Split::Validation => &self.validation_groups,
        }
    }

    pub fn num_ranges(&self, split: Split) -> usize {
        self.groups(split).iter().map(Vec::len).sum()
    }

    pub fn num_rows(&self, split: Split) -> usize {
        self.groups(split).iter().flatten().map(|r| r.len).sum()
    }

    pub fn num_chunks(&self, split: Split) -> usize {
        self.groups(split).len()
    }

    /// Summary of the plan for the given batching parameters.
    pub fn summary(&self, batch_size: usize, drop_remainder: bool) -> PlanSummary {
        let stream = |split| {
            let rows = self.num_rows(split);
            StreamSummary {
                rows,
                ranges: self.num_ranges(split),
                chunks: self.num_chunks(split),
                batches: num_batches(rows, batch_size, drop_remainder),
                remainder_rows: remainder_rows(rows, batch_size),
            }
        };
        PlanSummary {
            epoch: self.epoch,
            range_size: self.range_size,
            batch_size,
            train: stream(Split::Train),
            validation: stream(Split::Validation),
        }
    }
}

/// Row, range, chunk and batch counts of one stream in one epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamSummary {
    pub rows: usize,
    pub ranges: usize,
    pub chunks: usize,
    pub batches: usize,
    pub remainder_rows: usize,
}

/// Distribution of rows over ranges, chunks and batches for one epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanSummary {
    pub epoch: usize,
    pub range_size: usize,
    pub batch_size: usize,
    pub train: StreamSummary,
    pub validation: StreamSummary,
}

impl PlanSummary {
    pub fn stream(&self, split: Split) -> &StreamSummary {
        match split {
            Split::Train => &self.train,
            Split::Validation => &self.validation,
        }
    }
}

impl fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "epoch {} (range_size={}, batch_size={})",
            self.epoch, self.range_size, self.batch_size
        )?;
        writeln!(
            f,
            "{:<12}{:>10}{:>10}{:>10}{:>10}{:>12}",
            "", "rows", "ranges", "chunks", "batches", "remainder"
        )?;
        for (label, s) in [("train", &self.train), ("validation", &self.validation)] {
            writeln!(
                f,
                "{:<12}{:>10}{:>10}{:>10}{:>10}{:>12}",
                label, s.rows, s.ranges, s.chunks, s.batches, s.remainder_rows
            )?;
        }
        Ok(())
    }
}
