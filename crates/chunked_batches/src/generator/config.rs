//! src/generator/config.rs
//!
//! Configuration for the batch generator.
//!
//! Example:
//! ```ignore
//! let config = GeneratorConfig::builder()
//!     .chunk_size(100_000)
//!     .range_size(1_000)
//!     .batch_size(512)
//!     .target_columns(["label"])
//!     .validation_split(0.2)
//!     .seed(7)
//!     .build();
//! ```
//!
//! # Memory considerations:
//! - `chunk_size`: Upper bound on rows resident in the producer at a time.
//! - `queue_capacity`: Batches buffered per stream. Defaults to two chunks' worth.
//! - `range_size`: Smaller ranges give a finer shuffle and split at the cost of
//!   more, shorter reads.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::batch::ColumnLayout;
use crate::error::ConfigError;
use crate::source::DatasetSource;
use rand::Rng;

/// Configuration for `BatchGenerator`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// Number of epochs `activate_epoch` may start. Default: 1
    pub num_epochs: usize,
    /// Rows loaded into memory at once (required)
    pub chunk_size: Option<usize>,
    /// Rows per contiguous range, the unit of the train/validation split (required)
    pub range_size: Option<usize>,
    /// Rows per batch (required)
    pub batch_size: Option<usize>,
    /// Columns to load, in output order. Empty selects every column of the source.
    pub columns: Vec<String>,
    /// Columns separated out as targets in each batch.
    pub target_columns: Vec<String>,
    /// Fraction of ranges assigned to validation, in `[0, 1]`. Default: 0
    pub validation_split: f64,
    /// Whether to shuffle range order, the validation selection and rows within a
    /// chunk every epoch. Default: true
    pub shuffle: bool,
    /// Random seed for reproducible epochs. Drawn at random when not specified.
    pub seed: Option<u64>,
    /// Whether to drop the short final batch of each stream. Default: false
    pub drop_remainder: bool,
    /// Batches buffered per queue. Default: `2 * ceil(chunk_size / batch_size)`
    pub queue_capacity: Option<usize>,
    /// Maximum time a consumer waits for a batch, and `deactivate_epoch` waits for
    /// the producer, before giving up. Default: 30s
    pub timeout: Duration,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            num_epochs: 1,
            chunk_size: None,
            range_size: None,
            batch_size: None,
            columns: Vec::new(),
            target_columns: Vec::new(),
            validation_split: 0.0,
            shuffle: true,
            seed: None,
            drop_remainder: false,
            queue_capacity: None,
            timeout: Duration::from_secs(30),
        }
    }
}

impl GeneratorConfig {
    pub fn builder() -> GeneratorConfigBuilder {
        GeneratorConfigBuilder::default()
    }

    /// Checks the configuration against `source` and fills in every default.
    pub(crate) fn resolve<S: DatasetSource + ?Sized>(
        &self,
        source: &S,
    ) -> Result<Settings, ConfigError> {
        let chunk_size = self.chunk_size.ok_or(ConfigError::Missing("chunk_size"))?;
        let range_size = self.range_size.ok_or(ConfigError::Missing("range_size"))?;
        let batch_size = self.batch_size.ok_or(ConfigError::Missing("batch_size"))?;

        for (name, value) in [
            ("batch_size", batch_size),
            ("range_size", range_size),
            ("chunk_size", chunk_size),
            ("num_epochs", self.num_epochs),
        ] {
            if value == 0 {
                return Err(ConfigError::Zero(name));
            }
        }
        if chunk_size < batch_size {
            return Err(ConfigError::ChunkSmallerThanBatch {
                chunk_size,
                batch_size,
            });
        }
        if range_size > chunk_size {
            return Err(ConfigError::RangeLargerThanChunk {
                range_size,
                chunk_size,
            });
        }
        if !(0.0..=1.0).contains(&self.validation_split) {
            return Err(ConfigError::ValidationSplit(self.validation_split));
        }

        let queue_capacity = match self.queue_capacity {
            Some(0) => return Err(ConfigError::Zero("queue_capacity")),
            Some(capacity) => capacity,
            None => 2 * chunk_size.div_ceil(batch_size),
        };

        let layout = self.resolve_columns(source)?;

        Ok(Settings {
            num_epochs: self.num_epochs,
            chunk_size,
            range_size,
            batch_size,
            ranges_per_chunk: chunk_size / range_size,
            validation_split: self.validation_split,
            shuffle: self.shuffle,
            seed: self.seed.unwrap_or_else(|| rand::rng().random()),
            drop_remainder: self.drop_remainder,
            queue_capacity,
            timeout: self.timeout,
            layout: Arc::new(layout),
        })
    }

    fn resolve_columns<S: DatasetSource + ?Sized>(
        &self,
        source: &S,
    ) -> Result<ColumnLayout, ConfigError> {
        let columns = if self.columns.is_empty() {
            source
                .column_names()
                .into_iter()
                .filter(|name| source.column_type(name).is_some())
                .collect()
        } else {
            self.columns.clone()
        };

        check_unique(&columns)?;
        check_unique(&self.target_columns)?;

        for name in columns.iter().chain(&self.target_columns) {
            if source.column_type(name).is_none() {
                return Err(ConfigError::UnknownColumn(name.clone()));
            }
        }
        for target in &self.target_columns {
            if !columns.contains(target) {
                return Err(ConfigError::TargetNotSelected {
                    target: target.clone(),
                    columns,
                });
            }
        }
        if !self.target_columns.is_empty() && self.target_columns.len() == columns.len() {
            return Err(ConfigError::NoFeatureColumns);
        }

        Ok(ColumnLayout::new(columns, &self.target_columns))
    }
}

fn check_unique(names: &[String]) -> Result<(), ConfigError> {
    for (i, name) in names.iter().enumerate() {
        if names[..i].contains(name) {
            return Err(ConfigError::DuplicateColumn(name.clone()));
        }
    }
    Ok(())
}

/// Fully resolved generator parameters, shared with the producer thread.
#[derive(Debug, Clone)]
pub(crate) struct Settings {
    pub num_epochs: usize,
    pub chunk_size: usize,
    pub range_size: usize,
    pub batch_size: usize,
    pub ranges_per_chunk: usize,
    pub validation_split: f64,
    pub shuffle: bool,
    pub seed: u64,
    pub drop_remainder: bool,
    pub queue_capacity: usize,
    pub timeout: Duration,
    pub layout: Arc<ColumnLayout>,
}

/// Builder for GeneratorConfig with method chaining
#[derive(Default)]
pub struct GeneratorConfigBuilder {
    config: GeneratorConfig,
}

impl GeneratorConfigBuilder {
    /// Set the number of epochs (must be > 0)
    pub fn num_epochs(mut self, num_epochs: usize) -> Self {
        self.config.num_epochs = num_epochs;
        self
    }

    /// Set the chunk size in rows (must be >= batch_size)
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.chunk_size = Some(size);
        self
    }

    /// Set the range size in rows (must be <= chunk_size)
    pub fn range_size(mut self, size: usize) -> Self {
        self.config.range_size = Some(size);
        self
    }

    /// Set the batch size (must be > 0)
    pub fn batch_size(mut self, size: usize) -> Self {
        self.config.batch_size = Some(size);
        self
    }

    /// Select the columns to load
    pub fn columns<I, C>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<String>,
    {
        self.config.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Declare the target columns
    pub fn target_columns<I, C>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<String>,
    {
        self.config.target_columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Set the fraction of ranges used for validation
    pub fn validation_split(mut self, split: f64) -> Self {
        self.config.validation_split = split;
        self
    }

    /// Set whether to shuffle every epoch
    pub fn shuffle(mut self, shuffle: bool) -> Self {
        self.config.shuffle = shuffle;
        self
    }

    /// Set the random seed.
    ///
    /// When set, this seed controls:
    /// - Range order and the validation selection of every epoch
    /// - Row order within each chunk
    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = Some(seed);
        self
    }

    /// Set whether to drop the short final batch of each stream
    pub fn drop_remainder(mut self, drop: bool) -> Self {
        self.config.drop_remainder = drop;
        self
    }

    /// Set the number of batches buffered per queue (must be > 0)
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.queue_capacity = Some(capacity);
        self
    }

    /// Set the timeout for batch and epoch operations.
    ///
    /// - Too low: May fail while the producer is legitimately slow on I/O
    /// - Too high: Delays detection of a stuck producer.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Build the final configuration.
    pub fn build(self) -> GeneratorConfig {
        self.config
    }
}
