//! Error types for the batch generator.
//!
//! Three families of failure are kept apart:
//! - [`ConfigError`]: rejected construction parameters, raised before any I/O.
//! - [`GeneratorError::SourceRead`]: the dataset source failed while the producer
//!   was loading a chunk. Fatal for the running epoch only.
//! - [`LifecycleError`]: an operation was called in a state that forbids it.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::generator::GeneratorState;

/// Shared, cloneable error cause coming from a dataset source.
pub type SourceCause = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// Invalid construction parameters.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("{0} must be specified")]
    Missing(&'static str),

    #[error("{0} must be greater than 0")]
    Zero(&'static str),

    #[error("chunk_size ({chunk_size}) cannot be smaller than batch_size ({batch_size})")]
    ChunkSmallerThanBatch { chunk_size: usize, batch_size: usize },

    #[error("range_size ({range_size}) cannot be larger than chunk_size ({chunk_size})")]
    RangeLargerThanChunk { range_size: usize, chunk_size: usize },

    #[error("validation_split has to be in range [0.0, 1.0], given value is {0}")]
    ValidationSplit(f64),

    #[error("column '{0}' is not provided by the dataset source")]
    UnknownColumn(String),

    #[error("column '{0}' is requested more than once")]
    DuplicateColumn(String),

    #[error("target column '{target}' is not among the selected columns {columns:?}")]
    TargetNotSelected { target: String, columns: Vec<String> },

    #[error("every selected column is a target, no feature column is left")]
    NoFeatureColumns,
}

/// Operation invoked in a generator state that does not allow it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
    #[error("{operation} is not allowed while the generator is {state:?}")]
    InvalidState {
        operation: &'static str,
        state: GeneratorState,
    },

    #[error("all {num_epochs} configured epochs have already been started")]
    EpochLimitReached { num_epochs: usize },

    #[error("validation batches of epoch {epoch} are not available before training batches were requested")]
    ValidationBeforeTraining { epoch: usize },
}

/// Errors surfaced by the generator.
#[derive(Debug, Clone, Error)]
pub enum GeneratorError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error("failed to read rows [{start}, {end}) from the dataset source", end = .start + .length)]
    SourceRead {
        start: usize,
        length: usize,
        #[source]
        source: SourceCause,
    },

    #[error("no batch arrived within {0:?}")]
    Timeout(Duration),

    #[error("the producer thread stopped unexpectedly")]
    ProducerLost,

    #[error("failed to spawn the producer thread")]
    Spawn(#[source] SourceCause),
}

impl GeneratorError {
    /// Wraps a dataset source failure for the rows `[start, start + length)`.
    pub(crate) fn source_read(start: usize, length: usize, err: anyhow::Error) -> Self {
        let boxed: Box<dyn std::error::Error + Send + Sync + 'static> = err.into();
        Self::SourceRead {
            start,
            length,
            source: Arc::from(boxed),
        }
    }

    /// Whether this error came from the dataset source.
    pub fn is_source_read(&self) -> bool {
        matches!(self, Self::SourceRead { .. })
    }
}

/// Result type for generator operations.
pub type Result<T, E = GeneratorError> = std::result::Result<T, E>;
