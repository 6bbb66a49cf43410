pub mod batch;
pub mod chunk;
pub mod column;
pub mod error;
pub mod generator;
pub mod partition;
pub mod readers;
pub mod shuffle;
pub mod source;

pub use batch::{Batch, ColumnLayout};
pub use column::{ColumnBlock, ColumnData, ColumnScalar, ColumnType};
pub use error::{ConfigError, GeneratorError, LifecycleError, Result};
pub use generator::{
    Activation, BatchGenerator, BatchIter, EpochGuard, GeneratorConfig, GeneratorConfigBuilder,
    GeneratorState,
};
pub use partition::{PlanSummary, Range, Split, StreamSummary};
pub use readers::ParquetSource;
pub use source::{DatasetSource, InMemorySource};
