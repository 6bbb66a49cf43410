use crate::column::{ColumnBlock, ColumnData, ColumnType};
use anyhow::{anyhow, ensure, Result};
use std::sync::Arc;

/// A `DatasetSource` gives range access to a tabular dataset that is usually far
/// larger than memory.
///
/// The generator never holds more than one chunk of rows at a time and asks the
/// source for contiguous row ranges only, so implementations can be backed by
/// files, memory maps or remote storage.
///
/// Implementations must be `Send + Sync`: ranges are read from the producer
/// thread while the caller's thread queries the schema.
pub trait DatasetSource: Send + Sync {
    /// Names of all columns, in storage order.
    fn column_names(&self) -> Vec<String>;

    /// Type tag of a column, `None` if the column does not exist.
    fn column_type(&self, name: &str) -> Option<ColumnType>;

    /// Total number of rows.
    fn row_count(&self) -> usize;

    /// Reads rows `[start, start + length)` of the requested columns.
    ///
    /// The returned block must hold exactly `length` rows and the requested
    /// columns in the requested order.
    ///
    /// # Errors
    /// - The range exceeds `row_count()`
    /// - A requested column does not exist
    /// - Any I/O or decoding failure
    fn read_range(&self, start: usize, length: usize, columns: &[String]) -> Result<ColumnBlock>;
}

impl<S: DatasetSource + ?Sized> DatasetSource for Arc<S> {
    fn column_names(&self) -> Vec<String> {
        (**self).column_names()
    }

    fn column_type(&self, name: &str) -> Option<ColumnType> {
        (**self).column_type(name)
    }

    fn row_count(&self) -> usize {
        (**self).row_count()
    }

    fn read_range(&self, start: usize, length: usize, columns: &[String]) -> Result<ColumnBlock> {
        (**self).read_range(start, length, columns)
    }
}

/// A dataset kept entirely in memory, built column by column.
///
/// Useful for tests and for datasets that happen to fit in RAM but should still go
/// through the same chunked train/validation pipeline.
///
/// # Example
/// ```ignore
/// let source = InMemorySource::new()
///     .with_column("x", ColumnData::Float32(vec![0.1, 0.2, 0.3]))?
///     .with_column("label", ColumnData::Int32(vec![0, 1, 0]))?;
/// assert_eq!(source.row_count(), 3);
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    names: Vec<String>,
    columns: Vec<Arc<ColumnData>>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a column.
    ///
    /// # Errors
    /// - A column with the same name already exists
    /// - The column length differs from the existing columns
    pub fn with_column(mut self, name: impl Into<String>, data: ColumnData) -> Result<Self> {
        let name = name.into();
        ensure!(
            !self.names.contains(&name),
            "Column '{}' already exists",
            name
        );
        if let Some(first) = self.columns.first() {
            ensure!(
                first.len() == data.len(),
                "Column '{}' has {} rows but the source has {}",
                name,
                data.len(),
                first.len()
            );
        }
        self.names.push(name);
        self.columns.push(Arc::new(data));
        Ok(self)
    }

    /// Builds a source from an existing block.
    pub fn from_block(block: &ColumnBlock) -> Result<Self> {
        block
            .names()
            .iter()
            .enumerate()
            .try_fold(Self::new(), |source, (i, name)| {
                let column = block
                    .column_at(i)
                    .ok_or_else(|| anyhow!("Block lost column {}", i))?;
                source.with_column(name.clone(), column.clone())
            })
    }
}

impl DatasetSource for InMemorySource {
    fn column_names(&self) -> Vec<String> {
        self.names.clone()
    }

    fn column_type(&self, name: &str) -> Option<ColumnType> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| self.columns[i].column_type())
    }

    fn row_count(&self) -> usize {
        self.columns.first().map_or(0, |c| c.len())
    }

    fn read_range(&self, start: usize, length: usize, columns: &[String]) -> Result<ColumnBlock> {
        let row_count = self.row_count();
        ensure!(
            start.checked_add(length).is_some_and(|end| end <= row_count),
            "Range [{}, {}) exceeds the {} rows of the source",
            start,
            start.saturating_add(length),
            row_count
        );

        let data = columns
            .iter()
            .map(|name| {
                self.names
                    .iter()
                    .position(|n| n == name)
                    .map(|i| self.columns[i].slice(start, length))
                    .ok_or_else(|| anyhow!("Column '{}' not found in source", name))
            })
            .collect::<Result<Vec<_>>>()?;

        ColumnBlock::new(columns.to_vec(), data)
    }
}
