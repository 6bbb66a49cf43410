//! Batches and the slicer that cuts shuffled chunk subsets into them.

use crate::chunk::Chunk;
use crate::column::ColumnBlock;
use crate::partition::Split;
use crate::shuffle::RowSet;
use std::sync::Arc;

/// Rows left over after cutting `rows` into batches of `batch_size`.
pub fn remainder_rows(rows: usize, batch_size: usize) -> usize {
    rows % batch_size
}

/// Batches a stream of `rows` produces.
pub fn num_batches(rows: usize, batch_size: usize, drop_remainder: bool) -> usize {
    let partial = remainder_rows(rows, batch_size) > 0 && !drop_remainder;
    rows / batch_size + usize::from(partial)
}

/// Selected columns of a generator and their feature/target roles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnLayout {
    columns: Vec<String>,
    feature_indices: Vec<usize>,
    target_indices: Vec<usize>,
}

impl ColumnLayout {
    /// `targets` must be a subset of `columns`; indices of unknown targets are
    /// skipped.
    pub fn new(columns: Vec<String>, targets: &[String]) -> Self {
        let target_indices: Vec<usize> = targets
            .iter()
            .filter_map(|t| columns.iter().position(|c| c == t))
            .collect();
        let feature_indices = (0..columns.len())
            .filter(|i| !target_indices.contains(i))
            .collect();
        Self {
            columns,
            feature_indices,
            target_indices,
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn feature_columns(&self) -> Vec<String> {
        self.feature_indices
            .iter()
            .map(|&i| self.columns[i].clone())
            .collect()
    }

    pub fn target_columns(&self) -> Vec<String> {
        self.target_indices
            .iter()
            .map(|&i| self.columns[i].clone())
            .collect()
    }

    pub fn has_targets(&self) -> bool {
        !self.target_indices.is_empty()
    }
}

/// A group of rows from one stream of one epoch, owned by whoever dequeued it.
///
/// `data` holds every selected column. [`Batch::features`] and [`Batch::targets`]
/// split it by the declared target columns; without targets the batch is
/// undifferentiated and `features()` returns all columns.
#[derive(Debug, Clone)]
pub struct Batch {
    data: ColumnBlock,
    row_indices: Vec<usize>,
    epoch: usize,
    split: Split,
    layout: Arc<ColumnLayout>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.row_indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.row_indices.is_empty()
    }

    /// All selected columns.
    pub fn data(&self) -> &ColumnBlock {
        &self.data
    }

    /// Dataset row index of every row, in batch order.
    pub fn row_indices(&self) -> &[usize] {
        &self.row_indices
    }

    pub fn epoch(&self) -> usize {
        self.epoch
    }

    pub fn split(&self) -> Split {
        self.split
    }

    pub fn features(&self) -> ColumnBlock {
        if self.layout.has_targets() {
            self.data.project(&self.layout.feature_indices)
        } else {
            self.data.clone()
        }
    }

    /// Target columns, `None` when no target column was declared.
    pub fn targets(&self) -> Option<ColumnBlock> {
        self.layout
            .has_targets()
            .then(|| self.data.project(&self.layout.target_indices))
    }

    /// Hands the columns and their dataset row indices to the consumer.
    pub fn into_parts(self) -> (ColumnBlock, Vec<usize>) {
        (self.data, self.row_indices)
    }
}

/// Cuts the rows of one stream into batches of `batch_size`.
///
/// Rows that do not fill a whole batch at the end of a chunk are carried into the
/// next chunk of the same stream, so only the last batch of the stream can be
/// short. [`BatchSlicer::finish`] flushes it.
#[derive(Debug)]
pub struct BatchSlicer {
    batch_size: usize,
    drop_remainder: bool,
    epoch: usize,
    split: Split,
    layout: Arc<ColumnLayout>,
    carry: Option<(ColumnBlock, Vec<usize>)>,
}

impl BatchSlicer {
    pub fn new(
        batch_size: usize,
        drop_remainder: bool,
        epoch: usize,
        split: Split,
        layout: Arc<ColumnLayout>,
    ) -> Self {
        Self {
            batch_size,
            drop_remainder,
            epoch,
            split,
            layout,
            carry: None,
        }
    }

    /// Slices the rows of `chunk` at `rows`, in that order, after any carried rows.
    pub fn slice(&mut self, chunk: &Chunk, rows: &RowSet) -> anyhow::Result<Vec<Batch>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let gathered = chunk.data.take(&rows.positions);
        let gathered_indices: Vec<usize> =
            rows.positions.iter().map(|&p| chunk.row_indices[p]).collect();

        let (data, indices) = match self.carry.take() {
            Some((mut data, mut indices)) => {
                data.append(&gathered)?;
                indices.extend(gathered_indices);
                (data, indices)
            }
            None => (gathered, gathered_indices),
        };

        let total = indices.len();
        let full = total / self.batch_size;
        let batches = (0..full)
            .map(|b| {
                let start = b * self.batch_size;
                self.make_batch(
                    data.slice(start, self.batch_size),
                    indices[start..start + self.batch_size].to_vec(),
                )
            })
            .collect();

        let consumed = full * self.batch_size;
        if consumed < total {
            self.carry = Some((
                data.slice(consumed, total - consumed),
                indices[consumed..].to_vec(),
            ));
        }
        Ok(batches)
    }

    /// Rows currently carried over, waiting for the next chunk.
    pub fn carried_rows(&self) -> usize {
        self.carry.as_ref().map_or(0, |(_, indices)| indices.len())
    }

    /// Final short batch of the stream, unless remainders are dropped.
    pub fn finish(&mut self) -> Option<Batch> {
        let (data, indices) = self.carry.take()?;
        if self.drop_remainder {
            return None;
        }
        Some(self.make_batch(data, indices))
    }

    fn make_batch(&self, data: ColumnBlock, row_indices: Vec<usize>) -> Batch {
        Batch {
            data,
            row_indices,
            epoch: self.epoch,
            split: self.split,
            layout: Arc::clone(&self.layout),
        }
    }
}
