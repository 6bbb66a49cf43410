//! Chunk loading.
//!
//! A chunk is the only place where dataset rows live in memory: the producer
//! loads one group of whole ranges, hands it to the shuffler and slicer, and
//! drops it before the next group is read.

use crate::column::ColumnBlock;
use crate::error::{GeneratorError, Result};
use crate::partition::Range;
use crate::source::DatasetSource;
use anyhow::anyhow;

/// Rows of one or more whole ranges, in original dataset order.
#[derive(Debug, Clone)]
pub struct Chunk {
    /// Position of the chunk in its stream's load order.
    pub index: usize,
    pub ranges: Vec<Range>,
    pub data: ColumnBlock,
    /// Dataset row index of every row in `data`.
    pub row_indices: Vec<usize>,
}

impl Chunk {
    pub fn num_rows(&self) -> usize {
        self.data.num_rows()
    }

    /// Chunk-local row offsets covered by each range, in `ranges` order.
    pub fn range_spans(&self) -> impl Iterator<Item = (&Range, std::ops::Range<usize>)> + '_ {
        self.ranges.iter().scan(0usize, |offset, range| {
            let span = *offset..*offset + range.len;
            *offset = span.end;
            Some((range, span))
        })
    }
}

/// Reads groups of ranges from a [`DatasetSource`] into [`Chunk`]s.
pub struct ChunkLoader<'a, S: DatasetSource + ?Sized> {
    source: &'a S,
    columns: &'a [String],
}

impl<'a, S: DatasetSource + ?Sized> ChunkLoader<'a, S> {
    /// # Arguments
    /// - `source`: Dataset to read from.
    /// - `columns`: Columns to materialise, in output order.
    pub fn new(source: &'a S, columns: &'a [String]) -> Self {
        Self { source, columns }
    }

    /// Loads the rows of `ranges` as one chunk.
    ///
    /// Ranges are read in ascending start order whatever order they are given in.
    /// `cancelled` is polled before every range read; once it returns true the
    /// partial chunk is dropped and `Ok(None)` is returned.
    ///
    /// # Errors
    /// - `GeneratorError::SourceRead` if the source fails or returns a block of the
    ///   wrong size.
    pub fn load(
        &self,
        index: usize,
        ranges: &[Range],
        cancelled: impl Fn() -> bool,
    ) -> Result<Option<Chunk>> {
        let mut ranges = ranges.to_vec();
        ranges.sort_unstable_by_key(|r| r.start);

        let total: usize = ranges.iter().map(|r| r.len).sum();
        let mut data: Option<ColumnBlock> = None;
        let mut row_indices = Vec::with_capacity(total);

        for range in &ranges {
            if cancelled() {
                return Ok(None);
            }

            let block = self
                .source
                .read_range(range.start, range.len, self.columns)
                .map_err(|e| GeneratorError::source_read(range.start, range.len, e))?;

            if block.num_rows() != range.len || block.names() != self.columns {
                return Err(GeneratorError::source_read(
                    range.start,
                    range.len,
                    anyhow!(
                        "source returned {} rows of columns {:?}, expected {} rows of {:?}",
                        block.num_rows(),
                        block.names(),
                        range.len,
                        self.columns
                    ),
                ));
            }

            match data.as_mut() {
                Some(data) => data
                    .append(&block)
                    .map_err(|e| GeneratorError::source_read(range.start, range.len, e))?,
                None => data = Some(block),
            }
            row_indices.extend(range.start..range.end());
        }

        Ok(data.map(|data| Chunk {
            index,
            ranges,
            data,
            row_indices,
        }))
    }
}
