#![allow(dead_code)]

use chunked_batches::{
    Batch, BatchGenerator, ColumnBlock, ColumnData, ColumnType, DatasetSource, InMemorySource,
};

use anyhow::{bail, Result};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Dataset of `n` rows: `id` (row index), `x` (id / 2) and `label` (id % 2).
pub fn index_source(n: usize) -> InMemorySource {
    InMemorySource::new()
        .with_column("id", ColumnData::UInt64((0..n as u64).collect()))
        .and_then(|s| s.with_column("x", ColumnData::Float32((0..n).map(|i| i as f32 * 0.5).collect())))
        .and_then(|s| s.with_column("label", ColumnData::Int32((0..n).map(|i| (i % 2) as i32).collect())))
        .expect("valid test source")
}

/// Source wrapper that counts reads, can be slowed down, and fails on demand.
pub struct TestSource {
    inner: InMemorySource,
    pub reads: AtomicUsize,
    pub fail: Arc<AtomicBool>,
    /// Reads starting at or after this row fail while `fail` is set.
    pub fail_from: usize,
    pub delay: Duration,
}

impl TestSource {
    pub fn new(n: usize) -> Self {
        Self {
            inner: index_source(n),
            reads: AtomicUsize::new(0),
            fail: Arc::new(AtomicBool::new(false)),
            fail_from: 0,
            delay: Duration::ZERO,
        }
    }

    pub fn failing_from(mut self, row: usize) -> Self {
        self.fail.store(true, Ordering::SeqCst);
        self.fail_from = row;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl DatasetSource for TestSource {
    fn column_names(&self) -> Vec<String> {
        self.inner.column_names()
    }

    fn column_type(&self, name: &str) -> Option<ColumnType> {
        self.inner.column_type(name)
    }

    fn row_count(&self) -> usize {
        self.inner.row_count()
    }

    fn read_range(&self, start: usize, length: usize, columns: &[String]) -> Result<ColumnBlock> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        if self.fail.load(Ordering::SeqCst) && start >= self.fail_from {
            bail!("simulated I/O failure at row {}", start);
        }
        self.inner.read_range(start, length, columns)
    }
}

/// Drains both streams of the running epoch.
pub fn drain_epoch<S: DatasetSource + ?Sized + 'static>(
    generator: &BatchGenerator<S>,
) -> Result<(Vec<Batch>, Vec<Batch>)> {
    let mut train = Vec::new();
    while let Some(batch) = generator.next_train_batch()? {
        train.push(batch);
    }
    let mut validation = Vec::new();
    while let Some(batch) = generator.next_validation_batch()? {
        validation.push(batch);
    }
    Ok((train, validation))
}

/// Dataset row indices of `batches`, in delivery order.
pub fn row_ids(batches: &[Batch]) -> Vec<usize> {
    batches
        .iter()
        .flat_map(|b| b.row_indices().iter().copied())
        .collect()
}

pub fn sorted(mut ids: Vec<usize>) -> Vec<usize> {
    ids.sort_unstable();
    ids
}
