//! Scoped lifecycle guards.
//!
//! `Activation` and `EpochGuard` pair every activation with its deactivation on
//! all exit paths, including early returns and panics in the consumer.
//!
//! ```ignore
//! let active = generator.activation()?;
//! for _ in 0..generator.num_epochs() {
//!     let epoch = active.epoch()?;
//!     for batch in epoch.train_batches() {
//!         let batch = batch?;
//!     }
//!     for batch in epoch.validation_batches() {
//!         let batch = batch?;
//!     }
//! } // each EpochGuard calls deactivate_epoch here
//! // Activation calls deactivate here
//! ```

use tracing::warn;

use super::batch_generator::BatchGenerator;
use super::GeneratorState;
use crate::batch::Batch;
use crate::error::Result;
use crate::partition::Split;
use crate::source::DatasetSource;

impl<S: DatasetSource + ?Sized + 'static> BatchGenerator<S> {
    /// Activates the generator until the returned guard is dropped.
    pub fn activation(&self) -> Result<Activation<'_, S>> {
        self.activate()?;
        Ok(Activation { generator: self })
    }

    /// Runs one epoch until the returned guard is dropped.
    pub fn epoch(&self) -> Result<EpochGuard<'_, S>> {
        self.activate_epoch()?;
        Ok(EpochGuard { generator: self })
    }
}

/// Keeps the generator active. Calls `deactivate` on drop.
pub struct Activation<'g, S: DatasetSource + ?Sized + 'static> {
    generator: &'g BatchGenerator<S>,
}

impl<'g, S: DatasetSource + ?Sized + 'static> Activation<'g, S> {
    pub fn generator(&self) -> &'g BatchGenerator<S> {
        self.generator
    }

    /// Starts the next epoch.
    pub fn epoch(&self) -> Result<EpochGuard<'g, S>> {
        self.generator.epoch()
    }
}

impl<S: DatasetSource + ?Sized + 'static> Drop for Activation<'_, S> {
    fn drop(&mut self) {
        if let Err(err) = self.generator.deactivate() {
            warn!(error = %err, "deactivate failed while dropping activation guard");
        }
    }
}

/// Keeps one epoch running. Calls `deactivate_epoch` on drop.
pub struct EpochGuard<'g, S: DatasetSource + ?Sized + 'static> {
    generator: &'g BatchGenerator<S>,
}

impl<'g, S: DatasetSource + ?Sized + 'static> EpochGuard<'g, S> {
    pub fn train_batches(&self) -> BatchIter<'g, S> {
        BatchIter::new(self.generator, Split::Train)
    }

    pub fn validation_batches(&self) -> BatchIter<'g, S> {
        BatchIter::new(self.generator, Split::Validation)
    }

    pub fn generator(&self) -> &'g BatchGenerator<S> {
        self.generator
    }
}

impl<S: DatasetSource + ?Sized + 'static> Drop for EpochGuard<'_, S> {
    fn drop(&mut self) {
        if matches!(
            self.generator.state(),
            GeneratorState::EpochRunning | GeneratorState::EpochDraining
        ) {
            if let Err(err) = self.generator.deactivate_epoch() {
                warn!(error = %err, "deactivate_epoch failed while dropping epoch guard");
            }
        }
    }
}

/// Batches of one stream until end of epoch.
///
/// Yields `Err` at most once; the iterator is fused after an error or after the
/// last batch.
pub struct BatchIter<'g, S: DatasetSource + ?Sized + 'static> {
    generator: &'g BatchGenerator<S>,
    split: Split,
    done: bool,
}

impl<'g, S: DatasetSource + ?Sized + 'static> BatchIter<'g, S> {
    fn new(generator: &'g BatchGenerator<S>, split: Split) -> Self {
        Self {
            generator,
            split,
            done: false,
        }
    }
}

impl<S: DatasetSource + ?Sized + 'static> Iterator for BatchIter<'_, S> {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let next = match self.split {
            Split::Train => self.generator.next_train_batch(),
            Split::Validation => self.generator.next_validation_batch(),
        };
        match next {
            Ok(Some(batch)) => Some(Ok(batch)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

impl<S: DatasetSource + ?Sized + 'static> std::iter::FusedIterator for BatchIter<'_, S> {}
