use crossbeam_channel::select;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

use super::config::{GeneratorConfig, Settings};
use super::producer::{EpochJob, Producer};
use super::queues::{epoch_queues, EpochQueues, EpochSignal};
use super::GeneratorState;
use crate::batch::Batch;
use crate::error::{GeneratorError, LifecycleError, Result};
use crate::partition::{EpochPlan, PlanSummary, RangePartitioner, Split};
use crate::source::DatasetSource;

/// Streams a dataset as shuffled train and validation batches, one epoch at a time.
///
/// A background producer thread loads one chunk of ranges at a time, shuffles
/// and slices it, and pushes the batches into two bounded queues. The caller
/// drives the lifecycle:
///
/// ```ignore
/// let generator = BatchGenerator::new(source, config)?;
/// generator.activate()?;
/// for _ in 0..generator.num_epochs() {
///     generator.activate_epoch()?;
///     while let Some(batch) = generator.next_train_batch()? { /* train */ }
///     while let Some(batch) = generator.next_validation_batch()? { /* evaluate */ }
///     generator.deactivate_epoch()?;
/// }
/// generator.deactivate()?;
/// ```
///
/// All methods take `&self`, so the training and validation consumers may run on
/// different threads.
pub struct BatchGenerator<S: DatasetSource + ?Sized + 'static> {
    source: Arc<S>,
    config: GeneratorConfig,
    settings: Arc<Settings>,
    partitioner: RangePartitioner,
    // Serialises lifecycle calls; held across producer waits, unlike `inner`
    lifecycle: Mutex<()>,
    inner: Mutex<Inner>,
}

struct Inner {
    state: GeneratorState,
    producer: Option<Producer>,
    epoch: Option<RunningEpoch>,
    epochs_started: usize,
    // Plan of the running epoch, or of the next one to run
    plan: EpochPlan,
}

struct RunningEpoch {
    number: usize,
    queues: EpochQueues,
    train_started: bool,
}

impl Inner {
    fn resolved_state(&self) -> GeneratorState {
        match (&self.state, &self.epoch) {
            (GeneratorState::EpochRunning, Some(running))
                if running.queues.signal().is_finished() =>
            {
                GeneratorState::EpochDraining
            }
            (state, _) => *state,
        }
    }
}

impl<S: DatasetSource + 'static> BatchGenerator<S> {
    /// Creates a generator over `source`.
    ///
    /// # Errors
    /// - `GeneratorError::Config` for any invalid parameter. No row is read.
    pub fn new(source: S, config: GeneratorConfig) -> Result<Self> {
        Self::from_shared(Arc::new(source), config)
    }
}

impl<S: DatasetSource + ?Sized + 'static> BatchGenerator<S> {
    /// Creates a generator over a source that is shared with other owners.
    pub fn from_shared(source: Arc<S>, config: GeneratorConfig) -> Result<Self> {
        let settings = config.resolve(source.as_ref())?;
        let partitioner = RangePartitioner::new(
            source.row_count(),
            settings.range_size,
            settings.ranges_per_chunk,
            settings.validation_split,
            settings.shuffle,
            settings.seed,
        )?;
        let plan = partitioner.plan(0);

        info!(
            rows = partitioner.num_rows(),
            ranges = partitioner.num_ranges(),
            validation_ranges = partitioner.num_validation_ranges(),
            chunk_size = settings.chunk_size,
            batch_size = settings.batch_size,
            queue_capacity = settings.queue_capacity,
            seed = settings.seed,
            "batch generator created"
        );

        let config = GeneratorConfig {
            seed: Some(settings.seed),
            ..config
        };

        Ok(Self {
            source,
            config,
            settings: Arc::new(settings),
            partitioner,
            lifecycle: Mutex::new(()),
            inner: Mutex::new(Inner {
                state: GeneratorState::Inactive,
                producer: None,
                epoch: None,
                epochs_started: 0,
                plan,
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn serialize(&self) -> MutexGuard<'_, ()> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Starts the producer thread. No batches flow until `activate_epoch`.
    ///
    /// Activating an already active generator is a no-op.
    pub fn activate(&self) -> Result<()> {
        let _serial = self.serialize();
        let mut inner = self.lock();
        match inner.state {
            GeneratorState::Inactive => {}
            GeneratorState::ShuttingDown => {
                return Err(LifecycleError::InvalidState {
                    operation: "activate",
                    state: GeneratorState::ShuttingDown,
                }
                .into())
            }
            _ => return Ok(()),
        }

        let producer = Producer::spawn(Arc::clone(&self.source), Arc::clone(&self.settings))?;
        inner.producer = Some(producer);
        inner.state = GeneratorState::Active;
        info!("batch generator activated");
        Ok(())
    }

    /// Stops the producer thread, ending any running epoch first.
    ///
    /// Deactivating an inactive generator is a no-op.
    pub fn deactivate(&self) -> Result<()> {
        let _serial = self.serialize();
        if self.lock().state == GeneratorState::Inactive {
            return Ok(());
        }
        self.teardown(GeneratorState::Inactive)
    }

    /// Starts producing the next epoch.
    ///
    /// # Errors
    /// - `LifecycleError::InvalidState` unless the generator is `Active`
    /// - `LifecycleError::EpochLimitReached` once `num_epochs` epochs were started
    pub fn activate_epoch(&self) -> Result<()> {
        let _serial = self.serialize();
        let mut inner = self.lock();
        let state = inner.resolved_state();
        if state != GeneratorState::Active {
            return Err(LifecycleError::InvalidState {
                operation: "activate_epoch",
                state,
            }
            .into());
        }
        if inner.epochs_started >= self.settings.num_epochs {
            return Err(LifecycleError::EpochLimitReached {
                num_epochs: self.settings.num_epochs,
            }
            .into());
        }

        let number = inner.epochs_started;
        let plan = inner.plan.clone();
        let (sender, queues) = epoch_queues(self.settings.queue_capacity);

        let producer = inner.producer.as_ref().ok_or(GeneratorError::ProducerLost)?;
        producer.start_epoch(EpochJob { plan, sender })?;

        let summary = inner.plan.summary(self.settings.batch_size, self.settings.drop_remainder);
        info!(
            epoch = number,
            train_rows = summary.train.rows,
            train_batches = summary.train.batches,
            validation_rows = summary.validation.rows,
            validation_batches = summary.validation.batches,
            "epoch started"
        );
        debug!("epoch plan\n{}", summary);

        inner.epochs_started += 1;
        inner.epoch = Some(RunningEpoch {
            number,
            queues,
            train_started: false,
        });
        inner.state = GeneratorState::EpochRunning;
        Ok(())
    }

    /// Ends the running epoch and returns to `Active`.
    ///
    /// Interrupts the producer if it is still working, drops every queued batch
    /// and waits for the producer to acknowledge. Consumers blocked on a queue
    /// see end of epoch.
    ///
    /// # Errors
    /// - `LifecycleError::InvalidState` if no epoch is running
    /// - `GeneratorError::Timeout` / `ProducerLost` if the producer does not
    ///   acknowledge; the generator is then `Inactive`
    pub fn deactivate_epoch(&self) -> Result<()> {
        let _serial = self.serialize();
        self.finish_epoch()
    }

    // Callers hold the lifecycle lock. `inner` is released while waiting for the
    // producer so consumers see the cancelled epoch at once.
    fn finish_epoch(&self) -> Result<()> {
        let (number, acks) = {
            let mut inner = self.lock();
            let state = inner.resolved_state();
            let Some(running) = inner.epoch.as_mut() else {
                return Err(LifecycleError::InvalidState {
                    operation: "deactivate_epoch",
                    state,
                }
                .into());
            };
            running.queues.cancel();
            if let Some(err) = running.queues.signal().failure() {
                warn!(epoch = running.number, error = %err, "epoch ended after a producer failure");
            }
            let number = running.number;
            (number, inner.producer.as_ref().map(Producer::acks))
        };

        let outcome = acks
            .ok_or(GeneratorError::ProducerLost)
            .and_then(|acks| acks.wait(self.settings.timeout));

        let mut inner = self.lock();
        // Drops every batch still queued
        inner.epoch = None;
        inner.plan = self.partitioner.plan(inner.epochs_started);
        match outcome {
            Ok(outcome) => {
                inner.state = GeneratorState::Active;
                info!(epoch = number, ?outcome, "epoch deactivated");
                Ok(())
            }
            Err(err) => {
                warn!(epoch = number, error = %err, "producer did not acknowledge the epoch");
                if let Some(producer) = inner.producer.take() {
                    producer.detach();
                }
                inner.state = GeneratorState::Inactive;
                Err(err)
            }
        }
    }

    fn teardown(&self, final_state: GeneratorState) -> Result<()> {
        let mut result = Ok(());
        let running = self.lock().epoch.is_some();
        if running {
            result = self.finish_epoch();
        }
        let producer = self.lock().producer.take();
        if let Some(mut producer) = producer {
            let joined = producer.shutdown();
            if result.is_ok() {
                result = joined;
            }
        }
        self.lock().state = final_state;
        info!(state = ?final_state, "batch generator deactivated");
        result
    }

    // =========================================================================
    // Consumers
    // =========================================================================

    /// Next training batch, or `None` at end of epoch.
    ///
    /// Blocks while the queue is empty and the producer is still working.
    ///
    /// # Errors
    /// - `GeneratorError::SourceRead` if the producer failed this epoch. Batches
    ///   enqueued before the failure are delivered first.
    /// - `GeneratorError::Timeout` if nothing arrives within the configured timeout
    /// - `LifecycleError::InvalidState` outside of an epoch
    pub fn next_train_batch(&self) -> Result<Option<Batch>> {
        self.next_batch(Split::Train)
    }

    /// Next validation batch, or `None` at end of epoch.
    ///
    /// Both streams are produced side by side, so validation batches may be
    /// taken after the training stream is drained or alternately with training
    /// batches on the same thread.
    ///
    /// # Errors
    /// Same as [`BatchGenerator::next_train_batch`], plus
    /// `LifecycleError::ValidationBeforeTraining` if no training batch was
    /// requested yet in this epoch.
    pub fn next_validation_batch(&self) -> Result<Option<Batch>> {
        self.next_batch(Split::Validation)
    }

    fn next_batch(&self, split: Split) -> Result<Option<Batch>> {
        let (rx, cancelled, signal) = {
            let mut inner = self.lock();
            let state = inner.resolved_state();
            let Some(running) = inner.epoch.as_mut() else {
                let operation = match split {
                    Split::Train => "next_train_batch",
                    Split::Validation => "next_validation_batch",
                };
                return Err(LifecycleError::InvalidState { operation, state }.into());
            };
            match split {
                Split::Train => running.train_started = true,
                Split::Validation if !running.train_started => {
                    return Err(LifecycleError::ValidationBeforeTraining {
                        epoch: running.number,
                    }
                    .into())
                }
                Split::Validation => {}
            }
            (
                running.queues.receiver(split).clone(),
                running.queues.cancelled().clone(),
                Arc::clone(running.queues.signal()),
            )
        };

        // The lock is released while waiting so other consumers and
        // deactivate_epoch can proceed.
        if signal.is_cancelled() {
            return Ok(None);
        }
        let timeout = self.settings.timeout;
        select! {
            recv(rx) -> msg => match msg {
                Ok(_) if signal.is_cancelled() => Ok(None),
                Ok(batch) => Ok(Some(batch)),
                Err(_) => end_of_stream(&signal, split),
            },
            recv(cancelled) -> _ => Ok(None),
            default(timeout) => Err(GeneratorError::Timeout(timeout)),
        }
    }

    // =========================================================================
    // Properties
    // =========================================================================

    /// Current lifecycle state.
    pub fn state(&self) -> GeneratorState {
        self.lock().resolved_state()
    }

    /// Configuration the generator runs with, including the seed actually used.
    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    pub fn seed(&self) -> u64 {
        self.settings.seed
    }

    pub fn num_epochs(&self) -> usize {
        self.settings.num_epochs
    }

    pub fn batch_size(&self) -> usize {
        self.settings.batch_size
    }

    pub fn num_rows(&self) -> usize {
        self.partitioner.num_rows()
    }

    pub fn num_ranges(&self) -> usize {
        self.partitioner.num_ranges()
    }

    /// Epochs started so far.
    pub fn epochs_started(&self) -> usize {
        self.lock().epochs_started
    }

    /// Number of the running epoch, if any.
    pub fn current_epoch(&self) -> Option<usize> {
        self.lock().epoch.as_ref().map(|running| running.number)
    }

    /// Every loaded column, in batch order.
    pub fn columns(&self) -> Vec<String> {
        self.settings.layout.columns().to_vec()
    }

    /// Feature columns, i.e. every loaded column that is not a target.
    pub fn train_columns(&self) -> Vec<String> {
        self.settings.layout.feature_columns()
    }

    pub fn target_columns(&self) -> Vec<String> {
        self.settings.layout.target_columns()
    }

    /// Row and batch distribution of the running epoch, or of the next one.
    pub fn plan_summary(&self) -> PlanSummary {
        self.lock()
            .plan
            .summary(self.settings.batch_size, self.settings.drop_remainder)
    }

    pub fn number_of_training_batches(&self) -> usize {
        self.plan_summary().train.batches
    }

    pub fn number_of_validation_batches(&self) -> usize {
        self.plan_summary().validation.batches
    }

    /// Rows in the short final training batch, 0 if the stream divides evenly.
    pub fn train_remainder_rows(&self) -> usize {
        self.plan_summary().train.remainder_rows
    }

    /// Rows in the short final validation batch, 0 if the stream divides evenly.
    pub fn validation_remainder_rows(&self) -> usize {
        self.plan_summary().validation.remainder_rows
    }

    /// Batches waiting in the queue of `split`. Always 0 outside of an epoch.
    pub fn pending_batches(&self, split: Split) -> usize {
        self.lock()
            .epoch
            .as_ref()
            .map_or(0, |running| running.queues.pending(split))
    }
}

fn end_of_stream(signal: &EpochSignal, split: Split) -> Result<Option<Batch>> {
    if let Some(err) = signal.failure() {
        return Err(err);
    }
    if signal.is_done(split) || signal.is_cancelled() {
        Ok(None)
    } else {
        Err(GeneratorError::ProducerLost)
    }
}

impl<S: DatasetSource + ?Sized + 'static> Drop for BatchGenerator<S> {
    fn drop(&mut self) {
        let _serial = self.serialize();
        {
            let mut inner = self.lock();
            if inner.state == GeneratorState::Inactive {
                return;
            }
            inner.state = GeneratorState::ShuttingDown;
        }
        if let Err(err) = self.teardown(GeneratorState::ShuttingDown) {
            warn!(error = %err, "batch generator teardown failed");
        }
    }
}
