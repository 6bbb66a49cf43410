//! src/generator/producer.rs
//!
//! The producer thread.
//!
//! One persistent thread per activation. It sleeps on the control channel until
//! it receives `StartEpoch`, runs the epoch, acknowledges it on the done channel
//! and goes back to sleep.
//!
//! # Control Protocol
//! - `StartEpoch`: Load, shuffle, slice and enqueue every chunk of the epoch
//! - Epoch outcome: Sent on the done channel once per epoch, whether the epoch
//!   completed, was cancelled or failed
//! - Dropping the control sender stops the thread

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::collections::VecDeque;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::config::Settings;
use super::queues::BatchSender;
use crate::batch::{Batch, BatchSlicer};
use crate::chunk::ChunkLoader;
use crate::error::{GeneratorError, Result};
use crate::partition::{EpochPlan, Range, Split};
use crate::shuffle::Shuffler;
use crate::source::DatasetSource;

/// Work for one epoch.
pub(crate) struct EpochJob {
    pub plan: EpochPlan,
    pub sender: BatchSender,
}

pub(crate) enum ProducerCommand {
    StartEpoch(EpochJob),
}

/// How the producer left an epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EpochOutcome {
    Completed,
    Cancelled,
    Failed,
}

/// Receiving end of the producer's one-per-epoch acknowledgements.
pub(crate) struct EpochAcks(Receiver<EpochOutcome>);

impl EpochAcks {
    /// Waits for the acknowledgement of the running epoch.
    pub fn wait(&self, timeout: Duration) -> Result<EpochOutcome> {
        match self.0.recv_timeout(timeout) {
            Ok(outcome) => Ok(outcome),
            Err(RecvTimeoutError::Timeout) => Err(GeneratorError::Timeout(timeout)),
            Err(RecvTimeoutError::Disconnected) => Err(GeneratorError::ProducerLost),
        }
    }
}

/// Handle to the running producer thread.
pub(crate) struct Producer {
    control_tx: Option<Sender<ProducerCommand>>,
    done_rx: Receiver<EpochOutcome>,
    thread: Option<thread::JoinHandle<()>>,
}

impl Producer {
    pub fn spawn<S>(source: Arc<S>, settings: Arc<Settings>) -> Result<Self>
    where
        S: DatasetSource + ?Sized + 'static,
    {
        let (control_tx, control_rx) = bounded::<ProducerCommand>(1);
        let (done_tx, done_rx) = bounded::<EpochOutcome>(1);

        let thread = thread::Builder::new()
            .name("batch-producer".to_string())
            .spawn(move || {
                let shuffler = Shuffler::new(settings.shuffle, settings.seed);
                // Runs until the generator drops the control sender
                while let Ok(ProducerCommand::StartEpoch(job)) = control_rx.recv() {
                    let outcome = run_epoch(source.as_ref(), &settings, &shuffler, job);
                    if done_tx.send(outcome).is_err() {
                        break;
                    }
                }
                debug!("producer thread exiting");
            })
            .map_err(|e| GeneratorError::Spawn(Arc::new(e)))?;

        Ok(Self {
            control_tx: Some(control_tx),
            done_rx,
            thread: Some(thread),
        })
    }

    pub fn start_epoch(&self, job: EpochJob) -> Result<()> {
        self.control_tx
            .as_ref()
            .ok_or(GeneratorError::ProducerLost)?
            .send(ProducerCommand::StartEpoch(job))
            .map_err(|_| GeneratorError::ProducerLost)
    }

    /// Handle for waiting on epoch acknowledgements without borrowing the producer.
    pub fn acks(&self) -> EpochAcks {
        EpochAcks(self.done_rx.clone())
    }

    /// Stops the thread without waiting for it. Used when the producer is stuck
    /// in a source read; it exits once the read returns.
    pub fn detach(mut self) {
        self.control_tx.take();
        self.thread.take();
    }

    /// Stops the thread and waits for it to exit.
    pub fn shutdown(&mut self) -> Result<()> {
        self.control_tx.take();
        match self.thread.take() {
            Some(handle) => handle.join().map_err(|_| GeneratorError::ProducerLost),
            None => Ok(()),
        }
    }
}

impl Drop for Producer {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

/// Emits the training and validation streams of one epoch side by side.
///
/// Each stream keeps the batches of its last sliced chunk pending. When both
/// streams have a batch ready it goes to whichever queue has room, so the
/// caller may drain one stream before the other or alternate between them.
fn run_epoch<S: DatasetSource + ?Sized>(
    source: &S,
    settings: &Settings,
    shuffler: &Shuffler,
    job: EpochJob,
) -> EpochOutcome {
    let EpochJob { plan, mut sender } = job;
    let epoch = plan.epoch();
    let loader = ChunkLoader::new(source, settings.layout.columns());
    let mut train = StreamCursor::new(settings, &plan, Split::Train);
    let mut validation = StreamCursor::new(settings, &plan, Split::Validation);

    let outcome = match feed(&loader, shuffler, &plan, &mut sender, &mut train, &mut validation) {
        Ok(()) => EpochOutcome::Completed,
        Err(outcome) => outcome,
    };

    sender.signal().mark_finished();
    match outcome {
        EpochOutcome::Completed => debug!(epoch, "producer finished epoch"),
        EpochOutcome::Cancelled => debug!(epoch, "producer cancelled"),
        EpochOutcome::Failed => {}
    }
    outcome
}

fn feed<S: DatasetSource + ?Sized>(
    loader: &ChunkLoader<'_, S>,
    shuffler: &Shuffler,
    plan: &EpochPlan,
    sender: &mut BatchSender,
    train: &mut StreamCursor<'_>,
    validation: &mut StreamCursor<'_>,
) -> std::result::Result<(), EpochOutcome> {
    loop {
        train.refill(loader, shuffler, plan, sender)?;
        validation.refill(loader, shuffler, plan, sender)?;

        let sent = match (train.pending.pop_front(), validation.pending.pop_front()) {
            (Some(t), Some(v)) => match sender.send_either(t, v) {
                Some((Split::Train, v)) => {
                    validation.pending.push_front(v);
                    true
                }
                Some((Split::Validation, t)) => {
                    train.pending.push_front(t);
                    true
                }
                None => false,
            },
            (Some(t), None) => sender.send(Split::Train, t),
            (None, Some(v)) => sender.send(Split::Validation, v),
            (None, None) => return Ok(()),
        };
        if !sent {
            return Err(EpochOutcome::Cancelled);
        }
    }
}

/// Loading position of one stream within the epoch.
struct StreamCursor<'p> {
    split: Split,
    groups: std::slice::Iter<'p, Vec<Range>>,
    next_chunk: usize,
    slicer: BatchSlicer,
    // Sliced batches not yet enqueued, at most one chunk's worth
    pending: VecDeque<Batch>,
    flushed: bool,
    closed: bool,
}

impl<'p> StreamCursor<'p> {
    fn new(settings: &Settings, plan: &'p EpochPlan, split: Split) -> Self {
        Self {
            split,
            groups: plan.groups(split).iter(),
            next_chunk: 0,
            slicer: BatchSlicer::new(
                settings.batch_size,
                settings.drop_remainder,
                plan.epoch(),
                split,
                Arc::clone(&settings.layout),
            ),
            pending: VecDeque::new(),
            flushed: false,
            closed: false,
        }
    }

    /// Loads chunks until a batch is pending. Closes the stream's queue once
    /// every batch of the stream has been enqueued.
    fn refill<S: DatasetSource + ?Sized>(
        &mut self,
        loader: &ChunkLoader<'_, S>,
        shuffler: &Shuffler,
        plan: &EpochPlan,
        sender: &mut BatchSender,
    ) -> std::result::Result<(), EpochOutcome> {
        while self.pending.is_empty() {
            match self.groups.next() {
                Some(group) => self.load(group, loader, shuffler, plan, sender)?,
                None if !self.flushed => {
                    self.flushed = true;
                    self.pending.extend(self.slicer.finish());
                }
                None => {
                    if !self.closed {
                        self.closed = true;
                        sender.close(self.split);
                        info!(
                            epoch = plan.epoch(),
                            split = %self.split,
                            rows = plan.num_rows(self.split),
                            "stream enqueued"
                        );
                    }
                    break;
                }
            }
        }
        Ok(())
    }

    fn load<S: DatasetSource + ?Sized>(
        &mut self,
        group: &[Range],
        loader: &ChunkLoader<'_, S>,
        shuffler: &Shuffler,
        plan: &EpochPlan,
        sender: &BatchSender,
    ) -> std::result::Result<(), EpochOutcome> {
        let split = self.split;
        let index = self.next_chunk;
        self.next_chunk += 1;

        let chunk = match loader.load(index, group, || sender.is_cancelled()) {
            Ok(Some(chunk)) => chunk,
            Ok(None) => return Err(EpochOutcome::Cancelled),
            Err(err) => {
                warn!(epoch = plan.epoch(), %split, error = %err, "failed to load chunk");
                sender.signal().fail(err);
                return Err(EpochOutcome::Failed);
            }
        };

        let rows = shuffler.split(&chunk, plan);
        let batches = match self.slicer.slice(&chunk, rows.get(split)) {
            Ok(batches) => batches,
            Err(err) => {
                let first = chunk.ranges.first().map_or(0, |r| r.start);
                let err = GeneratorError::source_read(first, chunk.num_rows(), err);
                warn!(epoch = plan.epoch(), %split, error = %err, "failed to slice chunk");
                sender.signal().fail(err);
                return Err(EpochOutcome::Failed);
            }
        };
        debug!(
            epoch = plan.epoch(),
            %split,
            chunk = chunk.index,
            rows = chunk.num_rows(),
            batches = batches.len(),
            carried = self.slicer.carried_rows(),
            "loaded chunk"
        );
        self.pending.extend(batches);
        Ok(())
    }
}
