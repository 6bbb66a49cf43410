//! Per-epoch train/validation queues.
//!
//! Every epoch gets a fresh pair of bounded channels plus a cancel channel that
//! is never written to: dropping its only sender disconnects it, which wakes a
//! producer blocked on a full queue and consumers blocked on an empty one, both
//! waiting through `select!`.
//!
//! ```text
//!  producer                          consumers
//!  ────────                          ─────────
//!  BatchSender ──train (bounded Q)──→ train_rx
//!              ──valid (bounded Q)──→ validation_rx
//!  cancel_rx   ←──── dropped ─────── cancel_tx (deactivate_epoch / teardown)
//!                                    cancelled (consumer clone of cancel_rx)
//! ```

use crossbeam_channel::{bounded, select, Receiver, Sender, TryRecvError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::batch::Batch;
use crate::error::GeneratorError;
use crate::partition::Split;

/// Progress of one epoch, shared by the producer and the consumers.
#[derive(Debug, Default)]
pub(crate) struct EpochSignal {
    train_done: AtomicBool,
    validation_done: AtomicBool,
    finished: AtomicBool,
    cancelled: AtomicBool,
    failure: Mutex<Option<GeneratorError>>,
}

impl EpochSignal {
    /// Every batch of `split` has been enqueued.
    pub fn mark_done(&self, split: Split) {
        match split {
            Split::Train => self.train_done.store(true, Ordering::SeqCst),
            Split::Validation => self.validation_done.store(true, Ordering::SeqCst),
        }
    }

    pub fn is_done(&self, split: Split) -> bool {
        match split {
            Split::Train => self.train_done.load(Ordering::SeqCst),
            Split::Validation => self.validation_done.load(Ordering::SeqCst),
        }
    }

    /// The producer has stopped working on this epoch, for whatever reason.
    pub fn mark_finished(&self) {
        self.finished.store(true, Ordering::SeqCst);
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Records the error that aborted the epoch. The first one wins.
    pub fn fail(&self, err: GeneratorError) {
        if let Ok(mut failure) = self.failure.lock() {
            failure.get_or_insert(err);
        }
    }

    pub fn failure(&self) -> Option<GeneratorError> {
        self.failure.lock().ok().and_then(|f| f.clone())
    }
}

/// Producer half of an epoch's queues.
pub(crate) struct BatchSender {
    train: Option<Sender<Batch>>,
    validation: Option<Sender<Batch>>,
    cancel: Receiver<()>,
    signal: Arc<EpochSignal>,
}

impl BatchSender {
    /// Enqueues `batch`, blocking while the queue is full.
    ///
    /// Returns false once the epoch is cancelled or the consumers are gone.
    pub fn send(&self, split: Split, batch: Batch) -> bool {
        let tx = match split {
            Split::Train => &self.train,
            Split::Validation => &self.validation,
        };
        let Some(tx) = tx else {
            return false;
        };
        if self.is_cancelled() {
            return false;
        }
        select! {
            send(tx, batch) -> res => res.is_ok(),
            recv(self.cancel) -> _ => false,
        }
    }

    /// Enqueues whichever of `train` and `validation` finds room first,
    /// blocking while both queues are full.
    ///
    /// Returns the split that was sent together with the batch that was not,
    /// or `None` once the epoch is cancelled or the consumers are gone.
    pub fn send_either(&self, train: Batch, validation: Batch) -> Option<(Split, Batch)> {
        let (Some(train_tx), Some(validation_tx)) = (&self.train, &self.validation) else {
            return None;
        };
        if self.is_cancelled() {
            return None;
        }
        select! {
            send(train_tx, train) -> res => res.ok().map(|()| (Split::Train, validation)),
            send(validation_tx, validation) -> res => res.ok().map(|()| (Split::Validation, train)),
            recv(self.cancel) -> _ => None,
        }
    }

    /// Marks `split` as complete and closes its queue.
    pub fn close(&mut self, split: Split) {
        self.signal.mark_done(split);
        match split {
            Split::Train => self.train = None,
            Split::Validation => self.validation = None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.signal.is_cancelled()
            || matches!(self.cancel.try_recv(), Err(TryRecvError::Disconnected))
    }

    pub fn signal(&self) -> &EpochSignal {
        &self.signal
    }
}

/// Consumer half of an epoch's queues, owned by the generator.
pub(crate) struct EpochQueues {
    train: Receiver<Batch>,
    validation: Receiver<Batch>,
    cancel: Option<Sender<()>>,
    cancelled: Receiver<()>,
    signal: Arc<EpochSignal>,
}

impl EpochQueues {
    pub fn receiver(&self, split: Split) -> &Receiver<Batch> {
        match split {
            Split::Train => &self.train,
            Split::Validation => &self.validation,
        }
    }

    pub fn signal(&self) -> &Arc<EpochSignal> {
        &self.signal
    }

    /// Disconnects when the epoch is cancelled.
    pub fn cancelled(&self) -> &Receiver<()> {
        &self.cancelled
    }

    /// Batches currently waiting in the queue of `split`.
    pub fn pending(&self, split: Split) -> usize {
        self.receiver(split).len()
    }

    /// Interrupts the producer and makes waiting consumers see end of epoch.
    pub fn cancel(&mut self) {
        self.signal.cancel();
        self.cancel.take();
    }
}

/// Creates the queues of one epoch, each holding at most `capacity` batches.
pub(crate) fn epoch_queues(capacity: usize) -> (BatchSender, EpochQueues) {
    let (train_tx, train_rx) = bounded(capacity);
    let (validation_tx, validation_rx) = bounded(capacity);
    let (cancel_tx, cancel_rx) = bounded(0);
    let signal = Arc::new(EpochSignal::default());

    let sender = BatchSender {
        train: Some(train_tx),
        validation: Some(validation_tx),
        cancel: cancel_rx.clone(),
        signal: Arc::clone(&signal),
    };
    let queues = EpochQueues {
        train: train_rx,
        validation: validation_rx,
        cancel: Some(cancel_tx),
        cancelled: cancel_rx,
        signal,
    };
    (sender, queues)
}
