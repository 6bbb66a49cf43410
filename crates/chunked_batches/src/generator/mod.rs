//! src/generator/mod.rs
//!
//! This module implements the `BatchGenerator`.
//!
//! The `BatchGenerator` streams a dataset that does not fit in memory into
//! train and validation batches. It coordinates the `RangePartitioner`,
//! `ChunkLoader`, `Shuffler` and `BatchSlicer` on a producer thread and hands
//! the batches to the caller through two bounded queues.
//!
//! # Architecture Overview
//!
//! ```text
//!                 ┌──────────────────┐
//!                 │ RangePartitioner │ (ranges + per-epoch train/validation plan)
//!                 └────────┬─────────┘
//!                          │ chunk groups per stream
//!                          ↓
//!   ┌───────────────────────────────────────────────────┐
//!   │ [batch-producer thread]                           │
//!   │   ChunkLoader   (DatasetSource::read_range)       │
//!   │        ↓                                          │
//!   │   Shuffler      (split by assignment, permute)    │
//!   │        ↓                                          │
//!   │   BatchSlicer   (batch_size rows, carry remainder)│
//!   └────────┬───────────────────────────┬──────────────┘
//!            │ train (bounded)           │ validation (bounded)
//!            ↓                           ↓
//!    next_train_batch()         next_validation_batch()
//! ```
//!
//! # Module Structure
//!
//! ```text
//! src/generator/
//! ├── mod.rs               # Public API exports, GeneratorState, architecture docs
//! ├── config.rs            # GeneratorConfig, builder, and validation
//! ├── batch_generator.rs   # BatchGenerator lifecycle and consumers
//! ├── producer.rs          # Producer thread and its control protocol
//! ├── queues.rs            # Per-epoch bounded queues and cancellation
//! └── guard.rs             # Activation / EpochGuard scope guards
//! ```
//!
//! # Lifecycle
//!
//! ```text
//!  Inactive ──activate──→ Active ──activate_epoch──→ EpochRunning
//!     ↑                    │  ↑                          │ producer done
//!     └────deactivate──────┘  └────deactivate_epoch──── EpochDraining
//!
//!  any state ──drop──→ ShuttingDown
//! ```
//!
//! The producer feeds both queues side by side and always sends to a queue with
//! room, so a single thread can either drain the training stream and then the
//! validation stream, or alternate between them.
//!
//! # Memory Usage
//! - One chunk (at most `chunk_size` rows) being loaded by the producer
//! - Up to one chunk's worth of sliced batches waiting per stream
//! - Up to `queue_capacity` batches per queue
//!
//! ## Notes:
//! - Enable `shuffle = true` for better model generalization
//! - Reduce `chunk_size` or `queue_capacity` if out-of-memory.

mod batch_generator;
mod config;
mod guard;
mod producer;
mod queues;

pub use batch_generator::BatchGenerator;
pub use config::{GeneratorConfig, GeneratorConfigBuilder};
pub use guard::{Activation, BatchIter, EpochGuard};

/// Lifecycle state of a `BatchGenerator`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeneratorState {
    /// No producer thread.
    Inactive,
    /// Producer thread running, waiting for an epoch.
    Active,
    /// Producer working on an epoch.
    EpochRunning,
    /// Producer done with the epoch; queues may still hold batches.
    EpochDraining,
    /// Generator is being dropped.
    ShuttingDown,
}
