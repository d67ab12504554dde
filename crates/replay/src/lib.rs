//! # Replay
//!
//! Temporal replay of keyed sample streams.
//!
//! Two drivers share the same per-key routines:
//! - [`Coordinator`]: batch mode. Lists keys, keeps this replica's shard and
//!   replays each key in a bounded pool with origin-anchored pacing
//! - [`DemuxScheduler`]: streaming mode. Routes interleaved records to one
//!   bounded lane per key, each paced against its previous forwarded sample
//!
//! ## Usage
//!
//! ```ignore
//! use replay::{Coordinator, CoordinatorConfig};
//!
//! let coordinator = Coordinator::new(source, publisher, factory, config, cancel);
//! let report = coordinator.run().await?;
//! println!("{} keys replayed", report.completed);
//! ```

mod coordinator;
mod demux;
mod emitter;
mod error;
mod pacer;
mod queue;
mod routine;
mod shard;

#[cfg(test)]
mod testing;

pub use coordinator::{Coordinator, CoordinatorConfig, CoordinatorReport};
pub use demux::{DemuxConfig, DemuxReport, DemuxScheduler, KeyRegistry, DEFAULT_MAX_ACTIVE_KEYS};
pub use emitter::SampleEmitter;
pub use error::{ReplayError, Result};
pub use pacer::{scaled_delay, ChainPacer, OriginPacer, PacerAnchor};
pub use queue::{bounded_queue, QueueItem, QueueReceiver, QueueSender, DEFAULT_QUEUE_CAPACITY};
pub use routine::{replay_batch, run_lane, LaneReport};
pub use shard::ShardAssignment;
