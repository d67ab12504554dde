//! # Dispatcher
//!
//! Downstream side of the replay.
//!
//! Responsibilities:
//! - Accept records from the core through [`DispatcherPublisher`]
//! - Fan out to every configured sink, each behind its own queue
//! - Apply each sink's overflow policy (block or drop newest)

pub mod dispatcher;
pub mod error;
pub mod handle;
pub mod metrics;
pub mod publisher;
pub mod sinks;

pub use contracts::{DataSink, SinkRecord};
pub use dispatcher::{
    create_dispatcher, DispatchSummary, Dispatcher, DispatcherBuilder, DispatcherConfig,
};
pub use error::DispatcherError;
pub use handle::{Delivery, SinkHandle};
pub use metrics::{MetricsSnapshot, SinkMetrics};
pub use publisher::{publish_channel, DispatcherPublisher};
pub use sinks::{
    FileSink, FileSinkConfig, LogSink, NetworkFormat, NetworkSink, NetworkSinkConfig,
    VisualizationFrame,
};
