//! pushprism core: the aggregation engine behind the push gateway.
//!
//! Producers push Prometheus exposition payloads; the core parses them into a
//! typed model, normalizes series identity, merges each family into a
//! write-side store and periodically publishes a deep copy to a read-side
//! store that scrapes are served from. It carries no HTTP or config file
//! handling so it can be embedded by the gateway and by tests alike.
//!
//! # Guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here. Malformed pushes
//! surface as `PushPrismError` and never take the process down.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod labels;
pub mod merge;
pub mod model;
pub mod obs;
pub mod protocol;
pub mod scheduler;
pub mod store;

/// Shared result type.
pub use error::{PushPrismError, Result};

pub use labels::{IdentityLabels, IgnoredLabels};
pub use merge::GaugeBehavior;
pub use model::{MetricFamily, MetricType};
pub use obs::{NoopSink, ObservabilitySink};
pub use protocol::encode::Format;
pub use scheduler::{Aggregates, BatchScheduler, SchedulerState};
pub use store::{AggregateOptions, AggregateStore};
