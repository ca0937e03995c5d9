//! Double-buffered aggregation.
//!
//! Pushes merge into the write side; scrapes render the read side. A single
//! background task copies write -> read every batch interval, so readers see a
//! complete snapshot at most one interval old and never wait on writers.
//! Gauge families are drained from the write side on every swap, giving
//! point-in-time values per interval; every other type keeps accumulating.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::error::Result;
use crate::labels::IdentityLabels;
use crate::model::MetricType;
use crate::obs::ObservabilitySink;
use crate::protocol::encode::Format;
use crate::store::{AggregateOptions, AggregateStore};

const MIN_BATCH_INTERVAL: Duration = Duration::from_millis(1);

/// Write-side / read-side store pair.
pub struct Aggregates {
    write: AggregateStore,
    read: AggregateStore,
    batch_interval: Duration,
    sink: Arc<dyn ObservabilitySink>,
}

/// Outcome of one swap.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SwapStats {
    /// Families copied to the read side.
    pub copied: usize,
    /// Gauge families removed from the write side.
    pub drained: usize,
}

impl Aggregates {
    pub fn new(
        batch_interval: Duration,
        options: AggregateOptions,
        sink: Arc<dyn ObservabilitySink>,
    ) -> Self {
        Self {
            write: AggregateStore::new(options.clone(), Arc::clone(&sink)),
            read: AggregateStore::new(options, Arc::clone(&sink)),
            batch_interval: batch_interval.max(MIN_BATCH_INTERVAL),
            sink,
        }
    }

    pub fn batch_interval(&self) -> Duration {
        self.batch_interval
    }

    pub fn write_side(&self) -> &AggregateStore {
        &self.write
    }

    pub fn read_side(&self) -> &AggregateStore {
        &self.read
    }

    /// Merge a pushed payload into the write side.
    pub fn ingest(&self, payload: &[u8], identity: &IdentityLabels) -> Result<()> {
        self.write.ingest(payload, identity)?;
        self.sink.record_push(identity);
        Ok(())
    }

    /// Render the read side.
    pub fn render<W: Write + ?Sized>(&self, w: &mut W, format: Format) -> Result<()> {
        self.read.render(w, format)
    }

    /// Publish the write side into the read side and drain gauges.
    ///
    /// Both directories are held exclusively for the whole copy, write side
    /// first. Read-side families absent from the write side are left as is.
    pub fn swap(&self) -> SwapStats {
        let mut write = self.write.directory().write();
        let mut read = self.read.directory().write();

        let mut drained = Vec::new();
        for (name, handle) in write.iter() {
            let family = handle.read();
            read.insert(name.clone(), Arc::new(RwLock::new(family.deep_copy())));
            if family.metric_type == MetricType::Gauge {
                drained.push(name.clone());
            }
        }
        for name in &drained {
            write.remove(name);
        }

        let stats = SwapStats {
            copied: write.len() + drained.len(),
            drained: drained.len(),
        };
        drop(read);
        drop(write);

        tracing::debug!(copied = stats.copied, drained = stats.drained, "batch swap");
        stats
    }

    /// Spawn the periodic swap task. Must be called inside a tokio runtime.
    pub fn start(self: &Arc<Self>) -> BatchScheduler {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let aggs = Arc::clone(self);
        let period = self.batch_interval;

        let handle = tokio::spawn(async move {
            // First swap one full interval after start.
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        aggs.swap();
                    }
                }
            }
            tracing::debug!("batch scheduler stopped");
        });

        let interval_ms = u64::try_from(period.as_millis()).unwrap_or(u64::MAX);
        tracing::info!(interval_ms, "batch scheduler started");
        BatchScheduler {
            stop_tx,
            handle: Some(handle),
            state: SchedulerState::Running,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Running,
    Stopped,
}

/// Handle to the periodic swap task.
pub struct BatchScheduler {
    stop_tx: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
    state: SchedulerState,
}

impl BatchScheduler {
    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// Stop the task and wait for it. A swap already running completes first.
    /// Calling again after the scheduler stopped is a no-op.
    pub async fn stop(&mut self) {
        if self.state == SchedulerState::Stopped {
            return;
        }
        let _ = self.stop_tx.send(true);
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "batch scheduler task ended abnormally");
            }
        }
        self.state = SchedulerState::Stopped;
    }
}

impl Drop for BatchScheduler {
    fn drop(&mut self) {
        let _ = self.stop_tx.send(true);
    }
}
