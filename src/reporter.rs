//! Aggregation of worker deltas into a single published status.
use std::{io::Write, sync::Arc};

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::status::ProduceStatus;

/// Receiver of status snapshots.
///
/// Called once per report, i.e. at least once per record, so implementations
/// must be cheap and must not block for long.
pub trait StatusSink: std::fmt::Debug + Send + Sync {
    fn publish(&self, status: &ProduceStatus);
}

/// Discards every snapshot.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl StatusSink for NoopSink {
    fn publish(&self, _status: &ProduceStatus) {}
}

/// Emits every snapshot as a structured `tracing` event.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl StatusSink for LogSink {
    fn publish(&self, status: &ProduceStatus) {
        info!(
            bytes_sent = status.bytes_sent,
            records_acked = status.total_acked(),
            partitions = status.records_acked.len(),
            error_count = status.error_count,
            done = status.done,
            "produce status",
        );
    }
}

/// Writes every snapshot as one JSON document per line.
pub struct JsonLinesSink<W> {
    writer: Mutex<W>,
}

impl<W> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

impl<W> std::fmt::Debug for JsonLinesSink<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonLinesSink").finish_non_exhaustive()
    }
}

impl<W> StatusSink for JsonLinesSink<W>
where
    W: Write + Send,
{
    fn publish(&self, status: &ProduceStatus) {
        let mut writer = self.writer.lock();
        let res = serde_json::to_writer(&mut *writer, status)
            .map_err(std::io::Error::from)
            .and_then(|_| writer.write_all(b"\n"))
            .and_then(|_| writer.flush());
        if let Err(e) = res {
            warn!(error=%e, "unable to write status");
        }
    }
}

impl StatusSink for watch::Sender<ProduceStatus> {
    fn publish(&self, status: &ProduceStatus) {
        // keep the latest value even when nobody is subscribed
        self.send_replace(status.clone());
    }
}

/// Folds status deltas into a running total and republishes it.
///
/// Reports are serialised: the merge and the publish happen under one lock,
/// so the sink observes a sequence of snapshots that never goes backwards.
#[derive(Debug)]
pub struct StatusReporter {
    latest: Mutex<ProduceStatus>,
    sink: Arc<dyn StatusSink>,
}

impl StatusReporter {
    pub fn new(sink: Arc<dyn StatusSink>) -> Self {
        Self {
            latest: Mutex::new(ProduceStatus::default()),
            sink,
        }
    }

    /// Merge `delta` into the running total and publish the result.
    pub fn report(&self, delta: ProduceStatus) {
        let mut latest = self.latest.lock();
        latest.merge_from(&delta);
        self.sink.publish(&latest);
    }

    /// Current running total.
    pub fn snapshot(&self) -> ProduceStatus {
        self.latest.lock().clone()
    }
}
