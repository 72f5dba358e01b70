//! Production loop for a single partition.
use std::{sync::Arc, time::Duration};

use futures::future::BoxFuture;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    client::{ProducerClient, error::Result as ClientResult},
    error::{Error, Result},
    generator::RecordSource,
    limiter::{Acquire, RateLimiter},
    reporter::StatusReporter,
    status::ProduceStatus,
};

/// Why a worker stopped without failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerOutcome {
    /// The partition budget has been used up.
    Exhausted,

    /// The shared cancellation token fired first.
    Cancelled,
}

/// Drives production for exactly one partition.
///
/// Each iteration generates a record, waits for the shared rate limiter,
/// dispatches the record and reports the sent bytes right away.
/// Acknowledgements are reported by background tasks once the broker answers;
/// those tasks are drained before the worker closes its client.
#[derive(Debug)]
pub(crate) struct PartitionWorker {
    pub(crate) partition: i32,
    pub(crate) budget: u64,
    pub(crate) message_size: u64,
    pub(crate) source: Box<dyn RecordSource>,
    pub(crate) limiter: Arc<RateLimiter>,
    pub(crate) reporter: Arc<StatusReporter>,
    pub(crate) client: Arc<dyn ProducerClient>,
    pub(crate) cancel: CancellationToken,
    pub(crate) drain_timeout: Duration,
    pub(crate) inflight: JoinSet<()>,
}

enum Drain {
    Settled,
    TimedOut,
    Cancelled,
}

impl PartitionWorker {
    /// Produce until the budget is exhausted or the run is cancelled.
    ///
    /// Only generator failures and limiter failures that were not caused by
    /// cancellation are returned as errors.
    pub(crate) async fn run(mut self) -> Result<WorkerOutcome> {
        info!(partition = self.partition, budget = self.budget, "starting to produce");

        let res = self.produce().await;
        self.drain().await;
        self.client.close().await;

        match &res {
            Ok(outcome) => info!(partition = self.partition, ?outcome, "finished producing"),
            Err(e) => warn!(partition = self.partition, error=%e, "finished producing"),
        }
        res
    }

    async fn produce(&mut self) -> Result<WorkerOutcome> {
        let partition = self.partition;
        let mut bytes_sent = 0u64;

        loop {
            if self.cancel.is_cancelled() {
                return Ok(WorkerOutcome::Cancelled);
            }
            // after the first record, never start one that would overshoot the budget
            if bytes_sent >= self.budget
                || (bytes_sent > 0 && self.budget - bytes_sent < self.message_size)
            {
                debug!(partition, bytes_sent, "partition budget exhausted");
                return Ok(WorkerOutcome::Exhausted);
            }

            let record = self
                .source
                .next_record()
                .map_err(|source| Error::Generate { partition, source })?;
            let size = record.approximate_size();

            match self.limiter.acquire(size, &self.cancel).await {
                Ok(Acquire::Granted) => {}
                Ok(Acquire::Cancelled) => return Ok(WorkerOutcome::Cancelled),
                Err(_) if self.cancel.is_cancelled() => return Ok(WorkerOutcome::Cancelled),
                Err(source) => return Err(Error::RateLimit { partition, source }),
            }

            let delivery = self.client.produce(record);
            self.inflight.spawn(settle(
                partition,
                delivery,
                Arc::clone(&self.reporter),
                self.cancel.clone(),
            ));
            // reap deliveries that already settled
            while let Some(res) = self.inflight.try_join_next() {
                log_join_error(partition, res);
            }

            bytes_sent += size as u64;
            self.reporter.report(ProduceStatus::bytes_sent(size as u64));
        }
    }

    /// Wait for outstanding deliveries, bounded by the drain timeout and by
    /// cancellation. Deliveries still pending afterwards are aborted.
    async fn drain(&mut self) {
        if self.inflight.is_empty() {
            return;
        }
        debug!(
            partition = self.partition,
            outstanding = self.inflight.len(),
            "waiting for outstanding deliveries"
        );

        let partition = self.partition;
        let inflight = &mut self.inflight;
        let drain = tokio::select! {
            _ = async {
                while let Some(res) = inflight.join_next().await {
                    log_join_error(partition, res);
                }
            } => Drain::Settled,
            _ = tokio::time::sleep(self.drain_timeout) => Drain::TimedOut,
            _ = self.cancel.cancelled() => Drain::Cancelled,
        };

        match drain {
            Drain::Settled => return,
            Drain::TimedOut => warn!(
                partition = self.partition,
                outstanding = self.inflight.len(),
                "timed out waiting for deliveries"
            ),
            Drain::Cancelled => debug!(
                partition = self.partition,
                outstanding = self.inflight.len(),
                "cancelled while waiting for deliveries"
            ),
        }

        self.inflight.abort_all();
        while let Some(res) = self.inflight.join_next().await {
            log_join_error(partition, res);
        }
    }
}

fn log_join_error(partition: i32, res: std::result::Result<(), JoinError>) {
    match res {
        Ok(()) => {}
        // aborted by the drain
        Err(e) if e.is_cancelled() => {}
        Err(e) => warn!(partition, error=%e, "delivery task failed"),
    }
}

/// Account for the outcome of one delivery.
async fn settle(
    partition: i32,
    delivery: BoxFuture<'static, ClientResult<i64>>,
    reporter: Arc<StatusReporter>,
    cancel: CancellationToken,
) {
    let res = delivery.await;
    // once cancelled the outcome is unknown and deliberately not counted
    if cancel.is_cancelled() {
        return;
    }
    match res {
        Ok(_offset) => reporter.report(ProduceStatus::acked(partition)),
        Err(e) => {
            warn!(partition, error=%e, "error producing record");
            reporter.report(ProduceStatus::error());
        }
    }
}
