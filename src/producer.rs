//! Orchestration of a full produce run.
//!
//! # Data Flow
//!
//! ```text
//!                     +---------+    +-----------------+    +----------------+
//!                  o->| Worker  |--->| ProducerClient  |--->|                |
//!  +----------+    |  | part. 0 |    +-----------------+    |                |
//!  |          |    |  +---------+            |              |                |
//!  | Producer |----o      ...                | (acks)       | StatusReporter |--> StatusSink
//!  |          |    |  +---------+            V              |                |
//!  +----------+    |  | Worker  |    +-----------------+    |                |
//!                  o->| part. N |--->| ProducerClient  |--->|                |
//!                     +---------+    +-----------------+    +----------------+
//!                          |
//!                          V
//!                  shared RateLimiter
//! ```
//!
//! # Usage
//!
//! ```no_run
//! # async fn test(cluster: std::sync::Arc<dyn rsloadgen::client::Cluster>) {
//! use rsloadgen::{
//!     config::{ByteSize, ProduceConfigBuilder},
//!     producer::ProducerBuilder,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! let config = ProduceConfigBuilder::new("input")
//!     .with_bytes_per_second(ByteSize::kb(512))
//!     .with_total_bytes(ByteSize::mb(10))
//!     .build()
//!     .unwrap();
//!
//! let producer = ProducerBuilder::new(config, cluster).build();
//! let status = producer.run(CancellationToken::new()).await.unwrap();
//! println!("sent {} bytes, {} errors", status.bytes_sent, status.error_count);
//! # }
//! ```
use std::{num::NonZeroU32, sync::Arc};

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::{
    client::{ClientOptions, Cluster},
    config::{ByteSize, ConfigError, ProduceConfig, partition_budget},
    error::{Error, Result},
    generator::{RecordGenerator, RecordSource},
    limiter::RateLimiter,
    reporter::{LogSink, StatusReporter, StatusSink},
    status::ProduceStatus,
    worker::{PartitionWorker, WorkerOutcome},
};

/// Creates the [`RecordSource`] of a partition from the partition id and the
/// configured message size.
pub type SourceFactory = Arc<dyn Fn(i32, usize) -> Box<dyn RecordSource> + Send + Sync>;

/// Builder for [`Producer`].
pub struct ProducerBuilder {
    config: ProduceConfig,
    cluster: Arc<dyn Cluster>,
    sink: Arc<dyn StatusSink>,
    sources: SourceFactory,
}

impl ProducerBuilder {
    /// Build a new `Producer` writing [`RecordGenerator`] records to `cluster`.
    pub fn new(config: ProduceConfig, cluster: Arc<dyn Cluster>) -> Self {
        Self {
            config,
            cluster,
            sink: Arc::new(LogSink),
            sources: Arc::new(|partition, message_size| -> Box<dyn RecordSource> {
                Box::new(RecordGenerator::new(partition, message_size))
            }),
        }
    }

    /// Sets where status snapshots are published. Defaults to [`LogSink`].
    pub fn with_sink(self, sink: Arc<dyn StatusSink>) -> Self {
        Self { sink, ..self }
    }

    /// Replace the record generator.
    pub fn with_record_source<F>(self, sources: F) -> Self
    where
        F: Fn(i32, usize) -> Box<dyn RecordSource> + Send + Sync + 'static,
    {
        Self {
            sources: Arc::new(sources),
            ..self
        }
    }

    pub fn build(self) -> Producer {
        Producer {
            config: self.config,
            cluster: self.cluster,
            sink: self.sink,
            sources: self.sources,
        }
    }
}

impl std::fmt::Debug for ProducerBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProducerBuilder")
            .field("config", &self.config)
            .field("cluster", &self.cluster)
            .field("sink", &self.sink)
            .finish_non_exhaustive()
    }
}

/// Produces the configured amount of data to every partition of a topic.
pub struct Producer {
    config: ProduceConfig,
    cluster: Arc<dyn Cluster>,
    sink: Arc<dyn StatusSink>,
    sources: SourceFactory,
}

impl std::fmt::Debug for Producer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Producer")
            .field("config", &self.config)
            .field("cluster", &self.cluster)
            .field("sink", &self.sink)
            .finish_non_exhaustive()
    }
}

impl Producer {
    /// Run until every partition has used up its share of the byte budget.
    ///
    /// All partitions are produced to in parallel under one shared rate limit.
    /// If one partition fails, the others are cancelled and the first error is
    /// returned once every partition stopped.
    ///
    /// # Cancellation
    ///
    /// Cancelling `cancel` stops the run early. This is not an error: the
    /// status reached so far is returned and it is not marked as done.
    pub async fn run(&self, cancel: CancellationToken) -> Result<ProduceStatus> {
        let config = &self.config;
        let topic = self
            .cluster
            .fetch_topic_metadata(config.topic())
            .await
            .map_err(|source| Error::Metadata {
                topic: config.topic().to_owned(),
                source,
            })?;

        // have each partition send about the same amount of data
        let budget = partition_budget(
            config.topic(),
            config.total_bytes(),
            topic.partitions.len(),
        )?;

        let options = ClientOptions {
            max_batch_size: in_memory("max-batch-size", config.max_batch_size())?,
        };
        let message_size = in_memory("message-size", config.message_size())?;
        let message_bytes = config.message_size().as_u64();
        let limiter = Arc::new(RateLimiter::new(bucket_size(config)?));
        let reporter = Arc::new(StatusReporter::new(Arc::clone(&self.sink)));
        reporter.report(ProduceStatus::default());

        info!(
            topic = config.topic(),
            partitions = topic.partitions.len(),
            budget,
            bytes_per_second = %config.bytes_per_second(),
            message_size = %config.message_size(),
            "starting produce",
        );

        // the first failing partition cancels its siblings, but never the caller
        let group = cancel.child_token();

        let mut tasks = JoinSet::new();
        for partition in topic.partitions {
            let cluster = Arc::clone(&self.cluster);
            let topic = config.topic().to_owned();
            let worker_cancel = group.clone();
            let source = (self.sources)(partition, message_size);
            let limiter = Arc::clone(&limiter);
            let reporter = Arc::clone(&reporter);
            let drain_timeout = config.drain_timeout();

            tasks.spawn(async move {
                let client = cluster
                    .connect(&topic, partition, options)
                    .await
                    .map_err(|source| Error::Connect { partition, source })?;

                PartitionWorker {
                    partition,
                    budget,
                    message_size: message_bytes,
                    source,
                    limiter,
                    reporter,
                    client,
                    cancel: worker_cancel,
                    drain_timeout,
                    inflight: JoinSet::new(),
                }
                .run()
                .await
            });
        }

        let mut first_error = None;
        let mut exhausted = true;
        while let Some(res) = tasks.join_next().await {
            let res = res
                .map_err(|e| Error::WorkerPanic(e.to_string()))
                .and_then(|res| res);

            match res {
                Ok(WorkerOutcome::Exhausted) => {}
                Ok(WorkerOutcome::Cancelled) => exhausted = false,
                // a partition failing after the caller cancelled is part of the shutdown
                Err(e) if first_error.is_none() && !cancel.is_cancelled() => {
                    error!(error=%e, "partition failed, cancelling remaining partitions");
                    group.cancel();
                    exhausted = false;
                    first_error = Some(e);
                }
                Err(e) => {
                    debug!(error=%e, "discarding error of cancelled partition");
                    exhausted = false;
                }
            }
        }

        if let Some(e) = first_error {
            return Err(e);
        }

        if exhausted {
            reporter.report(ProduceStatus::done());
            info!(topic = config.topic(), "produce completed");
        } else {
            info!(topic = config.topic(), "produce cancelled");
        }

        Ok(reporter.snapshot())
    }
}

/// Converts a size that has to be held in memory at once.
fn in_memory(name: &'static str, size: ByteSize) -> Result<usize, ConfigError> {
    usize::try_from(size.as_u64()).map_err(|_| ConfigError::TooLarge {
        name,
        value: size,
        max: u64::try_from(usize::MAX).unwrap_or(u64::MAX).into(),
    })
}

fn bucket_size(config: &ProduceConfig) -> Result<NonZeroU32, ConfigError> {
    let bps = config.bytes_per_second();
    let n = u32::try_from(bps.as_u64()).map_err(|_| ConfigError::TooLarge {
        name: "bytes-per-second",
        value: bps,
        max: u64::from(u32::MAX).into(),
    })?;
    NonZeroU32::new(n).ok_or(ConfigError::Zero {
        name: "bytes-per-second",
    })
}
