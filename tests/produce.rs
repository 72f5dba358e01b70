use assert_matches::assert_matches;
use rsloadgen::{
    Error,
    config::{ByteSize, ConfigError, ProduceConfig, ProduceConfigBuilder},
    generator::{GeneratorError, RecordGenerator, RecordSource},
    limiter::LimiterError,
    producer::{Producer, ProducerBuilder},
    record::Record,
    status::ProduceStatus,
};
use std::{collections::BTreeMap, sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;

use test_helpers::{MockCluster, RecordingSink, TEST_TIMEOUT, maybe_start_logging};

fn config(bytes_per_second: u64, total_bytes: u64, message_size: u64) -> ProduceConfig {
    ProduceConfigBuilder::new("input")
        .with_bytes_per_second(bytes_per_second)
        .with_total_bytes(total_bytes)
        .with_message_size(message_size)
        .with_max_batch_size(ByteSize::mb(1))
        .with_drain_timeout(Duration::from_secs(2))
        .build()
        .unwrap()
}

fn producer(
    config: ProduceConfig,
    cluster: &Arc<MockCluster>,
    sink: &Arc<RecordingSink>,
) -> ProducerBuilder {
    ProducerBuilder::new(config, Arc::clone(cluster) as _).with_sink(Arc::clone(sink) as _)
}

async fn run(producer: &Producer) -> Result<ProduceStatus, Error> {
    tokio::time::timeout(TEST_TIMEOUT, producer.run(CancellationToken::new()))
        .await
        .expect("no timeout")
}

fn assert_monotonic(seen: &[ProduceStatus]) {
    for pair in seen.windows(2) {
        assert!(pair[1].bytes_sent >= pair[0].bytes_sent);
        assert!(pair[1].error_count >= pair[0].error_count);
        assert!(pair[1].done >= pair[0].done);
        for (partition, acked) in &pair[0].records_acked {
            assert!(pair[1].records_acked[partition] >= *acked);
        }
    }
}

#[derive(Debug)]
struct FailingSource {
    inner: RecordGenerator,
    fail_after: u64,
}

impl RecordSource for FailingSource {
    fn next_record(&mut self) -> Result<Record, GeneratorError> {
        if self.inner.seqno() >= self.fail_after {
            return Err(GeneratorError::Other("injected".into()));
        }
        self.inner.next_record()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_produce_to_all_partitions() {
    maybe_start_logging();

    let cluster = Arc::new(MockCluster::new(0..4));
    let sink = Arc::new(RecordingSink::default());
    let producer = producer(config(512_000, 1_000_000, 1_024), &cluster, &sink).build();

    let status = run(&producer).await.unwrap();

    assert!(status.done);
    assert!((996_000..=1_000_000).contains(&status.bytes_sent));
    assert_eq!(status.bytes_sent, 4 * 244 * 1_024);
    assert_eq!(status.records_acked.len(), 4);
    assert!(status.records_acked.values().all(|acked| *acked == 244));
    assert_eq!(status.error_count, 0);

    // sequence numbers of every partition are gapless
    for (partition, records) in cluster.records.lock().iter() {
        let seqnos: Vec<_> = records.iter().map(|r| r.seqno().unwrap()).collect();
        assert_eq!(seqnos, (1..=244).collect::<Vec<_>>(), "partition {partition}");
        assert!(records.iter().all(|r| r.approximate_size() == 1_024));
    }

    let mut closed = cluster.closed.lock().clone();
    closed.sort_unstable();
    assert_eq!(closed, vec![0, 1, 2, 3]);

    let seen = sink.seen.lock();
    assert_eq!(seen.first(), Some(&ProduceStatus::default()));
    assert_eq!(seen.last(), Some(&status));
    assert_eq!(seen.iter().filter(|s| s.done).count(), 1);
    assert_monotonic(&seen);
}

#[tokio::test]
async fn test_bytes_sent_leads_acks() {
    maybe_start_logging();

    let cluster = Arc::new(MockCluster {
        delay: Duration::from_millis(100),
        ..MockCluster::new([0])
    });
    let sink = Arc::new(RecordingSink::default());
    let producer = producer(config(1_000_000, 4_096, 1_024), &cluster, &sink).build();

    let status = run(&producer).await.unwrap();
    assert_eq!(status.bytes_sent, 4_096);
    assert_eq!(status.total_acked(), 4);

    // bytes are counted on send, acks once the broker answered
    let seen = sink.seen.lock();
    assert!(
        seen.iter()
            .any(|s| s.bytes_sent == 4_096 && s.total_acked() == 0)
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_delivery_error_is_not_fatal() {
    maybe_start_logging();

    let cluster = Arc::new(MockCluster {
        fail_delivery: Some((1, 3)),
        ..MockCluster::new(0..4)
    });
    let sink = Arc::new(RecordingSink::default());
    let producer = producer(config(1_000_000, 40 * 1_024, 1_024), &cluster, &sink).build();

    let status = run(&producer).await.unwrap();

    assert!(status.done);
    assert_eq!(status.error_count, 1);
    assert_eq!(status.bytes_sent, 40 * 1_024);
    assert_eq!(status.records_acked.get(&0), Some(&10));
    assert_eq!(status.records_acked.get(&1), Some(&9));
    assert_eq!(status.records_acked.get(&2), Some(&10));
    assert_eq!(status.records_acked.get(&3), Some(&10));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_generator_error_cancels_run() {
    maybe_start_logging();

    let cluster = Arc::new(MockCluster::new(0..4));
    let sink = Arc::new(RecordingSink::default());
    let producer = producer(config(4_096, 10 * 1_024 * 1_024, 1_024), &cluster, &sink)
        .with_record_source(|partition, message_size| -> Box<dyn RecordSource> {
            let inner = RecordGenerator::new(partition, message_size);
            if partition == 2 {
                Box::new(FailingSource {
                    inner,
                    fail_after: 1,
                })
            } else {
                Box::new(inner)
            }
        })
        .build();

    let err = run(&producer).await.unwrap_err();
    assert_matches!(
        err,
        Error::Generate {
            partition: 2,
            source: GeneratorError::Other(_)
        }
    );

    // every partition stopped and closed its client
    assert_eq!(cluster.closed.lock().len(), 4);
    let sent = cluster.sent();
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(cluster.sent(), sent);

    let seen = sink.seen.lock();
    assert!(seen.iter().all(|s| !s.done));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_external_cancellation_is_success() {
    maybe_start_logging();

    let cluster = Arc::new(MockCluster::new(0..4));
    let sink = Arc::new(RecordingSink::default());
    let producer = Arc::new(
        producer(config(4_096, 10 * 1_024 * 1_024, 1_024), &cluster, &sink).build(),
    );

    let cancel = CancellationToken::new();
    let handle = tokio::spawn({
        let producer = Arc::clone(&producer);
        let cancel = cancel.clone();
        async move { producer.run(cancel).await }
    });

    tokio::time::sleep(Duration::from_millis(300)).await;
    cancel.cancel();

    let status = tokio::time::timeout(TEST_TIMEOUT, handle)
        .await
        .expect("no timeout")
        .unwrap()
        .unwrap();

    assert!(!status.done);
    assert!(status.bytes_sent > 0);
    assert!(status.bytes_sent < 10 * 1_024 * 1_024);
    assert_eq!(cluster.closed.lock().len(), 4);

    let seen = sink.seen.lock();
    assert!(seen.iter().all(|s| !s.done));
    assert_monotonic(&seen);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_partition_budget_below_message_size() {
    maybe_start_logging();

    let cluster = Arc::new(MockCluster::new(0..4));
    let sink = Arc::new(RecordingSink::default());
    let producer = producer(config(4_096, 1_000, 1_024), &cluster, &sink).build();

    let status = run(&producer).await.unwrap();

    // every partition still sends one record
    assert!(status.done);
    assert_eq!(status.bytes_sent, 4 * 1_024);
    assert_eq!(
        status.records_acked,
        BTreeMap::from([(0, 1), (1, 1), (2, 1), (3, 1)])
    );
    assert_eq!(cluster.sent(), 4);
}

#[tokio::test]
async fn test_metadata_error() {
    let cluster = Arc::new(MockCluster {
        metadata_error: true,
        ..MockCluster::new(0..4)
    });
    let sink = Arc::new(RecordingSink::default());
    let producer = producer(config(4_096, 4_096, 1_024), &cluster, &sink).build();

    assert_matches!(run(&producer).await, Err(Error::Metadata { topic, .. }) if topic == "input");
    assert_eq!(cluster.connects.load(std::sync::atomic::Ordering::SeqCst), 0);
    assert!(sink.seen.lock().is_empty());
}

#[tokio::test]
async fn test_no_partitions() {
    let cluster = Arc::new(MockCluster::new(Vec::new()));
    let sink = Arc::new(RecordingSink::default());
    let producer = producer(config(4_096, 4_096, 1_024), &cluster, &sink).build();

    assert_matches!(
        run(&producer).await,
        Err(Error::Config(ConfigError::NoPartitions(topic))) if topic == "input"
    );
    assert_eq!(cluster.connects.load(std::sync::atomic::Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_connect_error() {
    let cluster = Arc::new(MockCluster {
        connect_error: Some(1),
        ..MockCluster::new(0..2)
    });
    let sink = Arc::new(RecordingSink::default());
    let producer = producer(config(4_096, 1_024 * 1_024, 1_024), &cluster, &sink).build();

    assert_matches!(
        run(&producer).await,
        Err(Error::Connect { partition: 1, .. })
    );
}

#[tokio::test]
async fn test_message_larger_than_rate() {
    let cluster = Arc::new(MockCluster::new(0..2));
    let sink = Arc::new(RecordingSink::default());
    let producer = producer(config(1_000, 10_000, 1_024), &cluster, &sink).build();

    assert_matches!(
        run(&producer).await,
        Err(Error::RateLimit {
            source: LimiterError::InsufficientCapacity {
                requested: 1_024,
                capacity: 1_000
            },
            ..
        })
    );
    assert_eq!(cluster.sent(), 0);
}

#[tokio::test]
async fn test_message_too_small_for_key() {
    let cluster = Arc::new(MockCluster::new(0..2));
    let sink = Arc::new(RecordingSink::default());
    let producer = producer(config(4_096, 4_096, 4), &cluster, &sink).build();

    assert_matches!(
        run(&producer).await,
        Err(Error::Generate {
            source: GeneratorError::SizeExceeded { .. },
            ..
        })
    );
}
