//! [`Cluster`] implementation backed by the `rskafka` client.
use std::{sync::Arc, time::Duration};

use futures::future::BoxFuture;
use ::rskafka::client::{
    Client, ClientBuilder,
    partition::UnknownTopicHandling,
    producer::{BatchProducer, BatchProducerBuilder, aggregator::RecordAggregator},
};
use tracing::debug;

use super::{
    ClientOptions, Cluster, ProducerClient,
    error::{Error, Result},
};
use crate::{record::Record, topic::Topic};

/// A Kafka cluster reached through `rskafka`.
#[derive(Debug)]
pub struct RsKafkaCluster {
    client: Client,
    linger: Duration,
}

impl RsKafkaCluster {
    /// Connect to the cluster through `bootstrap_brokers`.
    pub async fn connect(bootstrap_brokers: Vec<String>) -> Result<Self> {
        let client = ClientBuilder::new(bootstrap_brokers)
            .build()
            .await
            .map_err(|e| Error::Connection(e.to_string()))?;
        Ok(Self {
            client,
            linger: Duration::from_millis(5),
        })
    }

    /// Sets how long a partial batch may wait for more records.
    pub fn with_linger(self, linger: Duration) -> Self {
        Self { linger, ..self }
    }
}

impl Cluster for RsKafkaCluster {
    fn fetch_topic_metadata<'a>(&'a self, topic: &'a str) -> BoxFuture<'a, Result<Topic>> {
        Box::pin(async move {
            let topics = self
                .client
                .list_topics()
                .await
                .map_err(|e| Error::Other(Box::new(e)))?;

            topics
                .into_iter()
                .find(|t| t.name == topic)
                .map(|t| Topic::new(t.name, t.partitions))
                .ok_or_else(|| Error::UnknownTopic(topic.to_owned()))
        })
    }

    fn connect<'a>(
        &'a self,
        topic: &'a str,
        partition: i32,
        options: ClientOptions,
    ) -> BoxFuture<'a, Result<Arc<dyn ProducerClient>>> {
        Box::pin(async move {
            let partition_client = self
                .client
                .partition_client(topic, partition, UnknownTopicHandling::Error)
                .await
                .map_err(|e| Error::Connection(e.to_string()))?;

            debug!(topic, partition, max_batch_size = options.max_batch_size, "connected");

            let producer = BatchProducerBuilder::new(Arc::new(partition_client))
                .with_linger(self.linger)
                .build(RecordAggregator::new(options.max_batch_size));

            Ok(Arc::new(RsKafkaProducer {
                producer: Arc::new(producer),
            }) as Arc<dyn ProducerClient>)
        })
    }
}

#[derive(Debug)]
struct RsKafkaProducer {
    producer: Arc<BatchProducer<RecordAggregator>>,
}

impl ProducerClient for RsKafkaProducer {
    fn produce(&self, record: Record) -> BoxFuture<'static, Result<i64>> {
        let producer = Arc::clone(&self.producer);
        let record = ::rskafka::record::Record {
            key: Some(record.key),
            value: Some(record.value),
            headers: record.headers,
            timestamp: record.timestamp,
        };
        Box::pin(async move {
            producer
                .produce(record)
                .await
                .map_err(|e| Error::Delivery(e.to_string()))
        })
    }

    fn close(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            if let Err(e) = self.producer.flush().await {
                debug!(error=%e, "flush on close failed");
            }
        })
    }
}
