//! Seams to the broker.
//!
//! The produce engine never talks to the network itself. It looks up the
//! partition layout and opens one [`ProducerClient`] per partition through a
//! [`Cluster`], which lets the same engine run against a real broker or an
//! in-memory fake.
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::{record::Record, topic::Topic};

pub mod error;
#[cfg(feature = "rskafka")]
pub mod rskafka;

use error::Result;

/// Options handed to every [`ProducerClient`] a [`Cluster`] opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientOptions {
    /// Upper bound in bytes for a batch assembled by the client.
    pub max_batch_size: usize,
}

/// Access to the brokers of one cluster.
pub trait Cluster: std::fmt::Debug + Send + Sync {
    /// Look up the partitions of `topic`.
    fn fetch_topic_metadata<'a>(&'a self, topic: &'a str) -> BoxFuture<'a, Result<Topic>>;

    /// Open a client dedicated to one partition of `topic`.
    ///
    /// Records handed to the returned client always go to `partition`; no
    /// client side partitioning takes place.
    fn connect<'a>(
        &'a self,
        topic: &'a str,
        partition: i32,
        options: ClientOptions,
    ) -> BoxFuture<'a, Result<Arc<dyn ProducerClient>>>;
}

/// A producer bound to a single partition.
pub trait ProducerClient: std::fmt::Debug + Send + Sync {
    /// Send `record`.
    ///
    /// The returned future resolves to the offset assigned by the broker once
    /// the record was acknowledged, or to the delivery error. It is not tied
    /// to the lifetime of the client so that it can be driven from a
    /// background task.
    fn produce(&self, record: Record) -> BoxFuture<'static, Result<i64>>;

    /// Flush and release the client.
    fn close(&self) -> BoxFuture<'_, ()>;
}
