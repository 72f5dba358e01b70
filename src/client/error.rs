use thiserror::Error;

/// Errors surfaced by a [`Cluster`](super::Cluster) or
/// [`ProducerClient`](super::ProducerClient) implementation.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Unknown topic: {0}")]
    UnknownTopic(String),

    #[error("Delivery failed: {0}")]
    Delivery(String),

    #[error("Client closed")]
    Closed,

    #[error(transparent)]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
