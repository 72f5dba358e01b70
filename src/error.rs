use thiserror::Error;

use crate::{
    client::error::Error as ClientError, config::ConfigError, generator::GeneratorError,
    limiter::LimiterError,
};

/// Fatal errors that abort a produce run.
///
/// Delivery failures of individual records are not represented here: they are
/// counted in [`ProduceStatus::error_count`](crate::status::ProduceStatus::error_count)
/// and never abort the run.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Unable to fetch metadata for topic '{topic}': {source}")]
    Metadata {
        topic: String,
        #[source]
        source: ClientError,
    },

    #[error("Unable to create client for partition {partition}: {source}")]
    Connect {
        partition: i32,
        #[source]
        source: ClientError,
    },

    #[error("Unable to create record for partition {partition}: {source}")]
    Generate {
        partition: i32,
        #[source]
        source: GeneratorError,
    },

    #[error("Unable to rate limit partition {partition}: {source}")]
    RateLimit {
        partition: i32,
        #[source]
        source: LimiterError,
    },

    #[error("Partition worker failed to complete: {0}")]
    WorkerPanic(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
