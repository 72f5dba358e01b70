//! Deterministic synthesis of fixed-size records.
use std::collections::BTreeMap;

use chrono::Utc;
use rand::{RngCore, SeedableRng, rngs::StdRng};
use thiserror::Error;
use uuid::Uuid;

use crate::record::{Record, SEQNO_HEADER_SIZE, seqno_header};

/// Seed of the value generator.
///
/// Fixed so that repeated runs emit the same payloads.
pub const VALUE_SEED: u64 = 9;

#[derive(Error, Debug)]
pub enum GeneratorError {
    #[error("not enough bytes: size={required} max={available}")]
    SizeExceeded { required: usize, available: usize },

    #[error(transparent)]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

/// A source of records for one partition.
pub trait RecordSource: Send + std::fmt::Debug {
    /// Produce the next record.
    fn next_record(&mut self) -> Result<Record, GeneratorError>;
}

/// Generates records of exactly `message_size` bytes for one partition.
///
/// Every record carries a sequence number header (starting at 1), a UUID key
/// and a value of pseudo-random bytes filling the rest of the size budget.
#[derive(Debug)]
pub struct RecordGenerator {
    partition: i32,
    message_size: usize,
    seqno: u64,
    rng: StdRng,
}

impl RecordGenerator {
    pub fn new(partition: i32, message_size: usize) -> Self {
        Self {
            partition,
            message_size,
            seqno: 0,
            rng: StdRng::seed_from_u64(VALUE_SEED),
        }
    }

    /// Sequence number of the last generated record, 0 if none was generated yet.
    pub fn seqno(&self) -> u64 {
        self.seqno
    }

    fn key(max_size: usize) -> Result<Vec<u8>, GeneratorError> {
        let id = Uuid::new_v4().hyphenated().to_string();
        if id.len() > max_size {
            return Err(GeneratorError::SizeExceeded {
                required: id.len(),
                available: max_size,
            });
        }
        Ok(id.into_bytes())
    }

    fn value(&mut self, size: usize) -> Vec<u8> {
        let mut payload = vec![0; size];
        self.rng.fill_bytes(&mut payload);
        payload
    }
}

impl RecordSource for RecordGenerator {
    fn next_record(&mut self) -> Result<Record, GeneratorError> {
        let seqno = self.seqno + 1;

        let size_left = self
            .message_size
            .checked_sub(SEQNO_HEADER_SIZE)
            .ok_or(GeneratorError::SizeExceeded {
                required: SEQNO_HEADER_SIZE,
                available: self.message_size,
            })?;

        let key = Self::key(size_left)?;
        let value = self.value(size_left - key.len());

        self.seqno = seqno;
        Ok(Record {
            key,
            value,
            headers: BTreeMap::from([seqno_header(seqno)]),
            timestamp: Utc::now(),
            partition: self.partition,
        })
    }
}
