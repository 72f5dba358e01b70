use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

/// Header key carrying the per-partition sequence number.
pub const SEQNO_HEADER: &str = "seqno";

/// Encoded size of the sequence number header (key and value).
pub const SEQNO_HEADER_SIZE: usize = SEQNO_HEADER.len() + std::mem::size_of::<u64>();

/// A synthesized record addressed to one partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub headers: BTreeMap<String, Vec<u8>>,
    pub timestamp: DateTime<Utc>,
    pub partition: i32,
}

impl Record {
    /// Returns the approximate uncompressed size of this [`Record`]
    pub fn approximate_size(&self) -> usize {
        self.key.len()
            + self.value.len()
            + self
                .headers
                .iter()
                .map(|(k, v)| k.len() + v.len())
                .sum::<usize>()
    }

    /// Sequence number carried in the [`SEQNO_HEADER`], if present and well formed.
    pub fn seqno(&self) -> Option<u64> {
        let raw = self.headers.get(SEQNO_HEADER)?;
        let bytes: [u8; 8] = raw.as_slice().try_into().ok()?;
        Some(u64::from_be_bytes(bytes))
    }
}

/// Encode `seqno` as a header entry.
pub fn seqno_header(seqno: u64) -> (String, Vec<u8>) {
    (SEQNO_HEADER.to_owned(), seqno.to_be_bytes().to_vec())
}
