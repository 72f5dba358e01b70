use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Progress counters of a produce run.
///
/// Statuses are deltas as well as totals: workers report small deltas which
/// are folded into a running total with [`merge`](Self::merge). Merging is
/// associative and commutative, so the order in which concurrent deltas are
/// applied does not matter.
///
/// `bytes_sent` is counted when a record is handed to the client while
/// `records_acked` and `error_count` are counted once the broker answered. The
/// two sides are therefore allowed to disagree while records are in flight.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProduceStatus {
    pub bytes_sent: u64,
    pub records_acked: BTreeMap<i32, u64>,
    pub error_count: u64,
    pub done: bool,
}

impl ProduceStatus {
    pub fn bytes_sent(bytes: u64) -> Self {
        Self {
            bytes_sent: bytes,
            ..Default::default()
        }
    }

    pub fn acked(partition: i32) -> Self {
        Self {
            records_acked: BTreeMap::from([(partition, 1)]),
            ..Default::default()
        }
    }

    pub fn error() -> Self {
        Self {
            error_count: 1,
            ..Default::default()
        }
    }

    pub fn done() -> Self {
        Self {
            done: true,
            ..Default::default()
        }
    }

    /// Combine two statuses.
    pub fn merge(&self, other: &Self) -> Self {
        let mut merged = self.clone();
        merged.merge_from(other);
        merged
    }

    /// In-place variant of [`merge`](Self::merge).
    pub fn merge_from(&mut self, other: &Self) {
        self.bytes_sent += other.bytes_sent;
        for (partition, acked) in &other.records_acked {
            *self.records_acked.entry(*partition).or_default() += acked;
        }
        self.error_count += other.error_count;
        self.done |= other.done;
    }

    /// Acknowledged records over all partitions.
    pub fn total_acked(&self) -> u64 {
        self.records_acked.values().sum()
    }
}
