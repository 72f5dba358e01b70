use std::collections::BTreeSet;

/// Partition layout of a topic, as reported by the cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topic {
    pub name: String,
    pub partitions: BTreeSet<i32>,
}

impl Topic {
    pub fn new(name: impl Into<String>, partitions: impl IntoIterator<Item = i32>) -> Self {
        Self {
            name: name.into(),
            partitions: partitions.into_iter().collect(),
        }
    }
}
