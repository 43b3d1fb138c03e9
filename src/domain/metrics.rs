use crate::domain::broker::{BrokerId, BrokerStats};
use std::collections::{BTreeMap, HashMap};

/// Latest measurements published by the metrics poller. Entries are only
/// ever replaced by a fresher reading, so a broker that stops answering
/// leaves its partitions at their last known values.
#[derive(Debug, Clone, Default)]
pub struct MetricsStore {
    pub tick: u64,
    pub partitions: HashMap<(String, i32), BTreeMap<String, i64>>,
    pub topics: HashMap<String, BTreeMap<String, f64>>,
    pub brokers: HashMap<BrokerId, BrokerStats>,
}

impl MetricsStore {
    pub fn partition(&self, topic: &str, partition: i32) -> Option<&BTreeMap<String, i64>> {
        self.partitions.get(&(topic.to_string(), partition))
    }

    /// Drops measurements for topics that no longer exist.
    pub fn retain_topics<F>(&mut self, mut exists: F)
    where
        F: FnMut(&str) -> bool,
    {
        self.partitions.retain(|(topic, _), _| exists(topic));
        self.topics.retain(|topic, _| exists(topic));
    }
}
