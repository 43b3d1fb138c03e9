use crate::domain::acl::AclEntry;
use crate::domain::broker::{Broker, BrokerId};
use crate::domain::consumer_group::ConsumerGroup;
use crate::domain::metrics::MetricsStore;
use crate::domain::topic::Topic;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::SystemTime;

/// Materialized cluster view at one instant. Published behind an `Arc` and
/// never mutated afterwards; metric updates produce a new snapshot.
#[derive(Debug, Serialize, Clone)]
pub struct Snapshot {
    pub brokers: BTreeMap<BrokerId, Broker>,
    pub topics: BTreeMap<String, Topic>,
    pub consumer_groups: BTreeMap<String, ConsumerGroup>,
    pub acls: Vec<AclEntry>,
    /// When the topology was read from the coordination store.
    pub created_at: SystemTime,
}

impl Snapshot {
    pub fn empty() -> Self {
        Self {
            brokers: BTreeMap::new(),
            topics: BTreeMap::new(),
            consumer_groups: BTreeMap::new(),
            acls: Vec::new(),
            created_at: SystemTime::now(),
        }
    }

    pub fn assemble(
        brokers: BTreeMap<BrokerId, Broker>,
        topics: BTreeMap<String, Topic>,
        consumer_groups: BTreeMap<String, ConsumerGroup>,
        acls: Vec<AclEntry>,
        metrics: &MetricsStore,
    ) -> Self {
        let mut snapshot = Self {
            brokers,
            topics,
            consumer_groups,
            acls,
            created_at: SystemTime::now(),
        };
        snapshot.apply_metrics(metrics);
        snapshot
    }

    /// Copy of this snapshot carrying `metrics`.
    pub fn with_metrics(&self, metrics: &MetricsStore) -> Self {
        let mut next = self.clone();
        next.apply_metrics(metrics);
        next
    }

    fn apply_metrics(&mut self, metrics: &MetricsStore) {
        for topic in self.topics.values_mut() {
            for partition in topic.partitions.iter_mut() {
                if let Some(m) = metrics.partition(&topic.name, partition.number) {
                    partition.metrics = m.clone();
                }
            }
            if let Some(m) = metrics.topics.get(&topic.name) {
                topic.metrics = m.clone();
            }
            topic.refresh_derived();
        }
        for group in self.consumer_groups.values_mut() {
            group.refresh_lag(&self.topics);
        }
    }

    pub fn topic(&self, name: &str) -> Option<&Topic> {
        self.topics.get(name)
    }

    pub fn broker(&self, id: BrokerId) -> Option<&Broker> {
        self.brokers.get(&id)
    }

    pub fn consumer_group(&self, name: &str) -> Option<&ConsumerGroup> {
        self.consumer_groups.get(name)
    }

    pub fn partition_count(&self) -> usize {
        self.topics.values().map(|t| t.partitions.len()).sum()
    }

    pub fn total_size(&self) -> i64 {
        self.topics.values().map(|t| t.size).sum()
    }

    pub fn total_message_count(&self) -> i64 {
        self.topics.values().map(|t| t.message_count).sum()
    }

    pub fn under_replicated_partitions(&self) -> usize {
        self.topics.values().map(Topic::under_replicated).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::topic::{Partition, TopicConfig, LOG_END_OFFSET, LOG_START_OFFSET, SIZE};

    fn snapshot_with_orders() -> Snapshot {
        let partitions = (0..3).map(|n| Partition::unassigned(n, vec![1, 2])).collect();
        let mut topics = BTreeMap::new();
        topics.insert(
            "orders".to_string(),
            Topic::new("orders".into(), partitions, TopicConfig::default(), false),
        );
        let mut groups = BTreeMap::new();
        groups.insert(
            "billing".to_string(),
            ConsumerGroup::new(
                "billing".into(),
                BTreeMap::from([("orders".to_string(), BTreeMap::from([(0, 45)]))]),
            ),
        );
        Snapshot::assemble(BTreeMap::new(), topics, groups, Vec::new(), &MetricsStore::default())
    }

    fn metrics_for_orders() -> MetricsStore {
        let mut metrics = MetricsStore::default();
        for (n, end) in [(0, 50), (1, 40), (2, 60)] {
            metrics.partitions.insert(
                ("orders".into(), n),
                BTreeMap::from([
                    (LOG_START_OFFSET.to_string(), 0),
                    (LOG_END_OFFSET.to_string(), end),
                    (SIZE.to_string(), 1000),
                ]),
            );
        }
        metrics
    }

    #[test]
    fn with_metrics_leaves_original_untouched() {
        let before = snapshot_with_orders();
        let after = before.with_metrics(&metrics_for_orders());

        assert_eq!(before.total_message_count(), 0);
        assert_eq!(after.total_message_count(), 150);
        assert_eq!(after.topic("orders").map(|t| t.size), Some(3000));
        assert_eq!(after.created_at, before.created_at);
    }

    #[test]
    fn consumer_lag_follows_metrics() {
        let snapshot = snapshot_with_orders().with_metrics(&metrics_for_orders());
        let group = snapshot.consumer_group("billing").unwrap();
        assert_eq!(group.total_lag(), 5);
        assert_eq!(group.coverage.get("orders"), Some(&33));
    }

    #[test]
    fn totals() {
        let snapshot = snapshot_with_orders();
        assert_eq!(snapshot.partition_count(), 3);
        assert_eq!(snapshot.under_replicated_partitions(), 3);
        assert!(snapshot.broker(1).is_none());
    }
}
