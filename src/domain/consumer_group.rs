use crate::domain::topic::{Topic, LOG_END_OFFSET};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ConsumerGroup {
    pub name: String,
    pub topics: BTreeSet<String>,
    /// Committed offsets by topic, then partition.
    pub offsets: BTreeMap<String, BTreeMap<i32, i64>>,
    pub lag: Vec<PartitionLag>,
    /// Percentage of each consumed topic's partitions with a committed offset.
    pub coverage: BTreeMap<String, u32>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct PartitionLag {
    pub topic: String,
    pub partition: i32,
    pub lag: i64,
}

impl ConsumerGroup {
    pub fn new(name: String, offsets: BTreeMap<String, BTreeMap<i32, i64>>) -> Self {
        Self {
            name,
            topics: offsets.keys().cloned().collect(),
            offsets,
            lag: Vec::new(),
            coverage: BTreeMap::new(),
        }
    }

    pub fn committed(&self, topic: &str, partition: i32) -> Option<i64> {
        self.offsets.get(topic)?.get(&partition).copied()
    }

    /// Recomputes lag and coverage against the given topics. Partitions
    /// whose end offset is unknown are left out of the lag list.
    pub fn refresh_lag(&mut self, topics: &BTreeMap<String, Topic>) {
        self.lag.clear();
        self.coverage.clear();
        for (topic_name, committed) in &self.offsets {
            let Some(topic) = topics.get(topic_name) else {
                continue;
            };
            for (&partition, &offset) in committed {
                let end = topic
                    .partition(partition)
                    .and_then(|p| p.metric(LOG_END_OFFSET));
                if let Some(end) = end {
                    self.lag.push(PartitionLag {
                        topic: topic_name.clone(),
                        partition,
                        lag: (end - offset).max(0),
                    });
                }
            }
            if !topic.partitions.is_empty() {
                let covered = topic
                    .partitions
                    .iter()
                    .filter(|p| committed.contains_key(&p.number))
                    .count();
                let pct = covered * 100 / topic.partitions.len();
                self.coverage.insert(topic_name.clone(), pct as u32);
            }
        }
    }

    pub fn total_lag(&self) -> i64 {
        self.lag.iter().map(|l| l.lag).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::topic::{Partition, TopicConfig};

    fn topic(name: &str, ends: &[i64]) -> Topic {
        let partitions = ends
            .iter()
            .enumerate()
            .map(|(i, end)| {
                let mut p = Partition::unassigned(i as i32, vec![1]);
                p.metrics.insert(LOG_END_OFFSET.into(), *end);
                p
            })
            .collect();
        Topic::new(name.into(), partitions, TopicConfig::default(), false)
    }

    #[test]
    fn lag_is_end_offset_minus_committed() {
        let mut topics = BTreeMap::new();
        topics.insert("orders".to_string(), topic("orders", &[100, 50, 10]));

        let mut offsets = BTreeMap::new();
        offsets.insert("orders".to_string(), BTreeMap::from([(0, 90), (1, 50)]));
        let mut group = ConsumerGroup::new("billing".into(), offsets);
        group.refresh_lag(&topics);

        assert_eq!(
            group.lag,
            vec![
                PartitionLag { topic: "orders".into(), partition: 0, lag: 10 },
                PartitionLag { topic: "orders".into(), partition: 1, lag: 0 },
            ]
        );
        assert_eq!(group.total_lag(), 10);
        assert_eq!(group.coverage.get("orders"), Some(&66));
    }

    #[test]
    fn unknown_topics_and_offsets_ahead_of_end() {
        let mut topics = BTreeMap::new();
        topics.insert("t".to_string(), topic("t", &[5]));

        let mut offsets = BTreeMap::new();
        offsets.insert("t".to_string(), BTreeMap::from([(0, 7)]));
        offsets.insert("gone".to_string(), BTreeMap::from([(0, 1)]));
        let mut group = ConsumerGroup::new("g".into(), offsets);
        group.refresh_lag(&topics);

        assert_eq!(group.lag.len(), 1);
        assert_eq!(group.lag[0].lag, 0);
        assert!(group.topics.contains("gone"));
        assert!(!group.coverage.contains_key("gone"));
    }
}
