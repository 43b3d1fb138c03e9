use crate::domain::broker::BrokerId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

pub const SIZE: &str = "Size";
pub const LOG_START_OFFSET: &str = "LogStartOffset";
pub const LOG_END_OFFSET: &str = "LogEndOffset";

/// Broker id Kafka uses for "no leader".
pub const NO_LEADER: BrokerId = -1;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Topic {
    pub name: String,
    pub partitions: Vec<Partition>,
    pub config: TopicConfig,
    pub deleted: bool,
    /// Topic-level rates attached by the metrics poller.
    pub metrics: BTreeMap<String, f64>,
    pub size: i64,
    pub message_count: i64,
}

impl Topic {
    pub fn new(name: String, partitions: Vec<Partition>, config: TopicConfig, deleted: bool) -> Self {
        let mut topic = Self {
            name,
            partitions,
            config,
            deleted,
            metrics: BTreeMap::new(),
            size: 0,
            message_count: 0,
        };
        topic.refresh_derived();
        topic
    }

    /// Recomputes `size` and `message_count` from the partition metrics.
    /// Partitions that have never been measured contribute nothing.
    pub fn refresh_derived(&mut self) {
        self.size = self
            .partitions
            .iter()
            .filter_map(|p| p.metric(SIZE))
            .sum();
        self.message_count = self
            .partitions
            .iter()
            .filter_map(Partition::message_count)
            .sum();
    }

    pub fn partition(&self, number: i32) -> Option<&Partition> {
        match self.partitions.get(number as usize) {
            Some(p) if p.number == number => Some(p),
            _ => self.partitions.iter().find(|p| p.number == number),
        }
    }

    pub fn replication_factor(&self) -> usize {
        self.partitions.first().map_or(0, |p| p.replicas.len())
    }

    pub fn under_replicated(&self) -> usize {
        self.partitions.iter().filter(|p| p.is_under_replicated()).count()
    }
}

/// Partition state as stored under
/// `/brokers/topics/{topic}/partitions/{p}/state`, plus the replica set
/// from the topic assignment and the poller's metrics.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Partition {
    #[serde(default)]
    pub number: i32,
    pub leader: BrokerId,
    #[serde(default)]
    pub replicas: Vec<BrokerId>,
    pub isr: Vec<BrokerId>,
    #[serde(default)]
    pub leader_epoch: i32,
    #[serde(default)]
    pub controller_epoch: i32,
    #[serde(default)]
    pub version: i32,
    #[serde(default)]
    pub metrics: BTreeMap<String, i64>,
}

impl Partition {
    /// A partition known only from the assignment, with no readable state.
    pub fn unassigned(number: i32, replicas: Vec<BrokerId>) -> Self {
        Self {
            number,
            leader: NO_LEADER,
            replicas,
            isr: Vec::new(),
            leader_epoch: 0,
            controller_epoch: 0,
            version: 0,
            metrics: BTreeMap::new(),
        }
    }

    pub fn metric(&self, name: &str) -> Option<i64> {
        self.metrics.get(name).copied()
    }

    pub fn message_count(&self) -> Option<i64> {
        let start = self.metric(LOG_START_OFFSET)?;
        let end = self.metric(LOG_END_OFFSET)?;
        Some(end - start)
    }

    pub fn has_leader(&self) -> bool {
        self.leader != NO_LEADER
    }

    pub fn is_under_replicated(&self) -> bool {
        self.isr.len() < self.replicas.len()
    }
}

/// Topic configuration from `/config/topics/{topic}`. The config body is
/// kept as an ordered JSON map since its schema is owned by Kafka.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct TopicConfig {
    #[serde(default)]
    pub version: Option<i32>,
    #[serde(default)]
    pub config: Map<String, Value>,
}

impl TopicConfig {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.config.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.config.is_empty()
    }
}

/// A topic to be created through the admin API.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TopicSpec {
    pub name: String,
    pub partitions: i32,
    pub replication_factor: i32,
    #[serde(default)]
    pub config: BTreeMap<String, String>,
}

/// Replica assignment from `/brokers/topics/{topic}`.
#[derive(Debug, Deserialize, Clone)]
pub struct PartitionAssignment {
    #[serde(default)]
    pub version: Option<i32>,
    pub partitions: BTreeMap<String, Vec<BrokerId>>,
}

impl PartitionAssignment {
    /// Replica lists ordered by partition number.
    pub fn ordered(&self) -> Result<Vec<(i32, Vec<BrokerId>)>, String> {
        let mut out = self
            .partitions
            .iter()
            .map(|(key, replicas)| {
                key.parse::<i32>()
                    .map(|n| (n, replicas.clone()))
                    .map_err(|_| format!("partition key '{}' is not a number", key))
            })
            .collect::<Result<Vec<_>, _>>()?;
        out.sort_by_key(|(n, _)| *n);
        Ok(out)
    }
}
