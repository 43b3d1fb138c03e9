//! Per-broker management counters (the JMX beans Kafka exposes).

use crate::domain::broker::{Broker, BrokerId};
use crate::{Error, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};

pub const BYTES_IN_PER_SEC: &str = "BytesInPerSec";
pub const BYTES_OUT_PER_SEC: &str = "BytesOutPerSec";
pub const MESSAGES_IN_PER_SEC: &str = "MessagesInPerSec";
pub const ISR_SHRINKS_PER_SEC: &str = "IsrShrinksPerSec";
pub const ISR_EXPANDS_PER_SEC: &str = "IsrExpandsPerSec";

#[async_trait]
pub trait BrokerCounters: Send + Sync {
    /// Cluster-scoped counter, or the topic-scoped variant when `topic` is set.
    async fn counter(&self, broker: &Broker, name: &str, topic: Option<&str>) -> Result<f64>;

    /// Log metric of one partition replica (`LogStartOffset`, `LogEndOffset`, `Size`).
    async fn partition_metric(
        &self,
        broker: &Broker,
        topic: &str,
        partition: i32,
        name: &str,
    ) -> Result<i64>;

    async fn version(&self, broker: &Broker) -> Result<String>;
}

type CounterKey = (BrokerId, String, Option<String>);
type PartitionMetricKey = (BrokerId, String, i32, String);

/// Counter source backed by maps, used by tests and local development.
#[derive(Default)]
pub struct MemoryCounters {
    unreachable: RwLock<HashSet<BrokerId>>,
    counters: RwLock<HashMap<CounterKey, f64>>,
    partition_metrics: RwLock<HashMap<PartitionMetricKey, i64>>,
    versions: RwLock<HashMap<BrokerId, String>>,
}

impl MemoryCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_counter(&self, broker: BrokerId, name: &str, topic: Option<&str>, value: f64) {
        self.counters
            .write()
            .insert((broker, name.to_string(), topic.map(str::to_string)), value);
    }

    pub fn set_partition_metric(
        &self,
        broker: BrokerId,
        topic: &str,
        partition: i32,
        name: &str,
        value: i64,
    ) {
        self.partition_metrics
            .write()
            .insert((broker, topic.to_string(), partition, name.to_string()), value);
    }

    pub fn set_version(&self, broker: BrokerId, version: &str) {
        self.versions.write().insert(broker, version.to_string());
    }

    pub fn set_reachable(&self, broker: BrokerId, reachable: bool) {
        let mut unreachable = self.unreachable.write();
        if reachable {
            unreachable.remove(&broker);
        } else {
            unreachable.insert(broker);
        }
    }

    fn ensure_reachable(&self, broker: &Broker) -> Result<()> {
        if self.unreachable.read().contains(&broker.id) {
            return Err(Error::TransientConnection(format!(
                "broker {} management port {} unreachable",
                broker.id, broker.jmx_port
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl BrokerCounters for MemoryCounters {
    async fn counter(&self, broker: &Broker, name: &str, topic: Option<&str>) -> Result<f64> {
        self.ensure_reachable(broker)?;
        let key = (broker.id, name.to_string(), topic.map(str::to_string));
        self.counters
            .read()
            .get(&key)
            .copied()
            .ok_or_else(|| Error::NotFound {
                kind: "counter",
                key: name.to_string(),
            })
    }

    async fn partition_metric(
        &self,
        broker: &Broker,
        topic: &str,
        partition: i32,
        name: &str,
    ) -> Result<i64> {
        self.ensure_reachable(broker)?;
        let key = (broker.id, topic.to_string(), partition, name.to_string());
        self.partition_metrics
            .read()
            .get(&key)
            .copied()
            .ok_or_else(|| Error::NotFound {
                kind: "partition metric",
                key: format!("{}-{}/{}", topic, partition, name),
            })
    }

    async fn version(&self, broker: &Broker) -> Result<String> {
        self.ensure_reachable(broker)?;
        Ok(self
            .versions
            .read()
            .get(&broker.id)
            .cloned()
            .unwrap_or_else(|| "unknown".to_string()))
    }
}
