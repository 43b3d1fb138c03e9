use crate::domain::broker::{Broker, BrokerId, BrokerStats};
use crate::domain::consumer_group::ConsumerGroup;
use crate::domain::series::{Sample, Scope, BYTES_IN, BYTES_OUT, ISR_EXPAND, ISR_SHRINK, MESSAGES_IN};
use crate::domain::snapshot::Snapshot;
use crate::domain::topic::Topic;
use crate::state::{ClusterState, Health};
use crate::usecase::permissions::Permissions;
use crate::{Error, Result};
use serde::Serialize;
use std::sync::Arc;

/// Cluster-wide totals and the summed broker series the console's landing
/// page shows.
#[derive(Debug, Clone, Serialize)]
pub struct Overview {
    pub brokers: usize,
    pub topics: usize,
    pub partitions: usize,
    pub under_replicated_partitions: usize,
    pub consumer_groups: usize,
    pub total_size: i64,
    pub total_message_count: i64,
    pub bytes_in: Vec<Sample>,
    pub bytes_out: Vec<Sample>,
    pub messages_in: Vec<Sample>,
    pub isr_shrink: Vec<Sample>,
    pub isr_expand: Vec<Sample>,
    pub health: Health,
}

/// Read side handed to the HTTP layer. Every call loads the current
/// snapshot once and answers from it.
pub struct ClusterUsecase {
    state: Arc<ClusterState>,
}

impl ClusterUsecase {
    pub fn new(state: Arc<ClusterState>) -> Self {
        Self { state }
    }

    pub fn current_snapshot(&self) -> Arc<Snapshot> {
        self.state.current()
    }

    /// Topics the caller may read.
    pub fn topics(&self, perms: &dyn Permissions) -> Vec<Topic> {
        self.state
            .current()
            .topics
            .values()
            .filter(|t| perms.topic_read(&t.name))
            .cloned()
            .collect()
    }

    pub fn topic(&self, perms: &dyn Permissions, name: &str) -> Result<Topic> {
        if !perms.topic_read(name) {
            return Err(denied(perms, "read_topic", name));
        }
        self.state
            .current()
            .topic(name)
            .cloned()
            .ok_or_else(|| Error::NotFound {
                kind: "topic",
                key: name.to_string(),
            })
    }

    pub fn brokers(&self) -> Vec<Broker> {
        self.state.current().brokers.values().cloned().collect()
    }

    pub fn broker(&self, id: BrokerId) -> Result<Broker> {
        self.state
            .current()
            .broker(id)
            .cloned()
            .ok_or_else(|| broker_not_found(id))
    }

    /// Live counters of a known broker. A broker that has not been polled
    /// yet reports empty, unreachable stats.
    pub fn broker_stats(&self, id: BrokerId) -> Result<BrokerStats> {
        if self.state.current().broker(id).is_none() {
            return Err(broker_not_found(id));
        }
        Ok(self
            .state
            .latest_metrics()
            .brokers
            .get(&id)
            .cloned()
            .unwrap_or_default())
    }

    /// Consumer groups the caller may read.
    pub fn consumer_groups(&self, perms: &dyn Permissions) -> Vec<ConsumerGroup> {
        self.state
            .current()
            .consumer_groups
            .values()
            .filter(|g| perms.group_read(&g.name))
            .cloned()
            .collect()
    }

    pub fn consumer_group(&self, perms: &dyn Permissions, name: &str) -> Result<ConsumerGroup> {
        if !perms.group_read(name) {
            return Err(denied(perms, "read_group", name));
        }
        self.state
            .current()
            .consumer_group(name)
            .cloned()
            .ok_or_else(|| Error::NotFound {
                kind: "consumer group",
                key: name.to_string(),
            })
    }

    pub fn series(&self, metric: &str, scope: &Scope) -> Vec<Sample> {
        self.state.series(metric, scope)
    }

    pub fn sum_series(&self, metric: &str) -> Vec<Sample> {
        self.state.sum_series(metric)
    }

    pub fn overview(&self) -> Overview {
        let snapshot = self.state.current();
        Overview {
            brokers: snapshot.brokers.len(),
            topics: snapshot.topics.len(),
            partitions: snapshot.partition_count(),
            under_replicated_partitions: snapshot.under_replicated_partitions(),
            consumer_groups: snapshot.consumer_groups.len(),
            total_size: snapshot.total_size(),
            total_message_count: snapshot.total_message_count(),
            bytes_in: self.state.sum_series(BYTES_IN),
            bytes_out: self.state.sum_series(BYTES_OUT),
            messages_in: self.state.sum_series(MESSAGES_IN),
            isr_shrink: self.state.sum_series(ISR_SHRINK),
            isr_expand: self.state.sum_series(ISR_EXPAND),
            health: self.state.health(),
        }
    }

    pub fn health(&self) -> Health {
        self.state.health()
    }
}

fn denied(perms: &dyn Permissions, action: &'static str, resource: &str) -> Error {
    Error::PermissionDenied {
        principal: perms.principal().unwrap_or("anonymous").to_string(),
        action,
        resource: resource.to_string(),
    }
}

fn broker_not_found(id: BrokerId) -> Error {
    Error::NotFound {
        kind: "broker",
        key: id.to_string(),
    }
}
