//! Access to the coordination store (the ZooKeeper tree Kafka keeps its
//! metadata in).
//!
//! Only the operations the synchronizer needs are modelled. Child watches
//! are one-shot: a watch fires at most once and must be re-armed by the
//! caller. A watch whose sender is dropped (session loss) resolves with an
//! error, which callers treat like a delivery.

pub mod memory;

use crate::Result;
use async_trait::async_trait;
use tokio::sync::oneshot;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    ChildrenChanged(String),
}

pub type Watch = oneshot::Receiver<WatchEvent>;

#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// Establishes the session if it is not already up.
    async fn connect(&self) -> Result<()>;

    /// Node data, or `None` when the node does not exist.
    async fn get(&self, path: &str) -> Result<Option<Vec<u8>>>;

    /// Child names, or `None` when the node does not exist.
    async fn children(&self, path: &str) -> Result<Option<Vec<String>>>;

    /// Registers a one-shot watch on the children of `path`.
    async fn watch_children(&self, path: &str) -> Result<Watch>;
}

pub mod paths {
    use crate::domain::acl::{PatternType, ResourceType};
    use crate::domain::broker::BrokerId;

    pub const BROKER_IDS: &str = "/brokers/ids";
    pub const TOPICS: &str = "/brokers/topics";
    pub const DELETE_TOPICS: &str = "/admin/delete_topics";
    pub const CONSUMERS: &str = "/consumers";

    pub fn broker(id: BrokerId) -> String {
        format!("{}/{}", BROKER_IDS, id)
    }

    pub fn topic(name: &str) -> String {
        format!("{}/{}", TOPICS, name)
    }

    pub fn partition_state(topic: &str, partition: i32) -> String {
        format!("{}/{}/partitions/{}/state", TOPICS, topic, partition)
    }

    pub fn topic_config(name: &str) -> String {
        format!("/config/topics/{}", name)
    }

    pub fn topic_deletion(name: &str) -> String {
        format!("{}/{}", DELETE_TOPICS, name)
    }

    pub fn group_offsets(group: &str) -> String {
        format!("{}/{}/offsets", CONSUMERS, group)
    }

    pub fn group_topic_offsets(group: &str, topic: &str) -> String {
        format!("{}/{}/offsets/{}", CONSUMERS, group, topic)
    }

    pub fn group_partition_offset(group: &str, topic: &str, partition: i32) -> String {
        format!("{}/{}/offsets/{}/{}", CONSUMERS, group, topic, partition)
    }

    pub fn acl_root(pattern: PatternType, resource: ResourceType) -> String {
        match pattern {
            PatternType::Literal => format!("/kafka-acl/{}", resource.segment()),
            PatternType::Prefixed => {
                format!("/kafka-acl-extended/prefixed/{}", resource.segment())
            }
        }
    }

    pub fn parent(path: &str) -> Option<&str> {
        match path.rsplit_once('/') {
            Some(("", _)) if path.len() > 1 => Some("/"),
            Some((parent, _)) if !parent.is_empty() => Some(parent),
            _ => None,
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn layout() {
            assert_eq!(partition_state("orders", 2), "/brokers/topics/orders/partitions/2/state");
            assert_eq!(
                acl_root(PatternType::Prefixed, ResourceType::Group),
                "/kafka-acl-extended/prefixed/Group"
            );
            assert_eq!(group_partition_offset("g", "t", 0), "/consumers/g/offsets/t/0");
        }

        #[test]
        fn parents() {
            assert_eq!(parent("/brokers/ids/1"), Some("/brokers/ids"));
            assert_eq!(parent("/brokers"), Some("/"));
            assert_eq!(parent("/"), None);
        }
    }
}
