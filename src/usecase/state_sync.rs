//! Keeps the published [`Snapshot`] in step with the coordination store.
//!
//! Two triggers drive reconciliation: one-shot child watches on the broker
//! and topic lists, and a fixed-interval sweep. Watches are re-armed as soon
//! as they fire, before the store is read again, and the sweep runs whether
//! or not any watch fired, so a lost notification delays a change by at most
//! one sweep interval.
//!
//! Every reconciliation reads the full tree and builds a new snapshot from
//! scratch. Nothing is patched incrementally.

use crate::background::ShutdownSignal;
use crate::domain::acl::{decode_acls, AclEntry, PatternType, ResourceType};
use crate::domain::broker::{Broker, BrokerId};
use crate::domain::consumer_group::ConsumerGroup;
use crate::domain::snapshot::Snapshot;
use crate::domain::topic::{Partition, PartitionAssignment, Topic, TopicConfig};
use crate::infrastructure::coordination::{paths, CoordinationStore, Watch};
use crate::retry;
use crate::state::{ClusterState, Health};
use crate::{Error, Result};
use backon::{ExponentialBuilder, Retryable};
use futures::future::try_join_all;
use serde::de::DeserializeOwned;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

pub struct StateSynchronizer {
    store: Arc<dyn CoordinationStore>,
    state: Arc<ClusterState>,
    sweep_interval: Duration,
    backoff: ExponentialBuilder,
}

/// Armed child watches. An empty slot is re-armed before the next read.
#[derive(Default)]
pub struct Watches {
    brokers: Option<Watch>,
    topics: Option<Watch>,
}

impl Watches {
    pub fn is_armed(&self) -> bool {
        self.brokers.is_some() && self.topics.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    Sweep,
    Notification(&'static str),
}

impl StateSynchronizer {
    pub fn new(
        store: Arc<dyn CoordinationStore>,
        state: Arc<ClusterState>,
        sweep_interval: Duration,
    ) -> Self {
        Self {
            store,
            state,
            sweep_interval,
            backoff: retry::coordination_policy(),
        }
    }

    pub fn with_backoff(mut self, backoff: ExponentialBuilder) -> Self {
        self.backoff = backoff;
        self
    }

    /// Arms both child watches. Paths that cannot be watched right now are
    /// left empty and retried on the next trigger.
    pub async fn subscribe(&self) -> Watches {
        let mut watches = Watches::default();
        self.rearm(&mut watches).await;
        watches
    }

    async fn rearm(&self, watches: &mut Watches) {
        if watches.brokers.is_none() {
            watches.brokers = self.arm(paths::BROKER_IDS).await;
        }
        if watches.topics.is_none() {
            watches.topics = self.arm(paths::TOPICS).await;
        }
    }

    async fn arm(&self, path: &'static str) -> Option<Watch> {
        match self.store.watch_children(path).await {
            Ok(watch) => Some(watch),
            Err(e) => {
                debug!(path, error = %e, "Could not arm watch");
                None
            }
        }
    }

    /// Reads the whole tree and returns a candidate snapshot carrying the
    /// poller's latest metrics. Only connection failures are errors; absent
    /// and malformed resources are left out.
    pub async fn reconcile(&self) -> Result<Snapshot> {
        let (brokers, topics, consumer_groups, acls) = futures::try_join!(
            self.read_brokers(),
            self.read_topics(),
            self.read_consumer_groups(),
            self.read_acls(),
        )?;
        Ok(Snapshot::assemble(
            brokers,
            topics,
            consumer_groups,
            acls,
            &self.state.latest_metrics(),
        ))
    }

    /// One reconciliation and publish, without retries.
    pub async fn sync_once(&self) -> Result<()> {
        let snapshot = self.reconcile().await?;
        self.publish(snapshot);
        Ok(())
    }

    /// Reconnects and reconciles under the backoff policy. Exhausting the
    /// policy marks the state degraded; the last good snapshot stays
    /// published.
    pub async fn sync_with_backoff(&self) -> Result<()> {
        let outcome = (|| async {
            self.store.connect().await?;
            self.reconcile().await
        })
        .retry(self.backoff.clone())
        .when(Error::is_transient)
        .notify(|e: &Error, delay: Duration| {
            warn!(error = %e, retry_in = ?delay, "Reconciliation failed, retrying");
        })
        .await;

        match outcome {
            Ok(snapshot) => {
                self.publish(snapshot);
                self.state.set_health(Health::Healthy);
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Reconciliation gave up, serving last snapshot");
                self.state.set_health(Health::Degraded {
                    reason: e.to_string(),
                });
                Err(e)
            }
        }
    }

    fn publish(&self, snapshot: Snapshot) {
        debug!(
            brokers = snapshot.brokers.len(),
            topics = snapshot.topics.len(),
            consumer_groups = snapshot.consumer_groups.len(),
            acls = snapshot.acls.len(),
            "Publishing snapshot"
        );
        self.state.publish_snapshot(snapshot);
    }

    /// Runs until `shutdown` fires. `watches` should have been armed before
    /// the initial reconciliation.
    pub async fn run(self, mut watches: Watches, mut shutdown: ShutdownSignal) {
        let mut sweep = tokio::time::interval(self.sweep_interval);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);
        sweep.tick().await;

        info!(sweep_interval = ?self.sweep_interval, "State synchronizer started");
        loop {
            let trigger = tokio::select! {
                _ = shutdown.stopped() => break,
                _ = sweep.tick() => Trigger::Sweep,
                _ = fired(&mut watches.brokers) => Trigger::Notification(paths::BROKER_IDS),
                _ = fired(&mut watches.topics) => Trigger::Notification(paths::TOPICS),
            };
            match trigger {
                Trigger::Notification(paths::BROKER_IDS) => watches.brokers = None,
                Trigger::Notification(_) => watches.topics = None,
                Trigger::Sweep => {}
            }
            self.rearm(&mut watches).await;

            debug!(trigger = ?trigger, "Reconciling");
            // Failures are logged and reflected in health already. Shutdown
            // abandons a reconciliation that is still backing off.
            tokio::select! {
                _ = shutdown.stopped() => break,
                _ = self.sync_with_backoff() => {}
            }
        }
        info!("State synchronizer stopped");
    }

    async fn read_brokers(&self) -> Result<BTreeMap<BrokerId, Broker>> {
        let ids = self.children_or_empty(paths::BROKER_IDS).await?;
        let reads = ids.iter().filter_map(|raw| match raw.parse::<BrokerId>() {
            Ok(id) => Some(self.read_broker(id)),
            Err(_) => {
                warn!(id = %raw, "Ignoring non-numeric broker id");
                None
            }
        });
        Ok(try_join_all(reads)
            .await?
            .into_iter()
            .flatten()
            .map(|broker| (broker.id, broker))
            .collect())
    }

    async fn read_broker(&self, id: BrokerId) -> Result<Option<Broker>> {
        let broker = self.read_json::<Broker>(&paths::broker(id)).await?;
        Ok(broker.map(|broker| Broker { id, ..broker }))
    }

    async fn read_topics(&self) -> Result<BTreeMap<String, Topic>> {
        let deleting: HashSet<String> = self
            .children_or_empty(paths::DELETE_TOPICS)
            .await?
            .into_iter()
            .collect();
        let names = self.children_or_empty(paths::TOPICS).await?;
        let topics = try_join_all(
            names
                .iter()
                .map(|name| self.read_topic(name, deleting.contains(name))),
        )
        .await?;
        Ok(topics
            .into_iter()
            .flatten()
            .map(|topic| (topic.name.clone(), topic))
            .collect())
    }

    async fn read_topic(&self, name: &str, deleted: bool) -> Result<Option<Topic>> {
        let path = paths::topic(name);
        let Some(assignment) = self.read_json::<PartitionAssignment>(&path).await? else {
            return Ok(None);
        };
        let replicas = match assignment.ordered() {
            Ok(replicas) => replicas,
            Err(reason) => {
                let e = Error::MalformedData { path, reason };
                warn!(error = %e, "Skipping topic");
                return Ok(None);
            }
        };

        let partitions = try_join_all(
            replicas
                .into_iter()
                .map(|(number, replicas)| self.read_partition(name, number, replicas)),
        )
        .await?;
        let config = self
            .read_json::<TopicConfig>(&paths::topic_config(name))
            .await?
            .unwrap_or_default();

        Ok(Some(Topic::new(name.to_string(), partitions, config, deleted)))
    }

    async fn read_partition(
        &self,
        topic: &str,
        number: i32,
        replicas: Vec<BrokerId>,
    ) -> Result<Partition> {
        let state = self
            .read_json::<Partition>(&paths::partition_state(topic, number))
            .await?;
        Ok(match state {
            Some(state) => Partition {
                number,
                replicas,
                metrics: BTreeMap::new(),
                ..state
            },
            None => Partition::unassigned(number, replicas),
        })
    }

    async fn read_consumer_groups(&self) -> Result<BTreeMap<String, ConsumerGroup>> {
        let names = self.children_or_empty(paths::CONSUMERS).await?;
        let groups = try_join_all(names.iter().map(|name| self.read_consumer_group(name))).await?;
        Ok(groups
            .into_iter()
            .map(|group| (group.name.clone(), group))
            .collect())
    }

    async fn read_consumer_group(&self, group: &str) -> Result<ConsumerGroup> {
        let mut offsets = BTreeMap::new();
        for topic in self.children_or_empty(&paths::group_offsets(group)).await? {
            let mut committed = BTreeMap::new();
            for raw in self
                .children_or_empty(&paths::group_topic_offsets(group, &topic))
                .await?
            {
                let Ok(partition) = raw.parse::<i32>() else {
                    warn!(group, topic = %topic, partition = %raw, "Ignoring non-numeric partition");
                    continue;
                };
                let path = paths::group_partition_offset(group, &topic, partition);
                let Some(data) = self.store.get(&path).await? else {
                    continue;
                };
                match parse_offset(&data) {
                    Some(offset) => {
                        committed.insert(partition, offset);
                    }
                    None => {
                        let e = Error::MalformedData {
                            path,
                            reason: "offset is not a decimal integer".to_string(),
                        };
                        warn!(error = %e, "Skipping committed offset");
                    }
                }
            }
            offsets.insert(topic, committed);
        }
        Ok(ConsumerGroup::new(group.to_string(), offsets))
    }

    async fn read_acls(&self) -> Result<Vec<AclEntry>> {
        let mut acls = Vec::new();
        for pattern in [PatternType::Literal, PatternType::Prefixed] {
            for resource in [ResourceType::Topic, ResourceType::Group] {
                let root = paths::acl_root(pattern, resource);
                for name in self.children_or_empty(&root).await? {
                    let path = format!("{}/{}", root, name);
                    let Some(data) = self.store.get(&path).await? else {
                        continue;
                    };
                    match decode_acls(&data, resource, pattern, &name) {
                        Ok(entries) => acls.extend(entries),
                        Err(e) => {
                            let e = Error::MalformedData {
                                path,
                                reason: e.to_string(),
                            };
                            warn!(error = %e, "Skipping ACL node");
                        }
                    }
                }
            }
        }
        Ok(acls)
    }

    async fn children_or_empty(&self, path: &str) -> Result<Vec<String>> {
        Ok(self.store.children(path).await?.unwrap_or_default())
    }

    /// Absent and undecodable nodes both read as `None`; the latter is
    /// logged.
    async fn read_json<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>> {
        let Some(data) = self.store.get(path).await? else {
            return Ok(None);
        };
        match serde_json::from_slice(&data) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                let e = Error::MalformedData {
                    path: path.to_string(),
                    reason: e.to_string(),
                };
                warn!(error = %e, "Skipping malformed document");
                Ok(None)
            }
        }
    }
}

/// Resolves when the watch fires or its session is lost. Never resolves for
/// an empty slot.
async fn fired(slot: &mut Option<Watch>) {
    match slot {
        Some(watch) => {
            let _ = watch.await;
        }
        None => std::future::pending::<()>().await,
    }
}

fn parse_offset(data: &[u8]) -> Option<i64> {
    std::str::from_utf8(data).ok()?.trim().parse().ok()
}
