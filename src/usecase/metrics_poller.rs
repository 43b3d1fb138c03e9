//! Periodic collection of broker counters and partition log metrics.
//!
//! Each tick polls every broker in the current snapshot concurrently. A
//! broker whose first query fails with a connection error is skipped for
//! the whole tick: it records no samples, and partitions it leads keep the
//! values from the last tick it answered. Topic rates that would need its
//! share are held as well, and series of brokers and topics no longer in
//! the snapshot are dropped.

use crate::background::ShutdownSignal;
use crate::domain::broker::{Broker, BrokerId, BrokerStats};
use crate::domain::metrics::MetricsStore;
use crate::domain::series::{
    Scope, BYTES_IN, BYTES_OUT, ISR_EXPAND, ISR_SHRINK, MESSAGES_IN, MESSAGE_COUNT, TOPIC_SIZE,
};
use crate::domain::topic::{LOG_END_OFFSET, LOG_START_OFFSET, SIZE};
use crate::infrastructure::counters::{
    BrokerCounters, BYTES_IN_PER_SEC, BYTES_OUT_PER_SEC, ISR_EXPANDS_PER_SEC,
    ISR_SHRINKS_PER_SEC, MESSAGES_IN_PER_SEC,
};
use crate::state::{ClusterState, PendingSample};
use crate::Result;
use futures::future::join_all;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Broker-scoped counters and the series they feed.
static BROKER_COUNTERS: [(&str, &str); 5] = [
    (BYTES_IN_PER_SEC, BYTES_IN),
    (BYTES_OUT_PER_SEC, BYTES_OUT),
    (MESSAGES_IN_PER_SEC, MESSAGES_IN),
    (ISR_SHRINKS_PER_SEC, ISR_SHRINK),
    (ISR_EXPANDS_PER_SEC, ISR_EXPAND),
];

/// Counters also read per topic and summed across brokers.
static TOPIC_COUNTERS: [(&str, &str); 3] = [
    (BYTES_IN_PER_SEC, BYTES_IN),
    (BYTES_OUT_PER_SEC, BYTES_OUT),
    (MESSAGES_IN_PER_SEC, MESSAGES_IN),
];

static PARTITION_METRICS: [&str; 3] = [LOG_START_OFFSET, LOG_END_OFFSET, SIZE];

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TickReport {
    pub tick: u64,
    pub reachable: Vec<BrokerId>,
    pub unreachable: Vec<BrokerId>,
    pub samples: usize,
}

struct BrokerReading {
    id: BrokerId,
    version: Option<String>,
    counters: Vec<(&'static str, f64)>,
    topic_counters: Vec<(String, &'static str, f64)>,
}

pub struct MetricsPoller {
    counters: Arc<dyn BrokerCounters>,
    state: Arc<ClusterState>,
    interval: Duration,
    metrics: MetricsStore,
}

impl MetricsPoller {
    pub fn new(
        counters: Arc<dyn BrokerCounters>,
        state: Arc<ClusterState>,
        interval: Duration,
    ) -> Self {
        Self {
            counters,
            state,
            interval,
            metrics: MetricsStore::default(),
        }
    }

    pub async fn run(mut self, mut shutdown: ShutdownSignal) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(interval = ?self.interval, "Metrics poller started");
        loop {
            tokio::select! {
                _ = shutdown.stopped() => break,
                _ = ticker.tick() => {
                    let report = self.tick().await;
                    debug!(
                        tick = report.tick,
                        reachable = report.reachable.len(),
                        unreachable = ?report.unreachable,
                        samples = report.samples,
                        "Metrics tick complete"
                    );
                }
            }
        }
        info!("Metrics poller stopped");
    }

    /// Polls once and publishes the result.
    pub async fn tick(&mut self) -> TickReport {
        let snapshot = self.state.current();
        self.metrics.tick += 1;
        let tick = self.metrics.tick;
        let source = Arc::clone(&self.counters);
        let counters = source.as_ref();

        let topic_names: Vec<String> = snapshot.topics.keys().cloned().collect();
        let names = topic_names.as_slice();
        let readings = join_all(
            snapshot
                .brokers
                .values()
                .map(|broker| async move { (broker.id, poll_broker(counters, broker, names).await) }),
        )
        .await;

        let mut report = TickReport {
            tick,
            ..Default::default()
        };
        let mut samples = Vec::new();
        let mut topic_rates: BTreeMap<String, BTreeMap<&'static str, f64>> = BTreeMap::new();

        for (id, reading) in readings {
            let reading = match reading {
                Ok(reading) => reading,
                Err(e) => {
                    let stats = self.metrics.brokers.entry(id).or_default();
                    if stats.reachable {
                        warn!(broker = id, error = %e, "Broker unreachable, skipping its samples");
                    }
                    stats.reachable = false;
                    report.unreachable.push(id);
                    continue;
                }
            };
            report.reachable.push(id);

            let rate = |metric: &str| {
                reading
                    .counters
                    .iter()
                    .find(|(m, _)| *m == metric)
                    .map(|(_, v)| *v)
            };
            let previous = self.metrics.brokers.remove(&id).unwrap_or_default();
            self.metrics.brokers.insert(
                id,
                BrokerStats {
                    kafka_version: reading.version.clone().or(previous.kafka_version),
                    bytes_in_per_sec: rate(BYTES_IN),
                    bytes_out_per_sec: rate(BYTES_OUT),
                    messages_in_per_sec: rate(MESSAGES_IN),
                    reachable: true,
                },
            );

            for &(metric, value) in &reading.counters {
                samples.push(PendingSample {
                    metric,
                    scope: Scope::Broker(id),
                    value,
                });
            }
            for (topic, metric, value) in reading.topic_counters {
                *topic_rates.entry(topic).or_default().entry(metric).or_insert(0.0) += value;
            }
        }
        self.metrics
            .brokers
            .retain(|id, _| snapshot.brokers.contains_key(id));

        // A topic with a replica on a silent broker keeps its last rates.
        let unreachable: HashSet<BrokerId> = report.unreachable.iter().copied().collect();
        let incomplete = |topic: &str| {
            snapshot.topic(topic).map_or(false, |t| {
                t.partitions.iter().any(|p| {
                    unreachable.contains(&p.leader)
                        || p.replicas.iter().any(|r| unreachable.contains(r))
                })
            })
        };
        for (topic, rates) in topic_rates {
            if incomplete(&topic) {
                continue;
            }
            for (&metric, &value) in &rates {
                samples.push(PendingSample {
                    metric,
                    scope: Scope::Topic(topic.clone()),
                    value,
                });
            }
            let rates = rates
                .into_iter()
                .map(|(metric, value)| (metric.to_string(), value))
                .collect();
            self.metrics.topics.insert(topic, rates);
        }

        let reachable: HashSet<BrokerId> = report.reachable.iter().copied().collect();
        let (reachable, current) = (&reachable, snapshot.as_ref());
        let targets: Vec<(&Broker, &str, i32)> = current
            .topics
            .values()
            .flat_map(move |topic| {
                topic.partitions.iter().filter_map(move |p| {
                    if !reachable.contains(&p.leader) {
                        return None;
                    }
                    let leader = current.broker(p.leader)?;
                    Some((leader, topic.name.as_str(), p.number))
                })
            })
            .collect();
        let partition_readings = join_all(targets.into_iter().map(|(leader, topic, number)| async move {
            let values = poll_partition(counters, leader, topic, number).await;
            (topic, number, values)
        }))
        .await;
        for (topic, number, values) in partition_readings {
            if values.is_empty() {
                continue;
            }
            let entry = self
                .metrics
                .partitions
                .entry((topic.to_string(), number))
                .or_default();
            for (name, value) in values {
                entry.insert(name.to_string(), value);
            }
        }
        self.metrics
            .retain_topics(|topic| snapshot.topics.contains_key(topic));

        let measured = snapshot.with_metrics(&self.metrics);
        for topic in measured.topics.values() {
            samples.push(PendingSample {
                metric: MESSAGE_COUNT,
                scope: Scope::Topic(topic.name.clone()),
                value: topic.message_count as f64,
            });
            samples.push(PendingSample {
                metric: TOPIC_SIZE,
                scope: Scope::Topic(topic.name.clone()),
                value: topic.size as f64,
            });
        }
        samples.push(PendingSample {
            metric: MESSAGE_COUNT,
            scope: Scope::Cluster,
            value: measured.total_message_count() as f64,
        });
        samples.push(PendingSample {
            metric: TOPIC_SIZE,
            scope: Scope::Cluster,
            value: measured.total_size() as f64,
        });

        report.samples = samples.len();
        self.state.retain_series(|scope| match scope {
            Scope::Cluster => true,
            Scope::Broker(id) => snapshot.brokers.contains_key(id),
            Scope::Topic(topic) => snapshot.topics.contains_key(topic),
        });
        self.state.publish_metrics(self.metrics.clone(), samples);
        report
    }
}

async fn poll_broker(
    counters: &dyn BrokerCounters,
    broker: &Broker,
    topics: &[String],
) -> Result<BrokerReading> {
    let version = match counters.version(broker).await {
        Ok(version) => Some(version),
        Err(e) if e.is_transient() => return Err(e),
        Err(e) => {
            debug!(broker = broker.id, error = %e, "Broker did not report a version");
            None
        }
    };

    let broker_counters = join_all(BROKER_COUNTERS.iter().map(|&(name, metric)| async move {
        read_counter(counters, broker, name, None)
            .await
            .map(|value| (metric, value))
    }))
    .await;

    let topic_counters = join_all(topics.iter().flat_map(|topic| {
        TOPIC_COUNTERS.iter().map(move |&(name, metric)| async move {
            read_counter(counters, broker, name, Some(topic))
                .await
                .map(|value| (topic.clone(), metric, value))
        })
    }))
    .await;

    Ok(BrokerReading {
        id: broker.id,
        version,
        counters: broker_counters.into_iter().flatten().collect(),
        topic_counters: topic_counters.into_iter().flatten().collect(),
    })
}

async fn read_counter(
    counters: &dyn BrokerCounters,
    broker: &Broker,
    name: &str,
    topic: Option<&str>,
) -> Option<f64> {
    match counters.counter(broker, name, topic).await {
        Ok(value) => Some(value),
        Err(e) => {
            debug!(broker = broker.id, counter = name, topic = ?topic, error = %e, "Counter unavailable");
            None
        }
    }
}

async fn poll_partition(
    counters: &dyn BrokerCounters,
    leader: &Broker,
    topic: &str,
    partition: i32,
) -> Vec<(&'static str, i64)> {
    let values = join_all(PARTITION_METRICS.iter().map(|&name| async move {
        match counters.partition_metric(leader, topic, partition, name).await {
            Ok(value) => Some((name, value)),
            Err(e) => {
                debug!(topic, partition, metric = name, error = %e, "Partition metric unavailable");
                None
            }
        }
    }))
    .await;
    values.into_iter().flatten().collect()
}
