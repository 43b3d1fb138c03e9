#![allow(dead_code)]

use async_trait::async_trait;
use kafkust_state::config::{AuthMode, Config};
use kafkust_state::domain::topic::TopicSpec;
use kafkust_state::infrastructure::coordination::{paths, CoordinationStore};
use kafkust_state::infrastructure::kafka::{AdminRpc, ResultCode};
use kafkust_state::{Error, MemoryStore, Result};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Admin RPC that applies mutations to a [`MemoryStore`] the way a Kafka
/// controller would update ZooKeeper.
pub struct FakeAdmin {
    store: Arc<MemoryStore>,
    reachable: AtomicBool,
    delay: parking_lot::Mutex<Option<Duration>>,
    requests: AtomicUsize,
}

impl FakeAdmin {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self {
            store,
            reachable: AtomicBool::new(true),
            delay: parking_lot::Mutex::new(None),
            requests: AtomicUsize::new(0),
        }
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    async fn begin(&self) -> Result<()> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if !self.reachable.load(Ordering::SeqCst) {
            return Err(Error::TransientConnection("bootstrap broker down".into()));
        }
        Ok(())
    }

    async fn assignment(&self, name: &str) -> Result<Option<Map<String, Value>>> {
        let Some(data) = self.store.get(&paths::topic(name)).await? else {
            return Ok(None);
        };
        let doc: Value = serde_json::from_slice(&data).unwrap_or(Value::Null);
        Ok(doc.get("partitions").and_then(Value::as_object).cloned())
    }

    fn write_partition(&self, topic: &str, number: i32, replicas: &[i32]) {
        self.store.put_json(
            &paths::partition_state(topic, number),
            &json!({"leader": replicas[0], "isr": replicas, "leader_epoch": 0, "controller_epoch": 1, "version": 1}),
        );
    }
}

#[async_trait]
impl AdminRpc for FakeAdmin {
    async fn check_connection(&self, _timeout: Duration) -> Result<()> {
        self.begin().await
    }

    async fn create_topic(&self, spec: &TopicSpec, _timeout: Duration) -> Result<ResultCode> {
        self.begin().await?;
        if self.assignment(&spec.name).await?.is_some() {
            return Ok(ResultCode::Error("TopicAlreadyExists".into()));
        }
        if spec.partitions < 1 || spec.replication_factor < 1 {
            return Ok(ResultCode::Error("InvalidPartitions".into()));
        }
        let replicas: Vec<i32> = (1..=spec.replication_factor).collect();
        let partitions: Map<String, Value> = (0..spec.partitions)
            .map(|number| (number.to_string(), json!(replicas)))
            .collect();
        self.store.put_json(
            &paths::topic_config(&spec.name),
            &json!({"version": 1, "config": spec.config}),
        );
        self.store.put_json(
            &paths::topic(&spec.name),
            &json!({"version": 1, "partitions": partitions}),
        );
        for number in 0..spec.partitions {
            self.write_partition(&spec.name, number, &replicas);
        }
        Ok(ResultCode::NoError)
    }

    async fn delete_topic(&self, name: &str, _timeout: Duration) -> Result<ResultCode> {
        self.begin().await?;
        if self.assignment(name).await?.is_none() {
            return Ok(ResultCode::Error("UnknownTopicOrPartition".into()));
        }
        self.store.delete(&paths::topic(name));
        self.store.delete(&paths::topic_config(name));
        Ok(ResultCode::NoError)
    }

    async fn alter_topic_config(
        &self,
        name: &str,
        changes: &BTreeMap<String, String>,
        _timeout: Duration,
    ) -> Result<ResultCode> {
        self.begin().await?;
        if self.assignment(name).await?.is_none() {
            return Ok(ResultCode::Error("UnknownTopicOrPartition".into()));
        }
        let path = paths::topic_config(name);
        let mut config = match self.store.get(&path).await? {
            Some(data) => serde_json::from_slice::<Value>(&data)
                .ok()
                .and_then(|doc| doc.get("config").and_then(Value::as_object).cloned())
                .unwrap_or_default(),
            None => Map::new(),
        };
        for (key, value) in changes {
            config.insert(key.clone(), Value::String(value.clone()));
        }
        self.store
            .put_json(&path, &json!({"version": 1, "config": config}));
        Ok(ResultCode::NoError)
    }

    async fn create_partitions(
        &self,
        name: &str,
        total: i32,
        _timeout: Duration,
    ) -> Result<ResultCode> {
        self.begin().await?;
        let Some(mut partitions) = self.assignment(name).await? else {
            return Ok(ResultCode::Error("UnknownTopicOrPartition".into()));
        };
        let current = partitions.len() as i32;
        if total <= current {
            return Ok(ResultCode::Error("InvalidPartitions".into()));
        }
        for number in current..total {
            partitions.insert(number.to_string(), json!([1]));
            self.write_partition(name, number, &[1]);
        }
        self.store.put_json(
            &paths::topic(name),
            &json!({"version": 1, "partitions": partitions}),
        );
        Ok(ResultCode::NoError)
    }
}

pub fn test_config(authentication: AuthMode) -> Config {
    Config {
        authentication,
        poll_interval_secs: 1,
        sweep_interval_secs: 1,
        series_retention: 10,
        admin_timeout_secs: 1,
        shutdown_grace_secs: 1,
        ..Config::default()
    }
}

pub fn put_broker(store: &MemoryStore, id: i32) {
    store.put_json(
        &paths::broker(id),
        &json!({
            "host": format!("kafka-{}", id),
            "port": 9092,
            "jmx_port": 9999,
            "timestamp": "1548420000000",
            "endpoints": [format!("PLAINTEXT://kafka-{}:9092", id)],
            "version": 4
        }),
    );
}

/// Writes a topic whose partition `n` is led by `leaders[n]`. The
/// assignment goes in first, as the controller does it.
pub fn put_topic(store: &MemoryStore, name: &str, leaders: &[i32]) {
    let partitions: Map<String, Value> = leaders
        .iter()
        .enumerate()
        .map(|(number, &leader)| (number.to_string(), json!([leader])))
        .collect();
    store.put_json(
        &paths::topic(name),
        &json!({"version": 1, "partitions": partitions}),
    );
    for (number, &leader) in leaders.iter().enumerate() {
        store.put_json(
            &paths::partition_state(name, number as i32),
            &json!({"leader": leader, "isr": [leader], "leader_epoch": 0, "controller_epoch": 1, "version": 1}),
        );
    }
}

/// Three brokers and an `orders` topic with one partition on each.
pub fn seeded_store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    for id in 1..=3 {
        put_broker(&store, id);
    }
    put_topic(&store, "orders", &[1, 2, 3]);
    store
}

/// Polls `condition` until it holds, failing the test after five seconds.
pub async fn wait_for<F>(what: &str, condition: F)
where
    F: Fn() -> bool,
{
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
