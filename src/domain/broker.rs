use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub type BrokerId = i32;

/// A broker registration as published under `/brokers/ids/{id}`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Broker {
    #[serde(default)]
    pub id: BrokerId,
    pub host: String,
    pub port: i32,
    #[serde(default = "no_jmx_port")]
    pub jmx_port: i32,
    #[serde(default)]
    pub version: i32,
    /// Registration time in epoch millis. Kafka writes it as a string.
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub endpoints: Vec<String>,
}

fn no_jmx_port() -> i32 {
    -1
}

impl Broker {
    pub fn registered_at(&self) -> Option<SystemTime> {
        let millis: u64 = self.timestamp.parse().ok()?;
        Some(UNIX_EPOCH + Duration::from_millis(millis))
    }

    pub fn uptime(&self, now: SystemTime) -> Option<Duration> {
        now.duration_since(self.registered_at()?).ok()
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Live counters the poller keeps per broker, outside the snapshot.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct BrokerStats {
    pub kafka_version: Option<String>,
    pub bytes_in_per_sec: Option<f64>,
    pub bytes_out_per_sec: Option<f64>,
    pub messages_in_per_sec: Option<f64>,
    pub reachable: bool,
}
