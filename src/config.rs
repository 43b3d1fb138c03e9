//! Runtime configuration.
//!
//! Every option has a default and can be overridden from the environment:
//!
//! | Variable | Default |
//! |---|---|
//! | `AUTHENTICATION` | `scram` (`none`, `none-with-write`, `scram`/`credential-based`) |
//! | `ZOOKEEPER` | `localhost:2181` |
//! | `KAFKA` | `localhost:9092` |
//! | `KAFKA_SECURITY_PROTOCOL` | `plaintext` (`ssl`, `sasl_ssl`) |
//! | `KAFKA_SASL_MECHANISM` / `KAFKA_SASL_USERNAME` / `KAFKA_SASL_PASSWORD` | |
//! | `KAFKA_SSL_CA_LOCATION` / `KAFKA_SSL_CERTIFICATE_LOCATION` / `KAFKA_SSL_KEY_LOCATION` / `KAFKA_SSL_KEY_PASSWORD` | |
//! | `POLL_INTERVAL_SECS` | `10` |
//! | `SERIES_RETENTION` | `360` samples |
//! | `SWEEP_INTERVAL_SECS` | `30` |
//! | `ADMIN_TIMEOUT_SECS` | `15` |
//! | `SHUTDOWN_GRACE_SECS` | `2` |
//! | `LOG_FORMAT` | `pretty` |

use crate::domain::cluster::cluster::{Cluster, SaslMechanism, SecurityConfig};
use crate::telemetry::LogFormat;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthMode {
    /// Anonymous, read-only.
    #[serde(rename = "none")]
    None,
    /// Anonymous, reads and writes.
    #[serde(rename = "none-with-write")]
    NoneWithWrite,
    /// Authenticated principals checked against the cluster ACLs.
    #[default]
    #[serde(rename = "scram", alias = "credential-based")]
    CredentialBased,
}

impl FromStr for AuthMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(AuthMode::None),
            "none-with-write" => Ok(AuthMode::NoneWithWrite),
            "scram" | "credential-based" => Ok(AuthMode::CredentialBased),
            other => Err(format!(
                "'{}' is not one of none, none-with-write, scram",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub authentication: AuthMode,
    /// Coordination store connection string (`host:port[,host:port][/chroot]`).
    /// Not dialled here: the embedding service hands it to whichever
    /// `CoordinationStore` adapter it constructs, via `coordination_hosts`
    /// and `coordination_chroot`.
    pub zookeeper: String,
    /// Bootstrap broker used by the admin client.
    pub kafka: Cluster,
    #[serde(skip_serializing)]
    pub sasl_password: Option<String>,
    pub poll_interval_secs: u64,
    pub series_retention: usize,
    pub sweep_interval_secs: u64,
    pub admin_timeout_secs: u64,
    pub shutdown_grace_secs: u64,
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            authentication: AuthMode::default(),
            zookeeper: "localhost:2181".to_string(),
            kafka: Cluster::default(),
            sasl_password: None,
            poll_interval_secs: 10,
            series_retention: 360,
            sweep_interval_secs: 30,
            admin_timeout_secs: 15,
            shutdown_grace_secs: 2,
            log_format: LogFormat::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let parse = |key: &str| lookup(key).filter(|v| !v.is_empty());

        let authentication = parse_or(&lookup, "AUTHENTICATION", defaults.authentication)?;
        let zookeeper = parse("ZOOKEEPER").unwrap_or(defaults.zookeeper);
        let brokers = parse("KAFKA").unwrap_or(defaults.kafka.brokers.clone());

        let security = match parse("KAFKA_SECURITY_PROTOCOL")
            .unwrap_or_else(|| "plaintext".to_string())
            .to_lowercase()
            .as_str()
        {
            "plaintext" => SecurityConfig::Plaintext,
            "ssl" => SecurityConfig::Ssl {
                ca_location: parse("KAFKA_SSL_CA_LOCATION"),
                certificate_location: parse("KAFKA_SSL_CERTIFICATE_LOCATION"),
                key_location: parse("KAFKA_SSL_KEY_LOCATION"),
                key_password: parse("KAFKA_SSL_KEY_PASSWORD"),
            },
            "sasl_ssl" => SecurityConfig::SaslSsl {
                mechanism: parse_or(&lookup, "KAFKA_SASL_MECHANISM", SaslMechanism::ScramSha256)?,
                username: parse("KAFKA_SASL_USERNAME").ok_or_else(|| {
                    Error::Config("KAFKA_SASL_USERNAME is required for sasl_ssl".to_string())
                })?,
                ca_location: parse("KAFKA_SSL_CA_LOCATION"),
            },
            other => {
                return Err(Error::Config(format!(
                    "Invalid KAFKA_SECURITY_PROTOCOL: {}",
                    other
                )))
            }
        };

        let log_format = parse("LOG_FORMAT")
            .map(|v| v.parse().unwrap_or_default())
            .unwrap_or(defaults.log_format);

        let config = Self {
            authentication,
            zookeeper,
            kafka: Cluster {
                name: defaults.kafka.name,
                brokers,
                security,
            },
            sasl_password: parse("KAFKA_SASL_PASSWORD"),
            poll_interval_secs: parse_or(&lookup, "POLL_INTERVAL_SECS", defaults.poll_interval_secs)?,
            series_retention: parse_or(&lookup, "SERIES_RETENTION", defaults.series_retention)?,
            sweep_interval_secs: parse_or(
                &lookup,
                "SWEEP_INTERVAL_SECS",
                defaults.sweep_interval_secs,
            )?,
            admin_timeout_secs: parse_or(&lookup, "ADMIN_TIMEOUT_SECS", defaults.admin_timeout_secs)?,
            shutdown_grace_secs: parse_or(
                &lookup,
                "SHUTDOWN_GRACE_SECS",
                defaults.shutdown_grace_secs,
            )?,
            log_format,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();
        if self.poll_interval_secs == 0 {
            problems.push("poll interval must be at least 1 second");
        }
        if self.sweep_interval_secs == 0 {
            problems.push("sweep interval must be at least 1 second");
        }
        if self.series_retention == 0 {
            problems.push("series retention must be at least 1 sample");
        }
        if self.admin_timeout_secs == 0 {
            problems.push("admin timeout must be at least 1 second");
        }
        if self.coordination_hosts().is_empty() {
            problems.push("coordination store address is empty");
        }
        if self.kafka.brokers.is_empty() {
            problems.push("bootstrap broker list is empty");
        }
        if problems.is_empty() {
            Ok(())
        } else {
            Err(Error::Config(problems.join("; ")))
        }
    }

    /// Hosts of the coordination store ensemble, without the chroot.
    pub fn coordination_hosts(&self) -> Vec<&str> {
        let hosts = match self.zookeeper.split_once('/') {
            Some((hosts, _)) => hosts,
            None => self.zookeeper.as_str(),
        };
        hosts
            .split(',')
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .collect()
    }

    /// Path prefix Kafka's metadata lives under, if the cluster uses one.
    pub fn coordination_chroot(&self) -> Option<&str> {
        self.zookeeper
            .find('/')
            .map(|i| &self.zookeeper[i..])
            .filter(|chroot| *chroot != "/")
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn admin_timeout(&self) -> Duration {
        Duration::from_secs(self.admin_timeout_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    match lookup(key).filter(|v| !v.is_empty()) {
        Some(v) => v
            .parse()
            .map_err(|e| Error::Config(format!("Invalid {}: {}", key, e))),
        None => Ok(default),
    }
}
