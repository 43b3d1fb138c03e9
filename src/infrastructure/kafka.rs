use crate::domain::cluster::cluster::{Cluster, SecurityConfig};
use crate::domain::topic::TopicSpec;
use crate::{Error, Result};
use async_trait::async_trait;
use rdkafka::admin::{
    AdminClient, AdminOptions, AlterConfig, NewPartitions, NewTopic, ResourceSpecifier,
    TopicReplication,
};
use rdkafka::client::DefaultClientContext;
use rdkafka::config::ClientConfig;
use rdkafka::types::RDKafkaErrorCode;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

/// Per-resource result of an admin request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultCode {
    NoError,
    Error(String),
}

/// The admin RPCs the gateway issues. Every call carries exactly one
/// resource and an explicit timeout. `Err` means the request itself could
/// not be delivered; a broker-side rejection is an `Ok(ResultCode::Error)`.
#[async_trait]
pub trait AdminRpc: Send + Sync {
    async fn check_connection(&self, timeout: Duration) -> Result<()>;

    async fn create_topic(&self, spec: &TopicSpec, timeout: Duration) -> Result<ResultCode>;

    async fn delete_topic(&self, name: &str, timeout: Duration) -> Result<ResultCode>;

    async fn alter_topic_config(
        &self,
        name: &str,
        changes: &BTreeMap<String, String>,
        timeout: Duration,
    ) -> Result<ResultCode>;

    async fn create_partitions(&self, name: &str, total: i32, timeout: Duration)
        -> Result<ResultCode>;
}

pub struct KafkaInfrastructure {
    cluster: Cluster,
    password: Option<String>,
}

impl KafkaInfrastructure {
    pub fn new(cluster: Cluster, password: Option<String>) -> Self {
        Self { cluster, password }
    }

    fn create_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new();
        config.set("bootstrap.servers", &self.cluster.brokers);
        config.set("client.id", "kafkust-state");

        match &self.cluster.security {
            SecurityConfig::Plaintext => {
                config.set("security.protocol", "plaintext");
            }
            SecurityConfig::Ssl {
                ca_location,
                certificate_location,
                key_location,
                key_password,
            } => {
                config.set("security.protocol", "ssl");
                if let Some(ca) = ca_location {
                    config.set("ssl.ca.location", ca);
                }
                if let Some(cert) = certificate_location {
                    config.set("ssl.certificate.location", cert);
                }
                if let Some(key) = key_location {
                    config.set("ssl.key.location", key);
                }
                if let Some(kp) = key_password {
                    config.set("ssl.key.password", kp);
                }
            }
            SecurityConfig::SaslSsl {
                mechanism,
                username,
                ca_location,
            } => {
                config.set("security.protocol", "sasl_ssl");
                config.set("sasl.mechanism", mechanism.as_str());
                config.set("sasl.username", username);
                if let Some(p) = &self.password {
                    config.set("sasl.password", p);
                }
                if let Some(ca) = ca_location {
                    config.set("ssl.ca.location", ca);
                }
            }
        }
        config
    }

    /// A fresh admin session; one is opened per request.
    fn admin_client(&self) -> Result<AdminClient<DefaultClientContext>> {
        self.create_config().create().map_err(|e| {
            Error::TransientConnection(format!(
                "Failed to create admin client for {}: {}",
                self.cluster.brokers, e
            ))
        })
    }

    fn options(timeout: Duration) -> AdminOptions {
        AdminOptions::new()
            .operation_timeout(Some(timeout))
            .request_timeout(Some(timeout))
    }

    fn transport(&self, operation: &str, e: rdkafka::error::KafkaError) -> Error {
        Error::TransientConnection(format!(
            "{} request to {} failed: {}",
            operation, self.cluster.brokers, e
        ))
    }
}

fn result_code<T, R>(results: Vec<std::result::Result<T, (R, RDKafkaErrorCode)>>) -> ResultCode {
    if results.is_empty() {
        return ResultCode::Error("NoResult".to_string());
    }
    results
        .into_iter()
        .find_map(|r| r.err())
        .map(|(_, code)| ResultCode::Error(format!("{:?}", code)))
        .unwrap_or(ResultCode::NoError)
}

#[async_trait]
impl AdminRpc for KafkaInfrastructure {
    async fn check_connection(&self, timeout: Duration) -> Result<()> {
        let client = self.admin_client()?;
        let brokers = self.cluster.brokers.clone();
        let metadata = tokio::task::spawn_blocking(move || {
            client.inner().fetch_metadata(None, timeout).map(|m| m.brokers().len())
        })
        .await
        .map_err(|e| Error::TransientConnection(e.to_string()))?
        .map_err(|e| {
            Error::TransientConnection(format!("Connection check failed for {}: {}", brokers, e))
        })?;
        debug!(brokers = metadata, "Bootstrap broker reachable");
        Ok(())
    }

    async fn create_topic(&self, spec: &TopicSpec, timeout: Duration) -> Result<ResultCode> {
        let client = self.admin_client()?;
        let mut new_topic = NewTopic::new(
            &spec.name,
            spec.partitions,
            TopicReplication::Fixed(spec.replication_factor),
        );
        for (key, value) in &spec.config {
            new_topic = new_topic.set(key, value);
        }
        let results = client
            .create_topics(&[new_topic], &Self::options(timeout))
            .await
            .map_err(|e| self.transport("create_topics", e))?;
        Ok(result_code(results))
    }

    async fn delete_topic(&self, name: &str, timeout: Duration) -> Result<ResultCode> {
        let client = self.admin_client()?;
        let results = client
            .delete_topics(&[name], &Self::options(timeout))
            .await
            .map_err(|e| self.transport("delete_topics", e))?;
        Ok(result_code(results))
    }

    async fn alter_topic_config(
        &self,
        name: &str,
        changes: &BTreeMap<String, String>,
        timeout: Duration,
    ) -> Result<ResultCode> {
        let client = self.admin_client()?;
        let mut alter = AlterConfig::new(ResourceSpecifier::Topic(name));
        for (key, value) in changes {
            alter = alter.set(key, value);
        }
        let results = client
            .alter_configs(&[alter], &Self::options(timeout))
            .await
            .map_err(|e| self.transport("alter_configs", e))?;
        Ok(result_code(results))
    }

    async fn create_partitions(
        &self,
        name: &str,
        total: i32,
        timeout: Duration,
    ) -> Result<ResultCode> {
        let client = self.admin_client()?;
        let partitions = NewPartitions::new(name, total.max(0) as usize);
        let results = client
            .create_partitions(&[partitions], &Self::options(timeout))
            .await
            .map_err(|e| self.transport("create_partitions", e))?;
        Ok(result_code(results))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_error_code_wins() {
        let ok: Vec<std::result::Result<String, (String, RDKafkaErrorCode)>> =
            vec![Ok("orders".into())];
        assert_eq!(result_code(ok), ResultCode::NoError);

        let failed: Vec<std::result::Result<String, (String, RDKafkaErrorCode)>> = vec![Err((
            "missing".into(),
            RDKafkaErrorCode::UnknownTopicOrPartition,
        ))];
        assert_eq!(
            result_code(failed),
            ResultCode::Error("UnknownTopicOrPartition".into())
        );

        let empty: Vec<std::result::Result<String, (String, RDKafkaErrorCode)>> = Vec::new();
        assert!(matches!(result_code(empty), ResultCode::Error(_)));
    }

    #[test]
    fn sasl_settings_carry_the_password() {
        use crate::domain::cluster::cluster::SaslMechanism;

        let cluster = Cluster {
            name: "prod".into(),
            brokers: "kafka-1:9093".into(),
            security: SecurityConfig::SaslSsl {
                mechanism: SaslMechanism::ScramSha512,
                username: "console".into(),
                ca_location: None,
            },
        };
        let config = KafkaInfrastructure::new(cluster, Some("secret".into())).create_config();
        assert_eq!(config.get("bootstrap.servers"), Some("kafka-1:9093"));
        assert_eq!(config.get("security.protocol"), Some("sasl_ssl"));
        assert_eq!(config.get("sasl.mechanism"), Some("SCRAM-SHA-512"));
        assert_eq!(config.get("sasl.password"), Some("secret"));
        assert_eq!(config.get("ssl.ca.location"), None);
    }

    #[test]
    fn plaintext_has_no_credentials() {
        let config = KafkaInfrastructure::new(Cluster::default(), None).create_config();
        assert_eq!(config.get("security.protocol"), Some("plaintext"));
        assert_eq!(config.get("sasl.password"), None);
    }
}
