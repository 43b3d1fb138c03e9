pub mod background;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod retry;
pub mod state;
pub mod telemetry;
pub mod usecase;

use crate::background::BackgroundTasks;
use crate::config::Config;
use crate::domain::cluster::cluster::SecurityConfig;
use crate::infrastructure::coordination::CoordinationStore;
use crate::infrastructure::counters::BrokerCounters;
use crate::infrastructure::kafka::{AdminRpc, KafkaInfrastructure};
use crate::infrastructure::persistence::keyring_secret_repository::KeyringSecretRepository;
use crate::state::{ClusterState, Health};
use crate::usecase::admin_gateway::AdminGateway;
use crate::usecase::cluster_usecase::ClusterUsecase;
use crate::usecase::metrics_poller::MetricsPoller;
use crate::usecase::permissions::{Grant, PermissionEvaluator};
use crate::usecase::state_sync::StateSynchronizer;
use backon::ExponentialBuilder;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

pub use crate::infrastructure::coordination::memory::MemoryStore;
pub use crate::infrastructure::counters::MemoryCounters;

/// Keyring service the SASL password is stored under.
pub const KEYRING_SERVICE: &str = "kafkust";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("{kind} '{key}' not found")]
    NotFound { kind: &'static str, key: String },
    #[error("Connection error: {0}")]
    TransientConnection(String),
    #[error("{operation} on '{resource}' failed: {code}")]
    AdminOperationFailed {
        operation: &'static str,
        resource: String,
        code: String,
    },
    #[error("Malformed data at {path}: {reason}")]
    MalformedData { path: String, reason: String },
    #[error("{principal} is not allowed to {action} '{resource}'")]
    PermissionDenied {
        principal: String,
        action: &'static str,
        resource: String,
    },
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Whether retrying the same call later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::TransientConnection(_))
    }
}

impl serde::Serialize for Error {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        serializer.serialize_str(self.to_string().as_ref())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// The running state store: both refresh loops plus the read, permission
/// and admin entry points the HTTP layer calls.
pub struct Console {
    clusters: ClusterUsecase,
    admin: AdminGateway,
    permissions: PermissionEvaluator,
    state: Arc<ClusterState>,
    tasks: BackgroundTasks,
    shutdown_grace: Duration,
}

impl Console {
    pub async fn start(
        config: &Config,
        store: Arc<dyn CoordinationStore>,
        counters: Arc<dyn BrokerCounters>,
        admin: Arc<dyn AdminRpc>,
    ) -> Result<Self> {
        Self::start_with_backoff(config, store, counters, admin, retry::coordination_policy()).await
    }

    /// Connects, publishes the first snapshot, checks the bootstrap broker,
    /// then spawns the synchronizer and poller loops. A failure in any of
    /// the first three steps is returned and nothing is left running.
    pub async fn start_with_backoff(
        config: &Config,
        store: Arc<dyn CoordinationStore>,
        counters: Arc<dyn BrokerCounters>,
        admin: Arc<dyn AdminRpc>,
        backoff: ExponentialBuilder,
    ) -> Result<Self> {
        config.validate()?;
        let state = Arc::new(ClusterState::new(config.series_retention));

        let synchronizer = StateSynchronizer::new(store, state.clone(), config.sweep_interval())
            .with_backoff(backoff);
        let watches = synchronizer.subscribe().await;
        synchronizer.sync_with_backoff().await?;
        admin.check_connection(config.admin_timeout()).await?;

        let poller = MetricsPoller::new(counters, state.clone(), config.poll_interval());
        let mut tasks = BackgroundTasks::new();
        let signal = tasks.signal();
        tasks.spawn("state_sync", synchronizer.run(watches, signal));
        let signal = tasks.signal();
        tasks.spawn("metrics_poller", poller.run(signal));

        let snapshot = state.current();
        info!(
            brokers = snapshot.brokers.len(),
            topics = snapshot.topics.len(),
            auth = ?config.authentication,
            coordination = ?config.coordination_hosts(),
            "Cluster state store started"
        );

        Ok(Self {
            clusters: ClusterUsecase::new(state.clone()),
            admin: AdminGateway::new(admin, config.admin_timeout()),
            permissions: PermissionEvaluator::new(config.authentication, state.clone()),
            state,
            tasks,
            shutdown_grace: config.shutdown_grace(),
        })
    }

    pub fn clusters(&self) -> &ClusterUsecase {
        &self.clusters
    }

    pub fn admin(&self) -> &AdminGateway {
        &self.admin
    }

    pub fn permissions_for(&self, principal: Option<&str>) -> Grant {
        self.permissions.for_principal(principal)
    }

    pub fn state(&self) -> &Arc<ClusterState> {
        &self.state
    }

    pub fn health(&self) -> Health {
        self.state.health()
    }

    pub fn running_tasks(&self) -> Vec<&'static str> {
        self.tasks.running()
    }

    pub async fn shutdown(mut self) {
        self.tasks.shutdown(self.shutdown_grace).await;
        info!("Cluster state store stopped");
    }
}

/// Admin client for the configured bootstrap cluster. A SASL password not
/// given in the environment is looked up in the OS keyring.
pub fn kafka_admin(config: &Config) -> KafkaInfrastructure {
    let password = config.sasl_password.clone().or_else(|| {
        if !matches!(config.kafka.security, SecurityConfig::SaslSsl { .. }) {
            return None;
        }
        match KeyringSecretRepository::new(KEYRING_SERVICE).sasl_password(&config.kafka.name) {
            Ok(Some(password)) => Some(password),
            Ok(None) => {
                warn!(cluster = %config.kafka.name, "No SASL password stored in keyring");
                None
            }
            Err(e) => {
                warn!(cluster = %config.kafka.name, error = %format!("{:#}", e), "Keyring lookup failed");
                None
            }
        }
    });
    KafkaInfrastructure::new(config.kafka.clone(), password)
}
