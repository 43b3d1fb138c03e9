use crate::domain::topic::TopicSpec;
use crate::infrastructure::kafka::{AdminRpc, ResultCode};
use crate::usecase::permissions::Permissions;
use crate::{Error, Result};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

/// Extra time given to the RPC beyond its own timeout before the gateway
/// gives up on it.
const DEADLINE_SLACK: Duration = Duration::from_secs(5);

/// Cluster mutations. Each call is a single attempt against a single
/// resource; nothing is retried here since none of these are idempotent.
pub struct AdminGateway {
    rpc: Arc<dyn AdminRpc>,
    timeout: Duration,
}

impl AdminGateway {
    pub fn new(rpc: Arc<dyn AdminRpc>, timeout: Duration) -> Self {
        Self { rpc, timeout }
    }

    pub async fn create_topic(&self, perms: &dyn Permissions, spec: TopicSpec) -> Result<()> {
        let payload = json!({
            "partitions": spec.partitions,
            "replication_factor": spec.replication_factor,
            "config": spec.config,
        });
        self.execute(
            "create_topic",
            &spec.name,
            payload,
            perms,
            self.rpc.create_topic(&spec, self.timeout),
        )
        .await
    }

    pub async fn delete_topic(&self, perms: &dyn Permissions, name: &str) -> Result<()> {
        self.execute(
            "delete_topic",
            name,
            Value::Null,
            perms,
            self.rpc.delete_topic(name, self.timeout),
        )
        .await
    }

    /// Sets each key to the given value; keys not mentioned are left alone.
    pub async fn alter_topic_config(
        &self,
        perms: &dyn Permissions,
        name: &str,
        changes: BTreeMap<String, String>,
    ) -> Result<()> {
        let payload = json!({ "config": changes });
        self.execute(
            "alter_topic_config",
            name,
            payload,
            perms,
            self.rpc.alter_topic_config(name, &changes, self.timeout),
        )
        .await
    }

    pub async fn add_partitions(
        &self,
        perms: &dyn Permissions,
        name: &str,
        increase_to: i32,
    ) -> Result<()> {
        self.execute(
            "add_partitions",
            name,
            json!({ "increase_to": increase_to }),
            perms,
            self.rpc.create_partitions(name, increase_to, self.timeout),
        )
        .await
    }

    async fn execute<F>(
        &self,
        operation: &'static str,
        resource: &str,
        payload: Value,
        perms: &dyn Permissions,
        call: F,
    ) -> Result<()>
    where
        F: Future<Output = Result<ResultCode>>,
    {
        let request_id = Uuid::new_v4();
        let principal = perms.principal().unwrap_or("anonymous").to_string();

        let outcome = if !perms.topic_write(resource) {
            Err(Error::PermissionDenied {
                principal: principal.clone(),
                action: operation,
                resource: resource.to_string(),
            })
        } else {
            match tokio::time::timeout(self.timeout + DEADLINE_SLACK, call).await {
                Err(_) => Err(Error::TransientConnection(format!(
                    "{} on '{}' timed out after {:?}",
                    operation, resource, self.timeout
                ))),
                Ok(Err(e)) => Err(e),
                Ok(Ok(ResultCode::NoError)) => Ok(()),
                Ok(Ok(ResultCode::Error(code))) => Err(Error::AdminOperationFailed {
                    operation,
                    resource: resource.to_string(),
                    code,
                }),
            }
        };

        match &outcome {
            Ok(()) => info!(
                target: "audit",
                %request_id,
                operation,
                resource,
                principal = %principal,
                payload = %payload,
                "Admin operation succeeded"
            ),
            Err(e) => warn!(
                target: "audit",
                %request_id,
                operation,
                resource,
                principal = %principal,
                payload = %payload,
                error = %e,
                "Admin operation failed"
            ),
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingRpc {
        calls: Mutex<Vec<String>>,
        code: Mutex<Option<String>>,
    }

    impl RecordingRpc {
        fn answer(&self, call: String) -> Result<ResultCode> {
            self.calls.lock().push(call);
            Ok(match self.code.lock().clone() {
                Some(code) => ResultCode::Error(code),
                None => ResultCode::NoError,
            })
        }
    }

    #[async_trait]
    impl AdminRpc for RecordingRpc {
        async fn check_connection(&self, _timeout: Duration) -> Result<()> {
            Ok(())
        }

        async fn create_topic(&self, spec: &TopicSpec, _timeout: Duration) -> Result<ResultCode> {
            self.answer(format!("create {}", spec.name))
        }

        async fn delete_topic(&self, name: &str, _timeout: Duration) -> Result<ResultCode> {
            self.answer(format!("delete {}", name))
        }

        async fn alter_topic_config(
            &self,
            name: &str,
            changes: &BTreeMap<String, String>,
            _timeout: Duration,
        ) -> Result<ResultCode> {
            self.answer(format!("alter {} {:?}", name, changes))
        }

        async fn create_partitions(
            &self,
            name: &str,
            total: i32,
            _timeout: Duration,
        ) -> Result<ResultCode> {
            self.answer(format!("partitions {} {}", name, total))
        }
    }

    struct Fixed {
        write: bool,
    }

    impl Permissions for Fixed {
        fn principal(&self) -> Option<&str> {
            Some("tester")
        }
        fn topic_read(&self, _topic: &str) -> bool {
            true
        }
        fn topic_write(&self, _topic: &str) -> bool {
            self.write
        }
        fn group_read(&self, _group: &str) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn denied_calls_never_reach_the_cluster() {
        let rpc = Arc::new(RecordingRpc::default());
        let gateway = AdminGateway::new(rpc.clone(), Duration::from_secs(1));

        let err = gateway
            .delete_topic(&Fixed { write: false }, "orders")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PermissionDenied { action: "delete_topic", .. }));
        assert!(rpc.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn each_operation_issues_exactly_one_request() {
        let rpc = Arc::new(RecordingRpc::default());
        let gateway = AdminGateway::new(rpc.clone(), Duration::from_secs(1));
        let perms = Fixed { write: true };

        gateway
            .alter_topic_config(
                &perms,
                "orders",
                BTreeMap::from([("retention.ms".to_string(), "1000".to_string())]),
            )
            .await
            .unwrap();
        gateway.add_partitions(&perms, "orders", 6).await.unwrap();

        assert_eq!(
            *rpc.calls.lock(),
            vec![
                "alter orders {\"retention.ms\": \"1000\"}".to_string(),
                "partitions orders 6".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn error_codes_become_structured_failures() {
        let rpc = Arc::new(RecordingRpc::default());
        *rpc.code.lock() = Some("InvalidPartitions".to_string());
        let gateway = AdminGateway::new(rpc.clone(), Duration::from_secs(1));

        let err = gateway
            .add_partitions(&Fixed { write: true }, "orders", 1)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            Error::AdminOperationFailed {
                operation: "add_partitions",
                resource: "orders".into(),
                code: "InvalidPartitions".into(),
            }
        );
        assert_eq!(rpc.calls.lock().len(), 1);
    }
}
