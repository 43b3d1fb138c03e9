use crate::config::AuthMode;
use crate::domain::acl::{AclEntry, Operation, Permission, ResourceType, Specificity};
use crate::domain::snapshot::Snapshot;
use crate::state::ClusterState;
use std::sync::Arc;

/// What a caller may do. Handed to the read facade and the admin gateway
/// so neither needs to know how the decision was made.
pub trait Permissions: Send + Sync {
    fn principal(&self) -> Option<&str>;
    fn topic_read(&self, topic: &str) -> bool;
    fn topic_write(&self, topic: &str) -> bool;
    fn group_read(&self, group: &str) -> bool;
}

pub struct PermissionEvaluator {
    mode: AuthMode,
    state: Arc<ClusterState>,
}

impl PermissionEvaluator {
    pub fn new(mode: AuthMode, state: Arc<ClusterState>) -> Self {
        Self { mode, state }
    }

    pub fn mode(&self) -> AuthMode {
        self.mode
    }

    /// Capabilities of `principal` against the current snapshot's ACLs.
    /// The grant pins that snapshot for its lifetime.
    pub fn for_principal(&self, principal: Option<&str>) -> Grant {
        Grant {
            mode: self.mode,
            principal: principal.map(str::to_string),
            snapshot: self.state.current(),
        }
    }
}

pub struct Grant {
    mode: AuthMode,
    principal: Option<String>,
    snapshot: Arc<Snapshot>,
}

impl Grant {
    fn decide(&self, resource_type: ResourceType, name: &str, operation: Operation) -> bool {
        match self.mode {
            AuthMode::NoneWithWrite => true,
            AuthMode::None => operation == Operation::Read,
            AuthMode::CredentialBased => match &self.principal {
                Some(principal) => {
                    evaluate(&self.snapshot.acls, principal, resource_type, name, operation)
                }
                None => false,
            },
        }
    }
}

impl Permissions for Grant {
    fn principal(&self) -> Option<&str> {
        self.principal.as_deref()
    }

    fn topic_read(&self, topic: &str) -> bool {
        self.decide(ResourceType::Topic, topic, Operation::Read)
    }

    fn topic_write(&self, topic: &str) -> bool {
        self.decide(ResourceType::Topic, topic, Operation::Write)
    }

    fn group_read(&self, group: &str) -> bool {
        self.decide(ResourceType::Group, group, Operation::Read)
    }
}

/// ACL decision for one request. The most specific matching entry decides
/// (literal, then longest prefix, then wildcard); on a tie deny wins; with
/// no match the request is denied.
pub fn evaluate(
    acls: &[AclEntry],
    principal: &str,
    resource_type: ResourceType,
    name: &str,
    operation: Operation,
) -> bool {
    let mut best: Option<(Specificity, Permission)> = None;
    let candidates = acls.iter().filter(|e| {
        e.resource_type == resource_type && e.operation == operation && e.applies_to(principal)
    });
    for entry in candidates {
        let Some(specificity) = entry.matches(name) else {
            continue;
        };
        best = match best {
            Some((current, _)) if current > specificity => best,
            Some((current, Permission::Deny)) if current == specificity => best,
            _ => Some((specificity, entry.permission)),
        };
    }
    matches!(best, Some((_, Permission::Allow)))
}
