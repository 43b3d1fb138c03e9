use serde::{Deserialize, Serialize};

pub const WILDCARD: &str = "*";

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceType {
    Topic,
    Group,
}

impl ResourceType {
    /// Path segment used by Kafka under `/kafka-acl`.
    pub fn segment(&self) -> &'static str {
        match self {
            ResourceType::Topic => "Topic",
            ResourceType::Group => "Group",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum PatternType {
    Literal,
    Prefixed,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Read,
    Write,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Allow,
    Deny,
}

/// How closely an entry's pattern matched a resource name. Later variants
/// win over earlier ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Specificity {
    Wildcard,
    Prefix(usize),
    Literal,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct AclEntry {
    pub principal: String,
    pub resource_type: ResourceType,
    pub pattern_type: PatternType,
    pub resource_name: String,
    pub operation: Operation,
    pub permission: Permission,
}

impl AclEntry {
    pub fn applies_to(&self, principal: &str) -> bool {
        self.principal == principal || self.principal == WILDCARD
    }

    pub fn matches(&self, resource: &str) -> Option<Specificity> {
        match self.pattern_type {
            PatternType::Literal if self.resource_name == WILDCARD => Some(Specificity::Wildcard),
            PatternType::Literal if self.resource_name == resource => Some(Specificity::Literal),
            PatternType::Prefixed if resource.starts_with(&self.resource_name) => {
                Some(Specificity::Prefix(self.resource_name.len()))
            }
            _ => None,
        }
    }
}

#[derive(Deserialize)]
struct AclDocument {
    acls: Vec<RawAcl>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAcl {
    principal: String,
    permission_type: String,
    operation: String,
}

/// Decodes one `/kafka-acl` node. Operations other than read, write and
/// all are not evaluated by the console and are dropped.
pub fn decode_acls(
    doc: &[u8],
    resource_type: ResourceType,
    pattern_type: PatternType,
    resource_name: &str,
) -> Result<Vec<AclEntry>, serde_json::Error> {
    let doc: AclDocument = serde_json::from_slice(doc)?;
    let mut entries = Vec::new();
    for raw in doc.acls {
        let permission = match raw.permission_type.as_str() {
            "Allow" => Permission::Allow,
            "Deny" => Permission::Deny,
            _ => continue,
        };
        let operations: &[Operation] = match raw.operation.as_str() {
            "Read" => &[Operation::Read],
            "Write" => &[Operation::Write],
            "All" => &[Operation::Read, Operation::Write],
            _ => continue,
        };
        let principal = raw
            .principal
            .strip_prefix("User:")
            .unwrap_or(&raw.principal)
            .to_string();
        for &operation in operations {
            entries.push(AclEntry {
                principal: principal.clone(),
                resource_type,
                pattern_type,
                resource_name: resource_name.to_string(),
                operation,
                permission,
            });
        }
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_kafka_acl_node() {
        let doc = br#"{"version":1,"acls":[
            {"principal":"User:alice","permissionType":"Allow","operation":"All","host":"*"},
            {"principal":"User:bob","permissionType":"Deny","operation":"Write","host":"*"},
            {"principal":"User:carol","permissionType":"Allow","operation":"Describe","host":"*"}]}"#;
        let entries = decode_acls(doc, ResourceType::Topic, PatternType::Literal, "orders").unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].principal, "alice");
        assert_eq!(entries[0].operation, Operation::Read);
        assert_eq!(entries[1].operation, Operation::Write);
        assert_eq!(entries[2].principal, "bob");
        assert_eq!(entries[2].permission, Permission::Deny);
    }

    #[test]
    fn specificity_orders_literal_over_prefix_over_wildcard() {
        assert!(Specificity::Literal > Specificity::Prefix(100));
        assert!(Specificity::Prefix(5) > Specificity::Prefix(2));
        assert!(Specificity::Prefix(0) > Specificity::Wildcard);
    }

    #[test]
    fn pattern_matching() {
        let entry = |pattern_type, name: &str| AclEntry {
            principal: "alice".into(),
            resource_type: ResourceType::Topic,
            pattern_type,
            resource_name: name.into(),
            operation: Operation::Read,
            permission: Permission::Allow,
        };
        assert_eq!(entry(PatternType::Literal, "orders").matches("orders"), Some(Specificity::Literal));
        assert_eq!(entry(PatternType::Literal, "orders").matches("orders2"), None);
        assert_eq!(entry(PatternType::Prefixed, "ord").matches("orders2"), Some(Specificity::Prefix(3)));
        assert_eq!(entry(PatternType::Literal, "*").matches("anything"), Some(Specificity::Wildcard));
    }
}
