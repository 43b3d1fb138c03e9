pub mod acl;
pub mod broker;
pub mod cluster;
pub mod consumer_group;
pub mod metrics;
pub mod series;
pub mod snapshot;
pub mod topic;
