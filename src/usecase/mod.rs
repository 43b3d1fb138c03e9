pub mod admin_gateway;
pub mod cluster_usecase;
pub mod metrics_poller;
pub mod permissions;
pub mod state_sync;
