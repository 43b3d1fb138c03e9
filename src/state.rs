//! The shared state holder.
//!
//! Built once at startup and handed to every component as an
//! `Arc<ClusterState>`. It owns the only mutation points of the core:
//!
//! - the current [`Snapshot`], replaced by atomic swap,
//! - the latest [`MetricsStore`] from the poller, replaced by atomic swap,
//! - the series buffers, written under a short lock by the poller only,
//! - the coordination store health signal.
//!
//! Readers load the snapshot once per request and keep that `Arc`; a
//! concurrent publish never changes what they see.

use crate::domain::metrics::MetricsStore;
use crate::domain::series::{Sample, Scope, SeriesStore};
use crate::domain::snapshot::Snapshot;
use arc_swap::ArcSwap;
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Health {
    Healthy,
    /// Serving the last good snapshot while the coordination store is unreachable.
    Degraded { reason: String },
}

impl Health {
    pub fn is_healthy(&self) -> bool {
        matches!(self, Health::Healthy)
    }
}

/// A series sample waiting to be recorded.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingSample {
    pub metric: &'static str,
    pub scope: Scope,
    pub value: f64,
}

pub struct ClusterState {
    snapshot: ArcSwap<Snapshot>,
    metrics: ArcSwap<MetricsStore>,
    series: RwLock<SeriesStore>,
    health: ArcSwap<Health>,
}

impl ClusterState {
    pub fn new(series_retention: usize) -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(Snapshot::empty()),
            metrics: ArcSwap::from_pointee(MetricsStore::default()),
            series: RwLock::new(SeriesStore::new(series_retention)),
            health: ArcSwap::from_pointee(Health::Healthy),
        }
    }

    pub fn current(&self) -> Arc<Snapshot> {
        self.snapshot.load_full()
    }

    pub fn latest_metrics(&self) -> Arc<MetricsStore> {
        self.metrics.load_full()
    }

    /// Publishes a freshly reconciled snapshot. The latest poller metrics
    /// are applied inside the swap so a concurrent metrics publish is never
    /// overwritten by older values.
    pub fn publish_snapshot(&self, candidate: Snapshot) {
        self.snapshot
            .rcu(|_| Arc::new(candidate.with_metrics(&self.metrics.load())));
    }

    /// Publishes one poller tick: metrics, series samples, and a new
    /// snapshot carrying the metrics.
    pub fn publish_metrics(&self, metrics: MetricsStore, samples: Vec<PendingSample>) {
        let tick = metrics.tick;
        let metrics = Arc::new(metrics);
        self.metrics.store(Arc::clone(&metrics));
        {
            let mut series = self.series.write();
            for sample in samples {
                series.record(sample.metric, sample.scope, tick, sample.value);
            }
        }
        self.snapshot
            .rcu(|current| Arc::new(current.with_metrics(&metrics)));
    }

    /// Drops every series whose scope fails `keep`.
    pub fn retain_series<F>(&self, keep: F)
    where
        F: FnMut(&Scope) -> bool,
    {
        self.series.write().retain_scopes(keep);
    }

    pub fn series(&self, metric: &str, scope: &Scope) -> Vec<Sample> {
        self.series.read().series(metric, scope)
    }

    pub fn sum_series(&self, metric: &str) -> Vec<Sample> {
        self.series.read().sum_series(metric)
    }

    pub fn series_scopes(&self, metric: &str) -> Vec<Scope> {
        self.series.read().scopes(metric)
    }

    pub fn health(&self) -> Health {
        Health::clone(&self.health.load())
    }

    pub fn set_health(&self, health: Health) {
        if *self.health.load_full() != health {
            tracing::info!(health = ?health, "Coordination store health changed");
        }
        self.health.store(Arc::new(health));
    }
}
