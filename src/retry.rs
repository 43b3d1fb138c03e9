//! Backoff policies for reconnecting to external systems.

use backon::ExponentialBuilder;
use std::time::Duration;

/// Policy for re-establishing the coordination store session.
///
/// 50ms doubling up to 5s, 10 attempts, with jitter. Once exhausted the
/// synchronizer reports degraded health and waits for its next trigger
/// instead of retrying in a tight loop.
pub fn coordination_policy() -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(50))
        .with_max_delay(Duration::from_secs(5))
        .with_max_times(10)
        .with_jitter()
}

/// Short policy for tests and local tooling.
pub fn fast_policy() -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(5))
        .with_max_delay(Duration::from_millis(100))
        .with_max_times(3)
}
