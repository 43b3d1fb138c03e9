use crate::domain::broker::BrokerId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};

pub const BYTES_IN: &str = "bytes_in";
pub const BYTES_OUT: &str = "bytes_out";
pub const MESSAGES_IN: &str = "messages_in";
pub const ISR_SHRINK: &str = "isr_shrink";
pub const ISR_EXPAND: &str = "isr_expand";
pub const MESSAGE_COUNT: &str = "message_count";
pub const TOPIC_SIZE: &str = "topic_size";

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct Sample {
    pub tick: u64,
    pub value: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Scope {
    Cluster,
    Broker(BrokerId),
    Topic(String),
}

/// Fixed-capacity ring of samples with strictly increasing ticks.
#[derive(Debug, Clone)]
pub struct TimeSeries {
    capacity: usize,
    samples: VecDeque<Sample>,
}

impl TimeSeries {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            samples: VecDeque::with_capacity(capacity),
        }
    }

    /// Appends a sample, evicting the oldest when full. Returns false if
    /// `tick` is not newer than the last sample.
    pub fn push(&mut self, tick: u64, value: f64) -> bool {
        if matches!(self.samples.back(), Some(last) if last.tick >= tick) {
            return false;
        }
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(Sample { tick, value });
        true
    }

    /// Oldest to newest.
    pub fn samples(&self) -> Vec<Sample> {
        self.samples.iter().copied().collect()
    }

    pub fn latest(&self) -> Option<Sample> {
        self.samples.back().copied()
    }

    pub fn value_at(&self, tick: u64) -> Option<f64> {
        self.samples
            .binary_search_by_key(&tick, |s| s.tick)
            .ok()
            .map(|i| self.samples[i].value)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// All series, keyed by metric and scope.
#[derive(Debug, Clone)]
pub struct SeriesStore {
    retention: usize,
    series: HashMap<(String, Scope), TimeSeries>,
}

impl SeriesStore {
    pub fn new(retention: usize) -> Self {
        Self {
            retention,
            series: HashMap::new(),
        }
    }

    pub fn record(&mut self, metric: &str, scope: Scope, tick: u64, value: f64) -> bool {
        let retention = self.retention;
        self.series
            .entry((metric.to_string(), scope))
            .or_insert_with(|| TimeSeries::with_capacity(retention))
            .push(tick, value)
    }

    /// Removes all series of scopes for which `keep` returns false.
    pub fn retain_scopes<F>(&mut self, mut keep: F)
    where
        F: FnMut(&Scope) -> bool,
    {
        self.series.retain(|(_, scope), _| keep(scope));
    }

    pub fn series(&self, metric: &str, scope: &Scope) -> Vec<Sample> {
        self.series
            .get(&(metric.to_string(), scope.clone()))
            .map(TimeSeries::samples)
            .unwrap_or_default()
    }

    /// Pointwise sum over every broker's series for `metric`. A broker with
    /// no sample at a tick is left out of that tick's sum.
    pub fn sum_series(&self, metric: &str) -> Vec<Sample> {
        let mut sums: BTreeMap<u64, f64> = BTreeMap::new();
        for ((name, scope), series) in &self.series {
            if name != metric || !matches!(scope, Scope::Broker(_)) {
                continue;
            }
            for sample in &series.samples {
                *sums.entry(sample.tick).or_insert(0.0) += sample.value;
            }
        }
        let skip = sums.len().saturating_sub(self.retention);
        sums.into_iter()
            .skip(skip)
            .map(|(tick, value)| Sample { tick, value })
            .collect()
    }

    pub fn scopes(&self, metric: &str) -> Vec<Scope> {
        let mut scopes: Vec<Scope> = self
            .series
            .keys()
            .filter(|(name, _)| name == metric)
            .map(|(_, scope)| scope.clone())
            .collect();
        scopes.sort();
        scopes
    }

    pub fn retention(&self) -> usize {
        self.retention
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_most_recent_samples_oldest_first() {
        let mut series = TimeSeries::with_capacity(3);
        for tick in 0..5 {
            assert!(series.push(tick, tick as f64 * 10.0));
        }
        let ticks: Vec<u64> = series.samples().iter().map(|s| s.tick).collect();
        assert_eq!(ticks, vec![2, 3, 4]);
        assert_eq!(series.latest().map(|s| s.value), Some(40.0));
        assert_eq!(series.len(), 3);
    }

    #[test]
    fn rejects_ticks_that_do_not_advance() {
        let mut series = TimeSeries::with_capacity(4);
        assert!(series.push(5, 1.0));
        assert!(!series.push(5, 2.0));
        assert!(!series.push(3, 2.0));
        assert_eq!(series.samples(), vec![Sample { tick: 5, value: 1.0 }]);
    }

    #[test]
    fn value_at_finds_sample_by_tick() {
        let mut series = TimeSeries::with_capacity(4);
        series.push(1, 1.0);
        series.push(4, 4.0);
        assert_eq!(series.value_at(4), Some(4.0));
        assert_eq!(series.value_at(2), None);
    }

    #[test]
    fn sum_excludes_brokers_without_sample() {
        let mut store = SeriesStore::new(10);
        store.record(BYTES_IN, Scope::Broker(1), 4, 10.0);
        store.record(BYTES_IN, Scope::Broker(2), 4, 20.0);
        store.record(BYTES_IN, Scope::Broker(3), 4, 30.0);
        store.record(BYTES_IN, Scope::Broker(1), 5, 100.0);
        store.record(BYTES_IN, Scope::Broker(3), 5, 200.0);
        store.record(BYTES_IN, Scope::Cluster, 5, 9999.0);
        store.record(BYTES_OUT, Scope::Broker(2), 5, 7.0);

        let sum = store.sum_series(BYTES_IN);
        assert_eq!(
            sum,
            vec![Sample { tick: 4, value: 60.0 }, Sample { tick: 5, value: 300.0 }]
        );
    }

    #[test]
    fn sum_is_bounded_by_retention() {
        let mut store = SeriesStore::new(2);
        store.record(BYTES_IN, Scope::Broker(1), 1, 1.0);
        store.record(BYTES_IN, Scope::Broker(1), 2, 1.0);
        store.record(BYTES_IN, Scope::Broker(2), 3, 1.0);
        let ticks: Vec<u64> = store.sum_series(BYTES_IN).iter().map(|s| s.tick).collect();
        assert_eq!(ticks, vec![2, 3]);
    }

    #[test]
    fn retain_scopes_drops_every_metric_of_a_scope() {
        let mut store = SeriesStore::new(3);
        store.record(BYTES_IN, Scope::Broker(1), 1, 1.0);
        store.record(BYTES_IN, Scope::Broker(2), 1, 2.0);
        store.record(MESSAGE_COUNT, Scope::Topic("gone".into()), 1, 5.0);
        store.record(TOPIC_SIZE, Scope::Topic("gone".into()), 1, 9.0);
        store.record(MESSAGE_COUNT, Scope::Topic("kept".into()), 1, 3.0);
        store.record(MESSAGE_COUNT, Scope::Cluster, 1, 8.0);

        store.retain_scopes(|scope| {
            !matches!(scope, Scope::Broker(2)) && *scope != Scope::Topic("gone".into())
        });

        assert_eq!(store.scopes(BYTES_IN), vec![Scope::Broker(1)]);
        assert_eq!(
            store.scopes(MESSAGE_COUNT),
            vec![Scope::Cluster, Scope::Topic("kept".into())]
        );
        assert!(store.scopes(TOPIC_SIZE).is_empty());
    }

    #[test]
    fn missing_series_reads_empty() {
        let store = SeriesStore::new(2);
        assert!(store.series(BYTES_IN, &Scope::Topic("t".into())).is_empty());
        assert!(store.sum_series(BYTES_IN).is_empty());
    }
}
