use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

/// Observations kept per histogram; older ones are discarded.
const HISTOGRAM_WINDOW: usize = 1024;

/// Monotonically increasing counter.
#[derive(Default)]
struct Counter(AtomicU64);

impl Counter {
    fn add(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }
    fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Gauge stored as raw f64 bits so it can be updated without a lock.
#[derive(Default)]
struct Gauge(AtomicU64);

impl Gauge {
    fn set(&self, v: f64) {
        self.0.store(v.to_bits(), Ordering::Relaxed);
    }
    fn add(&self, delta: f64) {
        let _ = self
            .0
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |bits| {
                Some((f64::from_bits(bits) + delta).to_bits())
            });
    }
    fn get(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Relaxed))
    }
}

/// Sliding window of recent observations plus lifetime count and sum.
#[derive(Default)]
struct Histogram {
    inner: Mutex<HistogramState>,
}

#[derive(Default)]
struct HistogramState {
    window: VecDeque<f64>,
    count: u64,
    sum: f64,
}

impl Histogram {
    fn observe(&self, value: f64) {
        let mut state = self.inner.lock();
        if state.window.len() == HISTOGRAM_WINDOW {
            state.window.pop_front();
        }
        state.window.push_back(value);
        state.count += 1;
        state.sum += value;
    }

    fn summary(&self) -> HistogramSummary {
        let state = self.inner.lock();
        if state.window.is_empty() {
            return HistogramSummary::default();
        }
        let (count, sum) = (state.count, state.sum);
        let mut sorted: Vec<f64> = state.window.iter().copied().collect();
        drop(state);
        sorted.sort_by(|a, b| a.total_cmp(b));
        let pick = |q: f64| {
            let idx = ((sorted.len() as f64 * q) as usize).min(sorted.len() - 1);
            sorted[idx]
        };
        HistogramSummary {
            count,
            sum,
            p50: pick(0.50),
            p95: pick(0.95),
            p99: pick(0.99),
        }
    }
}

/// Summary statistics from a histogram. Percentiles cover the recent window.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct HistogramSummary {
    pub count: u64,
    pub sum: f64,
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
}

/// Metric key: name + labels sorted by label name.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
struct MetricKey {
    name: String,
    labels: Vec<(String, String)>,
}

impl MetricKey {
    fn new(name: &str, labels: &[(&str, &str)]) -> Self {
        let mut sorted: Vec<(String, String)> = labels
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        sorted.sort();
        Self {
            name: name.to_string(),
            labels: sorted,
        }
    }

    fn sample<V>(&self, value: V) -> MetricSample<V> {
        MetricSample {
            name: self.name.clone(),
            labels: self.labels.iter().cloned().collect(),
            value,
        }
    }
}

/// One metric series in a [`MetricsSnapshot`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MetricSample<V> {
    pub name: String,
    #[serde(skip_serializing_if = "HashMap::is_empty", default)]
    pub labels: HashMap<String, String>,
    pub value: V,
}

/// Point-in-time copy of every series, sorted by name.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub taken_at: String,
    pub counters: Vec<MetricSample<u64>>,
    pub gauges: Vec<MetricSample<f64>>,
    pub histograms: Vec<MetricSample<HistogramSummary>>,
}

/// Look up `key`, inserting a default entry on first use. Takes the write
/// lock only on the miss path.
fn with_entry<K, T, R>(map: &RwLock<HashMap<K, T>>, key: K, f: impl Fn(&T) -> R) -> R
where
    K: Hash + Eq,
    T: Default,
{
    if let Some(entry) = map.read().get(&key) {
        return f(entry);
    }
    let mut map = map.write();
    f(map.entry(key).or_default())
}

/// Thread-safe in-process metrics recorder.
#[derive(Default)]
pub struct MetricsRecorder {
    counters: RwLock<HashMap<MetricKey, Counter>>,
    gauges: RwLock<HashMap<MetricKey, Gauge>>,
    histograms: RwLock<HashMap<MetricKey, Histogram>>,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counter_inc(&self, name: &str, labels: &[(&str, &str)], n: u64) {
        with_entry(&self.counters, MetricKey::new(name, labels), |c| c.add(n));
    }

    pub fn gauge_set(&self, name: &str, labels: &[(&str, &str)], value: f64) {
        with_entry(&self.gauges, MetricKey::new(name, labels), |g| g.set(value));
    }

    /// Increment (or, with a negative delta, decrement) a gauge.
    pub fn gauge_inc(&self, name: &str, labels: &[(&str, &str)], delta: f64) {
        with_entry(&self.gauges, MetricKey::new(name, labels), |g| g.add(delta));
    }

    pub fn histogram_observe(&self, name: &str, labels: &[(&str, &str)], value: f64) {
        with_entry(&self.histograms, MetricKey::new(name, labels), |h| h.observe(value));
    }

    pub fn counter_get(&self, name: &str, labels: &[(&str, &str)]) -> u64 {
        let key = MetricKey::new(name, labels);
        self.counters.read().get(&key).map_or(0, Counter::get)
    }

    pub fn gauge_get(&self, name: &str, labels: &[(&str, &str)]) -> f64 {
        let key = MetricKey::new(name, labels);
        self.gauges.read().get(&key).map_or(0.0, Gauge::get)
    }

    pub fn histogram_summary(&self, name: &str, labels: &[(&str, &str)]) -> HistogramSummary {
        let key = MetricKey::new(name, labels);
        self.histograms
            .read()
            .get(&key)
            .map(Histogram::summary)
            .unwrap_or_default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let mut counters: Vec<_> = self
            .counters
            .read()
            .iter()
            .map(|(k, c)| k.sample(c.get()))
            .collect();
        let mut gauges: Vec<_> = self
            .gauges
            .read()
            .iter()
            .map(|(k, g)| k.sample(g.get()))
            .collect();
        let mut histograms: Vec<_> = self
            .histograms
            .read()
            .iter()
            .map(|(k, h)| k.sample(h.summary()))
            .collect();
        counters.sort_by(|a, b| a.name.cmp(&b.name));
        gauges.sort_by(|a, b| a.name.cmp(&b.name));
        histograms.sort_by(|a, b| a.name.cmp(&b.name));

        MetricsSnapshot {
            taken_at: Utc::now().to_rfc3339(),
            counters,
            gauges,
            histograms,
        }
    }
}
