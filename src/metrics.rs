//! Request counters and rolling latency for the pipeline.

use serde::Serialize;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::result::serialize_secs;

/// Weight given to the newest sample in the rolling latency average.
pub const LATENCY_SMOOTHING: f64 = 0.1;

/// Raw counters. All counts only grow; `average_latency` is recomputed.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Metrics {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    /// Rejected by admission control. Not counted as failures.
    pub rate_limited_requests: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    #[serde(serialize_with = "serialize_secs")]
    pub average_latency: Duration,
}

/// Point-in-time view of pipeline health.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StatsSnapshot {
    /// No request has reached the pipeline yet.
    NoData,
    Active(PipelineStats),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PipelineStats {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub rate_limited_requests: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    /// Percent of total requests.
    pub success_rate: f64,
    /// Percent of total requests.
    pub failure_rate: f64,
    /// Percent of cache lookups; 0 when nothing was looked up.
    pub cache_hit_rate: f64,
    #[serde(serialize_with = "serialize_secs")]
    pub average_latency: Duration,
    pub cache_size: usize,
    pub active_clients: usize,
}

pub struct MetricsAggregator {
    inner: Mutex<Metrics>,
}

impl MetricsAggregator {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Metrics::default()),
        }
    }

    pub fn record_request(&self) {
        self.lock().total_requests += 1;
    }

    pub fn record_rate_limited(&self) {
        self.lock().rate_limited_requests += 1;
    }

    pub fn record_cache_hit(&self) {
        self.lock().cache_hits += 1;
    }

    pub fn record_cache_miss(&self) {
        self.lock().cache_misses += 1;
    }

    pub fn record_failure(&self) {
        self.lock().failed_requests += 1;
    }

    /// Counts a processed request and folds its latency into the average.
    pub fn record_success(&self, latency: Duration) {
        let mut metrics = self.lock();
        metrics.successful_requests += 1;
        metrics.average_latency = if metrics.successful_requests == 1 {
            latency
        } else {
            Duration::from_secs_f64(
                LATENCY_SMOOTHING * latency.as_secs_f64()
                    + (1.0 - LATENCY_SMOOTHING) * metrics.average_latency.as_secs_f64(),
            )
        };
    }

    /// Copy of the raw counters.
    pub fn counters(&self) -> Metrics {
        self.lock().clone()
    }

    pub fn snapshot(&self, cache_size: usize, active_clients: usize) -> StatsSnapshot {
        let m = self.counters();
        if m.total_requests == 0 {
            return StatsSnapshot::NoData;
        }
        let total = m.total_requests as f64;
        let lookups = m.cache_hits + m.cache_misses;
        let cache_hit_rate = if lookups == 0 {
            0.0
        } else {
            m.cache_hits as f64 / lookups as f64 * 100.0
        };
        StatsSnapshot::Active(PipelineStats {
            total_requests: m.total_requests,
            successful_requests: m.successful_requests,
            failed_requests: m.failed_requests,
            rate_limited_requests: m.rate_limited_requests,
            cache_hits: m.cache_hits,
            cache_misses: m.cache_misses,
            success_rate: m.successful_requests as f64 / total * 100.0,
            failure_rate: m.failed_requests as f64 / total * 100.0,
            cache_hit_rate,
            average_latency: m.average_latency,
            cache_size,
            active_clients,
        })
    }

    fn lock(&self) -> MutexGuard<'_, Metrics> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MetricsAggregator {
    fn default() -> Self {
        Self::new()
    }
}
