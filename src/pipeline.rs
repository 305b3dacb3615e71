//! Admission, caching and metrics in front of a `FrameProcessor`.
//!
//! Per request:
//! 1. rate limit (`RateLimited`, counted apart from failures)
//! 2. cache lookup (hit returns immediately)
//! 3. validation (`InvalidInput`)
//! 4. processor call, outside every lock (`ProcessingFailure` / `InternalError`)
//! 5. cache store
//! 6. success metrics
//!
//! `process` always returns a `FrameResult`; errors are folded into it.

use serde::Serialize;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use crate::cache::{generate_key, FrameCache};
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::limiter::RateLimiter;
use crate::metrics::{Metrics, MetricsAggregator, StatsSnapshot};
use crate::processor::{FrameMetadata, FrameProcessor};
use crate::result::FrameResult;

/// Result of a maintenance sweep.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub expired_removed: usize,
    pub idle_clients_removed: usize,
}

/// Request pipeline. Construct once per process and share it as `Arc<Pipeline>`.
pub struct Pipeline {
    config: PipelineConfig,
    cache: FrameCache,
    limiter: RateLimiter,
    metrics: MetricsAggregator,
    processor: Arc<dyn FrameProcessor>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, processor: Arc<dyn FrameProcessor>) -> Self {
        log::info!(
            "pipeline: cache {} entries / {:?} ttl, limit {} req / {:?}, processor={}",
            config.cache_max_size,
            config.cache_ttl,
            config.rate_limit_max_requests,
            config.rate_limit_window,
            processor.name()
        );
        Self {
            cache: FrameCache::new(config.cache_max_size, config.cache_ttl),
            limiter: RateLimiter::new(config.rate_limit_max_requests, config.rate_limit_window),
            metrics: MetricsAggregator::new(),
            processor,
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Handle one frame with the configured processor.
    pub fn process(&self, frame_data: &str, client_id: &str) -> FrameResult {
        self.process_with(frame_data, client_id, self.processor.as_ref())
    }

    /// Handle one frame with an explicitly supplied processor.
    pub fn process_with(
        &self,
        frame_data: &str,
        client_id: &str,
        processor: &dyn FrameProcessor,
    ) -> FrameResult {
        let started = Instant::now();
        self.metrics.record_request();

        if !self.limiter.is_allowed(client_id) {
            let err = PipelineError::RateLimited(client_id.to_string());
            log::warn!("{}", err);
            return self.reject(&err, started);
        }

        if let Some(mut cached) = self.cache.get(frame_data) {
            self.metrics.record_cache_hit();
            cached.cache_hit = true;
            cached.latency = started.elapsed();
            log::debug!(
                "client={} served {} from cache",
                client_id,
                generate_key(frame_data)
            );
            return cached;
        }
        self.metrics.record_cache_miss();

        match self.run_processor(frame_data, processor) {
            Ok(mut result) => {
                self.cache.put(frame_data, &result);
                result.latency = started.elapsed();
                self.metrics.record_success(result.latency);
                log::debug!(
                    "client={} processed {} bytes via {} in {:?}",
                    client_id,
                    frame_data.len(),
                    processor.name(),
                    result.latency
                );
                result
            }
            Err(err) => {
                log::warn!("client={} frame rejected: {}", client_id, err);
                self.reject(&err, started)
            }
        }
    }

    fn reject(&self, err: &PipelineError, started: Instant) -> FrameResult {
        if err.counts_as_failure() {
            self.metrics.record_failure();
        } else {
            self.metrics.record_rate_limited();
        }
        FrameResult::from_error(err, started.elapsed())
    }

    fn run_processor(
        &self,
        frame_data: &str,
        processor: &dyn FrameProcessor,
    ) -> Result<FrameResult, PipelineError> {
        self.validate(frame_data)?;
        let metadata = FrameMetadata::from_encoded(frame_data);
        if metadata.size_warning {
            log::info!(
                "large frame: ~{} KB decoded",
                metadata.estimated_size_bytes / 1024
            );
        }

        let call_started = Instant::now();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            processor.process(frame_data, &metadata)
        }));
        let processing_time = call_started.elapsed();

        let inference = match outcome {
            Ok(Ok(inference)) => inference,
            Ok(Err(err)) => return Err(PipelineError::ProcessingFailure(format!("{:#}", err))),
            Err(payload) => return Err(PipelineError::InternalError(panic_message(payload))),
        };
        Ok(FrameResult::from_inference(
            inference,
            metadata,
            processing_time,
        ))
    }

    fn validate(&self, frame_data: &str) -> Result<(), PipelineError> {
        if frame_data.is_empty() {
            return Err(PipelineError::InvalidInput("frame data is empty".into()));
        }
        if frame_data.len() < self.config.min_frame_chars {
            return Err(PipelineError::InvalidInput(format!(
                "frame data too small ({} < {} bytes)",
                frame_data.len(),
                self.config.min_frame_chars
            )));
        }
        Ok(())
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.metrics
            .snapshot(self.cache.len(), self.limiter.active_clients())
    }

    pub fn counters(&self) -> Metrics {
        self.metrics.counters()
    }

    /// Drop expired cache entries and idle rate-limit clients.
    pub fn cleanup(&self) -> CleanupReport {
        let report = CleanupReport {
            expired_removed: self.cache.clear_expired(),
            idle_clients_removed: self.limiter.evict_idle(),
        };
        if report.expired_removed > 0 || report.idle_clients_removed > 0 {
            log::debug!(
                "cleanup: {} expired entries, {} idle clients",
                report.expired_removed,
                report.idle_clients_removed
            );
        }
        report
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        format!("processor panicked: {}", msg)
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        format!("processor panicked: {}", msg)
    } else {
        "processor panicked".to_string()
    }
}
