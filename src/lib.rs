//! Frame Gate
//!
//! In-memory admission and caching layer that sits in front of a vision
//! inference service and receives single video frames as encoded text.
//!
//! # Architecture
//!
//! For every frame the pipeline decides to reject it, serve it from cache, or
//! admit it for inference:
//!
//! 1. **Admission**: a per-client sliding-window rate limiter.
//! 2. **Caching**: a bounded, TTL-expiring cache keyed by a sampled fingerprint.
//! 3. **Inference**: an injected `FrameProcessor`, called outside every lock.
//! 4. **Health**: request counters and a rolling latency average.
//!
//! Everything is single-process and in memory. Nothing is persisted.
//!
//! # Module Structure
//!
//! - `cache`: `FrameCache`, `FrameFingerprint`, `generate_key`
//! - `limiter`: `RateLimiter`
//! - `metrics`: `MetricsAggregator`, `StatsSnapshot`
//! - `pipeline`: `Pipeline`, the orchestrator
//! - `processor`: the `FrameProcessor` capability, stub and remote processors
//! - `config`: file + environment configuration
//! - `api`: loopback HTTP surface over a shared pipeline

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod limiter;
pub mod metrics;
pub mod pipeline;
pub mod processor;
pub mod result;

pub use cache::{generate_key, FrameCache, FrameFingerprint};
pub use config::{GatewayConfig, PipelineConfig, ProcessorKind};
pub use error::{ErrorKind, PipelineError};
pub use limiter::RateLimiter;
pub use metrics::{Metrics, MetricsAggregator, PipelineStats, StatsSnapshot};
pub use pipeline::{CleanupReport, Pipeline};
pub use processor::{FrameMetadata, FrameProcessor, Inference, StubProcessor};
pub use result::FrameResult;
