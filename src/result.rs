use serde::{Serialize, Serializer};
use std::time::Duration;

use crate::error::{ErrorKind, PipelineError};
use crate::processor::{FrameMetadata, Inference};

/// Outcome of one frame request, whether processed, served from cache or refused.
///
/// Callers receive owned copies; the cache keeps its own copy, so mutating a
/// returned result never leaks back into cached state.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FrameResult {
    pub translation: String,
    /// Clamped to `0.0..=1.0`.
    pub confidence: f32,
    pub hand_detected: bool,
    pub cache_hit: bool,
    /// Wall time spent inside the pipeline for this request.
    #[serde(serialize_with = "serialize_secs")]
    pub latency: Duration,
    /// Time spent inside the processor. `None` for cache hits and refusals.
    #[serde(
        serialize_with = "serialize_opt_secs",
        skip_serializing_if = "Option::is_none"
    )]
    pub processing_time: Option<Duration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_metadata: Option<FrameMetadata>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

impl FrameResult {
    pub fn from_inference(
        inference: Inference,
        metadata: FrameMetadata,
        processing_time: Duration,
    ) -> Self {
        Self {
            translation: inference.translation,
            confidence: clamp_confidence(inference.confidence),
            hand_detected: inference.hand_detected,
            cache_hit: false,
            latency: processing_time,
            processing_time: Some(processing_time),
            processing_metadata: Some(metadata),
            error: None,
            error_kind: None,
        }
    }

    pub fn from_error(err: &PipelineError, latency: Duration) -> Self {
        Self {
            translation: err.headline().to_string(),
            confidence: 0.0,
            hand_detected: false,
            cache_hit: false,
            latency,
            processing_time: None,
            processing_metadata: None,
            error: Some(err.to_string()),
            error_kind: Some(err.kind()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error_kind.is_some()
    }
}

pub(crate) fn clamp_confidence(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

pub(crate) fn serialize_secs<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

fn serialize_opt_secs<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
    match d {
        Some(d) => s.serialize_f64(d.as_secs_f64()),
        None => s.serialize_none(),
    }
}
