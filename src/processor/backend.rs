use anyhow::Result;
use serde::{Deserialize, Serialize};
/// Frames whose estimated decoded size exceeds this get a size warning.
pub const SIZE_WARNING_BYTES: usize = 500_000;

/// Preprocessing facts derived from the encoded frame before inference.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FrameMetadata {
    /// Decoded size estimate assuming base64 (`len * 3 / 4`).
    pub estimated_size_bytes: usize,
    pub encoded_length: usize,
    pub size_warning: bool,
}

impl FrameMetadata {
    /// Derive metadata from the encoded payload. The payload is not decoded.
    pub fn from_encoded(frame_data: &str) -> Self {
        let encoded_length = frame_data.len();
        let estimated_size_bytes = encoded_length * 3 / 4;
        Self {
            estimated_size_bytes,
            encoded_length,
            size_warning: estimated_size_bytes > SIZE_WARNING_BYTES,
        }
    }
}

/// What a processor reports for one frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Inference {
    pub translation: String,
    #[serde(default)]
    pub confidence: f32,
    #[serde(default, alias = "handDetected")]
    pub hand_detected: bool,
}

/// The vision-inference capability the pipeline sits in front of.
///
/// Implementations own their timeouts. They are called without any pipeline
/// lock held and may be invoked concurrently, so they take `&self`.
/// Results are not assumed to be deterministic even though the cache treats
/// identical fingerprints as interchangeable.
pub trait FrameProcessor: Send + Sync {
    /// Processor identifier.
    fn name(&self) -> &'static str;

    /// Run inference on one encoded frame.
    fn process(&self, frame_data: &str, metadata: &FrameMetadata) -> Result<Inference>;
}

impl<F> FrameProcessor for F
where
    F: Fn(&str, &FrameMetadata) -> Result<Inference> + Send + Sync,
{
    fn name(&self) -> &'static str {
        "closure"
    }

    fn process(&self, frame_data: &str, metadata: &FrameMetadata) -> Result<Inference> {
        self(frame_data, metadata)
    }
}
