use anyhow::Result;

use super::backend::{FrameMetadata, FrameProcessor, Inference};

/// Stub processor for local runs and tests. Returns a fixed detection.
pub struct StubProcessor {
    translation: String,
    confidence: f32,
}

impl StubProcessor {
    pub fn new() -> Self {
        Self {
            translation: "Sample sign detected".to_string(),
            confidence: 0.75,
        }
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence;
        self
    }
}

impl Default for StubProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameProcessor for StubProcessor {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn process(&self, _frame_data: &str, _metadata: &FrameMetadata) -> Result<Inference> {
        Ok(Inference {
            translation: self.translation.clone(),
            confidence: self.confidence,
            hand_detected: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_reports_fixed_detection() {
        let stub = StubProcessor::new().with_confidence(0.9);
        let meta = FrameMetadata::from_encoded("frame");
        let out = stub.process("frame", &meta).unwrap();
        assert_eq!(out.translation, "Sample sign detected");
        assert_eq!(out.confidence, 0.9);
        assert!(out.hand_detected);
    }
}
