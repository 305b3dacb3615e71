use super::backend::Inference;
use crate::result::clamp_confidence;

const FALLBACK_TRANSLATION_CHARS: usize = 100;
const FALLBACK_CONFIDENCE: f32 = 0.5;

/// Interpret a vision model's text reply.
///
/// Well-formed replies are JSON objects matching `Inference`, optionally
/// wrapped in prose or a code fence. Anything else falls back to the first
/// 100 characters of the text at confidence 0.5, with `hand_detected` set when
/// the reply mentions a hand.
pub fn parse_model_reply(text: &str) -> Inference {
    if let Some(mut inference) = extract_json(text) {
        inference.confidence = clamp_confidence(inference.confidence);
        return inference;
    }
    log::debug!("model reply is not json; using text fallback");
    Inference {
        translation: text
            .trim()
            .chars()
            .take(FALLBACK_TRANSLATION_CHARS)
            .collect(),
        confidence: FALLBACK_CONFIDENCE,
        hand_detected: text.to_lowercase().contains("hand"),
    }
}

fn extract_json(text: &str) -> Option<Inference> {
    let trimmed = text.trim();
    if let Ok(inference) = serde_json::from_str::<Inference>(trimmed) {
        return Some(inference);
    }
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&trimmed[start..=end]).ok()
}
