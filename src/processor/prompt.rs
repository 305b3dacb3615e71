use super::backend::FrameMetadata;

const BASE_PROMPT: &str = "\
Analyze this image for American Sign Language (ASL) signs. Be concise and accurate.

Focus on:
1. Hand positions and finger configurations
2. Common ASL signs (A-Z, common words)
3. Movement patterns if detectable

Respond in JSON format:
{
    \"translation\": \"detected sign or 'No clear signs'\",
    \"confidence\": 0.0-1.0,
    \"hand_detected\": true/false
}";

const LARGE_FRAME_NOTE: &str = "Note: Large image - focus on central region.";

/// Instruction text sent to a vision model alongside the frame.
pub fn build_prompt(metadata: &FrameMetadata) -> String {
    let mut prompt = BASE_PROMPT.to_string();
    if metadata.size_warning {
        prompt.push('\n');
        prompt.push_str(LARGE_FRAME_NOTE);
    }
    prompt
}
