use anyhow::{anyhow, Context, Result};
use serde_json::{json, Value};
use std::time::Duration;

use super::backend::{FrameMetadata, FrameProcessor, Inference};
use super::prompt::build_prompt;
use super::reply::parse_model_reply;

#[derive(Clone, Debug)]
pub struct RemoteConfig {
    /// Endpoint accepting `{prompt, image: {media_type, data}}` as JSON.
    pub url: String,
    pub timeout: Duration,
    pub media_type: String,
}

impl RemoteConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout: Duration::from_secs(10),
            media_type: "image/jpeg".to_string(),
        }
    }
}

/// Forwards frames to an external vision endpoint over HTTP.
///
/// The endpoint replies either with raw model text or with JSON carrying the
/// text under `text` or `content[0].text`; the text is then run through
/// `parse_model_reply`.
pub struct RemoteProcessor {
    config: RemoteConfig,
    agent: ureq::Agent,
}

impl RemoteProcessor {
    pub fn new(config: RemoteConfig) -> Result<Self> {
        if config.url.trim().is_empty() {
            return Err(anyhow!("remote processor url must not be empty"));
        }
        let agent = ureq::AgentBuilder::new().timeout(config.timeout).build();
        Ok(Self { config, agent })
    }
}

impl FrameProcessor for RemoteProcessor {
    fn name(&self) -> &'static str {
        "remote"
    }

    fn process(&self, frame_data: &str, metadata: &FrameMetadata) -> Result<Inference> {
        let body = json!({
            "prompt": build_prompt(metadata),
            "image": {
                "media_type": self.config.media_type,
                "data": frame_data,
            },
        });
        let response = self
            .agent
            .post(&self.config.url)
            .send_json(body)
            .with_context(|| format!("post frame to {}", self.config.url))?;
        let raw = response
            .into_string()
            .context("read remote processor response")?;
        Ok(parse_model_reply(&reply_text(&raw)))
    }
}

fn reply_text(raw: &str) -> String {
    let Ok(value) = serde_json::from_str::<Value>(raw) else {
        return raw.to_string();
    };
    if let Some(text) = value.get("text").and_then(Value::as_str) {
        return text.to_string();
    }
    if let Some(text) = value
        .get("content")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("text"))
        .and_then(Value::as_str)
    {
        return text.to_string();
    }
    raw.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_text_unwraps_known_envelopes() {
        assert_eq!(reply_text(r#"{"text":"HELLO"}"#), "HELLO");
        assert_eq!(
            reply_text(r#"{"content":[{"type":"text","text":"THANKS"}]}"#),
            "THANKS"
        );
        assert_eq!(reply_text("plain words"), "plain words");
    }

    #[test]
    fn reply_text_keeps_direct_inference_json() {
        let raw = r#"{"translation":"YES","confidence":0.8,"hand_detected":true}"#;
        let inference = parse_model_reply(&reply_text(raw));
        assert_eq!(inference.translation, "YES");
    }

    #[test]
    fn rejects_empty_url() {
        assert!(RemoteProcessor::new(RemoteConfig::new("  ")).is_err());
    }
}
