use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

const DEFAULT_API_ADDR: &str = "127.0.0.1:8800";
const DEFAULT_MAX_REQUEST_BYTES: usize = 4 * 1024 * 1024;
const DEFAULT_CACHE_MAX_SIZE: usize = 50;
const DEFAULT_CACHE_TTL_SECS: u64 = 20;
const DEFAULT_RATE_LIMIT_MAX_REQUESTS: usize = 20;
const DEFAULT_RATE_LIMIT_WINDOW_SECS: u64 = 60;
const DEFAULT_CLEANUP_INTERVAL_SECS: u64 = 60;
const DEFAULT_REMOTE_TIMEOUT_SECS: u64 = 10;

/// Frames shorter than this many characters are rejected before inference.
pub const DEFAULT_MIN_FRAME_CHARS: usize = 100;

/// Settings for the in-memory pipeline itself.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub cache_max_size: usize,
    pub cache_ttl: Duration,
    pub rate_limit_max_requests: usize,
    pub rate_limit_window: Duration,
    pub min_frame_chars: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            cache_max_size: DEFAULT_CACHE_MAX_SIZE,
            cache_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
            rate_limit_max_requests: DEFAULT_RATE_LIMIT_MAX_REQUESTS,
            rate_limit_window: Duration::from_secs(DEFAULT_RATE_LIMIT_WINDOW_SECS),
            min_frame_chars: DEFAULT_MIN_FRAME_CHARS,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.cache_max_size == 0 {
            return Err(anyhow!("cache max_size must be greater than zero"));
        }
        if self.cache_ttl.is_zero() {
            return Err(anyhow!("cache ttl must be greater than zero"));
        }
        if self.rate_limit_max_requests == 0 {
            return Err(anyhow!("rate limit max_requests must be greater than zero"));
        }
        if self.rate_limit_window.is_zero() {
            return Err(anyhow!("rate limit window must be greater than zero"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessorKind {
    Stub,
    Remote,
}

impl std::str::FromStr for ProcessorKind {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "stub" => Ok(ProcessorKind::Stub),
            "remote" => Ok(ProcessorKind::Remote),
            other => Err(anyhow!("unknown processor kind '{}'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProcessorSettings {
    pub kind: ProcessorKind,
    pub remote_url: Option<String>,
    pub remote_timeout: Duration,
}

#[derive(Debug, Deserialize, Default)]
struct GatewayConfigFile {
    api: Option<ApiConfigFile>,
    cache: Option<CacheConfigFile>,
    rate_limit: Option<RateLimitConfigFile>,
    cleanup: Option<CleanupConfigFile>,
    processor: Option<ProcessorConfigFile>,
    min_frame_chars: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct ApiConfigFile {
    addr: Option<String>,
    max_request_bytes: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct CacheConfigFile {
    max_size: Option<usize>,
    ttl_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct RateLimitConfigFile {
    max_requests: Option<usize>,
    window_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct CleanupConfigFile {
    interval_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct ProcessorConfigFile {
    kind: Option<ProcessorKind>,
    remote_url: Option<String>,
    timeout_secs: Option<u64>,
}

/// Full runtime configuration for `framegated`.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub api_addr: String,
    pub max_request_bytes: usize,
    pub pipeline: PipelineConfig,
    pub cleanup_interval: Duration,
    pub processor: ProcessorSettings,
}

impl GatewayConfig {
    /// Load from `FRAMEGATE_CONFIG` (JSON, or TOML by extension), then env overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("FRAMEGATE_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: GatewayConfigFile) -> Self {
        let api = file.api.unwrap_or_default();
        let cache = file.cache.unwrap_or_default();
        let rate_limit = file.rate_limit.unwrap_or_default();
        let processor = file.processor.unwrap_or_default();
        let pipeline = PipelineConfig {
            cache_max_size: cache.max_size.unwrap_or(DEFAULT_CACHE_MAX_SIZE),
            cache_ttl: Duration::from_secs(cache.ttl_secs.unwrap_or(DEFAULT_CACHE_TTL_SECS)),
            rate_limit_max_requests: rate_limit
                .max_requests
                .unwrap_or(DEFAULT_RATE_LIMIT_MAX_REQUESTS),
            rate_limit_window: Duration::from_secs(
                rate_limit
                    .window_secs
                    .unwrap_or(DEFAULT_RATE_LIMIT_WINDOW_SECS),
            ),
            min_frame_chars: file.min_frame_chars.unwrap_or(DEFAULT_MIN_FRAME_CHARS),
        };
        Self {
            api_addr: api.addr.unwrap_or_else(|| DEFAULT_API_ADDR.to_string()),
            max_request_bytes: api.max_request_bytes.unwrap_or(DEFAULT_MAX_REQUEST_BYTES),
            pipeline,
            cleanup_interval: Duration::from_secs(
                file.cleanup
                    .and_then(|cleanup| cleanup.interval_secs)
                    .unwrap_or(DEFAULT_CLEANUP_INTERVAL_SECS),
            ),
            processor: ProcessorSettings {
                kind: processor.kind.unwrap_or(ProcessorKind::Stub),
                remote_url: processor.remote_url,
                remote_timeout: Duration::from_secs(
                    processor.timeout_secs.unwrap_or(DEFAULT_REMOTE_TIMEOUT_SECS),
                ),
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(addr) = std::env::var("FRAMEGATE_API_ADDR") {
            if !addr.trim().is_empty() {
                self.api_addr = addr;
            }
        }
        if let Some(size) = env_number("FRAMEGATE_CACHE_MAX_SIZE")? {
            self.pipeline.cache_max_size = size as usize;
        }
        if let Some(secs) = env_number("FRAMEGATE_CACHE_TTL_SECS")? {
            self.pipeline.cache_ttl = Duration::from_secs(secs);
        }
        if let Some(max) = env_number("FRAMEGATE_RATE_LIMIT_MAX_REQUESTS")? {
            self.pipeline.rate_limit_max_requests = max as usize;
        }
        if let Some(secs) = env_number("FRAMEGATE_RATE_LIMIT_WINDOW_SECS")? {
            self.pipeline.rate_limit_window = Duration::from_secs(secs);
        }
        if let Some(secs) = env_number("FRAMEGATE_CLEANUP_INTERVAL_SECS")? {
            self.cleanup_interval = Duration::from_secs(secs);
        }
        if let Ok(kind) = std::env::var("FRAMEGATE_PROCESSOR") {
            if !kind.trim().is_empty() {
                self.processor.kind = kind.parse()?;
            }
        }
        if let Ok(url) = std::env::var("FRAMEGATE_REMOTE_URL") {
            if !url.trim().is_empty() {
                self.processor.remote_url = Some(url);
            }
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        self.pipeline.validate()?;
        if self.cleanup_interval.is_zero() {
            return Err(anyhow!("cleanup interval must be greater than zero"));
        }
        if self.max_request_bytes == 0 {
            return Err(anyhow!("api max_request_bytes must be greater than zero"));
        }
        if self.processor.kind == ProcessorKind::Remote && self.processor.remote_url.is_none() {
            return Err(anyhow!(
                "remote processor requires processor.remote_url or FRAMEGATE_REMOTE_URL"
            ));
        }
        Ok(())
    }
}

fn env_number(key: &str) -> Result<Option<u64>> {
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| anyhow!("{} must be a non-negative integer", key)),
        _ => Ok(None),
    }
}

fn read_config_file(path: &Path) -> Result<GatewayConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("toml"))
        .unwrap_or(false);
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_pipeline_defaults() {
        let cfg = GatewayConfig::from_file(GatewayConfigFile::default());
        assert_eq!(cfg.pipeline, PipelineConfig::default());
        assert_eq!(cfg.api_addr, DEFAULT_API_ADDR);
        assert_eq!(cfg.processor.kind, ProcessorKind::Stub);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn zero_sizes_are_rejected() {
        let mut cfg = PipelineConfig::default();
        cfg.cache_max_size = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = PipelineConfig::default();
        cfg.rate_limit_window = Duration::ZERO;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn remote_requires_url() {
        let mut cfg = GatewayConfig::from_file(GatewayConfigFile::default());
        cfg.processor.kind = ProcessorKind::Remote;
        assert!(cfg.validate().is_err());
        cfg.processor.remote_url = Some("http://127.0.0.1:9000/infer".into());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn processor_kind_parses() {
        assert_eq!("Remote".parse::<ProcessorKind>().unwrap(), ProcessorKind::Remote);
        assert!("gpu".parse::<ProcessorKind>().is_err());
    }
}
