//! framegated - Frame Gate daemon
//!
//! This daemon:
//! 1. Loads configuration (file named by FRAMEGATE_CONFIG, then env overrides)
//! 2. Builds one shared pipeline around the configured processor
//! 3. Serves the frame API on a loopback address
//! 4. Sweeps expired cache entries and idle clients on an interval

use anyhow::{anyhow, Result};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;

use framegate::{
    api::{ApiConfig, ApiServer},
    FrameProcessor, GatewayConfig, Pipeline, ProcessorKind, StatsSnapshot, StubProcessor,
};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = GatewayConfig::load()?;
    let processor = build_processor(&config)?;
    let pipeline = Arc::new(Pipeline::new(config.pipeline.clone(), processor));

    let api_config = ApiConfig {
        addr: config.api_addr.clone(),
        max_request_bytes: config.max_request_bytes,
    };
    let api_handle = ApiServer::new(api_config, pipeline.clone()).spawn()?;
    log::info!("frame api listening on {}", api_handle.addr);
    log::info!(
        "framegated {} running, cleanup every {:?}",
        env!("CARGO_PKG_VERSION"),
        config.cleanup_interval
    );

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))?;

    loop {
        match rx.recv_timeout(config.cleanup_interval) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {
                let report = pipeline.cleanup();
                match pipeline.stats() {
                    StatsSnapshot::NoData => log::debug!("no requests processed yet"),
                    StatsSnapshot::Active(stats) => log::info!(
                        "requests={} success={:.1}% cache_hit={:.1}% avg_latency={:.3}s cache={} clients={} swept={}/{}",
                        stats.total_requests,
                        stats.success_rate,
                        stats.cache_hit_rate,
                        stats.average_latency.as_secs_f64(),
                        stats.cache_size,
                        stats.active_clients,
                        report.expired_removed,
                        report.idle_clients_removed
                    ),
                }
            }
        }
    }

    log::info!("shutdown signal received, stopping API server...");
    api_handle.stop()?;
    Ok(())
}

fn build_processor(config: &GatewayConfig) -> Result<Arc<dyn FrameProcessor>> {
    match config.processor.kind {
        ProcessorKind::Stub => {
            log::warn!("using stub processor; results are placeholders");
            Ok(Arc::new(StubProcessor::new()))
        }
        ProcessorKind::Remote => remote_processor(config),
    }
}

#[cfg(feature = "remote-processor")]
fn remote_processor(config: &GatewayConfig) -> Result<Arc<dyn FrameProcessor>> {
    use framegate::processor::{RemoteConfig, RemoteProcessor};

    let url = config
        .processor
        .remote_url
        .clone()
        .ok_or_else(|| anyhow!("remote processor requires a url"))?;
    let remote = RemoteConfig {
        timeout: config.processor.remote_timeout,
        ..RemoteConfig::new(url)
    };
    log::info!("forwarding frames to {}", remote.url);
    Ok(Arc::new(RemoteProcessor::new(remote)?))
}

#[cfg(not(feature = "remote-processor"))]
fn remote_processor(_config: &GatewayConfig) -> Result<Arc<dyn FrameProcessor>> {
    Err(anyhow!(
        "remote processor requested but framegated was built without the remote-processor feature"
    ))
}
