//! frame_replay - Push recorded frames through the pipeline offline
//!
//! Reads encoded frames from files (one frame per file, typically base64 JPEG),
//! runs them through a pipeline with the stub processor, and prints per-frame
//! results and final stats as JSON. Useful for sizing cache and rate-limit
//! settings against a real capture.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use framegate::{Pipeline, PipelineConfig, StubProcessor};

#[derive(Parser, Debug)]
#[command(
    name = "frame_replay",
    about = "Replay encoded frames through the Frame Gate pipeline"
)]
struct Args {
    /// Files holding one encoded frame each
    #[arg(required = true, value_name = "FILE")]
    frames: Vec<PathBuf>,

    /// Client id the frames are attributed to
    #[arg(long, default_value = "replay")]
    client: String,

    /// How many times to replay the full set
    #[arg(long, default_value_t = 1)]
    rounds: u32,

    /// Cache capacity
    #[arg(long, env = "FRAMEGATE_CACHE_MAX_SIZE", default_value_t = 50)]
    cache_size: usize,

    /// Cache TTL in seconds
    #[arg(long, env = "FRAMEGATE_CACHE_TTL_SECS", default_value_t = 20)]
    cache_ttl_secs: u64,

    /// Requests admitted per client per window
    #[arg(long, env = "FRAMEGATE_RATE_LIMIT_MAX_REQUESTS", default_value_t = 20)]
    max_requests: usize,

    /// Rate-limit window in seconds
    #[arg(long, env = "FRAMEGATE_RATE_LIMIT_WINDOW_SECS", default_value_t = 60)]
    window_secs: u64,

    /// Print every result, not only the final stats
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    let config = PipelineConfig {
        cache_max_size: args.cache_size,
        cache_ttl: Duration::from_secs(args.cache_ttl_secs),
        rate_limit_max_requests: args.max_requests,
        rate_limit_window: Duration::from_secs(args.window_secs),
        ..PipelineConfig::default()
    };
    config.validate()?;

    let frames = args
        .frames
        .iter()
        .map(|path| {
            std::fs::read_to_string(path)
                .map(|data| data.trim().to_string())
                .with_context(|| format!("read frame {}", path.display()))
        })
        .collect::<Result<Vec<_>>>()?;

    let pipeline = Pipeline::new(config, Arc::new(StubProcessor::new()));
    for round in 0..args.rounds {
        for (path, frame) in args.frames.iter().zip(&frames) {
            let result = pipeline.process(frame, &args.client);
            if args.verbose {
                println!(
                    "{}",
                    serde_json::json!({
                        "round": round,
                        "frame": path.display().to_string(),
                        "result": result,
                    })
                );
            }
        }
    }

    println!("{}", serde_json::to_string_pretty(&final_summary(&pipeline))?);
    Ok(())
}

/// Stats as the replay left them, followed by the cleanup sweep's report.
fn final_summary(pipeline: &Pipeline) -> serde_json::Value {
    let stats = pipeline.stats();
    let report = pipeline.cleanup();
    serde_json::json!({
        "performance_stats": stats,
        "cleanup_result": report,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn summary_reports_stats_taken_before_cleanup() {
        let config = PipelineConfig {
            cache_ttl: Duration::from_millis(20),
            ..PipelineConfig::default()
        };
        let pipeline = Pipeline::new(config, Arc::new(StubProcessor::new()));
        pipeline.process(&"QUJDRA==".repeat(40), "replay");
        thread::sleep(Duration::from_millis(40));

        let summary = final_summary(&pipeline);
        assert_eq!(summary["performance_stats"]["cache_size"], 1);
        assert_eq!(summary["cleanup_result"]["expired_removed"], 1);
        let framegate::StatsSnapshot::Active(after) = pipeline.stats() else {
            panic!("expected active stats");
        };
        assert_eq!(after.cache_size, 0);
    }
}
