use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::error::ErrorKind;
use crate::metrics::StatsSnapshot;
use crate::pipeline::{CleanupReport, Pipeline};
use crate::result::{serialize_secs, FrameResult};

const MAX_HEADER_BYTES: usize = 8192;
const DEFAULT_CLIENT_ID: &str = "default";

#[derive(Clone, Debug)]
pub struct ApiConfig {
    pub addr: String,
    /// Upper bound on header plus body size for a single request.
    pub max_request_bytes: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:8800".to_string(),
            max_request_bytes: 4 * 1024 * 1024,
        }
    }
}

#[derive(Debug)]
pub struct ApiHandle {
    pub addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl ApiHandle {
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("api server thread panicked"))?;
        }
        Ok(())
    }
}

/// Loopback HTTP surface over a shared `Pipeline`.
///
/// - `POST /process` with `{"frame_data", "device_id"?, "timestamp"?}`
/// - `GET /stats` returns stats and runs a cleanup sweep
/// - `GET /health`
pub struct ApiServer {
    cfg: ApiConfig,
    pipeline: Arc<Pipeline>,
}

impl ApiServer {
    pub fn new(cfg: ApiConfig, pipeline: Arc<Pipeline>) -> Self {
        Self { cfg, pipeline }
    }

    pub fn spawn(self) -> Result<ApiHandle> {
        let configured_addr: SocketAddr = self.cfg.addr.parse()?;
        let listener = TcpListener::bind(configured_addr)?;
        let addr = listener.local_addr()?;
        if configured_addr.ip().is_loopback() && !addr.ip().is_loopback() {
            return Err(anyhow!(
                "api configured for loopback address '{}', but bound to non-loopback address '{}'",
                configured_addr,
                addr
            ));
        }
        listener.set_nonblocking(true)?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let cfg = self.cfg;
        let pipeline = self.pipeline;
        let join = std::thread::spawn(move || {
            if let Err(err) = run_api(listener, cfg, pipeline, shutdown_thread) {
                log::error!("frame api stopped: {}", err);
            }
        });

        Ok(ApiHandle {
            addr,
            shutdown,
            join: Some(join),
        })
    }
}

fn run_api(
    listener: TcpListener,
    cfg: ApiConfig,
    pipeline: Arc<Pipeline>,
    shutdown: Arc<AtomicBool>,
) -> Result<()> {
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        match listener.accept() {
            Ok((stream, _)) => {
                // One thread per connection: a slow inference must not hold up
                // other clients.
                let pipeline = pipeline.clone();
                let max_request_bytes = cfg.max_request_bytes;
                std::thread::spawn(move || {
                    if let Err(err) = handle_connection(stream, &pipeline, max_request_bytes) {
                        log::warn!("frame api request rejected: {}", err);
                    }
                });
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(20));
                continue;
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
struct ProcessRequest {
    frame_data: Option<String>,
    device_id: Option<String>,
    #[serde(default)]
    timestamp: serde_json::Value,
}

#[derive(Debug, Serialize)]
struct ProcessResponse<'a> {
    translation: &'a str,
    confidence: f32,
    hand_detected: bool,
    cache_hit: bool,
    #[serde(serialize_with = "serialize_secs")]
    latency: Duration,
    timestamp: &'a serde_json::Value,
    device_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct StatsResponse {
    performance_stats: StatsSnapshot,
    cleanup_result: CleanupReport,
    timestamp: f64,
}

fn handle_connection(
    mut stream: TcpStream,
    pipeline: &Pipeline,
    max_request_bytes: usize,
) -> Result<()> {
    stream.set_nonblocking(false)?;
    let peer = stream.peer_addr()?;
    let local = stream.local_addr()?;
    if local.ip().is_loopback() && !peer.ip().is_loopback() {
        write_json_response(&mut stream, 403, r#"{"error":"forbidden"}"#)?;
        return Ok(());
    }

    let request = match read_request(&mut stream, max_request_bytes) {
        Ok(request) => request,
        Err(err) => {
            write_json_response(&mut stream, 413, r#"{"error":"request_rejected"}"#)?;
            return Err(err);
        }
    };

    match (request.method.as_str(), request.path.as_str()) {
        ("OPTIONS", _) => write_response(&mut stream, 204, "application/json", b""),
        ("GET", "/health") => write_json_response(&mut stream, 200, r#"{"status":"ok"}"#),
        ("GET", "/stats") => {
            let body = StatsResponse {
                performance_stats: pipeline.stats(),
                cleanup_result: pipeline.cleanup(),
                timestamp: unix_now_secs(),
            };
            let payload = serde_json::to_vec(&body)?;
            write_response(&mut stream, 200, "application/json", &payload)
        }
        ("POST", "/process") => handle_process(&mut stream, pipeline, &request.body),
        (_, "/health" | "/stats" | "/process") => {
            write_json_response(&mut stream, 405, r#"{"error":"method_not_allowed"}"#)
        }
        _ => write_json_response(&mut stream, 404, r#"{"error":"not_found"}"#),
    }
}

fn handle_process(stream: &mut TcpStream, pipeline: &Pipeline, body: &[u8]) -> Result<()> {
    let request: ProcessRequest = match serde_json::from_slice(body) {
        Ok(request) => request,
        Err(_) => return write_json_response(stream, 400, r#"{"error":"invalid_json"}"#),
    };
    let Some(frame_data) = request.frame_data.filter(|data| !data.is_empty()) else {
        return write_json_response(stream, 400, r#"{"error":"no_frame_data"}"#);
    };
    let device_id = request
        .device_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_CLIENT_ID.to_string());

    let result = pipeline.process(&frame_data, &device_id);
    let payload = serde_json::to_vec(&ProcessResponse {
        translation: &result.translation,
        confidence: result.confidence,
        hand_detected: result.hand_detected,
        cache_hit: result.cache_hit,
        latency: result.latency,
        timestamp: &request.timestamp,
        device_id: &device_id,
        error: result.error.as_deref(),
    })?;
    write_response(stream, status_for(&result), "application/json", &payload)
}

fn status_for(result: &FrameResult) -> u16 {
    match result.error_kind {
        None => 200,
        Some(ErrorKind::InvalidInput) => 400,
        Some(ErrorKind::RateLimited) => 429,
        Some(ErrorKind::ProcessingFailure) => 502,
        Some(ErrorKind::InternalError) => 500,
    }
}

fn read_request(stream: &mut TcpStream, max_request_bytes: usize) -> Result<HttpRequest> {
    stream.set_read_timeout(Some(Duration::from_secs(5)))?;
    let mut buf = [0u8; 8192];
    let mut data = Vec::new();
    let header_end = loop {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            return Err(anyhow!("connection closed before headers"));
        }
        data.extend_from_slice(&buf[..n]);
        if let Some(pos) = data.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
        if data.len() > MAX_HEADER_BYTES {
            return Err(anyhow!("request headers too large"));
        }
    };

    let head = String::from_utf8_lossy(&data[..header_end]).to_string();
    let mut lines = head.split("\r\n");
    let request_line = lines.next().ok_or_else(|| anyhow!("empty request"))?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().ok_or_else(|| anyhow!("missing method"))?;
    let raw_path = parts.next().ok_or_else(|| anyhow!("missing path"))?;
    let mut headers = HashMap::new();
    for line in lines {
        if line.is_empty() {
            break;
        }
        if let Some((k, v)) = line.split_once(':') {
            headers.insert(k.trim().to_lowercase(), v.trim().to_string());
        }
    }

    let content_length: usize = match headers.get("content-length") {
        Some(value) => value
            .parse()
            .map_err(|_| anyhow!("invalid content-length"))?,
        None => 0,
    };
    // Content-Length is client controlled; never add it to anything unchecked.
    if content_length > max_request_bytes.saturating_sub(header_end) {
        return Err(anyhow!("request too large ({} bytes)", content_length));
    }
    let mut body = data.split_off(header_end);
    while body.len() < content_length {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            return Err(anyhow!("connection closed mid-body"));
        }
        body.extend_from_slice(&buf[..n]);
    }
    body.truncate(content_length);

    let path = raw_path.split('?').next().unwrap_or(raw_path).to_string();
    Ok(HttpRequest {
        method: method.to_string(),
        path,
        body,
    })
}

fn write_json_response(stream: &mut TcpStream, status: u16, body: &str) -> Result<()> {
    write_response(stream, status, "application/json", body.as_bytes())
}

fn write_response(
    stream: &mut TcpStream,
    status: u16,
    content_type: &str,
    body: &[u8],
) -> Result<()> {
    let status_line = match status {
        200 => "HTTP/1.1 200 OK",
        204 => "HTTP/1.1 204 No Content",
        400 => "HTTP/1.1 400 Bad Request",
        403 => "HTTP/1.1 403 Forbidden",
        404 => "HTTP/1.1 404 Not Found",
        405 => "HTTP/1.1 405 Method Not Allowed",
        413 => "HTTP/1.1 413 Payload Too Large",
        429 => "HTTP/1.1 429 Too Many Requests",
        502 => "HTTP/1.1 502 Bad Gateway",
        _ => "HTTP/1.1 500 Internal Server Error",
    };
    let header = format!(
        "{status_line}\r\nContent-Type: {content_type}\r\nContent-Length: {len}\r\nCache-Control: no-store\r\nAccess-Control-Allow-Origin: *\r\nAccess-Control-Allow-Methods: GET, POST, OPTIONS\r\nAccess-Control-Allow-Headers: Content-Type, Authorization\r\nConnection: close\r\n\r\n",
        status_line = status_line,
        content_type = content_type,
        len = body.len()
    );
    stream.write_all(header.as_bytes())?;
    stream.write_all(body)?;
    Ok(())
}

#[derive(Debug)]
struct HttpRequest {
    method: String,
    path: String,
    body: Vec<u8>,
}

fn unix_now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
