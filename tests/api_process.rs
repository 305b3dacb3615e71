use anyhow::Result;
use serde_json::{json, Value};
use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use framegate::api::{ApiConfig, ApiHandle, ApiServer};
use framegate::{Pipeline, PipelineConfig, StubProcessor};

fn read_response(stream: &mut TcpStream) -> Result<(String, String)> {
    let mut response = String::new();
    stream.read_to_string(&mut response)?;
    let mut parts = response.splitn(2, "\r\n\r\n");
    let headers = parts.next().unwrap_or("").to_string();
    let body = parts.next().unwrap_or("").to_string();
    Ok((headers, body))
}

fn sample_frame(tag: &str) -> String {
    format!("/9j/{}{}", tag, "QUJDREVGR0g=".repeat(30))
}

struct TestApi {
    api_handle: Option<ApiHandle>,
}

impl TestApi {
    fn new(config: PipelineConfig) -> Result<Self> {
        let pipeline = Arc::new(Pipeline::new(config, Arc::new(StubProcessor::new())));
        let api_config = ApiConfig {
            addr: "127.0.0.1:0".to_string(),
            ..ApiConfig::default()
        };
        let api_handle = ApiServer::new(api_config, pipeline).spawn()?;
        Ok(Self {
            api_handle: Some(api_handle),
        })
    }

    fn handle(&self) -> &ApiHandle {
        self.api_handle
            .as_ref()
            .expect("test API handle should be initialized")
    }

    fn send(&self, request: &str) -> Result<(String, String)> {
        let mut stream = TcpStream::connect(self.handle().addr)?;
        stream.set_read_timeout(Some(Duration::from_secs(5)))?;
        stream.write_all(request.as_bytes())?;
        read_response(&mut stream)
    }

    fn post_process(&self, body: &Value) -> Result<(String, Value)> {
        let payload = body.to_string();
        let request = format!(
            "POST /process HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{}",
            payload.len(),
            payload
        );
        let (headers, body) = self.send(&request)?;
        Ok((headers, serde_json::from_str(&body)?))
    }
}

impl Drop for TestApi {
    fn drop(&mut self) {
        if let Some(handle) = self.api_handle.take() {
            handle.stop().expect("failed to stop API server");
        }
    }
}

#[test]
fn health_endpoint_responds() -> Result<()> {
    let api = TestApi::new(PipelineConfig::default())?;
    let (headers, body) = api.send("GET /health HTTP/1.1\r\nHost: localhost\r\n\r\n")?;
    assert!(headers.contains("200 OK"));
    assert!(body.contains(r#""status":"ok""#));
    Ok(())
}

#[test]
fn process_then_cache_hit() -> Result<()> {
    let api = TestApi::new(PipelineConfig::default())?;
    let request = json!({
        "frame_data": sample_frame("a"),
        "device_id": "cam-1",
        "timestamp": "2026-10-16T09:00:00Z",
    });

    let (headers, first) = api.post_process(&request)?;
    assert!(headers.contains("200 OK"));
    assert_eq!(first["translation"], "Sample sign detected");
    assert_eq!(first["cache_hit"], false);
    assert_eq!(first["hand_detected"], true);
    assert_eq!(first["device_id"], "cam-1");
    assert_eq!(first["timestamp"], "2026-10-16T09:00:00Z");

    let (_, second) = api.post_process(&request)?;
    assert_eq!(second["cache_hit"], true);
    Ok(())
}

#[test]
fn missing_frame_data_is_bad_request() -> Result<()> {
    let api = TestApi::new(PipelineConfig::default())?;
    let (headers, body) = api.post_process(&json!({ "device_id": "cam-1" }))?;
    assert!(headers.contains("400 Bad Request"));
    assert_eq!(body["error"], "no_frame_data");
    Ok(())
}

#[test]
fn undersized_frame_is_bad_request_with_result_body() -> Result<()> {
    let api = TestApi::new(PipelineConfig::default())?;
    let (headers, body) = api.post_process(&json!({ "frame_data": "abc" }))?;
    assert!(headers.contains("400 Bad Request"));
    assert_eq!(body["confidence"], 0.0);
    assert_eq!(body["device_id"], "default");
    assert!(body["error"].as_str().unwrap().contains("too small"));
    Ok(())
}

#[test]
fn over_quota_client_gets_429() -> Result<()> {
    let config = PipelineConfig {
        rate_limit_max_requests: 1,
        ..PipelineConfig::default()
    };
    let api = TestApi::new(config)?;
    let (headers, _) =
        api.post_process(&json!({ "frame_data": sample_frame("a"), "device_id": "cam-9" }))?;
    assert!(headers.contains("200 OK"));
    let (headers, body) =
        api.post_process(&json!({ "frame_data": sample_frame("b"), "device_id": "cam-9" }))?;
    assert!(headers.contains("429 Too Many Requests"));
    assert_eq!(body["translation"], "Rate limit exceeded");
    Ok(())
}

#[test]
fn stats_endpoint_reports_no_data_then_counts() -> Result<()> {
    let api = TestApi::new(PipelineConfig::default())?;
    let (headers, body) = api.send("GET /stats HTTP/1.1\r\nHost: localhost\r\n\r\n")?;
    assert!(headers.contains("200 OK"));
    let value: Value = serde_json::from_str(&body)?;
    assert_eq!(value["performance_stats"]["status"], "no_data");
    assert_eq!(value["cleanup_result"]["expired_removed"], 0);

    api.post_process(&json!({ "frame_data": sample_frame("a") }))?;
    let (_, body) = api.send("GET /stats HTTP/1.1\r\nHost: localhost\r\n\r\n")?;
    let value: Value = serde_json::from_str(&body)?;
    assert_eq!(value["performance_stats"]["status"], "active");
    assert_eq!(value["performance_stats"]["total_requests"], 1);
    assert_eq!(value["performance_stats"]["cache_size"], 1);
    Ok(())
}

#[test]
fn unknown_routes_and_methods_are_rejected() -> Result<()> {
    let api = TestApi::new(PipelineConfig::default())?;
    let (headers, _) = api.send("GET /nope HTTP/1.1\r\nHost: localhost\r\n\r\n")?;
    assert!(headers.contains("404 Not Found"));
    let (headers, _) = api.send("GET /process HTTP/1.1\r\nHost: localhost\r\n\r\n")?;
    assert!(headers.contains("405 Method Not Allowed"));
    Ok(())
}

#[test]
fn malformed_json_is_rejected() -> Result<()> {
    let api = TestApi::new(PipelineConfig::default())?;
    let request =
        "POST /process HTTP/1.1\r\nHost: localhost\r\nContent-Length: 9\r\n\r\n{not json";
    let (headers, body) = api.send(request)?;
    assert!(headers.contains("400 Bad Request"));
    assert!(body.contains("invalid_json"));
    Ok(())
}

#[test]
fn overflowing_content_length_is_rejected() -> Result<()> {
    let api = TestApi::new(PipelineConfig::default())?;
    let request = "POST /process HTTP/1.1\r\nHost: localhost\r\nContent-Length: 18446744073709551615\r\n\r\n";
    let (headers, body) = api.send(request)?;
    assert!(headers.contains("413 Payload Too Large"));
    assert!(body.contains("request_rejected"));

    // The server keeps serving after the rejection.
    let (headers, _) = api.send("GET /health HTTP/1.1\r\nHost: localhost\r\n\r\n")?;
    assert!(headers.contains("200 OK"));
    Ok(())
}

#[test]
fn body_over_configured_cap_is_rejected() -> Result<()> {
    let pipeline = Arc::new(Pipeline::new(
        PipelineConfig::default(),
        Arc::new(StubProcessor::new()),
    ));
    let api_config = ApiConfig {
        addr: "127.0.0.1:0".to_string(),
        max_request_bytes: 1024,
    };
    let handle = ApiServer::new(api_config, pipeline).spawn()?;

    let mut stream = TcpStream::connect(handle.addr)?;
    stream.set_read_timeout(Some(Duration::from_secs(5)))?;
    let request = "POST /process HTTP/1.1\r\nHost: localhost\r\nContent-Length: 4096\r\n\r\n";
    stream.write_all(request.as_bytes())?;
    let (headers, _) = read_response(&mut stream)?;
    assert!(headers.contains("413 Payload Too Large"));

    handle.stop()?;
    Ok(())
}
