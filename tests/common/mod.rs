//! Shared utilities for integration tests.

#![allow(dead_code)]

use futures_util::future::BoxFuture;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use rpc_fallback_tracker::config::{FailuresBeforeBan, TrackerConfig};
use rpc_fallback_tracker::health::SharedProbe;
use rpc_fallback_tracker::{Probe, ProbeError};

pub const A: &str = "https://a.example";
pub const B: &str = "https://b.example";

pub fn endpoints(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

/// One-second cycles, no publish throttle, ban after 3 failures in a minute.
pub fn fast_config() -> TrackerConfig {
    TrackerConfig {
        track_interval_ms: 1_000,
        set_endpoints_throttle_ms: 0,
        failures_before_ban: FailuresBeforeBan {
            count: 3,
            window_ms: 60_000,
            throttle_ms: 0,
        },
        ..TrackerConfig::default()
    }
}

/// Probe whose outcome per endpoint is set by the test.
///
/// Endpoints are healthy unless marked otherwise. Successful checks report
/// the call count as their stats.
#[derive(Default)]
pub struct ScriptedProbe {
    unhealthy: Mutex<HashSet<String>>,
    hanging: Mutex<HashSet<String>>,
    latency: Mutex<Option<Duration>>,
    calls: Mutex<HashMap<String, usize>>,
    in_flight: Arc<Mutex<HashMap<String, usize>>>,
    peak_in_flight: Arc<Mutex<HashMap<String, usize>>>,
}

impl ScriptedProbe {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn shared(self: &Arc<Self>) -> SharedProbe<u64> {
        self.clone()
    }

    pub fn set_healthy(&self, endpoint: &str, healthy: bool) {
        let mut unhealthy = self.unhealthy.lock().unwrap();
        if healthy {
            unhealthy.remove(endpoint);
        } else {
            unhealthy.insert(endpoint.to_string());
        }
    }

    /// Make checks against `endpoint` never complete.
    pub fn set_hanging(&self, endpoint: &str) {
        self.hanging.lock().unwrap().insert(endpoint.to_string());
    }

    /// Make every check take `latency` before answering.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = Some(latency);
    }

    pub fn calls(&self, endpoint: &str) -> usize {
        self.calls.lock().unwrap().get(endpoint).copied().unwrap_or(0)
    }

    /// Most checks against `endpoint` ever running at the same time.
    pub fn peak_in_flight(&self, endpoint: &str) -> usize {
        self.peak_in_flight.lock().unwrap().get(endpoint).copied().unwrap_or(0)
    }
}

/// Counts a running check until dropped.
struct InFlight {
    endpoint: String,
    counts: Arc<Mutex<HashMap<String, usize>>>,
}

impl InFlight {
    fn enter(
        endpoint: &str,
        counts: &Arc<Mutex<HashMap<String, usize>>>,
        peaks: &Arc<Mutex<HashMap<String, usize>>>,
    ) -> Self {
        let running = {
            let mut counts = counts.lock().unwrap();
            let n = counts.entry(endpoint.to_string()).or_insert(0);
            *n += 1;
            *n
        };
        let mut peaks = peaks.lock().unwrap();
        let peak = peaks.entry(endpoint.to_string()).or_insert(0);
        *peak = (*peak).max(running);

        Self {
            endpoint: endpoint.to_string(),
            counts: counts.clone(),
        }
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if let Some(n) = self.counts.lock().unwrap().get_mut(&self.endpoint) {
            *n -= 1;
        }
    }
}

impl Probe<u64> for ScriptedProbe {
    fn check(&self, endpoint: &str) -> BoxFuture<'static, Result<u64, ProbeError>> {
        let call = {
            let mut calls = self.calls.lock().unwrap();
            let n = calls.entry(endpoint.to_string()).or_insert(0);
            *n += 1;
            *n
        };
        let healthy = !self.unhealthy.lock().unwrap().contains(endpoint);
        let hang = self.hanging.lock().unwrap().contains(endpoint);
        let latency = *self.latency.lock().unwrap();
        let in_flight = InFlight::enter(endpoint, &self.in_flight, &self.peak_in_flight);

        Box::pin(async move {
            let _in_flight = in_flight;
            if let Some(latency) = latency {
                tokio::time::sleep(latency).await;
            }
            if hang {
                tokio::time::sleep(Duration::from_secs(3_600)).await;
            }
            if healthy {
                Ok(call as u64)
            } else {
                Err(ProbeError::Transport("connection refused".to_string()))
            }
        })
    }
}

/// Behaviour of a mock JSON-RPC node.
#[derive(Clone, Copy)]
pub enum MockRpc {
    Healthy { chain_id: u64, block_number: u64 },
    /// Answers every call with a JSON-RPC error object.
    Erroring,
}

/// Start a mock JSON-RPC node on a random local port.
pub async fn start_mock_rpc(mode: MockRpc) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    tokio::spawn(async move {
                        let Some(body) = read_request_body(&mut socket).await else {
                            return;
                        };
                        let Ok(request) = serde_json::from_slice::<Value>(&body) else {
                            return;
                        };
                        let response = rpc_response(mode, &request).to_string();
                        let response_str = format!(
                            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            response.len(),
                            response
                        );
                        let _ = socket.write_all(response_str.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

fn rpc_response(mode: MockRpc, request: &Value) -> Value {
    let id = request["id"].clone();
    let result = match (mode, request["method"].as_str()) {
        (MockRpc::Healthy { chain_id, .. }, Some("eth_chainId")) => Some(format!("0x{:x}", chain_id)),
        (MockRpc::Healthy { block_number, .. }, Some("eth_blockNumber")) => Some(format!("0x{:x}", block_number)),
        _ => None,
    };
    match result {
        Some(result) => json!({ "jsonrpc": "2.0", "id": id, "result": result }),
        None => json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": { "code": -32601, "message": "method not available" }
        }),
    }
}

async fn read_request_body(socket: &mut TcpStream) -> Option<Vec<u8>> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let header_end = loop {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let headers = String::from_utf8_lossy(&buf[..header_end]).to_ascii_lowercase();
    let content_length = headers
        .lines()
        .find_map(|line| line.strip_prefix("content-length:"))
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(0);

    while buf.len() < header_end + content_length {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    Some(buf[header_end..header_end + content_length].to_vec())
}
