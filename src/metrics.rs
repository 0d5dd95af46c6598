//! Prometheus-compatible metrics endpoint
//!
//! Exposes session, lobby and packet counters in Prometheus text format.
//! Default endpoint: http://localhost:9090/metrics

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{debug, info};

/// Metrics registry for the server
#[derive(Debug)]
pub struct Metrics {
    // Gauges
    pub sessions_active: AtomicU64,
    pub lobbies_active: AtomicU64,

    // Network counters
    pub connections_total: AtomicU64,
    pub frames_received: AtomicU64,
    pub frames_sent: AtomicU64,
    pub bytes_received: AtomicU64,
    pub bytes_sent: AtomicU64,
    pub send_failures: AtomicU64,

    // Protocol counters
    pub decode_errors: AtomicU64,
    pub unknown_packets: AtomicU64,
    pub lobbies_created: AtomicU64,
    pub lobbies_expired: AtomicU64,

    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            sessions_active: AtomicU64::new(0),
            lobbies_active: AtomicU64::new(0),
            connections_total: AtomicU64::new(0),
            frames_received: AtomicU64::new(0),
            frames_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            send_failures: AtomicU64::new(0),
            decode_errors: AtomicU64::new(0),
            unknown_packets: AtomicU64::new(0),
            lobbies_created: AtomicU64::new(0),
            lobbies_expired: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_received(&self, bytes: usize) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_sent(&self, bytes: usize) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Generate Prometheus-format metrics output
    pub fn to_prometheus(&self) -> String {
        let mut output = String::with_capacity(2048);

        macro_rules! metric {
            ($name:expr, $help:expr, $type:expr, $value:expr) => {
                output.push_str(&format!(
                    "# HELP {} {}\n# TYPE {} {}\n{} {}\n",
                    $name, $help, $name, $type, $name, $value
                ));
            };
        }

        metric!("tank_arena_sessions_active", "Connected sessions", "gauge",
            self.sessions_active.load(Ordering::Relaxed));
        metric!("tank_arena_lobbies_active", "Registered lobbies", "gauge",
            self.lobbies_active.load(Ordering::Relaxed));

        metric!("tank_arena_connections_total", "Accepted connections", "counter",
            self.connections_total.load(Ordering::Relaxed));
        metric!("tank_arena_frames_received_total", "Frames received", "counter",
            self.frames_received.load(Ordering::Relaxed));
        metric!("tank_arena_frames_sent_total", "Frames written to sockets", "counter",
            self.frames_sent.load(Ordering::Relaxed));
        metric!("tank_arena_bytes_received_total", "Bytes received", "counter",
            self.bytes_received.load(Ordering::Relaxed));
        metric!("tank_arena_bytes_sent_total", "Bytes written to sockets", "counter",
            self.bytes_sent.load(Ordering::Relaxed));
        metric!("tank_arena_send_failures_total", "Frames that could not be queued", "counter",
            self.send_failures.load(Ordering::Relaxed));

        metric!("tank_arena_decode_errors_total", "Frames with malformed payloads", "counter",
            self.decode_errors.load(Ordering::Relaxed));
        metric!("tank_arena_unknown_packets_total", "Frames with unregistered type tags", "counter",
            self.unknown_packets.load(Ordering::Relaxed));
        metric!("tank_arena_lobbies_created_total", "Lobbies created", "counter",
            self.lobbies_created.load(Ordering::Relaxed));
        metric!("tank_arena_lobbies_expired_total", "Lobbies removed by the empty sweep", "counter",
            self.lobbies_expired.load(Ordering::Relaxed));

        metric!("tank_arena_uptime_seconds", "Server uptime in seconds", "counter",
            self.uptime_seconds());

        output
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Start the metrics HTTP server
pub async fn start_metrics_server(metrics: Arc<Metrics>, port: u16) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr).await?;

    info!("Metrics server listening on http://{}/metrics", addr);

    loop {
        let (mut socket, peer) = listener.accept().await?;
        let metrics = metrics.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; 1024];

            match socket.read(&mut buffer).await {
                Ok(n) if n > 0 => {
                    let request = String::from_utf8_lossy(&buffer[..n]);
                    let response = render_response(&request, &metrics);

                    if let Err(e) = socket.write_all(response.as_bytes()).await {
                        debug!("Failed to write metrics response to {}: {}", peer, e);
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    debug!("Failed to read from metrics socket {}: {}", peer, e);
                }
            }
        });
    }
}

fn render_response(request: &str, metrics: &Metrics) -> String {
    if request.starts_with("GET /metrics") {
        let body = metrics.to_prometheus();
        format!(
            "HTTP/1.1 200 OK\r\nContent-Type: text/plain; version=0.0.4\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        )
    } else if request.starts_with("GET /health") {
        "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 2\r\nConnection: close\r\n\r\nOK"
            .to_string()
    } else {
        "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_new() {
        let metrics = Metrics::new();
        assert_eq!(metrics.sessions_active.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.frames_received.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_record_traffic() {
        let metrics = Metrics::new();
        metrics.record_received(6);
        metrics.record_received(4);
        metrics.record_sent(6);

        assert_eq!(metrics.frames_received.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.bytes_received.load(Ordering::Relaxed), 10);
        assert_eq!(metrics.frames_sent.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.bytes_sent.load(Ordering::Relaxed), 6);
    }

    #[test]
    fn test_prometheus_format() {
        let metrics = Metrics::new();
        metrics.sessions_active.store(3, Ordering::Relaxed);
        metrics.decode_errors.store(7, Ordering::Relaxed);

        let output = metrics.to_prometheus();

        assert!(output.contains("tank_arena_sessions_active 3"));
        assert!(output.contains("tank_arena_decode_errors_total 7"));
        assert!(output.contains("# HELP"));
        assert!(output.contains("# TYPE tank_arena_lobbies_active gauge"));
    }

    #[test]
    fn test_render_response() {
        let metrics = Metrics::new();

        assert!(render_response("GET /metrics HTTP/1.1", &metrics).contains("200 OK"));
        assert!(render_response("GET /health HTTP/1.1", &metrics).ends_with("OK"));
        assert!(render_response("GET /nope HTTP/1.1", &metrics).starts_with("HTTP/1.1 404"));
    }
}
