//! Prometheus metrics for the pxup receiver.
//!
//! This module provides:
//! - Metrics registry with counters, gauges, and histograms
//! - HTTP server to expose metrics at `/metrics` endpoint

use crate::error::ErrorClass;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use prometheus::{
    Counter, CounterVec, Encoder, Gauge, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use pxup_core::ApplyOutcome;
use pxup_protocol::PacketKind;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;

/// Frame apply histogram buckets (in seconds).
const APPLY_BUCKETS: &[f64] = &[0.0001, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1];

/// Prometheus metrics for the receiver.
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    /// Total connections accepted.
    pub connections_total: Counter,
    /// 1 while a client is connected.
    pub connection_active: Gauge,
    /// Frames accepted by packet kind.
    pub frames_total: CounterVec,
    /// Pixels written by packet kind.
    pub updates_applied_total: CounterVec,
    /// Entries dropped by the bounds check, by packet kind.
    pub entries_skipped_total: CounterVec,
    /// Connections torn down by error class.
    pub connection_errors_total: CounterVec,
    /// Frame id of the last accepted frame.
    pub last_frame_id: Gauge,
    pub frame_apply_seconds: HistogramVec,
}

impl Metrics {
    /// Creates a new Metrics instance with all metrics registered.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        // Connections
        let connections_total = Counter::with_opts(Opts::new(
            "pxup_connections_total",
            "Total number of connections accepted",
        ))?;
        registry.register(Box::new(connections_total.clone()))?;

        let connection_active = Gauge::with_opts(Opts::new(
            "pxup_connection_active",
            "Whether a client is currently connected",
        ))?;
        registry.register(Box::new(connection_active.clone()))?;

        // Frames
        let frames_total = CounterVec::new(
            Opts::new("pxup_frames_total", "Total frames accepted by packet kind"),
            &["kind"],
        )?;
        registry.register(Box::new(frames_total.clone()))?;

        let updates_applied_total = CounterVec::new(
            Opts::new(
                "pxup_updates_applied_total",
                "Total pixels written by packet kind",
            ),
            &["kind"],
        )?;
        registry.register(Box::new(updates_applied_total.clone()))?;

        let entries_skipped_total = CounterVec::new(
            Opts::new(
                "pxup_entries_skipped_total",
                "Total out-of-bounds entries skipped by packet kind",
            ),
            &["kind"],
        )?;
        registry.register(Box::new(entries_skipped_total.clone()))?;

        // Errors
        let connection_errors_total = CounterVec::new(
            Opts::new(
                "pxup_connection_errors_total",
                "Total connections closed by an error, by class",
            ),
            &["class"],
        )?;
        registry.register(Box::new(connection_errors_total.clone()))?;

        let last_frame_id = Gauge::with_opts(Opts::new(
            "pxup_last_frame_id",
            "Frame id of the last accepted frame",
        ))?;
        registry.register(Box::new(last_frame_id.clone()))?;

        // Apply duration
        let frame_apply_seconds = HistogramVec::new(
            HistogramOpts::new(
                "pxup_frame_apply_seconds",
                "Time spent writing a decoded frame to the surface",
            )
            .buckets(APPLY_BUCKETS.to_vec()),
            &["kind"],
        )?;
        registry.register(Box::new(frame_apply_seconds.clone()))?;

        Ok(Self {
            registry,
            connections_total,
            connection_active,
            frames_total,
            updates_applied_total,
            entries_skipped_total,
            connection_errors_total,
            last_frame_id,
            frame_apply_seconds,
        })
    }

    /// Records an accepted frame.
    pub fn observe_frame(
        &self,
        kind: PacketKind,
        frame_id: u32,
        outcome: ApplyOutcome,
        apply_time: Duration,
    ) {
        let kind = kind.as_str();
        self.frames_total.with_label_values(&[kind]).inc();
        self.updates_applied_total
            .with_label_values(&[kind])
            .inc_by(outcome.updates_applied as f64);
        self.entries_skipped_total
            .with_label_values(&[kind])
            .inc_by(outcome.skipped as f64);
        self.frame_apply_seconds
            .with_label_values(&[kind])
            .observe(apply_time.as_secs_f64());
        self.last_frame_id.set(frame_id as f64);
    }

    /// Records a connection closed by an error.
    pub fn observe_error(&self, class: ErrorClass) {
        self.connection_errors_total
            .with_label_values(&[class.as_str()])
            .inc();
    }

    /// Encodes all metrics in Prometheus text format.
    pub fn encode(&self) -> Result<Vec<u8>, prometheus::Error> {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(buffer)
    }

}

/// Runs the HTTP metrics server.
///
/// The server listens on the given address and serves metrics at `/metrics`.
pub async fn run_metrics_server(
    addr: SocketAddr,
    metrics: Arc<Metrics>,
    shutdown: broadcast::Receiver<()>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(
        "Metrics server listening on http://{}/metrics",
        listener.local_addr()?
    );
    serve_metrics(listener, metrics, shutdown).await;
    Ok(())
}

/// Serves metrics on an already bound listener until shutdown.
pub async fn serve_metrics(
    listener: TcpListener,
    metrics: Arc<Metrics>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _)) => {
                        let metrics = metrics.clone();
                        tokio::spawn(async move {
                            let io = TokioIo::new(stream);
                            let service = service_fn(move |req| {
                                let metrics = metrics.clone();
                                async move { handle_request(req, metrics).await }
                            });
                            if let Err(e) = http1::Builder::new()
                                .serve_connection(io, service)
                                .await
                            {
                                tracing::debug!("Metrics connection error: {}", e);
                            }
                        });
                    }
                    Err(e) => {
                        tracing::error!("Metrics server accept error: {}", e);
                    }
                }
            }
            _ = shutdown.recv() => {
                tracing::info!("Metrics server shutting down");
                break;
            }
        }
    }
}

fn text_response(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
}

/// Handles an HTTP request to the metrics server.
async fn handle_request(
    req: Request<hyper::body::Incoming>,
    metrics: Arc<Metrics>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    let response = match req.uri().path() {
        "/metrics" => match metrics.encode() {
            Ok(body) => {
                let mut response = text_response(StatusCode::OK, body);
                response.headers_mut().insert(
                    CONTENT_TYPE,
                    HeaderValue::from_static("text/plain; version=0.0.4; charset=utf-8"),
                );
                response
            }
            Err(e) => {
                tracing::error!("Failed to encode metrics: {}", e);
                text_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
            }
        },
        "/health" | "/healthz" => text_response(StatusCode::OK, "OK"),
        _ => text_response(StatusCode::NOT_FOUND, "Not Found"),
    };

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();

        metrics.connections_total.inc();
        metrics.connection_active.set(1.0);
        metrics.observe_frame(
            PacketKind::Pixel,
            7,
            ApplyOutcome {
                updates_applied: 2,
                skipped: 0,
            },
            Duration::from_micros(150),
        );
        metrics.observe_error(ErrorClass::Protocol);

        let encoded = String::from_utf8(metrics.encode().unwrap()).unwrap();

        assert!(encoded.contains("pxup_connections_total 1"));
        assert!(encoded.contains("pxup_connection_active 1"));
        assert!(encoded.contains("pxup_frames_total{kind=\"pixel\"} 1"));
        assert!(encoded.contains("pxup_updates_applied_total{kind=\"pixel\"} 2"));
        assert!(encoded.contains("pxup_connection_errors_total{class=\"protocol\"} 1"));
        assert!(encoded.contains("pxup_last_frame_id 7"));
        assert!(encoded.contains("pxup_frame_apply_seconds"));
    }

    #[test]
    fn test_skipped_entries_by_kind() {
        let metrics = Metrics::new().unwrap();
        metrics.observe_frame(
            PacketKind::Run,
            3,
            ApplyOutcome {
                updates_applied: 0,
                skipped: 1,
            },
            Duration::ZERO,
        );

        let encoded = String::from_utf8(metrics.encode().unwrap()).unwrap();
        assert!(encoded.contains("pxup_entries_skipped_total{kind=\"run\"} 1"));
        assert!(encoded.contains("pxup_updates_applied_total{kind=\"run\"} 0"));
    }

    async fn http_get(addr: SocketAddr, path: &str) -> String {
        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        let request = format!(
            "GET {} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
            path
        );
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[tokio::test]
    async fn test_http_endpoints() {
        let metrics = Arc::new(Metrics::new().unwrap());
        metrics.connections_total.inc();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let server = tokio::spawn(serve_metrics(listener, metrics, shutdown_rx));

        let response = http_get(addr, "/metrics").await;
        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.contains("pxup_connections_total 1"));

        let response = http_get(addr, "/health").await;
        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.ends_with("OK"));

        let response = http_get(addr, "/nope").await;
        assert!(response.starts_with("HTTP/1.1 404"));

        shutdown_tx.send(()).unwrap();
        server.await.unwrap();
    }
}
