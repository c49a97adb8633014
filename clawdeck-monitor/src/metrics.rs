//! Prometheus metrics for the clawdeck monitor.
//!
//! This module provides:
//! - Metrics registry mirroring the client counters and the cached fleet state
//! - HTTP server to expose metrics at `/metrics` endpoint

use crate::state::DashboardStats;
use clawdeck_client::{ConnectionStatus, StatsSnapshot};
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts,
    Registry, TextEncoder,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;

/// Refresh duration histogram buckets (in seconds).
const DURATION_BUCKETS: &[f64] = &[0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0];

const STATUSES: [ConnectionStatus; 4] = [
    ConnectionStatus::Disconnected,
    ConnectionStatus::Connecting,
    ConnectionStatus::Connected,
    ConnectionStatus::Error,
];

/// Prometheus metrics for the monitor.
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    /// Requests written to the socket.
    pub requests_sent_total: IntCounter,
    /// Responses matched to a pending request.
    pub responses_matched_total: IntCounter,
    /// Responses whose id matched nothing.
    pub responses_unmatched_total: IntCounter,
    /// Requests that hit their deadline.
    pub request_timeouts_total: IntCounter,
    /// Inbound frames dropped as malformed or unexpected.
    pub frames_dropped_total: IntCounter,
    /// Events handed to the dispatcher.
    pub events_dispatched_total: IntCounter,
    /// Event or status handlers that panicked.
    pub handler_panics_total: IntCounter,
    /// Scheduled reconnect attempts.
    pub reconnect_attempts_total: IntCounter,
    /// Events seen by the monitor, by event name.
    pub events_total: IntCounterVec,
    /// 1 for the current connection status, 0 otherwise.
    pub connection_status: IntGaugeVec,
    /// Requests awaiting a response.
    pub pending_requests: IntGauge,
    /// Last health probe result.
    pub gateway_up: IntGauge,
    pub agents_total: IntGauge,
    pub agents_online: IntGauge,
    pub sessions_active: IntGauge,
    pub cron_jobs_total: IntGauge,
    pub cron_jobs_enabled: IntGauge,
    pub approvals_pending: IntGauge,
    /// Full refresh duration.
    pub refresh_duration: Histogram,
}

fn counter(registry: &Registry, name: &str, help: &str) -> Result<IntCounter, prometheus::Error> {
    let counter = IntCounter::with_opts(Opts::new(name, help))?;
    registry.register(Box::new(counter.clone()))?;
    Ok(counter)
}

fn gauge(registry: &Registry, name: &str, help: &str) -> Result<IntGauge, prometheus::Error> {
    let gauge = IntGauge::with_opts(Opts::new(name, help))?;
    registry.register(Box::new(gauge.clone()))?;
    Ok(gauge)
}

/// Advances a counter to an externally tracked total.
fn advance(counter: &IntCounter, total: u64) {
    let delta = total.saturating_sub(counter.get());
    if delta > 0 {
        counter.inc_by(delta);
    }
}

impl Metrics {
    /// Creates a new Metrics instance with all metrics registered.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        // Client counters
        let requests_sent_total = counter(
            &registry,
            "clawdeck_requests_sent_total",
            "Total requests written to the gateway socket",
        )?;
        let responses_matched_total = counter(
            &registry,
            "clawdeck_responses_matched_total",
            "Total responses matched to a pending request",
        )?;
        let responses_unmatched_total = counter(
            &registry,
            "clawdeck_responses_unmatched_total",
            "Total responses with no pending request",
        )?;
        let request_timeouts_total = counter(
            &registry,
            "clawdeck_request_timeouts_total",
            "Total requests that timed out",
        )?;
        let frames_dropped_total = counter(
            &registry,
            "clawdeck_frames_dropped_total",
            "Total inbound frames dropped",
        )?;
        let events_dispatched_total = counter(
            &registry,
            "clawdeck_events_dispatched_total",
            "Total events dispatched to handlers",
        )?;
        let handler_panics_total = counter(
            &registry,
            "clawdeck_handler_panics_total",
            "Total handler invocations that panicked",
        )?;
        let reconnect_attempts_total = counter(
            &registry,
            "clawdeck_reconnect_attempts_total",
            "Total scheduled reconnect attempts",
        )?;

        // Events
        let events_total = IntCounterVec::new(
            Opts::new("clawdeck_events_total", "Total gateway events by name"),
            &["event"],
        )?;
        registry.register(Box::new(events_total.clone()))?;

        // Connection
        let connection_status = IntGaugeVec::new(
            Opts::new(
                "clawdeck_connection_status",
                "Current gateway connection status",
            ),
            &["status"],
        )?;
        registry.register(Box::new(connection_status.clone()))?;

        let pending_requests = gauge(
            &registry,
            "clawdeck_pending_requests",
            "Requests awaiting a response",
        )?;
        let gateway_up = gauge(
            &registry,
            "clawdeck_gateway_up",
            "Whether the last health probe reported ok",
        )?;

        // Fleet
        let agents_total = gauge(&registry, "clawdeck_agents_total", "Known agents")?;
        let agents_online = gauge(
            &registry,
            "clawdeck_agents_online",
            "Agents that are online or busy",
        )?;
        let sessions_active = gauge(&registry, "clawdeck_sessions_active", "Active sessions")?;
        let cron_jobs_total = gauge(&registry, "clawdeck_cron_jobs_total", "Known cron jobs")?;
        let cron_jobs_enabled =
            gauge(&registry, "clawdeck_cron_jobs_enabled", "Enabled cron jobs")?;
        let approvals_pending = gauge(
            &registry,
            "clawdeck_approvals_pending",
            "Exec approvals awaiting a decision",
        )?;

        // Refresh duration
        let refresh_duration = Histogram::with_opts(
            HistogramOpts::new(
                "clawdeck_refresh_duration_seconds",
                "Full state refresh duration in seconds",
            )
            .buckets(DURATION_BUCKETS.to_vec()),
        )?;
        registry.register(Box::new(refresh_duration.clone()))?;

        Ok(Self {
            registry,
            requests_sent_total,
            responses_matched_total,
            responses_unmatched_total,
            request_timeouts_total,
            frames_dropped_total,
            events_dispatched_total,
            handler_panics_total,
            reconnect_attempts_total,
            events_total,
            connection_status,
            pending_requests,
            gateway_up,
            agents_total,
            agents_online,
            sessions_active,
            cron_jobs_total,
            cron_jobs_enabled,
            approvals_pending,
            refresh_duration,
        })
    }

    /// Mirrors the client's counters.
    pub fn record_client(&self, stats: &StatsSnapshot, pending: usize, status: ConnectionStatus) {
        advance(&self.requests_sent_total, stats.requests_sent);
        advance(&self.responses_matched_total, stats.responses_matched);
        advance(&self.responses_unmatched_total, stats.responses_unmatched);
        advance(&self.request_timeouts_total, stats.timeouts);
        advance(&self.frames_dropped_total, stats.frames_dropped);
        advance(&self.events_dispatched_total, stats.events_dispatched);
        advance(&self.handler_panics_total, stats.handler_panics);
        advance(&self.reconnect_attempts_total, stats.reconnect_attempts);

        self.pending_requests.set(pending as i64);
        for candidate in STATUSES {
            self.connection_status
                .with_label_values(&[candidate.as_str()])
                .set(i64::from(candidate == status));
        }
    }

    /// Mirrors the cached fleet counts.
    pub fn record_fleet(&self, stats: &DashboardStats) {
        self.agents_total.set(stats.total_agents as i64);
        self.agents_online.set(stats.online_agents as i64);
        self.sessions_active.set(stats.active_sessions as i64);
        self.cron_jobs_total.set(stats.total_cron_jobs as i64);
        self.cron_jobs_enabled.set(stats.active_cron_jobs as i64);
        self.approvals_pending.set(stats.pending_approvals as i64);
    }

    /// Encodes all metrics in Prometheus text format.
    pub fn encode(&self) -> Vec<u8> {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            tracing::error!("Failed to encode metrics: {}", e);
        }
        buffer
    }

    /// Returns a reference to the registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

/// Runs the HTTP metrics server.
///
/// The server listens on the given address and serves metrics at `/metrics`.
pub async fn run_metrics_server(
    addr: SocketAddr,
    metrics: Arc<Metrics>,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Metrics server listening on http://{}/metrics", addr);

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

    Ok(())
}

fn respond(
    status: StatusCode,
    content_type: &'static str,
    body: impl Into<Bytes>,
) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

/// Handles an HTTP request to the metrics server.
async fn handle_request(
    req: Request<hyper::body::Incoming>,
    metrics: Arc<Metrics>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    Ok(route(req.uri().path(), &metrics))
}

fn route(path: &str, metrics: &Metrics) -> Response<Full<Bytes>> {
    match path {
        "/metrics" => respond(
            StatusCode::OK,
            "text/plain; version=0.0.4; charset=utf-8",
            metrics.encode(),
        ),
        "/health" | "/healthz" => respond(StatusCode::OK, "text/plain", "OK"),
        "/" => respond(
            StatusCode::OK,
            "text/html",
            r#"<!DOCTYPE html>
<html>
<head><title>clawdeck Metrics</title></head>
<body>
<h1>clawdeck Metrics</h1>
<p><a href="/metrics">Metrics</a></p>
</body>
</html>"#,
        ),
        _ => respond(StatusCode::NOT_FOUND, "text/plain", "Not Found"),
    }
}
