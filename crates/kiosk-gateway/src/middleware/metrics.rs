//! Gateway metrics, exported as JSON on the admin listener.

use axum::extract::Request;
use axum::response::Response;
use futures::future::BoxFuture;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;
use tower::{Layer, Service};

/// Kiosk gateway metrics
#[derive(Default)]
pub struct GatewayMetrics {
    // Request counters
    pub requests_total: AtomicU64,
    pub requests_success: AtomicU64,
    pub requests_error: AtomicU64,

    // WebSocket counters
    pub websocket_connections: AtomicU64,
    pub websocket_registered: AtomicU64,
    pub push_events_sent: AtomicU64,
    pub push_events_dropped: AtomicU64,

    // Domain counters
    pub balance_updates: AtomicU64,
    pub classifications: AtomicU64,
    pub vouchers_sent: AtomicU64,

    // Latency tracking (mean only)
    pub total_latency_ms: AtomicU64,
    pub request_count_for_latency: AtomicU64,
}

impl GatewayMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a finished HTTP request
    pub fn record_request(&self, success: bool, latency_ms: u64) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);

        if success {
            self.requests_success.fetch_add(1, Ordering::Relaxed);
        } else {
            self.requests_error.fetch_add(1, Ordering::Relaxed);
        }

        self.total_latency_ms.fetch_add(latency_ms, Ordering::Relaxed);
        self.request_count_for_latency
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_ws_connect(&self) {
        self.websocket_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_ws_disconnect(&self) {
        self.websocket_connections.fetch_sub(1, Ordering::Relaxed);
    }

    /// Connection moved into a room
    pub fn record_ws_register(&self) {
        self.websocket_registered.fetch_add(1, Ordering::Relaxed);
    }

    /// Connection left its room (explicitly or by closing)
    pub fn record_ws_unregister(&self) {
        self.websocket_registered.fetch_sub(1, Ordering::Relaxed);
    }

    /// Record the outcome of one fan-out
    pub fn record_push(&self, delivered: usize, dropped: usize) {
        self.push_events_sent
            .fetch_add(delivered as u64, Ordering::Relaxed);
        self.push_events_dropped
            .fetch_add(dropped as u64, Ordering::Relaxed);
    }

    pub fn record_balance_update(&self) {
        self.balance_updates.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_classification(&self) {
        self.classifications.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_voucher(&self) {
        self.vouchers_sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Get average latency in ms
    pub fn average_latency_ms(&self) -> f64 {
        let total = self.total_latency_ms.load(Ordering::Relaxed);
        let count = self.request_count_for_latency.load(Ordering::Relaxed);
        if count == 0 {
            0.0
        } else {
            total as f64 / count as f64
        }
    }

    /// Export metrics as JSON
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "requests": {
                "total": self.requests_total.load(Ordering::Relaxed),
                "success": self.requests_success.load(Ordering::Relaxed),
                "error": self.requests_error.load(Ordering::Relaxed),
            },
            "websocket": {
                "connections": self.websocket_connections.load(Ordering::Relaxed),
                "registered": self.websocket_registered.load(Ordering::Relaxed),
                "events_sent": self.push_events_sent.load(Ordering::Relaxed),
                "events_dropped": self.push_events_dropped.load(Ordering::Relaxed),
            },
            "kiosk": {
                "balance_updates": self.balance_updates.load(Ordering::Relaxed),
                "classifications": self.classifications.load(Ordering::Relaxed),
                "vouchers_sent": self.vouchers_sent.load(Ordering::Relaxed),
            },
            "latency": {
                "average_ms": self.average_latency_ms(),
            }
        })
    }
}

/// Layer that records every request into [`GatewayMetrics`]
#[derive(Clone)]
pub struct MetricsLayer {
    metrics: Arc<GatewayMetrics>,
}

impl MetricsLayer {
    pub fn new(metrics: Arc<GatewayMetrics>) -> Self {
        Self { metrics }
    }
}

impl<S> Layer<S> for MetricsLayer {
    type Service = MetricsService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        MetricsService {
            inner,
            metrics: self.metrics.clone(),
        }
    }
}

/// Service produced by [`MetricsLayer`]
#[derive(Clone)]
pub struct MetricsService<S> {
    inner: S,
    metrics: Arc<GatewayMetrics>,
}

impl<S> Service<Request> for MetricsService<S>
where
    S: Service<Request, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let mut inner = self.inner.clone();
        let metrics = self.metrics.clone();
        let start = Instant::now();

        Box::pin(async move {
            let result = inner.call(request).await;
            let success = matches!(
                &result,
                Ok(r) if !r.status().is_server_error() && !r.status().is_client_error()
            );
            metrics.record_request(success, start.elapsed().as_millis() as u64);
            result
        })
    }
}
