//! Middleware stack for the kiosk gateway.
//!
//! Layer order: Request → CORS → Tracing → Metrics → Timeout → Handler

pub mod cors;
pub mod metrics;
pub mod timeout;
pub mod tracing;

pub use cors::create_cors_layer;
pub use metrics::{GatewayMetrics, MetricsLayer};
pub use timeout::TimeoutLayer;
pub use tracing::TracingLayer;
