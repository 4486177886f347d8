//! Observability: tracing, metrics, and OpenTelemetry integration.

pub mod metrics;
pub mod tracing;

pub use metrics::{metrics_handler, record_request_latency, MetricsState};
pub use tracing::{init_telemetry, shutdown_telemetry};
