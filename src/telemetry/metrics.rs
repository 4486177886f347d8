//! Application metrics using the metrics crate.

use axum::{http::StatusCode, response::IntoResponse};
use metrics::{counter, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Duration;

static PROMETHEUS_HANDLE: OnceLock<Option<PrometheusHandle>> = OnceLock::new();

#[derive(Clone)]
pub struct MetricsState {
    handle: Option<PrometheusHandle>,
}

impl MetricsState {
    /// Installs the process-wide Prometheus recorder on first use. If another
    /// recorder is already installed, metrics stay disabled.
    pub fn new(enabled: bool) -> Self {
        if !enabled {
            return Self { handle: None };
        }

        let handle = PROMETHEUS_HANDLE.get_or_init(|| {
            PrometheusBuilder::new()
                .install_recorder()
                .map_err(|e| tracing::warn!(error = %e, "Prometheus recorder not installed"))
                .ok()
        });

        Self {
            handle: handle.clone(),
        }
    }

    pub fn disabled() -> Self {
        Self { handle: None }
    }

    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(|h| h.render())
    }

    pub fn is_enabled(&self) -> bool {
        self.handle.is_some()
    }
}

pub async fn metrics_handler(
    axum::extract::State(state): axum::extract::State<MetricsState>,
) -> impl IntoResponse {
    match state.render() {
        Some(metrics) => (StatusCode::OK, metrics),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            "Metrics not enabled".to_string(),
        ),
    }
}

pub fn record_request_latency(method: &str, path: &str, status: u16, duration: Duration) {
    histogram!(
        "http_request_duration_seconds",
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status.to_string()
    )
    .record(duration.as_secs_f64());
}

/// `outcome` is `ok` or the error kind label of the failure.
pub fn record_store_operation(operation: &'static str, outcome: &'static str, duration: Duration) {
    counter!(
        "store_operations_total",
        "operation" => operation,
        "outcome" => outcome
    )
    .increment(1);

    histogram!(
        "store_operation_duration_seconds",
        "operation" => operation
    )
    .record(duration.as_secs_f64());
}

pub fn record_cascade_delete(entity: &str, removed: u64) {
    counter!("cascade_deletes_total", "entity" => entity.to_string()).increment(1);
    histogram!("cascade_removed_rows", "entity" => entity.to_string()).record(removed as f64);
}

pub fn record_retry(operation: &str) {
    counter!("store_retries_total", "operation" => operation.to_string()).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_state_disabled() {
        let state = MetricsState::disabled();
        assert!(!state.is_enabled());
        assert!(state.render().is_none());
        assert!(!MetricsState::new(false).is_enabled());
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        record_store_operation("accounts.find", "ok", Duration::from_millis(3));
        record_cascade_delete("Account", 4);
        record_retry("accounts.find");
    }
}
