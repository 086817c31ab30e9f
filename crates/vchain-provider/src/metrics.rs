//! Provider request metrics.

use metrics::{counter, histogram};

/// Metric name constants.
pub mod names {
    /// Provider requests by operation and HTTP status.
    pub const REQUESTS_TOTAL: &str = "vchain_provider_requests_total";

    /// Provider request latency in seconds by operation.
    pub const LATENCY_SECONDS: &str = "vchain_provider_latency_seconds";
}

/// Record metrics for a completed provider request.
///
/// `status` is 0 when no HTTP response was received.
pub fn record_request(operation: &str, provider: &str, status: u16, latency_ms: f64) {
    counter!(
        names::REQUESTS_TOTAL,
        "operation" => operation.to_string(),
        "provider" => provider.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    histogram!(
        names::LATENCY_SECONDS,
        "operation" => operation.to_string()
    )
    .record(latency_ms / 1000.0);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_names() {
        assert!(names::REQUESTS_TOTAL.starts_with("vchain_"));
        assert!(names::LATENCY_SECONDS.contains("latency"));
    }
}
