//! Prometheus text exposition.
//!
//! Lifecycle counters are registered on the default registry when
//! `vote-lifecycle` is built with its `metrics` feature; this module only
//! renders whatever is registered there.

use crate::TelemetryError;
use prometheus::{Encoder, TextEncoder};

/// Encode all metrics in the default registry as Prometheus text format.
pub fn encode_metrics() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::Metrics(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::Metrics(e.to_string()))
}

/// Content type for an HTTP scrape response.
pub fn content_type() -> &'static str {
    prometheus::TEXT_FORMAT
}
