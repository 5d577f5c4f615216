use std::sync::LazyLock;

use prometheus::{Encoder, IntCounterVec, Opts, TextEncoder};
use tracing::error;

pub static REPORT_REQUESTS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    let counter = IntCounterVec::new(
        Opts::new("report_requests_total", "Report generation requests by outcome"),
        &["outcome"],
    )
    .expect("static metric options are valid");
    if let Err(e) = prometheus::register(Box::new(counter.clone())) {
        error!("Failed to register report metrics: {}", e);
    }
    counter
});

pub fn record_outcome(outcome: &str) {
    REPORT_REQUESTS.with_label_values(&[outcome]).inc();
}

/// Text exposition of the default registry.
pub fn render() -> (Vec<u8>, String) {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!("Failed to encode metrics: {}", e);
    }
    (buffer, encoder.format_type().to_string())
}
