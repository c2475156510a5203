// Prometheus metrics for the Warden service
//
// Exposes metrics on /metrics HTTP endpoint:
// - Guard rejections by guard and error code (counter)
// - HTTP responses by endpoint and status (counter)
// - Command executions by outcome (counter)
// - Command execution latency (histogram)

use lazy_static::lazy_static;
use prometheus::{Encoder, Histogram, IntCounterVec, Registry, TextEncoder};
use std::sync::{Arc, Once};

lazy_static! {
    pub static ref REGISTRY: Arc<Registry> = Arc::new(Registry::new());

    pub static ref GUARD_REJECTIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new("guard_rejections_total", "Requests rejected by a boundary guard"),
        &["guard", "code"]
    ).expect("Failed to create guard rejections metric");

    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new("http_requests_total", "HTTP responses by endpoint and status"),
        &["endpoint", "status"]
    ).expect("Failed to create HTTP requests metric");

    pub static ref COMMAND_EXECUTIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new("command_executions_total", "Approved commands executed, by outcome"),
        &["status"]
    ).expect("Failed to create command executions metric");

    pub static ref COMMAND_DURATION_SECONDS: Histogram = Histogram::with_opts(
        prometheus::HistogramOpts::new("command_duration_seconds", "Wall time of approved commands"),
    ).expect("Failed to create command duration metric");
}

static INIT: Once = Once::new();

/// Register all metrics with the registry
///
/// Safe to call more than once; only the first call registers.
pub fn init() -> prometheus::Result<()> {
    let mut result = Ok(());
    INIT.call_once(|| {
        result = register_all();
    });
    result
}

fn register_all() -> prometheus::Result<()> {
    REGISTRY.register(Box::new(GUARD_REJECTIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(HTTP_REQUESTS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(COMMAND_EXECUTIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(COMMAND_DURATION_SECONDS.clone()))?;
    Ok(())
}

/// Count one guard rejection
pub fn record_rejection(guard: &str, code: &str) {
    GUARD_REJECTIONS_TOTAL.with_label_values(&[guard, code]).inc();
}

/// Count one HTTP response
pub fn record_response(endpoint: &str, status: u16) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[endpoint, &status.to_string()])
        .inc();
}

/// Gather all metrics in Prometheus text format
pub fn gather_metrics() -> anyhow::Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| anyhow::anyhow!("Failed to encode metrics: {}", e))?;
    String::from_utf8(buffer).map_err(|e| anyhow::anyhow!("Invalid UTF-8 in metrics: {}", e))
}
